//! Row and flow-document builders shared by the integration tests.

use std::sync::Arc;

use chrono::Utc;

use flowcord::engine::{Engine, EngineConfig};
use flowcord::flow::data::{FlowData, FlowEdge, FlowNode, FlowNodeData, FlowNodeType};
use flowcord::model::{
    CommandInvocation, Interaction, InteractionData, MessageData, ModalData, ModalField, User,
};
use flowcord::store::{App, Command};

use super::providers::{RecordingDiscord, TestFactory};
use super::stores::MemoryStores;

pub fn app(id: &str) -> App {
    App {
        id: id.to_owned(),
        name: format!("app-{id}"),
        discord_token: "token".to_owned(),
        enabled: true,
        updated_at: Utc::now(),
    }
}

pub fn command(id: &str, app_id: &str, flow: FlowData) -> Command {
    Command {
        id: id.to_owned(),
        app_id: app_id.to_owned(),
        flow_source: flow,
        enabled: true,
        updated_at: Utc::now(),
        last_deployed_at: None,
    }
}

pub fn node(id: &str, node_type: FlowNodeType) -> FlowNode {
    FlowNode {
        id: id.to_owned(),
        node_type,
        data: FlowNodeData::default(),
    }
}

pub fn edge(source: &str, target: &str) -> FlowEdge {
    FlowEdge {
        id: format!("{source}->{target}"),
        source: source.to_owned(),
        target: target.to_owned(),
        source_handle: None,
    }
}

/// `name` entry followed by a response with the given content.
pub fn response_flow(name: &str, content: &str) -> FlowData {
    let mut entry = node("1", FlowNodeType::EntryCommand);
    entry.data.name = Some(name.to_owned());
    let mut response = node("2", FlowNodeType::ActionResponseCreate);
    response.data.message_data = Some(MessageData {
        content: content.to_owned(),
        ..Default::default()
    });
    FlowData {
        nodes: vec![entry, response],
        edges: vec![edge("1", "2")],
    }
}

/// `name` entry followed by a chain of log nodes.
pub fn log_chain_flow(name: &str, messages: &[&str]) -> FlowData {
    let mut entry = node("1", FlowNodeType::EntryCommand);
    entry.data.name = Some(name.to_owned());
    let mut nodes = vec![entry];
    let mut edges = Vec::new();
    for (i, message) in messages.iter().enumerate() {
        let id = (i + 2).to_string();
        let mut log = node(&id, FlowNodeType::ActionLog);
        log.data.log_message = Some((*message).to_owned());
        edges.push(edge(&(i + 1).to_string(), &id));
        nodes.push(log);
    }
    FlowData { nodes, edges }
}

/// `name` entry, a modal suspend, and a log that only runs on resume.
pub fn modal_flow(name: &str, resumed_message: &str) -> FlowData {
    let mut entry = node("1", FlowNodeType::EntryCommand);
    entry.data.name = Some(name.to_owned());
    let mut modal = node("2", FlowNodeType::SuspendResponseModal);
    modal.data.modal_data = Some(ModalData {
        custom_id: String::new(),
        title: "Feedback".to_owned(),
        fields: vec![ModalField {
            custom_id: "text".to_owned(),
            label: "Say something".to_owned(),
            multiline: true,
        }],
    });
    let mut log = node("3", FlowNodeType::ActionLog);
    log.data.log_message = Some(resumed_message.to_owned());
    FlowData {
        nodes: vec![entry, modal, log],
        edges: vec![edge("1", "2"), edge("2", "3")],
    }
}

pub fn command_interaction(name: &str) -> Interaction {
    Interaction {
        id: "i1".to_owned(),
        app_id: "a1".to_owned(),
        token: "tok".to_owned(),
        guild_id: Some("g1".to_owned()),
        channel_id: Some("c1".to_owned()),
        member: None,
        user: Some(User {
            id: "u1".to_owned(),
            username: "tester".to_owned(),
            ..Default::default()
        }),
        message: None,
        data: InteractionData::Command(CommandInvocation {
            name: name.to_owned(),
            options: vec![],
        }),
    }
}

pub fn modal_interaction(custom_id: &str) -> Interaction {
    Interaction {
        id: "i2".to_owned(),
        app_id: "a1".to_owned(),
        token: "tok2".to_owned(),
        guild_id: Some("g1".to_owned()),
        channel_id: Some("c1".to_owned()),
        member: None,
        user: Some(User {
            id: "u1".to_owned(),
            username: "tester".to_owned(),
            ..Default::default()
        }),
        message: None,
        data: InteractionData::Modal {
            custom_id: custom_id.to_owned(),
            values: vec![],
        },
    }
}

/// Engine wired to in-memory stores and recording providers.
pub fn test_engine(
    config: EngineConfig,
    stores: &Arc<MemoryStores>,
) -> (Arc<Engine>, Arc<RecordingDiscord>) {
    let factory = TestFactory::default();
    let discord = factory.discord.clone();
    let engine = Arc::new(Engine::new(
        config,
        stores.engine_stores(),
        Arc::new(factory),
    ));
    (engine, discord)
}
