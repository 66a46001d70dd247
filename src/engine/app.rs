//! Per-app supervisor: the in-memory mirror of one tenant app.

use rustc_hash::FxHashMap;

use crate::flow::error::FlowError;
use crate::model::EventType;
use crate::store::{App, Command, EventListener};

use super::command::{CompiledCommand, CompiledEventListener};

pub struct AppSupervisor {
    pub app: App,
    /// Set when any command changed after its last deploy; cleared by a
    /// successful deploy pass.
    pub has_undeployed_changes: bool,
    commands: FxHashMap<String, CompiledCommand>,
    listeners: FxHashMap<String, CompiledEventListener>,
}

impl AppSupervisor {
    pub fn new(app: App) -> Self {
        AppSupervisor {
            app,
            has_undeployed_changes: false,
            commands: FxHashMap::default(),
            listeners: FxHashMap::default(),
        }
    }

    pub fn update_app(&mut self, app: App) {
        self.app = app;
    }

    /// Recompiles and stores the command; keeps whatever version was there
    /// before if compilation fails.
    pub fn upsert_command(&mut self, command: &Command) -> Result<(), FlowError> {
        let compiled = CompiledCommand::compile(command)?;
        if command.has_undeployed_changes() {
            self.has_undeployed_changes = true;
        }
        self.commands.insert(command.id.clone(), compiled);
        Ok(())
    }

    pub fn upsert_listener(&mut self, listener: &EventListener) -> Result<(), FlowError> {
        let compiled = CompiledEventListener::compile(listener)?;
        self.listeners.insert(listener.id.clone(), compiled);
        Ok(())
    }

    /// Drops entities whose IDs are no longer enabled in storage.
    pub fn retain_commands(&mut self, enabled_ids: &[String]) {
        self.commands.retain(|id, _| enabled_ids.contains(id));
    }

    pub fn retain_listeners(&mut self, enabled_ids: &[String]) {
        self.listeners.retain(|id, _| enabled_ids.contains(id));
    }

    pub fn command_by_id(&self, id: &str) -> Option<&CompiledCommand> {
        self.commands.get(id)
    }

    /// Routing lookup by full invocation name (subcommands flattened).
    pub fn command_by_name(&self, full_name: &str) -> Option<&CompiledCommand> {
        self.commands.values().find(|c| c.name == full_name)
    }

    pub fn commands(&self) -> impl Iterator<Item = &CompiledCommand> {
        self.commands.values()
    }

    pub fn listener_by_id(&self, id: &str) -> Option<&CompiledEventListener> {
        self.listeners.get(id)
    }

    pub fn listeners_for(&self, event_type: EventType) -> Vec<&CompiledEventListener> {
        self.listeners
            .values()
            .filter(|l| l.event_type == Some(event_type))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::flow::data::{FlowData, FlowEdge, FlowNode, FlowNodeData, FlowNodeType};

    fn app() -> App {
        App {
            id: "a1".into(),
            name: "test".into(),
            discord_token: "t".into(),
            enabled: true,
            updated_at: Utc::now(),
        }
    }

    fn command_flow(name: &str) -> FlowData {
        let mut entry = FlowNode {
            id: "1".into(),
            node_type: FlowNodeType::EntryCommand,
            data: FlowNodeData::default(),
        };
        entry.data.name = Some(name.into());
        FlowData {
            nodes: vec![
                entry,
                FlowNode {
                    id: "2".into(),
                    node_type: FlowNodeType::ActionLog,
                    data: FlowNodeData::default(),
                },
            ],
            edges: vec![FlowEdge {
                id: "e".into(),
                source: "1".into(),
                target: "2".into(),
                source_handle: None,
            }],
        }
    }

    fn command(id: &str, name: &str) -> Command {
        Command {
            id: id.into(),
            app_id: "a1".into(),
            flow_source: command_flow(name),
            enabled: true,
            updated_at: Utc::now(),
            last_deployed_at: None,
        }
    }

    #[test]
    fn upsert_tracks_undeployed_changes_and_routes_by_name() {
        let mut supervisor = AppSupervisor::new(app());
        assert!(!supervisor.has_undeployed_changes);

        supervisor.upsert_command(&command("c1", "settings view")).unwrap();
        assert!(supervisor.has_undeployed_changes);
        assert!(supervisor.command_by_name("settings view").is_some());
        assert!(supervisor.command_by_name("settings").is_none());

        supervisor.retain_commands(&[]);
        assert!(supervisor.command_by_id("c1").is_none());
    }

    #[test]
    fn deployed_command_does_not_flag_changes() {
        let mut supervisor = AppSupervisor::new(app());
        let mut cmd = command("c1", "ping");
        cmd.last_deployed_at = Some(cmd.updated_at + chrono::Duration::seconds(1));
        supervisor.upsert_command(&cmd).unwrap();
        assert!(!supervisor.has_undeployed_changes);
    }
}
