//! Compiled entities held by an app supervisor, and the execution boundary
//! that turns an invocation into tenant-visible records.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::flow::compile::{compile_command, compile_event_listener, CompiledFlow, NodeIdx};
use crate::flow::context::{FlowContext, FlowContextLimits, FlowEntry};
use crate::flow::data::LogLevel;
use crate::flow::error::FlowError;
use crate::flow::provider::FlowProviders;
use crate::flow::state::FlowContextState;
use crate::model::EventType;
use crate::resume::EntityLinks;
use crate::store::{Command, EventListener, LogEntry, LogStore, UsageRecord, UsageStore};

/// A command with its flow compiled, ready to route invocations into.
#[derive(Clone)]
pub struct CompiledCommand {
    pub id: String,
    /// Full space-separated name, used for interaction routing.
    pub name: String,
    pub flow: Arc<CompiledFlow>,
    pub updated_at: DateTime<Utc>,
    pub last_deployed_at: Option<DateTime<Utc>>,
}

impl CompiledCommand {
    pub fn compile(command: &Command) -> Result<Self, FlowError> {
        let flow = compile_command(&command.flow_source)?;
        Ok(CompiledCommand {
            id: command.id.clone(),
            name: flow.command_name(),
            flow: Arc::new(flow),
            updated_at: command.updated_at,
            last_deployed_at: command.last_deployed_at,
        })
    }
}

#[derive(Clone)]
pub struct CompiledEventListener {
    pub id: String,
    pub event_type: Option<EventType>,
    pub flow: Arc<CompiledFlow>,
    pub updated_at: DateTime<Utc>,
}

impl CompiledEventListener {
    pub fn compile(listener: &EventListener) -> Result<Self, FlowError> {
        let flow = compile_event_listener(&listener.flow_source)?;
        let event_type = flow
            .node(flow.entry())
            .data
            .event_type
            .as_deref()
            .and_then(|name| serde_json::from_value(serde_json::Value::String(name.to_owned())).ok());
        Ok(CompiledEventListener {
            id: listener.id.clone(),
            event_type,
            flow: Arc::new(flow),
            updated_at: listener.updated_at,
        })
    }
}

/// Where an invocation enters the graph: the entry node for fresh
/// invocations, or the children of a suspended node for resumes.
pub(crate) enum FlowStart {
    Entry,
    NodeChildren(NodeIdx),
    NodeHandle(NodeIdx, String),
}

/// Everything a single invocation needs besides the flow itself.
pub(crate) struct ExecutionEnv {
    pub app_id: String,
    pub links: EntityLinks,
    pub providers: FlowProviders,
    pub limits: FlowContextLimits,
    pub logs: Arc<dyn LogStore>,
    pub usage: Arc<dyn UsageStore>,
}

/// Runs one invocation to completion. Failures never propagate past this
/// boundary: they become a tenant-visible log entry, and credits consumed
/// up to the failure are still recorded.
pub(crate) async fn run_flow(
    env: ExecutionEnv,
    flow: Arc<CompiledFlow>,
    entry: FlowEntry,
    state: FlowContextState,
    start: FlowStart,
) {
    let mut ctx = FlowContext::new(entry, env.providers.clone(), env.limits, state);
    let result = match start {
        FlowStart::Entry => flow.execute(flow.entry(), &mut ctx).await,
        FlowStart::NodeChildren(idx) => flow.execute_children(idx, &mut ctx).await,
        FlowStart::NodeHandle(idx, handle) => {
            flow.execute_children_by_handle(idx, &handle, &mut ctx).await
        }
    };

    if let Err(err) = result {
        tracing::debug!(
            app_id = %env.app_id,
            code = err.code(),
            "flow execution failed"
        );
        let entry = LogEntry {
            app_id: env.app_id.clone(),
            links: env.links.clone(),
            level: LogLevel::Error,
            message: err.trace_message(),
            created_at: Utc::now(),
        };
        if let Err(store_err) = env.logs.create_log_entry(entry).await {
            tracing::warn!(app_id = %env.app_id, error = %store_err, "failed to store log entry");
        }
    }

    let record = UsageRecord {
        app_id: env.app_id,
        links: env.links,
        credits_used: ctx.credits_used() as u32,
        created_at: Utc::now(),
    };
    if let Err(err) = env.usage.create_usage_record(record).await {
        tracing::warn!(error = %err, "failed to store usage record");
    }
}
