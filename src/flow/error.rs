//! Error types surfaced by flow compilation and execution.

use miette::Diagnostic;
use thiserror::Error;

use super::provider::ProviderError;

/// Execution and compilation failures. Every error that escapes a node is
/// wrapped in [`FlowError::Node`] frames on the way out, so the top-level
/// message reads as a trace from entry to the failing node.
#[derive(Debug, Error, Diagnostic)]
pub enum FlowError {
    #[error("entry node not found")]
    #[diagnostic(code(flowcord::flow::entry_node_not_found))]
    EntryNodeNotFound,

    #[error("flow contains a cycle through node '{node_id}'")]
    #[diagnostic(
        code(flowcord::flow::cyclic_flow),
        help("flows must be acyclic; use a loop node for repetition")
    )]
    CyclicFlow { node_id: String },

    #[error("unknown node type: {node_type}")]
    #[diagnostic(code(flowcord::flow::unknown_node_type))]
    UnknownNodeType { node_type: String },

    #[error("max stack depth reached")]
    #[diagnostic(
        code(flowcord::flow::max_stack_depth_reached),
        help("the flow nests too deeply for its plan limits")
    )]
    MaxStackDepthReached,

    #[error("max operations reached")]
    #[diagnostic(code(flowcord::flow::max_operations_reached))]
    MaxOperationsReached,

    #[error("max credits reached")]
    #[diagnostic(code(flowcord::flow::max_credits_reached))]
    MaxCreditsReached,

    #[error("deadline exceeded")]
    #[diagnostic(code(flowcord::flow::deadline_exceeded))]
    DeadlineExceeded,

    #[error("node requires an interaction entry")]
    #[diagnostic(
        code(flowcord::flow::not_an_interaction),
        help("response and modal nodes only work in command and component flows")
    )]
    NotAnInteraction,

    #[error("node is missing required data: {field}")]
    #[diagnostic(code(flowcord::flow::missing_node_data))]
    MissingNodeData { field: &'static str },

    #[error("placeholder '{key}' failed: {message}")]
    #[diagnostic(code(flowcord::flow::placeholder))]
    Placeholder { key: String, message: String },

    #[error(transparent)]
    #[diagnostic(code(flowcord::flow::provider))]
    Provider(#[from] ProviderError),

    #[error("{}", Self::frame_label(.node_id, .node_type, .custom_label))]
    Node {
        node_id: String,
        node_type: String,
        custom_label: Option<String>,
        #[source]
        source: Box<FlowError>,
    },
}

impl FlowError {
    fn frame_label(node_id: &str, node_type: &str, custom_label: &Option<String>) -> String {
        match custom_label {
            Some(label) => format!("node '{label}' ({node_id}, {node_type}) failed"),
            None => format!("node {node_id} ({node_type}) failed"),
        }
    }

    /// Stable machine-readable code of the root cause, unwrapping trace
    /// frames. These codes end up in tenant-visible log entries.
    pub fn code(&self) -> &'static str {
        match self {
            FlowError::EntryNodeNotFound => "entry_node_not_found",
            FlowError::CyclicFlow { .. } => "cyclic_flow",
            FlowError::UnknownNodeType { .. } => "unknown_node_type",
            FlowError::MaxStackDepthReached => "max_stack_depth_reached",
            FlowError::MaxOperationsReached => "max_operations_reached",
            FlowError::MaxCreditsReached => "max_credits_reached",
            FlowError::DeadlineExceeded => "deadline_exceeded",
            FlowError::NotAnInteraction => "not_an_interaction",
            FlowError::MissingNodeData { .. } => "missing_node_data",
            FlowError::Placeholder { .. } => "placeholder",
            FlowError::Provider(_) => "provider",
            FlowError::Node { source, .. } => source.code(),
        }
    }

    /// Root cause with all trace frames stripped.
    pub fn root(&self) -> &FlowError {
        match self {
            FlowError::Node { source, .. } => source.root(),
            other => other,
        }
    }

    /// Full trace rendering, outermost frame first.
    pub fn trace_message(&self) -> String {
        let mut out = self.to_string();
        let mut source: &dyn std::error::Error = self;
        while let Some(cause) = source.source() {
            out.push_str(": ");
            out.push_str(&cause.to_string());
            source = cause;
        }
        out
    }
}
