//! Flow compilation: editor documents to immutable executable graphs.
//!
//! Compilation is a pure function of the document. The result is an arena
//! of nodes with bidirectional adjacency, wrapped in `Arc` by callers and
//! shared read-only between concurrent invocations; all mutable execution
//! state lives in the per-invocation context.

use rustc_hash::FxHashMap;

use crate::model::{CommandOptionSpec, CommandOptionType, CommandSpec};

use super::data::{CommandArgumentType, FlowData, FlowNodeData, FlowNodeType};
use super::error::FlowError;

pub type NodeIdx = usize;

/// Default child handle; edges without a `source_handle` land here.
pub const DEFAULT_HANDLE: &str = "default";

#[derive(Debug, Clone)]
pub struct CompiledNode {
    pub id: String,
    pub node_type: FlowNodeType,
    pub data: FlowNodeData,
    pub children: Vec<NodeIdx>,
    pub child_handles: FxHashMap<String, Vec<NodeIdx>>,
    pub parents: Vec<NodeIdx>,
}

#[derive(Debug, Clone)]
pub struct CompiledFlow {
    nodes: Vec<CompiledNode>,
    index: FxHashMap<String, NodeIdx>,
    entry: NodeIdx,
}

/// Compile a flow that starts from a command entry node.
pub fn compile_command(data: &FlowData) -> Result<CompiledFlow, FlowError> {
    compile(data, FlowNodeType::EntryCommand)
}

/// Compile a flow that starts from an event entry node.
pub fn compile_event_listener(data: &FlowData) -> Result<CompiledFlow, FlowError> {
    compile(data, FlowNodeType::EntryEvent)
}

/// Compile a flow that starts from a message component entry node.
pub fn compile_component_button(data: &FlowData) -> Result<CompiledFlow, FlowError> {
    compile(data, FlowNodeType::EntryComponentButton)
}

pub fn compile(data: &FlowData, entry_type: FlowNodeType) -> Result<CompiledFlow, FlowError> {
    let mut nodes: Vec<CompiledNode> = Vec::with_capacity(data.nodes.len());
    let mut index: FxHashMap<String, NodeIdx> = FxHashMap::default();

    for node in &data.nodes {
        index.insert(node.id.clone(), nodes.len());
        nodes.push(CompiledNode {
            id: node.id.clone(),
            node_type: node.node_type,
            data: node.data.clone(),
            children: Vec::new(),
            child_handles: FxHashMap::default(),
            parents: Vec::new(),
        });
    }

    for edge in &data.edges {
        // Edges referencing unknown nodes are leftovers from editor
        // deletions; skip them rather than failing the whole flow.
        let (Some(&source), Some(&target)) = (index.get(&edge.source), index.get(&edge.target))
        else {
            tracing::debug!(edge_id = %edge.id, "skipping dangling edge");
            continue;
        };

        match edge.source_handle.as_deref() {
            None | Some(DEFAULT_HANDLE) | Some("") => nodes[source].children.push(target),
            Some(handle) => nodes[source]
                .child_handles
                .entry(handle.to_owned())
                .or_default()
                .push(target),
        }
        nodes[target].parents.push(source);
    }

    let entry = nodes
        .iter()
        .position(|n| n.node_type == entry_type)
        .ok_or(FlowError::EntryNodeNotFound)?;

    check_acyclic(&nodes)?;

    Ok(CompiledFlow {
        nodes,
        index,
        entry,
    })
}

/// DFS cycle detection over default and handle edges. Runaway recursion is
/// also bounded at runtime by the stack budget, but a cyclic document is a
/// defect worth rejecting before anything executes.
fn check_acyclic(nodes: &[CompiledNode]) -> Result<(), FlowError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    fn visit(nodes: &[CompiledNode], marks: &mut [Mark], idx: NodeIdx) -> Result<(), FlowError> {
        match marks[idx] {
            Mark::Done => return Ok(()),
            Mark::InProgress => {
                return Err(FlowError::CyclicFlow {
                    node_id: nodes[idx].id.clone(),
                });
            }
            Mark::Unvisited => {}
        }
        marks[idx] = Mark::InProgress;
        for &child in nodes[idx]
            .children
            .iter()
            .chain(nodes[idx].child_handles.values().flatten())
        {
            visit(nodes, marks, child)?;
        }
        marks[idx] = Mark::Done;
        Ok(())
    }

    let mut marks = vec![Mark::Unvisited; nodes.len()];
    for idx in 0..nodes.len() {
        visit(nodes, &mut marks, idx)?;
    }
    Ok(())
}

impl CompiledFlow {
    pub fn entry(&self) -> NodeIdx {
        self.entry
    }

    pub fn node(&self, idx: NodeIdx) -> &CompiledNode {
        &self.nodes[idx]
    }

    pub fn nodes(&self) -> &[CompiledNode] {
        &self.nodes
    }

    pub fn node_by_id(&self, id: &str) -> Option<NodeIdx> {
        self.index.get(id).copied()
    }

    pub fn find_direct_child_with_type(
        &self,
        idx: NodeIdx,
        node_type: FlowNodeType,
    ) -> Option<NodeIdx> {
        self.nodes[idx]
            .children
            .iter()
            .copied()
            .find(|&c| self.nodes[c].node_type == node_type)
    }

    pub fn find_direct_parent_with_type(
        &self,
        idx: NodeIdx,
        node_type: FlowNodeType,
    ) -> Option<NodeIdx> {
        self.nodes[idx]
            .parents
            .iter()
            .copied()
            .find(|&p| self.nodes[p].node_type == node_type)
    }

    pub fn direct_parents_with_type(
        &self,
        idx: NodeIdx,
        node_type: FlowNodeType,
    ) -> Vec<NodeIdx> {
        self.nodes[idx]
            .parents
            .iter()
            .copied()
            .filter(|&p| self.nodes[p].node_type == node_type)
            .collect()
    }

    /// All transitive ancestors of the given type, nearest first. Used for
    /// loop-exit propagation.
    pub fn ancestors_with_type(&self, idx: NodeIdx, node_type: FlowNodeType) -> Vec<NodeIdx> {
        let mut out = Vec::new();
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![idx];
        while let Some(current) = stack.pop() {
            for &parent in &self.nodes[current].parents {
                if visited[parent] {
                    continue;
                }
                visited[parent] = true;
                if self.nodes[parent].node_type == node_type {
                    out.push(parent);
                }
                stack.push(parent);
            }
        }
        out
    }

    // Command metadata, derived from the entry node and its option parents.

    /// Full space-separated command name from the entry node.
    pub fn command_name(&self) -> String {
        self.nodes[self.entry]
            .data
            .name
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_owned()
    }

    pub fn command_description(&self) -> String {
        self.nodes[self.entry]
            .data
            .description
            .clone()
            .unwrap_or_else(|| "No description".to_owned())
    }

    pub fn command_permissions(&self) -> Option<String> {
        let option = self
            .find_direct_parent_with_type(self.entry, FlowNodeType::OptionCommandPermissions)?;
        self.nodes[option].data.command_permissions.clone()
    }

    pub fn command_contexts(&self) -> Vec<String> {
        self.find_direct_parent_with_type(self.entry, FlowNodeType::OptionCommandContexts)
            .map(|option| self.nodes[option].data.command_contexts.clone())
            .unwrap_or_default()
    }

    fn command_arguments(&self) -> Vec<CommandOptionSpec> {
        self.direct_parents_with_type(self.entry, FlowNodeType::OptionCommandArgument)
            .into_iter()
            .map(|idx| {
                let data = &self.nodes[idx].data;
                CommandOptionSpec {
                    kind: argument_option_type(
                        data.command_argument_type.unwrap_or_default(),
                    ),
                    name: data.name.clone().unwrap_or_default(),
                    description: data.description.clone().unwrap_or_default(),
                    required: data.command_argument_required.unwrap_or(false),
                    options: Vec::new(),
                }
            })
            .collect()
    }

    /// Registration data for deployment. Multi-segment names nest through
    /// subcommand and subcommand-group options.
    pub fn command_spec(&self) -> CommandSpec {
        let full_name = self.command_name();
        let segments: Vec<&str> = full_name.split(' ').filter(|s| !s.is_empty()).collect();
        let arguments = self.command_arguments();
        let description = self.command_description();

        let (name, options) = match segments.as_slice() {
            [] | [_] => (full_name.clone(), arguments),
            [root, sub] => (
                (*root).to_owned(),
                vec![CommandOptionSpec {
                    kind: CommandOptionType::SubCommand,
                    name: (*sub).to_owned(),
                    description: description.clone(),
                    required: false,
                    options: arguments,
                }],
            ),
            [root, group, sub, ..] => (
                (*root).to_owned(),
                vec![CommandOptionSpec {
                    kind: CommandOptionType::SubCommandGroup,
                    name: (*group).to_owned(),
                    description: description.clone(),
                    required: false,
                    options: vec![CommandOptionSpec {
                        kind: CommandOptionType::SubCommand,
                        name: (*sub).to_owned(),
                        description: description.clone(),
                        required: false,
                        options: arguments,
                    }],
                }],
            ),
        };

        CommandSpec {
            name,
            description,
            options,
            default_member_permissions: self.command_permissions(),
            contexts: self.command_contexts(),
        }
    }
}

fn argument_option_type(arg: CommandArgumentType) -> CommandOptionType {
    match arg {
        CommandArgumentType::String => CommandOptionType::String,
        CommandArgumentType::Integer => CommandOptionType::Integer,
        CommandArgumentType::Number => CommandOptionType::Number,
        CommandArgumentType::Boolean => CommandOptionType::Boolean,
        CommandArgumentType::User => CommandOptionType::User,
        CommandArgumentType::Channel => CommandOptionType::Channel,
        CommandArgumentType::Role => CommandOptionType::Role,
        CommandArgumentType::Attachment => CommandOptionType::Attachment,
    }
}
