//! Flow document model as produced by the visual editor.
//!
//! A flow is a flat list of typed nodes plus directed edges. Node payloads
//! live in [`FlowNodeData`], a single optional-field bag shared by every
//! node type; which fields matter depends on the type. Unknown fields are
//! ignored on decode so older engines can read newer documents.

use serde::{Deserialize, Serialize};

use crate::model::{MessageData, ModalData};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FlowData {
    #[serde(default)]
    pub nodes: Vec<FlowNode>,
    #[serde(default)]
    pub edges: Vec<FlowEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: FlowNodeType,
    #[serde(default)]
    pub data: FlowNodeData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    /// Distinguishes sibling branches, e.g. the `error` branch of an error
    /// handler or `component_<n>` wiring of message buttons.
    #[serde(default)]
    pub source_handle: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowNodeType {
    EntryCommand,
    EntryEvent,
    EntryComponentButton,

    OptionCommandArgument,
    OptionCommandPermissions,
    OptionCommandContexts,
    OptionEventFilter,

    ActionResponseCreate,
    ActionResponseEdit,
    ActionResponseDelete,
    ActionResponseDefer,
    ActionMessageCreate,
    ActionMessageEdit,
    ActionMessageDelete,
    ActionPrivateMessageCreate,
    ActionMemberBan,
    ActionMemberUnban,
    ActionMemberKick,
    ActionMemberTimeout,
    ActionMemberRoleAdd,
    ActionMemberRoleRemove,
    ActionMessageGet,
    ActionMemberGet,
    ActionUserGet,
    ActionChannelGet,
    ActionRoleGet,
    ActionGuildGet,
    ActionHttpRequest,
    ActionAiChatCompletion,
    ActionExpressionEvaluate,
    ActionRandomGenerate,
    ActionLog,
    ActionVariableSet,
    ActionVariableGet,
    ActionVariableDelete,

    ControlConditionCompare,
    ControlConditionItemCompare,
    ControlConditionItemElse,
    ControlErrorHandler,
    ControlLoop,
    ControlLoopEach,
    ControlLoopEnd,
    ControlLoopExit,
    ControlSleep,

    SuspendResponseModal,
}

impl FlowNodeType {
    pub fn as_str(self) -> &'static str {
        use FlowNodeType::*;
        match self {
            EntryCommand => "entry_command",
            EntryEvent => "entry_event",
            EntryComponentButton => "entry_component_button",
            OptionCommandArgument => "option_command_argument",
            OptionCommandPermissions => "option_command_permissions",
            OptionCommandContexts => "option_command_contexts",
            OptionEventFilter => "option_event_filter",
            ActionResponseCreate => "action_response_create",
            ActionResponseEdit => "action_response_edit",
            ActionResponseDelete => "action_response_delete",
            ActionResponseDefer => "action_response_defer",
            ActionMessageCreate => "action_message_create",
            ActionMessageEdit => "action_message_edit",
            ActionMessageDelete => "action_message_delete",
            ActionPrivateMessageCreate => "action_private_message_create",
            ActionMemberBan => "action_member_ban",
            ActionMemberUnban => "action_member_unban",
            ActionMemberKick => "action_member_kick",
            ActionMemberTimeout => "action_member_timeout",
            ActionMemberRoleAdd => "action_member_role_add",
            ActionMemberRoleRemove => "action_member_role_remove",
            ActionMessageGet => "action_message_get",
            ActionMemberGet => "action_member_get",
            ActionUserGet => "action_user_get",
            ActionChannelGet => "action_channel_get",
            ActionRoleGet => "action_role_get",
            ActionGuildGet => "action_guild_get",
            ActionHttpRequest => "action_http_request",
            ActionAiChatCompletion => "action_ai_chat_completion",
            ActionExpressionEvaluate => "action_expression_evaluate",
            ActionRandomGenerate => "action_random_generate",
            ActionLog => "action_log",
            ActionVariableSet => "action_variable_set",
            ActionVariableGet => "action_variable_get",
            ActionVariableDelete => "action_variable_delete",
            ControlConditionCompare => "control_condition_compare",
            ControlConditionItemCompare => "control_condition_item_compare",
            ControlConditionItemElse => "control_condition_item_else",
            ControlErrorHandler => "control_error_handler",
            ControlLoop => "control_loop",
            ControlLoopEach => "control_loop_each",
            ControlLoopEnd => "control_loop_end",
            ControlLoopExit => "control_loop_exit",
            ControlSleep => "control_sleep",
            SuspendResponseModal => "suspend_response_modal",
        }
    }

    pub fn is_entry(self) -> bool {
        matches!(
            self,
            FlowNodeType::EntryCommand
                | FlowNodeType::EntryEvent
                | FlowNodeType::EntryComponentButton
        )
    }

    pub fn is_action(self) -> bool {
        self.as_str().starts_with("action_")
    }

    pub fn is_option(self) -> bool {
        self.as_str().starts_with("option_")
    }
}

impl std::fmt::Display for FlowNodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flat optional-field payload shared by all node types. Fields that feed
/// through the placeholder engine stay strings until execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FlowNodeData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_label: Option<String>,

    // Command options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_argument_type: Option<CommandArgumentType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_argument_required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_permissions: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub command_contexts: Vec<String>,

    // Event entries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_filter_target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_filter_expression: Option<String>,

    // Messages and responses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_data: Option<MessageData>,
    /// Takes precedence over `message_data`; resolved through the message
    /// template provider at execution time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_template_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_ephemeral: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guild_target: Option<String>,

    // Moderation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_log_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_timeout_seconds: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_ban_delete_message_seconds: Option<String>,

    // HTTP / AI
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_request_data: Option<HttpRequestData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_chat_completion_data: Option<AiChatCompletionData>,

    // Expressions, randomness, logging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub random_min: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub random_max: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LogLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_message: Option<String>,

    // Variables
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable_scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable_operation: Option<VariableOperation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable_value: Option<String>,

    // Conditions, loops, sleep
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_base_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_allow_multiple: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_item_mode: Option<ComparisonMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_item_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loop_count: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sleep_duration_seconds: Option<String>,

    // Modals
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modal_data: Option<ModalData>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CommandArgumentType {
    #[default]
    String,
    Integer,
    Number,
    Boolean,
    User,
    Channel,
    Role,
    Attachment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonMode {
    Equal,
    NotEqual,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    Contains,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VariableOperation {
    #[default]
    Overwrite,
    Append,
    Increment,
    Decrement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct HttpRequestData {
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AiChatCompletionData {
    #[serde(default)]
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
}

/// Command names are 1-3 space-separated segments of `[-_a-z0-9]{1,32}`:
/// root, optional subcommand, optional subcommand group member.
pub fn is_valid_command_name(name: &str) -> bool {
    let segments: Vec<&str> = name.split(' ').collect();
    if segments.is_empty() || segments.len() > 3 {
        return false;
    }
    segments.iter().all(|segment| {
        !segment.is_empty()
            && segment.len() <= 32
            && segment
                .chars()
                .all(|c| c == '-' || c == '_' || c.is_ascii_lowercase() || c.is_ascii_digit())
    })
}
