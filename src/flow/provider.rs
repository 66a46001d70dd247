//! Capability providers consumed by the interpreter.
//!
//! Every outside effect a flow can cause goes through one of these narrow
//! traits. Production wires them to real Discord/HTTP/AI clients and the
//! database; tests wire in-memory fakes. The interpreter itself never
//! touches a socket.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use thiserror::Error;

use crate::flow::data::{HttpMethod, LogLevel};
use crate::flow::state::FlowContextState;
use crate::model::{
    Channel, CommandSpec, Guild, HttpResponse, Member, Message, MessageData, ModalData, Role,
    User,
};
use crate::resume::{ResumePoint, ResumePointKind};
use crate::thing::Thing;

#[derive(Debug, Error, Diagnostic)]
pub enum ProviderError {
    /// Lookup misses. Placeholder resolution maps this to an empty string;
    /// everywhere else it propagates.
    #[error("not found")]
    #[diagnostic(code(flowcord::provider::not_found))]
    NotFound,

    #[error("discord request failed: {0}")]
    #[diagnostic(code(flowcord::provider::discord))]
    Discord(String),

    #[error("http request failed: {0}")]
    #[diagnostic(code(flowcord::provider::http))]
    Http(String),

    #[error("ai request failed: {0}")]
    #[diagnostic(code(flowcord::provider::ai))]
    Ai(String),

    #[error("variable store failed: {0}")]
    #[diagnostic(code(flowcord::provider::variable))]
    Variable(String),

    #[error("message template failed: {0}")]
    #[diagnostic(code(flowcord::provider::message_template))]
    MessageTemplate(String),

    #[error("resume point store failed: {0}")]
    #[diagnostic(code(flowcord::provider::resume_point))]
    ResumePoint(String),

    #[error("expression evaluation failed: {0}")]
    #[diagnostic(code(flowcord::provider::eval))]
    Eval(String),
}

/// Payload of an interaction response.
#[derive(Debug, Clone, PartialEq)]
pub enum InteractionResponse {
    Message(MessageData),
    Defer { ephemeral: bool },
    Modal(ModalData),
}

#[async_trait]
pub trait DiscordProvider: Send + Sync {
    async fn guild(&self, guild_id: &str) -> Result<Guild, ProviderError>;
    async fn channel(&self, channel_id: &str) -> Result<Channel, ProviderError>;
    async fn user(&self, user_id: &str) -> Result<User, ProviderError>;
    async fn member(&self, guild_id: &str, user_id: &str) -> Result<Member, ProviderError>;
    async fn role(&self, guild_id: &str, role_id: &str) -> Result<Role, ProviderError>;
    async fn message(&self, channel_id: &str, message_id: &str) -> Result<Message, ProviderError>;

    async fn create_message(
        &self,
        channel_id: &str,
        data: MessageData,
    ) -> Result<Message, ProviderError>;
    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        data: MessageData,
    ) -> Result<Message, ProviderError>;
    async fn delete_message(
        &self,
        channel_id: &str,
        message_id: &str,
        reason: Option<String>,
    ) -> Result<(), ProviderError>;
    /// DM channel for a user, created on demand.
    async fn create_private_channel(&self, user_id: &str) -> Result<Channel, ProviderError>;

    async fn create_interaction_response(
        &self,
        interaction_id: &str,
        token: &str,
        response: InteractionResponse,
    ) -> Result<(), ProviderError>;
    async fn edit_interaction_response(
        &self,
        token: &str,
        data: MessageData,
    ) -> Result<Message, ProviderError>;
    async fn delete_interaction_response(&self, token: &str) -> Result<(), ProviderError>;
    async fn create_interaction_followup(
        &self,
        token: &str,
        data: MessageData,
    ) -> Result<Message, ProviderError>;
    /// Whether an initial response (or defer) was already sent for the
    /// interaction token. Drives the create-vs-followup decision.
    async fn has_created_interaction_response(&self, token: &str) -> bool;

    async fn ban_member(
        &self,
        guild_id: &str,
        user_id: &str,
        delete_message_seconds: u32,
        reason: Option<String>,
    ) -> Result<(), ProviderError>;
    async fn unban_member(
        &self,
        guild_id: &str,
        user_id: &str,
        reason: Option<String>,
    ) -> Result<(), ProviderError>;
    async fn kick_member(
        &self,
        guild_id: &str,
        user_id: &str,
        reason: Option<String>,
    ) -> Result<(), ProviderError>;
    async fn timeout_member(
        &self,
        guild_id: &str,
        user_id: &str,
        until: DateTime<Utc>,
        reason: Option<String>,
    ) -> Result<(), ProviderError>;
    async fn add_member_role(
        &self,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
        reason: Option<String>,
    ) -> Result<(), ProviderError>;
    async fn remove_member_role(
        &self,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
        reason: Option<String>,
    ) -> Result<(), ProviderError>;

    /// Replaces the full upstream command set for the app.
    async fn bulk_overwrite_commands(
        &self,
        commands: Vec<CommandSpec>,
    ) -> Result<(), ProviderError>;
}

/// Concrete HTTP request after placeholder filling.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

#[async_trait]
pub trait HttpProvider: Send + Sync {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, ProviderError>;
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatCompletionParams {
    pub model: String,
    pub system_prompt: Option<String>,
    pub prompt: String,
    pub max_completion_tokens: Option<u32>,
}

#[async_trait]
pub trait AiProvider: Send + Sync {
    async fn chat_completion(
        &self,
        params: ChatCompletionParams,
    ) -> Result<String, ProviderError>;
}

/// Tenant-visible log sink (ends up in the dashboard, not in tracing).
/// Sinks swallow their own failures; a broken log store must not break a
/// running flow.
#[async_trait]
pub trait LogProvider: Send + Sync {
    async fn create_log_entry(&self, level: LogLevel, message: String);
}

#[async_trait]
pub trait VariableProvider: Send + Sync {
    async fn variable(&self, id: &str, scope: Option<&str>) -> Result<Thing, ProviderError>;
    async fn set_variable(
        &self,
        id: &str,
        scope: Option<&str>,
        value: Thing,
    ) -> Result<(), ProviderError>;
    async fn delete_variable(&self, id: &str, scope: Option<&str>) -> Result<(), ProviderError>;
}

#[async_trait]
pub trait MessageTemplateProvider: Send + Sync {
    async fn message_data(&self, template_id: &str) -> Result<MessageData, ProviderError>;
}

#[async_trait]
pub trait ResumePointProvider: Send + Sync {
    /// Persists a resume point owned by the current invocation's entity.
    async fn create_resume_point(
        &self,
        kind: ResumePointKind,
        flow_node_id: &str,
        state: FlowContextState,
    ) -> Result<ResumePoint, ProviderError>;
}

/// Pluggable "evaluate an expression against the invocation environment"
/// capability backing `action_expression_evaluate` and event filters.
#[async_trait]
pub trait EvalProvider: Send + Sync {
    async fn evaluate(&self, expression: &str) -> Result<Thing, ProviderError>;
}

/// Bundle handed to the execution context. Cheap to clone.
#[derive(Clone)]
pub struct FlowProviders {
    pub discord: Arc<dyn DiscordProvider>,
    pub http: Arc<dyn HttpProvider>,
    pub ai: Arc<dyn AiProvider>,
    pub log: Arc<dyn LogProvider>,
    pub variable: Arc<dyn VariableProvider>,
    pub message_template: Arc<dyn MessageTemplateProvider>,
    pub resume_point: Arc<dyn ResumePointProvider>,
    pub eval: Arc<dyn EvalProvider>,
}
