//! Persistence traits and row types.
//!
//! The engine is written against these narrow traits rather than a
//! database. Each trait carries only the queries the reconciliation loops
//! and the interpreter actually issue; integration tests (and the demo
//! binary) use in-memory implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::flow::data::{FlowData, LogLevel};
use crate::resume::{EntityLinks, ResumePoint};
use crate::thing::Thing;

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("not found")]
    #[diagnostic(code(flowcord::store::not_found))]
    NotFound,

    #[error("store operation failed: {0}")]
    #[diagnostic(code(flowcord::store::internal))]
    Internal(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// Rows

/// A tenant application: one Discord bot plus its flows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    pub id: String,
    pub name: String,
    pub discord_token: String,
    pub enabled: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub id: String,
    pub app_id: String,
    pub flow_source: FlowData,
    pub enabled: bool,
    pub updated_at: DateTime<Utc>,
    /// Null until the first deploy; compared against `updated_at` to decide
    /// whether the app has undeployed changes.
    #[serde(default)]
    pub last_deployed_at: Option<DateTime<Utc>>,
}

impl Command {
    pub fn has_undeployed_changes(&self) -> bool {
        match self.last_deployed_at {
            None => true,
            Some(deployed) => deployed < self.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventListener {
    pub id: String,
    pub app_id: String,
    pub flow_source: FlowData,
    pub enabled: bool,
    pub updated_at: DateTime<Utc>,
}

/// A message the engine posted on behalf of an app, with the component
/// flows wired to its buttons. Resolved when a button press carries no
/// `resume:` custom ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageInstance {
    pub id: i64,
    pub app_id: String,
    pub channel_id: String,
    pub message_id: String,
    /// Component custom ID to flow document.
    #[serde(default)]
    pub flow_sources: FxHashMap<String, FlowData>,
}

/// Tenant-visible log line, shown in the app dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub app_id: String,
    #[serde(default)]
    pub links: EntityLinks,
    pub level: LogLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// One billed flow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub app_id: String,
    #[serde(default)]
    pub links: EntityLinks,
    pub credits_used: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub id: String,
    pub app_id: String,
    #[serde(default)]
    pub scope: Option<String>,
    pub value: Thing,
    pub updated_at: DateTime<Utc>,
}

/// A purchased perk that grants a guild role while active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entitlement {
    pub id: String,
    pub app_id: String,
    pub guild_id: String,
    pub user_id: String,
    pub role_id: String,
    #[serde(default)]
    pub granted: bool,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
}

// Stores

#[async_trait]
pub trait AppStore: Send + Sync {
    async fn app(&self, app_id: &str) -> StoreResult<App>;
    async fn enabled_app_ids(&self) -> StoreResult<Vec<String>>;
    async fn enabled_apps_updated_since(
        &self,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<App>>;
}

#[async_trait]
pub trait CommandStore: Send + Sync {
    async fn command(&self, command_id: &str) -> StoreResult<Command>;
    async fn enabled_command_ids(&self, app_id: &str) -> StoreResult<Vec<String>>;
    async fn enabled_commands_updated_since(
        &self,
        app_id: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<Command>>;
    /// Stamps every enabled command of the app after a successful deploy.
    async fn update_commands_last_deployed_at(
        &self,
        app_id: &str,
        deployed_at: DateTime<Utc>,
    ) -> StoreResult<()>;
}

#[async_trait]
pub trait EventListenerStore: Send + Sync {
    async fn enabled_event_listener_ids(&self, app_id: &str) -> StoreResult<Vec<String>>;
    async fn enabled_event_listeners_updated_since(
        &self,
        app_id: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<EventListener>>;
}

#[async_trait]
pub trait MessageInstanceStore: Send + Sync {
    async fn message_instance(&self, app_id: &str, id: i64) -> StoreResult<MessageInstance>;
    async fn message_instance_by_message_id(
        &self,
        app_id: &str,
        message_id: &str,
    ) -> StoreResult<MessageInstance>;
}

#[async_trait]
pub trait ResumePointStore: Send + Sync {
    async fn create_resume_point(&self, point: ResumePoint) -> StoreResult<()>;
    async fn resume_point(&self, id: &str) -> StoreResult<ResumePoint>;
    async fn delete_resume_point(&self, id: &str) -> StoreResult<()>;
    /// Removes every point with an `expires_at` in the past. Points without
    /// an expiry are never swept; they die with their message instance.
    async fn delete_expired_resume_points(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}

#[async_trait]
pub trait LogStore: Send + Sync {
    async fn create_log_entry(&self, entry: LogEntry) -> StoreResult<()>;
}

#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn create_usage_record(&self, record: UsageRecord) -> StoreResult<()>;
}

#[async_trait]
pub trait VariableStore: Send + Sync {
    async fn variable(
        &self,
        app_id: &str,
        id: &str,
        scope: Option<&str>,
    ) -> StoreResult<Variable>;
    async fn set_variable(
        &self,
        app_id: &str,
        id: &str,
        scope: Option<&str>,
        value: Thing,
    ) -> StoreResult<()>;
    async fn delete_variable(
        &self,
        app_id: &str,
        id: &str,
        scope: Option<&str>,
    ) -> StoreResult<()>;
}

#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Entitlements that are active but whose role grant hasn't happened.
    async fn due_role_grants(&self, now: DateTime<Utc>) -> StoreResult<Vec<Entitlement>>;
    async fn mark_role_granted(&self, entitlement_id: &str) -> StoreResult<()>;
}
