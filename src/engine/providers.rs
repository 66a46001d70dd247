//! Store-backed provider implementations.
//!
//! The interpreter talks to [`crate::flow::provider`] traits; these
//! adapters close over the invoking app and entity so a flow can only ever
//! touch its own rows.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::flow::data::LogLevel;
use crate::flow::provider::{
    LogProvider, ProviderError, ResumePointProvider, VariableProvider,
};
use crate::flow::state::FlowContextState;
use crate::resume::{EntityLinks, ResumePoint, ResumePointKind};
use crate::store::{LogEntry, LogStore, ResumePointStore, StoreError, VariableStore};
use crate::thing::Thing;

pub struct StoreVariableProvider {
    app_id: String,
    variables: Arc<dyn VariableStore>,
}

impl StoreVariableProvider {
    pub fn new(app_id: String, variables: Arc<dyn VariableStore>) -> Self {
        Self { app_id, variables }
    }
}

#[async_trait]
impl VariableProvider for StoreVariableProvider {
    async fn variable(&self, id: &str, scope: Option<&str>) -> Result<Thing, ProviderError> {
        match self.variables.variable(&self.app_id, id, scope).await {
            Ok(row) => Ok(row.value),
            Err(StoreError::NotFound) => Err(ProviderError::NotFound),
            Err(err) => Err(ProviderError::Variable(err.to_string())),
        }
    }

    async fn set_variable(
        &self,
        id: &str,
        scope: Option<&str>,
        value: Thing,
    ) -> Result<(), ProviderError> {
        self.variables
            .set_variable(&self.app_id, id, scope, value)
            .await
            .map_err(|err| ProviderError::Variable(err.to_string()))
    }

    async fn delete_variable(&self, id: &str, scope: Option<&str>) -> Result<(), ProviderError> {
        match self.variables.delete_variable(&self.app_id, id, scope).await {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound) => Err(ProviderError::NotFound),
            Err(err) => Err(ProviderError::Variable(err.to_string())),
        }
    }
}

/// Tenant log sink. Write failures are swallowed after a warning; losing a
/// dashboard line must not fail the flow that produced it.
pub struct StoreLogProvider {
    app_id: String,
    links: EntityLinks,
    logs: Arc<dyn LogStore>,
}

impl StoreLogProvider {
    pub fn new(app_id: String, links: EntityLinks, logs: Arc<dyn LogStore>) -> Self {
        Self {
            app_id,
            links,
            logs,
        }
    }
}

#[async_trait]
impl LogProvider for StoreLogProvider {
    async fn create_log_entry(&self, level: LogLevel, message: String) {
        let entry = LogEntry {
            app_id: self.app_id.clone(),
            links: self.links.clone(),
            level,
            message,
            created_at: Utc::now(),
        };
        if let Err(err) = self.logs.create_log_entry(entry).await {
            tracing::warn!(app_id = %self.app_id, error = %err, "failed to store log entry");
        }
    }
}

pub struct StoreResumePointProvider {
    app_id: String,
    links: EntityLinks,
    resume_points: Arc<dyn ResumePointStore>,
}

impl StoreResumePointProvider {
    pub fn new(
        app_id: String,
        links: EntityLinks,
        resume_points: Arc<dyn ResumePointStore>,
    ) -> Self {
        Self {
            app_id,
            links,
            resume_points,
        }
    }
}

#[async_trait]
impl ResumePointProvider for StoreResumePointProvider {
    async fn create_resume_point(
        &self,
        kind: ResumePointKind,
        flow_node_id: &str,
        state: FlowContextState,
    ) -> Result<ResumePoint, ProviderError> {
        let point = ResumePoint::new(
            kind,
            self.app_id.clone(),
            self.links.clone(),
            flow_node_id,
            state,
        );
        self.resume_points
            .create_resume_point(point.clone())
            .await
            .map_err(|err| ProviderError::ResumePoint(err.to_string()))?;
        Ok(point)
    }
}
