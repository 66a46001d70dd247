//! In-memory implementations of every store trait, shared by the
//! integration tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use flowcord::engine::EngineStores;
use flowcord::resume::ResumePoint;
use flowcord::store::{
    App, AppStore, Command, CommandStore, Entitlement, EntitlementStore, EventListener,
    EventListenerStore, LogEntry, LogStore, MessageInstance, MessageInstanceStore,
    ResumePointStore, StoreError, StoreResult, UsageRecord, UsageStore, Variable, VariableStore,
};
use flowcord::thing::Thing;

#[derive(Default)]
pub struct MemoryStores {
    pub apps: Mutex<Vec<App>>,
    pub commands: Mutex<Vec<Command>>,
    pub listeners: Mutex<Vec<EventListener>>,
    pub message_instances: Mutex<Vec<MessageInstance>>,
    pub resume_points: Mutex<FxHashMap<String, ResumePoint>>,
    pub logs: Mutex<Vec<LogEntry>>,
    pub usage: Mutex<Vec<UsageRecord>>,
    pub variables: Mutex<Vec<Variable>>,
    pub entitlements: Mutex<Vec<Entitlement>>,
}

impl MemoryStores {
    pub fn engine_stores(self: &Arc<Self>) -> EngineStores {
        EngineStores {
            apps: self.clone(),
            commands: self.clone(),
            event_listeners: self.clone(),
            message_instances: self.clone(),
            resume_points: self.clone(),
            logs: self.clone(),
            usage: self.clone(),
            variables: self.clone(),
            entitlements: self.clone(),
        }
    }

    pub fn error_logs(&self) -> Vec<String> {
        self.logs
            .lock()
            .iter()
            .filter(|e| e.level == flowcord::flow::data::LogLevel::Error)
            .map(|e| e.message.clone())
            .collect()
    }
}

#[async_trait]
impl AppStore for MemoryStores {
    async fn app(&self, app_id: &str) -> StoreResult<App> {
        self.apps
            .lock()
            .iter()
            .find(|a| a.id == app_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn enabled_app_ids(&self) -> StoreResult<Vec<String>> {
        Ok(self
            .apps
            .lock()
            .iter()
            .filter(|a| a.enabled)
            .map(|a| a.id.clone())
            .collect())
    }

    async fn enabled_apps_updated_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<App>> {
        Ok(self
            .apps
            .lock()
            .iter()
            .filter(|a| a.enabled && a.updated_at > since)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CommandStore for MemoryStores {
    async fn command(&self, command_id: &str) -> StoreResult<Command> {
        self.commands
            .lock()
            .iter()
            .find(|c| c.id == command_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn enabled_command_ids(&self, app_id: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .commands
            .lock()
            .iter()
            .filter(|c| c.enabled && c.app_id == app_id)
            .map(|c| c.id.clone())
            .collect())
    }

    async fn enabled_commands_updated_since(
        &self,
        app_id: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<Command>> {
        Ok(self
            .commands
            .lock()
            .iter()
            .filter(|c| c.enabled && c.app_id == app_id && c.updated_at > since)
            .cloned()
            .collect())
    }

    async fn update_commands_last_deployed_at(
        &self,
        app_id: &str,
        deployed_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        for command in self.commands.lock().iter_mut() {
            if command.enabled && command.app_id == app_id {
                command.last_deployed_at = Some(deployed_at);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EventListenerStore for MemoryStores {
    async fn enabled_event_listener_ids(&self, app_id: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .listeners
            .lock()
            .iter()
            .filter(|l| l.enabled && l.app_id == app_id)
            .map(|l| l.id.clone())
            .collect())
    }

    async fn enabled_event_listeners_updated_since(
        &self,
        app_id: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<EventListener>> {
        Ok(self
            .listeners
            .lock()
            .iter()
            .filter(|l| l.enabled && l.app_id == app_id && l.updated_at > since)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MessageInstanceStore for MemoryStores {
    async fn message_instance(&self, app_id: &str, id: i64) -> StoreResult<MessageInstance> {
        self.message_instances
            .lock()
            .iter()
            .find(|m| m.app_id == app_id && m.id == id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn message_instance_by_message_id(
        &self,
        app_id: &str,
        message_id: &str,
    ) -> StoreResult<MessageInstance> {
        self.message_instances
            .lock()
            .iter()
            .find(|m| m.app_id == app_id && m.message_id == message_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl ResumePointStore for MemoryStores {
    async fn create_resume_point(&self, point: ResumePoint) -> StoreResult<()> {
        self.resume_points.lock().insert(point.id.clone(), point);
        Ok(())
    }

    async fn resume_point(&self, id: &str) -> StoreResult<ResumePoint> {
        self.resume_points
            .lock()
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn delete_resume_point(&self, id: &str) -> StoreResult<()> {
        self.resume_points
            .lock()
            .remove(id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn delete_expired_resume_points(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut points = self.resume_points.lock();
        let before = points.len();
        points.retain(|_, p| !p.is_expired(now));
        Ok((before - points.len()) as u64)
    }
}

#[async_trait]
impl LogStore for MemoryStores {
    async fn create_log_entry(&self, entry: LogEntry) -> StoreResult<()> {
        self.logs.lock().push(entry);
        Ok(())
    }
}

#[async_trait]
impl UsageStore for MemoryStores {
    async fn create_usage_record(&self, record: UsageRecord) -> StoreResult<()> {
        self.usage.lock().push(record);
        Ok(())
    }
}

#[async_trait]
impl VariableStore for MemoryStores {
    async fn variable(
        &self,
        app_id: &str,
        id: &str,
        scope: Option<&str>,
    ) -> StoreResult<Variable> {
        self.variables
            .lock()
            .iter()
            .find(|v| v.app_id == app_id && v.id == id && v.scope.as_deref() == scope)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn set_variable(
        &self,
        app_id: &str,
        id: &str,
        scope: Option<&str>,
        value: Thing,
    ) -> StoreResult<()> {
        let mut variables = self.variables.lock();
        if let Some(existing) = variables
            .iter_mut()
            .find(|v| v.app_id == app_id && v.id == id && v.scope.as_deref() == scope)
        {
            existing.value = value;
            existing.updated_at = Utc::now();
        } else {
            variables.push(Variable {
                id: id.to_owned(),
                app_id: app_id.to_owned(),
                scope: scope.map(str::to_owned),
                value,
                updated_at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn delete_variable(
        &self,
        app_id: &str,
        id: &str,
        scope: Option<&str>,
    ) -> StoreResult<()> {
        let mut variables = self.variables.lock();
        let before = variables.len();
        variables.retain(|v| !(v.app_id == app_id && v.id == id && v.scope.as_deref() == scope));
        if variables.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl EntitlementStore for MemoryStores {
    async fn due_role_grants(&self, now: DateTime<Utc>) -> StoreResult<Vec<Entitlement>> {
        Ok(self
            .entitlements
            .lock()
            .iter()
            .filter(|e| !e.granted && e.ends_at.is_none_or(|at| at > now))
            .cloned()
            .collect())
    }

    async fn mark_role_granted(&self, entitlement_id: &str) -> StoreResult<()> {
        let mut entitlements = self.entitlements.lock();
        let entitlement = entitlements
            .iter_mut()
            .find(|e| e.id == entitlement_id)
            .ok_or(StoreError::NotFound)?;
        entitlement.granted = true;
        Ok(())
    }
}
