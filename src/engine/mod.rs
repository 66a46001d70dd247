//! Reconciliation runtime.
//!
//! The engine keeps an in-memory supervisor per enabled app, continuously
//! synced against storage, and routes gateway events into compiled flows:
//!
//! - a fast populate tick mirrors enabled apps/commands/listeners into
//!   supervisors, recompiling changed flows;
//! - a slower deploy tick pushes merged command registrations upstream for
//!   apps with undeployed changes;
//! - a maintenance tick sweeps expired resume points and processes due
//!   entitlement role grants.
//!
//! Events arrive over a flume channel from the gateway layer; every
//! invocation runs on its own task so one slow flow never stalls routing.

pub mod app;
pub mod command;
pub mod deploy;
pub mod providers;

use std::collections::hash_map::Entry;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::flow::compile::{compile_component_button, CompiledFlow};
use crate::flow::context::{FlowContextLimits, FlowEntry};
use crate::flow::data::LogLevel;
use crate::flow::error::FlowError;
use crate::flow::provider::{
    AiProvider, DiscordProvider, EvalProvider, FlowProviders, HttpProvider,
    MessageTemplateProvider,
};
use crate::flow::state::FlowContextState;
use crate::gateway::EventSender;
use crate::model::{GatewayEvent, Interaction, InteractionData};
use crate::resume::{parse_custom_id, EntityLinks, ResumeTarget};
use crate::store::{
    App, AppStore, CommandStore, EntitlementStore, EventListenerStore, LogEntry, LogStore,
    MessageInstanceStore, ResumePointStore, StoreError, UsageStore, VariableStore,
};
use crate::utils::parse_env;

use app::AppSupervisor;
use command::{run_flow, ExecutionEnv, FlowStart};
use deploy::{merge_commands, validate_command_names};
use providers::{StoreLogProvider, StoreResumePointProvider, StoreVariableProvider};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Flow(#[from] FlowError),
}

// Manual transparent forwarding: the derive's `#[diagnostic(transparent)]`
// expansion calls `.code()` unqualified, which resolves to the inherent
// `FlowError::code` instead of `Diagnostic::code` and fails to type-check.
impl Diagnostic for EngineError {
    fn code(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        match self {
            EngineError::Store(err) => Diagnostic::code(err),
            EngineError::Flow(err) => Diagnostic::code(err),
        }
    }

    fn severity(&self) -> Option<miette::Severity> {
        match self {
            EngineError::Store(err) => err.severity(),
            EngineError::Flow(err) => err.severity(),
        }
    }

    fn help(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        match self {
            EngineError::Store(err) => err.help(),
            EngineError::Flow(err) => err.help(),
        }
    }

    fn url(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        match self {
            EngineError::Store(err) => err.url(),
            EngineError::Flow(err) => err.url(),
        }
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        match self {
            EngineError::Store(err) => err.source_code(),
            EngineError::Flow(err) => err.source_code(),
        }
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + '_>> {
        match self {
            EngineError::Store(err) => err.labels(),
            EngineError::Flow(err) => err.labels(),
        }
    }

    fn related(&self) -> Option<Box<dyn Iterator<Item = &dyn Diagnostic> + '_>> {
        match self {
            EngineError::Store(err) => err.related(),
            EngineError::Flow(err) => err.related(),
        }
    }

    fn diagnostic_source(&self) -> Option<&dyn Diagnostic> {
        match self {
            EngineError::Store(err) => err.diagnostic_source(),
            EngineError::Flow(err) => err.diagnostic_source(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub populate_interval: Duration,
    pub deploy_interval: Duration,
    pub maintenance_interval: Duration,
    /// Budgets applied to every invocation; zero fields are unlimited.
    pub limits: FlowContextLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            populate_interval: Duration::from_secs(1),
            deploy_interval: Duration::from_secs(60),
            maintenance_interval: Duration::from_secs(600),
            limits: FlowContextLimits::unlimited(),
        }
    }
}

impl EngineConfig {
    /// Reads overrides from the environment (and a `.env` file if present).
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = EngineConfig::default();
        EngineConfig {
            populate_interval: Duration::from_secs(parse_env(
                "FLOWCORD_POPULATE_INTERVAL_SECS",
                defaults.populate_interval.as_secs(),
            )),
            deploy_interval: Duration::from_secs(parse_env(
                "FLOWCORD_DEPLOY_INTERVAL_SECS",
                defaults.deploy_interval.as_secs(),
            )),
            maintenance_interval: Duration::from_secs(parse_env(
                "FLOWCORD_MAINTENANCE_INTERVAL_SECS",
                defaults.maintenance_interval.as_secs(),
            )),
            limits: FlowContextLimits {
                max_stack_depth: parse_env("FLOWCORD_MAX_STACK_DEPTH", 0),
                max_operations: parse_env("FLOWCORD_MAX_OPERATIONS", 0),
                max_credits: parse_env("FLOWCORD_MAX_CREDITS", 0),
            },
        }
    }
}

/// Store handles the engine runs against.
#[derive(Clone)]
pub struct EngineStores {
    pub apps: Arc<dyn AppStore>,
    pub commands: Arc<dyn CommandStore>,
    pub event_listeners: Arc<dyn EventListenerStore>,
    pub message_instances: Arc<dyn MessageInstanceStore>,
    pub resume_points: Arc<dyn ResumePointStore>,
    pub logs: Arc<dyn LogStore>,
    pub usage: Arc<dyn UsageStore>,
    pub variables: Arc<dyn VariableStore>,
    pub entitlements: Arc<dyn EntitlementStore>,
}

/// Produces the outward-facing providers for an app. The store-backed
/// providers (logs, variables, resume points) are assembled by the engine
/// itself.
pub trait ProviderFactory: Send + Sync {
    fn discord(&self, app: &App) -> Arc<dyn DiscordProvider>;
    fn http(&self, app: &App) -> Arc<dyn HttpProvider>;
    fn ai(&self, app: &App) -> Arc<dyn AiProvider>;
    fn eval(&self, app: &App) -> Arc<dyn EvalProvider>;
    fn message_template(&self, app: &App) -> Arc<dyn MessageTemplateProvider>;
}

pub struct Engine {
    config: EngineConfig,
    stores: EngineStores,
    factory: Arc<dyn ProviderFactory>,
    apps: Mutex<FxHashMap<String, AppSupervisor>>,
    events_tx: EventSender,
    events_rx: flume::Receiver<(String, GatewayEvent)>,
    last_update: Mutex<DateTime<Utc>>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        stores: EngineStores,
        factory: Arc<dyn ProviderFactory>,
    ) -> Self {
        let (events_tx, events_rx) = flume::unbounded();
        Engine {
            config,
            stores,
            factory,
            apps: Mutex::new(FxHashMap::default()),
            events_tx,
            events_rx,
            last_update: Mutex::new(DateTime::<Utc>::MIN_UTC),
        }
    }

    /// Sender side of the event channel, handed to gateway connections.
    pub fn event_sender(&self) -> EventSender {
        self.events_tx.clone()
    }

    pub async fn run(self: Arc<Self>) {
        let mut populate = interval(self.config.populate_interval);
        let mut deploy = interval(self.config.deploy_interval);
        let mut maintenance = interval(self.config.maintenance_interval);
        for ticker in [&mut populate, &mut deploy, &mut maintenance] {
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        loop {
            tokio::select! {
                _ = populate.tick() => {
                    if let Err(err) = self.populate().await {
                        tracing::error!(error = %err, "populate pass failed");
                    }
                }
                _ = deploy.tick() => self.deploy_pending().await,
                _ = maintenance.tick() => self.run_maintenance().await,
                event = self.events_rx.recv_async() => match event {
                    Ok((app_id, event)) => self.dispatch(app_id, event),
                    // All gateway senders dropped; nothing left to route.
                    Err(_) => break,
                },
            }
        }
    }

    // Reconciliation

    /// One populate pass: sync supervisors with enabled apps, then sync
    /// each supervisor's commands and listeners with storage.
    pub async fn populate(&self) -> Result<(), StoreError> {
        // Snapshot-then-stamp: an update racing the queries below is picked
        // up again on the next pass rather than lost.
        let since = {
            let mut last_update = self.last_update.lock();
            std::mem::replace(&mut *last_update, Utc::now())
        };

        let enabled = self.stores.apps.enabled_app_ids().await?;
        self.apps.lock().retain(|id, _| {
            let keep = enabled.contains(id);
            if !keep {
                tracing::info!(app_id = %id, "removing supervisor for disabled app");
            }
            keep
        });

        for app in self.stores.apps.enabled_apps_updated_since(since).await? {
            let mut apps = self.apps.lock();
            match apps.entry(app.id.clone()) {
                Entry::Occupied(mut entry) => entry.get_mut().update_app(app),
                Entry::Vacant(entry) => {
                    tracing::info!(app_id = %entry.key(), "creating app supervisor");
                    entry.insert(AppSupervisor::new(app));
                }
            }
        }

        let app_ids: Vec<String> = self.apps.lock().keys().cloned().collect();
        for app_id in app_ids {
            let command_ids = self.stores.commands.enabled_command_ids(&app_id).await?;
            let changed_commands = self
                .stores
                .commands
                .enabled_commands_updated_since(&app_id, since)
                .await?;
            let listener_ids = self
                .stores
                .event_listeners
                .enabled_event_listener_ids(&app_id)
                .await?;
            let changed_listeners = self
                .stores
                .event_listeners
                .enabled_event_listeners_updated_since(&app_id, since)
                .await?;

            let mut apps = self.apps.lock();
            let Some(supervisor) = apps.get_mut(&app_id) else {
                continue;
            };
            supervisor.retain_commands(&command_ids);
            supervisor.retain_listeners(&listener_ids);
            for command in &changed_commands {
                if let Err(err) = supervisor.upsert_command(command) {
                    tracing::warn!(
                        app_id = %app_id,
                        command_id = %command.id,
                        error = %err,
                        "command flow failed to compile"
                    );
                }
            }
            for listener in &changed_listeners {
                if let Err(err) = supervisor.upsert_listener(listener) {
                    tracing::warn!(
                        app_id = %app_id,
                        listener_id = %listener.id,
                        error = %err,
                        "event listener flow failed to compile"
                    );
                }
            }
        }
        Ok(())
    }

    /// Deploys merged command registrations for every app flagged with
    /// undeployed changes. Validation failures surface as tenant log
    /// entries and leave the flag set.
    pub async fn deploy_pending(&self) {
        let pending: Vec<(App, Vec<command::CompiledCommand>)> = self
            .apps
            .lock()
            .values()
            .filter(|s| s.has_undeployed_changes)
            .map(|s| (s.app.clone(), s.commands().cloned().collect()))
            .collect();

        for (app, commands) in pending {
            let started_at = Utc::now();
            let names: Vec<String> = commands.iter().map(|c| c.name.clone()).collect();

            if let Err(err) = validate_command_names(&names) {
                tracing::debug!(app_id = %app.id, error = %err, "command set rejected");
                self.tenant_log(
                    &app.id,
                    EntityLinks::default(),
                    LogLevel::Error,
                    format!("command deploy failed: {err}"),
                )
                .await;
                continue;
            }

            let merged =
                merge_commands(commands.iter().map(|c| c.flow.command_spec()).collect());
            let discord = self.factory.discord(&app);
            match discord.bulk_overwrite_commands(merged).await {
                Ok(()) => {
                    if let Err(err) = self
                        .stores
                        .commands
                        .update_commands_last_deployed_at(&app.id, started_at)
                        .await
                    {
                        tracing::warn!(app_id = %app.id, error = %err, "failed to stamp deploy time");
                    }
                    if let Some(supervisor) = self.apps.lock().get_mut(&app.id) {
                        supervisor.has_undeployed_changes = false;
                    }
                    tracing::info!(app_id = %app.id, commands = names.len(), "deployed commands");
                }
                Err(err) => {
                    tracing::warn!(app_id = %app.id, error = %err, "command deploy failed");
                }
            }
        }
    }

    /// Sweeps expired resume points and grants due entitlement roles.
    pub async fn run_maintenance(&self) {
        match self
            .stores
            .resume_points
            .delete_expired_resume_points(Utc::now())
            .await
        {
            Ok(0) => {}
            Ok(swept) => tracing::info!(swept, "deleted expired resume points"),
            Err(err) => tracing::error!(error = %err, "resume point sweep failed"),
        }

        let grants = match self.stores.entitlements.due_role_grants(Utc::now()).await {
            Ok(grants) => grants,
            Err(err) => {
                tracing::error!(error = %err, "entitlement query failed");
                return;
            }
        };
        for grant in grants {
            let app = match self.stores.apps.app(&grant.app_id).await {
                Ok(app) => app,
                Err(err) => {
                    tracing::warn!(app_id = %grant.app_id, error = %err, "entitlement app lookup failed");
                    continue;
                }
            };
            let discord = self.factory.discord(&app);
            match discord
                .add_member_role(
                    &grant.guild_id,
                    &grant.user_id,
                    &grant.role_id,
                    Some("Entitlement role grant".to_owned()),
                )
                .await
            {
                Ok(()) => {
                    if let Err(err) = self
                        .stores
                        .entitlements
                        .mark_role_granted(&grant.id)
                        .await
                    {
                        tracing::warn!(entitlement_id = %grant.id, error = %err, "failed to mark grant");
                    }
                }
                Err(err) => {
                    tracing::warn!(entitlement_id = %grant.id, error = %err, "role grant failed");
                }
            }
        }
    }

    // Event routing

    fn dispatch(self: &Arc<Self>, app_id: String, event: GatewayEvent) {
        let engine = self.clone();
        tokio::spawn(async move {
            if let Err(err) = engine.route_event(&app_id, event).await {
                tracing::warn!(app_id = %app_id, error = %err, "event routing failed");
            }
        });
    }

    pub async fn route_event(
        &self,
        app_id: &str,
        event: GatewayEvent,
    ) -> Result<(), EngineError> {
        let Some(app) = self.apps.lock().get(app_id).map(|s| s.app.clone()) else {
            tracing::debug!(app_id = %app_id, "event for unknown app");
            return Ok(());
        };
        match event {
            GatewayEvent::InteractionCreate(interaction) => {
                self.route_interaction(app, interaction).await
            }
            other => self.route_listener_event(app, other).await,
        }
    }

    async fn route_listener_event(
        &self,
        app: App,
        event: GatewayEvent,
    ) -> Result<(), EngineError> {
        let listeners: Vec<command::CompiledEventListener> = self
            .apps
            .lock()
            .get(&app.id)
            .map(|s| {
                s.listeners_for(event.event_type())
                    .into_iter()
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        for listener in listeners {
            let links = EntityLinks::event_listener(listener.id.clone());
            let env = self.execution_env(&app, links);
            run_flow(
                env,
                listener.flow.clone(),
                FlowEntry::Event(event.clone()),
                FlowContextState::default(),
                FlowStart::Entry,
            )
            .await;
        }
        Ok(())
    }

    async fn route_interaction(
        &self,
        app: App,
        interaction: Interaction,
    ) -> Result<(), EngineError> {
        enum Route {
            Command(String),
            Resume(ResumeTarget),
            Component(String),
            Ignore,
        }

        let route = match &interaction.data {
            InteractionData::Command(invocation) => Route::Command(invocation.full_name()),
            InteractionData::Button { custom_id } => match parse_custom_id(custom_id) {
                Some(target) => Route::Resume(target),
                None => Route::Component(custom_id.clone()),
            },
            InteractionData::Modal { custom_id, .. } => match parse_custom_id(custom_id) {
                Some(target) => Route::Resume(target),
                None => Route::Ignore,
            },
        };

        match route {
            Route::Command(full_name) => {
                let Some(command) = self
                    .apps
                    .lock()
                    .get(&app.id)
                    .and_then(|s| s.command_by_name(&full_name).cloned())
                else {
                    tracing::debug!(app_id = %app.id, command = %full_name, "no matching command");
                    return Ok(());
                };
                let links = EntityLinks::command(command.id.clone());
                let env = self.execution_env(&app, links);
                run_flow(
                    env,
                    command.flow.clone(),
                    FlowEntry::Interaction(interaction),
                    FlowContextState::default(),
                    FlowStart::Entry,
                )
                .await;
                Ok(())
            }
            Route::Resume(target) => self.resume(app, interaction, target).await,
            Route::Component(custom_id) => {
                self.route_message_component(app, interaction, custom_id).await
            }
            Route::Ignore => Ok(()),
        }
    }

    /// Button press without a `resume:` custom ID: look the message up as a
    /// deployed message instance and run the flow wired to that component.
    async fn route_message_component(
        &self,
        app: App,
        interaction: Interaction,
        custom_id: String,
    ) -> Result<(), EngineError> {
        let Some(message_id) = interaction.message.as_ref().map(|m| m.id.clone()) else {
            return Ok(());
        };
        let instance = match self
            .stores
            .message_instances
            .message_instance_by_message_id(&app.id, &message_id)
            .await
        {
            Ok(instance) => instance,
            Err(StoreError::NotFound) => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        let Some(flow_source) = instance.flow_sources.get(&custom_id) else {
            return Ok(());
        };
        let flow = Arc::new(compile_component_button(flow_source)?);

        let links = EntityLinks::message_instance(instance.id);
        let env = self.execution_env(&app, links);
        run_flow(
            env,
            flow,
            FlowEntry::Interaction(interaction),
            FlowContextState::default(),
            FlowStart::Entry,
        )
        .await;
        Ok(())
    }

    /// Consumes a resume point and continues the suspended flow from the
    /// suspending node's children. Missing or expired points are dropped
    /// silently; the tokens Discord sends for them are already dead.
    async fn resume(
        &self,
        app: App,
        interaction: Interaction,
        target: ResumeTarget,
    ) -> Result<(), EngineError> {
        let point = match self
            .stores
            .resume_points
            .resume_point(target.resume_point_id())
            .await
        {
            Ok(point) => point,
            Err(StoreError::NotFound) => {
                tracing::debug!(resume_point_id = %target.resume_point_id(), "resume point not found");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        // Single use.
        if let Err(err) = self.stores.resume_points.delete_resume_point(&point.id).await {
            tracing::warn!(resume_point_id = %point.id, error = %err, "failed to delete resume point");
        }
        if point.is_expired(Utc::now()) {
            tracing::debug!(resume_point_id = %point.id, "resume point expired");
            return Ok(());
        }

        let Some(flow) = self.resume_flow(&app, &point).await? else {
            tracing::debug!(resume_point_id = %point.id, "owning flow no longer exists");
            return Ok(());
        };
        let Some(idx) = flow.node_by_id(&point.flow_node_id) else {
            tracing::debug!(
                resume_point_id = %point.id,
                node_id = %point.flow_node_id,
                "suspending node no longer exists"
            );
            return Ok(());
        };

        let start = match target {
            ResumeTarget::Modal { .. } => FlowStart::NodeChildren(idx),
            ResumeTarget::Component {
                component_index, ..
            } => FlowStart::NodeHandle(idx, format!("component_{component_index}")),
        };

        let env = self.execution_env(&app, point.links.clone());
        run_flow(
            env,
            flow,
            FlowEntry::Interaction(interaction),
            point.flow_state,
            start,
        )
        .await;
        Ok(())
    }

    /// Resolves the flow a resume point belongs to through its entity
    /// links.
    async fn resume_flow(
        &self,
        app: &App,
        point: &crate::resume::ResumePoint,
    ) -> Result<Option<Arc<CompiledFlow>>, EngineError> {
        if let Some(command_id) = &point.links.command_id {
            return Ok(self
                .apps
                .lock()
                .get(&app.id)
                .and_then(|s| s.command_by_id(command_id))
                .map(|c| c.flow.clone()));
        }
        if let Some(listener_id) = &point.links.event_listener_id {
            return Ok(self
                .apps
                .lock()
                .get(&app.id)
                .and_then(|s| s.listener_by_id(listener_id))
                .map(|l| l.flow.clone()));
        }
        if let Some(instance_id) = point.links.message_instance_id {
            let instance = match self
                .stores
                .message_instances
                .message_instance(&app.id, instance_id)
                .await
            {
                Ok(instance) => instance,
                Err(StoreError::NotFound) => return Ok(None),
                Err(err) => return Err(err.into()),
            };
            for flow_source in instance.flow_sources.values() {
                let flow = compile_component_button(flow_source)?;
                if flow.node_by_id(&point.flow_node_id).is_some() {
                    return Ok(Some(Arc::new(flow)));
                }
            }
        }
        Ok(None)
    }

    // Helpers

    fn execution_env(&self, app: &App, links: EntityLinks) -> ExecutionEnv {
        let providers = FlowProviders {
            discord: self.factory.discord(app),
            http: self.factory.http(app),
            ai: self.factory.ai(app),
            eval: self.factory.eval(app),
            message_template: self.factory.message_template(app),
            log: Arc::new(StoreLogProvider::new(
                app.id.clone(),
                links.clone(),
                self.stores.logs.clone(),
            )),
            variable: Arc::new(StoreVariableProvider::new(
                app.id.clone(),
                self.stores.variables.clone(),
            )),
            resume_point: Arc::new(StoreResumePointProvider::new(
                app.id.clone(),
                links.clone(),
                self.stores.resume_points.clone(),
            )),
        };
        ExecutionEnv {
            app_id: app.id.clone(),
            links,
            providers,
            limits: self.config.limits,
            logs: self.stores.logs.clone(),
            usage: self.stores.usage.clone(),
        }
    }

    async fn tenant_log(
        &self,
        app_id: &str,
        links: EntityLinks,
        level: LogLevel,
        message: String,
    ) {
        let entry = LogEntry {
            app_id: app_id.to_owned(),
            links,
            level,
            message,
            created_at: Utc::now(),
        };
        if let Err(err) = self.stores.logs.create_log_entry(entry).await {
            tracing::warn!(app_id = %app_id, error = %err, "failed to store log entry");
        }
    }

    /// Number of live supervisors; used by tests and status logging.
    pub fn app_count(&self) -> usize {
        self.apps.lock().len()
    }
}
