//! Per-invocation execution context: budgets, deadline, entry payload,
//! capability providers, and the shared placeholder engine.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::{Duration, Instant};

use crate::model::{GatewayEvent, Interaction};
use crate::placeholder::{
    EventProvider, InteractionProvider, NodesProvider, PlaceholderEngine, PlaceholderError,
    VariablesProvider,
};

use super::error::FlowError;
use super::provider::FlowProviders;
use super::state::FlowContextState;

/// Wall-clock ceiling for a single flow invocation.
pub const EXECUTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Plan-derived execution budgets. A zero means unlimited; exceeding is
/// checked after incrementing, so a limit of N allows exactly N.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlowContextLimits {
    pub max_stack_depth: usize,
    pub max_operations: usize,
    pub max_credits: usize,
}

impl FlowContextLimits {
    pub const fn unlimited() -> Self {
        FlowContextLimits {
            max_stack_depth: 0,
            max_operations: 0,
            max_credits: 0,
        }
    }
}

/// What triggered the invocation.
#[derive(Debug, Clone)]
pub enum FlowEntry {
    Interaction(Interaction),
    Event(GatewayEvent),
}

impl FlowEntry {
    pub fn interaction(&self) -> Option<&Interaction> {
        match self {
            FlowEntry::Interaction(i) => Some(i),
            FlowEntry::Event(_) => None,
        }
    }

    pub fn event(&self) -> Option<&GatewayEvent> {
        match self {
            FlowEntry::Event(e) => Some(e),
            FlowEntry::Interaction(_) => None,
        }
    }

    pub fn guild_id(&self) -> Option<&str> {
        match self {
            FlowEntry::Interaction(i) => i.guild_id.as_deref(),
            FlowEntry::Event(e) => match e {
                GatewayEvent::MessageCreate(m) | GatewayEvent::MessageUpdate(m) => {
                    m.guild_id.as_deref()
                }
                GatewayEvent::MemberAdd { guild_id, .. }
                | GatewayEvent::MemberRemove { guild_id, .. } => Some(guild_id),
                GatewayEvent::GuildCreate(g) => Some(&g.id),
                GatewayEvent::GuildDelete { id } => Some(id),
                _ => None,
            },
        }
    }

    pub fn channel_id(&self) -> Option<&str> {
        match self {
            FlowEntry::Interaction(i) => i.channel_id.as_deref(),
            FlowEntry::Event(e) => match e {
                GatewayEvent::MessageCreate(m) | GatewayEvent::MessageUpdate(m) => {
                    Some(&m.channel_id)
                }
                GatewayEvent::MessageDelete { channel_id, .. } => Some(channel_id),
                _ => None,
            },
        }
    }
}

pub struct FlowContext {
    pub entry: FlowEntry,
    pub providers: FlowProviders,
    pub placeholders: PlaceholderEngine,
    /// Shared with the `nodes.*` placeholder namespace; otherwise exclusive
    /// to this invocation.
    pub state: Arc<Mutex<FlowContextState>>,

    limits: FlowContextLimits,
    stack_depth: usize,
    operations: usize,
    credits_used: usize,
    deadline: Instant,
}

impl FlowContext {
    pub fn new(
        entry: FlowEntry,
        providers: FlowProviders,
        limits: FlowContextLimits,
        state: FlowContextState,
    ) -> Self {
        Self::with_timeout(entry, providers, limits, state, EXECUTION_TIMEOUT)
    }

    pub fn with_timeout(
        entry: FlowEntry,
        providers: FlowProviders,
        limits: FlowContextLimits,
        state: FlowContextState,
        timeout: Duration,
    ) -> Self {
        let state = Arc::new(Mutex::new(state));

        let mut placeholders = PlaceholderEngine::new();
        match &entry {
            FlowEntry::Interaction(interaction) => placeholders.add_provider(
                "interaction",
                Arc::new(InteractionProvider::new(interaction.clone())),
            ),
            FlowEntry::Event(event) => {
                placeholders.add_provider("event", Arc::new(EventProvider::new(event.clone())));
            }
        }
        placeholders.add_provider("nodes", Arc::new(NodesProvider::new(state.clone())));
        placeholders.add_provider(
            "variables",
            Arc::new(VariablesProvider::new(
                providers.variable.clone(),
                entry.guild_id().map(str::to_owned),
            )),
        );

        FlowContext {
            entry,
            providers,
            placeholders,
            state,
            limits,
            stack_depth: 0,
            operations: 0,
            credits_used: 0,
            deadline: Instant::now() + timeout,
        }
    }

    /// Charges one stack frame, one operation, and the node's credits.
    /// Pair with [`FlowContext::end_operation`] on every successful start.
    pub fn start_operation(&mut self, credits: usize) -> Result<(), FlowError> {
        self.check_deadline()?;

        self.stack_depth += 1;
        if self.stack_depth > self.limits.max_stack_depth && self.limits.max_stack_depth != 0 {
            return Err(FlowError::MaxStackDepthReached);
        }

        self.operations += 1;
        if self.operations > self.limits.max_operations && self.limits.max_operations != 0 {
            return Err(FlowError::MaxOperationsReached);
        }

        self.credits_used += credits;
        if self.credits_used > self.limits.max_credits && self.limits.max_credits != 0 {
            return Err(FlowError::MaxCreditsReached);
        }

        Ok(())
    }

    /// Releases the stack frame charged by [`FlowContext::start_operation`].
    pub fn end_operation(&mut self) {
        self.stack_depth = self.stack_depth.saturating_sub(1);
    }

    pub fn credits_used(&self) -> usize {
        self.credits_used
    }

    pub fn operations(&self) -> usize {
        self.operations
    }

    pub fn check_deadline(&self) -> Result<(), FlowError> {
        if Instant::now() >= self.deadline {
            return Err(FlowError::DeadlineExceeded);
        }
        Ok(())
    }

    pub fn remaining_time(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Fills `{{..}}` placeholders; unknown keys become empty strings,
    /// provider failures abort.
    pub async fn fill(&self, input: &str) -> Result<String, FlowError> {
        match self.placeholders.fill(input).await {
            Ok(out) => Ok(out),
            Err(PlaceholderError::NotFound) => Ok(String::new()),
            Err(PlaceholderError::Failed { key, message }) => {
                Err(FlowError::Placeholder { key, message })
            }
        }
    }

    /// Snapshot of the state for freezing into a resume point.
    pub fn state_snapshot(&self) -> FlowContextState {
        self.state.lock().clone()
    }
}
