//! Flow compilation and execution.
//!
//! [`data`] models the editor document, [`compile`] turns it into an
//! immutable graph, and [`execute`] interprets that graph inside a
//! [`context::FlowContext`] carrying budgets, a deadline, and the provider
//! bundle from [`provider`]. Per-invocation results and condition/loop
//! flags live in [`state`], which is also what freezes into resume points.

pub mod compile;
pub mod context;
pub mod data;
pub mod error;
pub mod execute;
pub mod provider;
pub mod state;

#[cfg(test)]
pub(crate) mod testutil;

pub use compile::{CompiledFlow, CompiledNode, NodeIdx};
pub use context::{FlowContext, FlowContextLimits, FlowEntry, EXECUTION_TIMEOUT};
pub use data::{FlowData, FlowNodeType};
pub use error::FlowError;
pub use provider::FlowProviders;
pub use state::FlowContextState;
