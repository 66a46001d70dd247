//! # Flowcord: a visual-flow engine for Discord apps
//!
//! Flowcord executes bot behavior defined as node graphs ("flows") instead
//! of code. A flow starts at an entry node (a command invocation, a gateway
//! event, or a button press), walks its outgoing edges, and performs
//! actions along the way: responding to interactions, sending messages,
//! moderating members, calling HTTP APIs, branching on conditions, looping
//! and suspending for later input.
//!
//! ## Core concepts
//!
//! - **Flows**: node/edge graphs, compiled once and walked per invocation
//! - **Things**: the dynamic value type flowing between nodes, with total
//!   coercions between strings, numbers, booleans and Discord entities
//! - **Placeholders**: `{{interaction.user.id}}`-style template references
//!   resolved against the invocation environment
//! - **Providers**: narrow traits for every outside effect, so the
//!   interpreter never touches a socket
//! - **Engine**: per-app supervisors continuously reconciled against
//!   storage, routing gateway events into compiled flows
//!
//! ## Working with Things
//!
//! ```
//! use flowcord::thing::Thing;
//!
//! let count = Thing::guess(serde_json::json!("42"));
//! assert_eq!(count.as_int(), 42);
//!
//! // Coercions are total; comparisons never fail.
//! let threshold = Thing::Float(40.0);
//! assert!(count.greater_than(&threshold));
//!
//! // Append concatenates as strings regardless of operand types.
//! let label = Thing::from("count: ").append(&count);
//! assert_eq!(label.as_string(), "count: 42");
//! ```
//!
//! ## Module guide
//!
//! - [`thing`] - Dynamic values and coercions
//! - [`flow`] - Flow data model, compiler and interpreter
//! - [`placeholder`] - Template scanning and resolution
//! - [`resume`] - Suspend/resume points and custom ID correlation
//! - [`engine`] - App supervisors, command deployment, event routing
//! - [`gateway`] - Gateway connection reconciliation
//! - [`store`] - Storage traits the engine runs against
//! - [`model`] - Discord-facing data types
//! - [`telemetry`] - Process-level tracing setup

pub mod engine;
pub mod flow;
pub mod gateway;
pub mod model;
pub mod placeholder;
pub mod resume;
pub mod store;
pub mod telemetry;
pub mod thing;
pub mod utils;

pub use engine::{Engine, EngineConfig, EngineStores, ProviderFactory};
pub use flow::{CompiledFlow, FlowContext, FlowData, FlowError, FlowProviders};
pub use thing::Thing;
