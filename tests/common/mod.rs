pub mod fixtures;
pub mod providers;
pub mod stores;

pub use fixtures::*;
pub use providers::*;
pub use stores::*;
