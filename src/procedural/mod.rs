pub mod delegate;
pub mod engine;
pub mod expand;
pub mod index;
pub mod node_api;
pub mod registry;
