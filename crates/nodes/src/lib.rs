//! `nodes` crate — the node plugin contract, the process-wide registry, and
//! the built-in plugins shipped with the service.
//!
//! Every node — built-in and external alike — must implement [`NodePlugin`].
//! The engine crate dispatches execution through this trait object; the API
//! layer serves plugin metadata and config validation out of the registry.

pub mod builtin;
pub mod error;
pub mod mock;
pub mod registry;
pub mod traits;

pub use error::{NodeError, RegistryError};
pub use registry::NodeRegistry;
pub use traits::{NodeInput, NodeMetadata, NodeOutput, NodePlugin, ValueMap};
