//! Built-in plugins shipped with the service.

pub mod data_filter;
pub mod logger;
pub mod static_data;

use std::sync::Arc;

use crate::{NodeRegistry, RegistryError};

/// Register every built-in plugin. Called once at startup.
pub fn register_builtins(registry: &NodeRegistry) -> Result<(), RegistryError> {
    registry.register(Arc::new(static_data::StaticDataNode))?;
    registry.register(Arc::new(data_filter::DataFilterNode))?;
    registry.register(Arc::new(logger::LoggerNode))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_register_cleanly() {
        let registry = NodeRegistry::new();
        register_builtins(&registry).unwrap();
        assert_eq!(
            registry.list(),
            vec!["data_filter", "logger", "static_data"]
        );
    }
}
