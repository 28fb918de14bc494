//! Strategy factory registry
//!
//! In-process analog of the plug-in contract: each factory is registered
//! under its name and owns both creation and destruction of its strategies
//! (the boxed strategy drops through the factory's own allocator when the
//! factory is a dynamic module). Dynamic library discovery itself lives
//! outside the core; embedders register factories here.

use super::context::Strategy;
use crate::core::{CoreError, CoreResult};
use std::collections::HashMap;
use std::sync::Arc;

pub trait StrategyFactory: Send + Sync {
    /// Factory name, the first half of a `factory.unit` strategy name.
    fn name(&self) -> &str;

    /// Instantiate the named strategy unit; `None` when the unit is
    /// unknown to this factory.
    fn create(&self, unit: &str, id: &str) -> Option<Box<dyn Strategy>>;
}

#[derive(Default)]
pub struct StrategyRegistry {
    factories: HashMap<String, Arc<dyn StrategyFactory>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, factory: Arc<dyn StrategyFactory>) {
        let name = factory.name().to_string();
        tracing::info!("strategy factory [{}] loaded", name);
        self.factories.insert(name, factory);
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Create a strategy from its full `factory.unit` name.
    pub fn create(&self, full_name: &str, id: &str) -> CoreResult<Box<dyn Strategy>> {
        let (factory_name, unit) = full_name.split_once('.').ok_or_else(|| {
            CoreError::ModuleLoad(format!(
                "strategy name '{}' is not of the form factory.unit",
                full_name
            ))
        })?;

        let factory = self.factories.get(factory_name).ok_or_else(|| {
            CoreError::ModuleLoad(format!("strategy factory '{}' not loaded", factory_name))
        })?;

        factory.create(unit, id).ok_or_else(|| {
            CoreError::ModuleLoad(format!(
                "factory '{}' has no strategy unit '{}'",
                factory_name, unit
            ))
        })
    }
}
