//! Factory exposing the sample strategies to the engine registry.

use crate::imbalance::{QueueImbalance, QueueImbalanceParams};
use crate::momentum::{MomentumTaker, MomentumTakerParams};
use kestrel_core::engine::{Strategy, StrategyFactory};

pub struct SampleStrategyFactory;

impl StrategyFactory for SampleStrategyFactory {
    fn name(&self) -> &str {
        "KestrelSamples"
    }

    fn create(&self, unit: &str, id: &str) -> Option<Box<dyn Strategy>> {
        match unit {
            "momentum" => Some(Box::new(MomentumTaker::new(
                id,
                MomentumTakerParams::default(),
            ))),
            "imbalance" => Some(Box::new(QueueImbalance::new(
                id,
                QueueImbalanceParams::default(),
            ))),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_core::engine::StrategyRegistry;
    use std::sync::Arc;

    #[test]
    fn test_units_resolve() {
        let mut reg = StrategyRegistry::new();
        reg.register(Arc::new(SampleStrategyFactory));
        assert!(reg.create("KestrelSamples.momentum", "m1").is_ok());
        assert!(reg.create("KestrelSamples.imbalance", "i1").is_ok());
        assert!(reg.create("KestrelSamples.unknown", "x").is_err());
    }
}
