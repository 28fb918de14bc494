//! Kestrel Strategies - sample strategies for the Kestrel HFT engine
//!
//! Two reference implementations over the core `Strategy` trait:
//! - `MomentumTaker`: tick-driven, takes liquidity on short-horizon drift
//! - `QueueImbalance`: L2-driven, leans on book imbalance
//!
//! Both are registered through [`SampleStrategyFactory`] under the factory
//! name `KestrelSamples`.

mod factory;
mod imbalance;
mod momentum;

#[cfg(test)]
mod test_helpers;

pub use factory::SampleStrategyFactory;
pub use imbalance::{QueueImbalance, QueueImbalanceParams};
pub use momentum::{MomentumTaker, MomentumTakerParams};

use kestrel_core::engine::StrategyRegistry;
use std::sync::Arc;

/// Register every built-in factory on a registry.
pub fn register_builtins(registry: &mut StrategyRegistry) {
    registry.register(Arc::new(SampleStrategyFactory));
}
