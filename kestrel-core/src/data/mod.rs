//! Tick/bar/L2 retrieval and live caches.

mod manager;

pub use manager::{AdjustFactorSource, BarSink, DataManager, FlatAdjustFactors};
