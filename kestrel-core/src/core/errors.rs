//! Error kinds surfaced by the engine core
//!
//! Startup failures (configuration, module loading) are fatal; everything
//! else is recoverable and reported through the event notifier without
//! tearing the engine down.

use thiserror::Error;

/// Result alias for fallible core operations.
pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed or missing required configuration. Fatal at startup.
    #[error("config error: {0}")]
    Config(String),

    /// A strategy module could not be loaded; the module is skipped.
    #[error("module load error: {0}")]
    ModuleLoad(String),

    /// Broker login failed; the adapter stays in `LoginFailed` until retry.
    #[error("broker login failed on channel {channel}: {message}")]
    BrokerLogin { channel: String, message: String },

    /// An order was refused before or at the broker.
    #[error("order rejected for {code}: {reason}")]
    OrderRejected { code: String, reason: String },

    /// A risk bound tripped; the code is excluded until cleared.
    #[error("risk violation on {code}: {reason}")]
    RiskViolation { code: String, reason: String },

    /// Both sides of an exchange trade were ours.
    #[error("self-match detected on {code}")]
    SelfMatch { code: String },

    /// Market feed dropped; the parser adapter reconnects.
    #[error("feed disconnected: {0}")]
    Feed(String),

    /// A strategy callback panicked; caught at the dispatch boundary.
    #[error("strategy {name} failed in {hook}")]
    Strategy { name: String, hook: String },
}

impl CoreError {
    /// Short stable tag used when surfacing through the event notifier.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Config(_) => "config",
            CoreError::ModuleLoad(_) => "module_load",
            CoreError::BrokerLogin { .. } => "broker_login",
            CoreError::OrderRejected { .. } => "order_rejected",
            CoreError::RiskViolation { .. } => "risk_violation",
            CoreError::SelfMatch { .. } => "self_match",
            CoreError::Feed(_) => "feed",
            CoreError::Strategy { .. } => "strategy",
        }
    }

    /// True for errors that must abort startup.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::Config(_))
    }
}
