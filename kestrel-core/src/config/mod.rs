//! Engine configuration
//!
//! JSON structures the runner loads at startup: environment (engine kind,
//! product session), trader/parser/executer channel declarations, strategy
//! instances and the risk-monitor bounds. Malformed or missing required
//! pieces are fatal.

use crate::core::{CoreError, CoreResult};
use crate::ticker::SessionInfo;
use crate::trader::RiskParams;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub env: EnvConfig,

    #[serde(default)]
    pub traders: Vec<TraderConfig>,

    #[serde(default)]
    pub parsers: Vec<ParserConfig>,

    #[serde(default)]
    pub executers: Vec<ExecuterConfig>,

    #[serde(default)]
    pub strategies: Vec<StrategyInstanceConfig>,

    #[serde(default)]
    pub riskmon: RiskMonConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvConfig {
    /// Engine kind; this core runs `"hft"`.
    pub name: String,

    pub product: ProductConfig,

    /// Path of the action-policy file.
    #[serde(default)]
    pub filters: Option<String>,

    /// Working directory for runtime artifacts (`marker.json`).
    #[serde(default = "default_base_dir")]
    pub base_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductConfig {
    /// Session id, resolved against `sessions`.
    pub session: String,
}

/// One broker channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraderConfig {
    pub id: String,
    /// Broker module name; resolution happens in the runner.
    pub module: String,
    #[serde(default)]
    pub ignore_self_match: bool,
}

/// One market-feed channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    pub id: String,
    pub module: String,
    #[serde(default)]
    pub codes: Vec<String>,
}

/// One order executer (consumed by CTA-style engines; carried in config
/// for compatibility).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuterConfig {
    pub id: String,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyInstanceConfig {
    /// Instance id, unique per engine.
    pub id: String,
    /// Full strategy name, `factory.unit`.
    pub name: String,
    /// Trader channel the instance routes orders through.
    pub trader: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskMonConfig {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub base: RiskParams,
    /// Per-code overrides.
    #[serde(default)]
    pub overrides: HashMap<String, RiskParams>,
}

/// Session table: id to sections, `"0930-1130"` spans.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionTable {
    #[serde(default)]
    pub sessions: HashMap<String, Vec<String>>,
}

fn default_base_dir() -> String {
    ".".to_string()
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            CoreError::Config(format!(
                "cannot read config {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> CoreResult<Self> {
        let cfg: EngineConfig = serde_json::from_str(raw)
            .map_err(|e| CoreError::Config(format!("bad engine config: {}", e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> CoreResult<()> {
        if self.env.product.session.is_empty() {
            return Err(CoreError::Config("env.product.session is empty".into()));
        }
        let trader_ids: Vec<&str> = self.traders.iter().map(|t| t.id.as_str()).collect();
        for strategy in &self.strategies {
            if !trader_ids.contains(&strategy.trader.as_str()) {
                return Err(CoreError::Config(format!(
                    "strategy {} routes to unknown trader {}",
                    strategy.id, strategy.trader
                )));
            }
        }
        Ok(())
    }
}

impl SessionTable {
    /// Resolve a session id into its descriptor. Unknown ids fall back to
    /// the standard day session.
    pub fn resolve(&self, id: &str) -> SessionInfo {
        match self.sessions.get(id) {
            Some(spans) => {
                let sections = spans
                    .iter()
                    .filter_map(|span| {
                        let (from, to) = span.split_once('-')?;
                        Some((from.parse().ok()?, to.parse().ok()?))
                    })
                    .collect::<Vec<(u32, u32)>>();
                if sections.is_empty() {
                    tracing::error!("session {} has no usable spans, using day session", id);
                    SessionInfo::day_session(id)
                } else {
                    SessionInfo::new(id, sections)
                }
            }
            None => {
                tracing::warn!("session {} not found, using day session", id);
                SessionInfo::day_session(id)
            }
        }
    }
}
