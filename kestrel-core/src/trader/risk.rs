//! Order-flow risk monitor
//!
//! Sliding-window rate caps on entrusts and cancels plus lifetime totals,
//! tracked per instrument. A code that trips a window bound goes into the
//! exclusion set and every later order on it is refused until an operator
//! clears the code.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Bounds for one instrument scope. A bound of 0 disables that check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskParams {
    /// Max entrusts inside `order_window_s`.
    #[serde(default)]
    pub order_rate_bound: u32,
    /// Entrust window, seconds.
    #[serde(default)]
    pub order_window_s: u32,
    /// Lifetime entrust cap.
    #[serde(default)]
    pub order_total_cap: u32,

    /// Max cancels inside `cancel_window_s`.
    #[serde(default)]
    pub cancel_rate_bound: u32,
    /// Cancel window, seconds.
    #[serde(default)]
    pub cancel_window_s: u32,
    /// Lifetime cancel cap.
    #[serde(default)]
    pub cancel_total_cap: u32,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            order_rate_bound: 0,
            order_window_s: 0,
            order_total_cap: 0,
            cancel_rate_bound: 0,
            cancel_window_s: 0,
            cancel_total_cap: 0,
        }
    }
}

#[derive(Debug, Default)]
struct CodeStat {
    order_total: u32,
    cancel_total: u32,
}

/// Per-code flow statistics and exclusion state. Not internally locked; the
/// trader adapter owns one behind its own mutex.
#[derive(Debug, Default)]
pub struct RiskMonitor {
    enabled: bool,
    default_params: RiskParams,
    /// Per-code overrides; key is the product or full code.
    overrides: HashMap<String, RiskParams>,
    order_times: HashMap<String, Vec<u64>>,
    cancel_times: HashMap<String, Vec<u64>>,
    stats: HashMap<String, CodeStat>,
    excluded: HashSet<String>,
}

/// Outcome of a gate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskVerdict {
    Pass,
    /// Refused; code was already excluded or a lifetime cap is spent.
    Rejected,
    /// Refused and the code has just been excluded.
    Excluded,
}

impl RiskVerdict {
    #[inline]
    pub fn passed(&self) -> bool {
        matches!(self, RiskVerdict::Pass)
    }
}

impl RiskMonitor {
    pub fn new(enabled: bool, default_params: RiskParams) -> Self {
        Self {
            enabled,
            default_params,
            ..Default::default()
        }
    }

    pub fn set_override(&mut self, scope: &str, params: RiskParams) {
        self.overrides.insert(scope.to_string(), params);
    }

    fn params_for(&self, code: &str) -> RiskParams {
        self.overrides
            .get(code)
            .copied()
            .unwrap_or(self.default_params)
    }

    pub fn is_excluded(&self, code: &str) -> bool {
        self.excluded.contains(code)
    }

    /// Operator-driven reset after a violation.
    pub fn clear_exclusion(&mut self, code: &str) {
        self.excluded.remove(code);
    }

    /// Gate one entrust at wall-clock `now_ms`.
    pub fn check_order(&mut self, code: &str, now_ms: u64) -> RiskVerdict {
        if !self.enabled {
            return RiskVerdict::Pass;
        }
        if self.excluded.contains(code) {
            return RiskVerdict::Rejected;
        }
        let params = self.params_for(code);

        if params.order_rate_bound > 0 && params.order_window_s > 0 {
            let cache = self.order_times.entry(code.to_string()).or_default();
            cache.push(now_ms);
            let horizon = now_ms.saturating_sub(u64::from(params.order_window_s) * 1000);
            cache.retain(|&t| t >= horizon);
            if cache.len() as u32 > params.order_rate_bound {
                tracing::warn!(
                    "entrust rate tripped on {}: {} in {}s, excluding",
                    code,
                    cache.len(),
                    params.order_window_s
                );
                self.excluded.insert(code.to_string());
                return RiskVerdict::Excluded;
            }
        }

        let stat = self.stats.entry(code.to_string()).or_default();
        if params.order_total_cap > 0 && stat.order_total >= params.order_total_cap {
            tracing::warn!(
                "entrust total cap reached on {}: {}",
                code,
                stat.order_total
            );
            return RiskVerdict::Rejected;
        }
        stat.order_total += 1;
        RiskVerdict::Pass
    }

    /// Gate one cancel at wall-clock `now_ms`.
    pub fn check_cancel(&mut self, code: &str, now_ms: u64) -> RiskVerdict {
        if !self.enabled {
            return RiskVerdict::Pass;
        }
        if self.excluded.contains(code) {
            return RiskVerdict::Rejected;
        }
        let params = self.params_for(code);

        if params.cancel_rate_bound > 0 && params.cancel_window_s > 0 {
            let cache = self.cancel_times.entry(code.to_string()).or_default();
            cache.push(now_ms);
            let horizon = now_ms.saturating_sub(u64::from(params.cancel_window_s) * 1000);
            cache.retain(|&t| t >= horizon);
            if cache.len() as u32 > params.cancel_rate_bound {
                tracing::warn!(
                    "cancel rate tripped on {}: {} in {}s, excluding",
                    code,
                    cache.len(),
                    params.cancel_window_s
                );
                self.excluded.insert(code.to_string());
                return RiskVerdict::Excluded;
            }
        }

        let stat = self.stats.entry(code.to_string()).or_default();
        if params.cancel_total_cap > 0 && stat.cancel_total >= params.cancel_total_cap {
            return RiskVerdict::Rejected;
        }
        stat.cancel_total += 1;
        RiskVerdict::Pass
    }

    /// Lifetime entrust count for a code.
    pub fn order_total(&self, code: &str) -> u32 {
        self.stats.get(code).map(|s| s.order_total).unwrap_or(0)
    }
}
