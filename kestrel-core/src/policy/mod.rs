//! Action-policy resolver
//!
//! Per-product rule groups constraining how a direction-only trading intent
//! may be expressed as open / close / close-today / close-yesterday orders,
//! with quantity caps per rule. Groups are read once at startup and are
//! read-only afterwards, so lookups on the order path take no lock.
//!
//! Config format (JSON):
//! ```json
//! {
//!     "default": {
//!         "order": [
//!             { "action": "closetoday", "limit": 100, "pure": false },
//!             { "action": "close", "limit": 100 },
//!             { "action": "open", "limit": 100 }
//!         ],
//!         "filters": ["rb", "hc"]
//!     }
//! }
//! ```
//! Products named in a group's `filters` resolve to that group; everything
//! else resolves to `default`, which must exist.

use crate::core::{CoreError, CoreResult, Offset};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub const DEFAULT_GROUP: &str = "default";

/// What a single rule permits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Open,
    Close,
    #[serde(rename = "closetoday")]
    CloseToday,
    #[serde(rename = "closeyestoday")]
    CloseYesterday,
}

impl ActionType {
    /// Offset of an order emitted under this rule.
    pub fn offset(&self) -> Offset {
        match self {
            ActionType::Open => Offset::Open,
            ActionType::Close => Offset::Close,
            ActionType::CloseToday => Offset::CloseToday,
            ActionType::CloseYesterday => Offset::CloseYesterday,
        }
    }
}

/// One rule in a group. A limit of 0 means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActionRule {
    pub action: ActionType,
    /// Cap on the quantity this rule may contribute, both sides combined.
    #[serde(default)]
    pub limit: u32,
    /// Long-side cap (buy-open / sell-close targets the long book).
    #[serde(default, rename = "limit_l")]
    pub limit_long: u32,
    /// Short-side cap.
    #[serde(default, rename = "limit_s")]
    pub limit_short: u32,
    /// For close-today / close-yesterday: rule applies only when the other
    /// day-bucket holds nothing.
    #[serde(default)]
    pub pure: bool,
}

/// Ordered rules; iteration order is configuration order and is load-bearing.
pub type ActionRuleGroup = Vec<ActionRule>;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GroupConfig {
    #[serde(default)]
    order: Vec<ActionRule>,
    #[serde(default)]
    filters: Vec<String>,
}

/// Rule-group table plus the product-to-group filter map.
#[derive(Debug, Default)]
pub struct ActionPolicy {
    rules: HashMap<String, ActionRuleGroup>,
    product_groups: HashMap<String, String>,
}

impl ActionPolicy {
    /// Load from a JSON file. Fails when the file is unreadable, malformed,
    /// or the `default` group is missing.
    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            CoreError::Config(format!(
                "cannot read action policy {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> CoreResult<Self> {
        let groups: HashMap<String, GroupConfig> = serde_json::from_str(raw)
            .map_err(|e| CoreError::Config(format!("bad action policy config: {}", e)))?;

        let mut policy = ActionPolicy::default();
        for (name, group) in groups {
            for pid in &group.filters {
                policy.product_groups.insert(pid.clone(), name.clone());
            }
            policy.rules.insert(name, group.order);
        }

        if !policy.rules.contains_key(DEFAULT_GROUP) {
            return Err(CoreError::Config(
                "action policy has no 'default' group".into(),
            ));
        }
        Ok(policy)
    }

    /// Serialize back to the config format; reloading the output yields an
    /// identical table.
    pub fn to_json(&self) -> String {
        let mut groups: HashMap<String, GroupConfig> = HashMap::new();
        for (name, order) in &self.rules {
            groups.insert(
                name.clone(),
                GroupConfig {
                    order: order.clone(),
                    filters: Vec::new(),
                },
            );
        }
        for (pid, group) in &self.product_groups {
            if let Some(cfg) = groups.get_mut(group) {
                cfg.filters.push(pid.clone());
            }
        }
        for cfg in groups.values_mut() {
            cfg.filters.sort();
        }
        serde_json::to_string_pretty(&groups).expect("policy groups serialize")
    }

    /// Rule group for a product id. Unmapped products use `default`; a
    /// mapping to a missing group logs and falls back to `default`.
    pub fn rules_for(&self, product: &str) -> &ActionRuleGroup {
        let group = self
            .product_groups
            .get(product)
            .map(String::as_str)
            .unwrap_or(DEFAULT_GROUP);

        match self.rules.get(group) {
            Some(rules) => rules,
            None => {
                tracing::error!(
                    "action policy group {} not found for product {}, using default",
                    group,
                    product
                );
                self.rules
                    .get(DEFAULT_GROUP)
                    .expect("default group checked at load")
            }
        }
    }

    /// Register a group programmatically (used by tests and embedders).
    pub fn insert_group(&mut self, name: &str, rules: ActionRuleGroup, filters: &[&str]) {
        for pid in filters {
            self.product_groups.insert((*pid).to_string(), name.to_string());
        }
        self.rules.insert(name.to_string(), rules);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "default": {
            "order": [
                { "action": "closetoday", "limit": 100, "pure": false },
                { "action": "close", "limit": 100 },
                { "action": "open", "limit": 100 }
            ]
        },
        "stocklike": {
            "order": [
                { "action": "closeyestoday", "limit": 50, "pure": true },
                { "action": "open", "limit": 20, "limit_l": 10 }
            ],
            "filters": ["ag", "au"]
        }
    }"#;

    #[test]
    fn test_load_and_lookup() {
        let policy = ActionPolicy::from_json(SAMPLE).unwrap();

        let default = policy.rules_for("rb");
        assert_eq!(default.len(), 3);
        assert_eq!(default[0].action, ActionType::CloseToday);
        assert_eq!(default[1].action, ActionType::Close);
        assert_eq!(default[2].action, ActionType::Open);

        let mapped = policy.rules_for("ag");
        assert_eq!(mapped.len(), 2);
        assert!(mapped[0].pure);
        assert_eq!(mapped[1].limit_long, 10);
    }

    #[test]
    fn test_missing_default_rejected() {
        let err = ActionPolicy::from_json(r#"{"only": {"order": []}}"#).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_round_trip_identical() {
        let policy = ActionPolicy::from_json(SAMPLE).unwrap();
        let reloaded = ActionPolicy::from_json(&policy.to_json()).unwrap();

        for product in ["rb", "ag", "au", "unmapped"] {
            assert_eq!(policy.rules_for(product), reloaded.rules_for(product));
        }
    }

    #[test]
    fn test_unknown_action_rejected() {
        let raw = r#"{"default": {"order": [{"action": "flatten", "limit": 1}]}}"#;
        assert!(ActionPolicy::from_json(raw).is_err());
    }

    #[test]
    fn test_rule_order_preserved() {
        let policy = ActionPolicy::from_json(SAMPLE).unwrap();
        let actions: Vec<ActionType> =
            policy.rules_for("zn").iter().map(|r| r.action).collect();
        assert_eq!(
            actions,
            vec![ActionType::CloseToday, ActionType::Close, ActionType::Open]
        );
    }
}
