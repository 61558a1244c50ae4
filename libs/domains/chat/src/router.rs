//! Provider routing.
//!
//! Selection is an ordered rule table, not a branch: each rule names a
//! routing signal and the provider it maps to, evaluated first-match-wins
//! with a fixed fallback. New signals (latency budget, backend health)
//! extend the table without touching callers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{AsRefStr, Display, EnumString};
use tracing::debug;

/// Routing hint key: prefer the low-cost backend.
pub const HINT_LOW_COST: &str = "low_cost";

/// Identifier of a generation backend.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// Default, highest-capability backend.
    OpenAi,
    /// Low-cost, self-hosted backend.
    Ollama,
}

/// Read-only key/value hints supplied alongside a generation request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutingContext {
    hints: BTreeMap<String, String>,
}

impl RoutingContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hint(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.hints.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.hints.get(key).map(String::as_str)
    }

    /// Whether a hint is set to a truthy value ("true", "1", "yes").
    pub fn flag(&self, key: &str) -> bool {
        matches!(
            self.get(key).map(str::to_ascii_lowercase).as_deref(),
            Some("true" | "1" | "yes")
        )
    }

    pub fn is_empty(&self) -> bool {
        self.hints.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RoutingContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            hints: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// One routing decision: signal → provider.
#[derive(Clone)]
pub struct RoutingRule {
    /// Signal name, for logging.
    pub name: &'static str,
    /// Whether this rule applies to the given context.
    pub applies: fn(&RoutingContext) -> bool,
    /// Provider to route to when it does.
    pub provider: ProviderId,
}

/// Deterministic provider selection over an ordered rule table.
///
/// Pure function of the routing context: identical hints always yield the
/// same provider, and an empty or unrecognized context resolves to the
/// fallback.
#[derive(Clone)]
pub struct ProviderRouter {
    rules: Vec<RoutingRule>,
    fallback: ProviderId,
}

impl ProviderRouter {
    pub fn new(rules: Vec<RoutingRule>, fallback: ProviderId) -> Self {
        Self { rules, fallback }
    }

    /// Append a rule. Earlier rules win.
    pub fn with_rule(mut self, rule: RoutingRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn fallback(&self) -> ProviderId {
        self.fallback
    }

    /// Select the backend for a request.
    pub fn select_provider(&self, context: &RoutingContext) -> ProviderId {
        for rule in &self.rules {
            if (rule.applies)(context) {
                debug!(rule = rule.name, provider = %rule.provider, "Routing rule matched");
                return rule.provider;
            }
        }
        self.fallback
    }
}

impl Default for ProviderRouter {
    /// The standing policy: cost-sensitive requests go to the low-cost
    /// backend, everything else to the default backend.
    fn default() -> Self {
        Self::new(
            vec![RoutingRule {
                name: HINT_LOW_COST,
                applies: |ctx| ctx.flag(HINT_LOW_COST),
                provider: ProviderId::Ollama,
            }],
            ProviderId::OpenAi,
        )
    }
}
