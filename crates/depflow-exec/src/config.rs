//! Engine configuration.

use depflow_graph::{BatchOrder, CycleStrategy};
use serde::{Deserialize, Serialize};

/// Per-model engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Run launched passes on a blocking tokio worker instead of the
    /// caller's thread.
    pub detach: bool,
    /// Widen cycle reports to every Parameter of the cyclic Functions' Nodes.
    pub enrich_cycle_report: bool,
    pub cycle_strategy: CycleStrategy,
    pub batch_order: BatchOrder,
    /// Check for cancellation between Functions, not only at pass end.
    pub cancel_per_function: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            detach: false,
            enrich_cycle_report: false,
            cycle_strategy: CycleStrategy::Exhaustive,
            batch_order: BatchOrder::PriorityInverted,
            cancel_per_function: true,
        }
    }
}

impl EngineConfig {
    /// Create configuration from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `DEPFLOW_DETACH`: run passes in the background (`true`/`false`)
    /// - `DEPFLOW_ENRICH_CYCLES`: enriched cycle reports
    /// - `DEPFLOW_CYCLE_STRATEGY`: `exhaustive` or `scc`
    /// - `DEPFLOW_BATCH_ORDER`: `priority` or `unordered`
    /// - `DEPFLOW_CANCEL_PER_FUNCTION`: check cancellation between Functions
    ///
    /// Absent or unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cycle_strategy = match env_string("DEPFLOW_CYCLE_STRATEGY").as_deref() {
            Some("exhaustive") => CycleStrategy::Exhaustive,
            Some("scc") => CycleStrategy::StronglyConnected,
            _ => defaults.cycle_strategy,
        };

        let batch_order = match env_string("DEPFLOW_BATCH_ORDER").as_deref() {
            Some("priority") => BatchOrder::PriorityInverted,
            Some("unordered") => BatchOrder::Unordered,
            _ => defaults.batch_order,
        };

        Self {
            detach: env_bool("DEPFLOW_DETACH").unwrap_or(defaults.detach),
            enrich_cycle_report: env_bool("DEPFLOW_ENRICH_CYCLES")
                .unwrap_or(defaults.enrich_cycle_report),
            cycle_strategy,
            batch_order,
            cancel_per_function: env_bool("DEPFLOW_CANCEL_PER_FUNCTION")
                .unwrap_or(defaults.cancel_per_function),
        }
    }

    pub fn with_detach(mut self, detach: bool) -> Self {
        self.detach = detach;
        self
    }

    pub fn with_enriched_cycles(mut self, enrich: bool) -> Self {
        self.enrich_cycle_report = enrich;
        self
    }

    pub fn with_cycle_strategy(mut self, strategy: CycleStrategy) -> Self {
        self.cycle_strategy = strategy;
        self
    }

    pub fn with_batch_order(mut self, order: BatchOrder) -> Self {
        self.batch_order = order;
        self
    }

    pub fn with_cancel_per_function(mut self, enabled: bool) -> Self {
        self.cancel_per_function = enabled;
        self
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|s| s.trim().to_ascii_lowercase())
}

fn env_bool(key: &str) -> Option<bool> {
    match env_string(key)?.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
