use crate::{
    rule_catalog::{RuleKind, RuleSpec, Severity},
    threshold::ThresholdSpec,
};
use serde::{Deserialize, Serialize};

/// Engine configuration.
///
/// Loaded from a JSON file in deployments; tests use
/// `EngineConfig::default_test()`. Every field has a default, so a config
/// file only needs to name what it overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Used whenever no withdrawal threshold row has been saved yet.
    pub default_thresholds: ThresholdSpec,
    /// Boundary between "recent" and "historical" activity.
    pub recent_window_days: i64,
    /// Trailing window for the frequency component of the risk score.
    pub scoring_window_hours: i64,
    pub default_page_size: u32,
    pub max_page_size: u32,
    /// Installed by `FraudEngine::bootstrap` when the catalog is empty.
    pub seed_rules: Vec<RuleSpec>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_thresholds: ThresholdSpec::default(),
            recent_window_days: 30,
            scoring_window_hours: 24,
            default_page_size: 20,
            max_page_size: 100,
            seed_rules: default_seed_rules(),
        }
    }
}

impl EngineConfig {
    /// Load from a JSON config file.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Config with hardcoded defaults and an empty seed catalog, for tests.
    pub fn default_test() -> Self {
        Self {
            seed_rules: Vec::new(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.recent_window_days < 1 {
            anyhow::bail!("recent_window_days must be at least 1");
        }
        if self.scoring_window_hours < 1 {
            anyhow::bail!("scoring_window_hours must be at least 1");
        }
        if self.max_page_size == 0 || self.default_page_size == 0 {
            anyhow::bail!("page sizes must be positive");
        }
        self.default_thresholds
            .validate()
            .map_err(|e| anyhow::anyhow!("default_thresholds: {e}"))?;
        for rule in &self.seed_rules {
            rule.validate()
                .map_err(|e| anyhow::anyhow!("seed rule '{}': {e}", rule.name))?;
        }
        Ok(())
    }
}

fn default_seed_rules() -> Vec<RuleSpec> {
    vec![
        RuleSpec {
            name: "Rapid withdrawals".into(),
            description: Some("More than 3 withdrawals within 24 hours".into()),
            kind: RuleKind::Frequency { max_count: 3, window_hours: 24 },
            severity: Severity::High,
            risk_points: 20,
            enabled: true,
        },
        RuleSpec {
            name: "Large withdrawal".into(),
            description: Some("Withdrawal at or above the large-withdrawal threshold".into()),
            // No ceiling of its own: follows the configured threshold.
            kind: RuleKind::Amount { min_amount: Some(0.0), max_amount: None },
            severity: Severity::High,
            risk_points: 15,
            enabled: true,
        },
        RuleSpec {
            name: "Withdrawals without deposits".into(),
            description: Some("Member withdraws but has never completed a deposit".into()),
            kind: RuleKind::NoDeposit,
            severity: Severity::Medium,
            risk_points: 25,
            enabled: true,
        },
    ]
}
