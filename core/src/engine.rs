//! The fraud engine — the entry point of the decision pipeline.
//!
//! PIPELINE (each stage is also callable on its own):
//!   1. Rule engine          run_rules()              -> violations
//!   2. Risk scoring         recalculate_risk_scores() -> member scores
//!   3. Decision logic       evaluate(member)          -> decisions
//!
//! RULES:
//!   - Each operation reads the clock once and threads that instant through.
//!   - Only the store talks to the database.
//!   - Audit writes never fail the operation that produced them.

use crate::{
    clock::EngineClock,
    config::EngineConfig,
    error::{FraudError, FraudResult},
    risk_scoring::{RecalculationReport, RiskLevel},
    rule_engine::{CustomRuleEvaluator, RuleRunReport},
    store::FraudStore,
    types::PageRequest,
    withdrawal_request::WithdrawalStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub struct FraudEngine {
    pub store: FraudStore,
    config: EngineConfig,
    clock: EngineClock,
    evaluators: Vec<Box<dyn CustomRuleEvaluator>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub rules_total: i64,
    pub rules_enabled: i64,
    pub violations_total: i64,
    pub violations_unreviewed: i64,
    pub members_low_risk: i64,
    pub members_medium_risk: i64,
    pub members_high_risk: i64,
    pub members_critical_risk: i64,
    pub decisions_total: i64,
    pub decisions_pending_approval: i64,
    pub withdrawal_requests_pending: i64,
    pub fraud_alerts_open: i64,
}

/// Outcome of a full scan: rules, then scores, then one evaluation per member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub rules: RuleRunReport,
    pub recalculation: RecalculationReport,
    pub members_evaluated: usize,
    pub decisions_recorded: usize,
    pub members_flagged: usize,
}

impl FraudEngine {
    pub fn new(store: FraudStore, config: EngineConfig) -> FraudResult<Self> {
        config
            .validate()
            .map_err(|e| FraudError::Config(e.to_string()))?;
        Ok(Self {
            store,
            config,
            clock: EngineClock::System,
            evaluators: Vec::new(),
        })
    }

    /// Migrate the store and wrap it in an engine.
    pub fn build(store: FraudStore, config: EngineConfig) -> FraudResult<Self> {
        store.migrate()?;
        Self::new(store, config)
    }

    /// In-memory engine with test config and the clock pinned at `now`.
    pub fn build_test(now: DateTime<Utc>) -> FraudResult<Self> {
        Ok(Self::build(FraudStore::in_memory()?, EngineConfig::default_test())?
            .with_clock(EngineClock::Fixed(now)))
    }

    pub fn with_clock(mut self, clock: EngineClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn advance_clock(&mut self, by: chrono::Duration) {
        self.clock.advance(by);
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Apply the configured page-size defaults and limits.
    pub fn page(&self, request: PageRequest) -> PageRequest {
        let request = if request.page_size == 0 {
            PageRequest::new(request.page, self.config.default_page_size)
        } else {
            request
        };
        request.normalized(self.config.max_page_size)
    }

    /// Register a custom evaluator. A later registration under the same
    /// name replaces the earlier one.
    pub fn register_evaluator(&mut self, evaluator: Box<dyn CustomRuleEvaluator>) {
        self.evaluators.retain(|e| e.name() != evaluator.name());
        log::debug!("Custom rule evaluator '{}' registered", evaluator.name());
        self.evaluators.push(evaluator);
    }

    pub(crate) fn custom_evaluator(&self, name: &str) -> Option<&dyn CustomRuleEvaluator> {
        self.evaluators
            .iter()
            .find(|e| e.name() == name)
            .map(|e| e.as_ref())
    }

    /// Install the configured seed rules when the catalog is empty.
    /// Returns how many rules were created.
    pub fn bootstrap(&self, actor: &str) -> FraudResult<usize> {
        if !self.store.list_rules()?.is_empty() {
            return Ok(0);
        }
        for spec in &self.config.seed_rules {
            self.create_rule(spec.clone(), actor)?;
        }
        if !self.config.seed_rules.is_empty() {
            log::info!("Rule catalog bootstrapped with {} rules", self.config.seed_rules.len());
        }
        Ok(self.config.seed_rules.len())
    }

    /// Run rules, recalculate every score, then evaluate every member.
    pub fn run_scan(&self) -> FraudResult<ScanReport> {
        let rules = self.run_rules()?;
        let recalculation = self.recalculate_risk_scores()?;

        let mut members_evaluated = 0;
        let mut decisions_recorded = 0;
        let mut members_flagged = 0;
        for member_id in self.store.all_member_ids()? {
            let evaluation = self.evaluate(&member_id, None)?;
            members_evaluated += 1;
            decisions_recorded += evaluation.decisions.len();
            if evaluation.risk_score.risk_level == RiskLevel::Critical {
                members_flagged += 1;
            }
        }

        log::info!(
            "Scan complete: {members_evaluated} members evaluated, \
             {decisions_recorded} decisions, {members_flagged} flagged"
        );
        Ok(ScanReport {
            rules,
            recalculation,
            members_evaluated,
            decisions_recorded,
            members_flagged,
        })
    }

    pub fn get_engine_stats(&self) -> FraudResult<EngineStats> {
        let (rules_total, rules_enabled) = self.store.rule_counts()?;
        let (violations_total, violations_unreviewed) = self.store.violation_counts()?;
        let (decisions_total, decisions_pending_approval) = self.store.decision_counts()?;
        Ok(EngineStats {
            rules_total,
            rules_enabled,
            violations_total,
            violations_unreviewed,
            members_low_risk: self.store.count_risk_scores_at_level(RiskLevel::Low)?,
            members_medium_risk: self.store.count_risk_scores_at_level(RiskLevel::Medium)?,
            members_high_risk: self.store.count_risk_scores_at_level(RiskLevel::High)?,
            members_critical_risk: self.store.count_risk_scores_at_level(RiskLevel::Critical)?,
            decisions_total,
            decisions_pending_approval,
            withdrawal_requests_pending: self
                .store
                .withdrawal_request_count_with_status(WithdrawalStatus::Pending)?,
            fraud_alerts_open: self.store.open_fraud_alert_count()?,
        })
    }
}
