//! Risk scoring aggregator.
//!
//! Converts a member's transaction history into a point total and a
//! four-tier risk level. The stored score is a cache: it can always be
//! rebuilt from transactions plus the current thresholds, and every
//! recalculation replaces the whole row.
//!
//! Components:
//!   frequency   10 per withdrawal beyond 3 in the trailing 24h
//!   amount      15 per lifetime withdrawal at or above the large threshold
//!   no-deposit  25 when the member withdraws but never completed a deposit
//!   behavior    20 / 10 when recent amounts deviate > 100% / > 50%

use crate::{
    audit::AuditAction,
    behavior_analyzer::{amount_split, weekly_frequency, BehaviorAnalysis},
    decision_logic::FraudDecision,
    engine::FraudEngine,
    error::FraudResult,
    member::{Member, TransactionRecord},
    types::{EntityId, Page, PageRequest, SYSTEM_ACTOR},
    violation::{RuleViolation, ViolationFilter},
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// ── Constants ────────────────────────────────────────────────────────────────

const FREE_WITHDRAWALS_PER_WINDOW: u32 = 3;
const POINTS_PER_EXCESS_WITHDRAWAL: u32 = 10;
const POINTS_PER_LARGE_WITHDRAWAL: u32 = 15;
const NO_DEPOSIT_POINTS: u32 = 25;
const SHARP_DEVIATION_PERCENT: f64 = 100.0;
const SHARP_DEVIATION_POINTS: u32 = 20;
const MODERATE_DEVIATION_PERCENT: f64 = 50.0;
const MODERATE_DEVIATION_POINTS: u32 = 10;

pub const MEDIUM_RISK_FLOOR: u32 = 20;
pub const HIGH_RISK_FLOOR: u32 = 40;
pub const CRITICAL_RISK_FLOOR: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_points(points: u32) -> Self {
        if points >= CRITICAL_RISK_FLOOR {
            Self::Critical
        } else if points >= HIGH_RISK_FLOOR {
            Self::High
        } else if points >= MEDIUM_RISK_FLOOR {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// HIGH or CRITICAL.
    pub fn is_elevated(&self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "LOW" => Some(Self::Low),
            "MEDIUM" => Some(Self::Medium),
            "HIGH" => Some(Self::High),
            "CRITICAL" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Component scores before they are stamped onto a member.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub frequency_points: u32,
    pub amount_points: u32,
    pub behavior_points: u32,
    pub no_deposit_points: u32,
    pub avg_transaction_amount: f64,
    pub transaction_frequency: f64,
}

impl ScoreBreakdown {
    pub fn total_points(&self) -> u32 {
        self.frequency_points + self.amount_points + self.behavior_points + self.no_deposit_points
    }

    pub fn risk_level(&self) -> RiskLevel {
        RiskLevel::from_points(self.total_points())
    }
}

/// Knobs the scorer reads from thresholds and configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringParams {
    pub large_withdrawal_amount: f64,
    pub frequency_window_hours: i64,
    pub recent_window_days: i64,
}

pub fn behavior_points(deviation_percent: f64, historical_avg_amount: f64) -> u32 {
    if historical_avg_amount <= 0.0 {
        0
    } else if deviation_percent > SHARP_DEVIATION_PERCENT {
        SHARP_DEVIATION_POINTS
    } else if deviation_percent > MODERATE_DEVIATION_PERCENT {
        MODERATE_DEVIATION_POINTS
    } else {
        0
    }
}

/// Score one member's full transaction history as of `now`.
pub fn score_transactions(
    txns: &[TransactionRecord],
    params: &ScoringParams,
    now: DateTime<Utc>,
) -> ScoreBreakdown {
    let window_start = now - Duration::hours(params.frequency_window_hours);
    let withdrawals: Vec<&TransactionRecord> = txns.iter().filter(|t| t.is_withdrawal()).collect();

    let recent_withdrawals = withdrawals
        .iter()
        .filter(|t| t.created_at >= window_start && t.created_at <= now)
        .count() as u32;
    let frequency_points = recent_withdrawals.saturating_sub(FREE_WITHDRAWALS_PER_WINDOW)
        * POINTS_PER_EXCESS_WITHDRAWAL;

    let large_withdrawals = withdrawals
        .iter()
        .filter(|t| t.amount >= params.large_withdrawal_amount)
        .count() as u32;
    let amount_points = large_withdrawals * POINTS_PER_LARGE_WITHDRAWAL;

    let has_completed_deposit = txns.iter().any(|t| t.is_completed_deposit());
    let no_deposit_points = if !withdrawals.is_empty() && !has_completed_deposit {
        NO_DEPOSIT_POINTS
    } else {
        0
    };

    let split = amount_split(txns, now, params.recent_window_days);
    let behavior_points = behavior_points(split.deviation_percent, split.historical_avg_amount);

    let avg_transaction_amount = if txns.is_empty() {
        0.0
    } else {
        txns.iter().map(|t| t.amount).sum::<f64>() / txns.len() as f64
    };

    ScoreBreakdown {
        frequency_points,
        amount_points,
        behavior_points,
        no_deposit_points,
        avg_transaction_amount,
        transaction_frequency: weekly_frequency(txns, now),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRiskScore {
    pub member_id: EntityId,
    pub total_points: u32,
    pub risk_level: RiskLevel,
    pub frequency_points: u32,
    pub amount_points: u32,
    pub behavior_points: u32,
    pub no_deposit_points: u32,
    pub avg_transaction_amount: f64,
    pub transaction_frequency: f64,
    pub last_calculated_at: DateTime<Utc>,
}

impl MemberRiskScore {
    pub fn from_breakdown(member_id: &str, breakdown: ScoreBreakdown, at: DateTime<Utc>) -> Self {
        Self {
            member_id: member_id.to_string(),
            total_points: breakdown.total_points(),
            risk_level: breakdown.risk_level(),
            frequency_points: breakdown.frequency_points,
            amount_points: breakdown.amount_points,
            behavior_points: breakdown.behavior_points,
            no_deposit_points: breakdown.no_deposit_points,
            avg_transaction_amount: breakdown.avg_transaction_amount,
            transaction_frequency: breakdown.transaction_frequency,
            last_calculated_at: at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecalculationReport {
    pub members_processed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskScoreFilter {
    pub risk_level: Option<RiskLevel>,
    pub min_points: Option<u32>,
}

/// Everything an investigator needs about one member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberRiskDetail {
    pub member: Member,
    pub risk_score: Option<MemberRiskScore>,
    pub behavior: BehaviorAnalysis,
    pub violations: Vec<RuleViolation>,
    pub decisions: Vec<FraudDecision>,
}

impl FraudEngine {
    fn scoring_params(&self) -> FraudResult<ScoringParams> {
        Ok(ScoringParams {
            large_withdrawal_amount: self.get_thresholds()?.large_withdrawal_amount,
            frequency_window_hours: self.config().scoring_window_hours,
            recent_window_days: self.config().recent_window_days,
        })
    }

    fn score_member(
        &self,
        member_id: &str,
        params: &ScoringParams,
        now: DateTime<Utc>,
    ) -> FraudResult<MemberRiskScore> {
        let txns = self.store.transactions_for_member(member_id)?;
        let breakdown = score_transactions(&txns, params, now);
        Ok(MemberRiskScore::from_breakdown(member_id, breakdown, now))
    }

    /// Recompute and upsert one member's score.
    pub fn recalculate_member(&self, member_id: &str) -> FraudResult<MemberRiskScore> {
        let member = self.get_member(member_id)?;
        let params = self.scoring_params()?;
        let score = self.score_member(&member.member_id, &params, self.now())?;
        self.store.upsert_risk_score(&score)?;
        log::debug!(
            "Member {} scored {} ({})",
            score.member_id,
            score.total_points,
            score.risk_level.as_str()
        );
        Ok(score)
    }

    /// Recompute every member's score. Safe to re-run after an interruption:
    /// each upsert replaces the member's row.
    pub fn recalculate_risk_scores(&self) -> FraudResult<RecalculationReport> {
        let now = self.now();
        let params = self.scoring_params()?;
        let member_ids = self.store.all_member_ids()?;

        for member_id in &member_ids {
            let score = self.score_member(member_id, &params, now)?;
            self.store.upsert_risk_score(&score)?;
        }

        let report = RecalculationReport { members_processed: member_ids.len() };
        log::info!("Risk scores recalculated for {} members", report.members_processed);
        self.audit(
            SYSTEM_ACTOR,
            AuditAction::RiskScoresRecalculated,
            "member_risk_score",
            None,
            serde_json::json!({
                "members_processed": report.members_processed,
                "large_withdrawal_amount": params.large_withdrawal_amount,
            }),
        );
        Ok(report)
    }

    /// Cached score, computed and stored first if the member has none yet.
    pub(crate) fn current_or_fresh_score(&self, member_id: &str) -> FraudResult<MemberRiskScore> {
        if let Some(score) = self.store.get_risk_score(member_id)? {
            return Ok(score);
        }
        let params = self.scoring_params()?;
        let score = self.score_member(member_id, &params, self.now())?;
        self.store.upsert_risk_score(&score)?;
        Ok(score)
    }

    pub fn list_risk_scores(
        &self,
        filter: &RiskScoreFilter,
        page: PageRequest,
    ) -> FraudResult<Page<MemberRiskScore>> {
        let page = self.page(page);
        let (items, total) = self.store.list_risk_scores(filter, page)?;
        Ok(Page::new(items, total, page))
    }

    pub fn get_member_risk_detail(&self, member_id: &str) -> FraudResult<MemberRiskDetail> {
        let member = self.get_member(member_id)?;
        let behavior = self.analyze_member(member_id)?;
        let risk_score = self.store.get_risk_score(member_id)?;
        let filter = ViolationFilter {
            member_id: Some(member_id.to_string()),
            ..ViolationFilter::default()
        };
        let violations = self.store.all_violations(&filter)?;
        let decisions = self.store.decisions_for_member(member_id)?;
        Ok(MemberRiskDetail {
            member,
            risk_score,
            behavior,
            violations,
            decisions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::{TransactionStatus, TransactionType};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 12, 12, 0, 0).unwrap()
    }

    fn params() -> ScoringParams {
        ScoringParams {
            large_withdrawal_amount: 100_000.0,
            frequency_window_hours: 24,
            recent_window_days: 30,
        }
    }

    fn withdrawal(amount: f64, hours_ago: i64) -> TransactionRecord {
        TransactionRecord {
            transaction_id: format!("w-{hours_ago}-{amount}"),
            member_id: "m-1".into(),
            txn_type: TransactionType::Withdrawal,
            amount,
            status: TransactionStatus::Completed,
            reference: None,
            created_at: now() - Duration::hours(hours_ago),
        }
    }

    fn deposit(amount: f64, hours_ago: i64) -> TransactionRecord {
        TransactionRecord {
            txn_type: TransactionType::Deposit,
            ..withdrawal(amount, hours_ago)
        }
    }

    #[test]
    fn tier_boundaries_are_exact() {
        assert_eq!(RiskLevel::from_points(0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_points(19), RiskLevel::Low);
        assert_eq!(RiskLevel::from_points(20), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_points(39), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_points(40), RiskLevel::High);
        assert_eq!(RiskLevel::from_points(59), RiskLevel::High);
        assert_eq!(RiskLevel::from_points(60), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_points(500), RiskLevel::Critical);
    }

    #[test]
    fn first_three_withdrawals_are_free() {
        let txns: Vec<_> = (1..=3).map(|h| withdrawal(100.0, h)).collect();
        let score = score_transactions(&txns, &params(), now());
        assert_eq!(score.frequency_points, 0);

        let txns: Vec<_> = (1..=5).map(|h| withdrawal(100.0, h)).collect();
        let score = score_transactions(&txns, &params(), now());
        assert_eq!(score.frequency_points, 20);
    }

    #[test]
    fn withdrawals_outside_window_do_not_count_toward_frequency() {
        let txns: Vec<_> = (30..=35).map(|h| withdrawal(100.0, h)).collect();
        let score = score_transactions(&txns, &params(), now());
        assert_eq!(score.frequency_points, 0);
    }

    #[test]
    fn large_withdrawals_at_threshold_count() {
        let txns = vec![
            deposit(500.0, 2000),
            withdrawal(100_000.0, 1000),
            withdrawal(99_999.0, 900),
            withdrawal(250_000.0, 800),
        ];
        let score = score_transactions(&txns, &params(), now());
        assert_eq!(score.amount_points, 30);
        assert_eq!(score.no_deposit_points, 0);
    }

    #[test]
    fn pending_deposit_does_not_cancel_no_deposit_points() {
        let mut pending = deposit(500.0, 10);
        pending.status = TransactionStatus::Pending;
        let txns = vec![pending, withdrawal(100.0, 5)];
        let score = score_transactions(&txns, &params(), now());
        assert_eq!(score.no_deposit_points, 25);

        let score = score_transactions(&[deposit(10.0, 5)], &params(), now());
        assert_eq!(score.no_deposit_points, 0);
    }

    #[test]
    fn behavior_points_by_deviation_band() {
        assert_eq!(behavior_points(150.0, 100.0), 20);
        assert_eq!(behavior_points(100.0, 100.0), 10);
        assert_eq!(behavior_points(50.5, 100.0), 10);
        assert_eq!(behavior_points(50.0, 100.0), 0);
        assert_eq!(behavior_points(400.0, 0.0), 0);
    }

    #[test]
    fn recent_only_history_scores_no_behavior_points() {
        let txns = vec![deposit(10.0, 48), withdrawal(9_000.0, 2)];
        let score = score_transactions(&txns, &params(), now());
        assert_eq!(score.behavior_points, 0);
    }

    #[test]
    fn sharp_recent_increase_scores_behavior_points() {
        let txns = vec![
            deposit(1_000.0, 24 * 60),
            deposit(1_000.0, 24 * 45),
            withdrawal(5_000.0, 24 * 2),
        ];
        let score = score_transactions(&txns, &params(), now());
        assert_eq!(score.behavior_points, 20);
        assert_eq!(score.total_points(), 20);
        assert_eq!(score.risk_level(), RiskLevel::Medium);
    }
}
