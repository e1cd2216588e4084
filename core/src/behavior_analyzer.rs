//! Behavior analyzer — per-member statistical baselines.
//!
//! Read-only. The numbers feed the risk scorer (deviation between recent
//! and historical average amounts) and operator dashboards.

use crate::{
    engine::FraudEngine,
    error::FraudResult,
    member::{TransactionRecord, TransactionStatus},
    risk_scoring::RiskLevel,
    types::{EntityId, Page, PageRequest},
};
use chrono::{DateTime, Datelike, Duration, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Sunday-first, matching the day-of-week bucket order.
const WEEKDAYS: [Weekday; 7] = [
    Weekday::Sun,
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
];

/// Recent vs historical average transaction amount.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmountSplit {
    pub recent_count: usize,
    pub historical_count: usize,
    pub recent_avg_amount: f64,
    pub historical_avg_amount: f64,
    /// 0 when there is no historical baseline.
    pub deviation_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorAnalysis {
    pub member_id: EntityId,
    pub total_transactions: usize,
    pub deposit_count: usize,
    pub withdrawal_count: usize,
    pub avg_deposit_amount: f64,
    pub avg_withdrawal_amount: f64,
    pub avg_transaction_amount: f64,
    pub weekly_frequency: f64,
    pub recent_avg_amount: f64,
    pub historical_avg_amount: f64,
    pub amount_deviation_percent: f64,
    pub flagged_transactions: usize,
    /// Transaction counts, Sunday first.
    pub activity_by_weekday: [u32; 7],
    /// `None` when the member has no transactions.
    pub peak_activity_day: Option<Weekday>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorSummary {
    pub total_members: i64,
    pub total_transactions: i64,
    pub recent_transactions: i64,
    pub flagged_transactions: i64,
    pub avg_transaction_amount: f64,
    pub high_risk_members: i64,
}

fn mean(amounts: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = amounts.fold((0.0, 0usize), |(s, n), a| (s + a, n + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Split at `now - recent_window_days` and compare the two mean amounts.
pub fn amount_split(
    txns: &[TransactionRecord],
    now: DateTime<Utc>,
    recent_window_days: i64,
) -> AmountSplit {
    let boundary = now - Duration::days(recent_window_days);
    let (recent, historical): (Vec<&TransactionRecord>, Vec<&TransactionRecord>) =
        txns.iter().partition(|t| t.created_at >= boundary);

    let recent_avg_amount = mean(recent.iter().map(|t| t.amount));
    let historical_avg_amount = mean(historical.iter().map(|t| t.amount));
    let deviation_percent = if historical_avg_amount > 0.0 {
        (recent_avg_amount - historical_avg_amount) / historical_avg_amount * 100.0
    } else {
        0.0
    };

    AmountSplit {
        recent_count: recent.len(),
        historical_count: historical.len(),
        recent_avg_amount,
        historical_avg_amount,
        deviation_percent,
    }
}

/// Lifetime transaction count per week since the first transaction,
/// counting at least one week.
pub fn weekly_frequency(txns: &[TransactionRecord], now: DateTime<Utc>) -> f64 {
    let Some(first) = txns.iter().map(|t| t.created_at).min() else {
        return 0.0;
    };
    let weeks = (now - first).num_weeks().max(1);
    txns.len() as f64 / weeks as f64
}

/// Build the full analysis from a member's transactions.
pub fn analyze_transactions(
    member_id: &str,
    txns: &[TransactionRecord],
    now: DateTime<Utc>,
    recent_window_days: i64,
) -> BehaviorAnalysis {
    let deposits: Vec<f64> = txns.iter().filter(|t| t.is_deposit()).map(|t| t.amount).collect();
    let withdrawals: Vec<f64> = txns.iter().filter(|t| t.is_withdrawal()).map(|t| t.amount).collect();
    let split = amount_split(txns, now, recent_window_days);

    let mut activity_by_weekday = [0u32; 7];
    for txn in txns {
        activity_by_weekday[txn.created_at.weekday().num_days_from_sunday() as usize] += 1;
    }
    let peak_activity_day = if txns.is_empty() {
        None
    } else {
        let mut peak = 0;
        for day in 1..7 {
            if activity_by_weekday[day] > activity_by_weekday[peak] {
                peak = day;
            }
        }
        Some(WEEKDAYS[peak])
    };

    BehaviorAnalysis {
        member_id: member_id.to_string(),
        total_transactions: txns.len(),
        deposit_count: deposits.len(),
        withdrawal_count: withdrawals.len(),
        avg_deposit_amount: mean(deposits.iter().copied()),
        avg_withdrawal_amount: mean(withdrawals.iter().copied()),
        avg_transaction_amount: mean(txns.iter().map(|t| t.amount)),
        weekly_frequency: weekly_frequency(txns, now),
        recent_avg_amount: split.recent_avg_amount,
        historical_avg_amount: split.historical_avg_amount,
        amount_deviation_percent: split.deviation_percent,
        flagged_transactions: txns
            .iter()
            .filter(|t| t.status == TransactionStatus::Flagged)
            .count(),
        activity_by_weekday,
        peak_activity_day,
    }
}

impl FraudEngine {
    pub fn analyze_member(&self, member_id: &str) -> FraudResult<BehaviorAnalysis> {
        let member = self.get_member(member_id)?;
        let txns = self.store.transactions_for_member(&member.member_id)?;
        Ok(analyze_transactions(
            &member.member_id,
            &txns,
            self.now(),
            self.config().recent_window_days,
        ))
    }

    /// One member's analysis, or a page of analyses across all members.
    pub fn analyze_behavior(
        &self,
        member_id: Option<&str>,
        page: PageRequest,
    ) -> FraudResult<Page<BehaviorAnalysis>> {
        let page = self.page(page);
        if let Some(member_id) = member_id {
            let analysis = self.analyze_member(member_id)?;
            return Ok(Page::new(vec![analysis], 1, page));
        }

        let now = self.now();
        let (member_ids, total) = self.store.member_ids_page(page)?;
        let mut items = Vec::with_capacity(member_ids.len());
        for member_id in member_ids {
            let txns = self.store.transactions_for_member(&member_id)?;
            items.push(analyze_transactions(
                &member_id,
                &txns,
                now,
                self.config().recent_window_days,
            ));
        }
        Ok(Page::new(items, total, page))
    }

    pub fn summarize_behavior(&self) -> FraudResult<BehaviorSummary> {
        let now = self.now();
        let recent_since = now - Duration::days(self.config().recent_window_days);
        let high_risk_members = self.store.count_risk_scores_at_level(RiskLevel::High)?
            + self.store.count_risk_scores_at_level(RiskLevel::Critical)?;

        Ok(BehaviorSummary {
            total_members: self.store.member_count()?,
            total_transactions: self.store.transaction_count()?,
            recent_transactions: self.store.transaction_count_since(recent_since)?,
            flagged_transactions: self
                .store
                .transaction_count_with_status(TransactionStatus::Flagged)?,
            avg_transaction_amount: self.store.avg_transaction_amount()?,
            high_risk_members,
        })
    }
}
