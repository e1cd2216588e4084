//! Deterministic demo data.
//!
//! Every member and transaction is derived from the seed alone, so the same
//! `--seed` and `--as-of` always produce the same ledger and the same scan.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use sacco_fraud_core::{
    error::FraudResult,
    member::{Member, MemberStatus, TransactionRecord, TransactionStatus, TransactionType},
    store::FraudStore,
};
use serde::Serialize;

/// Behaviour pattern a demo member is generated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Profile {
    /// Regular deposits, modest withdrawals.
    Steady,
    /// A run of withdrawals inside one day.
    Burst,
    /// Established saver who suddenly moves a large sum.
    LargeWithdrawer,
    /// Withdraws without ever completing a deposit.
    NoDeposit,
}

impl Profile {
    fn roll(rng: &mut Pcg64Mcg) -> Self {
        let roll: f64 = rng.gen();
        if roll < 0.70 {
            Self::Steady
        } else if roll < 0.85 {
            Self::Burst
        } else if roll < 0.95 {
            Self::LargeWithdrawer
        } else {
            Self::NoDeposit
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct DemoSummary {
    pub members: usize,
    pub transactions: usize,
    pub steady: usize,
    pub burst: usize,
    pub large_withdrawers: usize,
    pub no_deposit: usize,
}

struct Ledger<'a> {
    store: &'a FraudStore,
    member_id: String,
    next_txn: usize,
    written: usize,
}

impl Ledger<'_> {
    fn record(
        &mut self,
        txn_type: TransactionType,
        amount: f64,
        status: TransactionStatus,
        at: DateTime<Utc>,
    ) -> FraudResult<()> {
        self.next_txn += 1;
        self.store.insert_transaction(&TransactionRecord {
            transaction_id: format!("{}-t{:03}", self.member_id, self.next_txn),
            member_id: self.member_id.clone(),
            txn_type,
            amount: cents(amount),
            status,
            reference: Some(format!("DEMO-{}-{:03}", self.member_id, self.next_txn)),
            created_at: at,
        })?;
        self.written += 1;
        Ok(())
    }
}

fn cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Write `count` demo members and their histories. Returns what was written.
pub fn generate(store: &FraudStore, count: usize, seed: u64, now: DateTime<Utc>) -> Result<DemoSummary> {
    let mut rng = Pcg64Mcg::seed_from_u64(seed);
    let mut summary = DemoSummary::default();

    store.atomically(|| {
        for i in 1..=count {
            let member_id = format!("demo-{i:05}");
            store.insert_member(&Member {
                member_id: member_id.clone(),
                member_number: format!("SACCO-{i:05}"),
                full_name: format!("Demo Member {i}"),
                status: MemberStatus::Active,
                balance: 0.0,
                created_at: now - Duration::days(180),
            })?;

            let mut ledger = Ledger { store, member_id, next_txn: 0, written: 0 };
            let profile = Profile::roll(&mut rng);
            write_history(&mut ledger, profile, &mut rng, now)?;

            summary.members += 1;
            summary.transactions += ledger.written;
            match profile {
                Profile::Steady => summary.steady += 1,
                Profile::Burst => summary.burst += 1,
                Profile::LargeWithdrawer => summary.large_withdrawers += 1,
                Profile::NoDeposit => summary.no_deposit += 1,
            }
        }
        Ok(())
    })?;

    log::info!(
        "Demo data: {} members, {} transactions",
        summary.members,
        summary.transactions
    );
    Ok(summary)
}

fn write_history(
    ledger: &mut Ledger<'_>,
    profile: Profile,
    rng: &mut Pcg64Mcg,
    now: DateTime<Utc>,
) -> FraudResult<()> {
    let hours_ago = |h: i64| now - Duration::hours(h);

    match profile {
        Profile::Steady => {
            let deposits = rng.gen_range(4..12);
            for _ in 0..deposits {
                let at = hours_ago(rng.gen_range(24..24 * 150));
                ledger.record(
                    TransactionType::Deposit,
                    rng.gen_range(1_000.0..20_000.0),
                    TransactionStatus::Completed,
                    at,
                )?;
            }
            let withdrawals = rng.gen_range(1..6);
            for _ in 0..withdrawals {
                let at = hours_ago(rng.gen_range(1..24 * 150));
                ledger.record(
                    TransactionType::Withdrawal,
                    rng.gen_range(500.0..8_000.0),
                    TransactionStatus::Completed,
                    at,
                )?;
            }
        }
        Profile::Burst => {
            ledger.record(
                TransactionType::Deposit,
                rng.gen_range(20_000.0..60_000.0),
                TransactionStatus::Completed,
                hours_ago(24 * 60),
            )?;
            let burst = rng.gen_range(4..8);
            for _ in 0..burst {
                ledger.record(
                    TransactionType::Withdrawal,
                    rng.gen_range(2_000.0..30_000.0),
                    TransactionStatus::Completed,
                    hours_ago(rng.gen_range(1..20)),
                )?;
            }
        }
        Profile::LargeWithdrawer => {
            for month in 2..6 {
                ledger.record(
                    TransactionType::Deposit,
                    rng.gen_range(5_000.0..15_000.0),
                    TransactionStatus::Completed,
                    hours_ago(24 * 30 * month),
                )?;
            }
            let large = rng.gen_range(1..3);
            for _ in 0..large {
                ledger.record(
                    TransactionType::Withdrawal,
                    rng.gen_range(100_000.0..300_000.0),
                    TransactionStatus::Completed,
                    hours_ago(rng.gen_range(2..24 * 10)),
                )?;
            }
        }
        Profile::NoDeposit => {
            if rng.gen_bool(0.5) {
                ledger.record(
                    TransactionType::Deposit,
                    rng.gen_range(1_000.0..5_000.0),
                    TransactionStatus::Pending,
                    hours_ago(72),
                )?;
            }
            let withdrawals = rng.gen_range(1..4);
            for _ in 0..withdrawals {
                ledger.record(
                    TransactionType::Withdrawal,
                    rng.gen_range(1_000.0..12_000.0),
                    TransactionStatus::Completed,
                    hours_ago(rng.gen_range(1..24 * 5)),
                )?;
            }
        }
    }
    Ok(())
}
