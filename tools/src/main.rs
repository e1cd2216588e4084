//! fraud-runner: headless scan runner for the SACCO fraud pipeline.
//!
//! Usage:
//!   fraud-runner --db fraud.db
//!   fraud-runner --demo-members 200 --seed 7 --as-of 2024-06-12T12:00:00Z
//!   fraud-runner --db fraud.db --config engine.json
//!
//! Opens (and migrates) the store, installs the seed rule catalog when it is
//! empty, optionally writes demo members, then runs the full scan and prints
//! a JSON summary.

mod demo;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sacco_fraud_core::{
    clock::EngineClock,
    config::EngineConfig,
    engine::{EngineStats, FraudEngine, ScanReport},
    store::FraudStore,
    types::SYSTEM_ACTOR,
};
use std::env;

#[derive(serde::Serialize)]
struct RunSummary {
    db: String,
    as_of: DateTime<Utc>,
    rules_installed: usize,
    demo: Option<demo::DemoSummary>,
    scan: ScanReport,
    stats: EngineStats,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let demo_members = parse_arg(&args, "--demo-members", 0usize);
    let db = string_arg(&args, "--db").unwrap_or(":memory:");
    let config = match string_arg(&args, "--config") {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let clock = match string_arg(&args, "--as-of") {
        Some(raw) => EngineClock::Fixed(
            DateTime::parse_from_rfc3339(raw)
                .with_context(|| format!("--as-of {raw} is not an RFC 3339 timestamp"))?
                .with_timezone(&Utc),
        ),
        None => EngineClock::System,
    };

    let store = if db == ":memory:" {
        FraudStore::in_memory()?
    } else {
        FraudStore::open(db)?
    };
    let engine = FraudEngine::build(store, config)?.with_clock(clock);
    let as_of = engine.now();

    let rules_installed = engine.bootstrap(SYSTEM_ACTOR)?;

    let demo = if demo_members == 0 {
        None
    } else if engine.store.member_count()? > 0 {
        log::warn!("Store already has members; skipping demo data");
        None
    } else {
        Some(demo::generate(&engine.store, demo_members, seed, as_of)?)
    };

    let scan = engine.run_scan()?;
    let stats = engine.get_engine_stats()?;

    let summary = RunSummary {
        db: db.to_string(),
        as_of,
        rules_installed,
        demo,
        scan,
        stats,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn parse_arg<T: std::str::FromStr>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn string_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
