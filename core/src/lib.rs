//! SACCO fraud decision pipeline.
//!
//! Rule evaluation, behavioural baselines, risk scoring and the decision
//! layer over a SQLite store. `FraudEngine` is the entry point.

pub mod audit;
pub mod behavior_analyzer;
pub mod clock;
pub mod config;
pub mod decision_logic;
pub mod engine;
pub mod error;
pub mod member;
pub mod risk_scoring;
pub mod rule_catalog;
pub mod rule_engine;
pub mod store;
pub mod threshold;
pub mod types;
pub mod violation;
pub mod withdrawal_request;
