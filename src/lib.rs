//! stakewatch: violation-monitoring daemon for social staking circles
//!
//! Groups stake funds, define behavioral rules over their members' public
//! social-feed activity, and this service polls the feed, evaluates new
//! posts against the rules, records violations exactly once, and streams
//! them to WebSocket subscribers. Penalty settlement lives in an external
//! ledger; this service only flags violations and tracks their status.

pub mod config;
pub mod error;
pub mod feed;
pub mod models;
pub mod monitor;
pub mod notify;
pub mod rules;
pub mod server;
pub mod store;
