//! Daily image scheduling: day identifiers resolve to release dates with
//! ledger-backed rotation, and generation requests run one at a time through
//! a drain-on-shutdown task queue.

pub mod cli;
pub mod core;
pub mod logging;
