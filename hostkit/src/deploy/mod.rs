//! Deploy governance: classification, admission, circuit breaking, migrations

pub mod auto_pause;
pub mod classify;
pub mod fsm;
pub mod ledger;
pub mod migrate;
pub mod pipeline;
pub mod rate_limit;
pub mod standalone;
