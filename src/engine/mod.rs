//! Core engine: outcome sources, validation, payouts, the ledger, and the
//! spin loop that ties them together.

pub mod ledger;
pub mod payout;
pub mod scheduler;
pub mod source;
pub mod validator;

pub use ledger::{compute_metrics, Ledger, Metrics};
pub use scheduler::{run_spins, RunHandle, RunHeader, RunOutcome, RunProgress, RunSnapshot};
