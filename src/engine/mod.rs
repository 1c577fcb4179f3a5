//! Pure computation engine(s) for deterministic ledger logic.
//!
//! Nothing in here performs I/O. Each stage takes the rows (and whatever
//! accumulated state the previous stage produced) and returns them enriched;
//! soft failures are collected into an `AnomalyReport` instead of aborting.

pub mod anomaly;
pub mod balance;
pub mod forex;
pub mod matcher;
pub mod packs;
pub mod profit;
pub mod projection;
pub mod synthesis;
pub mod window;

pub use anomaly::{Anomaly, AnomalyReport, RowContext};
pub use balance::{apply_running_balance, balance_delta};
pub use forex::{apply_forex, ForexError, LotLedger};
pub use matcher::{ActivityMatcher, FeeSchedule, MatchState, TokenLookup};
pub use packs::{apportion, pack_records, PackCost};
pub use profit::{compute_profits, days_held};
pub use synthesis::synthesize;
pub use window::{shrinking_match, WindowCandidate, WindowMatch};
