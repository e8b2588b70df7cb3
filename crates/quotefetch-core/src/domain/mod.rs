//! # Domain Models
//!
//! Identity and request vocabulary for quote-server contracts.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Root`] | Validated underlying root |
//! | [`QuoteDate`] | `YYYYMMDD` wire date with business-day arithmetic |
//! | [`Strike`] | Fixed-point strike (×1000) |
//! | [`Right`] | Call or put |
//! | [`Identity`] | Root + optional expiration + optional series |
//! | [`Operation`] | Closed set of server endpoints |
//!
//! Strike and right only travel together as an [`OptionLeg`], so a contract is
//! either a whole-expiration request or a single-series request by construction.

mod date;
mod operation;
mod option;
mod root;

pub use date::QuoteDate;
pub use operation::{CallType, DataKind, Operation};
pub use option::{Identity, OptionLeg, Right, SecurityType, Strike, STRIKE_SCALE};
pub use root::Root;
