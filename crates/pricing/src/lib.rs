//! Pure pricing math used to detect and size alerts.
//!
//! Nothing here performs I/O or holds state: every function is a deterministic
//! mapping of its numeric inputs. Callers are responsible for the sanity of those
//! inputs (negative prices, quantities, etc. are not rejected).
mod dedupe;
mod math;

pub use dedupe::{day_bucket, dedupe_key};
pub use math::{
    dead_stock_value, floor_breach_impact, list_breach_impact, round2, severity_from_impact,
    undercut_impact, LOW_CEILING, MED_CEILING, UNDERCUT_FORECAST_QTY,
};
