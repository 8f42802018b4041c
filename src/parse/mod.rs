//! Pure text parsers used by the record normalizer.
//!
//! Every function here is total and side-effect free: given the same input it
//! returns the same output and never fails. Ambiguous input resolves to
//! `None` rather than an error so that the normalizer can decide what to do
//! with an unresolved field.
//!
//! ```text
//! value  ── "(12.7%)" → -12.7 (pct), "(1,234)" → -1234, "Net Revenue" → net_revenue
//! period ── "Dec-24 YTD Actual" → 2024 / YTD / Dec-24
//! header ── "Financial Highlights (in KRW bn)" → KRW / bn
//! ```
//!
//! Heuristics that can match the same input are encoded as ordered rule
//! slices ([`value::VALUE_RULES`], [`period::PERIOD_RULES`]); the first rule
//! that matches wins, so adding a pattern means inserting it at the right
//! position rather than re-nesting conditionals.

pub mod header;
pub mod period;
pub mod value;

pub use header::{infer_header, HeaderInfo};
pub use period::{infer_period, infer_period_with_pivot, PeriodInfo, DEFAULT_CENTURY_PIVOT};
pub use value::{parse_numeric, parse_percentage, parse_value, to_canonical_key, ParsedValue};
