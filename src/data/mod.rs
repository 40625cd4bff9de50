pub mod parquet;

use anyhow::Result;
use chrono::NaiveDateTime;
use polars::prelude::*;

/// Source of option quote snapshots in the canonical column layout
/// (`timestamp`, `expiration`, `type`, `strike`, `bid_price`, `mark_price`,
/// `ask_price`, `underlying_price`, `iv_ratio`, `spot_ratio`).
pub trait QuoteStore: Send + Sync {
    /// Quotes with `start <= timestamp <= end`; open bounds load everything.
    fn load_quotes(
        &self,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<DataFrame>;

    fn date_range(&self) -> Result<(NaiveDateTime, NaiveDateTime)>;
}
