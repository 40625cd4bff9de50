use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use polars::prelude::*;
use std::path::{Path, PathBuf};

use super::QuoteStore;
use crate::engine::timeline::{datetime_values, REQUIRED_COLUMNS};

/// Accepted source names for the snapshot time, in lookup order.
const TIMESTAMP_ALIASES: [&str; 3] = ["timestamp", "quote_datetime", "snapshot_time"];
/// Accepted source names for the option expiry, in lookup order.
const EXPIRATION_ALIASES: [&str; 2] = ["expiration", "expiry"];

pub struct ParquetStore {
    path: PathBuf,
}

impl ParquetStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn scan(&self) -> Result<DataFrame> {
        let path_str = self.path.to_string_lossy().to_string();
        LazyFrame::scan_parquet(path_str.as_str().into(), ScanArgsParquet::default())?
            .collect()
            .with_context(|| format!("Failed to read Parquet file {}", self.path.display()))
    }
}

/// Rename the first present alias to `target` and cast it to
/// `Datetime(Microseconds)`. Date columns land at midnight; string columns
/// are parsed as dates.
pub fn normalize_datetime_column(df: DataFrame, aliases: &[&str], target: &str) -> Result<DataFrame> {
    let Some((src, dtype)) = aliases
        .iter()
        .find_map(|name| df.column(name).ok().map(|c| (*name, c.dtype().clone())))
    else {
        bail!("no '{target}' column found (looked for {})", aliases.join(", "));
    };

    let source = col(src);
    let expr = match dtype {
        DataType::Datetime(_, _) | DataType::Date => {
            source.cast(DataType::Datetime(TimeUnit::Microseconds, None))
        }
        DataType::String => source
            .cast(DataType::Date)
            .cast(DataType::Datetime(TimeUnit::Microseconds, None)),
        other => bail!("column '{src}' has unsupported type {other:?}"),
    };

    let collected = df.lazy().with_column(expr.alias(target)).collect()?;
    if src == target {
        Ok(collected)
    } else {
        Ok(collected.drop(src)?)
    }
}

/// Bring a raw quote table into the canonical layout: normalized time
/// columns, numeric prices as Float64, default adjustment ratios.
pub fn normalize_quotes(df: DataFrame) -> Result<DataFrame> {
    let df = normalize_datetime_column(df, &TIMESTAMP_ALIASES, "timestamp")?;
    let mut df = normalize_datetime_column(df, &EXPIRATION_ALIASES, "expiration")?;

    for name in REQUIRED_COLUMNS {
        if df.column(name).is_err() {
            bail!("quote table is missing required column '{name}'");
        }
    }

    let mut extra = Vec::new();
    for ratio in ["iv_ratio", "spot_ratio"] {
        if df.column(ratio).is_err() {
            extra.push(lit(1.0).alias(ratio));
        }
    }
    if !extra.is_empty() {
        df = df.lazy().with_columns(extra).collect()?;
    }

    let numeric = [
        "strike",
        "bid_price",
        "mark_price",
        "ask_price",
        "underlying_price",
        "iv_ratio",
        "spot_ratio",
    ];
    Ok(df
        .lazy()
        .with_columns(
            numeric
                .iter()
                .map(|name| col(*name).cast(DataType::Float64))
                .collect::<Vec<_>>(),
        )
        .sort(["timestamp"], SortMultipleOptions::default())
        .collect()?)
}

impl QuoteStore for ParquetStore {
    fn load_quotes(
        &self,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<DataFrame> {
        let mut df = normalize_quotes(self.scan()?)?;
        if let Some(start) = start {
            df = df.lazy().filter(col("timestamp").gt_eq(lit(start))).collect()?;
        }
        if let Some(end) = end {
            df = df.lazy().filter(col("timestamp").lt_eq(lit(end))).collect()?;
        }
        Ok(df)
    }

    fn date_range(&self) -> Result<(NaiveDateTime, NaiveDateTime)> {
        let df = normalize_quotes(self.scan()?)?;
        let timestamps = datetime_values(df.column("timestamp")?)?;
        let mut present = timestamps.into_iter().flatten();
        let Some(first) = present.next() else {
            bail!("{} contains no quotes", self.path.display());
        };
        Ok(present.fold((first, first), |(lo, hi), t| (lo.min(t), hi.max(t))))
    }
}
