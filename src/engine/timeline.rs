//! Time-indexed collection of option chains built from a quote table.

use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use polars::prelude::*;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use tracing::{info, warn};

use super::surface::OptionChain;
use super::types::{OptionType, Quote, SurfaceConfig};

/// Columns every quote table must carry.
pub const REQUIRED_COLUMNS: [&str; 8] = [
    "timestamp",
    "expiration",
    "type",
    "strike",
    "bid_price",
    "mark_price",
    "ask_price",
    "underlying_price",
];

#[derive(Debug, Clone, Default)]
pub struct ChainTimeline {
    chains: BTreeMap<NaiveDateTime, OptionChain>,
}

impl ChainTimeline {
    pub fn from_chains(chains: impl IntoIterator<Item = OptionChain>) -> Self {
        Self {
            chains: chains.into_iter().map(|c| (c.timestamp(), c)).collect(),
        }
    }

    /// Group quote rows by timestamp into one chain per snapshot.
    ///
    /// `iv_ratio` and `spot_ratio` default to 1.0 when absent. Rows with an
    /// unknown option type or missing values are dropped.
    pub fn from_dataframe(df: &DataFrame, config: SurfaceConfig) -> Result<Self> {
        for name in REQUIRED_COLUMNS {
            if df.column(name).is_err() {
                bail!("quote table is missing required column '{name}'");
            }
        }

        let timestamps = datetime_values(df.column("timestamp")?)
            .context("Failed to read 'timestamp' column")?;
        let expirations = datetime_values(df.column("expiration")?)
            .context("Failed to read 'expiration' column")?;
        let types = df.column("type")?.str()?.clone();
        let strike = float_values(df, "strike")?;
        let bid = float_values(df, "bid_price")?;
        let mark = float_values(df, "mark_price")?;
        let ask = float_values(df, "ask_price")?;
        let underlying = float_values(df, "underlying_price")?;
        let iv_ratio = optional_float_values(df, "iv_ratio", 1.0)?;
        let spot_ratio = optional_float_values(df, "spot_ratio", 1.0)?;

        let mut grouped: FxHashMap<NaiveDateTime, Vec<Quote>> = FxHashMap::default();
        let mut dropped = 0usize;
        for idx in 0..df.height() {
            let row = (
                timestamps[idx],
                expirations[idx],
                types.get(idx).and_then(OptionType::parse),
                strike[idx],
                bid[idx],
                mark[idx],
                ask[idx],
                underlying[idx],
            );
            let (Some(ts), Some(expiration), Some(option_type), Some(k), Some(b), Some(m), Some(a), Some(u)) =
                row
            else {
                dropped += 1;
                continue;
            };
            grouped.entry(ts).or_default().push(Quote {
                option_type,
                strike: k,
                expiration,
                bid_price: b,
                mark_price: m,
                ask_price: a,
                underlying_price: u,
                iv_ratio: iv_ratio[idx].unwrap_or(1.0),
                spot_ratio: spot_ratio[idx].unwrap_or(1.0),
            });
        }
        if dropped > 0 {
            warn!(dropped, "dropped quote rows with missing or unrecognised values");
        }

        let mut chains = BTreeMap::new();
        for (ts, quotes) in grouped {
            match OptionChain::new(ts, quotes, config) {
                Ok(chain) => {
                    chains.insert(ts, chain);
                }
                Err(e) => warn!(%ts, "skipping snapshot: {e}"),
            }
        }
        info!(snapshots = chains.len(), rows = df.height(), "built chain timeline");
        Ok(Self { chains })
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    pub fn timestamps(&self) -> impl Iterator<Item = NaiveDateTime> + '_ {
        self.chains.keys().copied()
    }

    pub fn date_range(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let first = self.chains.keys().next()?;
        let last = self.chains.keys().next_back()?;
        Some((*first, *last))
    }

    /// The snapshot taken exactly at `time`.
    pub fn snapshot_at(&self, time: NaiveDateTime) -> Option<&OptionChain> {
        self.chains.get(&time)
    }

    /// Most recent snapshot at or before `time`.
    pub fn latest_at(&self, time: NaiveDateTime) -> Option<&OptionChain> {
        self.chains.range(..=time).next_back().map(|(_, chain)| chain)
    }
}

fn float_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df
        .column(name)?
        .cast(&DataType::Float64)
        .with_context(|| format!("Column '{name}' is not numeric"))?;
    Ok(column
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect())
}

fn optional_float_values(df: &DataFrame, name: &str, default: f64) -> Result<Vec<Option<f64>>> {
    if df.column(name).is_ok() {
        float_values(df, name)
    } else {
        Ok(vec![Some(default); df.height()])
    }
}

/// Read a Date or Datetime column as naive timestamps.
pub fn datetime_values(col: &Column) -> Result<Vec<Option<NaiveDateTime>>> {
    match col.dtype() {
        DataType::Date => Ok(col
            .date()?
            .phys
            .into_iter()
            .map(|d| {
                d.and_then(|days| {
                    // epoch offset: days from CE to 1970-01-01
                    chrono::NaiveDate::from_num_days_from_ce_opt(days + 719_163)
                        .and_then(|date| date.and_hms_opt(0, 0, 0))
                })
            })
            .collect()),
        DataType::Datetime(tu, _) => {
            let tu = *tu;
            Ok(col
                .datetime()?
                .phys
                .into_iter()
                .map(|v| {
                    v.and_then(|v| match tu {
                        TimeUnit::Milliseconds => chrono::DateTime::from_timestamp_millis(v),
                        TimeUnit::Microseconds => chrono::DateTime::from_timestamp_micros(v),
                        TimeUnit::Nanoseconds => {
                            let secs = v.div_euclid(1_000_000_000);
                            let nsecs = v.rem_euclid(1_000_000_000) as u32;
                            chrono::DateTime::from_timestamp(secs, nsecs)
                        }
                    })
                    .map(|dt| dt.naive_utc())
                })
                .collect())
        }
        other => bail!("Unsupported column type for timestamp extraction: {other:?}"),
    }
}
