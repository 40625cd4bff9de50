#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use polars::prelude::*;
use std::path::{Path, PathBuf};

use optsim::engine::black_scholes;
use optsim::engine::types::{OptionType, DAYS_PER_YEAR};

/// Maturities quoted in every synthetic snapshot, in days.
pub const MATURITIES: [i64; 3] = [1, 7, 30];

pub fn ts(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 4, day)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

/// Quote table with one snapshot per `(time, spot)`. Every snapshot quotes
/// calls and puts at [`MATURITIES`] with strikes from 70% to 130% of spot,
/// priced with Black-Scholes at `iv(strike / spot, days)` and a 3% spread
/// either side of mark. Prices are fractions of spot.
pub fn make_quote_df(snapshots: &[(NaiveDateTime, f64)], iv: impl Fn(f64, f64) -> f64) -> DataFrame {
    let mut timestamp = Vec::new();
    let mut expiration = Vec::new();
    let mut option_type = Vec::new();
    let mut strike = Vec::new();
    let mut bid = Vec::new();
    let mut mark = Vec::new();
    let mut ask = Vec::new();
    let mut underlying = Vec::new();

    for &(time, spot) in snapshots {
        for days in MATURITIES {
            let tau = days as f64 / DAYS_PER_YEAR;
            for i in 0..=12 {
                let k = spot * (0.7 + 0.05 * f64::from(i));
                let vol = iv(k / spot, days as f64);
                for kind in [OptionType::Call, OptionType::Put] {
                    let price = black_scholes::price(kind, spot, k, tau, 0.0, vol) / spot;
                    timestamp.push(time);
                    expiration.push(time + TimeDelta::days(days));
                    option_type.push(kind.as_str());
                    strike.push(k);
                    bid.push(price * 0.97);
                    mark.push(price);
                    ask.push(price * 1.03);
                    underlying.push(spot);
                }
            }
        }
    }

    df! {
        "timestamp" => timestamp,
        "expiration" => expiration,
        "type" => option_type,
        "strike" => strike,
        "bid_price" => bid,
        "mark_price" => mark,
        "ask_price" => ask,
        "underlying_price" => underlying,
    }
    .unwrap()
}

/// Flat-volatility table.
pub fn make_flat_df(snapshots: &[(NaiveDateTime, f64)], vol: f64) -> DataFrame {
    make_quote_df(snapshots, |_, _| vol)
}

/// Hourly snapshots over `days` days with spot following `path(hour)`.
pub fn hourly_snapshots(days: u32, path: impl Fn(usize) -> f64) -> Vec<(NaiveDateTime, f64)> {
    (0..(days as usize * 24))
        .map(|h| (ts(1, 0) + TimeDelta::hours(h as i64), path(h)))
        .collect()
}

pub fn write_test_parquet(dir: &Path, name: &str, df: &mut DataFrame) -> PathBuf {
    let path = dir.join(name);
    let file = std::fs::File::create(&path).unwrap();
    ParquetWriter::new(file).finish(df).unwrap();
    path
}
