//! Surface engine integration tests.
//!
//! Quote tables are generated from known volatilities, loaded through the
//! Parquet store, and the surface lookups are checked against them.

use chrono::TimeDelta;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use optsim::data::parquet::ParquetStore;
use optsim::data::QuoteStore;
use optsim::engine::black_scholes;
use optsim::engine::surface::OptionChain;
use optsim::engine::timeline::ChainTimeline;
use optsim::engine::types::{OptionType, Quote, QuoteSide, SurfaceConfig, DAYS_PER_YEAR};

mod common;
use common::{make_flat_df, make_quote_df, ts, write_test_parquet};

/// Term structure: 50% at 1 day, 40% at 7 days, 60% at 30 days, flat in strike.
fn term_vol(_moneyness: f64, days: f64) -> f64 {
    if days < 2.0 {
        0.5
    } else if days < 10.0 {
        0.4
    } else {
        0.6
    }
}

fn expected_term_iv(days: f64, (d_lo, iv_lo): (f64, f64), (d_hi, iv_hi): (f64, f64)) -> f64 {
    let (t, t_lo, t_hi) = (days / DAYS_PER_YEAR, d_lo / DAYS_PER_YEAR, d_hi / DAYS_PER_YEAR);
    let var_lo = t_lo * iv_lo * iv_lo;
    let var_hi = t_hi * iv_hi * iv_hi;
    let var = var_lo + (t - t_lo) * (var_hi - var_lo) / (t_hi - t_lo);
    (var / t).sqrt()
}

fn term_chain() -> OptionChain {
    let tmp = TempDir::new().unwrap();
    let mut df = make_quote_df(&[(ts(1, 0), 100.0), (ts(1, 1), 101.0)], term_vol);
    let path = write_test_parquet(tmp.path(), "quotes.parquet", &mut df);
    let quotes = ParquetStore::new(&path).load_quotes(None, None).unwrap();
    let timeline = ChainTimeline::from_dataframe(&quotes, SurfaceConfig::default()).unwrap();
    assert_eq!(timeline.len(), 2);
    timeline.snapshot_at(ts(1, 0)).unwrap().clone()
}

#[test]
fn term_structure_uses_variance_time_interpolation() {
    let chain = term_chain();
    assert!((chain.spot() - 100.0).abs() < 1e-9);

    for (days, lo, hi) in [
        (3.0, (1.0, 0.5), (7.0, 0.4)),
        (14.0, (7.0, 0.4), (30.0, 0.6)),
        (20.0, (7.0, 0.4), (30.0, 0.6)),
        // Beyond the last maturity: extrapolated from the two nearest.
        (45.0, (7.0, 0.4), (30.0, 0.6)),
    ] {
        let iv = chain
            .implied_vol(100.0, days, OptionType::Call, QuoteSide::Mark)
            .unwrap();
        let expected = expected_term_iv(days, lo, hi);
        assert!(
            (iv - expected).abs() < 1e-4,
            "{days} days: got {iv}, expected {expected}"
        );
    }
}

#[test]
fn quoted_maturity_returns_its_own_iv() {
    let chain = term_chain();
    for (days, vol) in [(7.0, 0.4), (30.0, 0.6)] {
        for option_type in [OptionType::Call, OptionType::Put] {
            let iv = chain.implied_vol(100.0, days, option_type, QuoteSide::Mark).unwrap();
            assert!((iv - vol).abs() < 1e-4, "{option_type} {days}d: {iv}");
        }
    }
}

#[test]
fn bid_surface_sits_below_ask_surface() {
    let chain = term_chain();
    let bid = chain.price_by_strike(105.0, 14.0, OptionType::Call, QuoteSide::Bid).unwrap();
    let mark = chain.price_by_strike(105.0, 14.0, OptionType::Call, QuoteSide::Mark).unwrap();
    let ask = chain.price_by_strike(105.0, 14.0, OptionType::Call, QuoteSide::Ask).unwrap();
    assert!(bid.iv < mark.iv && mark.iv < ask.iv);
    assert!(bid.price < mark.price && mark.price < ask.price);
}

#[test]
fn skew_extrapolation_is_clamped() {
    // Rising call skew on out-of-the-money strikes only: 30% at 100 up to 50% at 140.
    let t0 = ts(1, 0);
    let spot = 100.0;
    let mut quotes = Vec::new();
    for days in [7, 30] {
        let tau = days as f64 / DAYS_PER_YEAR;
        for (strike, vol) in [(100.0, 0.3), (110.0, 0.35), (120.0, 0.4), (130.0, 0.45), (140.0, 0.5)] {
            let p = black_scholes::price(OptionType::Call, spot, strike, tau, 0.0, vol) / spot;
            quotes.push(Quote {
                option_type: OptionType::Call,
                strike,
                expiration: t0 + TimeDelta::days(days),
                bid_price: p,
                mark_price: p,
                ask_price: p,
                underlying_price: spot,
                iv_ratio: 1.0,
                spot_ratio: 1.0,
            });
        }
    }
    let config = SurfaceConfig {
        iv_margin: 1.2,
        ..SurfaceConfig::default()
    };
    let chain = OptionChain::new(t0, quotes, config).unwrap();

    let high = chain.implied_vol(400.0, 7.0, OptionType::Call, QuoteSide::Mark).unwrap();
    assert!((high - 0.5 * 1.2).abs() < 1e-4, "upper clamp: {high}");
    let low = chain.implied_vol(40.0, 7.0, OptionType::Call, QuoteSide::Mark).unwrap();
    assert!((low - 0.3).abs() < 1e-4, "lower clamp: {low}");
    let inside = chain.implied_vol(115.0, 7.0, OptionType::Call, QuoteSide::Mark).unwrap();
    assert!((inside - 0.375).abs() < 1e-4, "interpolated: {inside}");
}

#[test]
fn delta_lookup_is_monotone_in_target() {
    let df = make_quote_df(&[(ts(2, 0), 100.0)], |m, _| 0.5 + 0.2 * (m - 1.0).abs());
    let timeline = ChainTimeline::from_dataframe(&df, SurfaceConfig::default()).unwrap();
    let chain = timeline.latest_at(ts(2, 6)).unwrap();

    let strike = |target: f64, option_type| {
        let pricing = chain
            .price_by_delta(target, 10.0, option_type, QuoteSide::Mark)
            .unwrap();
        let delta = black_scholes::delta(
            option_type,
            chain.spot(),
            pricing.strike,
            10.0 / DAYS_PER_YEAR,
            0.0,
            pricing.iv,
        );
        assert!((delta - target).abs() < 1e-6, "{option_type} target {target}: {delta}");
        pricing.strike
    };

    let calls: Vec<f64> = [0.1, 0.25, 0.5, 0.75].iter().map(|&d| strike(d, OptionType::Call)).collect();
    assert!(calls.windows(2).all(|w| w[0] > w[1]), "call strikes {calls:?}");
    let puts: Vec<f64> = [-0.1, -0.25, -0.5, -0.75].iter().map(|&d| strike(d, OptionType::Put)).collect();
    assert!(puts.windows(2).all(|w| w[0] < w[1]), "put strikes {puts:?}");
}

#[test]
fn strike_by_price_inverts_price_by_strike() {
    let df = make_flat_df(&[(ts(3, 0), 250.0)], 0.7);
    let timeline = ChainTimeline::from_dataframe(&df, SurfaceConfig::default()).unwrap();
    let chain = timeline.snapshot_at(ts(3, 0)).unwrap();
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..25 {
        let option_type = if rng.random_bool(0.5) { OptionType::Call } else { OptionType::Put };
        let strike = 250.0 * rng.random_range(0.85..1.15);
        let days = rng.random_range(3.0..25.0);
        let forward = chain.price_by_strike(strike, days, option_type, QuoteSide::Mark).unwrap();
        let back = chain.strike_by_price(forward.price, days, option_type, QuoteSide::Mark).unwrap();
        assert!(
            (back.strike - strike).abs() / strike < 1e-6,
            "{option_type} {days:.2}d: {strike} -> {} -> {}",
            forward.price,
            back.strike
        );
    }
}

#[test]
fn snapshots_outside_the_filter_are_excluded() {
    let tmp = TempDir::new().unwrap();
    let mut df = make_flat_df(&[(ts(1, 0), 100.0), (ts(1, 1), 100.0), (ts(1, 2), 100.0)], 0.5);
    let path = write_test_parquet(tmp.path(), "quotes.parquet", &mut df);
    let store = ParquetStore::new(&path);

    let quotes = store.load_quotes(Some(ts(1, 1)), None).unwrap();
    let timeline = ChainTimeline::from_dataframe(&quotes, SurfaceConfig::default()).unwrap();
    assert_eq!(timeline.date_range(), Some((ts(1, 1), ts(1, 2))));
    assert!(timeline.latest_at(ts(1, 0)).is_none());
    assert_eq!(store.date_range().unwrap(), (ts(1, 0), ts(1, 2)));
}
