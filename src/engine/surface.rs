//! Per-timestamp implied-volatility surface.
//!
//! An [`OptionChain`] owns one quote snapshot. For each `(option type, side)`
//! it lazily builds a price table: quotes with positive time value are
//! inverted to implied volatilities and grouped by seconds-to-expiry into
//! [`SkewLine`]s. Lookups pick two bracketing maturities, read each skew line
//! at the requested strike (clamped), and blend them with variance-time
//! interpolation. With fewer than two usable maturities every lookup returns
//! the configured default IV.

use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::{debug, trace};

use super::black_scholes;
use super::error::SurfaceError;
use super::interpolation::{variance_time_iv, SkewLine};
use super::solver::solve_strike;
use super::types::{
    OptionType, Pricing, Quote, QuoteSide, SurfaceConfig, DAYS_PER_YEAR, SECONDS_PER_YEAR,
};

const DELTA_TOL: f64 = 1e-10;
const PRICE_TOL: f64 = 1e-10;

/// Skew lines of one `(option type, side)`, keyed by seconds to expiry.
#[derive(Debug, Clone, Default)]
pub struct PriceTable {
    skews: BTreeMap<i64, SkewLine>,
}

impl PriceTable {
    pub fn maturities(&self) -> impl Iterator<Item = i64> + '_ {
        self.skews.keys().copied()
    }

    pub fn skew(&self, seconds_to_expiry: i64) -> Option<&SkewLine> {
        self.skews.get(&seconds_to_expiry)
    }

    /// Two maturities to interpolate between for a target expiry: the true
    /// bracket when one exists, else the two nearest on the available side.
    pub fn bracket(&self, seconds_to_expiry: i64) -> Option<(i64, i64)> {
        let expiries: Vec<i64> = self.skews.keys().copied().collect();
        let n = expiries.len();
        if n < 2 {
            return None;
        }
        let split = expiries.partition_point(|&e| e < seconds_to_expiry);
        Some(if split == 0 {
            (expiries[0], expiries[1])
        } else if split == n {
            (expiries[n - 2], expiries[n - 1])
        } else {
            (expiries[split - 1], expiries[split])
        })
    }
}

#[derive(Debug, Clone)]
pub struct OptionChain {
    timestamp: NaiveDateTime,
    spot: f64,
    quotes: Vec<Quote>,
    config: SurfaceConfig,
    tables: [OnceLock<PriceTable>; 6],
}

impl OptionChain {
    /// Spot is the mean of `underlying_price * spot_ratio` over the snapshot.
    pub fn new(
        timestamp: NaiveDateTime,
        quotes: Vec<Quote>,
        config: SurfaceConfig,
    ) -> Result<Self, SurfaceError> {
        if quotes.is_empty() {
            return Err(SurfaceError::EmptySnapshot(timestamp));
        }
        let spot = quotes
            .iter()
            .map(|q| q.underlying_price * q.spot_ratio)
            .sum::<f64>()
            / quotes.len() as f64;
        if !(spot.is_finite() && spot > 0.0) {
            return Err(SurfaceError::invalid_input(format!(
                "snapshot at {timestamp} has non-positive spot {spot}"
            )));
        }
        Ok(Self {
            timestamp,
            spot,
            quotes,
            config,
            tables: Default::default(),
        })
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn spot(&self) -> f64 {
        self.spot
    }

    pub fn quotes(&self) -> &[Quote] {
        &self.quotes
    }

    pub fn config(&self) -> &SurfaceConfig {
        &self.config
    }

    pub fn risk_free_rate(&self) -> f64 {
        self.config.risk_free_rate
    }

    /// Price table for one `(type, side)`, built on first use.
    pub fn table(&self, option_type: OptionType, side: QuoteSide) -> &PriceTable {
        let idx = match option_type {
            OptionType::Call => 0,
            OptionType::Put => 3,
        } + match side {
            QuoteSide::Bid => 0,
            QuoteSide::Mark => 1,
            QuoteSide::Ask => 2,
        };
        self.tables[idx].get_or_init(|| self.build_table(option_type, side))
    }

    fn build_table(&self, option_type: OptionType, side: QuoteSide) -> PriceTable {
        let mut points: BTreeMap<i64, Vec<(f64, f64)>> = BTreeMap::new();
        let mut dropped = 0;

        for quote in self.quotes.iter().filter(|q| q.option_type == option_type) {
            let premium = quote.price(side) * self.spot;
            let strike = quote.strike * quote.spot_ratio;
            let seconds = (quote.expiration - self.timestamp).num_seconds();
            if seconds <= 0 || !(premium.is_finite() && strike.is_finite() && strike > 0.0) {
                continue;
            }
            // Quotes without time value carry no volatility information.
            if premium - option_type.intrinsic(self.spot, strike) <= 0.0 {
                continue;
            }

            let tau = seconds as f64 / SECONDS_PER_YEAR;
            match black_scholes::implied_volatility(
                premium,
                option_type,
                self.spot,
                strike,
                tau,
                self.config.risk_free_rate,
            ) {
                Ok(iv) => points
                    .entry(seconds)
                    .or_default()
                    .push((strike, iv * quote.iv_ratio)),
                Err(e) => {
                    dropped += 1;
                    trace!(%option_type, strike, seconds, "dropping quote: {e}");
                }
            }
        }

        let skews = points
            .into_iter()
            .filter_map(|(seconds, pts)| SkewLine::from_points(pts).map(|line| (seconds, line)))
            .collect();
        if dropped > 0 {
            debug!(%option_type, ?side, dropped, "quotes failed IV inversion");
        }
        PriceTable { skews }
    }

    fn iv_from_table(&self, table: &PriceTable, strike: f64, seconds: i64) -> f64 {
        let Some((lo, hi)) = table.bracket(seconds) else {
            return self.config.default_iv;
        };
        let (Some(skew_lo), Some(skew_hi)) = (table.skew(lo), table.skew(hi)) else {
            return self.config.default_iv;
        };
        let margin = self.config.iv_margin;
        variance_time_iv(
            seconds as f64 / SECONDS_PER_YEAR,
            (lo as f64 / SECONDS_PER_YEAR, skew_lo.iv_at(strike, margin)),
            (hi as f64 / SECONDS_PER_YEAR, skew_hi.iv_at(strike, margin)),
        )
    }

    /// Implied volatility at `strike` for an option expiring `days` from now.
    pub fn implied_vol(
        &self,
        strike: f64,
        days: f64,
        option_type: OptionType,
        side: QuoteSide,
    ) -> Result<f64, SurfaceError> {
        validate_strike(strike)?;
        let seconds = seconds_to_expiry(days)?;
        Ok(self.iv_from_table(self.table(option_type, side), strike, seconds))
    }

    pub fn price_by_strike(
        &self,
        strike: f64,
        days: f64,
        option_type: OptionType,
        side: QuoteSide,
    ) -> Result<Pricing, SurfaceError> {
        let iv = self.implied_vol(strike, days, option_type, side)?;
        let price = black_scholes::price(
            option_type,
            self.spot,
            strike,
            days / DAYS_PER_YEAR,
            self.config.risk_free_rate,
            iv,
        );
        Ok(Pricing { price, strike, iv })
    }

    /// Moneyness `m` maps to strike `spot/(1+m)` for calls and `spot/(1-m)`
    /// for puts, so negative values are out of the money for both.
    pub fn price_by_moneyness(
        &self,
        moneyness: f64,
        days: f64,
        option_type: OptionType,
        side: QuoteSide,
    ) -> Result<Pricing, SurfaceError> {
        let denominator = match option_type {
            OptionType::Call => 1.0 + moneyness,
            OptionType::Put => 1.0 - moneyness,
        };
        if !(moneyness.is_finite() && denominator > 0.0) {
            return Err(SurfaceError::invalid_target(
                moneyness,
                format!("moneyness gives a non-positive strike for a {option_type}"),
            ));
        }
        self.price_by_strike(self.spot / denominator, days, option_type, side)
    }

    /// Strike whose delta, under its own surface IV, equals `target`.
    /// Call targets lie in (0, 1), put targets in (-1, 0).
    pub fn price_by_delta(
        &self,
        target: f64,
        days: f64,
        option_type: OptionType,
        side: QuoteSide,
    ) -> Result<Pricing, SurfaceError> {
        let valid = match option_type {
            OptionType::Call => target > 0.0 && target < 1.0,
            OptionType::Put => target > -1.0 && target < 0.0,
        };
        if !valid {
            return Err(SurfaceError::invalid_target(
                target,
                format!("{option_type} delta must lie strictly inside its unit interval"),
            ));
        }

        let seconds = seconds_to_expiry(days)?;
        let tau = days / DAYS_PER_YEAR;
        let rate = self.config.risk_free_rate;
        let table = self.table(option_type, side);

        let strike = solve_strike(self.spot, "delta", target, DELTA_TOL, |k| {
            let iv = self.iv_from_table(table, k, seconds);
            black_scholes::delta(option_type, self.spot, k, tau, rate, iv) - target
        })?;
        let iv = self.iv_from_table(table, strike, seconds);
        let price = black_scholes::price(option_type, self.spot, strike, tau, rate, iv);
        Ok(Pricing { price, strike, iv })
    }

    /// Strike whose premium, under its own surface IV, equals `price`. The
    /// search is seeded at the at-the-money strike, i.e. spot. Returns the
    /// requested price.
    pub fn strike_by_price(
        &self,
        price: f64,
        days: f64,
        option_type: OptionType,
        side: QuoteSide,
    ) -> Result<Pricing, SurfaceError> {
        if !(price.is_finite() && price > 0.0) {
            return Err(SurfaceError::invalid_target(price, "premium must be positive"));
        }
        if option_type == OptionType::Call && price >= self.spot {
            return Err(SurfaceError::invalid_target(
                price,
                "call premium must be below spot",
            ));
        }

        let seconds = seconds_to_expiry(days)?;
        let tau = days / DAYS_PER_YEAR;
        let rate = self.config.risk_free_rate;
        let table = self.table(option_type, side);
        let tolerance = PRICE_TOL * self.spot.max(1.0);

        let strike = solve_strike(self.spot, "price", price, tolerance, |k| {
            let iv = self.iv_from_table(table, k, seconds);
            black_scholes::price(option_type, self.spot, k, tau, rate, iv) - price
        })?;
        let iv = self.iv_from_table(table, strike, seconds);
        Ok(Pricing { price, strike, iv })
    }
}

fn validate_strike(strike: f64) -> Result<(), SurfaceError> {
    if strike.is_finite() && strike > 0.0 {
        Ok(())
    } else {
        Err(SurfaceError::invalid_input(format!(
            "strike must be positive, got {strike}"
        )))
    }
}

fn seconds_to_expiry(days: f64) -> Result<i64, SurfaceError> {
    if !(days.is_finite() && days > 0.0) {
        return Err(SurfaceError::invalid_input(format!(
            "days to maturity must be positive, got {days}"
        )));
    }
    Ok((days * 86_400.0).round() as i64)
}
