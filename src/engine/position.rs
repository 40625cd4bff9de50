use chrono::{NaiveDateTime, TimeDelta};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::black_scholes;
use super::surface::OptionChain;
use super::types::{days, year_fraction, OptionType, QuoteSide};

/// Positions this close to maturity are treated as already settled.
pub fn settlement_grace() -> TimeDelta {
    TimeDelta::hours(1)
}

/// A single option position. `size > 0` is long, `size < 0` is short.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Position {
    pub option_type: OptionType,
    pub strike: f64,
    pub maturity: NaiveDateTime,
    pub size: f64,
    pub collateral_primary: f64,
    pub collateral_secondary: f64,
    pub iv_start: f64,
    pub price_start: f64,
}

/// How a position figure was obtained.
#[derive(Debug, Clone, PartialEq)]
pub enum Mark {
    /// Inside the settlement grace window.
    Delivery(f64),
    /// From the live surface.
    Surface(f64),
    /// Closed form at the starting IV, no surface supplied.
    Analytic(f64),
    /// Closed form at the starting IV after the surface failed.
    Fallback { value: f64, reason: String },
}

impl Mark {
    pub fn value(&self) -> f64 {
        match self {
            Mark::Delivery(v) | Mark::Surface(v) | Mark::Analytic(v) => *v,
            Mark::Fallback { value, .. } => *value,
        }
    }
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.size > 0.0
    }

    pub fn is_short(&self) -> bool {
        self.size < 0.0
    }

    pub fn moneyness(&self, spot: f64) -> f64 {
        self.option_type.moneyness(spot, self.strike)
    }

    /// Signed settlement payoff, negative for in-the-money shorts.
    pub fn delivery(&self, spot: f64) -> f64 {
        self.moneyness(spot).max(0.0) * self.size
    }

    pub fn collateral_value(&self, spot: f64) -> f64 {
        self.collateral_primary + self.collateral_secondary * spot
    }

    /// Only shorts can be liquidated: when collateral no longer covers an
    /// immediate settlement.
    pub fn is_liquidated(&self, spot: f64) -> bool {
        self.is_short() && self.collateral_value(spot) < -self.delivery(spot)
    }

    pub fn is_expired(&self, time: NaiveDateTime) -> bool {
        time >= self.maturity
    }

    fn in_grace_window(&self, time: NaiveDateTime) -> bool {
        self.maturity - time <= settlement_grace()
    }

    fn analytic_value(&self, spot: f64, time: NaiveDateTime, rate: f64) -> f64 {
        let tau = year_fraction(self.maturity - time);
        self.size * black_scholes::price(self.option_type, spot, self.strike, tau, rate, self.iv_start)
    }

    fn analytic_delta(&self, spot: f64, time: NaiveDateTime, rate: f64, vol: f64) -> f64 {
        let tau = year_fraction(self.maturity - time);
        self.size * black_scholes::delta(self.option_type, spot, self.strike, tau, rate, vol)
    }

    /// Market value of the position (premium times size).
    pub fn valuation(&self, spot: f64, time: NaiveDateTime, chain: Option<&OptionChain>) -> Mark {
        if self.in_grace_window(time) {
            return Mark::Delivery(self.delivery(spot));
        }
        let Some(chain) = chain else {
            return Mark::Analytic(self.analytic_value(spot, time, 0.0));
        };

        let days_left = days(self.maturity - time);
        match chain.price_by_strike(self.strike, days_left, self.option_type, QuoteSide::Mark) {
            Ok(p) if p.price.is_finite() => Mark::Surface(p.price * self.size),
            outcome => {
                let reason = match outcome {
                    Err(e) => e.to_string(),
                    Ok(p) => format!("surface returned non-finite price {}", p.price),
                };
                let value = self.analytic_value(spot, time, chain.risk_free_rate());
                warn!(
                    option_type = %self.option_type,
                    strike = self.strike,
                    %time,
                    "valuation fell back to starting IV: {reason}"
                );
                Mark::Fallback { value, reason }
            }
        }
    }

    /// Delta of the position. Inside the grace window it is binary: `size`
    /// for an in-the-money call, `-size` for an in-the-money put, else zero.
    pub fn delta(&self, spot: f64, time: NaiveDateTime, chain: Option<&OptionChain>) -> Mark {
        if self.in_grace_window(time) {
            let value = if self.delivery(spot) == 0.0 {
                0.0
            } else {
                match self.option_type {
                    OptionType::Call => self.size,
                    OptionType::Put => -self.size,
                }
            };
            return Mark::Delivery(value);
        }
        let Some(chain) = chain else {
            return Mark::Analytic(self.analytic_delta(spot, time, 0.0, self.iv_start));
        };

        let rate = chain.risk_free_rate();
        let days_left = days(self.maturity - time);
        match chain.implied_vol(self.strike, days_left, self.option_type, QuoteSide::Mark) {
            Ok(iv) if iv.is_finite() && iv > 0.0 => {
                Mark::Surface(self.analytic_delta(spot, time, rate, iv))
            }
            outcome => {
                let reason = match outcome {
                    Err(e) => e.to_string(),
                    Ok(iv) => format!("surface returned unusable IV {iv}"),
                };
                warn!(
                    option_type = %self.option_type,
                    strike = self.strike,
                    %time,
                    "delta fell back to starting IV: {reason}"
                );
                Mark::Fallback {
                    value: self.analytic_delta(spot, time, rate, self.iv_start),
                    reason,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::{Quote, SurfaceConfig};
    use chrono::NaiveDate;

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn short_put(strike: f64, size: f64, collateral_primary: f64) -> Position {
        Position {
            option_type: OptionType::Put,
            strike,
            maturity: t0() + TimeDelta::days(7),
            size,
            collateral_primary,
            collateral_secondary: 0.0,
            iv_start: 0.8,
            price_start: 2.0,
        }
    }

    /// One quoted strike, so every lookup uses `default_iv`.
    fn single_quote_chain(default_iv: f64) -> OptionChain {
        let quotes = vec![Quote {
            option_type: OptionType::Call,
            strike: 100.0,
            expiration: t0() + TimeDelta::days(7),
            bid_price: 0.01,
            mark_price: 0.02,
            ask_price: 0.03,
            underlying_price: 100.0,
            iv_ratio: 1.0,
            spot_ratio: 1.0,
        }];
        let config = SurfaceConfig {
            default_iv,
            ..SurfaceConfig::default()
        };
        OptionChain::new(t0(), quotes, config).unwrap()
    }

    #[test]
    fn delivery_signs() {
        let p = short_put(100.0, -2.0, 0.0);
        assert_eq!(p.delivery(90.0), -20.0);
        assert_eq!(p.delivery(110.0), 0.0);
        let mut c = p.clone();
        c.option_type = OptionType::Call;
        c.size = 3.0;
        assert_eq!(c.delivery(110.0), 30.0);
    }

    #[test]
    fn liquidation_only_for_undercollateralised_shorts() {
        let p = short_put(100.0, -1.0, 0.0);
        assert!(p.is_liquidated(50.0));
        assert!(!p.is_liquidated(100.0));

        let covered = short_put(100.0, -1.0, 100.0);
        assert!(!covered.is_liquidated(50.0));

        let long = short_put(100.0, 1.0, 0.0);
        assert!(!long.is_liquidated(1.0));
    }

    #[test]
    fn secondary_collateral_tracks_spot() {
        let mut p = short_put(100.0, -1.0, 10.0);
        p.collateral_secondary = 0.5;
        assert_eq!(p.collateral_value(40.0), 30.0);
    }

    #[test]
    fn expiry_is_inclusive() {
        let p = short_put(100.0, -1.0, 0.0);
        assert!(!p.is_expired(p.maturity - TimeDelta::seconds(1)));
        assert!(p.is_expired(p.maturity));
    }

    #[test]
    fn grace_window_uses_delivery_and_binary_delta() {
        let p = short_put(100.0, -2.0, 0.0);
        let t = p.maturity - TimeDelta::minutes(30);
        assert_eq!(p.valuation(95.0, t, None), Mark::Delivery(-10.0));
        assert_eq!(p.delta(95.0, t, None), Mark::Delivery(2.0));
        assert_eq!(p.delta(105.0, t, None), Mark::Delivery(0.0));
    }

    #[test]
    fn analytic_without_surface() {
        let p = short_put(100.0, -1.0, 0.0);
        let mark = p.valuation(100.0, t0(), None);
        let expected = -black_scholes::price(OptionType::Put, 100.0, 100.0, 7.0 / 365.25, 0.0, 0.8);
        assert!(matches!(mark, Mark::Analytic(_)));
        assert!((mark.value() - expected).abs() < 1e-12);
    }

    #[test]
    fn surface_valuation_uses_chain_iv() {
        let chain = single_quote_chain(0.4);
        let p = short_put(100.0, -1.0, 0.0);
        let mark = p.valuation(100.0, t0(), Some(&chain));
        let expected = -black_scholes::price(OptionType::Put, 100.0, 100.0, 7.0 / 365.25, 0.0, 0.4);
        assert!(matches!(mark, Mark::Surface(_)));
        assert!((mark.value() - expected).abs() < 1e-12);
    }

    #[test]
    fn unusable_surface_falls_back_to_starting_iv() {
        let chain = single_quote_chain(f64::NAN);
        let p = short_put(100.0, -1.0, 0.0);
        let tau = 7.0 / 365.25;

        let mark = p.valuation(100.0, t0(), Some(&chain));
        let expected = -black_scholes::price(OptionType::Put, 100.0, 100.0, tau, 0.0, 0.8);
        match mark {
            Mark::Fallback { value, reason } => {
                assert!((value - expected).abs() < 1e-12);
                assert!(reason.contains("non-finite"), "{reason}");
            }
            other => panic!("Expected Fallback, got {other:?}"),
        }

        let delta = p.delta(100.0, t0(), Some(&chain));
        let expected = -black_scholes::delta(OptionType::Put, 100.0, 100.0, tau, 0.0, 0.8);
        match delta {
            Mark::Fallback { value, reason } => {
                assert!((value - expected).abs() < 1e-12);
                assert!(value > 0.0);
                assert!(reason.contains("unusable IV"), "{reason}");
            }
            other => panic!("Expected Fallback, got {other:?}"),
        }
    }
}
