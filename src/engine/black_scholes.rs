//! Black-Scholes pricing, delta and implied-volatility inversion.
//!
//! All tenors are year fractions and all rates continuously compounded.
//! The inversion runs Newton-Raphson on vega and falls back to bisection,
//! which always converges because price is monotonic in volatility.

use statrs::function::erf::erfc;
use std::f64::consts::{PI, SQRT_2};

use super::error::SurfaceError;
use super::types::OptionType;

const MIN_VOL: f64 = 1e-6;
const MAX_VOL: f64 = 20.0;
const PRICE_TOL: f64 = 1e-12;
const MAX_NEWTON: usize = 50;
const MAX_BISECTION: usize = 200;

/// Standard normal CDF
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / SQRT_2)
}

/// Standard normal PDF
pub fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

fn d1_d2(spot: f64, strike: f64, tau: f64, rate: f64, vol: f64) -> (f64, f64) {
    let vol_sqrt_t = vol * tau.sqrt();
    let d1 = ((spot / strike).ln() + (rate + 0.5 * vol * vol) * tau) / vol_sqrt_t;
    (d1, d1 - vol_sqrt_t)
}

/// European option premium.
pub fn price(option_type: OptionType, spot: f64, strike: f64, tau: f64, rate: f64, vol: f64) -> f64 {
    if tau <= 0.0 {
        return option_type.intrinsic(spot, strike);
    }
    let df = (-rate * tau).exp();
    if vol <= 0.0 {
        return option_type.intrinsic(spot, strike * df);
    }

    let (d1, d2) = d1_d2(spot, strike, tau, rate, vol);
    match option_type {
        OptionType::Call => spot * norm_cdf(d1) - strike * df * norm_cdf(d2),
        OptionType::Put => strike * df * norm_cdf(-d2) - spot * norm_cdf(-d1),
    }
}

/// First derivative of premium with respect to spot.
pub fn delta(option_type: OptionType, spot: f64, strike: f64, tau: f64, rate: f64, vol: f64) -> f64 {
    if tau <= 0.0 || vol <= 0.0 {
        let itm = option_type.moneyness(spot, strike) > 0.0;
        return match (option_type, itm) {
            (OptionType::Call, true) => 1.0,
            (OptionType::Put, true) => -1.0,
            _ => 0.0,
        };
    }
    let (d1, _) = d1_d2(spot, strike, tau, rate, vol);
    match option_type {
        OptionType::Call => norm_cdf(d1),
        OptionType::Put => norm_cdf(d1) - 1.0,
    }
}

/// Sensitivity of premium to a unit change in volatility (not per 1%).
pub fn vega(spot: f64, strike: f64, tau: f64, rate: f64, vol: f64) -> f64 {
    if tau <= 0.0 || vol <= 0.0 {
        return 0.0;
    }
    let (d1, _) = d1_d2(spot, strike, tau, rate, vol);
    spot * norm_pdf(d1) * tau.sqrt()
}

/// Invert a premium to the volatility that reproduces it.
pub fn implied_volatility(
    market_price: f64,
    option_type: OptionType,
    spot: f64,
    strike: f64,
    tau: f64,
    rate: f64,
) -> Result<f64, SurfaceError> {
    if !market_price.is_finite() || market_price <= 0.0 {
        return Err(SurfaceError::inversion(format!(
            "non-positive premium {market_price}"
        )));
    }
    if tau <= 0.0 {
        return Err(SurfaceError::inversion("non-positive time to expiry"));
    }
    if spot <= 0.0 || strike <= 0.0 {
        return Err(SurfaceError::inversion("non-positive spot or strike"));
    }

    let lower = price(option_type, spot, strike, tau, rate, 0.0);
    let upper = match option_type {
        OptionType::Call => spot,
        OptionType::Put => strike * (-rate * tau).exp(),
    };
    if market_price <= lower || market_price >= upper {
        return Err(SurfaceError::inversion(format!(
            "premium {market_price:.6} outside no-arbitrage bounds ({lower:.6}, {upper:.6})"
        )));
    }

    // Brenner-Subrahmanyam seed
    let mut vol = (market_price / (0.4 * spot * tau.sqrt())).clamp(0.01, 3.0);
    for _ in 0..MAX_NEWTON {
        let diff = price(option_type, spot, strike, tau, rate, vol) - market_price;
        if diff.abs() < PRICE_TOL * spot.max(1.0) {
            return Ok(vol);
        }
        let v = vega(spot, strike, tau, rate, vol);
        if v < 1e-12 {
            break;
        }
        let next = vol - diff / v;
        if !(MIN_VOL..=MAX_VOL).contains(&next) {
            break;
        }
        vol = next;
    }

    let (mut lo, mut hi) = (MIN_VOL, MAX_VOL);
    if price(option_type, spot, strike, tau, rate, hi) < market_price {
        return Err(SurfaceError::inversion(format!(
            "premium {market_price:.6} needs volatility above {MAX_VOL}"
        )));
    }
    for _ in 0..MAX_BISECTION {
        let mid = 0.5 * (lo + hi);
        let diff = price(option_type, spot, strike, tau, rate, mid) - market_price;
        if diff.abs() < PRICE_TOL * spot.max(1.0) || hi - lo < 1e-12 {
            return Ok(mid);
        }
        if diff > 0.0 {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    Ok(0.5 * (lo + hi))
}
