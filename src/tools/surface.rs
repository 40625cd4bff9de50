use anyhow::{anyhow, Result};
use chrono::NaiveDateTime;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::load_data::LoadedQuotes;
use super::response_types::PriceOptionResponse;
use crate::engine::types::{OptionType, QuoteSide};

/// What the `target` of a surface lookup means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Lookup {
    /// Absolute strike
    Strike,
    /// Signed moneyness, negative is out of the money
    Moneyness,
    /// Signed Black-Scholes delta
    Delta,
    /// Premium per unit; solves for the strike
    Price,
}

pub fn execute(
    loaded: &LoadedQuotes,
    time: NaiveDateTime,
    option_type: OptionType,
    side: QuoteSide,
    lookup: Lookup,
    target: f64,
    days: f64,
) -> Result<PriceOptionResponse> {
    let chain = loaded
        .timeline
        .latest_at(time)
        .ok_or_else(|| anyhow!("No quote snapshot at or before {time}"))?;

    let pricing = match lookup {
        Lookup::Strike => chain.price_by_strike(target, days, option_type, side)?,
        Lookup::Moneyness => chain.price_by_moneyness(target, days, option_type, side)?,
        Lookup::Delta => chain.price_by_delta(target, days, option_type, side)?,
        Lookup::Price => chain.strike_by_price(target, days, option_type, side)?,
    };
    let spot = chain.spot();

    let summary = format!(
        "{days:.2}-day {option_type} at strike {:.2} ({side:?} surface, spot {spot:.2}): premium {:.4} ({:.2}% of spot), IV {:.1}%.",
        pricing.strike,
        pricing.price,
        pricing.price / spot * 100.0,
        pricing.iv * 100.0,
    );

    Ok(PriceOptionResponse {
        summary,
        snapshot: chain.timestamp().to_string(),
        spot,
        option_type,
        side,
        lookup,
        target,
        days,
        strike: pricing.strike,
        iv: pricing.iv,
        price: pricing.price,
        price_ratio: pricing.price / spot,
    })
}
