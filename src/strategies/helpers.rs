use chrono::{NaiveDateTime, TimeDelta};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use crate::engine::action::{ActionKind, SimulationAction};
pub use crate::engine::error::{StrategyError, SurfaceError};
pub use crate::engine::position::Position;
pub use crate::engine::status::PortfolioStatus;
pub use crate::engine::surface::OptionChain;
pub use crate::engine::types::{days, OptionType, PricingMode, Pricing, QuoteSide};

/// How far across the bid/ask spread closing trades are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SpreadCross {
    /// Buy at the ask, sell at the bid
    Full,
    /// Buy at the ask, sell at the mark
    #[default]
    Half,
    /// Trade at the mark
    None,
}

impl SpreadCross {
    pub fn buy_side(self) -> QuoteSide {
        match self {
            SpreadCross::Full | SpreadCross::Half => QuoteSide::Ask,
            SpreadCross::None => QuoteSide::Mark,
        }
    }

    pub fn sell_side(self) -> QuoteSide {
        match self {
            SpreadCross::Full => QuoteSide::Bid,
            SpreadCross::Half | SpreadCross::None => QuoteSide::Mark,
        }
    }

    /// Side used to buy back a short.
    pub fn cover_side(self) -> QuoteSide {
        match self {
            SpreadCross::Full => QuoteSide::Ask,
            SpreadCross::Half | SpreadCross::None => QuoteSide::Mark,
        }
    }
}

/// Where short-option collateral is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CollateralMode {
    Primary,
    Secondary,
}

impl CollateralMode {
    /// Puts are cash-secured and calls covered unless configured otherwise.
    pub fn resolve(mode: Option<CollateralMode>, option_type: OptionType) -> Self {
        mode.unwrap_or(match option_type {
            OptionType::Put => CollateralMode::Primary,
            OptionType::Call => CollateralMode::Secondary,
        })
    }

    /// Split a collateral amount (in primary units) into `(primary, secondary)`.
    pub fn split(self, collateral: f64, spot: f64) -> (f64, f64) {
        match self {
            CollateralMode::Primary => (collateral, 0.0),
            CollateralMode::Secondary => (0.0, collateral / spot),
        }
    }
}

/// Timestamp of the most recent action of `kind`, or of any buy/sell when
/// `kind` is `None`.
pub fn last_strategy_action_time(
    action_log: &[SimulationAction],
    kind: Option<ActionKind>,
) -> Option<NaiveDateTime> {
    action_log
        .iter()
        .rev()
        .find(|a| match kind {
            Some(kind) => a.kind == kind,
            None => a.kind.is_trade(),
        })
        .map(|a| a.timestamp)
}

/// A new trade is due when none happened yet or `trade_interval` has passed.
pub fn trade_due(action_log: &[SimulationAction], time: NaiveDateTime, trade_interval: TimeDelta) -> bool {
    last_strategy_action_time(action_log, None).map_or(true, |last| time - last >= trade_interval)
}

/// Add `quantity` to liquidity, then split it so that a fraction `delta` of
/// the value sits in the secondary asset.
pub fn add_and_rebalance(quantity: f64, status: &mut PortfolioStatus, delta: f64, spot: f64) {
    let total = status.liquidity(spot) + quantity;
    status.primary = total * (1.0 - delta);
    status.secondary = total * delta / spot;
}

/// Number of overlapping positions a schedule keeps open at once.
pub fn concurrency(horizon: TimeDelta, trade_interval: TimeDelta) -> f64 {
    let ratio = horizon.num_milliseconds() as f64 / trade_interval.num_milliseconds() as f64;
    ratio.ceil().max(1.0)
}

/// Price an option with the configured strike-selection mode. Delta targets
/// are given as magnitudes and signed here by option type.
pub fn price_with_mode(
    chain: &OptionChain,
    mode: PricingMode,
    target: f64,
    days_to_maturity: f64,
    option_type: OptionType,
    side: QuoteSide,
) -> Result<Pricing, SurfaceError> {
    match mode {
        PricingMode::Moneyness => chain.price_by_moneyness(target, days_to_maturity, option_type, side),
        PricingMode::Delta => {
            let signed = match option_type {
                OptionType::Call => target.abs(),
                OptionType::Put => -target.abs(),
            };
            chain.price_by_delta(signed, days_to_maturity, option_type, side)
        }
    }
}

pub fn action(
    step: usize,
    time: NaiveDateTime,
    spot: f64,
    kind: ActionKind,
    description: String,
    position: Position,
    liquidity_change: f64,
) -> SimulationAction {
    SimulationAction {
        step,
        timestamp: time,
        spot,
        kind,
        description,
        position,
        liquidity_change,
    }
}

pub fn describe_sale(time: NaiveDateTime, spot: f64, p: &Position, premium: f64) -> String {
    format!(
        "{time} @ {spot:.1}: Sold {} {:.3} {} of size {:.3} with {:.3} primary and {:.3} secondary collateral for {premium:.2} ({:.2} per unit)",
        p.option_type, p.strike, p.maturity, p.size, p.collateral_primary, p.collateral_secondary, p.price_start,
    )
}

pub fn describe_purchase(time: NaiveDateTime, spot: f64, p: &Position, premium: f64) -> String {
    format!(
        "{time} @ {spot:.1}: Bought {} {:.3} {} of size {:.3} for {premium:.2} ({:.2} per unit)",
        p.option_type, p.strike, p.maturity, p.size, p.price_start,
    )
}

/// Resolved trading schedule shared by every strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Schedule {
    pub trade_interval: TimeDelta,
    pub time_to_maturity: TimeDelta,
    pub maturity_days: f64,
}

impl Schedule {
    pub fn new(trade_interval: TimeDelta, time_to_maturity: Option<TimeDelta>) -> Self {
        let time_to_maturity = time_to_maturity.unwrap_or(trade_interval);
        Self {
            trade_interval,
            time_to_maturity,
            maturity_days: days(time_to_maturity),
        }
    }
}

/// Serde defaults shared by strategy parameter structs.
pub mod defaults {
    use super::OptionType;

    pub fn one() -> f64 {
        1.0
    }

    pub fn target() -> f64 {
        -0.1
    }

    pub fn call() -> OptionType {
        OptionType::Call
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::engine::black_scholes;
    use crate::engine::types::{Quote, SurfaceConfig, DAYS_PER_YEAR};
    use chrono::NaiveDate;

    pub fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 4, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    /// Chain with flat 60% IV at 1, 7 and 30 days and strikes 50..150.
    pub fn flat_chain(time: NaiveDateTime, spot: f64) -> OptionChain {
        let mut quotes = Vec::new();
        for days in [1, 7, 30] {
            let tau = days as f64 / DAYS_PER_YEAR;
            for i in 0..=20 {
                let strike = spot * (0.5 + 0.05 * f64::from(i));
                for option_type in [OptionType::Call, OptionType::Put] {
                    let p = black_scholes::price(option_type, spot, strike, tau, 0.0, 0.6) / spot;
                    quotes.push(Quote {
                        option_type,
                        strike,
                        expiration: time + TimeDelta::days(days),
                        bid_price: p * 0.95,
                        mark_price: p,
                        ask_price: p * 1.05,
                        underlying_price: spot,
                        iv_ratio: 1.0,
                        spot_ratio: 1.0,
                    });
                }
            }
        }
        OptionChain::new(time, quotes, SurfaceConfig::default()).unwrap()
    }

    pub fn trade_at(time: NaiveDateTime) -> SimulationAction {
        action(
            0,
            time,
            100.0,
            ActionKind::Sell,
            String::new(),
            Position {
                option_type: OptionType::Put,
                strike: 90.0,
                maturity: time + TimeDelta::days(7),
                size: -1.0,
                collateral_primary: 0.0,
                collateral_secondary: 0.0,
                iv_start: 0.6,
                price_start: 1.0,
            },
            0.0,
        )
    }
}
