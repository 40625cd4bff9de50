use chrono::{NaiveDateTime, TimeDelta};
use garde::Validate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::helpers::*;
use super::Strategy;
use crate::engine::types::{duration_str, option_duration_str};

/// Periodically sells options and holds them to expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct OptionSellingParams {
    /// Time between sales, e.g. "1d"
    #[serde(with = "duration_str")]
    #[schemars(with = "String")]
    #[garde(skip)]
    pub trade_interval: TimeDelta,
    /// Tenor of each sold option (defaults to trade_interval)
    #[serde(default, with = "option_duration_str")]
    #[schemars(with = "Option<String>")]
    #[garde(skip)]
    pub time_to_maturity: Option<TimeDelta>,
    /// Collateral posted per unit of notional
    #[serde(default = "defaults::one")]
    #[garde(range(min = 0.01, max = 100.0))]
    pub collateralization_ratio: f64,
    /// Fraction of liquidity committed across concurrent positions
    #[serde(default = "defaults::one")]
    #[garde(range(min = 0.0, max = 1.0))]
    pub utilization_ratio: f64,
    #[serde(default = "defaults::call")]
    #[garde(skip)]
    pub option_type: OptionType,
    #[serde(default)]
    #[garde(skip)]
    pub mode: PricingMode,
    /// Moneyness, or delta magnitude in delta mode
    #[serde(default = "defaults::target")]
    #[garde(range(min = -1.0, max = 1.0))]
    pub target: f64,
    /// Fraction of free liquidity held in the underlying
    #[serde(default = "defaults::one")]
    #[garde(range(min = 0.0, max = 1.0))]
    pub liquidity_delta: f64,
    /// Defaults to primary for puts, secondary for calls
    #[serde(default)]
    #[garde(skip)]
    pub collateral_mode: Option<CollateralMode>,
}

/// Like [`OptionSellingParams`], plus buying shorts back before maturity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct RollingOptionSellingParams {
    #[serde(with = "duration_str")]
    #[schemars(with = "String")]
    #[garde(skip)]
    pub trade_interval: TimeDelta,
    #[serde(with = "duration_str")]
    #[schemars(with = "String")]
    #[garde(skip)]
    pub time_to_maturity: TimeDelta,
    /// Shorts this close to maturity are bought back (defaults to trade_interval)
    #[serde(default, with = "option_duration_str")]
    #[schemars(with = "Option<String>")]
    #[garde(skip)]
    pub time_to_cancel: Option<TimeDelta>,
    #[serde(default = "defaults::one")]
    #[garde(range(min = 0.01, max = 100.0))]
    pub collateralization_ratio: f64,
    #[serde(default = "defaults::one")]
    #[garde(range(min = 0.0, max = 1.0))]
    pub utilization_ratio: f64,
    #[serde(default = "defaults::call")]
    #[garde(skip)]
    pub option_type: OptionType,
    #[serde(default)]
    #[garde(skip)]
    pub mode: PricingMode,
    #[serde(default = "defaults::target")]
    #[garde(range(min = -1.0, max = 1.0))]
    pub target: f64,
    #[serde(default = "defaults::one")]
    #[garde(range(min = 0.0, max = 1.0))]
    pub liquidity_delta: f64,
    #[serde(default)]
    #[garde(skip)]
    pub spread_cross: SpreadCross,
    #[serde(default)]
    #[garde(skip)]
    pub collateral_mode: Option<CollateralMode>,
}

/// Sizing and pricing of one collateralised short sale on the bid.
#[derive(Debug, Clone)]
pub(crate) struct ShortSeller {
    pub option_type: OptionType,
    pub mode: PricingMode,
    pub target: f64,
    pub collateralization_ratio: f64,
    pub utilization_ratio: f64,
    pub liquidity_delta: f64,
    pub collateral: CollateralMode,
    pub concurrency: f64,
    pub time_to_maturity: TimeDelta,
}

impl ShortSeller {
    pub fn sell(
        &self,
        step: usize,
        time: NaiveDateTime,
        spot: f64,
        status: &mut PortfolioStatus,
        chain: &OptionChain,
    ) -> Result<Option<SimulationAction>, SurfaceError> {
        let quote = price_with_mode(
            chain,
            self.mode,
            self.target,
            days(self.time_to_maturity),
            self.option_type,
            QuoteSide::Bid,
        )?;
        let expenditure = status.liquidity(spot) * self.utilization_ratio / self.concurrency;
        let size = expenditure / spot / self.collateralization_ratio;
        if size.is_nan() || size <= 0.0 {
            debug!(step, size, "no liquidity to sell against");
            return Ok(None);
        }

        let premium = quote.price * size;
        let (collateral_primary, collateral_secondary) = self.collateral.split(expenditure, spot);
        let position = Position {
            option_type: self.option_type,
            strike: quote.strike,
            maturity: time + self.time_to_maturity,
            size: -size,
            collateral_primary,
            collateral_secondary,
            iv_start: quote.iv,
            price_start: quote.price,
        };
        let liquidity_change = premium - expenditure;
        add_and_rebalance(liquidity_change, status, self.liquidity_delta, spot);
        status.positions.push(position.clone());

        Ok(Some(action(
            step,
            time,
            spot,
            ActionKind::Sell,
            describe_sale(time, spot, &position, premium),
            position,
            liquidity_change,
        )))
    }
}

pub struct OptionSelling {
    trade_interval: TimeDelta,
    seller: ShortSeller,
}

impl OptionSelling {
    pub fn new(params: OptionSellingParams) -> Self {
        let schedule = Schedule::new(params.trade_interval, params.time_to_maturity);
        Self {
            trade_interval: schedule.trade_interval,
            seller: ShortSeller {
                option_type: params.option_type,
                mode: params.mode,
                target: params.target,
                collateralization_ratio: params.collateralization_ratio,
                utilization_ratio: params.utilization_ratio,
                liquidity_delta: params.liquidity_delta,
                collateral: CollateralMode::resolve(params.collateral_mode, params.option_type),
                concurrency: concurrency(schedule.time_to_maturity, schedule.trade_interval),
                time_to_maturity: schedule.time_to_maturity,
            },
        }
    }
}

impl Strategy for OptionSelling {
    fn name(&self) -> &str {
        "option_selling"
    }

    fn execute(
        &mut self,
        step: usize,
        time: NaiveDateTime,
        spot: f64,
        mut status: PortfolioStatus,
        chain: &OptionChain,
        action_log: &[SimulationAction],
    ) -> Result<(PortfolioStatus, Vec<SimulationAction>), StrategyError> {
        let mut actions = Vec::new();
        if trade_due(action_log, time, self.trade_interval) {
            actions.extend(self.seller.sell(step, time, spot, &mut status, chain)?);
        }
        Ok((status, actions))
    }

    fn reset(&mut self) {}
}

pub struct RollingOptionSelling {
    trade_interval: TimeDelta,
    time_to_cancel: TimeDelta,
    spread_cross: SpreadCross,
    seller: ShortSeller,
}

impl RollingOptionSelling {
    pub fn new(params: RollingOptionSellingParams) -> Self {
        let time_to_cancel = params.time_to_cancel.unwrap_or(params.trade_interval);
        Self {
            trade_interval: params.trade_interval,
            time_to_cancel,
            spread_cross: params.spread_cross,
            seller: ShortSeller {
                option_type: params.option_type,
                mode: params.mode,
                target: params.target,
                collateralization_ratio: params.collateralization_ratio,
                utilization_ratio: params.utilization_ratio,
                liquidity_delta: params.liquidity_delta,
                collateral: CollateralMode::resolve(params.collateral_mode, params.option_type),
                concurrency: concurrency(time_to_cancel, params.trade_interval),
                time_to_maturity: params.time_to_maturity,
            },
        }
    }

    /// Buy back this strategy's shorts that are within `time_to_cancel` of
    /// maturity, returning their collateral.
    fn cover_expiring(
        &self,
        step: usize,
        time: NaiveDateTime,
        spot: f64,
        status: &mut PortfolioStatus,
        chain: &OptionChain,
    ) -> Result<Vec<SimulationAction>, SurfaceError> {
        let side = self.spread_cross.cover_side();
        let due = |p: &Position| {
            p.is_short()
                && p.option_type == self.seller.option_type
                && p.maturity - time <= self.time_to_cancel
        };
        let quotes = status
            .positions
            .iter()
            .filter(|p| due(p))
            .map(|p| chain.price_by_strike(p.strike, days(p.maturity - time), p.option_type, side))
            .collect::<Result<Vec<_>, _>>()?;
        let (closing, kept): (Vec<_>, Vec<_>) =
            std::mem::take(&mut status.positions).into_iter().partition(|p| due(p));
        status.positions = kept;

        let mut actions = Vec::with_capacity(closing.len());
        for (position, quote) in closing.into_iter().zip(quotes) {
            let premium = quote.price * position.size.abs();
            let liquidity_change = position.collateral_value(spot) - premium;
            add_and_rebalance(liquidity_change, status, self.seller.liquidity_delta, spot);
            let cover = Position {
                size: -position.size,
                price_start: quote.price,
                ..position
            };
            let description = format!(
                "{} cancelling previous short position",
                describe_purchase(time, spot, &cover, premium)
            );
            actions.push(action(
                step,
                time,
                spot,
                ActionKind::Buy,
                description,
                cover,
                liquidity_change,
            ));
        }
        Ok(actions)
    }
}

impl Strategy for RollingOptionSelling {
    fn name(&self) -> &str {
        "rolling_option_selling"
    }

    fn execute(
        &mut self,
        step: usize,
        time: NaiveDateTime,
        spot: f64,
        mut status: PortfolioStatus,
        chain: &OptionChain,
        action_log: &[SimulationAction],
    ) -> Result<(PortfolioStatus, Vec<SimulationAction>), StrategyError> {
        let mut actions = self.cover_expiring(step, time, spot, &mut status, chain)?;
        if trade_due(action_log, time, self.trade_interval) {
            actions.extend(self.seller.sell(step, time, spot, &mut status, chain)?);
        }
        Ok((status, actions))
    }

    fn reset(&mut self) {}
}
