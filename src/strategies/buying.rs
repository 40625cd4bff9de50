use chrono::{NaiveDateTime, TimeDelta};
use garde::Validate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::helpers::*;
use super::Strategy;
use crate::engine::types::{duration_str, option_duration_str};

/// Buys protective puts and holds all remaining liquidity in the underlying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct MarriedPutParams {
    #[serde(with = "duration_str")]
    #[schemars(with = "String")]
    #[garde(skip)]
    pub trade_interval: TimeDelta,
    #[serde(default, with = "option_duration_str")]
    #[schemars(with = "Option<String>")]
    #[garde(skip)]
    pub time_to_maturity: Option<TimeDelta>,
    #[serde(default)]
    #[garde(skip)]
    pub mode: PricingMode,
    #[serde(default = "defaults::target")]
    #[garde(range(min = -1.0, max = 1.0))]
    pub target: f64,
}

/// Periodically buys options and sells them back shortly before maturity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct RollingOptionBuyingParams {
    #[serde(with = "duration_str")]
    #[schemars(with = "String")]
    #[garde(skip)]
    pub trade_interval: TimeDelta,
    #[serde(with = "duration_str")]
    #[schemars(with = "String")]
    #[garde(skip)]
    pub time_to_maturity: TimeDelta,
    #[serde(default, with = "option_duration_str")]
    #[schemars(with = "Option<String>")]
    #[garde(skip)]
    pub time_to_cancel: Option<TimeDelta>,
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
}

pub struct MarriedPut {
    schedule: Schedule,
    mode: PricingMode,
    target: f64,
}

impl MarriedPut {
    pub fn new(params: MarriedPutParams) -> Self {
        Self {
            schedule: Schedule::new(params.trade_interval, params.time_to_maturity),
            mode: params.mode,
            target: params.target,
        }
    }
}

impl Strategy for MarriedPut {
    fn name(&self) -> &str {
        "married_put"
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
        if !trade_due(action_log, time, self.schedule.trade_interval) {
            return Ok((status, Vec::new()));
        }
        let quote = price_with_mode(
            chain,
            self.mode,
            self.target,
            self.schedule.maturity_days,
            OptionType::Put,
            QuoteSide::Ask,
        )?;
        // One put per unit of underlying bought with the rest.
        let size = status.liquidity(spot) / (quote.price + spot);
        if size.is_nan() || size <= 0.0 {
            debug!(step, size, "no liquidity to hedge");
            return Ok((status, Vec::new()));
        }

        let premium = quote.price * size;
        let position = Position {
            option_type: OptionType::Put,
            strike: quote.strike,
            maturity: time + self.schedule.time_to_maturity,
            size,
            collateral_primary: 0.0,
            collateral_secondary: 0.0,
            iv_start: quote.iv,
            price_start: quote.price,
        };
        add_and_rebalance(-premium, &mut status, 1.0, spot);
        status.positions.push(position.clone());

        let description = describe_purchase(time, spot, &position, premium);
        let bought = action(step, time, spot, ActionKind::Buy, description, position, -premium);
        Ok((status, vec![bought]))
    }

    fn reset(&mut self) {}
}

pub struct RollingOptionBuying {
    params: RollingOptionBuyingParams,
    time_to_cancel: TimeDelta,
    concurrency: f64,
}

impl RollingOptionBuying {
    pub fn new(params: RollingOptionBuyingParams) -> Self {
        let time_to_cancel = params.time_to_cancel.unwrap_or(params.trade_interval);
        Self {
            concurrency: concurrency(time_to_cancel, params.trade_interval),
            time_to_cancel,
            params,
        }
    }

    /// Sell back this strategy's longs within `time_to_cancel` of maturity.
    fn close_expiring(
        &self,
        step: usize,
        time: NaiveDateTime,
        spot: f64,
        status: &mut PortfolioStatus,
        chain: &OptionChain,
    ) -> Result<Vec<SimulationAction>, SurfaceError> {
        let side = self.params.spread_cross.sell_side();
        let due = |p: &Position| {
            p.is_long()
                && p.option_type == self.params.option_type
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
            add_and_rebalance(premium, status, self.params.liquidity_delta, spot);
            let sale = Position {
                size: -position.size,
                price_start: quote.price,
                ..position
            };
            let description = format!(
                "{time} @ {spot:.1}: Sold {} {:.3} {} of size {:.3} for {premium:.2} ({:.2} per unit) cancelling previous long position",
                sale.option_type, sale.strike, sale.maturity, sale.size, quote.price,
            );
            actions.push(action(step, time, spot, ActionKind::Sell, description, sale, premium));
        }
        Ok(actions)
    }
}

impl Strategy for RollingOptionBuying {
    fn name(&self) -> &str {
        "rolling_option_buying"
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
        let mut actions = self.close_expiring(step, time, spot, &mut status, chain)?;
        if !trade_due(action_log, time, self.params.trade_interval) {
            return Ok((status, actions));
        }

        let quote = price_with_mode(
            chain,
            self.params.mode,
            self.params.target,
            days(self.params.time_to_maturity),
            self.params.option_type,
            self.params.spread_cross.buy_side(),
        )?;
        let expenditure = status.liquidity(spot) * self.params.utilization_ratio / self.concurrency;
        if quote.price <= 0.0 || expenditure.is_nan() || expenditure <= 0.0 {
            debug!(step, expenditure, price = quote.price, "nothing to buy");
            return Ok((status, actions));
        }
        let size = expenditure / quote.price;
        let position = Position {
            option_type: self.params.option_type,
            strike: quote.strike,
            maturity: time + self.params.time_to_maturity,
            size,
            collateral_primary: 0.0,
            collateral_secondary: 0.0,
            iv_start: quote.iv,
            price_start: quote.price,
        };
        add_and_rebalance(-expenditure, &mut status, self.params.liquidity_delta, spot);
        status.positions.push(position.clone());

        let description = describe_purchase(time, spot, &position, expenditure);
        actions.push(action(step, time, spot, ActionKind::Buy, description, position, -expenditure));
        Ok((status, actions))
    }

    fn reset(&mut self) {}
}
