//! Multi-leg strategies opened as a package on each trade date.

use chrono::{NaiveDateTime, TimeDelta};
use garde::Validate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::helpers::*;
use super::Strategy;
use crate::engine::types::option_duration_str;

/// Sells a call and finances a put of equal premium with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct CostlessCollarParams {
    #[serde(with = "crate::engine::types::duration_str")]
    #[schemars(with = "String")]
    #[garde(skip)]
    pub trade_interval: TimeDelta,
    #[serde(default, with = "option_duration_str")]
    #[schemars(with = "Option<String>")]
    #[garde(skip)]
    pub time_to_maturity: Option<TimeDelta>,
    #[serde(default = "defaults::one")]
    #[garde(range(min = 0.01, max = 100.0))]
    pub collateralization_ratio: f64,
    #[serde(default = "defaults::one")]
    #[garde(range(min = 0.0, max = 1.0))]
    pub utilization_ratio: f64,
    #[serde(default)]
    #[garde(skip)]
    pub mode: PricingMode,
    /// Strike selection target of the sold call
    #[serde(default = "defaults::target")]
    #[garde(range(min = -1.0, max = 1.0))]
    pub target: f64,
    #[serde(default = "defaults::one")]
    #[garde(range(min = 0.0, max = 1.0))]
    pub liquidity_delta: f64,
    /// Defaults to secondary
    #[serde(default)]
    #[garde(skip)]
    pub collateral_mode: Option<CollateralMode>,
}

fn leg_coll_ratio() -> f64 {
    0.25
}

fn short_wing() -> f64 {
    0.15
}

fn long_wing() -> f64 {
    0.10
}

fn delta_mode() -> PricingMode {
    PricingMode::Delta
}

/// Short call and put wings protected by further out-of-the-money longs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct IronCondorParams {
    #[serde(with = "crate::engine::types::duration_str")]
    #[schemars(with = "String")]
    #[garde(skip)]
    pub trade_interval: TimeDelta,
    #[serde(default, with = "option_duration_str")]
    #[schemars(with = "Option<String>")]
    #[garde(skip)]
    pub time_to_maturity: Option<TimeDelta>,
    #[serde(default = "defaults::one")]
    #[garde(range(min = 0.01, max = 100.0))]
    pub collateralization_ratio: f64,
    /// Share of each trade's budget posted as collateral per short wing
    #[serde(default = "leg_coll_ratio")]
    #[garde(range(min = 0.0, max = 0.5))]
    pub leg_coll_ratio: f64,
    #[serde(default = "defaults::one")]
    #[garde(range(min = 0.0, max = 1.0))]
    pub utilization_ratio: f64,
    #[serde(default = "delta_mode")]
    #[garde(skip)]
    pub mode: PricingMode,
    #[serde(default = "short_wing")]
    #[garde(range(min = -1.0, max = 1.0))]
    pub short_put_target: f64,
    #[serde(default = "short_wing")]
    #[garde(range(min = -1.0, max = 1.0))]
    pub short_call_target: f64,
    #[serde(default = "long_wing")]
    #[garde(range(min = -1.0, max = 1.0))]
    pub long_put_target: f64,
    #[serde(default = "long_wing")]
    #[garde(range(min = -1.0, max = 1.0))]
    pub long_call_target: f64,
    #[serde(default = "defaults::one")]
    #[garde(range(min = 0.0, max = 1.0))]
    pub liquidity_delta: f64,
    #[serde(default)]
    #[garde(skip)]
    pub collateral_mode: Option<CollateralMode>,
}

/// A short leg sized from a budget and its long hedge of the same size.
struct Wing {
    short: Position,
    long: Position,
    premium_in: f64,
    premium_out: f64,
    collateral: f64,
}

pub struct CostlessCollar {
    params: CostlessCollarParams,
    schedule: Schedule,
    concurrency: f64,
    collateral: CollateralMode,
}

impl CostlessCollar {
    pub fn new(params: CostlessCollarParams) -> Self {
        let schedule = Schedule::new(params.trade_interval, params.time_to_maturity);
        Self {
            concurrency: concurrency(schedule.time_to_maturity, schedule.trade_interval),
            collateral: params.collateral_mode.unwrap_or(CollateralMode::Secondary),
            schedule,
            params,
        }
    }
}

impl Strategy for CostlessCollar {
    fn name(&self) -> &str {
        "costless_collar"
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
        let days_to_maturity = self.schedule.maturity_days;
        let call = price_with_mode(
            chain,
            self.params.mode,
            self.params.target,
            days_to_maturity,
            OptionType::Call,
            QuoteSide::Bid,
        )?;
        let put = chain.strike_by_price(call.price, days_to_maturity, OptionType::Put, QuoteSide::Ask)?;

        let expenditure = status.liquidity(spot) * self.params.utilization_ratio / self.concurrency;
        let size = expenditure / spot / self.params.collateralization_ratio;
        if size.is_nan() || size <= 0.0 {
            debug!(step, size, "no liquidity for a collar");
            return Ok((status, Vec::new()));
        }
        let premium = call.price * size;
        let maturity = time + self.schedule.time_to_maturity;
        let (collateral_primary, collateral_secondary) = self.collateral.split(expenditure, spot);

        let short_call = Position {
            option_type: OptionType::Call,
            strike: call.strike,
            maturity,
            size: -size,
            collateral_primary,
            collateral_secondary,
            iv_start: call.iv,
            price_start: call.price,
        };
        let long_put = Position {
            option_type: OptionType::Put,
            strike: put.strike,
            maturity,
            size,
            collateral_primary: 0.0,
            collateral_secondary: 0.0,
            iv_start: put.iv,
            price_start: put.price,
        };

        // Premiums cancel; only the collateral leaves liquidity.
        add_and_rebalance(-expenditure, &mut status, self.params.liquidity_delta, spot);
        status.positions.push(short_call.clone());
        status.positions.push(long_put.clone());

        let actions = vec![
            action(
                step,
                time,
                spot,
                ActionKind::Sell,
                describe_sale(time, spot, &short_call, premium),
                short_call,
                premium - expenditure,
            ),
            action(
                step,
                time,
                spot,
                ActionKind::Buy,
                describe_purchase(time, spot, &long_put, premium),
                long_put,
                -premium,
            ),
        ];
        Ok((status, actions))
    }

    fn reset(&mut self) {}
}

pub struct IronCondor {
    params: IronCondorParams,
    schedule: Schedule,
    concurrency: f64,
    collateral: CollateralMode,
}

impl IronCondor {
    pub fn new(params: IronCondorParams) -> Self {
        let schedule = Schedule::new(params.trade_interval, params.time_to_maturity);
        Self {
            concurrency: concurrency(schedule.time_to_maturity, schedule.trade_interval),
            collateral: params.collateral_mode.unwrap_or(CollateralMode::Secondary),
            schedule,
            params,
        }
    }

    /// Size one wing from the current liquidity and book it into `status`.
    fn open_wing(
        &self,
        time: NaiveDateTime,
        spot: f64,
        status: &mut PortfolioStatus,
        short_quote: Pricing,
        long_quote: Pricing,
        option_type: OptionType,
    ) -> Option<Wing> {
        let budget = status.liquidity(spot) * self.params.utilization_ratio / self.concurrency
            * self.params.leg_coll_ratio;
        let size = budget / spot / self.params.collateralization_ratio;
        if size.is_nan() || size <= 0.0 {
            return None;
        }
        let maturity = time + self.schedule.time_to_maturity;
        let (collateral_primary, collateral_secondary) = self.collateral.split(budget, spot);
        let short = Position {
            option_type,
            strike: short_quote.strike,
            maturity,
            size: -size,
            collateral_primary,
            collateral_secondary,
            iv_start: short_quote.iv,
            price_start: short_quote.price,
        };
        let long = Position {
            option_type,
            strike: long_quote.strike,
            maturity,
            size,
            collateral_primary: 0.0,
            collateral_secondary: 0.0,
            iv_start: long_quote.iv,
            price_start: long_quote.price,
        };
        let wing = Wing {
            premium_in: short_quote.price * size,
            premium_out: long_quote.price * size,
            collateral: budget,
            short,
            long,
        };
        let net = wing.premium_in - wing.premium_out - wing.collateral;
        add_and_rebalance(net, status, self.params.liquidity_delta, spot);
        status.positions.push(wing.short.clone());
        status.positions.push(wing.long.clone());
        Some(wing)
    }
}

impl Strategy for IronCondor {
    fn name(&self) -> &str {
        "iron_condor"
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
        let p = &self.params;
        let days_to_maturity = self.schedule.maturity_days;
        let quote = |target: f64, option_type: OptionType, side: QuoteSide| {
            price_with_mode(chain, p.mode, target, days_to_maturity, option_type, side)
        };
        let short_call = quote(p.short_call_target, OptionType::Call, QuoteSide::Bid)?;
        let short_put = quote(p.short_put_target, OptionType::Put, QuoteSide::Bid)?;
        let long_put = quote(p.long_put_target, OptionType::Put, QuoteSide::Ask)?;
        let long_call = quote(p.long_call_target, OptionType::Call, QuoteSide::Ask)?;

        let mut sells = Vec::new();
        let mut buys = Vec::new();
        for (short_quote, long_quote, option_type) in [
            (short_call, long_call, OptionType::Call),
            (short_put, long_put, OptionType::Put),
        ] {
            let Some(wing) = self.open_wing(time, spot, &mut status, short_quote, long_quote, option_type)
            else {
                debug!(step, %option_type, "no liquidity for condor wing");
                continue;
            };
            sells.push(action(
                step,
                time,
                spot,
                ActionKind::Sell,
                describe_sale(time, spot, &wing.short, wing.premium_in),
                wing.short,
                wing.premium_in - wing.collateral,
            ));
            buys.push(action(
                step,
                time,
                spot,
                ActionKind::Buy,
                describe_purchase(time, spot, &wing.long, wing.premium_out),
                wing.long,
                -wing.premium_out,
            ));
        }
        sells.extend(buys);
        Ok((status, sells))
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::super::helpers::test_support::{flat_chain, t0};
    use super::*;

    #[test]
    fn collar_put_costs_what_the_call_earns() {
        let params: CostlessCollarParams = serde_json::from_value(serde_json::json!({
            "trade_interval": "7d",
            "liquidity_delta": 0.0,
        }))
        .unwrap();
        let mut strategy = CostlessCollar::new(params);
        let chain = flat_chain(t0(), 100.0);
        let (status, actions) = strategy
            .execute(0, t0(), 100.0, PortfolioStatus::new(10_000.0), &chain, &[])
            .unwrap();

        assert_eq!(actions.len(), 2);
        let call = &actions[0].position;
        let put = &actions[1].position;
        assert!(call.is_short() && put.is_long());
        assert_eq!(call.size, -put.size);
        assert_eq!(call.price_start, put.price_start);
        assert!(put.strike < 100.0 && call.strike > 100.0);
        assert!((call.collateral_secondary - 100.0).abs() < 1e-9);

        // Net liquidity change is the collateral alone.
        let net: f64 = actions.iter().map(|a| a.liquidity_change).sum();
        assert!((net + 10_000.0).abs() < 1e-6);
        assert!(status.primary.abs() < 1e-6);
    }

    #[test]
    fn condor_books_four_legs() {
        let params: IronCondorParams = serde_json::from_value(serde_json::json!({
            "trade_interval": "7d",
            "liquidity_delta": 0.0,
        }))
        .unwrap();
        assert_eq!(params.mode, PricingMode::Delta);
        assert!(params.validate().is_ok());
        let mut strategy = IronCondor::new(params);
        let chain = flat_chain(t0(), 100.0);
        let (status, actions) = strategy
            .execute(0, t0(), 100.0, PortfolioStatus::new(100_000.0), &chain, &[])
            .unwrap();

        let kinds: Vec<ActionKind> = actions.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![ActionKind::Sell, ActionKind::Sell, ActionKind::Buy, ActionKind::Buy]
        );
        let short_call = &actions[0].position;
        let short_put = &actions[1].position;
        let long_call = &actions[2].position;
        let long_put = &actions[3].position;
        assert!(long_put.strike < short_put.strike);
        assert!(short_put.strike < 100.0 && short_call.strike > 100.0);
        assert!(short_call.strike < long_call.strike);
        assert_eq!(long_call.size, -short_call.size);
        assert_eq!(long_put.size, -short_put.size);
        // First wing gets a quarter of the budget.
        assert!((short_call.collateral_secondary - 250.0).abs() < 1e-9);

        let net: f64 = actions.iter().map(|a| a.liquidity_change).sum();
        assert!((status.primary - (100_000.0 + net)).abs() < 1e-6);
        // Short wings are closer to the money, so the condor is a net credit.
        let premiums = net + actions[0].position.collateral_secondary * 100.0
            + actions[1].position.collateral_secondary * 100.0;
        assert!(premiums > 0.0);
        assert_eq!(status.positions.len(), 4);
    }
}
