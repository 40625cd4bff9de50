use chrono::NaiveDateTime;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::position::Position;
use super::surface::OptionChain;

/// Cash, underlying and open positions of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioStatus {
    pub primary: f64,
    pub secondary: f64,
    pub positions: Vec<Position>,
}

impl PortfolioStatus {
    pub fn new(starting_capital: f64) -> Self {
        Self {
            primary: starting_capital,
            secondary: 0.0,
            positions: Vec::new(),
        }
    }

    pub fn liquidity(&self, spot: f64) -> f64 {
        self.primary + self.secondary * spot
    }

    pub fn num_long_positions(&self) -> usize {
        self.positions.iter().filter(|p| p.is_long()).count()
    }

    pub fn num_short_positions(&self) -> usize {
        self.positions.iter().filter(|p| p.is_short()).count()
    }

    pub fn size_long_positions(&self) -> f64 {
        self.positions
            .iter()
            .filter(|p| p.is_long())
            .map(|p| p.size)
            .sum::<f64>()
            .abs()
    }

    pub fn size_short_positions(&self) -> f64 {
        self.positions
            .iter()
            .filter(|p| p.is_short())
            .map(|p| p.size)
            .sum::<f64>()
            .abs()
    }

    pub fn collateral_primary(&self) -> f64 {
        self.positions.iter().map(|p| p.collateral_primary).sum()
    }

    pub fn collateral_secondary(&self) -> f64 {
        self.positions.iter().map(|p| p.collateral_secondary).sum()
    }

    pub fn total_collaterals(&self, spot: f64) -> f64 {
        self.collateral_primary() + self.collateral_secondary() * spot
    }

    pub fn positions_value(&self, spot: f64, time: NaiveDateTime, chain: Option<&OptionChain>) -> f64 {
        self.positions
            .iter()
            .map(|p| p.valuation(spot, time, chain).value())
            .sum()
    }

    pub fn positions_delta(&self, spot: f64, time: NaiveDateTime, chain: Option<&OptionChain>) -> f64 {
        self.positions
            .iter()
            .map(|p| p.delta(spot, time, chain).value())
            .sum()
    }

    /// Secondary holdings, free or pledged, count one-for-one.
    pub fn total_delta(&self, spot: f64, time: NaiveDateTime, chain: Option<&OptionChain>) -> f64 {
        self.secondary + self.positions_delta(spot, time, chain) + self.collateral_secondary()
    }

    pub fn total_value(&self, spot: f64, time: NaiveDateTime, chain: Option<&OptionChain>) -> f64 {
        self.liquidity(spot) + self.positions_value(spot, time, chain) + self.total_collaterals(spot)
    }
}

/// One row of the output timeline, captured after a step completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TimelineRow {
    pub timestamp: NaiveDateTime,
    pub spot: f64,
    pub primary: f64,
    pub secondary: f64,
    pub liquidity: f64,
    pub num_long_positions: usize,
    pub num_short_positions: usize,
    pub size_long_positions: f64,
    pub size_short_positions: f64,
    pub collateral_primary: f64,
    pub collateral_secondary: f64,
    pub total_collaterals: f64,
    pub positions_delta: f64,
    pub total_delta: f64,
    pub positions_value: f64,
    pub total_value: f64,
}

impl TimelineRow {
    pub fn capture(
        time: NaiveDateTime,
        spot: f64,
        status: &PortfolioStatus,
        chain: Option<&OptionChain>,
    ) -> Self {
        let liquidity = status.liquidity(spot);
        let collateral_primary = status.collateral_primary();
        let collateral_secondary = status.collateral_secondary();
        let total_collaterals = collateral_primary + collateral_secondary * spot;
        let positions_value = status.positions_value(spot, time, chain);
        let positions_delta = status.positions_delta(spot, time, chain);

        Self {
            timestamp: time,
            spot,
            primary: status.primary,
            secondary: status.secondary,
            liquidity,
            num_long_positions: status.num_long_positions(),
            num_short_positions: status.num_short_positions(),
            size_long_positions: status.size_long_positions(),
            size_short_positions: status.size_short_positions(),
            collateral_primary,
            collateral_secondary,
            total_collaterals,
            positions_delta,
            total_delta: status.secondary + positions_delta + collateral_secondary,
            positions_value,
            total_value: liquidity + positions_value + total_collaterals,
        }
    }
}
