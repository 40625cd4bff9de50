pub mod buying;
pub mod combos;
pub mod helpers;
pub mod selling;

use chrono::NaiveDateTime;
use garde::Validate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::engine::action::SimulationAction;
use crate::engine::error::StrategyError;
use crate::engine::status::PortfolioStatus;
use crate::engine::surface::OptionChain;

pub use buying::{MarriedPut, MarriedPutParams, RollingOptionBuying, RollingOptionBuyingParams};
pub use combos::{CostlessCollar, CostlessCollarParams, IronCondor, IronCondorParams};
pub use selling::{
    OptionSelling, OptionSellingParams, RollingOptionSelling, RollingOptionSellingParams,
};

/// Trading policy invoked once per step by the simulator.
///
/// The strategy receives the portfolio by value and hands it back; it must
/// not keep any reference to it between calls. `action_log` holds every
/// action up to the end of the previous step.
pub trait Strategy: Send {
    fn name(&self) -> &str;

    fn execute(
        &mut self,
        step: usize,
        time: NaiveDateTime,
        spot: f64,
        status: PortfolioStatus,
        chain: &OptionChain,
        action_log: &[SimulationAction],
    ) -> Result<(PortfolioStatus, Vec<SimulationAction>), StrategyError>;

    /// Called once before every run.
    fn reset(&mut self);
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct StrategyInfo {
    pub name: &'static str,
    pub category: &'static str,
    pub description: &'static str,
}

pub fn all_strategies() -> Vec<StrategyInfo> {
    let info = |name, category, description| StrategyInfo {
        name,
        category,
        description,
    };
    vec![
        info(
            "option_selling",
            "selling",
            "Sell an option every trade interval and hold it to expiry, collateralised in cash (puts) or the underlying (calls)",
        ),
        info(
            "rolling_option_selling",
            "selling",
            "Sell options periodically and buy each one back shortly before maturity",
        ),
        info(
            "married_put",
            "hedging",
            "Hold the underlying and buy one protective put per unit",
        ),
        info(
            "rolling_option_buying",
            "buying",
            "Buy options periodically and sell each one back shortly before maturity",
        ),
        info(
            "costless_collar",
            "hedging",
            "Sell a call and buy a put of equal premium",
        ),
        info(
            "iron_condor",
            "combos",
            "Sell call and put wings and buy further out-of-the-money protection",
        ),
    ]
}

pub fn find_strategy(name: &str) -> Option<StrategyInfo> {
    all_strategies().into_iter().find(|s| s.name == name)
}

/// Serializable strategy configuration, tagged by strategy name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum StrategySpec {
    OptionSelling(#[garde(dive)] OptionSellingParams),
    RollingOptionSelling(#[garde(dive)] RollingOptionSellingParams),
    MarriedPut(#[garde(dive)] MarriedPutParams),
    RollingOptionBuying(#[garde(dive)] RollingOptionBuyingParams),
    CostlessCollar(#[garde(dive)] CostlessCollarParams),
    IronCondor(#[garde(dive)] IronCondorParams),
}

impl StrategySpec {
    pub fn name(&self) -> &'static str {
        match self {
            StrategySpec::OptionSelling(_) => "option_selling",
            StrategySpec::RollingOptionSelling(_) => "rolling_option_selling",
            StrategySpec::MarriedPut(_) => "married_put",
            StrategySpec::RollingOptionBuying(_) => "rolling_option_buying",
            StrategySpec::CostlessCollar(_) => "costless_collar",
            StrategySpec::IronCondor(_) => "iron_condor",
        }
    }

    pub fn build(&self) -> Box<dyn Strategy> {
        match self.clone() {
            StrategySpec::OptionSelling(p) => Box::new(OptionSelling::new(p)),
            StrategySpec::RollingOptionSelling(p) => Box::new(RollingOptionSelling::new(p)),
            StrategySpec::MarriedPut(p) => Box::new(MarriedPut::new(p)),
            StrategySpec::RollingOptionBuying(p) => Box::new(RollingOptionBuying::new(p)),
            StrategySpec::CostlessCollar(p) => Box::new(CostlessCollar::new(p)),
            StrategySpec::IronCondor(p) => Box::new(IronCondor::new(p)),
        }
    }
}
