use chrono::NaiveDateTime;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::position::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Buy,
    Sell,
    Expiration,
    Liquidation,
}

impl ActionKind {
    /// Buys and sells come from strategies; the rest from the engine.
    pub fn is_trade(self) -> bool {
        matches!(self, ActionKind::Buy | ActionKind::Sell)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Buy => "buy",
            ActionKind::Sell => "sell",
            ActionKind::Expiration => "expiration",
            ActionKind::Liquidation => "liquidation",
        }
    }
}

/// Immutable log record. The position is stored by value since the live
/// book entry may be removed right after the action is logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SimulationAction {
    pub step: usize,
    pub timestamp: NaiveDateTime,
    pub spot: f64,
    pub kind: ActionKind,
    pub description: String,
    pub position: Position,
    pub liquidity_change: f64,
}
