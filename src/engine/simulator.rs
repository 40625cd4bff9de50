//! Discrete-time simulation loop.
//!
//! Each step runs, in order: liquidation of under-collateralised shorts,
//! settlement of expired positions, the strategy selected by the timing
//! signal, and the timeline snapshot. Actions produced by the first three
//! phases are appended to the log in that same order, after the strategy has
//! run, so a strategy only ever sees actions from earlier steps.

use chrono::{NaiveDateTime, TimeDelta};
use garde::Validate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::action::{ActionKind, SimulationAction};
use super::error::SimulationError;
use super::output::SimulationResult;
use super::status::{PortfolioStatus, TimelineRow};
use super::timeline::ChainTimeline;
use super::types::{duration_str, SurfaceConfig, DAYS_PER_YEAR};
use crate::strategies::Strategy;

fn default_time_step() -> TimeDelta {
    TimeDelta::hours(1)
}

fn default_starting_capital() -> f64 {
    1_000_000.0
}

/// Window, step size and capital of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct SimulationConfig {
    /// First simulated timestamp (inclusive)
    #[garde(skip)]
    pub start: NaiveDateTime,
    /// End of the window (exclusive)
    #[garde(skip)]
    pub end: NaiveDateTime,
    /// Step size, e.g. "1h" or "1d"
    #[serde(default = "default_time_step", with = "duration_str")]
    #[schemars(with = "String")]
    #[garde(skip)]
    pub time_step: TimeDelta,
    /// Initial primary balance
    #[serde(default = "default_starting_capital")]
    #[garde(range(min = 0.0))]
    pub starting_capital: f64,
    #[serde(default)]
    #[garde(dive)]
    pub surface: SurfaceConfig,
}

impl SimulationConfig {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            start,
            end,
            time_step: default_time_step(),
            starting_capital: default_starting_capital(),
            surface: SurfaceConfig::default(),
        }
    }

    /// Number of steps `start + i * time_step` that fall before `end`.
    pub fn num_steps(&self) -> Result<usize, SimulationError> {
        let step_ms = self.time_step.num_milliseconds();
        if step_ms <= 0 {
            return Err(SimulationError::InvalidWindow(format!(
                "time step must be positive, got {}ms",
                step_ms
            )));
        }
        let span_ms = (self.end - self.start).num_milliseconds();
        if span_ms <= 0 {
            return Err(SimulationError::InvalidWindow(format!(
                "end {} is not after start {}",
                self.end, self.start
            )));
        }
        let steps = span_ms / step_ms;
        if steps == 0 {
            return Err(SimulationError::InvalidWindow(
                "window is shorter than one time step".to_string(),
            ));
        }
        usize::try_from(steps).map_err(|e| SimulationError::InvalidWindow(e.to_string()))
    }

    pub fn step_time(&self, step: usize) -> NaiveDateTime {
        let offset = self.time_step.num_milliseconds() * step as i64;
        self.start + TimeDelta::milliseconds(offset)
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn annual_periods(&self) -> f64 {
        DAYS_PER_YEAR * 86_400_000.0 / self.time_step.num_milliseconds() as f64
    }
}

/// One switch point of a timing signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TimingEntry {
    pub time: NaiveDateTime,
    /// Zero-based index into the strategy list
    pub strategy: usize,
}

/// Sparse mapping from time to the active strategy index. Between entries the
/// most recent earlier value holds; before the first entry index 0 is used.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimingSignal {
    switches: BTreeMap<NaiveDateTime, usize>,
}

impl TimingSignal {
    pub fn strategy_at(&self, time: NaiveDateTime) -> usize {
        self.switches
            .range(..=time)
            .next_back()
            .map_or(0, |(_, &idx)| idx)
    }

    pub fn max_index(&self) -> Option<usize> {
        self.switches.values().copied().max()
    }

    pub fn is_empty(&self) -> bool {
        self.switches.is_empty()
    }
}

impl FromIterator<(NaiveDateTime, usize)> for TimingSignal {
    fn from_iter<I: IntoIterator<Item = (NaiveDateTime, usize)>>(iter: I) -> Self {
        Self {
            switches: iter.into_iter().collect(),
        }
    }
}

impl From<&[TimingEntry]> for TimingSignal {
    fn from(entries: &[TimingEntry]) -> Self {
        entries.iter().map(|e| (e.time, e.strategy)).collect()
    }
}

pub struct Simulator<'a> {
    timeline: &'a ChainTimeline,
    strategies: Vec<Box<dyn Strategy>>,
    timing: TimingSignal,
}

impl<'a> Simulator<'a> {
    pub fn new(
        timeline: &'a ChainTimeline,
        strategies: Vec<Box<dyn Strategy>>,
        timing: Option<TimingSignal>,
    ) -> Result<Self, SimulationError> {
        if strategies.is_empty() {
            return Err(SimulationError::NoStrategies);
        }
        let timing = timing.unwrap_or_default();
        if let Some(index) = timing.max_index() {
            if index >= strategies.len() {
                return Err(SimulationError::InvalidTimingSignal {
                    index,
                    available: strategies.len(),
                });
            }
        }
        Ok(Self {
            timeline,
            strategies,
            timing,
        })
    }

    pub fn run(&mut self, config: &SimulationConfig) -> Result<SimulationResult, SimulationError> {
        let steps = config.num_steps()?;
        for strategy in &mut self.strategies {
            strategy.reset();
        }
        info!(
            start = %config.start,
            end = %config.end,
            steps,
            strategies = self.strategies.len(),
            "starting simulation"
        );

        let mut status = PortfolioStatus::new(config.starting_capital);
        let mut timeline = Vec::with_capacity(steps);
        let mut action_log: Vec<SimulationAction> = Vec::new();

        for step in 0..steps {
            let time = config.step_time(step);
            let chain = self
                .timeline
                .latest_at(time)
                .ok_or(SimulationError::NoMarketData { step, time })?;
            let spot = chain.spot();

            let mut step_actions = check_liquidations(step, time, spot, &mut status);
            step_actions.extend(check_expirations(step, time, spot, &mut status));

            let index = self.timing.strategy_at(time);
            let available = self.strategies.len();
            let strategy = self
                .strategies
                .get_mut(index)
                .ok_or(SimulationError::InvalidTimingSignal { index, available })?;
            let (next, strategy_actions) = strategy
                .execute(step, time, spot, status, chain, &action_log)
                .map_err(|source| SimulationError::Strategy {
                    step,
                    time,
                    strategy: strategy.name().to_string(),
                    source,
                })?;
            status = next;
            validate_positions(step, time, &status)?;

            timeline.push(TimelineRow::capture(time, spot, &status, Some(chain)));
            for action in step_actions.into_iter().chain(strategy_actions) {
                debug!(step, kind = action.kind.as_str(), "{}", action.description);
                action_log.push(action);
            }
        }

        let result = SimulationResult::new(timeline, action_log, config.annual_periods());
        info!(
            steps,
            actions = result.actions.len(),
            final_value = result.final_value(),
            sharpe = result.metrics.sharpe,
            "simulation finished"
        );
        Ok(result)
    }
}

/// Remove every short whose collateral no longer covers its delivery. The
/// collateral is forfeited, so the liquidity change is zero.
fn check_liquidations(
    step: usize,
    time: NaiveDateTime,
    spot: f64,
    status: &mut PortfolioStatus,
) -> Vec<SimulationAction> {
    let (liquidated, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut status.positions)
        .into_iter()
        .partition(|p| p.is_liquidated(spot));
    status.positions = kept;

    liquidated
        .into_iter()
        .map(|position| SimulationAction {
            step,
            timestamp: time,
            spot,
            kind: ActionKind::Liquidation,
            description: format!(
                "{time} @ {spot:.1}: Liquidated {} {:.3} {} of size {:.3} with {:.3} primary and {:.3} secondary collateral",
                position.option_type,
                position.strike,
                position.maturity,
                position.size,
                position.collateral_primary,
                position.collateral_secondary,
            ),
            position,
            liquidity_change: 0.0,
        })
        .collect()
}

/// Settle expired positions: delivery plus returned collateral is credited
/// to the primary balance.
fn check_expirations(
    step: usize,
    time: NaiveDateTime,
    spot: f64,
    status: &mut PortfolioStatus,
) -> Vec<SimulationAction> {
    let (expired, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut status.positions)
        .into_iter()
        .partition(|p| p.is_expired(time));
    status.positions = kept;

    expired
        .into_iter()
        .map(|position| {
            let delivery = position.delivery(spot);
            let liquidity_change = delivery + position.collateral_value(spot);
            status.primary += liquidity_change;
            let side = if position.is_long() { "long" } else { "short" };
            SimulationAction {
                step,
                timestamp: time,
                spot,
                kind: ActionKind::Expiration,
                description: format!(
                    "{time} @ {spot:.1}: Expired {side} {} {:.3} of size {:.3} with delivery of {delivery:.3}",
                    position.option_type, position.strike, position.size,
                ),
                position,
                liquidity_change,
            }
        })
        .collect()
}

fn validate_positions(
    step: usize,
    time: NaiveDateTime,
    status: &PortfolioStatus,
) -> Result<(), SimulationError> {
    for p in &status.positions {
        let fields = [
            ("strike", p.strike),
            ("size", p.size),
            ("collateral_primary", p.collateral_primary),
            ("collateral_secondary", p.collateral_secondary),
            ("iv_start", p.iv_start),
            ("price_start", p.price_start),
        ];
        if let Some((name, value)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(SimulationError::InvalidPosition {
                step,
                time,
                reason: format!("{} {:.3} has non-finite {name} ({value})", p.option_type, p.strike),
            });
        }
        if p.strike <= 0.0 {
            return Err(SimulationError::InvalidPosition {
                step,
                time,
                reason: format!("{} has non-positive strike {}", p.option_type, p.strike),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::error::StrategyError;
    use crate::engine::position::Position;
    use crate::engine::surface::OptionChain;
    use crate::engine::types::{OptionType, Quote};
    use chrono::NaiveDate;
    use std::sync::{Arc, Mutex};

    fn t(hour: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 2, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + TimeDelta::hours(hour)
    }

    fn chain_at(hour: i64, spot: f64) -> OptionChain {
        let quote = Quote {
            option_type: OptionType::Call,
            strike: spot,
            expiration: t(hour) + TimeDelta::days(7),
            bid_price: 0.01,
            mark_price: 0.02,
            ask_price: 0.03,
            underlying_price: spot,
            iv_ratio: 1.0,
            spot_ratio: 1.0,
        };
        OptionChain::new(t(hour), vec![quote], SurfaceConfig::default()).unwrap()
    }

    fn timeline(points: &[(i64, f64)]) -> ChainTimeline {
        ChainTimeline::from_chains(points.iter().map(|&(h, s)| chain_at(h, s)))
    }

    fn config(hours: i64) -> SimulationConfig {
        SimulationConfig {
            starting_capital: 1_000.0,
            ..SimulationConfig::new(t(0), t(hours))
        }
    }

    fn position(option_type: OptionType, strike: f64, size: f64, maturity: NaiveDateTime) -> Position {
        Position {
            option_type,
            strike,
            maturity,
            size,
            collateral_primary: 0.0,
            collateral_secondary: 0.0,
            iv_start: 0.5,
            price_start: 1.0,
        }
    }

    /// Opens the given positions at fixed steps and records what it saw.
    struct Scripted {
        name: String,
        trades: Vec<(usize, Position)>,
        seen_log_len: Arc<Mutex<Vec<usize>>>,
        resets: Arc<Mutex<usize>>,
    }

    impl Scripted {
        fn new(name: &str, trades: Vec<(usize, Position)>) -> Self {
            Self {
                name: name.to_string(),
                trades,
                seen_log_len: Arc::default(),
                resets: Arc::default(),
            }
        }
    }

    impl Strategy for Scripted {
        fn name(&self) -> &str {
            &self.name
        }

        fn execute(
            &mut self,
            step: usize,
            time: NaiveDateTime,
            spot: f64,
            mut status: PortfolioStatus,
            _chain: &OptionChain,
            action_log: &[SimulationAction],
        ) -> Result<(PortfolioStatus, Vec<SimulationAction>), StrategyError> {
            self.seen_log_len.lock().unwrap().push(action_log.len());
            let mut actions = Vec::new();
            for (_, position) in self.trades.iter().filter(|(s, _)| *s == step) {
                status.positions.push(position.clone());
                actions.push(SimulationAction {
                    step,
                    timestamp: time,
                    spot,
                    kind: if position.is_long() { ActionKind::Buy } else { ActionKind::Sell },
                    description: format!("{} opened", self.name),
                    position: position.clone(),
                    liquidity_change: 0.0,
                });
            }
            Ok((status, actions))
        }

        fn reset(&mut self) {
            *self.resets.lock().unwrap() += 1;
        }
    }

    struct Failing;

    impl Strategy for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn execute(
            &mut self,
            _step: usize,
            _time: NaiveDateTime,
            _spot: f64,
            _status: PortfolioStatus,
            _chain: &OptionChain,
            _action_log: &[SimulationAction],
        ) -> Result<(PortfolioStatus, Vec<SimulationAction>), StrategyError> {
            Err(StrategyError::InvalidState("boom".into()))
        }

        fn reset(&mut self) {}
    }

    #[test]
    fn step_grid_is_half_open() {
        let mut cfg = config(5);
        assert_eq!(cfg.num_steps().unwrap(), 5);
        cfg.time_step = TimeDelta::hours(2);
        assert_eq!(cfg.num_steps().unwrap(), 2);
        assert_eq!(cfg.step_time(1), t(2));
        cfg.end = cfg.start;
        assert!(matches!(cfg.num_steps(), Err(SimulationError::InvalidWindow(_))));
    }

    #[test]
    fn fill_forward_reuses_last_snapshot() {
        let tl = timeline(&[(0, 100.0), (2, 120.0)]);
        let strategy = Scripted::new("idle", vec![]);
        let mut sim = Simulator::new(&tl, vec![Box::new(strategy)], None).unwrap();
        let result = sim.run(&config(3)).unwrap();
        let spots: Vec<f64> = result.timeline.iter().map(|r| r.spot).collect();
        assert_eq!(spots, vec![100.0, 100.0, 120.0]);
        assert_eq!(result.timeline[1].timestamp, t(1));
    }

    #[test]
    fn missing_initial_data_is_fatal() {
        let tl = timeline(&[(1, 100.0)]);
        let mut sim = Simulator::new(&tl, vec![Box::new(Scripted::new("idle", vec![]))], None).unwrap();
        let err = sim.run(&config(3)).unwrap_err();
        assert_eq!(err, SimulationError::NoMarketData { step: 0, time: t(0) });
    }

    #[test]
    fn liquidation_removes_position_without_cash() {
        let tl = timeline(&[(0, 100.0), (1, 50.0)]);
        let short_put = position(OptionType::Put, 100.0, -1.0, t(0) + TimeDelta::days(7));
        let strategy = Scripted::new("seller", vec![(0, short_put.clone())]);
        let mut sim = Simulator::new(&tl, vec![Box::new(strategy)], None).unwrap();
        let result = sim.run(&config(3)).unwrap();

        let liquidation = &result.actions[1];
        assert_eq!(liquidation.kind, ActionKind::Liquidation);
        assert_eq!(liquidation.step, 1);
        assert_eq!(liquidation.liquidity_change, 0.0);
        assert_eq!(liquidation.position, short_put);
        assert_eq!(result.timeline[0].num_short_positions, 1);
        assert_eq!(result.timeline[1].num_short_positions, 0);
        assert_eq!(result.timeline[2].num_short_positions, 0);
        assert_eq!(result.timeline[2].primary, 1_000.0);
    }

    #[test]
    fn expiration_credits_delivery_plus_collateral() {
        let tl = timeline(&[(0, 100.0), (1, 90.0)]);
        let mut short_put = position(OptionType::Put, 100.0, -1.0, t(1));
        short_put.collateral_primary = 100.0;
        let strategy = Scripted::new("seller", vec![(0, short_put)]);
        let mut sim = Simulator::new(&tl, vec![Box::new(strategy)], None).unwrap();
        let result = sim.run(&config(2)).unwrap();

        let expiration = &result.actions[1];
        assert_eq!(expiration.kind, ActionKind::Expiration);
        assert!((expiration.liquidity_change - 90.0).abs() < 1e-12);
        assert!((result.timeline[1].primary - 1_090.0).abs() < 1e-12);
        assert_eq!(result.timeline[1].num_short_positions, 0);
    }

    #[test]
    fn actions_are_logged_in_phase_order() {
        let tl = timeline(&[(0, 100.0), (1, 50.0)]);
        let trades = vec![
            (0, position(OptionType::Put, 100.0, -1.0, t(48))),
            (0, position(OptionType::Call, 40.0, 1.0, t(1))),
            (1, position(OptionType::Call, 60.0, -1.0, t(48))),
        ];
        let mut sim = Simulator::new(&tl, vec![Box::new(Scripted::new("s", trades))], None).unwrap();
        let result = sim.run(&config(2)).unwrap();
        let kinds: Vec<ActionKind> = result.actions.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ActionKind::Sell,
                ActionKind::Buy,
                ActionKind::Liquidation,
                ActionKind::Expiration,
                ActionKind::Sell,
            ]
        );
        // Long call settles for 10 per unit.
        assert!((result.actions[3].liquidity_change - 10.0).abs() < 1e-12);
    }

    #[test]
    fn strategy_sees_log_up_to_previous_step() {
        let tl = timeline(&[(0, 100.0)]);
        let trades = vec![
            (0, position(OptionType::Put, 90.0, -1.0, t(48))),
            (0, position(OptionType::Put, 80.0, -1.0, t(48))),
        ];
        let strategy = Scripted::new("s", trades);
        let seen = Arc::clone(&strategy.seen_log_len);
        let resets = Arc::clone(&strategy.resets);
        let mut sim = Simulator::new(&tl, vec![Box::new(strategy)], None).unwrap();
        sim.run(&config(3)).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0, 2, 2]);
        assert_eq!(*resets.lock().unwrap(), 1);
    }

    #[test]
    fn timing_signal_selects_strategy() {
        let tl = timeline(&[(0, 100.0)]);
        let first = Scripted::new("first", vec![]);
        let second = Scripted::new("second", vec![]);
        let first_calls = Arc::clone(&first.seen_log_len);
        let second_calls = Arc::clone(&second.seen_log_len);
        let signal: TimingSignal = [(t(2), 1), (t(3), 0)].into_iter().collect();
        assert_eq!(signal.strategy_at(t(1)), 0);
        assert_eq!(signal.strategy_at(t(2)), 1);

        let mut sim =
            Simulator::new(&tl, vec![Box::new(first), Box::new(second)], Some(signal)).unwrap();
        sim.run(&config(5)).unwrap();
        assert_eq!(first_calls.lock().unwrap().len(), 4);
        assert_eq!(second_calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn constructor_validates_inputs() {
        let tl = timeline(&[(0, 100.0)]);
        assert_eq!(
            Simulator::new(&tl, vec![], None).err(),
            Some(SimulationError::NoStrategies)
        );
        let signal: TimingSignal = [(t(1), 2)].into_iter().collect();
        let err = Simulator::new(&tl, vec![Box::new(Failing)], Some(signal)).err();
        assert_eq!(
            err,
            Some(SimulationError::InvalidTimingSignal {
                index: 2,
                available: 1
            })
        );
    }

    #[test]
    fn strategy_failure_names_step_and_strategy() {
        let tl = timeline(&[(0, 100.0)]);
        let mut sim = Simulator::new(&tl, vec![Box::new(Failing)], None).unwrap();
        match sim.run(&config(2)).unwrap_err() {
            SimulationError::Strategy { step, strategy, .. } => {
                assert_eq!(step, 0);
                assert_eq!(strategy, "failing");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn non_finite_position_aborts_run() {
        let tl = timeline(&[(0, 100.0)]);
        let bad = position(OptionType::Put, 90.0, f64::NAN, t(48));
        let mut sim =
            Simulator::new(&tl, vec![Box::new(Scripted::new("bad", vec![(1, bad)]))], None).unwrap();
        let err = sim.run(&config(3)).unwrap_err();
        assert!(matches!(err, SimulationError::InvalidPosition { step: 1, .. }));
    }
}
