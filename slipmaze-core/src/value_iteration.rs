//! Offline value iteration over the slippery-maze MDP.
//!
//! The solver runs synchronous full sweeps of the Bellman optimality update
//! until the sup-norm change between two sweeps drops below `epsilon`, then a
//! separate pass extracts the greedy [`Policy`]. [`PolicyRunner`] follows that
//! policy through the stochastic executor.
//!
//! Continuation rules for a candidate outcome `next` of a cell `c`:
//! - `next` is the goal: the goal reward is collected and the episode ends,
//!   so the continuation value is zero;
//! - `next` is a wall or off the maze: the agent bumps and stays, earning the
//!   bump reward with continuation `V(c)`;
//! - otherwise: `reward(next)` with continuation `V(next)`.
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::action::Action;
use crate::constants::{BUMP_REWARD, DEFAULT_DISCOUNT, DEFAULT_EPSILON, SWEEP_LOG_INTERVAL};
use crate::executor::Executor;
use crate::grid::{Grid, GridError, Position};
use crate::replan::search;
use crate::strategy::{Strategy, StrategyError, Tally, TrialOutcome, TrialStatus};

/// Solver tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Weight of future value, in `(0, 1]`.
    #[serde(default = "SolverConfig::default_discount")]
    pub discount: f64,
    /// Convergence threshold on the sup-norm delta of a sweep.
    #[serde(default = "SolverConfig::default_epsilon")]
    pub epsilon: f64,
    /// Optional hard cap on sweeps. Hitting it is reported as an error.
    #[serde(default)]
    pub max_sweeps: Option<u64>,
}

impl SolverConfig {
    const fn default_discount() -> f64 {
        DEFAULT_DISCOUNT
    }

    const fn default_epsilon() -> f64 {
        DEFAULT_EPSILON
    }

    #[must_use]
    pub const fn with_discount(mut self, discount: f64) -> Self {
        self.discount = discount;
        self
    }

    #[must_use]
    pub const fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    #[must_use]
    pub const fn with_max_sweeps(mut self, max_sweeps: Option<u64>) -> Self {
        self.max_sweeps = max_sweeps;
        self
    }

    /// Check the configuration invariants.
    ///
    /// # Errors
    ///
    /// Returns a [`SolverConfigError`] naming the offending field.
    pub fn validate(&self) -> Result<(), SolverConfigError> {
        if !(self.discount > 0.0 && self.discount <= 1.0) {
            return Err(SolverConfigError::Discount {
                value: self.discount,
            });
        }
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(SolverConfigError::Epsilon {
                value: self.epsilon,
            });
        }
        if self.max_sweeps == Some(0) {
            return Err(SolverConfigError::ZeroSweepLimit);
        }
        Ok(())
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            discount: Self::default_discount(),
            epsilon: Self::default_epsilon(),
            max_sweeps: None,
        }
    }
}

/// Errors raised when solver configuration invariants are violated.
#[derive(Debug, Error, PartialEq)]
pub enum SolverConfigError {
    #[error("discount must be in (0, 1] (got {value})")]
    Discount { value: f64 },
    #[error("epsilon must be a positive finite number (got {value})")]
    Epsilon { value: f64 },
    #[error("max_sweeps must be at least 1 when set")]
    ZeroSweepLimit,
}

#[derive(Debug, Error, PartialEq)]
pub enum SolverError {
    #[error(transparent)]
    Config(#[from] SolverConfigError),
    #[error("value iteration stopped after {sweeps} sweeps with delta {delta:.6}")]
    SweepLimit { sweeps: u64, delta: f64 },
    #[error("value function has not converged yet")]
    NotConverged,
}

/// Solver lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverPhase {
    Unsolved,
    Iterating,
    Converged,
}

/// Expected discounted return per open cell; absent for walls.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueFunction {
    rows: usize,
    cols: usize,
    values: Vec<f64>,
    open: Vec<bool>,
}

impl ValueFunction {
    fn zeros(grid: &Grid) -> Self {
        let open = grid.positions().map(|pos| grid.is_passable(pos)).collect();
        Self {
            rows: grid.rows(),
            cols: grid.cols(),
            values: vec![0.0; grid.rows() * grid.cols()],
            open,
        }
    }

    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// Value at `pos`, or `None` for walls and off-maze positions.
    #[must_use]
    pub fn get(&self, pos: Position) -> Option<f64> {
        let idx = self.index(pos)?;
        self.open[idx].then(|| self.values[idx])
    }

    fn index(&self, pos: Position) -> Option<usize> {
        let row = usize::try_from(pos.row).ok()?;
        let col = usize::try_from(pos.col).ok()?;
        (row < self.rows && col < self.cols).then(|| row * self.cols + col)
    }
}

/// Per-cell decision of a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyCell {
    /// Wall cell; the agent can never stand here.
    Blocked,
    Act(Action),
}

impl PolicyCell {
    #[must_use]
    pub const fn action(self) -> Option<Action> {
        match self {
            Self::Blocked => None,
            Self::Act(action) => Some(action),
        }
    }
}

/// Greedy action for every cell of a maze.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    cells: Vec<Vec<PolicyCell>>,
}

impl Policy {
    /// Wrap externally supplied rows of policy cells.
    #[must_use]
    pub const fn from_rows(cells: Vec<Vec<PolicyCell>>) -> Self {
        Self { cells }
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<PolicyCell>] {
        &self.cells
    }

    #[must_use]
    pub fn get(&self, pos: Position) -> Option<PolicyCell> {
        let row = usize::try_from(pos.row).ok()?;
        let col = usize::try_from(pos.col).ok()?;
        self.cells.get(row)?.get(col).copied()
    }

    /// Verify this policy covers `grid` cell for cell.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::DimensionMismatch`] when the shapes differ, including
    /// ragged policy rows.
    pub fn ensure_matches(&self, grid: &Grid) -> Result<(), GridError> {
        let rows = self.cells.len();
        let cols = self.cells.first().map_or(0, Vec::len);
        grid.ensure_dimensions(rows, cols)?;
        if let Some(row) = self.cells.iter().find(|row| row.len() != cols) {
            return grid.ensure_dimensions(rows, row.len());
        }
        Ok(())
    }
}

/// Converged values together with the greedy policy they induce.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub values: ValueFunction,
    pub policy: Policy,
    /// Sweeps needed to converge.
    pub iterations: u64,
}

/// Value-iteration solver bound to one maze.
#[derive(Debug, Clone)]
pub struct ValueIteration {
    grid: Arc<Grid>,
    config: SolverConfig,
    phase: SolverPhase,
    values: ValueFunction,
    iterations: u64,
    deltas: Vec<f64>,
}

impl ValueIteration {
    /// Create an unsolved solver.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::Config`] when `config` fails validation.
    pub fn new(grid: Arc<Grid>, config: SolverConfig) -> Result<Self, SolverError> {
        config.validate()?;
        let values = ValueFunction::zeros(&grid);
        Ok(Self {
            grid,
            config,
            phase: SolverPhase::Unsolved,
            values,
            iterations: 0,
            deltas: Vec::new(),
        })
    }

    /// Construct, solve, and extract the policy in one call.
    ///
    /// # Errors
    ///
    /// Propagates configuration and sweep-limit failures.
    pub fn solved(grid: Arc<Grid>, config: SolverConfig) -> Result<Solution, SolverError> {
        let mut solver = Self::new(grid, config)?;
        solver.solve()?;
        let policy = solver.extract_policy()?;
        Ok(Solution {
            values: solver.values,
            policy,
            iterations: solver.iterations,
        })
    }

    #[must_use]
    pub const fn phase(&self) -> SolverPhase {
        self.phase
    }

    #[must_use]
    pub const fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Full sweeps performed so far.
    #[must_use]
    pub const fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Sup-norm delta of every sweep, in order.
    #[must_use]
    pub fn sweep_deltas(&self) -> &[f64] {
        &self.deltas
    }

    #[must_use]
    pub const fn values(&self) -> &ValueFunction {
        &self.values
    }

    /// Sweep until convergence. Solving a converged solver is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::SweepLimit`] when `max_sweeps` is configured and
    /// exhausted before the delta falls below `epsilon`.
    pub fn solve(&mut self) -> Result<&ValueFunction, SolverError> {
        if self.phase == SolverPhase::Converged {
            return Ok(&self.values);
        }
        self.phase = SolverPhase::Iterating;

        loop {
            let delta = self.sweep();
            self.iterations += 1;
            self.deltas.push(delta);

            if self.iterations % SWEEP_LOG_INTERVAL == 0 {
                log::debug!(
                    "value iteration sweep {:8} delta {delta:.5}",
                    self.iterations
                );
            }

            if delta < self.config.epsilon {
                break;
            }
            if let Some(limit) = self.config.max_sweeps
                && self.iterations >= limit
            {
                return Err(SolverError::SweepLimit {
                    sweeps: self.iterations,
                    delta,
                });
            }
        }

        log::debug!(
            "value iteration converged after {} sweeps (discount {}, epsilon {})",
            self.iterations,
            self.config.discount,
            self.config.epsilon
        );
        self.phase = SolverPhase::Converged;
        Ok(&self.values)
    }

    /// One synchronous Bellman sweep; returns the sup-norm change.
    fn sweep(&mut self) -> f64 {
        let mut next = self.values.values.clone();
        let mut delta: f64 = 0.0;

        for pos in self.grid.positions() {
            if !self.grid.is_passable(pos) || self.grid.is_goal(pos) {
                continue;
            }
            let Some(idx) = self.grid.index(pos) else {
                continue;
            };
            let best = self
                .grid
                .actions()
                .into_iter()
                .map(|action| self.expected_return(pos, action))
                .fold(f64::NEG_INFINITY, f64::max);
            delta = delta.max((best - self.values.values[idx]).abs());
            next[idx] = best;
        }

        self.values.values = next;
        delta
    }

    /// Expected immediate reward plus discounted continuation of `action` at
    /// `pos` under the current value function.
    #[must_use]
    pub fn expected_return(&self, pos: Position, action: Action) -> f64 {
        let here = self.values.get(pos).unwrap_or(0.0);
        self.grid
            .outcomes(action, pos)
            .iter()
            .map(|outcome| {
                let next = outcome.position;
                let (reward, continuation) = if self.grid.is_goal(next) {
                    (self.grid.reward(next), 0.0)
                } else if let Some(value) = self.values.get(next) {
                    (self.grid.reward(next), value)
                } else {
                    (BUMP_REWARD, here)
                };
                outcome.probability * (f64::from(reward) + self.config.discount * continuation)
            })
            .sum()
    }

    /// Greedy policy over the converged value function.
    ///
    /// Ties keep the first action in [`Action::ALL`].
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::NotConverged`] before [`ValueIteration::solve`]
    /// has succeeded.
    pub fn extract_policy(&self) -> Result<Policy, SolverError> {
        if self.phase != SolverPhase::Converged {
            return Err(SolverError::NotConverged);
        }

        let cells = (0..self.grid.rows())
            .map(|r| {
                (0..self.grid.cols())
                    .map(|c| {
                        let pos = Position::new(to_coord(r), to_coord(c));
                        if self.grid.is_passable(pos) {
                            PolicyCell::Act(self.greedy_action(pos))
                        } else {
                            PolicyCell::Blocked
                        }
                    })
                    .collect()
            })
            .collect();
        Ok(Policy { cells })
    }

    fn greedy_action(&self, pos: Position) -> Action {
        let mut best_action = Action::ALL[0];
        let mut best_value = f64::NEG_INFINITY;
        for action in self.grid.actions() {
            let value = self.expected_return(pos, action);
            if value > best_value {
                best_action = action;
                best_value = value;
            }
        }
        best_action
    }
}

/// Strategy that follows a fixed policy until the goal is reached.
#[derive(Debug, Clone)]
pub struct PolicyRunner {
    policy: Policy,
    iterations: u64,
    max_steps: Option<u64>,
}

impl PolicyRunner {
    /// Solve `grid` and wrap the resulting policy.
    ///
    /// The start must be connected to the goal. Slips only ever move the
    /// agent between adjacent open cells, so every cell a trial can visit
    /// then has a route to the goal as well.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PlanError::NoPath`] when the goal cannot be reached from the
    /// start, and propagates configuration and sweep-limit failures from the
    /// solver.
    pub fn solve(grid: Arc<Grid>, config: SolverConfig) -> Result<Self, StrategyError> {
        search(&grid, grid.start())?;
        let solution = ValueIteration::solved(grid, config)?;
        Ok(Self {
            policy: solution.policy,
            iterations: solution.iterations,
            max_steps: None,
        })
    }

    /// Follow a precomputed policy.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::DimensionMismatch`] if the policy does not cover
    /// `grid` exactly.
    pub fn from_policy(grid: &Grid, policy: Policy) -> Result<Self, GridError> {
        policy.ensure_matches(grid)?;
        Ok(Self {
            policy,
            iterations: 0,
            max_steps: None,
        })
    }

    #[must_use]
    pub const fn with_max_steps(mut self, max_steps: Option<u64>) -> Self {
        self.max_steps = max_steps;
        self
    }

    #[must_use]
    pub const fn policy(&self) -> &Policy {
        &self.policy
    }
}

impl Strategy for PolicyRunner {
    fn name(&self) -> &'static str {
        "value-iteration"
    }

    fn reset(&mut self, _executor: &dyn Executor) -> Result<(), StrategyError> {
        Ok(())
    }

    fn run(&mut self, executor: &mut dyn Executor) -> Result<TrialOutcome, StrategyError> {
        let mut tally = Tally::new(executor.position());
        while !executor.goal_reached() {
            if tally.limit_reached(self.max_steps) {
                return Ok(tally.finish(TrialStatus::StepLimit, 0));
            }
            let at = executor.position();
            let Some(action) = self.policy.get(at).and_then(PolicyCell::action) else {
                return Err(StrategyError::BlockedCell { at });
            };
            let step = executor.move_agent(action);
            tally.record(&step);
        }
        log::debug!("goal reached at {}", executor.position());
        Ok(tally.finish(TrialStatus::GoalReached, 0))
    }

    fn iterations(&self) -> u64 {
        self.iterations
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
const fn to_coord(value: usize) -> i32 {
    value as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Agent;
    use crate::executor::tests::{ROLL_FIRST_SLIP, ScriptedRng};
    use approx::assert_relative_eq;

    fn grid(text: &str) -> Arc<Grid> {
        Arc::new(Grid::parse(text).unwrap())
    }

    fn solved(text: &str, config: SolverConfig) -> ValueIteration {
        let mut solver = ValueIteration::new(grid(text), config).unwrap();
        solver.solve().unwrap();
        solver
    }

    #[test]
    fn config_validation_rejects_out_of_range_values() {
        assert!(SolverConfig::default().validate().is_ok());
        assert!(
            SolverConfig::default()
                .with_discount(1.0)
                .validate()
                .is_ok()
        );
        assert_eq!(
            SolverConfig::default().with_discount(0.0).validate(),
            Err(SolverConfigError::Discount { value: 0.0 })
        );
        assert_eq!(
            SolverConfig::default().with_discount(1.5).validate(),
            Err(SolverConfigError::Discount { value: 1.5 })
        );
        assert!(matches!(
            SolverConfig::default().with_discount(f64::NAN).validate(),
            Err(SolverConfigError::Discount { .. })
        ));
        assert_eq!(
            SolverConfig::default().with_epsilon(0.0).validate(),
            Err(SolverConfigError::Epsilon { value: 0.0 })
        );
        assert_eq!(
            SolverConfig::default().with_max_sweeps(Some(0)).validate(),
            Err(SolverConfigError::ZeroSweepLimit)
        );
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let cfg: SolverConfig = serde_json::from_str(r#"{"discount": 0.9}"#).unwrap();
        assert_relative_eq!(cfg.discount, 0.9);
        assert_relative_eq!(cfg.epsilon, DEFAULT_EPSILON);
        assert_eq!(cfg.max_sweeps, None);
    }

    #[test]
    fn new_solver_starts_unsolved() {
        let solver = ValueIteration::new(grid("h\nSE\n"), SolverConfig::default()).unwrap();
        assert_eq!(solver.phase(), SolverPhase::Unsolved);
        assert_eq!(solver.iterations(), 0);
        assert_eq!(solver.extract_policy(), Err(SolverError::NotConverged));
    }

    #[test]
    fn goal_value_stays_zero_and_walls_are_absent() {
        let solver = solved(
            "h\nS.#\n.D.\n#.E\n",
            SolverConfig::default().with_discount(0.95).with_epsilon(1e-6),
        );
        assert_eq!(solver.phase(), SolverPhase::Converged);
        assert_eq!(solver.values().get(Position::new(2, 2)), Some(0.0));
        assert_eq!(solver.values().get(Position::new(0, 2)), None);
        assert_eq!(solver.values().get(Position::new(2, 0)), None);
        assert_eq!(solver.values().get(Position::new(5, 5)), None);
        assert!(solver.values().get(Position::new(0, 0)).is_some());
    }

    #[test]
    fn single_step_corridor_matches_closed_form() {
        // S next to E in a 1x2 maze. Moving right: 0.7 reach goal, 0.3 bump.
        // V = 0.7 * 200 + 0.3 * (-1 + g V)  =>  V = 139.7 / (1 - 0.3 g)
        let discount = 0.9;
        let solver = solved(
            "h\nSE\n",
            SolverConfig::default()
                .with_discount(discount)
                .with_epsilon(1e-10),
        );
        let expected = 139.7 / (1.0 - 0.3 * discount);
        let value = solver.values().get(Position::new(0, 0)).unwrap();
        assert_relative_eq!(value, expected, epsilon = 1e-8);
        let policy = solver.extract_policy().unwrap();
        assert_eq!(
            policy.get(Position::new(0, 0)),
            Some(PolicyCell::Act(Action::Right))
        );
    }

    #[test]
    fn sweep_deltas_shrink_below_epsilon() {
        let config = SolverConfig::default().with_discount(0.9).with_epsilon(1e-4);
        let solver = solved("h\nS...\n.##.\n.D..\n...E\n", config);
        let deltas = solver.sweep_deltas();
        assert_eq!(deltas.len() as u64, solver.iterations());
        assert!(deltas.iter().all(|d| *d >= 0.0));
        assert!(*deltas.last().unwrap() < config.epsilon);
        for pair in deltas.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-9, "delta grew: {pair:?}");
        }
    }

    #[test]
    fn sweep_limit_is_reported() {
        let config = SolverConfig::default()
            .with_discount(0.99)
            .with_epsilon(1e-12)
            .with_max_sweeps(Some(3));
        let mut solver = ValueIteration::new(grid("h\nS....E\n"), config).unwrap();
        let err = solver.solve().unwrap_err();
        assert!(matches!(err, SolverError::SweepLimit { sweeps: 3, .. }));
        assert_eq!(solver.phase(), SolverPhase::Iterating);
    }

    #[test]
    fn policy_blocks_walls_and_avoids_hazard() {
        let solver = solved(
            "h\nS.\nDE\n",
            SolverConfig::default().with_discount(0.9).with_epsilon(1e-6),
        );
        let policy = solver.extract_policy().unwrap();
        assert_eq!(
            policy.get(Position::new(0, 0)),
            Some(PolicyCell::Act(Action::Right))
        );

        let walled = solved("h\nS#\n.E\n", SolverConfig::default());
        let policy = walled.extract_policy().unwrap();
        assert_eq!(policy.get(Position::new(0, 1)), Some(PolicyCell::Blocked));
        for row in policy.rows() {
            for cell in row {
                if let PolicyCell::Act(action) = cell {
                    assert!(Action::ALL.contains(action));
                }
            }
        }
    }

    #[test]
    fn policy_dimension_mismatch_is_rejected() {
        let maze = Grid::parse("h\nS.\n.E\n").unwrap();
        let short = Policy::from_rows(vec![vec![PolicyCell::Act(Action::Down); 2]]);
        assert!(matches!(
            PolicyRunner::from_policy(&maze, short),
            Err(GridError::DimensionMismatch { found_rows: 1, .. })
        ));
        let ragged = Policy::from_rows(vec![
            vec![PolicyCell::Act(Action::Down); 2],
            vec![PolicyCell::Act(Action::Right)],
        ]);
        assert!(PolicyRunner::from_policy(&maze, ragged).is_err());
    }

    #[test]
    fn runner_follows_policy_to_goal() {
        let maze = grid("h\nS..\n..E\n");
        let mut runner = PolicyRunner::solve(Arc::clone(&maze), SolverConfig::default()).unwrap();
        assert!(runner.iterations() > 0);
        let mut agent = Agent::new(maze, ScriptedRng::new(&[ROLL_FIRST_SLIP]));
        runner.reset(&agent).unwrap();
        let outcome = runner.run(&mut agent).unwrap();
        assert_eq!(outcome.status, TrialStatus::GoalReached);
        assert_eq!(outcome.trajectory.first(), Some(&Position::new(0, 0)));
        assert_eq!(outcome.trajectory.last(), Some(&Position::new(1, 2)));
        assert_eq!(outcome.steps as usize + 1, outcome.trajectory.len());
    }

    #[test]
    fn runner_refuses_a_start_cut_off_from_the_goal() {
        use crate::replan::PlanError;

        let maze = grid("h\nS.#E\n");
        let err = PolicyRunner::solve(Arc::clone(&maze), SolverConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            StrategyError::Plan(PlanError::NoPath { from }) if from == maze.start()
        ));
    }

    #[test]
    fn runner_honours_step_limit() {
        let maze = grid("h\nS....E\n");
        let blind = Policy::from_rows(vec![vec![PolicyCell::Act(Action::Left); 6]]);
        let mut runner = PolicyRunner::from_policy(&maze, blind)
            .unwrap()
            .with_max_steps(Some(5));
        let mut agent = Agent::new(maze, ScriptedRng::default());
        let outcome = runner.run(&mut agent).unwrap();
        assert_eq!(outcome.status, TrialStatus::StepLimit);
        assert_eq!(outcome.steps, 5);
        assert_eq!(outcome.total_reward, -5);
    }
}
