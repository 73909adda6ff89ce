use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::executor::{Agent, Executor};
use crate::grid::{Grid, Position};
use crate::replan::ReplanController;
use crate::strategy::{Strategy, StrategyError, StrategyKind, TrialOutcome};
use crate::value_iteration::{Policy, PolicyRunner, SolverConfig, SolverConfigError};

/// Per-run settings shared by every trial of a session.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrialConfig {
    #[serde(default)]
    pub solver: SolverConfig,
    /// Optional cap on executed actions per trial.
    #[serde(default)]
    pub max_steps: Option<u64>,
}

impl TrialConfig {
    /// Parse a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or has the wrong shape.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// # Errors
    ///
    /// Returns a [`SolverConfigError`] when the solver settings are invalid.
    pub fn validate(&self) -> Result<(), SolverConfigError> {
        self.solver.validate()
    }
}

/// Result of one seeded trial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub seed: u64,
    pub strategy: StrategyKind,
    /// Solver sweeps behind the strategy (0 for replanning).
    pub iterations: u64,
    pub outcome: TrialOutcome,
}

/// Concrete strategy held by a session.
#[derive(Debug, Clone)]
pub enum TrialStrategy {
    Policy(PolicyRunner),
    Replan(ReplanController),
}

impl TrialStrategy {
    /// Build the strategy for `kind`. Value iteration solves the maze here.
    ///
    /// # Errors
    ///
    /// Returns solver failures for [`StrategyKind::ValueIteration`], including
    /// a start with no route to the goal.
    pub fn build(
        kind: StrategyKind,
        grid: Arc<Grid>,
        config: &TrialConfig,
    ) -> Result<Self, StrategyError> {
        Ok(match kind {
            StrategyKind::ValueIteration => Self::Policy(
                PolicyRunner::solve(grid, config.solver)?.with_max_steps(config.max_steps),
            ),
            StrategyKind::Replan => {
                Self::Replan(ReplanController::new(grid).with_max_steps(config.max_steps))
            }
        })
    }

    #[must_use]
    pub const fn kind(&self) -> StrategyKind {
        match self {
            Self::Policy(_) => StrategyKind::ValueIteration,
            Self::Replan(_) => StrategyKind::Replan,
        }
    }

    fn as_strategy(&mut self) -> &mut dyn Strategy {
        match self {
            Self::Policy(runner) => runner,
            Self::Replan(controller) => controller,
        }
    }
}

/// High-level session wrapper binding a strategy to a seeded agent.
#[derive(Debug, Clone)]
pub struct TrialSession {
    agent: Agent,
    strategy: TrialStrategy,
}

impl TrialSession {
    /// Construct a session for `kind` on `grid`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the solver fails.
    pub fn new(
        grid: Arc<Grid>,
        kind: StrategyKind,
        config: &TrialConfig,
    ) -> Result<Self, StrategyError> {
        let strategy = TrialStrategy::build(kind, Arc::clone(&grid), config)?;
        Ok(Self::from_strategy(grid, strategy))
    }

    /// Bind an already-built strategy.
    #[must_use]
    pub fn from_strategy(grid: Arc<Grid>, strategy: TrialStrategy) -> Self {
        Self {
            agent: Agent::from_seed(grid, 0),
            strategy,
        }
    }

    /// Reseed, reset, and drive one trial to completion.
    ///
    /// # Errors
    ///
    /// Returns an error when the strategy cannot plan or act.
    pub fn run_trial(&mut self, seed: u64) -> Result<TrialRecord, StrategyError> {
        self.agent.reseed_from(seed);
        self.agent.reset();
        let strategy = self.strategy.as_strategy();
        strategy.reset(&self.agent)?;
        let outcome = strategy.run(&mut self.agent)?;
        log::debug!(
            "{} trial seed {seed}: {} reward {} in {} steps",
            strategy.name(),
            outcome.status,
            outcome.total_reward,
            outcome.steps
        );
        Ok(TrialRecord {
            seed,
            strategy: self.strategy.kind(),
            iterations: self.iterations(),
            outcome,
        })
    }

    /// Return the agent to the start cell.
    pub fn reset(&mut self) {
        self.agent.reset();
    }

    #[must_use]
    pub fn position(&self) -> Position {
        self.agent.position()
    }

    #[must_use]
    pub fn goal_reached(&self) -> bool {
        self.agent.goal_reached()
    }

    /// Solver sweeps behind the current strategy.
    #[must_use]
    pub fn iterations(&self) -> u64 {
        match &self.strategy {
            TrialStrategy::Policy(runner) => runner.iterations(),
            TrialStrategy::Replan(controller) => controller.iterations(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    /// Greedy policy, when the session runs value iteration.
    #[must_use]
    pub const fn policy(&self) -> Option<&Policy> {
        match &self.strategy {
            TrialStrategy::Policy(runner) => Some(runner.policy()),
            TrialStrategy::Replan(_) => None,
        }
    }

    /// Remaining planned path, when the session runs the replanner.
    #[must_use]
    pub fn path(&self) -> Option<Vec<Position>> {
        match &self.strategy {
            TrialStrategy::Policy(_) => None,
            TrialStrategy::Replan(controller) => Some(controller.path()),
        }
    }

    #[must_use]
    pub const fn agent(&self) -> &Agent {
        &self.agent
    }

    #[must_use]
    pub const fn strategy(&self) -> &TrialStrategy {
        &self.strategy
    }
}
