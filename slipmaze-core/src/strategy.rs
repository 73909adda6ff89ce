//! Control strategies and the outcome of a single trial.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::executor::{Executor, StepOutcome};
use crate::grid::Position;
use crate::replan::PlanError;
use crate::value_iteration::SolverError;

/// Errors that abort a trial.
#[derive(Debug, Error, PartialEq)]
pub enum StrategyError {
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error("policy has no action for {at}")]
    BlockedCell { at: Position },
}

/// Interface shared by the value-iteration policy runner and the replanner.
pub trait Strategy {
    /// Name used for logging and reports.
    fn name(&self) -> &'static str;

    /// Prepare for a new trial. The executor has already been reset.
    ///
    /// # Errors
    ///
    /// Returns an error when the strategy cannot produce a plan from the
    /// executor's current position.
    fn reset(&mut self, executor: &dyn Executor) -> Result<(), StrategyError>;

    /// Drive the executor until the trial ends.
    ///
    /// # Errors
    ///
    /// Returns an error when planning fails mid-trial or the strategy reaches
    /// a state it has no action for.
    fn run(&mut self, executor: &mut dyn Executor) -> Result<TrialOutcome, StrategyError>;

    /// Offline solver sweeps spent building this strategy.
    fn iterations(&self) -> u64 {
        0
    }
}

/// Built-in strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    ValueIteration,
    Replan,
}

impl StrategyKind {
    pub const ALL: [Self; 2] = [Self::ValueIteration, Self::Replan];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ValueIteration => "value-iteration",
            Self::Replan => "replan",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "value-iteration" | "vi" => Ok(Self::ValueIteration),
            "replan" | "ffreplan" => Ok(Self::Replan),
            other => Err(format!("unknown strategy: {other}")),
        }
    }
}

/// How a trial ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    GoalReached,
    /// The replanner ran out of waypoints away from the goal.
    PlanExhausted,
    /// The configured step limit stopped the trial.
    StepLimit,
}

impl TrialStatus {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::GoalReached => "goal_reached",
            Self::PlanExhausted => "plan_exhausted",
            Self::StepLimit => "step_limit",
        }
    }
}

impl fmt::Display for TrialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Summary of one trial from reset to termination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialOutcome {
    pub status: TrialStatus,
    pub total_reward: i64,
    pub steps: u64,
    pub bumps: u64,
    pub replans: u64,
    /// Positions occupied, starting with the position at reset.
    pub trajectory: Vec<Position>,
}

impl TrialOutcome {
    #[must_use]
    pub const fn reached_goal(&self) -> bool {
        matches!(self.status, TrialStatus::GoalReached)
    }
}

/// Running totals collected while a strategy drives the executor.
#[derive(Debug, Clone)]
pub(crate) struct Tally {
    total_reward: i64,
    steps: u64,
    bumps: u64,
    trajectory: Vec<Position>,
}

impl Tally {
    pub(crate) fn new(start: Position) -> Self {
        Self {
            total_reward: 0,
            steps: 0,
            bumps: 0,
            trajectory: vec![start],
        }
    }

    pub(crate) fn record(&mut self, step: &StepOutcome) {
        self.total_reward += i64::from(step.reward);
        self.steps += 1;
        if step.bumped {
            self.bumps += 1;
        }
        self.trajectory.push(step.to);
    }

    pub(crate) fn limit_reached(&self, max_steps: Option<u64>) -> bool {
        max_steps.is_some_and(|limit| self.steps >= limit)
    }

    pub(crate) fn finish(self, status: TrialStatus, replans: u64) -> TrialOutcome {
        TrialOutcome {
            status,
            total_reward: self.total_reward,
            steps: self.steps,
            bumps: self.bumps,
            replans,
            trajectory: self.trajectory,
        }
    }
}
