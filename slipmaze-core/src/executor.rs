//! Stochastic executor: the only code that moves the agent.
use rand::{Rng, RngCore};
use serde::Serialize;
use std::sync::Arc;

use crate::action::Action;
use crate::constants::BUMP_REWARD;
use crate::grid::{Grid, Position};
use crate::seed::{TransitionRng, transition_rng};

/// Result of one executed action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StepOutcome {
    pub action: Action,
    pub from: Position,
    /// Candidate sampled from the outcome distribution.
    pub sampled: Position,
    /// Where the agent actually stands after the step.
    pub to: Position,
    pub reward: i32,
    /// The sampled candidate was a wall or off the maze.
    pub bumped: bool,
}

impl StepOutcome {
    /// True when the sampled candidate differs from the intended direction.
    #[must_use]
    pub fn slipped(&self) -> bool {
        self.sampled != self.action.apply(self.from)
    }
}

/// Execution surface the control strategies drive.
pub trait Executor {
    fn grid(&self) -> &Grid;

    fn position(&self) -> Position;

    /// Apply one sampled outcome of `action` and return what happened.
    fn move_agent(&mut self, action: Action) -> StepOutcome;

    fn goal_reached(&self) -> bool {
        self.grid().is_goal(self.position())
    }

    fn at_start(&self) -> bool {
        self.position() == self.grid().start()
    }
}

/// Agent standing in a maze, sampling transitions from an injected source.
#[derive(Debug, Clone)]
pub struct Agent<R = TransitionRng> {
    grid: Arc<Grid>,
    position: Position,
    rng: R,
    steps: u64,
}

impl Agent<TransitionRng> {
    /// Agent at the maze start with the transition stream for `seed`.
    #[must_use]
    pub fn from_seed(grid: Arc<Grid>, seed: u64) -> Self {
        Self::new(grid, transition_rng(seed))
    }

    /// Replace the transition stream with the one derived from `seed`.
    pub fn reseed_from(&mut self, seed: u64) {
        self.rng = transition_rng(seed);
    }

    /// Random draws consumed since the stream was seeded.
    #[must_use]
    pub const fn draws(&self) -> u64 {
        self.rng.draws()
    }
}

impl<R: RngCore> Agent<R> {
    #[must_use]
    pub fn new(grid: Arc<Grid>, rng: R) -> Self {
        let position = grid.start();
        Self {
            grid,
            position,
            rng,
            steps: 0,
        }
    }

    #[must_use]
    pub fn shared_grid(&self) -> Arc<Grid> {
        Arc::clone(&self.grid)
    }

    /// Return to the start cell and clear the step counter.
    pub fn reset(&mut self) {
        self.position = self.grid.start();
        self.steps = 0;
    }

    /// Swap in a new random source.
    pub fn reseed(&mut self, rng: R) {
        self.rng = rng;
    }

    /// Actions executed since the last reset.
    #[must_use]
    pub const fn steps(&self) -> u64 {
        self.steps
    }

    fn sample(&mut self, action: Action) -> Position {
        let outcomes = self.grid.outcomes(action, self.position);
        let roll: f64 = self.rng.r#gen();
        let mut cumulative = 0.0;
        for outcome in &outcomes {
            cumulative += outcome.probability;
            if roll < cumulative {
                return outcome.position;
            }
        }
        outcomes[outcomes.len() - 1].position
    }
}

impl<R: RngCore> Executor for Agent<R> {
    fn grid(&self) -> &Grid {
        &self.grid
    }

    fn position(&self) -> Position {
        self.position
    }

    fn move_agent(&mut self, action: Action) -> StepOutcome {
        let from = self.position;
        let sampled = self.sample(action);
        self.steps = self.steps.saturating_add(1);

        if !self.grid.is_passable(sampled) {
            log::trace!("bumped into {sampled} moving {action} from {from}");
            return StepOutcome {
                action,
                from,
                sampled,
                to: from,
                reward: BUMP_REWARD,
                bumped: true,
            };
        }

        self.position = sampled;
        StepOutcome {
            action,
            from,
            sampled,
            to: sampled,
            reward: self.grid.reward(sampled),
            bumped: false,
        }
    }
}
