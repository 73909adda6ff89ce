//! Determinized A* search with replanning on stochastic divergence.
//!
//! Planning ignores the slip distribution: every action is assumed to land
//! where it is aimed and walls are impassable. Execution goes through the
//! stochastic executor one waypoint at a time; as soon as the realized cell
//! differs from the planned one the rest of the plan is thrown away and a new
//! search starts from where the agent actually is.
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::Arc;
use thiserror::Error;

use crate::action::Action;
use crate::executor::Executor;
use crate::grid::{Grid, Position};
use crate::strategy::{Strategy, StrategyError, Tally, TrialOutcome, TrialStatus};

/// Search and plan-following failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("no path from {from} to the goal")]
    NoPath { from: Position },
    #[error("waypoint {to} is not adjacent to {from}")]
    NotAdjacent { from: Position, to: Position },
}

/// Frontier key. Derived ordering is lexicographic on `(f, row, col)`.
type FrontierKey = (i64, i32, i32);

/// Determinized edge cost of stepping onto `next`.
///
/// Rewards become negative costs: an ordinary step costs 1, a hazard 50, and
/// entering the goal costs -200, which pulls the search toward it.
fn step_cost(grid: &Grid, next: Position) -> i64 {
    -i64::from(grid.reward(next))
}

/// A* from `from` to the goal over the determinized maze.
///
/// Returns the waypoints after `from`, ending at the goal; the path is empty
/// when `from` already is the goal. The first time the goal is popped from
/// the frontier its path is accepted.
///
/// # Errors
///
/// Returns [`PlanError::NoPath`] when the frontier is exhausted first.
pub fn search(grid: &Grid, from: Position) -> Result<Vec<Position>, PlanError> {
    let cells = grid.rows() * grid.cols();
    let mut g_score: Vec<Option<i64>> = vec![None; cells];
    let mut came_from: Vec<Option<Position>> = vec![None; cells];
    let mut open_set: BinaryHeap<Reverse<FrontierKey>> = BinaryHeap::new();

    let start_idx = grid.index(from).ok_or(PlanError::NoPath { from })?;
    g_score[start_idx] = Some(0);
    open_set.push(Reverse((0, from.row, from.col)));

    while let Some(Reverse((_, row, col))) = open_set.pop() {
        let current = Position::new(row, col);
        if grid.is_goal(current) {
            return Ok(reconstruct(grid, &came_from, current));
        }

        let Some(current_g) = grid.index(current).and_then(|idx| g_score[idx]) else {
            continue;
        };

        for neighbor in grid.open_neighbors(current) {
            let Some(idx) = grid.index(neighbor) else {
                continue;
            };
            let tentative = current_g + step_cost(grid, neighbor);
            if g_score[idx].is_none_or(|known| tentative < known) {
                came_from[idx] = Some(current);
                g_score[idx] = Some(tentative);
                let f = tentative + i64::from(grid.manhattan_to_goal(neighbor));
                open_set.push(Reverse((f, neighbor.row, neighbor.col)));
            }
        }
    }

    Err(PlanError::NoPath { from })
}

fn reconstruct(grid: &Grid, came_from: &[Option<Position>], goal: Position) -> Vec<Position> {
    let mut path = Vec::new();
    let mut pos = goal;
    while let Some(parent) = grid.index(pos).and_then(|idx| came_from[idx]) {
        path.push(pos);
        pos = parent;
    }
    path.reverse();
    path
}

/// Action leading from `from` to the adjacent waypoint `to`.
///
/// # Errors
///
/// Returns [`PlanError::NotAdjacent`] for any other pair of positions.
pub fn direction_between(from: Position, to: Position) -> Result<Action, PlanError> {
    Action::between(from, to).ok_or(PlanError::NotAdjacent { from, to })
}

/// Controller lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlPhase {
    Plan,
    Execute,
    Replan,
    GoalReached,
    Exhausted,
}

/// Observable trace of controller decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ControlEvent {
    Planned {
        from: Position,
        first: Option<Position>,
        length: usize,
    },
    Stepped {
        intended: Position,
        realized: Position,
        action: Action,
    },
    Replanned {
        from: Position,
        first: Option<Position>,
        length: usize,
    },
    GoalReached {
        at: Position,
    },
    Exhausted {
        at: Position,
    },
}

/// Online controller: plan, step, replan whenever the step diverged.
#[derive(Debug, Clone)]
pub struct ReplanController {
    grid: Arc<Grid>,
    path: VecDeque<Position>,
    phase: ControlPhase,
    replans: u64,
    events: Vec<ControlEvent>,
    max_steps: Option<u64>,
}

impl ReplanController {
    #[must_use]
    pub fn new(grid: Arc<Grid>) -> Self {
        Self {
            grid,
            path: VecDeque::new(),
            phase: ControlPhase::Plan,
            replans: 0,
            events: Vec::new(),
            max_steps: None,
        }
    }

    #[must_use]
    pub const fn with_max_steps(mut self, max_steps: Option<u64>) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Compute the initial plan from the executor's position.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::NoPath`] when the goal is unreachable.
    pub fn plan(&mut self, executor: &dyn Executor) -> Result<(), PlanError> {
        let from = executor.position();
        self.phase = ControlPhase::Plan;
        self.path = search(&self.grid, from)?.into();
        self.events.push(ControlEvent::Planned {
            from,
            first: self.path.front().copied(),
            length: self.path.len(),
        });
        self.phase = ControlPhase::Execute;
        Ok(())
    }

    fn replan(&mut self, from: Position) -> Result<(), PlanError> {
        self.phase = ControlPhase::Replan;
        self.replans += 1;
        log::debug!("replanning from {from}");
        self.path = search(&self.grid, from)?.into();
        self.events.push(ControlEvent::Replanned {
            from,
            first: self.path.front().copied(),
            length: self.path.len(),
        });
        self.phase = ControlPhase::Execute;
        Ok(())
    }

    /// Remaining waypoints of the current plan.
    #[must_use]
    pub fn path(&self) -> Vec<Position> {
        self.path.iter().copied().collect()
    }

    #[must_use]
    pub const fn phase(&self) -> ControlPhase {
        self.phase
    }

    /// Replans triggered since the last reset.
    #[must_use]
    pub const fn replans(&self) -> u64 {
        self.replans
    }

    #[must_use]
    pub fn events(&self) -> &[ControlEvent] {
        &self.events
    }
}

impl Strategy for ReplanController {
    fn name(&self) -> &'static str {
        "replan"
    }

    fn reset(&mut self, executor: &dyn Executor) -> Result<(), StrategyError> {
        if !executor.at_start() {
            log::warn!(
                "replanner reset while the agent is at {} instead of the start",
                executor.position()
            );
        }
        self.replans = 0;
        self.events.clear();
        self.plan(executor)?;
        Ok(())
    }

    fn run(&mut self, executor: &mut dyn Executor) -> Result<TrialOutcome, StrategyError> {
        if self.phase != ControlPhase::Execute {
            self.plan(executor)?;
        }
        let mut tally = Tally::new(executor.position());

        if executor.goal_reached() {
            self.phase = ControlPhase::GoalReached;
            self.events.push(ControlEvent::GoalReached {
                at: executor.position(),
            });
            return Ok(tally.finish(TrialStatus::GoalReached, self.replans));
        }

        while let Some(waypoint) = self.path.pop_front() {
            if tally.limit_reached(self.max_steps) {
                return Ok(tally.finish(TrialStatus::StepLimit, self.replans));
            }
            let from = executor.position();
            let action = direction_between(from, waypoint)?;
            let step = executor.move_agent(action);
            tally.record(&step);
            self.events.push(ControlEvent::Stepped {
                intended: waypoint,
                realized: step.to,
                action,
            });

            if executor.goal_reached() {
                log::debug!("goal reached at {}", step.to);
                self.phase = ControlPhase::GoalReached;
                self.path.clear();
                self.events.push(ControlEvent::GoalReached { at: step.to });
                return Ok(tally.finish(TrialStatus::GoalReached, self.replans));
            }
            if step.to != waypoint {
                self.replan(step.to)?;
            }
        }

        let at = executor.position();
        log::debug!("plan exhausted at {at} without reaching the goal");
        self.phase = ControlPhase::Exhausted;
        self.events.push(ControlEvent::Exhausted { at });
        Ok(tally.finish(TrialStatus::PlanExhausted, self.replans))
    }
}
