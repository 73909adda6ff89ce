//! Slipmaze Planning Engine
//!
//! Platform-agnostic planning and control for stochastic ("slippery") grid
//! mazes. Two strategies are provided: an offline value-iteration planner
//! over the maze MDP and an online controller that runs determinized A* and
//! replans whenever execution drifts off the plan.
//! This crate holds no file-system or presentation code.

pub mod action;
pub mod constants;
pub mod executor;
pub mod grid;
pub mod replan;
pub mod seed;
pub mod session;
pub mod strategy;
pub mod value_iteration;

use std::sync::Arc;
use thiserror::Error;

// Re-export commonly used types
pub use action::Action;
pub use executor::{Agent, Executor, StepOutcome};
pub use grid::{Grid, GridError, Outcome, Position, Terrain};
pub use replan::{ControlEvent, ControlPhase, PlanError, ReplanController, direction_between, search};
pub use seed::{CountingRng, TransitionRng, derive_stream_seed, transition_rng};
pub use session::{TrialConfig, TrialRecord, TrialSession, TrialStrategy};
pub use strategy::{Strategy, StrategyError, StrategyKind, TrialOutcome, TrialStatus};
pub use value_iteration::{
    Policy, PolicyCell, PolicyRunner, Solution, SolverConfig, SolverConfigError, SolverError,
    SolverPhase, ValueFunction, ValueIteration,
};

/// Trait for abstracting maze loading operations
/// Platform-specific implementations should provide this
pub trait MazeLoader {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Names of the mazes this loader can provide, in evaluation order.
    ///
    /// # Errors
    ///
    /// Returns an error if the maze collection cannot be enumerated.
    fn list_mazes(&self) -> Result<Vec<String>, Self::Error>;

    /// Load the raw text of a maze by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the maze cannot be read.
    fn load_maze_text(&self, name: &str) -> Result<String, Self::Error>;
}

/// Failures while turning a named maze into a runnable session.
#[derive(Debug, Error)]
pub enum EngineError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[error("failed to load maze {name}")]
    Load {
        name: String,
        #[source]
        source: E,
    },
    #[error("maze {name} is invalid")]
    Grid {
        name: String,
        #[source]
        source: GridError,
    },
    #[error(transparent)]
    Config(#[from] SolverConfigError),
    #[error(transparent)]
    Strategy(#[from] StrategyError),
}

/// Main engine for building trial sessions from a maze source
pub struct PlannerEngine<L>
where
    L: MazeLoader,
{
    loader: L,
}

impl<L> PlannerEngine<L>
where
    L: MazeLoader,
{
    /// Create a new engine with the provided maze loader
    pub const fn new(loader: L) -> Self {
        Self { loader }
    }

    #[must_use]
    pub const fn loader(&self) -> &L {
        &self.loader
    }

    /// List the mazes available from the loader.
    ///
    /// # Errors
    ///
    /// Returns an error if the loader cannot enumerate its mazes.
    pub fn mazes(&self) -> Result<Vec<String>, L::Error> {
        self.loader.list_mazes()
    }

    /// Load and parse a maze.
    ///
    /// # Errors
    ///
    /// Returns an error if the maze cannot be read or is malformed.
    pub fn load_grid(&self, name: &str) -> Result<Arc<Grid>, EngineError<L::Error>> {
        let text = self
            .loader
            .load_maze_text(name)
            .map_err(|source| EngineError::Load {
                name: name.to_string(),
                source,
            })?;
        let grid = Grid::parse(&text).map_err(|source| EngineError::Grid {
            name: name.to_string(),
            source,
        })?;
        Ok(Arc::new(grid))
    }

    /// Construct a trial session for a named maze.
    ///
    /// # Errors
    ///
    /// Returns an error if the maze cannot be loaded, the configuration is
    /// invalid, or the strategy cannot be built.
    pub fn create_session(
        &self,
        name: &str,
        kind: StrategyKind,
        config: &TrialConfig,
    ) -> Result<TrialSession, EngineError<L::Error>> {
        config.validate()?;
        let grid = self.load_grid(name)?;
        Ok(TrialSession::new(grid, kind, config)?)
    }
}
