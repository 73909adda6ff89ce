//! Centralized model constants for the slippery maze.
//!
//! The transition probabilities and the reward table define the MDP both
//! strategies are evaluated against. Keeping them together means the model
//! can only change through reviewed code, never through maze files.

// Transition model ---------------------------------------------------------
/// Probability that an action lands in its intended direction.
pub const INTENDED_PROBABILITY: f64 = 0.70;
/// Probability of slipping into each of the two perpendicular directions.
pub const SLIP_PROBABILITY: f64 = 0.15;

// Rewards ------------------------------------------------------------------
/// Reward for entering the goal cell.
pub const GOAL_REWARD: i32 = 200;
/// Reward for entering a hazard cell.
pub const HAZARD_REWARD: i32 = -50;
/// Reward for an ordinary step onto a free or start cell.
pub const STEP_REWARD: i32 = -1;
/// Reward for bumping into a wall or the maze boundary.
pub const BUMP_REWARD: i32 = -1;

// Solver defaults ----------------------------------------------------------
pub const DEFAULT_DISCOUNT: f64 = 0.99999;
pub const DEFAULT_EPSILON: f64 = 0.1;
/// Sweeps between solver progress log lines.
pub(crate) const SWEEP_LOG_INTERVAL: u64 = 100;

// Seed derivation domain tags ----------------------------------------------
pub(crate) const TRANSITION_STREAM_TAG: &[u8] = b"transition";

// Maze text symbols --------------------------------------------------------
pub(crate) const SYMBOL_WALL: char = '#';
pub(crate) const SYMBOL_START: char = 'S';
pub(crate) const SYMBOL_GOAL: char = 'E';
pub(crate) const SYMBOL_HAZARD: char = 'D';
pub(crate) const SYMBOL_FREE: char = '.';
