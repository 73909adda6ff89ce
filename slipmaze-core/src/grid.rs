//! Static maze layout, terrain queries, and the stochastic action model.
//!
//! A [`Grid`] is built once from maze text and never mutated afterwards. It is
//! the only place where terrain, rewards, and transition outcomes are defined;
//! both planning strategies and the executor go through it.
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::action::Action;
use crate::constants::{
    BUMP_REWARD, GOAL_REWARD, HAZARD_REWARD, INTENDED_PROBABILITY, SLIP_PROBABILITY, STEP_REWARD,
    SYMBOL_FREE, SYMBOL_GOAL, SYMBOL_HAZARD, SYMBOL_START, SYMBOL_WALL,
};

/// Passable neighbours of a cell; never more than four.
pub type Neighbors = SmallVec<[Position; 4]>;

/// Terrain kind of a single maze cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terrain {
    Free,
    Wall,
    Start,
    Goal,
    Hazard,
}

impl Terrain {
    /// Map a maze symbol to its terrain. Unknown symbols are free cells.
    #[must_use]
    pub const fn from_symbol(symbol: char) -> Self {
        match symbol {
            SYMBOL_WALL => Self::Wall,
            SYMBOL_START => Self::Start,
            SYMBOL_GOAL => Self::Goal,
            SYMBOL_HAZARD => Self::Hazard,
            _ => Self::Free,
        }
    }

    #[must_use]
    pub const fn symbol(self) -> char {
        match self {
            Self::Free => SYMBOL_FREE,
            Self::Wall => SYMBOL_WALL,
            Self::Start => SYMBOL_START,
            Self::Goal => SYMBOL_GOAL,
            Self::Hazard => SYMBOL_HAZARD,
        }
    }

    #[must_use]
    pub const fn is_wall(self) -> bool {
        matches!(self, Self::Wall)
    }
}

/// Zero-based `(row, col)` coordinate.
///
/// Coordinates are signed so that candidate outcomes stepping off the maze
/// edge stay representable; bounds are enforced by [`Grid::terrain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub row: i32,
    pub col: i32,
}

impl Position {
    #[must_use]
    pub const fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    /// Manhattan distance between two positions.
    #[must_use]
    pub const fn manhattan(self, other: Self) -> u32 {
        self.row.abs_diff(other.row) + self.col.abs_diff(other.col)
    }

    /// True when `other` differs by exactly one step along one axis.
    #[must_use]
    pub const fn is_adjacent(self, other: Self) -> bool {
        self.manhattan(other) == 1
    }
}

impl From<(i32, i32)> for Position {
    fn from((row, col): (i32, i32)) -> Self {
        Self::new(row, col)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// One weighted candidate destination of an action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Outcome {
    pub probability: f64,
    pub position: Position,
}

/// Configuration errors detected while building or matching a maze grid.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GridError {
    #[error("maze has no rows")]
    Empty,
    #[error("row {row} has {found} cells, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("maze has no start cell")]
    MissingStart,
    #[error("maze has no goal cell")]
    MissingGoal,
    #[error("maze has a second start cell at {at}")]
    DuplicateStart { at: Position },
    #[error("maze has a second goal cell at {at}")]
    DuplicateGoal { at: Position },
    #[error("position {at} is outside the {rows}x{cols} maze")]
    OutOfBounds { at: Position, rows: usize, cols: usize },
    #[error("grid dimensions {found_rows}x{found_cols} do not match maze {rows}x{cols}")]
    DimensionMismatch {
        rows: usize,
        cols: usize,
        found_rows: usize,
        found_cols: usize,
    },
}

/// Immutable maze layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    rows: usize,
    cols: usize,
    cells: Vec<Terrain>,
    start: Position,
    goal: Position,
}

impl Grid {
    /// Parse maze text. The first line is a header and is ignored; each
    /// following non-blank line is one row of single-character cells.
    ///
    /// # Errors
    ///
    /// Returns a [`GridError`] when the maze is empty, rows differ in length,
    /// or the start/goal cells are missing or duplicated.
    pub fn parse(text: &str) -> Result<Self, GridError> {
        let rows: Vec<Vec<Terrain>> = text
            .lines()
            .skip(1)
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| line.chars().map(Terrain::from_symbol).collect())
            .collect();
        Self::from_rows(rows)
    }

    /// Build a grid from already-decoded terrain rows.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Grid::parse`].
    pub fn from_rows(rows: Vec<Vec<Terrain>>) -> Result<Self, GridError> {
        let cols = rows.first().map(Vec::len).ok_or(GridError::Empty)?;
        if cols == 0 {
            return Err(GridError::Empty);
        }

        let mut start = None;
        let mut goal = None;
        let mut cells = Vec::with_capacity(rows.len() * cols);
        for (r, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(GridError::RaggedRow {
                    row: r,
                    expected: cols,
                    found: row.len(),
                });
            }
            for (c, &terrain) in row.iter().enumerate() {
                let at = Position::new(to_coord(r), to_coord(c));
                match terrain {
                    Terrain::Start if start.is_some() => {
                        return Err(GridError::DuplicateStart { at });
                    }
                    Terrain::Start => start = Some(at),
                    Terrain::Goal if goal.is_some() => {
                        return Err(GridError::DuplicateGoal { at });
                    }
                    Terrain::Goal => goal = Some(at),
                    _ => {}
                }
                cells.push(terrain);
            }
        }

        Ok(Self {
            rows: rows.len(),
            cols,
            cells,
            start: start.ok_or(GridError::MissingStart)?,
            goal: goal.ok_or(GridError::MissingGoal)?,
        })
    }

    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    #[must_use]
    pub const fn start(&self) -> Position {
        self.start
    }

    #[must_use]
    pub const fn goal(&self) -> Position {
        self.goal
    }

    /// The four fixed actions, in enumeration order.
    #[must_use]
    pub const fn actions(&self) -> [Action; 4] {
        Action::ALL
    }

    /// Row-major index of an in-bounds position.
    #[must_use]
    pub fn index(&self, pos: Position) -> Option<usize> {
        let row = usize::try_from(pos.row).ok()?;
        let col = usize::try_from(pos.col).ok()?;
        (row < self.rows && col < self.cols).then(|| row * self.cols + col)
    }

    /// Terrain at `pos`, or `None` when it lies off the maze.
    #[must_use]
    pub fn cell(&self, pos: Position) -> Option<Terrain> {
        self.index(pos).map(|idx| self.cells[idx])
    }

    /// Bounds-checked terrain lookup.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::OutOfBounds`] for positions off the maze.
    pub fn terrain(&self, pos: Position) -> Result<Terrain, GridError> {
        self.cell(pos).ok_or(GridError::OutOfBounds {
            at: pos,
            rows: self.rows,
            cols: self.cols,
        })
    }

    /// True for in-bounds, non-wall cells.
    #[must_use]
    pub fn is_passable(&self, pos: Position) -> bool {
        self.cell(pos).is_some_and(|terrain| !terrain.is_wall())
    }

    #[must_use]
    pub fn is_goal(&self, pos: Position) -> bool {
        pos == self.goal
    }

    /// Reward for arriving at `pos`.
    ///
    /// Off-maze positions score like a bump; callers that model bumps as
    /// "stay in place" never pass a wall here as a real destination.
    #[must_use]
    pub fn reward(&self, pos: Position) -> i32 {
        if self.is_goal(pos) {
            return GOAL_REWARD;
        }
        match self.cell(pos) {
            Some(Terrain::Hazard) => HAZARD_REWARD,
            Some(_) => STEP_REWARD,
            None => BUMP_REWARD,
        }
    }

    /// Stochastic outcome distribution of taking `action` at `pos`.
    ///
    /// No terrain filtering happens here: candidates may be walls or lie off
    /// the maze, and the probabilities always sum to one.
    #[must_use]
    pub fn outcomes(&self, action: Action, pos: Position) -> [Outcome; 3] {
        let [first_slip, second_slip] = action.perpendicular();
        [
            Outcome {
                probability: INTENDED_PROBABILITY,
                position: action.apply(pos),
            },
            Outcome {
                probability: SLIP_PROBABILITY,
                position: first_slip.apply(pos),
            },
            Outcome {
                probability: SLIP_PROBABILITY,
                position: second_slip.apply(pos),
            },
        ]
    }

    /// Passable orthogonal neighbours in search order: up, down, left, right.
    #[must_use]
    pub fn open_neighbors(&self, pos: Position) -> Neighbors {
        [Action::Up, Action::Down, Action::Left, Action::Right]
            .into_iter()
            .map(|action| action.apply(pos))
            .filter(|&next| self.is_passable(next))
            .collect()
    }

    /// Manhattan distance from `pos` to the goal.
    #[must_use]
    pub const fn manhattan_to_goal(&self, pos: Position) -> u32 {
        pos.manhattan(self.goal)
    }

    /// All in-bounds positions in row-major order.
    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        (0..self.rows).flat_map(move |r| {
            (0..self.cols).map(move |c| Position::new(to_coord(r), to_coord(c)))
        })
    }

    /// Confirm that a row-major grid of `rows` x `cols` lines up with this maze.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::DimensionMismatch`] when the shapes differ.
    pub const fn ensure_dimensions(&self, rows: usize, cols: usize) -> Result<(), GridError> {
        if rows == self.rows && cols == self.cols {
            Ok(())
        } else {
            Err(GridError::DimensionMismatch {
                rows: self.rows,
                cols: self.cols,
                found_rows: rows,
                found_cols: cols,
            })
        }
    }
}

impl FromStr for Grid {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.cells.chunks(self.cols) {
            let line: String = row.iter().map(|terrain| terrain.symbol()).collect();
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
const fn to_coord(value: usize) -> i32 {
    value as i32
}
