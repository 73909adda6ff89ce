pub mod dataset;
pub mod reports;
pub mod seeds;
pub mod tester;

pub use dataset::FsMazeLoader;
pub use seeds::resolve_seed_inputs;
pub use tester::*;
