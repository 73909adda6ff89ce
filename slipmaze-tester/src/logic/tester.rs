use colored::Colorize;
use serde::{Deserialize, Serialize};
use slipmaze_core::{MazeLoader, PlannerEngine, StrategyKind, TrialConfig, TrialRecord};
use std::time::{Duration, Instant};

/// One seeded trial, flattened for the report writers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialRow {
    pub maze: String,
    pub strategy: StrategyKind,
    pub seed: u64,
    /// Termination status label, absent when the trial failed.
    pub status: Option<String>,
    pub total_reward: i64,
    pub steps: u64,
    pub bumps: u64,
    pub replans: u64,
    pub iterations: u64,
    pub error: Option<String>,
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

impl TrialRow {
    fn from_record(maze: &str, record: &TrialRecord, duration: Duration) -> Self {
        Self {
            maze: maze.to_string(),
            strategy: record.strategy,
            seed: record.seed,
            status: Some(record.outcome.status.label().to_string()),
            total_reward: record.outcome.total_reward,
            steps: record.outcome.steps,
            bumps: record.outcome.bumps,
            replans: record.outcome.replans,
            iterations: record.iterations,
            error: None,
            duration,
        }
    }

    fn failed(maze: &str, strategy: StrategyKind, seed: u64, error: String) -> Self {
        Self {
            maze: maze.to_string(),
            strategy,
            seed,
            status: None,
            total_reward: 0,
            steps: 0,
            bumps: 0,
            replans: 0,
            iterations: 0,
            error: Some(error),
            duration: Duration::ZERO,
        }
    }

    #[must_use]
    pub const fn failed_trial(&self) -> bool {
        self.error.is_some()
    }

    #[must_use]
    pub fn status_label(&self) -> &str {
        self.status.as_deref().unwrap_or("error")
    }
}

/// Runs every requested strategy over every seed of a maze.
pub struct PlannerTester<L: MazeLoader> {
    engine: PlannerEngine<L>,
    config: TrialConfig,
    verbose: bool,
}

impl<L: MazeLoader> PlannerTester<L> {
    pub const fn new(engine: PlannerEngine<L>, config: TrialConfig, verbose: bool) -> Self {
        Self {
            engine,
            config,
            verbose,
        }
    }

    pub fn run_mazes(
        &self,
        mazes: &[String],
        strategies: &[StrategyKind],
        seeds: &[u64],
    ) -> Vec<TrialRow> {
        let mut rows = Vec::with_capacity(mazes.len() * strategies.len() * seeds.len());
        for maze in mazes {
            for &kind in strategies {
                rows.extend(self.run_maze(maze, kind, seeds));
            }
        }
        rows
    }

    pub fn run_maze(&self, maze: &str, kind: StrategyKind, seeds: &[u64]) -> Vec<TrialRow> {
        log::info!("running {kind} on {maze} over {} seeds", seeds.len());
        let build_start = Instant::now();
        let mut session = match self.engine.create_session(maze, kind, &self.config) {
            Ok(session) => session,
            Err(err) => {
                let message = error_chain(&err);
                eprintln!("❌ {} [{}]: {}", maze.red(), kind, message);
                return seeds
                    .iter()
                    .map(|&seed| TrialRow::failed(maze, kind, seed, message.clone()))
                    .collect();
            }
        };
        if self.verbose {
            println!(
                "🧭 {} [{}] ready in {:?} ({} solver sweeps)",
                maze.bright_white(),
                kind,
                build_start.elapsed(),
                session.iterations()
            );
        }

        let mut rows = Vec::with_capacity(seeds.len());
        for &seed in seeds {
            let start_time = Instant::now();
            let row = match session.run_trial(seed) {
                Ok(record) => TrialRow::from_record(maze, &record, start_time.elapsed()),
                Err(err) => TrialRow::failed(maze, kind, seed, error_chain(&err)),
            };
            if self.verbose {
                let status = if row.failed_trial() { "❌" } else { "✅" };
                println!(
                    "  {status} seed {:>4} {:<15} reward {:>6} steps {:>5} replans {:>4}",
                    row.seed,
                    row.status_label(),
                    row.total_reward,
                    row.steps,
                    row.replans
                );
            }
            rows.push(row);
        }
        rows
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_micros().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let micros = u128::deserialize(deserializer)?;
        Ok(Duration::from_micros(u64::try_from(micros).unwrap_or(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::io;

    struct StaticLoader(BTreeMap<&'static str, &'static str>);

    impl MazeLoader for StaticLoader {
        type Error = io::Error;

        fn list_mazes(&self) -> Result<Vec<String>, Self::Error> {
            Ok(self.0.keys().map(ToString::to_string).collect())
        }

        fn load_maze_text(&self, name: &str) -> Result<String, Self::Error> {
            self.0
                .get(name)
                .map(ToString::to_string)
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, name.to_string()))
        }
    }

    fn tester() -> PlannerTester<StaticLoader> {
        let loader = StaticLoader(BTreeMap::from([
            ("maze-1", "m\nS..\n.#.\n..E\n"),
            ("maze-2", "m\nS.#E\n"),
        ]));
        PlannerTester::new(PlannerEngine::new(loader), TrialConfig::default(), false)
    }

    #[test]
    fn runs_every_strategy_and_seed() {
        let rows = tester().run_mazes(&["maze-1".to_string()], &StrategyKind::ALL, &[0, 1, 2]);
        assert_eq!(rows.len(), 6);
        assert!(rows.iter().all(|r| !r.failed_trial()));
        assert!(rows.iter().all(|r| r.status_label() == "goal_reached"));
        let vi = rows
            .iter()
            .find(|r| r.strategy == StrategyKind::ValueIteration)
            .unwrap();
        assert!(vi.iterations > 0);
    }

    #[test]
    fn unreachable_goal_marks_each_seed_failed() {
        for kind in StrategyKind::ALL {
            let rows = tester().run_maze("maze-2", kind, &[4, 5]);
            assert_eq!(rows.len(), 2);
            assert!(rows.iter().all(TrialRow::failed_trial));
            assert!(rows[0].error.as_deref().unwrap().contains("no path"));
        }
    }

    #[test]
    fn missing_maze_fails_before_trials() {
        let rows = tester().run_maze("maze-404", StrategyKind::ValueIteration, &[1]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status_label(), "error");
        assert!(rows[0].error.as_deref().unwrap().contains("maze-404"));
    }

    #[test]
    fn trial_row_serializes_duration_as_micros() {
        let mut row = TrialRow::failed("maze-1", StrategyKind::Replan, 3, "boom".to_string());
        row.duration = Duration::from_micros(1500);
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["duration"], 1500);
        assert_eq!(json["strategy"], "replan");
        let back: TrialRow = serde_json::from_value(json).unwrap();
        assert_eq!(back, row);
    }
}
