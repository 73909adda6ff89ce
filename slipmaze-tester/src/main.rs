mod common;
mod logic;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use std::fs::{self, File};
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;
use std::time::Instant;

use common::split_csv;
use logic::{FsMazeLoader, PlannerTester, TrialRow, resolve_seed_inputs};
use slipmaze_core::{MazeLoader, PlannerEngine, StrategyKind, TrialConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyChoice {
    /// Offline value iteration, then follow the greedy policy
    ValueIteration,
    /// Determinized A* with replanning on divergence
    Replan,
    /// Run both strategies on every maze
    Both,
}

impl StrategyChoice {
    fn kinds(self) -> Vec<StrategyKind> {
        match self {
            Self::ValueIteration => vec![StrategyKind::ValueIteration],
            Self::Replan => vec![StrategyKind::Replan],
            Self::Both => StrategyKind::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "slipmaze-tester", version = "0.1.0")]
#[command(about = "Seeded trial harness for slippery maze planners")]
struct Args {
    /// Directory holding maze files (names containing "maze")
    #[arg(long, default_value = "mazes")]
    dataset: PathBuf,

    /// Maze files to run (comma-separated); defaults to the whole dataset
    #[arg(long)]
    mazes: Option<String>,

    /// List the mazes in the dataset and exit
    #[arg(long)]
    list_mazes: bool,

    /// Strategy to evaluate
    #[arg(long, value_enum, default_value_t = StrategyChoice::Both)]
    strategy: StrategyChoice,

    /// Seeds to run (comma-separated integers or start..end ranges)
    #[arg(long, default_value = "0..200")]
    seeds: String,

    /// Value iteration discount factor
    #[arg(long)]
    discount: Option<f64>,

    /// Value iteration convergence threshold
    #[arg(long)]
    epsilon: Option<f64>,

    /// Abort value iteration after this many sweeps
    #[arg(long)]
    max_sweeps: Option<u64>,

    /// Stop each trial after this many actions
    #[arg(long)]
    max_steps: Option<u64>,

    /// JSON trial configuration; flags above override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output report format
    #[arg(long, default_value = "console")]
    #[arg(value_parser = ["json", "markdown", "console", "csv"])]
    report: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let engine = PlannerEngine::new(FsMazeLoader::new(&args.dataset));

    if maybe_list_mazes(&args, &engine)? {
        return Ok(());
    }

    announce_banner();

    let start_time = Instant::now();
    let config = build_trial_config(&args)?;
    let mazes = select_mazes(&args, &engine)?;
    let seeds = resolve_seed_inputs(&split_csv(&args.seeds))?;
    log::info!(
        "evaluating {} mazes with {} seeds each",
        mazes.len(),
        seeds.len()
    );

    let tester = PlannerTester::new(engine, config, args.verbose);
    let rows = tester.run_mazes(&mazes, &args.strategy.kinds(), &seeds);

    write_reports(&args, &rows, start_time)?;

    if rows.iter().any(TrialRow::failed_trial) {
        std::process::exit(1);
    }

    Ok(())
}

fn maybe_list_mazes(args: &Args, engine: &PlannerEngine<FsMazeLoader>) -> Result<bool> {
    if !args.list_mazes {
        return Ok(false);
    }
    let mazes = engine
        .mazes()
        .with_context(|| format!("failed to list mazes in {}", args.dataset.display()))?;
    let mut output_target = OutputTarget::new(args.output.clone())?;
    writeln!(
        output_target.writer(),
        "Available mazes in {}:",
        args.dataset.display()
    )?;
    for name in mazes {
        writeln!(output_target.writer(), "  {name}")?;
    }
    output_target.flush_inner()?;
    Ok(true)
}

fn announce_banner() {
    println!("{}", "🧊 Slipmaze Trial Harness".bright_cyan().bold());
    println!("{}", "=========================".cyan());
}

fn build_trial_config(args: &Args) -> Result<TrialConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            TrialConfig::from_json(&text)
                .with_context(|| format!("failed to parse {}", path.display()))?
        }
        None => TrialConfig::default(),
    };

    if let Some(discount) = args.discount {
        config.solver = config.solver.with_discount(discount);
    }
    if let Some(epsilon) = args.epsilon {
        config.solver = config.solver.with_epsilon(epsilon);
    }
    if args.max_sweeps.is_some() {
        config.solver = config.solver.with_max_sweeps(args.max_sweeps);
    }
    if args.max_steps.is_some() {
        config.max_steps = args.max_steps;
    }

    config
        .validate()
        .context("invalid solver configuration")?;
    Ok(config)
}

fn select_mazes<L: MazeLoader>(args: &Args, engine: &PlannerEngine<L>) -> Result<Vec<String>> {
    let mazes = match &args.mazes {
        Some(list) => split_csv(list),
        None => engine
            .mazes()
            .with_context(|| format!("failed to list mazes in {}", args.dataset.display()))?,
    };
    if mazes.is_empty() {
        bail!("no maze files found in {}", args.dataset.display());
    }
    Ok(mazes)
}

fn write_reports(args: &Args, rows: &[TrialRow], start_time: Instant) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;

    match args.report.as_str() {
        "json" => logic::reports::generate_json_report(&mut output_target, rows)?,
        "markdown" => logic::reports::generate_markdown_report(&mut output_target, rows)?,
        "csv" => logic::reports::generate_csv_report(&mut output_target, rows)?,
        _ => {
            let duration = start_time.elapsed();
            if rows.is_empty() {
                writeln!(&mut output_target, "No trials executed.")?;
            } else {
                logic::reports::generate_console_report(&mut output_target, rows, duration)?;
            }
            writeln!(&mut output_target)?;
            writeln!(&mut output_target, "🏁 Total time: {duration:?}")?;
        }
    }

    output_target.flush_inner()?;
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn temp_path(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "slipmaze-main-{label}-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ))
    }

    fn base_args() -> Args {
        Args {
            dataset: PathBuf::from("mazes"),
            mazes: None,
            list_mazes: false,
            strategy: StrategyChoice::Both,
            seeds: "0..200".to_string(),
            discount: None,
            epsilon: None,
            max_sweeps: None,
            max_steps: None,
            config: None,
            report: "json".to_string(),
            verbose: false,
            output: None,
        }
    }

    fn sample_row() -> TrialRow {
        TrialRow {
            maze: "maze-1.txt".to_string(),
            strategy: StrategyKind::ValueIteration,
            seed: 11,
            status: Some("goal_reached".to_string()),
            total_reward: 195,
            steps: 6,
            bumps: 0,
            replans: 0,
            iterations: 48,
            error: None,
            duration: Duration::from_micros(10),
        }
    }

    fn dataset_with(files: &[(&str, &str)]) -> PathBuf {
        let dir = temp_path("dataset");
        fs::create_dir_all(&dir).unwrap();
        for (name, text) in files {
            fs::write(dir.join(name), text).unwrap();
        }
        dir
    }

    #[test]
    fn strategy_choice_expands_kinds() {
        assert_eq!(StrategyChoice::Both.kinds(), StrategyKind::ALL.to_vec());
        assert_eq!(StrategyChoice::Replan.kinds(), vec![StrategyKind::Replan]);
        assert_eq!(
            StrategyChoice::ValueIteration.kinds(),
            vec![StrategyKind::ValueIteration]
        );
    }

    #[test]
    fn trial_config_defaults_without_flags() {
        let config = build_trial_config(&base_args()).unwrap();
        assert_eq!(config, TrialConfig::default());
    }

    #[test]
    fn flags_override_config_file() {
        let path = temp_path("config.json");
        fs::write(
            &path,
            r#"{"solver": {"discount": 0.9, "epsilon": 0.5}, "max_steps": 10}"#,
        )
        .unwrap();
        let args = Args {
            config: Some(path),
            epsilon: Some(0.01),
            max_sweeps: Some(500),
            ..base_args()
        };
        let config = build_trial_config(&args).unwrap();
        assert!((config.solver.discount - 0.9).abs() < f64::EPSILON);
        assert!((config.solver.epsilon - 0.01).abs() < f64::EPSILON);
        assert_eq!(config.solver.max_sweeps, Some(500));
        assert_eq!(config.max_steps, Some(10));
    }

    #[test]
    fn invalid_discount_is_rejected() {
        let args = Args {
            discount: Some(1.5),
            ..base_args()
        };
        let err = build_trial_config(&args).unwrap_err();
        assert!(format!("{err:#}").contains("discount"));
    }

    #[test]
    fn missing_config_file_is_reported() {
        let args = Args {
            config: Some(temp_path("missing.json")),
            ..base_args()
        };
        assert!(build_trial_config(&args).is_err());
    }

    #[test]
    fn select_mazes_prefers_explicit_list() {
        let args = Args {
            mazes: Some("b-maze.txt, a-maze.txt".to_string()),
            ..base_args()
        };
        let engine = PlannerEngine::new(FsMazeLoader::new("unused"));
        assert_eq!(
            select_mazes(&args, &engine).unwrap(),
            vec!["b-maze.txt", "a-maze.txt"]
        );
    }

    #[test]
    fn select_mazes_reads_dataset_in_order() {
        let dir = dataset_with(&[
            ("maze-10.txt", "m\nSE\n"),
            ("maze-2.txt", "m\nSE\n"),
            ("readme.txt", "x"),
        ]);
        let args = Args {
            dataset: dir.clone(),
            ..base_args()
        };
        let engine = PlannerEngine::new(FsMazeLoader::new(&dir));
        assert_eq!(
            select_mazes(&args, &engine).unwrap(),
            vec!["maze-2.txt", "maze-10.txt"]
        );

        let empty = dataset_with(&[("readme.txt", "x")]);
        let args = Args {
            dataset: empty.clone(),
            ..base_args()
        };
        assert!(select_mazes(&args, &PlannerEngine::new(FsMazeLoader::new(&empty))).is_err());
    }

    #[test]
    fn maybe_list_mazes_writes_output() {
        let dir = dataset_with(&[("maze-1.txt", "m\nSE\n")]);
        let output = temp_path("list.txt");
        let args = Args {
            dataset: dir.clone(),
            list_mazes: true,
            output: Some(output.clone()),
            ..base_args()
        };
        let engine = PlannerEngine::new(FsMazeLoader::new(&dir));
        assert!(maybe_list_mazes(&args, &engine).unwrap());
        let content = fs::read_to_string(output).unwrap();
        assert!(content.contains("Available mazes"));
        assert!(content.contains("maze-1.txt"));
    }

    #[test]
    fn maybe_list_mazes_returns_false_when_disabled() {
        let engine = PlannerEngine::new(FsMazeLoader::new("unused"));
        assert!(!maybe_list_mazes(&base_args(), &engine).unwrap());
    }

    #[test]
    fn write_reports_emits_json_rows() {
        let output = temp_path("report.json");
        let args = Args {
            output: Some(output.clone()),
            ..base_args()
        };
        write_reports(&args, &[sample_row()], Instant::now()).unwrap();
        let content = fs::read_to_string(output).unwrap();
        let parsed: Vec<TrialRow> = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, vec![sample_row()]);
    }

    #[test]
    fn write_reports_console_without_rows() {
        let output = temp_path("report.txt");
        let args = Args {
            report: "console".to_string(),
            output: Some(output.clone()),
            ..base_args()
        };
        write_reports(&args, &[], Instant::now()).unwrap();
        let content = fs::read_to_string(output).unwrap();
        assert!(content.contains("No trials executed"));
        assert!(content.contains("Total time"));
    }

    #[test]
    fn write_reports_emits_csv_rows() {
        let output = temp_path("report.csv");
        let args = Args {
            report: "csv".to_string(),
            output: Some(output.clone()),
            ..base_args()
        };
        write_reports(&args, &[sample_row()], Instant::now()).unwrap();
        let content = fs::read_to_string(output).unwrap();
        assert!(content.starts_with("maze,strategy,seed"));
        assert!(content.contains("maze-1.txt,value-iteration,11,goal_reached,195"));
    }

    #[test]
    fn output_target_stdout_writes() {
        let mut target = OutputTarget::new(None).unwrap();
        target.write_all(b"ok").unwrap();
        target.flush().unwrap();
    }
}
