use anyhow::Result;
use colored::Colorize;
use std::io::Write;
use std::time::Duration;

use super::TrialRow;
use crate::common::report_timestamp;

const CSV_HEADER: &str =
    "maze,strategy,seed,status,total_reward,steps,bumps,replans,iterations,duration_us,error";

pub fn generate_console_report(
    writer: &mut dyn Write,
    rows: &[TrialRow],
    total_duration: Duration,
) -> Result<()> {
    writeln!(writer)?;
    writeln!(writer, "{}", "📊 Trial Results".bright_cyan().bold())?;
    writeln!(writer, "{}", "================".cyan())?;
    writeln!(writer, "Generated: {}", report_timestamp())?;
    writeln!(writer, "Trials: {}", rows.len())?;
    writeln!(writer, "Total time: {total_duration:?}")?;

    let mut current: Option<(&str, String)> = None;
    for row in rows {
        let key = (row.maze.as_str(), row.strategy.to_string());
        if current.as_ref() != Some(&key) {
            writeln!(writer)?;
            writeln!(writer, "{} [{}]", row.maze.bold(), key.1)?;
            current = Some(key);
        }

        if let Some(error) = &row.error {
            writeln!(
                writer,
                "  {} seed {:>4}: {}",
                "❌".red(),
                row.seed,
                error.red()
            )?;
            continue;
        }
        let status = if row.status_label() == "goal_reached" {
            row.status_label().green()
        } else {
            row.status_label().yellow()
        };
        writeln!(
            writer,
            "  seed {:>4} {:<15} reward {:>6} steps {:>5} bumps {:>4} replans {:>4} sweeps {:>6}",
            row.seed,
            status,
            row.total_reward,
            row.steps,
            row.bumps,
            row.replans,
            row.iterations
        )?;
    }
    Ok(())
}

pub fn generate_json_report(writer: &mut dyn Write, rows: &[TrialRow]) -> Result<()> {
    let json_output = serde_json::to_string_pretty(rows)?;
    writeln!(writer, "{json_output}")?;
    Ok(())
}

pub fn generate_markdown_report(writer: &mut dyn Write, rows: &[TrialRow]) -> Result<()> {
    writeln!(writer, "# Slipmaze Trial Results\n")?;
    writeln!(writer, "_Generated {}_\n", report_timestamp())?;
    writeln!(
        writer,
        "| Maze | Strategy | Seed | Status | Reward | Steps | Bumps | Replans | Sweeps |"
    )?;
    writeln!(writer, "|---|---|---:|---|---:|---:|---:|---:|---:|")?;

    for row in rows {
        writeln!(
            writer,
            "| {} | {} | {} | {} | {} | {} | {} | {} | {} |",
            row.maze,
            row.strategy,
            row.seed,
            row.status_label(),
            row.total_reward,
            row.steps,
            row.bumps,
            row.replans,
            row.iterations
        )?;
    }

    let failures: Vec<&TrialRow> = rows.iter().filter(|r| r.failed_trial()).collect();
    if !failures.is_empty() {
        writeln!(writer, "\n## Failures\n")?;
        for row in failures {
            writeln!(
                writer,
                "- {} [{}] seed {}: {}",
                row.maze,
                row.strategy,
                row.seed,
                row.error.as_deref().unwrap_or_default()
            )?;
        }
    }
    Ok(())
}

pub fn generate_csv_report(writer: &mut dyn Write, rows: &[TrialRow]) -> Result<()> {
    writeln!(writer, "{CSV_HEADER}")?;
    for row in rows {
        writeln!(
            writer,
            "{},{},{},{},{},{},{},{},{},{},{}",
            csv_field(&row.maze),
            row.strategy,
            row.seed,
            row.status.as_deref().unwrap_or_default(),
            row.total_reward,
            row.steps,
            row.bumps,
            row.replans,
            row.iterations,
            row.duration.as_micros(),
            csv_field(row.error.as_deref().unwrap_or_default())
        )?;
    }
    Ok(())
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slipmaze_core::StrategyKind;

    fn row(seed: u64, status: Option<&str>, error: Option<&str>) -> TrialRow {
        TrialRow {
            maze: "maze-1.txt".to_string(),
            strategy: StrategyKind::Replan,
            seed,
            status: status.map(ToString::to_string),
            total_reward: 190,
            steps: 8,
            bumps: 1,
            replans: 2,
            iterations: 0,
            error: error.map(ToString::to_string),
            duration: Duration::from_micros(42),
        }
    }

    fn render(f: impl FnOnce(&mut Vec<u8>) -> Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn csv_report_has_one_line_per_trial() {
        let rows = [
            row(0, Some("goal_reached"), None),
            row(1, None, Some("no path, really")),
        ];
        let out = render(|w| generate_csv_report(w, &rows));
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], "maze-1.txt,replan,0,goal_reached,190,8,1,2,0,42,");
        assert!(lines[2].ends_with(",\"no path, really\""));
    }

    #[test]
    fn markdown_report_lists_rows_and_failures() {
        let rows = [row(3, Some("step_limit"), None), row(4, None, Some("boom"))];
        let out = render(|w| generate_markdown_report(w, &rows));
        assert!(out.starts_with("# Slipmaze Trial Results"));
        assert!(out.contains("| maze-1.txt | replan | 3 | step_limit |"));
        assert!(out.contains("## Failures"));
        assert!(out.contains("seed 4: boom"));
    }

    #[test]
    fn json_report_round_trips_rows() {
        let rows = vec![row(7, Some("goal_reached"), None)];
        let out = render(|w| generate_json_report(w, &rows));
        let parsed: Vec<TrialRow> = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed, rows);
    }

    #[test]
    fn console_report_groups_by_maze_and_strategy() {
        colored::control::set_override(false);
        let rows = [row(0, Some("goal_reached"), None), row(1, None, Some("boom"))];
        let out = render(|w| generate_console_report(w, &rows, Duration::from_millis(5)));
        assert!(out.contains("Trial Results"));
        assert!(out.contains("maze-1.txt [replan]"));
        assert_eq!(out.matches("maze-1.txt [replan]").count(), 1);
        assert!(out.contains("seed    1: boom"));
    }
}
