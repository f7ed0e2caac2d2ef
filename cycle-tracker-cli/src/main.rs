//src/main.rs
mod cli;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, Utc};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use std::io::{self, stdout};
use std::thread;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use cycle_tracker_lib::{Completion, Error, ExerciseSet, HistoryEntry, Target, TrackerService};

fn main() -> Result<()> {
    let cli_args = cli::parse_args();
    let export_csv = cli_args.export_csv;

    if let cli::Commands::GenerateCompletion { shell } = cli_args.command {
        let mut cmd = cli::build_cli_command();
        let bin_name = cmd.get_name().to_string();

        eprintln!("Generating completion script for {shell}...");
        clap_complete::generate(shell, &mut cmd, bin_name, &mut stdout());
        return Ok(());
    }

    init_logging(cli_args.verbose);

    let mut service =
        TrackerService::initialize().context("Failed to initialize tracker service")?;
    let header_color = cycle_tracker_lib::parse_color(&service.config.theme.header_color)
        .map(Color::from)
        .unwrap_or(Color::Green);

    match cli_args.command {
        cli::Commands::GenerateCompletion { .. } => {
            unreachable!("Completion generation should have exited already");
        }
        cli::Commands::ImportPlan { file } => {
            let user = service.resolve_user(cli_args.user.as_deref())?;
            let workout = service.import_plan(&file, &user)?;
            println!(
                "Imported workout '{}' ({} days, {} sets) and assigned it to '{}'.",
                workout.workout_id,
                workout.weekly_plan.len(),
                workout.sets.len(),
                user
            );
        }
        cli::Commands::Assign { workout_id } => {
            let user = service.resolve_user(cli_args.user.as_deref())?;
            service.assign_plan(&user, &workout_id)?;
            println!("Assigned workout '{workout_id}' to '{user}'.");
        }
        cli::Commands::Status => {
            let user = service.resolve_user(cli_args.user.as_deref())?;
            let entry = service.get_latest(&user).map_err(explain)?;
            if export_csv {
                print_sets_csv(&entry)?;
            } else {
                print_entry(&entry, header_color);
            }
        }
        cli::Commands::Progress {
            set_id,
            reps,
            duration,
        } => {
            let user = service.resolve_user(cli_args.user.as_deref())?;
            let entry = service
                .update_progress(&user, &set_id, reps, duration)
                .map_err(explain)?;
            if let Some(set) = entry.set(&set_id) {
                println!(
                    "Recorded {} of {} for '{}'.",
                    set.completed_value(),
                    format_target(&set.target),
                    set_id
                );
            }
        }
        cli::Commands::Complete {
            set_ids,
            parallel,
            entry,
        } => {
            let user = service.resolve_user(cli_args.user.as_deref())?;
            // Pin every set to one day so a repeated id cannot spill into the next
            let history_id = match entry {
                Some(id) => id,
                None => service.get_latest(&user).map_err(explain)?.history_id,
            };
            let results = if parallel {
                complete_parallel(&service, &user, &set_ids, history_id)
            } else {
                set_ids
                    .iter()
                    .map(|set_id| service.complete_set_in(&user, set_id, history_id))
                    .collect()
            };
            let failures = report_results(&set_ids, results, header_color);
            if failures > 0 {
                bail!("{failures} of {} completions failed", set_ids.len());
            }
        }
        cli::Commands::History => {
            let user = service.resolve_user(cli_args.user.as_deref())?;
            let entries = service.history(&user).map_err(explain)?;
            if entries.is_empty() {
                println!("No history yet for '{user}'.");
            } else if export_csv {
                print_history_csv(&entries)?;
            } else {
                print_history_table(&entries, header_color);
                println!(
                    "Completed weeks: {}",
                    cycle_tracker_lib::engine::count_wraps(&entries)
                );
            }
        }
        cli::Commands::SetDefaultUser { user_id } => {
            service
                .set_default_user(&user_id)
                .context("Failed to save config")?;
            println!("Default user set to '{user_id}'.");
        }
        cli::Commands::DbPath => {
            println!("Database file is located at: {:?}", service.get_db_path());
        }
        cli::Commands::ConfigPath => {
            println!("Config file is located at: {:?}", service.get_config_path());
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Adds a hint for the errors a user can fix themselves.
fn explain(e: Error) -> anyhow::Error {
    match e {
        Error::NoWorkoutAssigned(user) => anyhow::anyhow!(
            "User '{user}' has no workout yet. Run `ct import-plan <file> --user {user}` first."
        ),
        Error::Conflict { attempts } => anyhow::anyhow!(
            "The entry kept changing underneath us ({attempts} attempts). Please try again."
        ),
        other => other.into(),
    }
}

fn complete_parallel(
    service: &TrackerService,
    user: &str,
    set_ids: &[String],
    history_id: i64,
) -> Vec<Result<Completion, Error>> {
    debug!(user, count = set_ids.len(), history_id, "completing sets in parallel");
    thread::scope(|scope| {
        let handles: Vec<_> = set_ids
            .iter()
            .map(|set_id| scope.spawn(move || service.complete_set_in(user, set_id, history_id)))
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(Error::InvalidState("worker thread panicked".into())))
            })
            .collect()
    })
}

/// Prints every outcome and returns how many completions failed.
fn report_results(
    set_ids: &[String],
    results: Vec<Result<Completion, Error>>,
    header_color: Color,
) -> usize {
    let mut failures = 0;
    for (set_id, result) in set_ids.iter().zip(results) {
        match result {
            Ok(completion) => report_completion(set_id, &completion, header_color),
            Err(e) => {
                failures += 1;
                eprintln!("Could not complete '{set_id}': {:#}", explain(e));
            }
        }
    }
    failures
}

fn report_completion(set_id: &str, completion: &Completion, header_color: Color) {
    let progress = completion.entry.progress();
    println!(
        "Completed '{set_id}' ({}/{} sets done).",
        progress.completed_sets, progress.total_sets
    );
    if completion.advanced {
        if let Some(next) = &completion.next_entry {
            println!(
                "{} is done. Up next: {} (day {}).",
                completion.entry.day_name,
                next.day_name,
                next.current_day_index + 1
            );
            print_entry(next, header_color);
        }
    }
}

fn format_target(target: &Target) -> String {
    match target {
        Target::Reps(reps) => format!("{reps} reps"),
        Target::Duration(secs) => format!("{secs} s"),
    }
}

fn format_time(ts: Option<DateTime<Utc>>) -> String {
    ts.map_or("-".to_string(), |t| {
        t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
    })
}

fn set_label(set: &ExerciseSet) -> String {
    set.set_name
        .clone()
        .or_else(|| set.exercise_name.clone())
        .unwrap_or_else(|| set.exercise_id.clone())
}

/// Prints the sets of one day sheet with a progress summary.
fn print_entry(entry: &HistoryEntry, header_color: Color) {
    let progress = entry.progress();
    println!(
        "{} (day {}) - {}/{} sets, {:.0}%",
        entry.day_name,
        entry.current_day_index + 1,
        progress.completed_sets,
        progress.total_sets,
        progress.completion_percentage
    );

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Set").fg(header_color),
            Cell::new("Exercise").fg(header_color),
            Cell::new("Target").fg(header_color),
            Cell::new("Weight").fg(header_color),
            Cell::new("Done").fg(header_color),
            Cell::new("Completed At").fg(header_color),
        ]);

    for set in &entry.sets {
        let done = Cell::new(set.completed_value().to_string());
        let done = if set.is_complete {
            done.add_attribute(Attribute::Bold).fg(Color::Green)
        } else {
            done
        };
        table.add_row(vec![
            Cell::new(&set.set_id),
            Cell::new(set_label(set)),
            Cell::new(format_target(&set.target)),
            Cell::new(set.target_weight.map_or("-".to_string(), |w| format!("{w:.2}"))),
            done,
            Cell::new(format_time(set.completed_at)),
        ]);
    }
    println!("{table}");
}

fn print_history_table(entries: &[HistoryEntry], header_color: Color) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").fg(header_color),
            Cell::new("Day").fg(header_color),
            Cell::new("Sets").fg(header_color),
            Cell::new("Progress").fg(header_color),
            Cell::new("Started").fg(header_color),
            Cell::new("Finished").fg(header_color),
        ]);

    for entry in entries {
        let progress = entry.progress();
        let day = Cell::new(format!("{} ({})", entry.day_name, entry.current_day_index + 1));
        let day = if entry.is_active {
            day.add_attribute(Attribute::Bold)
        } else {
            day
        };
        table.add_row(vec![
            Cell::new(entry.history_id.to_string()),
            day,
            Cell::new(format!("{}/{}", progress.completed_sets, progress.total_sets)),
            Cell::new(format!("{:.0}%", progress.completion_percentage)),
            Cell::new(format_time(Some(entry.created_at))),
            Cell::new(format_time(entry.finished_at)),
        ]);
    }
    println!("{table}");
}

fn print_sets_csv(entry: &HistoryEntry) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    writer.write_record([
        "History_ID",
        "Day",
        "Set_ID",
        "Exercise_ID",
        "Target_Kind",
        "Target",
        "Weight",
        "Completed",
        "Is_Complete",
        "Completed_At",
    ])?;
    for set in &entry.sets {
        writer.write_record([
            entry.history_id.to_string(),
            entry.day_name.clone(),
            set.set_id.clone(),
            set.exercise_id.clone(),
            set.target.kind().to_string(),
            set.target.value().to_string(),
            set.target_weight.map_or(String::new(), |w| format!("{w:.2}")),
            set.completed_value().to_string(),
            set.is_complete.to_string(),
            set.completed_at.map_or(String::new(), |t| t.to_rfc3339()),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn print_history_csv(entries: &[HistoryEntry]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    writer.write_record([
        "History_ID",
        "Day_Index",
        "Day",
        "Completed_Sets",
        "Total_Sets",
        "Is_Active",
        "Created_At",
        "Finished_At",
    ])?;
    for entry in entries {
        let progress = entry.progress();
        writer.write_record([
            entry.history_id.to_string(),
            entry.current_day_index.to_string(),
            entry.day_name.clone(),
            progress.completed_sets.to_string(),
            progress.total_sets.to_string(),
            entry.is_active.to_string(),
            entry.created_at.to_rfc3339(),
            entry.finished_at.map_or(String::new(), |t| t.to_rfc3339()),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parses_global_user_after_subcommand() {
        let cli = cli::Cli::try_parse_from(["ct", "complete", "set_1", "set_2", "--user", "bob"])
            .unwrap();
        assert_eq!(cli.user.as_deref(), Some("bob"));
        match cli.command {
            cli::Commands::Complete {
                set_ids,
                parallel,
                entry,
            } => {
                assert_eq!(set_ids, vec!["set_1", "set_2"]);
                assert!(!parallel);
                assert_eq!(entry, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_pinned_entry() {
        let cli = cli::Cli::try_parse_from(["ct", "complete", "set_1", "--entry", "7"]).unwrap();
        match cli.command {
            cli::Commands::Complete { entry, .. } => assert_eq!(entry, Some(7)),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn counts_failed_completions() {
        let set_ids = vec!["set_1".to_string(), "set_2".to_string()];
        let results = vec![
            Err(Error::InvalidState("entry is finished".into())),
            Err(Error::Conflict { attempts: 3 }),
        ];
        assert_eq!(report_results(&set_ids, results, Color::Green), 2);
        assert_eq!(report_results(&set_ids, Vec::new(), Color::Green), 0);
    }

    #[test]
    fn progress_rejects_both_values() {
        let parsed =
            cli::Cli::try_parse_from(["ct", "progress", "set_1", "--reps", "3", "--duration", "4"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn formats_targets() {
        assert_eq!(format_target(&Target::Reps(15)), "15 reps");
        assert_eq!(format_target(&Target::Duration(60)), "60 s");
    }
}
