// sleep-tracker: CLI for driving the sleep-tracking screen state
//
// Commands:
//   sleep-tracker start            Begin tracking a new night
//   sleep-tracker stop             Close the open night
//   sleep-tracker clear            Delete all recorded nights
//   sleep-tracker rate <id> <0-5>  Record a quality rating
//   sleep-tracker status           Show the current summary

use anyhow::{anyhow, Context, Result};
use sleep_tracker::{Config, JsonNightStore, SleepTracker};
use std::env;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn print_help() {
    println!(
        r#"sleep-tracker - track sleep sessions from the command line

USAGE:
    sleep-tracker <COMMAND>

COMMANDS:
    start              Begin tracking a new night
    stop               Close the night in progress
    clear              Delete all recorded nights
    rate <id> <0-5>    Record a quality rating for a closed night
    status             Show the current summary (default)
    help               Show this help message

Data lives in ~/.sleep-tracker/nights.json; set SLEEP_TRACKER_DIR to
override the directory.
"#
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("status");

    if matches!(command, "help" | "--help" | "-h") {
        print_help();
        return Ok(());
    }

    let config = Config::from_env();
    let store = Arc::new(JsonNightStore::open(&config)?);
    let mut tracker = SleepTracker::spawn(store).await?;

    let outcome = run_command(&tracker, command, &args).await;

    print_status(&tracker);
    tracker.close().await;
    outcome
}

async fn run_command(tracker: &SleepTracker, command: &str, args: &[String]) -> Result<()> {
    match command {
        "start" => {
            if !tracker.view().start_visible {
                println!("A night is already in progress.");
                return Ok(());
            }
            tracker.start_tracking().await?;
            println!("Started tracking. Sleep well!");
        }
        "stop" => {
            tracker.stop_tracking().await?;
            match tracker.consume_navigation().await? {
                Some(night) => {
                    let minutes = night.duration().num_minutes();
                    println!(
                        "Stopped night #{} after {}h {:02}m.",
                        night.id,
                        minutes / 60,
                        minutes % 60
                    );
                    println!("Rate it with: sleep-tracker rate {} <0-5>", night.id);
                }
                None => println!("No night in progress."),
            }
        }
        "clear" => {
            tracker.clear().await?;
            if tracker.consume_clear_notice().await? {
                println!("All sleep data cleared.");
            }
        }
        "rate" => {
            let id = args
                .get(1)
                .ok_or_else(|| anyhow!("Usage: sleep-tracker rate <id> <0-5>"))?
                .parse()
                .context("Night id must be a number")?;
            let quality = args
                .get(2)
                .ok_or_else(|| anyhow!("Usage: sleep-tracker rate <id> <0-5>"))?
                .parse()
                .context("Quality must be a number from 0 to 5")?;
            tracker.record_quality(id, quality).await?;
            println!("Recorded quality {}/5 for night #{}.", quality, id);
        }
        "status" => {}
        other => {
            print_help();
            return Err(anyhow!("Unknown command: {}", other));
        }
    }
    Ok(())
}

fn print_status(tracker: &SleepTracker) {
    let view = tracker.view();
    if view.summary.is_empty() {
        println!("No nights recorded yet. Run `sleep-tracker start` tonight.");
    } else {
        println!("{}", view.summary);
    }
    if view.stop_visible {
        println!("\nA night is in progress; stop it with `sleep-tracker stop`.");
    }
}
