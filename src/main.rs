use chrono::Local;
use clap::{Args, Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use breathe::config::{Config, Hooks};
use breathe::error::{Error, Result};
use breathe::hooks::{bell, execute_hook};
use breathe::phase::{Durations, EXPANDED_SCALE};
use breathe::session::{Event, SessionTracker, Status};
use breathe::store::{JsonFileStore, SessionStore, Summary};

/// How long to wait for input when no timer is pending.
const IDLE_POLL_MS: u64 = 250;
const BAR_WIDTH: usize = 20;
const BREATH_WIDTH: usize = 12;

#[derive(Parser)]
#[command(name = "breathe", version, about = "🫁 Guided breathing pacer for the terminal")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Start a breathing session
    Start(StartArgs),
    /// Show completed sessions
    Stats,
}

#[derive(Args, Debug)]
struct StartArgs {
    /// Session length in minutes (1-30)
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..=30))]
    minutes: Option<u32>,

    /// Inhale length, 2-10 seconds (e.g. "4s", "4")
    #[arg(long, value_parser = parse_breath)]
    inhale: Option<u64>,

    /// Hold length, 0-10 seconds
    #[arg(long, value_parser = parse_hold)]
    hold: Option<u64>,

    /// Exhale length, 2-10 seconds
    #[arg(long, value_parser = parse_breath)]
    exhale: Option<u64>,

    /// Skip hooks and the completion bell
    #[arg(long)]
    no_hooks: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Start,
    Pause,
    Resume,
    Reset,
    Quit,
}

impl Control {
    fn parse(line: &str) -> Option<Self> {
        match line.trim().to_lowercase().as_str() {
            "s" | "start" => Some(Control::Start),
            "p" | "pause" => Some(Control::Pause),
            "r" | "resume" => Some(Control::Resume),
            "x" | "reset" => Some(Control::Reset),
            "q" | "quit" => Some(Control::Quit),
            _ => None,
        }
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        CliCommand::Start(args) => run_session(args),
        CliCommand::Stats => {
            print_stats(&JsonFileStore::open_default());
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(false).with_writer(io::stderr))
        .with(env_filter)
        .init();
}

fn run_session(args: StartArgs) -> Result<()> {
    let config = Config::load();
    let durations = Durations {
        inhale_ms: args.inhale.unwrap_or(config.breathing.inhale_ms),
        hold_ms: args.hold.unwrap_or(config.breathing.hold_ms),
        exhale_ms: args.exhale.unwrap_or(config.breathing.exhale_ms),
    };
    let minutes = args.minutes.unwrap_or(config.session_minutes);
    let hooks = if args.no_hooks {
        Hooks::default()
    } else {
        config.hooks
    };

    let (tx, rx) = mpsc::channel();
    let interrupt = tx.clone();
    ctrlc::set_handler(move || {
        let _ = interrupt.send(Control::Quit);
    })?;
    spawn_control_reader(tx);

    let mut tracker = SessionTracker::new(durations, minutes, JsonFileStore::open_default());

    println!(
        "🫁 Starting {} breathing session ({} in, {} hold, {} out)",
        format_duration(u64::from(minutes) * 60),
        format_duration(durations.inhale_ms / 1000),
        format_duration(durations.hold_ms / 1000),
        format_duration(durations.exhale_ms / 1000),
    );
    println!("   Controls: s start, p pause, r resume, x reset, q quit (then Enter)");

    let clock = Instant::now();
    let now_ms = || clock.elapsed().as_millis() as u64;

    tracker.start(now_ms());
    execute_hook(hooks.session_start.as_deref());
    render(&tracker);

    loop {
        let wait = tracker
            .next_deadline()
            .map(|due| due.saturating_sub(now_ms()))
            .unwrap_or(IDLE_POLL_MS);

        match rx.recv_timeout(Duration::from_millis(wait)) {
            Ok(Control::Quit) => break,
            Ok(control) => apply(&mut tracker, control, now_ms(), &hooks),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => thread::sleep(Duration::from_millis(wait)),
        }

        for event in tracker.advance_to(now_ms()) {
            if let Event::Completed(record) = event {
                render(&tracker);
                println!();
                println!(
                    "✅ Session complete! {} of breathing recorded.",
                    format_duration(u64::from(record.duration) * 60)
                );
                if !args.no_hooks {
                    bell();
                }
                execute_hook(hooks.session_end.as_deref());
                return Ok(());
            }
        }
        render(&tracker);
    }

    let was_active = matches!(tracker.status(), Status::Running | Status::Paused);
    tracker.reset();
    println!("\n🛑 Interrupted!");
    if was_active {
        execute_hook(hooks.session_end.as_deref());
    }
    Ok(())
}

fn apply<S: SessionStore>(
    tracker: &mut SessionTracker<S>,
    control: Control,
    now_ms: u64,
    hooks: &Hooks,
) {
    match control {
        Control::Start => {
            tracker.start(now_ms);
            execute_hook(hooks.session_start.as_deref());
        }
        Control::Pause => tracker.pause(),
        Control::Resume if tracker.status() == Status::Paused => {
            tracker.resume(now_ms);
            execute_hook(hooks.session_start.as_deref());
        }
        Control::Resume => debug!(status = ?tracker.status(), "Nothing to resume"),
        Control::Reset => tracker.reset(),
        Control::Quit => {}
    }
}

fn spawn_control_reader(tx: Sender<Control>) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match Control::parse(&line) {
                Some(control) => {
                    if tx.send(control).is_err() {
                        break;
                    }
                }
                None => debug!("Unknown control: {line:?}"),
            }
        }
    });
}

fn render<S: SessionStore>(tracker: &SessionTracker<S>) {
    let paused = if tracker.status() == Status::Paused {
        " (paused)"
    } else {
        ""
    };
    print!(
        "\r🫁 {:<16} [{}] [{}] {}{}    ",
        tracker.headline(),
        breath_bar(tracker.scale()),
        progress_bar(tracker.progress()),
        tracker.clock(),
        paused
    );
    let _ = io::stdout().flush();
}

fn breath_bar(scale: f64) -> String {
    let filled = ((scale / EXPANDED_SCALE) * BREATH_WIDTH as f64).round() as usize;
    let filled = filled.min(BREATH_WIDTH);
    format!("{}{}", "●".repeat(filled), "·".repeat(BREATH_WIDTH - filled))
}

fn progress_bar(ratio: f64) -> String {
    let filled = ((ratio * BAR_WIDTH as f64) as usize).min(BAR_WIDTH);
    format!("{}{}", "█".repeat(filled), "░".repeat(BAR_WIDTH - filled))
}

fn print_stats(store: &JsonFileStore) {
    let records = store.load();
    if records.is_empty() {
        println!("No sessions recorded yet.");
        return;
    }

    for record in &records {
        println!(
            "{}  {}",
            record.date.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            format_duration(u64::from(record.duration) * 60)
        );
    }

    let summary = Summary::of(&records);
    println!(
        "\n{} session{}, {} in total",
        summary.sessions,
        if summary.sessions == 1 { "" } else { "s" },
        format_duration(summary.total_minutes * 60)
    );
    if let Some(last) = summary.last {
        println!("Last session: {}", last.with_timezone(&Local).format("%Y-%m-%d %H:%M"));
    }
}

fn parse_breath(input: &str) -> Result<u64> {
    parse_phase(input, 2, 10)
}

fn parse_hold(input: &str) -> Result<u64> {
    parse_phase(input, 0, 10)
}

/// Parse a phase length in seconds within `min..=max`, returned in ms.
fn parse_phase(input: &str, min: u64, max: u64) -> Result<u64> {
    let seconds = parse_duration(input)?;
    if !(min..=max).contains(&seconds) {
        return Err(Error::InvalidDuration(format!(
            "Must be between {min} and {max} seconds"
        )));
    }
    Ok(seconds * 1000)
}

/// Parse `4s`, `1m30s`, or a bare number of seconds.
fn parse_duration(input: &str) -> Result<u64> {
    let input = input.trim().to_lowercase();

    if let Ok(seconds) = input.parse::<u64>() {
        return Ok(seconds);
    }

    let mut total_seconds = 0u64;
    let mut current_number = String::new();

    for ch in input.chars() {
        if ch.is_ascii_digit() {
            current_number.push(ch);
        } else if ch == 'm' || ch == 's' {
            if current_number.is_empty() {
                return Err(Error::InvalidDuration(
                    "Invalid duration format. Use formats like: 4s, 1m30s".to_string(),
                ));
            }

            let number: u64 = current_number
                .parse()
                .map_err(|_| Error::InvalidDuration("Invalid number in duration".to_string()))?;

            let seconds = if ch == 'm' {
                number.checked_mul(60)
            } else {
                Some(number)
            };
            total_seconds = seconds
                .and_then(|seconds| total_seconds.checked_add(seconds))
                .ok_or_else(|| Error::InvalidDuration("Duration is too long".to_string()))?;
            current_number.clear();
        } else if !ch.is_whitespace() {
            return Err(Error::InvalidDuration(
                "Invalid character in duration. Use formats like: 4s, 1m30s".to_string(),
            ));
        }
    }

    if !current_number.is_empty() {
        return Err(Error::InvalidDuration(
            "Duration must end with 'm' (minutes) or 's' (seconds)".to_string(),
        ));
    }

    Ok(total_seconds)
}

fn format_duration(seconds: u64) -> String {
    let minutes = seconds / 60;
    let remaining_seconds = seconds % 60;

    if minutes > 0 && remaining_seconds > 0 {
        format!(
            "{} minute{} {} second{}",
            minutes,
            if minutes == 1 { "" } else { "s" },
            remaining_seconds,
            if remaining_seconds == 1 { "" } else { "s" }
        )
    } else if minutes > 0 {
        format!("{} minute{}", minutes, if minutes == 1 { "" } else { "s" })
    } else {
        format!(
            "{} second{}",
            remaining_seconds,
            if remaining_seconds == 1 { "" } else { "s" }
        )
    }
}
