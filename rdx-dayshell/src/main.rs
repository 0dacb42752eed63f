use anyhow::Result;
use chrono::Datelike;
use colored::Colorize;
use daybell::prelude::*;
use daybell::{ENGINE_NAME, VERSION as LIB_VERSION};
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");
const BAR_WIDTH: usize = 30;

/// A custom helper struct for rustyline that enables syntax highlighting.
#[derive(Completer, Helper, Hinter, Validator)]
struct ShellHighlighter;

impl Highlighter for ShellHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            Cow::Owned(format!("{} {}", command.yellow().bold(), rest.yellow()))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    println!("{}", "  ____              _          _ _ ".cyan());
    println!("{}", " |  _ \\  __ _ _   _| |__   ___| | |".cyan());
    println!("{}", " | | | |/ _` | | | | '_ \\ / _ \\ | |".cyan());
    println!("{}", " | |_| | (_| | |_| | |_) |  __/ | |".cyan());
    println!("{}", " |____/ \\__,_|\\__, |_.__/ \\___|_|_|".cyan());
    println!("{}", "              |___/                ".cyan());
    println!("{}", "-".repeat(60).dimmed());
    println!(
        "  Shell   v{:<8} Library   v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );
    println!(
        "{}",
        "  Distributed under the MIT OR Apache-2.0 license.".dimmed()
    );
    println!("{}", "-".repeat(60).dimmed());
}

/// Spawns several tasks, each subscribing to a different event stream from the engine.
fn spawn_event_listeners(engine: &DaybellEngine, is_watching: Arc<AtomicBool>) {
    let mut bell_rx = engine.subscribe_bell_events();
    tokio::spawn(async move {
        while let Ok(bell) = bell_rx.recv().await {
            println!("\n<-- {} {}", "[BELL]".yellow().bold(), describe_bell(&bell));
        }
    });

    let mut conditional_rx = engine.subscribe_conditional_events();
    tokio::spawn(async move {
        while let Ok(event) = conditional_rx.recv().await {
            println!(
                "\n<-- {} {:?} at {}",
                "[NOTIFY]".magenta().bold(),
                event.condition_id,
                event.now.format("%H:%M:%S")
            );
        }
    });

    // Progress listener (controlled by the shared flag)
    let mut progress_rx = engine.subscribe_progress_events();
    tokio::spawn(async move {
        while let Ok(event) = progress_rx.recv().await {
            if is_watching.load(Ordering::Relaxed) && event.tick.is_some_and(|tick| tick % 5 == 0)
            {
                let day = event.progress.day;
                println!(
                    "<-- [WATCH] {} day {:.2}%",
                    event.now.format("%H:%M:%S"),
                    day.clamped_percent()
                );
            }
        }
    });
}

fn describe_bell(bell: &BellEvent) -> String {
    match bell {
        BellEvent::SegmentStarted(segment) => {
            format!("{} {}-{} started", segment_name(segment), segment.start, segment.end)
        }
        BellEvent::SegmentEnded(segment) => {
            format!("{} {}-{} ended", segment_name(segment), segment.start, segment.end)
        }
        BellEvent::PhaseStarted(phase) => format!("phase {}-{} started", phase.start, phase.end),
        BellEvent::PhaseEnded(phase) => format!("phase {}-{} ended", phase.start, phase.end),
        BellEvent::DayCompleted => "school day completed".to_string(),
    }
}

fn segment_name(segment: &TimeSegment) -> String {
    match (segment.kind, segment.lesson) {
        (SegmentKind::Lesson, Some(id)) => format!("lesson {}", id),
        (SegmentKind::Lesson, None) => "lesson".to_string(),
        (SegmentKind::Break, _) => "break".to_string(),
    }
}

/// Formats minutes as `2d 3h`, `1h 05m` or `12m 30s`.
fn format_minutes(minutes: f64) -> String {
    let total_seconds = (minutes.max(0.0) * 60.0).round() as u64;
    let (days, rest) = (total_seconds / 86_400, total_seconds % 86_400);
    let (hours, rest) = (rest / 3_600, rest % 3_600);
    let (mins, secs) = (rest / 60, rest % 60);
    if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {:02}m", hours, mins)
    } else {
        format!("{}m {:02}s", mins, secs)
    }
}

fn render_card(scope: Scope, window: Option<ScopeWindow>) {
    let Some(window) = window else {
        println!("  {:<16} {}", scope.label(), "outside school hours".dimmed());
        return;
    };
    let percent = window.clamped_percent();
    let filled = ((percent / 100.0) * BAR_WIDTH as f64).round() as usize;
    let bar = format!(
        "{}{}",
        "#".repeat(filled).green(),
        "-".repeat(BAR_WIDTH - filled.min(BAR_WIDTH)).dimmed()
    );
    println!(
        "  {:<16} [{}] {:>6.2}%  elapsed {:<8} remaining {}",
        scope.label(),
        bar,
        percent,
        format_minutes(window.clamped_elapsed()),
        format_minutes(window.remaining().max(0.0))
    );
}

async fn print_status(engine: &DaybellEngine) {
    let event = engine.snapshot().await;
    let clock = engine.clock().await;
    println!(
        "{} {} ({:?})",
        "Now:".bold(),
        event.now.format("%Y-%m-%d %H:%M:%S"),
        event.now.weekday()
    );
    if clock.is_adjusted() {
        let loop_label = clock
            .loop_state()
            .map(|state| format!("{}s", state.duration_secs))
            .unwrap_or_else(|| "off".to_string());
        println!(
            "  {} jump {}m, speed x{}, loop {}",
            "[DEV]".red().bold(),
            clock.jump_offset().num_minutes(),
            clock.speed_multiplier(),
            loop_label
        );
    }
    for scope in Scope::ALL {
        render_card(scope, event.progress.window(scope));
    }
}

async fn print_schedule(engine: &DaybellEngine) {
    println!("{}", "Lessons:".bold());
    for (lesson, excluded) in engine.lessons().await {
        let line = format!("  {:>4}  {} - {}", lesson.id.to_string(), lesson.start, lesson.end);
        if excluded {
            println!("{} {}", line.dimmed().strikethrough(), "(excluded)".dimmed());
        } else {
            println!("{}", line);
        }
    }
    let schedule = engine.schedule().await;
    println!("{} ({} min)", "Segments:".bold(), schedule.total_minutes());
    for (index, phase) in schedule.phases().iter().enumerate() {
        println!("  phase {}: {} - {}", index + 1, phase.bounds.start, phase.bounds.end);
        for segment in schedule
            .segments()
            .iter()
            .filter(|segment| segment.phase == phase.bounds)
        {
            println!(
                "      {} - {}  {}",
                segment.start,
                segment.end,
                segment_name(segment)
            );
        }
    }
}

fn print_help() {
    println!("Available commands:");
    println!("  status                - Shows progress for every scope.");
    println!("  schedule              - Lists lessons, phases and segments.");
    println!("  toggle <ID>           - Excludes or includes a lesson.");
    println!("  jump <MINUTES>        - Moves the clock, negative values go back.");
    println!("  speed <X>             - Runs the clock X times as fast.");
    println!("  loop <SECONDS>|off    - Replays the school day every SECONDS.");
    println!("  reset                 - Drops every clock adjustment.");
    println!("  notify <PERCENT>      - Notifies once when the day reaches PERCENT.");
    println!("  list                  - Shows active notifications and their handles.");
    println!("  remove <H>            - Removes a notification by its handle.");
    println!("  watch on|off          - Prints day progress as it ticks.");
    println!("  exit                  - Quits the shell.");
}

fn report(result: Result<(), DaybellError>, success: &str) {
    match result {
        Ok(()) => println!("--> {}", success),
        Err(e) => println!("{} {}", "Error:".red(), e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let path = env::args().nth(1).map(PathBuf::from);
    let config = DaybellConfig::load(path.as_deref())?;
    let engine = DaybellEngine::new(config)?;
    let engine_handle = engine.clone();

    // Create the shared flag for the progress listener.
    let is_watching = Arc::new(AtomicBool::new(false));
    spawn_event_listeners(&engine_handle, is_watching.clone());

    info!("Spawning {} in the background...", ENGINE_NAME.cyan());
    tokio::spawn(async move {
        if let Err(e) = engine.run().await {
            eprintln!("\nEngine stopped with an error: {}", e);
        }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;

    // The shell's state management variables.
    let mut active_listeners: BTreeMap<usize, ListenerId> = BTreeMap::new();
    let mut next_handle: usize = 0;

    let mut rl = Editor::new()?;
    rl.set_helper(Some(ShellHighlighter));

    println!(
        "{} is running. Type 'help' for commands or 'exit' to quit.",
        ENGINE_NAME.cyan()
    );

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        match rl.readline(&prompt) {
            Ok(line) => {
                rl.add_history_entry(line.as_str())?;
                let args = line.split_whitespace().collect::<Vec<_>>();
                let Some(command) = args.first() else {
                    continue;
                };
                match *command {
                    "status" => print_status(&engine_handle).await,
                    "schedule" => print_schedule(&engine_handle).await,
                    "toggle" => match args.get(1).map(|id| id.trim_start_matches('#').parse::<u32>()) {
                        Some(Ok(id)) => {
                            report(engine_handle.toggle_lesson(LessonId(id)).await, "Lesson toggled.")
                        }
                        _ => println!("Usage: toggle <ID>"),
                    },
                    "jump" => match args.get(1).map(|minutes| minutes.parse::<i64>()) {
                        Some(Ok(minutes)) => report(
                            engine_handle.jump_time(minutes).await,
                            &format!("Jumped {} minutes.", minutes),
                        ),
                        _ => println!("Usage: jump <MINUTES>"),
                    },
                    "speed" => match args.get(1).map(|speed| speed.parse::<f64>()) {
                        Some(Ok(multiplier)) => report(
                            engine_handle.set_speed(multiplier).await,
                            &format!("Clock speed is now x{}.", multiplier),
                        ),
                        _ => println!("Usage: speed <X>"),
                    },
                    "loop" => match args.get(1) {
                        Some(&"off") => {
                            report(engine_handle.set_loop(false, 0.0).await, "Time loop disabled.")
                        }
                        Some(seconds) => match seconds.parse::<f64>() {
                            Ok(duration) => report(
                                engine_handle.set_loop(true, duration).await,
                                &format!("Replaying the school day every {}s.", duration),
                            ),
                            Err(_) => println!("Error: '{}' is not a valid number of seconds.", seconds),
                        },
                        None => println!("Usage: loop <SECONDS>|off"),
                    },
                    "reset" => report(engine_handle.reset_clock().await, "Clock reset."),
                    "notify" => match args.get(1).map(|percent| percent.parse::<f64>()) {
                        Some(Ok(target)) => {
                            let listener_id = engine_handle
                                .on_conditional(
                                    move |progress| progress.day.percent() >= target,
                                    move |_| println!("\n<-- [NOTIFY] Day reached {}%", target),
                                    true,
                                )
                                .await;
                            let handle = next_handle;
                            active_listeners.insert(handle, listener_id);
                            next_handle += 1;
                            println!("--> Added {}% notification with handle: #{}", target, handle);
                        }
                        _ => println!("Usage: notify <PERCENT>"),
                    },
                    "list" => {
                        println!("Active notifications:");
                        for (handle, id) in &active_listeners {
                            println!("  Handle #{}: {:?}", handle, id);
                        }
                    }
                    "remove" => match args.get(1).map(|handle| handle.parse::<usize>()) {
                        Some(Ok(handle)) => match active_listeners.remove(&handle) {
                            Some(id) => {
                                if engine_handle.remove_conditional_listener(id).await {
                                    println!("--> Notification successfully removed.");
                                } else {
                                    println!("--> Notification already fired.");
                                }
                            }
                            None => println!(
                                "Error: Invalid handle #{}. Use 'list' to see active notifications.",
                                handle
                            ),
                        },
                        _ => println!("Usage: remove <HANDLE>"),
                    },
                    "watch" => match args.get(1) {
                        Some(&"on") => {
                            is_watching.store(true, Ordering::Relaxed);
                            println!("--> Started watching day progress.");
                        }
                        Some(&"off") => {
                            is_watching.store(false, Ordering::Relaxed);
                            println!("--> Stopped watching day progress.");
                        }
                        _ => println!("Usage: watch on|off"),
                    },
                    "help" => print_help(),
                    "exit" => break,
                    _ => println!("Unknown command: '{}'. Type 'help'.", line.trim()),
                }
            }
            Err(_) => {
                println!("Exiting dayshell...");
                break;
            }
        }
    }

    Ok(())
}
