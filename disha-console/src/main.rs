//! DishaConsole - terminal front end
//!
//! Reads intents from stdin, one per line (`help` lists them), and prints
//! outcomes and calibration progress. Robot I/O stays on the main thread;
//! a helper thread only forwards stdin lines.

use crossbeam_channel::{Receiver, RecvTimeoutError};
use disha_console::calibration::CalibrationEvent;
use disha_console::channel::CommandChannel;
use disha_console::console::ConsoleEvent;
use disha_console::robot::RobotController;
use disha_console::transport::{SerialTransport, Transport};
use disha_console::{Config, Console, Error, Outcome, Result};
use std::env;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Default config file, used only when present
const DEFAULT_CONFIG: &str = "disha.toml";

/// Longest wait for input when no calibration tick is pending
const IDLE_WAIT: Duration = Duration::from_millis(100);

/// Parsed command line
struct Args {
    config: Option<PathBuf>,
    port: Option<String>,
    mock: bool,
}

/// Parse arguments.
///
/// Supports:
/// - `disha-console <path>` (positional config)
/// - `disha-console --config <path>` / `-c <path>`
/// - `--port <device>` to override the configured serial port
/// - `--mock` to talk to the built-in simulated robot
fn parse_args() -> Result<Args> {
    let mut args = Args {
        config: None,
        port: None,
        mock: false,
    };
    let mut iter = env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = iter
                    .next()
                    .ok_or_else(|| Error::Config("--config needs a path".into()))?;
                args.config = Some(PathBuf::from(path));
            }
            "--port" | "-p" => {
                args.port = Some(
                    iter.next()
                        .ok_or_else(|| Error::Config("--port needs a device".into()))?,
                );
            }
            "--mock" => args.mock = true,
            positional if !positional.starts_with('-') && args.config.is_none() => {
                args.config = Some(PathBuf::from(positional));
            }
            other => return Err(Error::Config(format!("unknown argument '{}'", other))),
        }
    }
    Ok(args)
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            log::info!("Using config: {}", path.display());
            Config::load(path)?
        }
        None if Path::new(DEFAULT_CONFIG).exists() => {
            log::info!("Using config: {}", DEFAULT_CONFIG);
            Config::load(Path::new(DEFAULT_CONFIG))?
        }
        None => {
            log::info!("No config file, using defaults");
            Config::default()
        }
    };
    if let Some(port) = &args.port {
        config.serial.port = port.clone();
    }
    Ok(config)
}

#[cfg(feature = "mock")]
fn open_simulator() -> Result<Box<dyn Transport>> {
    use disha_console::transport::{SimSettings, SimulatedRobot};
    Ok(Box::new(SimulatedRobot::new(SimSettings::default())))
}

#[cfg(not(feature = "mock"))]
fn open_simulator() -> Result<Box<dyn Transport>> {
    Err(Error::Config(
        "--mock requires the 'mock' feature".to_string(),
    ))
}

fn open_transport(args: &Args, config: &Config) -> Result<Box<dyn Transport>> {
    if args.mock {
        log::info!("Connecting to simulated robot");
        return open_simulator();
    }
    let transport = SerialTransport::from_config(&config.serial)?;
    Ok(Box::new(transport))
}

/// Forward stdin lines until EOF
fn spawn_stdin_reader() -> Result<Receiver<String>> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        log::error!("stdin read failed: {}", e);
                        break;
                    }
                }
            }
        })?;
    Ok(rx)
}

fn print_event(event: &ConsoleEvent) {
    match event {
        ConsoleEvent::Calibration(CalibrationEvent::Sample {
            tick,
            total,
            sample,
            bounds,
        }) => println!(
            "cal {}/{}: sample {} offsets {}",
            tick,
            total,
            sample,
            bounds.offset()
        ),
        ConsoleEvent::Calibration(CalibrationEvent::Finished { bounds, samples }) => {
            println!("calibration done: offsets {} ({} samples)", bounds.offset(), samples)
        }
        ConsoleEvent::Calibration(CalibrationEvent::Aborted { tick, reason }) => {
            println!("calibration aborted at {}: {}", tick, reason)
        }
        ConsoleEvent::Calibration(CalibrationEvent::Reset) => println!("calibration reset"),
        ConsoleEvent::PolesCleared => println!("poles cleared"),
        // Transcript lines already go through the logger
        _ => {}
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("DishaConsole v{} starting...", env!("CARGO_PKG_VERSION"));

    let args = parse_args()?;
    let config = load_config(&args)?;

    let transport = open_transport(&args, &config)?;
    let channel = Arc::new(CommandChannel::new(transport, config.channel_settings()));
    if config.serial.read_greeting {
        if let Some(greeting) = channel.read_greeting()? {
            println!("robot: {}", greeting);
        }
    }

    let robot = RobotController::new(Arc::clone(&channel), config.robot_settings());
    let mut console = Console::new(robot, &config);
    let events = console.subscribe();

    // Set up shutdown signal handler
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Config(format!("Error setting Ctrl-C handler: {}", e)))?;

    let input = spawn_stdin_reader()?;
    println!("Type 'help' for commands.");

    while running.load(Ordering::Relaxed) {
        let wait = console
            .next_tick()
            .map(|due| due.saturating_duration_since(Instant::now()).min(IDLE_WAIT))
            .unwrap_or(IDLE_WAIT);

        match input.recv_timeout(wait) {
            Ok(line) if line.trim().is_empty() => {}
            Ok(line) => match console.dispatch_line(&line) {
                Ok(Outcome::Quit) => break,
                Ok(outcome) => println!("{}", outcome),
                Err(e) => println!("error: {}", e),
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                log::info!("Input closed");
                break;
            }
        }

        if let Err(e) = console.poll(Instant::now()) {
            println!("calibration tick failed: {}", e);
        }
        for event in events.try_iter() {
            print_event(&event);
        }
    }

    console.shutdown()?;
    for event in events.try_iter() {
        print_event(&event);
    }
    log::info!("DishaConsole stopped");
    Ok(())
}
