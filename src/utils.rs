use anyhow::Result;
use chrono::{DateTime, Local};
use log::{LevelFilter, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

// Transport crates are chatty at debug; they are capped here so the log
// stays about rooms, sends and stories.
const NOISY_TARGETS: &[&str] = &["hyper", "hyper_util", "reqwest", "rustls", "tungstenite", "tokio_tungstenite", "mio"];
const NOISY_LEVEL: LevelFilter = LevelFilter::Warn;

enum Sink {
    File(Mutex<File>),
    Stdout,
}

/// Timestamped line logger for the CLI, writing to a file or stdout.
pub struct CliLogger {
    sink: Sink,
    level: LevelFilter,
}

impl CliLogger {
    pub fn new(log_file: Option<&Path>, level: LevelFilter) -> Result<Self> {
        let sink = match log_file {
            Some(path) => Sink::File(Mutex::new(OpenOptions::new().create(true).append(true).open(path)?)),
            None => Sink::Stdout,
        };
        Ok(CliLogger { sink, level })
    }

    fn level_for(&self, target: &str) -> LevelFilter {
        let root = target.split("::").next().unwrap_or(target);
        if NOISY_TARGETS.contains(&root) {
            self.level.min(NOISY_LEVEL)
        } else {
            self.level
        }
    }
}

impl log::Log for CliLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level_for(metadata.target())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let now: DateTime<Local> = Local::now();
        let line = format!(
            "{} {:<5} {}: {}\n",
            now.format("%H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        );

        match &self.sink {
            Sink::File(file) => {
                if let Ok(mut file) = file.lock() {
                    let _ = file.write_all(line.as_bytes());
                }
            }
            Sink::Stdout => print!("{}", line),
        }
    }

    fn flush(&self) {
        match &self.sink {
            Sink::File(file) => {
                if let Ok(mut file) = file.lock() {
                    let _ = file.flush();
                }
            }
            Sink::Stdout => {
                let _ = std::io::stdout().flush();
            }
        }
    }
}

/// Read a line of input from stdin, trimming whitespace
pub fn read_line() -> Result<String> {
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

pub fn setup_logging(log_file: Option<&Path>, level: LevelFilter) -> Result<()> {
    let logger = CliLogger::new(log_file, level)?;
    log::set_boxed_logger(Box::new(logger)).map(|()| log::set_max_level(level))?;

    log::info!("{} {} logging at {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"), level);
    Ok(())
}
