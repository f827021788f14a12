use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::exit;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use tuxlog::config::Config;
use tuxlog::logging::{rotate, Level, LogSession, SessionOptions};
use tuxlog::runner;

#[derive(Debug, Clone, Parser)]
#[command(about, version, subcommand_help_heading = "Commands")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn run(self) -> Result<i32> {
        match self.command {
            Command::Run(opts) => run_command(opts),
            Command::Pipe(opts) => pipe_command(opts),
            Command::Rotate(opts) => rotate_command(opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run a command with its combined output captured to the log
    #[command(override_usage = "tuxlog run [options] <command> [args]...")]
    Run(RunOptions),

    /// Read stdin into the log line-by-line until EOF
    Pipe(PipeOptions),

    /// Rotate oversized logs and prune old compressed backups
    Rotate(RotateOptions),
}

/// Logging knobs shared by every subcommand; unset values fall back to the
/// config file, then to the built-in defaults.
#[derive(Args, Clone, Debug)]
struct LogOptions {
    /// Directory that receives log files
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Exact log file path (overrides --log-dir)
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Rotation threshold in megabytes
    #[arg(long = "max-size", value_name = "MB")]
    max_size: Option<u64>,

    /// Compressed backups to retain
    #[arg(long = "max-backups", value_name = "N")]
    max_backups: Option<usize>,

    /// Minimum severity written to the sinks
    #[arg(long, value_name = "LEVEL")]
    level: Option<Level>,
}

impl LogOptions {
    fn open_session(&self, config: &Config, prefix: &str) -> Result<LogSession> {
        let log_dir = self
            .log_dir
            .clone()
            .unwrap_or_else(|| config.log_dir.clone());
        let options = SessionOptions::new(log_dir, prefix)
            .max_size_mb(self.max_size.unwrap_or(config.max_size_mb))
            .max_backups(self.max_backups.unwrap_or(config.max_backups))
            .min_level(self.level.unwrap_or(config.min_level));

        let session = match &self.log_file {
            Some(path) => LogSession::setup_at(path.clone(), options)?,
            None => LogSession::setup(options)?,
        };
        Ok(session)
    }
}

#[derive(Args, Clone, Debug)]
struct RunOptions {
    /// Command to execute
    #[arg(value_name = "command")]
    command: String,

    /// Arguments passed to the command
    #[arg(value_name = "args", trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,

    #[command(flatten)]
    log: LogOptions,
}

#[derive(Args, Clone, Debug)]
struct PipeOptions {
    #[command(flatten)]
    log: LogOptions,
}

#[derive(Args, Clone, Debug)]
struct RotateOptions {
    #[command(flatten)]
    log: LogOptions,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // --help and --version surface as "errors" but should exit 0;
            // real usage errors exit 1
            let code = i32::from(err.use_stderr());
            let _ = err.print();
            exit(code);
        }
    };

    match cli.run() {
        Ok(code) => exit(code),
        Err(err) => {
            eprintln!("tuxlog: {err:?}");
            exit(1);
        }
    }
}

/// Wrap a command; the process exit code is the child's, verbatim.
fn run_command(opts: RunOptions) -> Result<i32> {
    let config = Config::load()?;
    let prefix = runner::default_prefix(&opts.command);
    let session = opts.log.open_session(&config, &prefix)?;
    runner::run_logged(&session, &opts.command, &opts.args)
}

/// Log stdin line-by-line, the `some_command | tuxlog pipe` form.
fn pipe_command(opts: PipeOptions) -> Result<i32> {
    let config = Config::load()?;
    let session = opts.log.open_session(&config, "pipe")?;
    for line in io::stdin().lock().lines() {
        session.info(&line?);
    }
    session.finish();
    Ok(0)
}

/// One-shot rotation sweep that waits for compression before exiting.
fn rotate_command(opts: RotateOptions) -> Result<i32> {
    let config = Config::load()?;
    let session = opts.log.open_session(&config, "rotate")?;
    let sweep = rotate(
        &session,
        session.log_dir(),
        session.max_size_mb(),
        session.max_backups(),
    );
    session.info(&format!("rotated {} log file(s)", sweep.rotated.len()));
    sweep.wait();
    session.finish();
    Ok(0)
}
