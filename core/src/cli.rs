use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::application::{Application, InitBuilder};
use crate::config::Config;
use crate::error::Line;
use crate::registry::BreakpointSet;
use crate::session::{ConsoleLevel, ConsoleLine, Outcome, SessionEvent, SessionHandle};
use crate::types::FlagConfiguration;

#[derive(Parser)]
#[command(name = "hexlogic")]
#[command(about = "HexLogic - drive the 8051 simulator debugger from a terminal", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Simulator service URL (overrides config file and env vars)
    #[arg(long, global = true)]
    pub service_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Assemble a program and run it until it halts
    Run {
        /// Assembly source file
        file: PathBuf,

        /// Breakpoint line (repeatable)
        #[arg(short = 'b', long = "break")]
        breakpoints: Vec<Line>,

        /// Run to this line instead of running freely
        #[arg(long)]
        until: Option<Line>,

        /// Run speed, 1 (slowest) to 10 (fastest)
        #[arg(long)]
        speed: Option<u8>,

        /// Assembler flag as NAME=true|false (repeatable)
        #[arg(long = "flag", value_parser = parse_flag)]
        flags: Vec<(String, bool)>,

        /// Write a session report to this file or directory
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Assemble a program and execute a fixed number of steps
    Step {
        /// Assembly source file
        file: PathBuf,

        /// Number of steps
        #[arg(short = 'n', long = "count", default_value = "1")]
        count: u32,

        /// Assembler flag as NAME=true|false (repeatable)
        #[arg(long = "flag", value_parser = parse_flag)]
        flags: Vec<(String, bool)>,

        /// Write a session report to this file or directory
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Interactive debugger session
    Repl {
        /// Assembly source file
        file: PathBuf,

        /// Breakpoint line (repeatable)
        #[arg(short = 'b', long = "break")]
        breakpoints: Vec<Line>,

        /// Assembler flag as NAME=true|false (repeatable)
        #[arg(long = "flag", value_parser = parse_flag)]
        flags: Vec<(String, bool)>,
    },

    /// Print the effective configuration as TOML
    Config,
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with provided arguments
pub async fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli).await
}

async fn run_cli_with_args(cli: Cli) -> Result<()> {
    // Loaded once, before any command, so config errors show immediately;
    // the session reuses it
    let config = Config::builder()
        .service_url(cli.service_url.clone())
        .config_path(cli.config.clone())
        .build()?;
    init_tracing(&config.logging.filter);

    let builder = || InitBuilder::new().config(config.clone());
    let with_flags = |builder: InitBuilder, flags: &[(String, bool)]| {
        flags
            .iter()
            .fold(builder, |builder, (name, enabled)| builder.flag(name.clone(), *enabled))
    };

    match &cli.command {
        Commands::Run {
            file,
            breakpoints,
            until,
            speed,
            flags,
            report,
        } => {
            let app = with_flags(builder().source_file(file)?, flags.as_slice())
                .breakpoints(breakpoints.iter().copied())
                .speed(*speed)
                .init()
                .await?;
            with_printer(app, |session| async move {
                expect_done(session.assemble().await?)?;
                let outcome = match until {
                    Some(line) => session.run_to_cursor(*line).await?,
                    None => session.run().await?,
                };
                let result = finish(&outcome);
                print_position(&session).await?;
                write_report(&session, report.as_ref()).await?;
                result
            })
            .await?;
        }

        Commands::Step {
            file,
            count,
            flags,
            report,
        } => {
            let app = with_flags(builder().source_file(file)?, flags.as_slice())
                .init()
                .await?;
            with_printer(app, |session| async move {
                expect_done(session.assemble().await?)?;
                for _ in 0..*count {
                    expect_done(session.step().await?)?;
                    if session.snapshot().await?.state.completed {
                        break;
                    }
                }
                print_position(&session).await?;
                write_report(&session, report.as_ref()).await
            })
            .await?;
        }

        Commands::Repl {
            file,
            breakpoints,
            flags,
        } => {
            let flags: FlagConfiguration = flags.iter().cloned().collect();
            let app = builder()
                .source_file(file)?
                .flags(flags.clone())
                .breakpoints(breakpoints.iter().copied())
                .init()
                .await?;
            let file = file.clone();
            with_printer(app, |session| repl(session, file, flags)).await?;
        }

        Commands::Config => {
            print!("{}", config.to_toml().context("Failed to render configuration")?);
        }
    }

    Ok(())
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    // Already installed when the CLI is driven more than once in a process
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn parse_flag(text: &str) -> Result<(String, bool), String> {
    let (name, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=true|false, got '{}'", text))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("flag name must not be empty".to_string());
    }
    Ok((name.to_string(), parse_switch(value)?))
}

fn parse_switch(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "1" | "yes" => Ok(true),
        "false" | "off" | "0" | "no" => Ok(false),
        other => Err(format!("expected true or false, got '{}'", other)),
    }
}

/* ===================== Output ===================== */

/// Print console lines while `body` drives the session, then shut down
async fn with_printer<F, Fut>(app: Application, body: F) -> Result<()>
where
    F: FnOnce(SessionHandle) -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let printer = spawn_printer(app.session().subscribe());
    let result = body(app.session().clone()).await;

    app.shutdown().await;
    drop(app);
    let _ = printer.await;
    result
}

fn spawn_printer(mut rx: broadcast::Receiver<SessionEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(SessionEvent::Console(line)) => println!("{}", format_console(&line)),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "console output lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn format_console(line: &ConsoleLine) -> String {
    let tag = match line.level {
        ConsoleLevel::Info => "info",
        ConsoleLevel::Warn => "warn",
        ConsoleLevel::Error => "error",
    };
    format!("[{:>5}] {}", tag, line.text)
}

fn expect_done(outcome: Outcome) -> Result<()> {
    match outcome {
        Outcome::Done | Outcome::Halted(_) => Ok(()),
        other => bail!("{}", other),
    }
}

/// Faulted or rejected runs fail the command
fn finish(outcome: &Outcome) -> Result<()> {
    println!("Run {}", outcome);
    match outcome {
        Outcome::Faulted(_) | Outcome::Rejected(_) => bail!("{}", outcome),
        _ => Ok(()),
    }
}

async fn print_position(session: &SessionHandle) -> Result<()> {
    let snapshot = session.snapshot().await?;
    let line = |line: Option<Line>| line.map_or_else(|| "-".to_string(), |l| l.to_string());

    println!("Status: {}", snapshot.status.text);
    println!(
        "Phase: {:?} | active {} | next {} | error {}",
        snapshot.phase,
        line(snapshot.state.active_line),
        line(snapshot.state.next_line),
        line(snapshot.state.error_line)
    );
    if let Some(text) = &snapshot.next_source {
        println!("Next: {}", text);
    }
    let breakpoints: BreakpointSet = snapshot.breakpoints.iter().copied().collect();
    println!("Breakpoints: {}", breakpoints.summary());
    Ok(())
}

async fn write_report(session: &SessionHandle, target: Option<&PathBuf>) -> Result<()> {
    let Some(target) = target else {
        return Ok(());
    };
    let report = session.report().await?;
    let path = report.write_to(target)?;
    println!("Report written to {}", path.display());
    Ok(())
}

/* ===================== REPL ===================== */

#[derive(Debug, Clone, PartialEq, Eq)]
enum ReplCommand {
    Assemble,
    Step,
    Run,
    Until(Line),
    Pause,
    Stop,
    Reset,
    Break(Line),
    Clear,
    Mem(String),
    Speed(u8),
    Flag(String, bool),
    Reload,
    Status,
    Report(Option<PathBuf>),
    Help,
    Quit,
}

const REPL_HELP: &str = "\
commands:
  assemble            assemble the loaded file
  step                execute one instruction
  run                 run until a breakpoint or the end
  until N             run to line N
  pause | stop        halt a run (stop also rewinds)
  reset               clear the simulator and breakpoints
  break N             toggle a breakpoint
  clear               remove all breakpoints
  mem SPEC            edit memory, e.g. 30=FF or 40:4F=00
  speed N             run speed 1..10
  flag NAME on|off    set an assembler flag
  reload              re-read the source file
  status              show the session position
  report [PATH]       write a session report
  quit";

fn parse_repl_command(input: &str) -> Result<Option<ReplCommand>, String> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }

    let (word, rest) = match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (input, ""),
    };

    let line_arg = |what: &str| -> Result<Line, String> {
        rest.parse::<Line>()
            .ok()
            .filter(|line| *line >= 1)
            .ok_or_else(|| format!("{} needs a line number", what))
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "assemble" | "a" => ReplCommand::Assemble,
        "step" | "s" => ReplCommand::Step,
        "run" | "r" => ReplCommand::Run,
        "until" | "u" => ReplCommand::Until(line_arg("until")?),
        "pause" | "p" => ReplCommand::Pause,
        "stop" => ReplCommand::Stop,
        "reset" => ReplCommand::Reset,
        "break" | "b" => ReplCommand::Break(line_arg("break")?),
        "clear" => ReplCommand::Clear,
        "mem" | "m" => {
            if rest.is_empty() {
                return Err("mem needs an edit such as 30=FF".to_string());
            }
            ReplCommand::Mem(rest.to_string())
        }
        "speed" => ReplCommand::Speed(
            rest.parse()
                .map_err(|_| "speed needs a number from 1 to 10".to_string())?,
        ),
        "flag" => {
            let (name, value) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| "flag needs NAME on|off".to_string())?;
            ReplCommand::Flag(name.to_string(), parse_switch(value)?)
        }
        "reload" => ReplCommand::Reload,
        "status" | "st" => ReplCommand::Status,
        "report" => ReplCommand::Report((!rest.is_empty()).then(|| PathBuf::from(rest))),
        "help" | "?" => ReplCommand::Help,
        "quit" | "exit" | "q" => ReplCommand::Quit,
        other => return Err(format!("unknown command '{}', try 'help'", other)),
    };
    Ok(Some(command))
}

async fn repl(session: SessionHandle, file: PathBuf, mut flags: FlagConfiguration) -> Result<()> {
    println!("{}", REPL_HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut run_task: Option<JoinHandle<()>> = None;

    while let Some(input) = lines.next_line().await? {
        let command = match parse_repl_command(&input) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                eprintln!("{}", message);
                continue;
            }
        };

        let outcome = match command {
            ReplCommand::Quit => break,
            ReplCommand::Help => {
                println!("{}", REPL_HELP);
                continue;
            }
            ReplCommand::Status => {
                print_position(&session).await?;
                continue;
            }
            ReplCommand::Report(path) => {
                let target = path.unwrap_or_else(|| PathBuf::from("."));
                write_report(&session, Some(&target)).await?;
                continue;
            }
            ReplCommand::Run => {
                run_task = Some(spawn_run(session.clone(), None));
                continue;
            }
            ReplCommand::Until(line) => {
                run_task = Some(spawn_run(session.clone(), Some(line)));
                continue;
            }
            ReplCommand::Reload => {
                let text = tokio::fs::read_to_string(&file)
                    .await
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                session.update_source(text).await?
            }
            ReplCommand::Flag(name, enabled) => {
                flags.insert(name, enabled);
                session.set_flags(flags.clone()).await?
            }
            ReplCommand::Assemble => session.assemble().await?,
            ReplCommand::Step => session.step().await?,
            ReplCommand::Pause => session.pause().await?,
            ReplCommand::Stop => session.stop().await?,
            ReplCommand::Reset => session.reset().await?,
            ReplCommand::Break(line) => session.toggle_breakpoint(line).await?,
            ReplCommand::Clear => session.clear_breakpoints().await?,
            ReplCommand::Mem(input) => session.edit_memory(input).await?,
            ReplCommand::Speed(speed) => session.set_speed(speed).await?,
        };

        if outcome != Outcome::Done {
            println!("{}", outcome);
        }
    }

    if let Some(task) = run_task {
        let _ = session.pause().await;
        let _ = task.await;
    }
    Ok(())
}

/// Runs resolve only when they halt, so they report from a task
fn spawn_run(session: SessionHandle, target: Option<Line>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let outcome = match target {
            Some(line) => session.run_to_cursor(line).await,
            None => session.run().await,
        };
        match outcome {
            Ok(outcome) => println!("run {}", outcome),
            Err(err) => eprintln!("run: {}", err),
        }
    })
}
