mod app;
mod supervisors;
mod ui;

use std::fs::File;
use std::io::{self, BufRead, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::sync::mpsc;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use termdeck_core::config::{ConfigError, EngineConfig, WorkspaceConfig};
use termdeck_core::content::ContentProcessor;
use termdeck_core::port::sniff_port;
use termdeck_core::supervisor::Supervisor;
use termdeck_core::{EventBus, TerminalHandle, Workspace, wire};

use app::{App, Recorder};
use supervisors::{DEMO_CONFIG, DemoSupervisor, LocalSupervisor};

#[derive(Parser)]
#[command(name = "termdeck")]
#[command(about = "Run project processes side by side in splittable terminal panes", long_about = None)]
struct Cli {
    /// Config file; default is to search termdeck.yaml upwards from the current directory
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Where tracing output goes (RUST_LOG filters it)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive pane view (default)
    Tui {
        /// Use the built-in demo processes instead of a config file
        #[arg(long)]
        demo: bool,
        /// Append every process event to this file as JSON lines
        #[arg(long)]
        record: Option<PathBuf>,
    },
    /// Validate the config and list processes with their resolved commands
    Check,
    /// Print the port a line of output announces, if any
    Sniff { text: Vec<String> },
    /// Print the markup a chunk of output renders to; reads stdin without arguments
    Render { text: Vec<String> },
    /// Fold a recorded event file into a fresh workspace and print the result
    Replay {
        file: PathBuf,
        /// Print the raw registry as JSON
        #[arg(long)]
        json: bool,
    },
}

/// File logging, so the TUI screen stays clean. `RUST_LOG` overrides the
/// default `info` level.
fn init_tracing(path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("cannot create log file {}", path.display()))?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(Arc::new(file)).with_ansi(false))
        .with(filter)
        .init();
    Ok(())
}

fn default_log_file() -> PathBuf {
    std::env::temp_dir().join("termdeck.log")
}

fn load_config(explicit: Option<&Path>) -> Result<Option<(PathBuf, WorkspaceConfig)>> {
    if let Some(path) = explicit {
        let config = WorkspaceConfig::load(path).with_context(|| format!("loading {}", path.display()))?;
        return Ok(Some((path.to_path_buf(), config)));
    }
    let cwd = std::env::current_dir()?;
    match WorkspaceConfig::discover(&cwd) {
        Ok(found) => Ok(Some(found)),
        Err(ConfigError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// --- Terminal setup/teardown ---
fn setup_terminal() -> io::Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_file = cli.log_file.clone().unwrap_or_else(default_log_file);

    match cli.command {
        Some(Commands::Check) => run_check(cli.config.as_deref()),
        Some(Commands::Sniff { text }) => run_sniff(&text.join(" ")),
        Some(Commands::Render { text }) => run_render(&text),
        Some(Commands::Replay { file, json }) => run_replay(cli.config.as_deref(), &file, json),
        Some(Commands::Tui { demo, record }) => {
            init_tracing(&log_file)?;
            run_tui(cli.config.as_deref(), demo, record.as_deref()).await
        }
        None => {
            init_tracing(&log_file)?;
            run_tui(cli.config.as_deref(), false, None).await
        }
    }
}

fn run_check(explicit: Option<&Path>) -> Result<()> {
    let Some((path, config)) = load_config(explicit)? else {
        bail!("no termdeck.yaml found (set TERMDECK_CONFIG or pass --config)");
    };
    println!("{}: ok", path.display());
    for handle in config.handles() {
        let request = config.start_request(&handle, None, None)?;
        let mut line = format!("  {:<28} {}", handle.to_string(), request.command);
        if let Some(mode) = &request.mode {
            line.push_str(&format!("  [mode {mode}]"));
        }
        if let Some(preset) = &request.arg_preset {
            line.push_str(&format!("  [preset {preset}]"));
        }
        println!("{line}");
    }
    let autostart = config.autostart();
    if !autostart.is_empty() {
        let names: Vec<String> = autostart.iter().map(ToString::to_string).collect();
        println!("autostart: {}", names.join(", "));
    }
    Ok(())
}

fn run_sniff(text: &str) -> Result<()> {
    match sniff_port(text) {
        Some(port) => println!("{port}"),
        None => bail!("no port found"),
    }
    Ok(())
}

fn run_render(args: &[String]) -> Result<()> {
    let mut processor = ContentProcessor::new();
    if args.is_empty() {
        let mut input = String::new();
        io::stdin().lock().read_to_string(&mut input)?;
        for line in input.lines() {
            println!("{}", processor.process(line));
        }
    } else {
        println!("{}", processor.process(&args.join(" ")));
    }
    Ok(())
}

/// Engine tuning for replay. An explicit `--config` must load; a broken
/// discovered one only costs the tuning.
fn replay_engine(explicit: Option<&Path>) -> Result<EngineConfig> {
    let loaded = match explicit {
        Some(path) => load_config(Some(path))?,
        None => load_config(None).unwrap_or_else(|e| {
            eprintln!("ignoring config: {e:#}");
            None
        }),
    };
    Ok(loaded.map(|(_, c)| c.engine).unwrap_or_default())
}

fn run_replay(explicit: Option<&Path>, file: &Path, json: bool) -> Result<()> {
    let reader = io::BufReader::new(File::open(file).with_context(|| format!("opening {}", file.display()))?);
    let engine = replay_engine(explicit)?;

    let mut workspace = Workspace::new(&engine);
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match wire::decode_line(&line) {
            Ok(event) => workspace.apply_event(event),
            Err(e) => eprintln!("line {}: {e}", i + 1),
        }
    }

    if json {
        let records: std::collections::BTreeMap<String, _> = workspace
            .registry()
            .iter()
            .map(|(h, r)| (h.to_string(), r))
            .collect();
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    for (handle, record) in workspace.registry().iter() {
        let port = record.detected_port.map(|p| format!(" :{p}")).unwrap_or_default();
        let exit = record
            .last_exit_code
            .map(|c| format!(" exit {c}"))
            .unwrap_or_default();
        println!(
            "{} {:<28} {:<9} {} lines{port}{exit}",
            record.status.icon(),
            handle.to_string(),
            record.status.label(),
            record.logs.len()
        );
    }
    for pane in workspace.panes() {
        let tabs: Vec<String> = pane.terminals.iter().map(TerminalHandle::to_string).collect();
        println!("{} {:>5.1}%  {}", pane.id, pane.width, tabs.join(" "));
    }
    Ok(())
}

async fn run_tui(explicit: Option<&Path>, demo: bool, record: Option<&Path>) -> Result<()> {
    let bus = EventBus::default();

    let (config, supervisor): (WorkspaceConfig, Arc<dyn Supervisor>) = match load_config(explicit)? {
        Some((path, config)) if !demo => {
            tracing::info!(path = %path.display(), "loaded config");
            (config, Arc::new(LocalSupervisor::new(bus.clone())))
        }
        _ => {
            tracing::info!("no config found, running demo processes");
            (
                WorkspaceConfig::from_str(DEMO_CONFIG)?,
                Arc::new(DemoSupervisor::new(bus.clone())),
            )
        }
    };

    let recorder = record.map(Recorder::create).transpose()?;
    let events = bus.subscribe();
    let (outcome_tx, outcome_rx) = mpsc::channel(64);
    let (input_tx, input_rx) = mpsc::channel(256);

    let autostart = config.autostart();
    let mut app = App::new(config, supervisor, outcome_tx, recorder);
    for handle in &autostart {
        app.start(handle);
    }

    // panics inside the render boundary are logged, not printed over the screen
    std::panic::set_hook(Box::new(|info| {
        tracing::error!(%info, "panic");
    }));

    let mut terminal = setup_terminal()?;
    app::spawn_input_reader(input_tx);
    let res = app::run(&mut terminal, &mut app, events, outcome_rx, input_rx).await;
    restore_terminal(&mut terminal)?;
    let _ = std::panic::take_hook();
    res?;
    Ok(())
}
