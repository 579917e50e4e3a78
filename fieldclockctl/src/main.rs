use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use fieldclock_core::ipc::{read_message, write_message};
use fieldclock_core::{
    format_hms, Command, IpcError, Response, Target, TimerEvent, CONFIG_FILE, DEFAULT_SOCKET_PATH,
};
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::BufReader;
use tokio::net::UnixStream;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fieldclockctl")]
#[command(about = "Control the fieldclock work day timer", long_about = None)]
struct Cli {
    /// Socket of the running fieldclock (defaults to ipc.socket_path in fieldclock.toml)
    #[arg(long, global = true)]
    socket: Option<PathBuf>,
    /// Print the raw JSON response
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the work day or a task
    Start {
        #[arg(short, long)]
        task: Option<u32>,
    },
    /// Pause the work day or a task
    Pause {
        #[arg(short, long)]
        task: Option<u32>,
    },
    /// Resume the work day or a task
    Resume {
        #[arg(short, long)]
        task: Option<u32>,
    },
    /// Finish the work day or a task
    Finish {
        #[arg(short, long)]
        task: Option<u32>,
    },
    /// Get work day status
    Status,
    /// Add a new task
    Task {
        #[arg(short, long)]
        add: Option<String>,
    },
    /// List all tasks
    Tasks,
    /// Show the session log of the work day or a task
    Sessions {
        #[arg(short, long)]
        task: Option<u32>,
    },
    /// Show totals for every stored day
    History,
}

/// The part of fieldclock.toml the ctl cares about.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CtlConfig {
    ipc: IpcSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IpcSection {
    socket_path: Option<PathBuf>,
}

fn socket_from_config(source: &str) -> Result<Option<PathBuf>> {
    let config: CtlConfig =
        toml::from_str(source).context("Failed to parse fieldclock configuration")?;
    Ok(config.ipc.socket_path)
}

fn configured_socket() -> Result<Option<PathBuf>> {
    let Some(proj_dirs) = ProjectDirs::from("com", "fieldclock", "fieldclock") else {
        return Ok(None);
    };
    let path = proj_dirs.config_dir().join(CONFIG_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let source = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file at {:?}", path))?;
    socket_from_config(&source)
        .with_context(|| format!("Failed to parse config file at {:?}", path))
}

/// `--socket` wins, then the config file, then the built-in default.
fn resolve_socket(
    flag: Option<PathBuf>,
    configured: impl FnOnce() -> Result<Option<PathBuf>>,
) -> Result<PathBuf> {
    if let Some(path) = flag {
        return Ok(path);
    }
    Ok(configured()?.unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_PATH)))
}

fn target(task: Option<u32>) -> Target {
    task.map_or(Target::Day, Target::Task)
}

fn to_command(command: Commands) -> Command {
    match command {
        Commands::Start { task } => Command::for_event(TimerEvent::Start, target(task)),
        Commands::Pause { task } => Command::for_event(TimerEvent::Pause, target(task)),
        Commands::Resume { task } => Command::for_event(TimerEvent::Resume, target(task)),
        Commands::Finish { task } => Command::for_event(TimerEvent::Finish, target(task)),
        Commands::Status => Command::Status,
        Commands::Task { add: Some(desc) } => Command::AddTask { description: desc },
        Commands::Task { add: None } => Command::ListTasks,
        Commands::Tasks => Command::ListTasks,
        Commands::Sessions { task } => Command::Sessions(target(task)),
        Commands::History => Command::History,
    }
}

/// Human-readable rendering. Errors are rendered by the caller.
fn render(response: &Response) -> String {
    match response {
        Response::Ok => "OK".to_string(),
        Response::Status(status) => {
            let mut out = format!(
                "Date: {}\nState: {}\nDay: {}\nTotal: {} / {}\nRunning tasks: {}",
                status.date,
                status.status,
                format_hms(status.elapsed),
                format_hms(status.total),
                format_hms(status.target),
                status.running_tasks
            );
            if !status.available.is_empty() {
                let actions: Vec<String> = status.available.iter().map(|e| e.to_string()).collect();
                out.push_str(&format!("\nAvailable: {}", actions.join(", ")));
            }
            out
        }
        Response::Tasks(tasks) if tasks.is_empty() => "No tasks".to_string(),
        Response::Tasks(tasks) => tasks
            .iter()
            .map(|task| {
                format!(
                    "{:>3}  {}  {:<12} {}",
                    task.id,
                    format_hms(task.elapsed),
                    task.status.to_string(),
                    task.description
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Response::Sessions(sessions) if sessions.is_empty() => "No sessions".to_string(),
        Response::Sessions(sessions) => sessions
            .iter()
            .enumerate()
            .map(|(i, s)| {
                format!(
                    "{:>3}. {} - {}  {}",
                    i + 1,
                    s.start_time.with_timezone(&Local).format("%H:%M:%S"),
                    s.end_time.with_timezone(&Local).format("%H:%M:%S"),
                    format_hms(s.duration)
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Response::History(days) => days
            .iter()
            .map(|day| {
                format!(
                    "{}  day {}  total {}  {:<12} {} task(s)",
                    day.date,
                    format_hms(day.elapsed),
                    format_hms(day.total),
                    day.status.to_string(),
                    day.task_count
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Response::Error(e) => format!("Error: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("FIELDCLOCK_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let socket = resolve_socket(cli.socket, configured_socket)?;
    let command = to_command(cli.command);

    // Send command and get response
    let response = send_command(&socket, &command)
        .await
        .with_context(|| format!("Failed to talk to fieldclock at {:?}", socket))?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else if let Response::Error(e) = &response {
        eprintln!("Error: {}", e);
    } else {
        println!("{}", render(&response));
    }

    if matches!(response, Response::Error(_)) {
        std::process::exit(1);
    }
    Ok(())
}

async fn send_command(socket: &Path, cmd: &Command) -> Result<Response, IpcError> {
    debug!(?cmd, path = ?socket, "sending command");
    let stream = UnixStream::connect(socket).await.map_err(|e| match e.kind() {
        ErrorKind::ConnectionRefused | ErrorKind::NotFound => IpcError::ConnectionRefused,
        _ => IpcError::Io(e),
    })?;
    let (reader, mut writer) = stream.into_split();

    write_message(&mut writer, cmd).await?;
    read_message(&mut BufReader::new(reader)).await
}
