//! Unix domain socket server for IPC

use crate::app::App;
use anyhow::{Context, Result};
use chrono::Utc;
use fieldclock_core::ipc::{read_message, write_message};
use fieldclock_core::{Command, Response};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::BufReader;
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info};

/// The work day shared between the TUI loop and IPC clients. Every command
/// runs as one critical section.
pub type SharedApp = Arc<Mutex<App>>;

pub async fn serve(socket_path: &Path, app: SharedApp) -> Result<()> {
    // Remove old socket if it exists
    let _ = std::fs::remove_file(socket_path);

    let listener = UnixListener::bind(socket_path)
        .with_context(|| format!("Failed to bind IPC socket at {:?}", socket_path))?;
    info!(path = ?socket_path, "IPC server listening");

    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let app = app.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, app).await {
                        error!("Error handling client: {:#}", e);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {}", e);
            }
        }
    }
}

async fn handle_client(stream: UnixStream, app: SharedApp) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let command: Command = read_message(&mut reader).await?;
    debug!(?command, "IPC command received");
    let response = dispatch(&app, command);

    write_message(&mut writer, &response).await?;
    Ok(())
}

/// Runs the command under the lock. Never awaits while holding it.
fn dispatch(app: &SharedApp, command: Command) -> Response {
    let now = Utc::now();
    let mut app = app.lock().unwrap_or_else(PoisonError::into_inner);
    app.handle_command(command, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::WorkDay;
    use crate::config::Config;
    use crate::persistence::MemoryRepository;
    use fieldclock_core::{Target, TimerStatus};

    fn shared_app() -> SharedApp {
        let mut config = Config::default();
        config.day.notify = false;
        let repo: MemoryRepository<WorkDay> = MemoryRepository::new();
        let app = App::open(
            config,
            Box::new(repo),
            chrono::Local::now().date_naive(),
            Utc::now(),
        )
        .unwrap();
        Arc::new(Mutex::new(app))
    }

    async fn round_trip(app: &SharedApp, command: Command) -> Response {
        let (client, server) = UnixStream::pair().unwrap();
        let handler = tokio::spawn(handle_client(server, app.clone()));

        let (reader, mut writer) = client.into_split();
        write_message(&mut writer, &command).await.unwrap();
        let response = read_message(&mut BufReader::new(reader)).await.unwrap();
        handler.await.unwrap().unwrap();
        response
    }

    #[tokio::test]
    async fn commands_reach_the_shared_day() {
        let app = shared_app();

        let response = round_trip(
            &app,
            Command::AddTask {
                description: "Replace filter".to_string(),
            },
        )
        .await;
        assert_eq!(response, Response::Ok);
        assert_eq!(round_trip(&app, Command::Start(Target::Task(1))).await, Response::Ok);
        assert_eq!(round_trip(&app, Command::Start(Target::Day)).await, Response::Ok);

        match round_trip(&app, Command::Status).await {
            Response::Status(report) => {
                assert_eq!(report.status, TimerStatus::InProgress);
                assert_eq!(report.running_tasks, 1);
            }
            other => panic!("unexpected response: {:?}", other),
        }

        let guard = app.lock().unwrap();
        assert!(guard.day.tracker.is_running());
        assert!(guard.day.tasks[0].tracker.is_running());
    }

    #[tokio::test]
    async fn rejected_transition_is_reported_not_fatal() {
        let app = shared_app();
        match round_trip(&app, Command::Pause(Target::Day)).await {
            Response::Error(message) => {
                assert_eq!(message, "cannot pause a timer that is not started")
            }
            other => panic!("unexpected response: {:?}", other),
        }
        assert_eq!(round_trip(&app, Command::ListTasks).await, Response::Tasks(vec![]));
    }
}
