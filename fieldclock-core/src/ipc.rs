//! Inter-process communication between fieldclock and fieldclockctl
//!
//! We use Unix domain sockets for local IPC. Every message is a single JSON
//! value terminated by a newline.

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::IpcError;
use crate::tracker::{SessionRecord, TimerEvent, TimerStatus};

pub const DEFAULT_SOCKET_PATH: &str = "/tmp/fieldclock.sock";

/// Which tracker a command addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    Day,
    Task(u32),
}

/// Commands that fieldclockctl can send to fieldclock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    Start(Target),
    Pause(Target),
    Resume(Target),
    Finish(Target),
    Status,
    AddTask { description: String },
    ListTasks,
    Sessions(Target),
    History,
}

impl Command {
    pub fn for_event(event: TimerEvent, target: Target) -> Self {
        match event {
            TimerEvent::Start => Command::Start(target),
            TimerEvent::Pause => Command::Pause(target),
            TimerEvent::Resume => Command::Resume(target),
            TimerEvent::Finish => Command::Finish(target),
        }
    }

    /// The tracker event carried by this command, if it is a mutation.
    pub fn timer_event(&self) -> Option<(TimerEvent, Target)> {
        match *self {
            Command::Start(target) => Some((TimerEvent::Start, target)),
            Command::Pause(target) => Some((TimerEvent::Pause, target)),
            Command::Resume(target) => Some((TimerEvent::Resume, target)),
            Command::Finish(target) => Some((TimerEvent::Finish, target)),
            _ => None,
        }
    }
}

/// Responses from fieldclock back to fieldclockctl
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    Ok,
    Status(StatusReport),
    Tasks(Vec<TaskSummary>),
    Sessions(Vec<SessionRecord>),
    History(Vec<DaySummary>),
    Error(String),
}

/// Snapshot of the current work day. Every duration was computed at the
/// same instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub date: NaiveDate,
    pub status: TimerStatus,
    pub elapsed: u64, // seconds, day tracker only
    pub total: u64,   // seconds, day plus all tasks
    pub target: u64,  // seconds
    pub running_tasks: usize,
    pub available: Vec<TimerEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: u32,
    pub description: String,
    pub status: TimerStatus,
    pub elapsed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub status: TimerStatus,
    pub elapsed: u64,
    pub total: u64,
    pub task_count: usize,
}

pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), IpcError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut payload = serde_json::to_vec(message)?;
    payload.push(b'\n');
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_message<R, T>(reader: &mut R) -> Result<T, IpcError>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Err(IpcError::Closed);
    }
    Ok(serde_json::from_str(line.trim_end())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn message_framing_is_newline_delimited() {
        let mut buf = Vec::new();
        write_message(&mut buf, &Command::Pause(Target::Task(3)))
            .await
            .unwrap();
        write_message(&mut buf, &Command::Status).await.unwrap();
        assert_eq!(buf.iter().filter(|b| **b == b'\n').count(), 2);

        let mut reader = BufReader::new(buf.as_slice());
        let first: Command = read_message(&mut reader).await.unwrap();
        let second: Command = read_message(&mut reader).await.unwrap();
        assert_eq!(first, Command::Pause(Target::Task(3)));
        assert_eq!(second, Command::Status);
        assert!(matches!(
            read_message::<_, Command>(&mut reader).await,
            Err(IpcError::Closed)
        ));
    }

    #[test]
    fn timer_commands_map_to_events() {
        for event in TimerEvent::ALL {
            let command = Command::for_event(event, Target::Day);
            assert_eq!(command.timer_event(), Some((event, Target::Day)));
        }
        assert_eq!(Command::ListTasks.timer_event(), None);
    }
}
