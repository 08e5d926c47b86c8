use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Discovery,
    Estimation,
    Refutation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Discovery => "discovery",
            Stage::Estimation => "estimation",
            Stage::Refutation => "refutation",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Completed,
    Failed,
    TimedOut,
    Panicked,
    Abandoned,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::TimedOut => "timed out",
            TaskStatus::Panicked => "panicked",
            TaskStatus::Abandoned => "abandoned",
        };
        f.write_str(name)
    }
}

/// Progress notifications for callers that need a "still running" signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StageEvent {
    TaskStarted {
        stage: Stage,
        task: String,
    },
    TaskFinished {
        stage: Stage,
        task: String,
        status: TaskStatus,
    },
    KeepAlive {
        stage: Stage,
        completed: usize,
        pending: usize,
    },
    StageFinished {
        stage: Stage,
        completed: usize,
        total: usize,
    },
}

pub type EventSender = UnboundedSender<StageEvent>;

/// Sends to an optional channel; a dropped receiver is not an error.
pub(crate) fn emit(sender: Option<&EventSender>, event: StageEvent) {
    if let Some(tx) = sender {
        let _ = tx.send(event);
    }
}
