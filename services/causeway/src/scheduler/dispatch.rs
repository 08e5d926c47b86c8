//! Bounded fan-out shared by every pipeline stage.
//!
//! Tasks take a permit from a semaphore in submission order, so the pool never
//! runs more than `worker_count` of them at once. The permit also travels in the
//! task's [`Budget`]: blocking work that outlives its timeout keeps the slot
//! until it actually returns. Each task runs under a hard
//! timeout, and the batch may run under a global deadline. Whatever happens to a
//! task, its outcome lands in the slot of its submission index, so callers see
//! results in submission order no matter which task finished first.

use futures::FutureExt;
use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::cancellation::{Budget, CancellationToken};
use super::events::{emit, EventSender, Stage, StageEvent, TaskStatus};

pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(10);

/// `0` means one worker per available CPU.
pub fn resolve_worker_count(requested: usize) -> usize {
    if requested > 0 {
        return requested;
    }
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub stage: Stage,
    pub worker_count: usize,
    /// Hard limit; the task future is dropped once it passes.
    pub task_timeout: Duration,
    /// Soft limit handed to the task through its [`Budget`].
    pub task_budget: Option<Duration>,
    /// Deadline for the whole batch. Unfinished tasks are abandoned when it passes.
    pub global_budget: Option<Duration>,
    pub keepalive: Duration,
    pub events: Option<EventSender>,
}

impl DispatchOptions {
    pub fn new(stage: Stage, task_timeout: Duration) -> Self {
        Self {
            stage,
            worker_count: 0,
            task_timeout,
            task_budget: None,
            global_budget: None,
            keepalive: DEFAULT_KEEPALIVE,
            events: None,
        }
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_task_budget(mut self, budget: Duration) -> Self {
        self.task_budget = Some(budget);
        self
    }

    pub fn with_global_budget(mut self, budget: Option<Duration>) -> Self {
        self.global_budget = budget;
        self
    }

    pub fn with_keepalive(mut self, keepalive: Duration) -> Self {
        self.keepalive = keepalive;
        self
    }

    pub fn with_events(mut self, events: Option<EventSender>) -> Self {
        self.events = events;
        self
    }
}

#[derive(Debug)]
pub enum TaskOutcome<T> {
    Completed(T),
    Failed(String),
    TimedOut,
    Panicked(String),
    /// Never started, or still running when the global deadline passed.
    Abandoned,
}

impl<T> TaskOutcome<T> {
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskOutcome::Completed(_) => TaskStatus::Completed,
            TaskOutcome::Failed(_) => TaskStatus::Failed,
            TaskOutcome::TimedOut => TaskStatus::TimedOut,
            TaskOutcome::Panicked(_) => TaskStatus::Panicked,
            TaskOutcome::Abandoned => TaskStatus::Abandoned,
        }
    }

    pub fn completed(self) -> Option<T> {
        match self {
            TaskOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct TaskReport<T> {
    pub name: String,
    pub outcome: TaskOutcome<T>,
    /// Wall time of the task; `None` when it never finished.
    pub runtime: Option<Duration>,
}

type Finished<T> = (usize, TaskOutcome<T>, Duration);

/// Runs `tasks` on a bounded pool and returns one report per task, in
/// submission order.
pub async fn dispatch<T, E, F, Fut>(options: &DispatchOptions, tasks: Vec<(String, F)>) -> Vec<TaskReport<T>>
where
    F: FnOnce(Budget) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Display + Send + 'static,
{
    let stage = options.stage;
    let total = tasks.len();
    let workers = resolve_worker_count(options.worker_count);
    let names: Vec<String> = tasks.iter().map(|(name, _)| name.clone()).collect();

    let semaphore = Arc::new(Semaphore::new(workers));
    let started = tokio::time::Instant::now();
    let deadline = options.global_budget.map(|budget| started + budget);
    let keepalive = options.keepalive.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(started + keepalive, keepalive);

    let mut slots: Vec<Option<(TaskOutcome<T>, Duration)>> = (0..total).map(|_| None).collect();
    let mut tokens: Vec<CancellationToken> = Vec::with_capacity(total);
    let mut running: JoinSet<Finished<T>> = JoinSet::new();
    let mut queue = tasks.into_iter().enumerate().peekable();
    let mut completed = 0usize;

    info!("Dispatching {} {} tasks on {} workers", total, stage, workers);

    loop {
        let submitting = queue.peek().is_some();
        if !submitting && running.is_empty() {
            break;
        }

        tokio::select! {
            biased;

            _ = wait_until(deadline) => {
                warn!(
                    "{} budget exhausted: {} of {} tasks completed, abandoning the rest",
                    stage, completed, total
                );
                break;
            }

            Some(joined) = running.join_next() => {
                match joined {
                    Ok((index, outcome, runtime)) => {
                        log_outcome(stage, &names[index], &outcome, runtime);
                        emit(
                            options.events.as_ref(),
                            StageEvent::TaskFinished {
                                stage,
                                task: names[index].clone(),
                                status: outcome.status(),
                            },
                        );
                        completed += 1;
                        slots[index] = Some((outcome, runtime));
                    }
                    Err(e) => warn!("{} task could not be joined: {}", stage, e),
                }
            }

            permit = semaphore.clone().acquire_owned(), if submitting => {
                let Ok(permit) = permit else {
                    break;
                };
                let Some((index, (name, run))) = queue.next() else {
                    continue;
                };

                let permit = Arc::new(permit);
                let token = CancellationToken::new();
                tokens.push(token.clone());
                let budget = Budget::new(options.task_budget, token.clone()).holding(Arc::clone(&permit));
                let hard_timeout = options.task_timeout;

                debug!("Starting {} task {}", stage, name);
                emit(
                    options.events.as_ref(),
                    StageEvent::TaskStarted { stage, task: name },
                );

                running.spawn(async move {
                    let _permit = permit;
                    let begun = Instant::now();
                    let guarded = AssertUnwindSafe(async move { run(budget).await }).catch_unwind();
                    let outcome = match tokio::time::timeout(hard_timeout, guarded).await {
                        Ok(Ok(Ok(value))) => TaskOutcome::Completed(value),
                        Ok(Ok(Err(e))) => TaskOutcome::Failed(e.to_string()),
                        Ok(Err(panic)) => TaskOutcome::Panicked(panic_message(panic)),
                        Err(_) => {
                            token.cancel();
                            TaskOutcome::TimedOut
                        }
                    };
                    (index, outcome, begun.elapsed())
                });
            }

            _ = ticker.tick() => {
                let pending = total - completed;
                info!("{} still running: {} completed, {} pending", stage, completed, pending);
                emit(
                    options.events.as_ref(),
                    StageEvent::KeepAlive { stage, completed, pending },
                );
            }
        }
    }

    for token in &tokens {
        token.cancel();
    }
    running.abort_all();

    emit(
        options.events.as_ref(),
        StageEvent::StageFinished {
            stage,
            completed,
            total,
        },
    );

    names
        .into_iter()
        .zip(slots)
        .map(|(name, slot)| match slot {
            Some((outcome, runtime)) => TaskReport {
                name,
                outcome,
                runtime: Some(runtime),
            },
            None => TaskReport {
                name,
                outcome: TaskOutcome::Abandoned,
                runtime: None,
            },
        })
        .collect()
}

async fn wait_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

fn log_outcome<T>(stage: Stage, name: &str, outcome: &TaskOutcome<T>, runtime: Duration) {
    match outcome {
        TaskOutcome::Completed(_) => {
            info!("{} task {} completed in {:.2}s", stage, name, runtime.as_secs_f64())
        }
        TaskOutcome::Failed(e) => warn!("{} task {} failed: {}", stage, name, e),
        TaskOutcome::TimedOut => warn!(
            "{} task {} timed out after {:.2}s",
            stage,
            name,
            runtime.as_secs_f64()
        ),
        TaskOutcome::Panicked(msg) => error!("{} task {} crashed: {}", stage, name, msg),
        TaskOutcome::Abandoned => {}
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
