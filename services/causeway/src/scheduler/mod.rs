pub mod cancellation;
pub mod dispatch;
pub mod events;
pub mod scoring;

pub use cancellation::{Budget, CancellationToken};
pub use dispatch::{dispatch, resolve_worker_count, DispatchOptions, TaskOutcome, TaskReport};
pub use events::{EventSender, Stage, StageEvent, TaskStatus};
