//! Selection confirmation dispatcher for pickerflow.
//!
//! Once the user has chosen remote files or folders, this crate turns the
//! choice into per-item requests (shareable links, copies into the upload
//! location, task polling), runs them with a bounded number in flight,
//! aggregates the outcomes and reports exactly once to the host through an
//! mpsc channel. Results that arrive after a cancellation are dropped.

mod api;
mod cancel;
mod copy;
mod dispatcher;
mod launcher;
mod link;
mod operation;
mod poll;
mod progress;
mod save;
mod session;

pub use api::{ApiError, ApiResult, BoxFuture, CopyRequest, HttpApi, PickerApi};
pub use cancel::{CancellationMark, SessionStamp};
pub use copy::{CopyDispatcher, CopyError};
pub use dispatcher::{AutoPrompter, ConfirmOutcome, Dispatcher, Prompter};
pub use launcher::{LaunchStats, ThrottledLauncher};
pub use link::LinkCreator;
pub use operation::{ItemOutcome, OperationKind, PendingOperation};
pub use poll::{FixedIntervalPoller, TaskPoller, TaskStatus};
pub use progress::{SessionCounters, SessionPhase};
pub use save::{SaveFile, SaveOutcome, SaveRequest, TargetFolder};
pub use session::{build_plan, ConfirmationSession, Plan};

use std::time::Duration;

/// Default channel buffer size for host messages.
pub const HOST_CHANNEL_SIZE: usize = 100;

/// Maximum number of item requests in flight at once.
pub const CONCURRENCY_LIMIT: usize = 4;

/// Delay before each task status request.
pub const TASK_POLL_INTERVAL: Duration = Duration::from_millis(3000);

/// Header asking the service to process a folder copy asynchronously.
pub const ASYNC_HEADER: &str = "X-Kloudless-Async";
