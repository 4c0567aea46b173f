//! High-level dispatcher owning the cancellation mark and host channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pickerflow_core::{
    Action, Credentials, HostMessage, PickerConfig, Selection, SelectionOrigin, ValidationError,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::PickerApi;
use crate::cancel::{CancellationMark, SessionStamp};
use crate::copy::CopyDispatcher;
use crate::link::LinkCreator;
use crate::poll::{FixedIntervalPoller, TaskPoller};
use crate::save::{SaveOutcome, SaveRequest, SaveSession};
use crate::session::{build_plan, plan_kinds, ConfirmationSession, ItemRunner, Plan};
use crate::HOST_CHANNEL_SIZE;

/// Blocking yes/no questions put to the user.
pub trait Prompter: Send + Sync {
    /// Ask whether a whole folder should be copied.
    fn confirm_folder_copy(&self, folder: &Selection) -> bool;

    /// Ask whether existing files named `name` should be overwritten.
    fn confirm_overwrite(&self, name: &str) -> bool;
}

/// A [`Prompter`] that always gives the same answer.
#[derive(Debug, Clone, Copy)]
pub struct AutoPrompter {
    pub answer: bool,
}

impl AutoPrompter {
    /// Answer yes to everything.
    pub fn yes() -> Self {
        Self { answer: true }
    }

    /// Answer no to everything.
    pub fn no() -> Self {
        Self { answer: false }
    }
}

impl Prompter for AutoPrompter {
    fn confirm_folder_copy(&self, _folder: &Selection) -> bool {
        self.answer
    }

    fn confirm_overwrite(&self, _name: &str) -> bool {
        self.answer
    }
}

/// How a call to [`Dispatcher::confirm`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// Another confirmation is still running; nothing was done.
    Busy,
    /// Refused before any request; an error message was sent.
    Rejected(ValidationError),
    /// The user declined the folder copy; nothing was reported.
    Declined,
    /// A final report with this action was sent.
    Reported(Action),
    /// The user cancelled before the session could report.
    Suppressed,
}

/// Entry point for confirmations, saves and cancels.
///
/// Owns the cancellation mark: every session is stamped against it when it
/// starts, and [`Dispatcher::cancel`] moves it forward.
pub struct Dispatcher {
    config: Arc<PickerConfig>,
    api: Arc<dyn PickerApi>,
    poller: Arc<dyn TaskPoller>,
    prompter: Arc<dyn Prompter>,
    mark: CancellationMark,
    /// Stamp + 1 of the confirmation in progress, 0 when idle.
    active: AtomicU64,
    host: mpsc::Sender<HostMessage>,
}

impl Dispatcher {
    /// Create a dispatcher and the receiver for its host messages.
    pub fn new(
        config: Arc<PickerConfig>,
        api: Arc<dyn PickerApi>,
        prompter: Arc<dyn Prompter>,
    ) -> (Self, mpsc::Receiver<HostMessage>) {
        let (tx, rx) = mpsc::channel(HOST_CHANNEL_SIZE);
        let interval = Duration::from_millis(config.poll_interval_ms);
        let poller = Arc::new(FixedIntervalPoller::with_interval(Arc::clone(&api), interval));

        let dispatcher = Self {
            config,
            api,
            poller,
            prompter,
            mark: CancellationMark::new(),
            active: AtomicU64::new(0),
            host: tx,
        };
        (dispatcher, rx)
    }

    /// Replace the task poller.
    pub fn with_poller(mut self, poller: Arc<dyn TaskPoller>) -> Self {
        self.poller = poller;
        self
    }

    /// The cancellation mark sessions are stamped against.
    pub fn cancellation_mark(&self) -> &CancellationMark {
        &self.mark
    }

    /// The picker configuration.
    pub fn config(&self) -> &PickerConfig {
        &self.config
    }

    /// Check if a confirmation is running and has not been cancelled.
    pub fn is_processing(&self) -> bool {
        let active = self.active.load(Ordering::Acquire);
        active != 0 && !self.mark.is_cancelled(SessionStamp(active - 1))
    }

    /// Cancel the running confirmation, if any, and tell the host.
    ///
    /// Requests already in flight are not aborted; their results are dropped.
    pub async fn cancel(&self) {
        let stamp = self.mark.cancel();
        info!(generation = stamp.0, "Cancel requested");
        self.send(HostMessage::new(self.exp_id(), Action::Cancel, None))
            .await;
    }

    /// Confirm items the user picked in the file list.
    pub async fn confirm(&self, credentials: &Credentials, selections: Vec<Selection>) -> ConfirmOutcome {
        self.confirm_from(credentials, selections, SelectionOrigin::Chosen)
            .await
    }

    /// Confirm selections, announcing them first when they were picked in
    /// the file list.
    pub async fn confirm_from(
        &self,
        credentials: &Credentials,
        selections: Vec<Selection>,
        origin: SelectionOrigin,
    ) -> ConfirmOutcome {
        let Some(guard) = self.begin() else {
            debug!("Confirmation already in progress");
            return ConfirmOutcome::Busy;
        };

        let plan = match build_plan(&selections, &self.config) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(error = %e, "Confirmation refused");
                self.send(HostMessage::validation(self.exp_id(), e)).await;
                return ConfirmOutcome::Rejected(e);
            }
        };

        let (files, folders) = plan_kinds(&selections);
        debug!(files, folders, "Confirming selections");

        let operations = match plan {
            Plan::Report => Vec::new(),
            Plan::Dispatch(operations) => operations,
            Plan::ConfirmFolderCopy { folders, operations } => {
                for folder in folders {
                    if !self.ask_folder_copy(&selections[folder]).await {
                        info!(folder = %selections[folder].name, "Folder copy declined");
                        return ConfirmOutcome::Declined;
                    }
                }
                if self.mark.is_cancelled(guard.stamp()) {
                    return ConfirmOutcome::Suppressed;
                }
                operations
            }
        };

        let session = Arc::new(ConfirmationSession::new(
            self.mark.clone(),
            guard.stamp(),
            selections,
            self.exp_id(),
            self.host.clone(),
        ));

        if origin == SelectionOrigin::Chosen {
            session.announce(Action::Selected).await;
        }

        if operations.is_empty() {
            return ConfirmOutcome::Reported(session.report_unchanged().await);
        }

        let runner = Arc::new(ItemRunner {
            links: LinkCreator::new(Arc::clone(&self.api), self.config.link_options.clone()),
            copies: CopyDispatcher::new(Arc::clone(&self.api), Arc::clone(&self.poller), &self.config),
            credentials: credentials.clone(),
        });

        let (reported, stats) = session
            .dispatch(operations, self.config.concurrency_limit, runner)
            .await;
        debug!(
            launched = stats.started(),
            peak = stats.peak_in_flight(),
            "Dispatch finished"
        );

        match reported {
            Some(action) => ConfirmOutcome::Reported(action),
            None => ConfirmOutcome::Suppressed,
        }
    }

    /// Save files into a folder of the active account.
    pub async fn save(&self, credentials: &Credentials, request: SaveRequest) -> SaveOutcome {
        if !request.folder.can_upload_files {
            let error = ValidationError::CannotUploadHere;
            warn!(folder = %request.folder.id, "Cannot save to folder");
            self.send(HostMessage::validation(self.exp_id(), error)).await;
            return SaveOutcome::Rejected(error);
        }

        let overwrite = match request.colliding_name() {
            Some(name) => self.ask_overwrite(name).await,
            None => false,
        };

        let session = Arc::new(SaveSession::new(
            Arc::clone(&self.api),
            credentials.clone(),
            self.exp_id(),
            self.host.clone(),
        ));
        session
            .run(request, overwrite, self.config.concurrency_limit)
            .await
    }

    fn begin(&self) -> Option<ActiveGuard<'_>> {
        let stamp = self.mark.stamp();
        let current = self.active.load(Ordering::Acquire);
        if current != 0 && !self.mark.is_cancelled(SessionStamp(current - 1)) {
            return None;
        }
        self.active
            .compare_exchange(current, stamp.0 + 1, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(ActiveGuard {
            active: &self.active,
            value: stamp.0 + 1,
        })
    }

    async fn ask_folder_copy(&self, folder: &Selection) -> bool {
        let prompter = Arc::clone(&self.prompter);
        let folder = folder.clone();
        tokio::task::spawn_blocking(move || prompter.confirm_folder_copy(&folder))
            .await
            .unwrap_or(false)
    }

    async fn ask_overwrite(&self, name: &str) -> bool {
        let prompter = Arc::clone(&self.prompter);
        let name = name.to_string();
        tokio::task::spawn_blocking(move || prompter.confirm_overwrite(&name))
            .await
            .unwrap_or(false)
    }

    fn exp_id(&self) -> Option<String> {
        self.config.exp_id.clone()
    }

    async fn send(&self, message: HostMessage) {
        let _ = self.host.send(message).await;
    }
}

/// Marks the dispatcher idle again when a confirmation returns.
struct ActiveGuard<'a> {
    active: &'a AtomicU64,
    value: u64,
}

impl ActiveGuard<'_> {
    fn stamp(&self) -> SessionStamp {
        SessionStamp(self.value - 1)
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        // A newer confirmation may have taken over after a cancel.
        let _ = self
            .active
            .compare_exchange(self.value, 0, Ordering::AcqRel, Ordering::Acquire);
    }
}
