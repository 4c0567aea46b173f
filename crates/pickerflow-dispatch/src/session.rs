//! Confirmation sessions: planning, dispatch and aggregation.

use std::sync::Arc;

use pickerflow_core::{
    Action, Credentials, HostMessage, PickerConfig, Selection, SelectionKind, ValidationError,
};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::cancel::{CancellationMark, SessionStamp};
use crate::copy::CopyDispatcher;
use crate::launcher::{LaunchStats, ThrottledLauncher};
use crate::link::LinkCreator;
use crate::operation::{ItemOutcome, OperationKind, PendingOperation};
use crate::progress::{SessionCounters, SessionPhase};

/// What a confirmation needs to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// No requests: report the selections as they are.
    Report,
    /// Run these operations.
    Dispatch(Vec<PendingOperation>),
    /// Ask the user about each folder in `folders` before copying, then run
    /// these operations.
    ConfirmFolderCopy {
        folders: Vec<usize>,
        operations: Vec<PendingOperation>,
    },
}

/// Decide the operations for a list of selections.
///
/// Copying takes precedence over links. Folders are only copied when the
/// copy returns a task (`sync` or `async`); an `immediate` copy leaves them
/// as they are. Building the plan has no side effects, so the same input
/// always gives the same plan.
pub fn build_plan(selections: &[Selection], config: &PickerConfig) -> Result<Plan, ValidationError> {
    if selections.is_empty() {
        return Err(ValidationError::NoSelection);
    }

    let mode = config.copy_to_upload_location;
    let mut operations = Vec::new();
    if mode.is_enabled() {
        for (index, selection) in selections.iter().enumerate() {
            match selection.kind {
                SelectionKind::File => operations.push(PendingOperation::copy(index, SelectionKind::File)),
                SelectionKind::Folder if mode.returns_task() => {
                    if selection.is_root_folder() {
                        return Err(ValidationError::ForbidRootFolderCopy);
                    }
                    operations.push(PendingOperation::copy(index, SelectionKind::Folder));
                }
                SelectionKind::Folder => {}
            }
        }
    } else if config.link {
        operations.extend((0..selections.len()).map(PendingOperation::create_link));
    }

    if operations.is_empty() {
        return Ok(Plan::Report);
    }

    let folders: Vec<usize> = operations
        .iter()
        .filter(|op| op.kind == OperationKind::Copy(SelectionKind::Folder))
        .map(|op| op.index)
        .collect();
    if folders.is_empty() {
        Ok(Plan::Dispatch(operations))
    } else {
        Ok(Plan::ConfirmFolderCopy { folders, operations })
    }
}

/// Issues the request behind one pending operation.
pub(crate) struct ItemRunner {
    pub(crate) links: LinkCreator,
    pub(crate) copies: CopyDispatcher,
    pub(crate) credentials: Credentials,
}

impl ItemRunner {
    async fn execute(&self, kind: OperationKind, item_id: &str) -> ItemOutcome {
        match kind {
            OperationKind::CreateLink => self.links.run(item_id, &self.credentials).await,
            OperationKind::Copy(selection_kind) => {
                self.copies
                    .run(item_id, selection_kind, &self.credentials)
                    .await
            }
        }
    }
}

#[derive(Debug)]
struct SessionState {
    phase: SessionPhase,
    selections: Vec<Selection>,
    counters: SessionCounters,
    suppressed: usize,
    reported: Option<Action>,
}

/// One confirmation attempt.
///
/// The session owns the selections and counters. Every completion goes
/// through [`ConfirmationSession::complete`], which updates both under one
/// lock and sends at most one final report. Completions that arrive after
/// a cancel newer than the session's stamp are counted but never reported.
pub struct ConfirmationSession {
    stamp: SessionStamp,
    mark: CancellationMark,
    exp_id: Option<String>,
    host: mpsc::Sender<HostMessage>,
    state: Mutex<SessionState>,
}

impl ConfirmationSession {
    /// Start a session for `selections`.
    ///
    /// `stamp` is the position of the session relative to cancels on `mark`,
    /// usually `mark.stamp()` taken when the user confirmed.
    pub fn new(
        mark: CancellationMark,
        stamp: SessionStamp,
        selections: Vec<Selection>,
        exp_id: Option<String>,
        host: mpsc::Sender<HostMessage>,
    ) -> Self {
        Self {
            stamp,
            mark,
            exp_id,
            host,
            state: Mutex::new(SessionState {
                phase: SessionPhase::Building,
                selections,
                counters: SessionCounters::default(),
                suppressed: 0,
                reported: None,
            }),
        }
    }

    /// Stamp captured when the session started.
    pub fn stamp(&self) -> SessionStamp {
        self.stamp
    }

    /// Check if the user cancelled after this session started.
    pub fn is_cancelled(&self) -> bool {
        self.mark.is_cancelled(self.stamp)
    }

    /// Current lifecycle phase.
    pub async fn phase(&self) -> SessionPhase {
        self.state.lock().await.phase
    }

    /// Snapshot of the counters.
    pub async fn counters(&self) -> SessionCounters {
        self.state.lock().await.counters
    }

    /// Snapshot of the selections.
    pub async fn selections(&self) -> Vec<Selection> {
        self.state.lock().await.selections.clone()
    }

    /// Number of completions dropped because of a cancel.
    pub async fn suppressed(&self) -> usize {
        self.state.lock().await.suppressed
    }

    /// Send a message to the host carrying the current selections.
    pub async fn announce(&self, action: Action) {
        let message = {
            let state = self.state.lock().await;
            HostMessage::selections(self.exp_id.clone(), action, &state.selections)
        };
        let _ = self.host.send(message).await;
    }

    /// Report the selections as they are, without any request.
    pub async fn report_unchanged(&self) -> Action {
        {
            let mut state = self.state.lock().await;
            state.phase = SessionPhase::Done;
            state.reported = Some(Action::Success);
        }
        self.announce(Action::Success).await;
        Action::Success
    }

    /// Run `operations` with at most `limit` in flight.
    ///
    /// Returns the reported action, or `None` when the session was cancelled
    /// before it could report.
    pub(crate) async fn dispatch(
        self: Arc<Self>,
        operations: Vec<PendingOperation>,
        limit: usize,
        runner: Arc<ItemRunner>,
    ) -> (Option<Action>, Arc<LaunchStats>) {
        let mut launcher = ThrottledLauncher::new();
        {
            let mut state = self.state.lock().await;
            state.counters = SessionCounters::new(operations.len());
            state.phase = SessionPhase::Dispatching;
        }
        for op in operations {
            launcher.enqueue(op);
        }

        let watcher = Arc::clone(&self);
        let session = Arc::clone(&self);
        let stats = launcher
            .run_while(limit, move || !watcher.is_cancelled(), move |op| {
                let session = Arc::clone(&session);
                let runner = Arc::clone(&runner);
                async move {
                    let item_id = session.launch(op).await;
                    let outcome = runner.execute(op.kind, &item_id).await;
                    session.complete(op.index, outcome).await;
                }
            })
            .await;

        let state = self.state.lock().await;
        if state.reported.is_none() {
            info!(
                suppressed = state.suppressed,
                skipped = stats.skipped(),
                summary = %state.counters.summary(),
                "Session finished without reporting"
            );
        }
        (state.reported, stats)
    }

    async fn launch(&self, op: PendingOperation) -> String {
        let mut state = self.state.lock().await;
        state.counters.start();
        debug!(index = op.index, kind = ?op.kind, in_flight = state.counters.in_flight(), "Launching operation");
        state.selections[op.index].id.clone()
    }

    /// Record the outcome of one operation.
    ///
    /// This is the only place counters and selections change once dispatch
    /// has started.
    pub async fn complete(&self, index: usize, outcome: ItemOutcome) {
        let success = outcome.is_success();
        let report = {
            let mut state = self.state.lock().await;

            if self.is_cancelled() {
                state.counters.finish(success);
                state.suppressed += 1;
                info!(
                    index,
                    success,
                    "A cancellation occurred before the operation completed. Ignoring response."
                );
                None
            } else {
                if !success {
                    warn!(index, "Operation failed for selection");
                }
                if let Some(selection) = state.selections.get_mut(index) {
                    outcome.apply_to(selection);
                }
                state.counters.finish(success);
                state.phase = SessionPhase::Aggregating;

                if state.counters.is_complete() && state.reported.is_none() {
                    let action = if state.counters.has_failures() {
                        Action::Error
                    } else {
                        Action::Success
                    };
                    state.phase = SessionPhase::Done;
                    state.reported = Some(action);
                    debug!(summary = %state.counters.summary(), %action, "Session complete");
                    Some(HostMessage::selections(
                        self.exp_id.clone(),
                        action,
                        &state.selections,
                    ))
                } else {
                    None
                }
            }
        };

        if let Some(message) = report {
            let _ = self.host.send(message).await;
        }
    }
}

/// Kinds of the selections covered by a plan, for logging.
pub(crate) fn plan_kinds(selections: &[Selection]) -> (usize, usize) {
    let folders = selections
        .iter()
        .filter(|s| s.kind == SelectionKind::Folder)
        .count();
    (selections.len() - folders, folders)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pickerflow_core::{CopyMode, UploadLocation};
    use serde_json::json;

    fn config(mode: CopyMode, link: bool) -> PickerConfig {
        let mut builder = PickerConfig::builder();
        builder
            .base_url("https://api.example.com")
            .copy_to_upload_location(mode)
            .link(link);
        if mode.is_enabled() {
            builder.upload_location(UploadLocation::Uri {
                uri: "drop://x".to_string(),
            });
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_plan_requires_selection() {
        let result = build_plan(&[], &config(CopyMode::Disabled, true));
        assert_eq!(result, Err(ValidationError::NoSelection));
    }

    #[test]
    fn test_plan_links_every_selection() {
        let selections = vec![
            Selection::file("a", "a.txt"),
            Selection::folder("d", "Docs"),
            Selection::file("b", "b.txt"),
        ];
        let plan = build_plan(&selections, &config(CopyMode::Disabled, true)).unwrap();

        assert_eq!(
            plan,
            Plan::Dispatch(vec![
                PendingOperation::create_link(0),
                PendingOperation::create_link(1),
                PendingOperation::create_link(2)
            ])
        );
    }

    #[test]
    fn test_plan_copy_wins_over_link() {
        let selections = vec![Selection::file("a", "a.txt")];
        let plan = build_plan(&selections, &config(CopyMode::Sync, true)).unwrap();

        assert_eq!(
            plan,
            Plan::Dispatch(vec![PendingOperation::copy(0, SelectionKind::File)])
        );
    }

    #[test]
    fn test_plan_plain_report() {
        let selections = vec![Selection::file("a", "a.txt")];
        let plan = build_plan(&selections, &config(CopyMode::Disabled, false)).unwrap();
        assert_eq!(plan, Plan::Report);

        let folders = vec![Selection::folder("d", "Docs")];
        let plan = build_plan(&folders, &config(CopyMode::Disabled, false)).unwrap();
        assert_eq!(plan, Plan::Report);
    }

    #[test]
    fn test_plan_folder_copy_rules() {
        let root = vec![Selection::folder("root", "All files")];
        assert_eq!(
            build_plan(&root, &config(CopyMode::Sync, false)),
            Err(ValidationError::ForbidRootFolderCopy)
        );

        let folder = vec![Selection::folder("d", "Docs")];
        assert_eq!(
            build_plan(&folder, &config(CopyMode::Async, false)).unwrap(),
            Plan::ConfirmFolderCopy {
                folders: vec![0],
                operations: vec![PendingOperation::copy(0, SelectionKind::Folder)],
            }
        );

        let mixed = vec![
            Selection::folder("d1", "One"),
            Selection::file("f", "f.txt"),
            Selection::folder("d2", "Two"),
        ];
        match build_plan(&mixed, &config(CopyMode::Sync, false)).unwrap() {
            Plan::ConfirmFolderCopy { folders, operations } => {
                assert_eq!(folders, vec![0, 2]);
                assert_eq!(operations.len(), 3);
            }
            other => panic!("unexpected plan {other:?}"),
        }
    }

    #[test]
    fn test_plan_immediate_copy_leaves_folders() {
        let folder = vec![Selection::folder("d", "Docs")];
        assert_eq!(
            build_plan(&folder, &config(CopyMode::Immediate, false)).unwrap(),
            Plan::Report
        );

        let root = vec![Selection::folder("root", "All files")];
        assert_eq!(
            build_plan(&root, &config(CopyMode::Immediate, false)).unwrap(),
            Plan::Report
        );

        let mixed = vec![Selection::folder("d", "Docs"), Selection::file("f", "f.txt")];
        assert_eq!(
            build_plan(&mixed, &config(CopyMode::Immediate, false)).unwrap(),
            Plan::Dispatch(vec![PendingOperation::copy(1, SelectionKind::File)])
        );
    }

    #[test]
    fn test_plan_is_repeatable() {
        let selections = vec![
            Selection::file("a", "a.txt"),
            Selection::file("b", "b.txt"),
            Selection::file("c", "c.txt"),
        ];
        let config = config(CopyMode::Immediate, false);

        let first = build_plan(&selections, &config).unwrap();
        let second = build_plan(&selections, &config).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_complete_reports_once_in_any_order() {
        let (tx, mut rx) = mpsc::channel(8);
        let mark = CancellationMark::new();
        let session = ConfirmationSession::new(
            mark.clone(),
            mark.stamp(),
            vec![Selection::file("a", "a"), Selection::file("b", "b")],
            None,
            tx,
        );
        session.state.lock().await.counters = SessionCounters::new(2);

        session
            .complete(1, ItemOutcome::Failed(json!({"code": 1})))
            .await;
        assert!(rx.try_recv().is_err());
        assert_eq!(session.phase().await, SessionPhase::Aggregating);

        session
            .complete(0, ItemOutcome::Linked("https://x/1".to_string()))
            .await;
        let message = rx.try_recv().unwrap();
        assert_eq!(message.action, Action::Error);
        assert_eq!(session.phase().await, SessionPhase::Done);

        let reported = message.selection_data().unwrap();
        assert_eq!(reported[0].link.as_deref(), Some("https://x/1"));
        assert_eq!(reported[1].error, Some(json!({"code": 1})));
    }

    #[tokio::test]
    async fn test_cancelled_completion_is_dropped() {
        let (tx, mut rx) = mpsc::channel(8);
        let mark = CancellationMark::new();
        let session = ConfirmationSession::new(
            mark.clone(),
            mark.stamp(),
            vec![Selection::file("a", "a")],
            None,
            tx,
        );
        session.state.lock().await.counters = SessionCounters::new(1);

        mark.cancel();
        session
            .complete(0, ItemOutcome::Linked("https://x/1".to_string()))
            .await;

        assert!(rx.try_recv().is_err());
        assert_eq!(session.suppressed().await, 1);
        assert!(session.selections().await[0].link.is_none());
    }

    #[test]
    fn test_plan_kinds() {
        let selections = vec![Selection::file("a", "a"), Selection::folder("d", "d")];
        assert_eq!(plan_kinds(&selections), (1, 1));
    }
}
