//! Editor worker task
//!
//! A single tokio task owns the [`PlanEditor`] and is the only place that
//! mutates or saves the plan. Callers talk to it through an
//! [`EditorHandle`]; commands are handled strictly in channel order, and the
//! loop wakes up on its own when the debounce deadline passes.

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use super::editor::{PlanEdit, PlanEditor, SaveReport, SaveStatus};
use super::error::{SyncError, SyncResult};
use crate::constants::sync::COMMAND_CHANNEL_CAPACITY;
use crate::plan::PlanTree;

/// Messages accepted by the worker
#[derive(Debug)]
pub enum EditorCommand {
    Apply {
        edit: PlanEdit,
        reply: oneshot::Sender<SyncResult<Option<String>>>,
    },
    EditingStarted {
        id: String,
    },
    EditingEnded {
        id: String,
    },
    Save {
        reply: oneshot::Sender<SyncResult<SaveReport>>,
    },
    Reload {
        reply: oneshot::Sender<SyncResult<()>>,
    },
    Snapshot {
        reply: oneshot::Sender<PlanTree>,
    },
    Shutdown,
}

pub struct EditorWorker {
    editor: PlanEditor,
    rx: mpsc::Receiver<EditorCommand>,
}

impl EditorWorker {
    /// Start the worker; the join handle yields the editor after shutdown
    pub fn spawn(editor: PlanEditor) -> (EditorHandle, JoinHandle<PlanEditor>) {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let handle = EditorHandle {
            tx,
            status: editor.subscribe(),
        };
        let worker = Self { editor, rx };
        (handle, tokio::spawn(worker.run()))
    }

    async fn run(mut self) -> PlanEditor {
        info!(client_id = %self.editor.client_id(), "Editor worker started");
        loop {
            let deadline = self.editor.next_deadline();
            let wake_at = deadline.unwrap_or_else(Instant::now);

            tokio::select! {
                biased;

                command = self.rx.recv() => {
                    let Some(command) = command else { break };
                    if !self.handle(command).await {
                        break;
                    }
                }
                _ = sleep_until(wake_at), if deadline.is_some() => {
                    self.flush().await;
                }
            }
        }
        info!(client_id = %self.editor.client_id(), "Editor worker stopped");
        self.editor
    }

    /// Returns false when the worker should stop
    async fn handle(&mut self, command: EditorCommand) -> bool {
        match command {
            EditorCommand::Apply { edit, reply } => {
                let _ = reply.send(self.editor.apply(edit));
            }
            EditorCommand::EditingStarted { id } => self.editor.editing_started(&id),
            EditorCommand::EditingEnded { id } => self.editor.editing_ended(&id),
            EditorCommand::Save { reply } => {
                let _ = reply.send(self.editor.save().await);
            }
            EditorCommand::Reload { reply } => {
                let _ = reply.send(self.editor.reload_from_server().await);
            }
            EditorCommand::Snapshot { reply } => {
                let _ = reply.send(self.editor.tree().clone());
            }
            EditorCommand::Shutdown => return false,
        }
        true
    }

    async fn flush(&mut self) {
        match self.editor.flush_due().await {
            None => {}
            Some(Ok(report)) => debug!(
                client_id = %self.editor.client_id(),
                changed = report.changes.len(),
                "Background save complete"
            ),
            Some(Err(err)) => warn!(
                client_id = %self.editor.client_id(),
                "Background save failed: {}",
                err
            ),
        }
    }
}

/// Cloneable front end to a running [`EditorWorker`]
#[derive(Clone)]
pub struct EditorHandle {
    tx: mpsc::Sender<EditorCommand>,
    status: watch::Receiver<SaveStatus>,
}

impl EditorHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> EditorCommand,
    ) -> SyncResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| SyncError::WorkerStopped)?;
        rx.await.map_err(|_| SyncError::WorkerStopped)
    }

    async fn notify(&self, command: EditorCommand) -> SyncResult<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| SyncError::WorkerStopped)
    }

    pub async fn apply(&self, edit: PlanEdit) -> SyncResult<Option<String>> {
        self.request(|reply| EditorCommand::Apply { edit, reply }).await?
    }

    pub async fn editing_started(&self, id: impl Into<String>) -> SyncResult<()> {
        self.notify(EditorCommand::EditingStarted { id: id.into() }).await
    }

    pub async fn editing_ended(&self, id: impl Into<String>) -> SyncResult<()> {
        self.notify(EditorCommand::EditingEnded { id: id.into() }).await
    }

    /// Manual save
    pub async fn save(&self) -> SyncResult<SaveReport> {
        self.request(|reply| EditorCommand::Save { reply }).await?
    }

    pub async fn reload(&self) -> SyncResult<()> {
        self.request(|reply| EditorCommand::Reload { reply }).await?
    }

    pub async fn snapshot(&self) -> SyncResult<PlanTree> {
        self.request(|reply| EditorCommand::Snapshot { reply }).await
    }

    pub fn status(&self) -> SaveStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SaveStatus> {
        self.status.clone()
    }

    pub async fn shutdown(&self) -> SyncResult<()> {
        self.notify(EditorCommand::Shutdown).await
    }
}
