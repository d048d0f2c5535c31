//! Chat panel state and the worker that feeds it.
//!
//! The panel is plain state: it never awaits. A send hands back a
//! [`PendingQuery`], [`spawn_query`] runs it on the runtime, and the
//! resulting [`PanelEvent`]s are applied with [`ChatPanel::apply`] on the
//! thread that owns the panel.

use crate::store::models::{ChatMessage, Role};
use crate::store::ChatStore;
use futures::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const FALLBACK_REPLY: &str =
    "Sorry, I encountered an error processing your question. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Sending,
    Streaming,
    Errored,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PanelError {
    #[error("no document is open")]
    NoDocument,
    #[error("message is empty")]
    EmptyInput,
    #[error("a reply is still in progress")]
    Busy,
}

/// What the worker reports back. `placeholder_id` ties each event to the
/// send that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum PanelEvent {
    Chunk { placeholder_id: String, text: String },
    Completed { placeholder_id: String },
    Failed { placeholder_id: String, error: String },
    /// The query never started, e.g. no session could be resolved.
    SetupFailed { placeholder_id: String, error: String },
    HistoryLoaded { generation: u64, messages: Vec<ChatMessage> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingQuery {
    pub document_id: String,
    pub placeholder_id: String,
    pub query: String,
}

#[derive(Debug)]
pub struct ChatPanel {
    document_id: Option<String>,
    messages: Vec<ChatMessage>,
    phase: Phase,
    placeholder_id: Option<String>,
    history_generation: u64,
}

impl Default for ChatPanel {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatPanel {
    pub fn new() -> Self {
        Self {
            document_id: None,
            messages: Vec::new(),
            phase: Phase::Idle,
            placeholder_id: None,
            history_generation: 0,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn document_id(&self) -> Option<&str> {
        self.document_id.as_deref()
    }

    pub fn input_enabled(&self) -> bool {
        matches!(self.phase, Phase::Idle | Phase::Errored)
    }

    /// Switches to another document. Returns the generation a history load
    /// for it must carry; results from earlier generations are dropped.
    pub fn open_document(&mut self, document_id: impl Into<String>) -> u64 {
        self.document_id = Some(document_id.into());
        self.messages.clear();
        self.phase = Phase::Idle;
        self.placeholder_id = None;
        self.history_generation += 1;
        self.history_generation
    }

    /// Invalidates any history load still in flight.
    pub fn teardown(&mut self) {
        self.history_generation += 1;
    }

    /// Appends the user message and an empty assistant placeholder.
    pub fn begin_send(&mut self, text: &str) -> Result<PendingQuery, PanelError> {
        if !self.input_enabled() {
            return Err(PanelError::Busy);
        }
        let query = text.trim();
        if query.is_empty() {
            return Err(PanelError::EmptyInput);
        }
        let document_id = self.document_id.clone().ok_or(PanelError::NoDocument)?;

        let placeholder = ChatMessage::assistant_placeholder();
        let placeholder_id = placeholder.id.clone();
        self.messages.push(ChatMessage::user(query));
        self.messages.push(placeholder);
        self.placeholder_id = Some(placeholder_id.clone());
        self.phase = Phase::Sending;

        Ok(PendingQuery {
            document_id,
            placeholder_id,
            query: query.to_string(),
        })
    }

    pub fn apply(&mut self, event: PanelEvent) {
        match event {
            PanelEvent::HistoryLoaded {
                generation,
                messages,
            } => {
                if generation != self.history_generation {
                    debug!(generation, "dropping stale history");
                    return;
                }
                // keep anything sent while the history was loading
                let live = std::mem::take(&mut self.messages);
                self.messages = messages;
                self.messages.extend(live);
            }
            PanelEvent::Chunk {
                placeholder_id,
                text,
            } => {
                if let Some(msg) = self.find_mut(&placeholder_id) {
                    msg.content.push_str(&text);
                    if self.is_active(&placeholder_id) {
                        self.phase = Phase::Streaming;
                    }
                }
            }
            PanelEvent::Completed { placeholder_id } => {
                if self.is_active(&placeholder_id) {
                    self.finish(Phase::Idle);
                }
            }
            PanelEvent::Failed {
                placeholder_id,
                error,
            } => {
                warn!("reply failed: {}", error);
                if let Some(msg) = self.find_mut(&placeholder_id) {
                    if msg.content.is_empty() {
                        msg.content = FALLBACK_REPLY.to_string();
                    }
                }
                if self.is_active(&placeholder_id) {
                    self.finish(Phase::Errored);
                }
            }
            PanelEvent::SetupFailed {
                placeholder_id,
                error,
            } => {
                warn!("could not start reply: {}", error);
                self.messages.retain(|m| m.id != placeholder_id);
                if self.is_active(&placeholder_id) {
                    self.finish(Phase::Errored);
                }
            }
        }
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut ChatMessage> {
        self.messages
            .iter_mut()
            .find(|m| m.id == id && m.role == Role::Assistant)
    }

    fn is_active(&self, id: &str) -> bool {
        self.placeholder_id.as_deref() == Some(id)
    }

    fn finish(&mut self, phase: Phase) {
        self.phase = phase;
        self.placeholder_id = None;
    }
}

/// Handle on a running query worker.
#[derive(Debug)]
pub struct QueryHandle {
    task: JoinHandle<()>,
}

impl QueryHandle {
    /// Stops the worker; the HTTP body is dropped with it.
    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn join(self) {
        let _ = self.task.await;
    }
}

/// Resolves the session, streams the reply and forwards everything to `tx`.
/// Stops early once the receiving panel is gone.
pub fn spawn_query(store: ChatStore, pending: PendingQuery, tx: UnboundedSender<PanelEvent>) -> QueryHandle {
    let task = tokio::spawn(async move {
        let PendingQuery {
            document_id,
            placeholder_id,
            query,
        } = pending;

        let session_id = match store.get_or_create_session(&document_id).await {
            Ok(id) => id,
            Err(e) => {
                let _ = tx.send(PanelEvent::SetupFailed {
                    placeholder_id,
                    error: e.to_string(),
                });
                return;
            }
        };

        let mut stream = match store.query_session(&session_id, &query).await {
            Ok(stream) => stream,
            Err(e) => {
                let _ = tx.send(PanelEvent::Failed {
                    placeholder_id,
                    error: e.to_string(),
                });
                return;
            }
        };

        while let Some(item) = stream.next().await {
            let event = match item {
                Ok(text) => PanelEvent::Chunk {
                    placeholder_id: placeholder_id.clone(),
                    text,
                },
                Err(e) => {
                    let _ = tx.send(PanelEvent::Failed {
                        placeholder_id,
                        error: e.to_string(),
                    });
                    return;
                }
            };
            if tx.send(event).is_err() {
                debug!(session_id = %session_id, "panel gone, abandoning stream");
                return;
            }
        }
        let _ = tx.send(PanelEvent::Completed { placeholder_id });
    });
    QueryHandle { task }
}

/// Loads the stored conversation for the panel's document. A failure is
/// logged and shows up as an empty history.
pub fn spawn_history_load(
    store: ChatStore,
    document_id: String,
    generation: u64,
    tx: UnboundedSender<PanelEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let messages = match store.get_or_create_session(&document_id).await {
            Ok(session_id) => store
                .get_session_messages(&session_id)
                .await
                .unwrap_or_else(|e| {
                    warn!(document_id = %document_id, "history unavailable: {}", e);
                    Vec::new()
                }),
            Err(e) => {
                warn!(document_id = %document_id, "no session for history: {}", e);
                Vec::new()
            }
        };
        let _ = tx.send(PanelEvent::HistoryLoaded {
            generation,
            messages,
        });
    })
}
