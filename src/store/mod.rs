pub mod models;

use crate::api::stream::QueryStream;
use crate::api::{ApiClient, ApiError};
use models::{
    Chat, ChatMessage, CreateSessionRequest, DocumentsResponse, MessagesResponse, PdfInfo,
    SessionRef, SessionsResponse, UploadResponse,
};
use reqwest::multipart::{Form, Part};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// A PDF ready to be uploaded.
#[derive(Debug, Clone)]
pub struct PdfFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl PdfFile {
    pub async fn read(path: &Path) -> Result<Self, StoreError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document.pdf")
            .to_string();
        let bytes = tokio::fs::read(path).await?;
        Ok(Self { file_name, bytes })
    }
}

#[derive(Debug, Default)]
struct StoreState {
    chat_history: Vec<Chat>,
    selected_chat: Option<Chat>,
    pdf_info: PdfInfo,
    /// document id -> session id
    session_ids: HashMap<String, String>,
}

/// Documents, the selected PDF and the document -> session cache, in front
/// of the backend API. Cloning hands out another handle to the same state.
#[derive(Debug, Clone)]
pub struct ChatStore {
    api: ApiClient,
    state: Arc<Mutex<StoreState>>,
}

impl ChatStore {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            state: Arc::new(Mutex::new(StoreState::default())),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    // Never held across an await.
    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Local state ──

    pub fn chat_history(&self) -> Vec<Chat> {
        self.state().chat_history.clone()
    }

    pub fn selected_chat(&self) -> Option<Chat> {
        self.state().selected_chat.clone()
    }

    pub fn pdf_info(&self) -> PdfInfo {
        self.state().pdf_info.clone()
    }

    pub fn cached_session(&self, document_id: &str) -> Option<String> {
        self.state().session_ids.get(document_id).cloned()
    }

    pub fn set_pdf_info(&self, pdf_info: PdfInfo) {
        self.state().pdf_info = pdf_info;
    }

    pub fn add_chat_to_history(&self, chat: Chat) {
        self.state().chat_history.insert(0, chat);
    }

    pub fn remove_chat_from_history(&self, chat_id: &str) {
        self.state().chat_history.retain(|chat| chat.id != chat_id);
    }

    /// Makes a chat from the history the one on screen. Returns false when
    /// the id is unknown, leaving the state untouched.
    pub fn select_chat(&self, chat_id: &str) -> bool {
        let mut state = self.state();
        let Some(chat) = state.chat_history.iter().find(|c| c.id == chat_id).cloned() else {
            return false;
        };
        state.pdf_info = PdfInfo::from(&chat);
        state.selected_chat = Some(chat);
        true
    }

    // ── Documents ──

    /// Uploads a PDF and records it as the current document. Returns the new
    /// document id. On failure nothing is recorded.
    pub async fn upload_pdf(&self, file: PdfFile) -> Result<String, StoreError> {
        let size = file.bytes.len();
        let part = Part::bytes(file.bytes)
            .file_name(file.file_name.clone())
            .mime_str("application/pdf")
            .map_err(ApiError::from)?;
        let form = Form::new().part("file", part);

        let resp: UploadResponse = match self.api.post_multipart("/chat/upload", form).await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(file = %file.file_name, "upload failed: {}", e);
                return Err(e.into());
            }
        };

        let document_url = resp.document.file_url.clone().unwrap_or_default();
        let shown_url = resp
            .file_url
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| document_url.clone());
        let chat = Chat::from(resp.document);
        let document_id = chat.id.clone();
        info!(document_id = %document_id, size, "uploaded {}", chat.file_name);

        let mut state = self.state();
        state.pdf_info = PdfInfo {
            file_name: chat.file_name.clone(),
            file_url: shown_url.clone(),
        };
        state.selected_chat = Some(Chat {
            file_url: shown_url,
            ..chat.clone()
        });
        state.chat_history.insert(0, chat);
        Ok(document_id)
    }

    /// Replaces the history with the backend's document list.
    pub async fn get_chat_documents(&self) -> Result<Vec<Chat>, StoreError> {
        let resp: DocumentsResponse = self.api.get("/chat/documents").await.map_err(|e| {
            warn!("listing documents failed: {}", e);
            e
        })?;
        let chats: Vec<Chat> = resp.documents.into_iter().map(Chat::from).collect();
        debug!(count = chats.len(), "loaded documents");
        self.state().chat_history = chats.clone();
        Ok(chats)
    }

    // ── Sessions ──

    pub async fn create_session(&self, document_id: &str) -> Result<String, StoreError> {
        let resp: SessionRef = self
            .api
            .post_json("/chat/session", &CreateSessionRequest { document_id })
            .await
            .map_err(|e| {
                warn!(document_id, "creating session failed: {}", e);
                e
            })?;
        let session_id = resp
            .created_id()
            .ok_or(StoreError::MissingSessionId)?
            .to_string();
        info!(document_id, session_id = %session_id, "created session");
        self.state()
            .session_ids
            .insert(document_id.to_string(), session_id.clone());
        Ok(session_id)
    }

    pub async fn get_sessions(&self, document_id: &str) -> Result<Vec<SessionRef>, StoreError> {
        let resp: SessionsResponse = self
            .api
            .get(&format!("/chat/sessions/{}", document_id))
            .await?;
        Ok(resp.into_sessions())
    }

    /// Cached session, else the first existing one, else a new one.
    ///
    /// Two calls racing before the cache is filled may both create a
    /// session; only the later one stays cached.
    pub async fn get_or_create_session(&self, document_id: &str) -> Result<String, StoreError> {
        if let Some(session_id) = self.cached_session(document_id) {
            return Ok(session_id);
        }

        match self.get_sessions(document_id).await {
            Ok(sessions) => {
                if let Some(session_id) = sessions.first().and_then(SessionRef::listed_id) {
                    debug!(document_id, session_id, "adopting existing session");
                    let session_id = session_id.to_string();
                    self.state()
                        .session_ids
                        .insert(document_id.to_string(), session_id.clone());
                    return Ok(session_id);
                }
            }
            Err(e) => warn!(document_id, "looking up sessions failed: {}", e),
        }

        self.create_session(document_id).await
    }

    pub async fn get_session_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>, StoreError> {
        let resp: MessagesResponse = self
            .api
            .get(&format!("/chat/session/{}/messages", session_id))
            .await
            .map_err(|e| {
                warn!(session_id, "loading messages failed: {}", e);
                e
            })?;
        Ok(resp.into_messages())
    }

    pub async fn query_session(&self, session_id: &str, query: &str) -> Result<QueryStream, ApiError> {
        self.api.open_query(session_id, query).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("backend returned no session id")]
    MissingSessionId,
}
