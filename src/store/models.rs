use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// An uploaded document as listed in the chat history.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    pub file_name: String,
    pub file_url: String,
    pub status: String,
}

/// The document currently on screen.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PdfInfo {
    pub file_name: String,
    pub file_url: String,
}

impl From<&Chat> for PdfInfo {
    fn from(chat: &Chat) -> Self {
        Self {
            file_name: chat.file_name.clone(),
            file_url: chat.file_url.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Empty assistant message with a fresh id, filled in by streamed chunks.
    pub fn assistant_placeholder() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::Assistant,
            content: String::new(),
            timestamp: Utc::now(),
        }
    }
}

// ── Wire shapes ──

/// Ids arrive as strings or numbers depending on the backend.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DocumentDto {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default, rename = "fileUrl", alias = "file_url")]
    pub file_url: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl From<DocumentDto> for Chat {
    fn from(doc: DocumentDto) -> Self {
        Self {
            id: doc.id.unwrap_or_default(),
            file_name: doc.filename.unwrap_or_default(),
            file_url: doc.file_url.unwrap_or_default(),
            status: doc.status.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UploadResponse {
    pub document: DocumentDto,
    #[serde(default, rename = "fileUrl")]
    pub file_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct DocumentsResponse {
    #[serde(default)]
    pub documents: Vec<DocumentDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest<'a> {
    pub document_id: &'a str,
}

#[derive(Debug, Deserialize, Default)]
pub struct SessionRef {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    #[serde(default, rename = "sessionId", deserialize_with = "lenient_id")]
    pub session_id: Option<String>,
}

impl SessionRef {
    /// `sessionId` first for created sessions, `id` first for listings.
    pub fn created_id(&self) -> Option<&str> {
        non_empty(self.session_id.as_deref()).or_else(|| non_empty(self.id.as_deref()))
    }

    pub fn listed_id(&self) -> Option<&str> {
        non_empty(self.id.as_deref()).or_else(|| non_empty(self.session_id.as_deref()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SessionsResponse {
    Wrapped { sessions: Vec<SessionRef> },
    Bare(Vec<SessionRef>),
}

impl SessionsResponse {
    pub fn into_sessions(self) -> Vec<SessionRef> {
        match self {
            SessionsResponse::Wrapped { sessions } | SessionsResponse::Bare(sessions) => sessions,
        }
    }
}

/// History message in whatever shape the backend sends.
#[derive(Debug, Deserialize, Default)]
pub struct RawMessage {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

impl RawMessage {
    pub fn normalize(self) -> ChatMessage {
        // `type` only knows "ai"; anything else there is the user
        let role = match non_empty(self.role.as_deref()) {
            Some("assistant") => Role::Assistant,
            Some(_) => Role::User,
            None if self.kind.as_deref() == Some("ai") => Role::Assistant,
            None => Role::User,
        };
        let content = non_empty(self.content.as_deref())
            .or_else(|| non_empty(self.text.as_deref()))
            .unwrap_or_default()
            .to_string();
        let id = non_empty(self.id.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let timestamp = self
            .timestamp
            .as_ref()
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);
        ChatMessage {
            id,
            role,
            content,
            timestamp,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum MessagesResponse {
    Wrapped { messages: Vec<RawMessage> },
    Bare(Vec<RawMessage>),
}

impl MessagesResponse {
    pub fn into_messages(self) -> Vec<ChatMessage> {
        let raw = match self {
            MessagesResponse::Wrapped { messages } | MessagesResponse::Bare(messages) => messages,
        };
        raw.into_iter().map(RawMessage::normalize).collect()
    }
}

/// RFC 3339 strings or epoch milliseconds.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn normalize(value: Value) -> Vec<ChatMessage> {
        serde_json::from_value::<MessagesResponse>(value)
            .unwrap()
            .into_messages()
    }

    #[test]
    fn test_alternate_field_names_normalize_alike() {
        let a = normalize(json!([{"role": "assistant", "content": "hi"}]));
        let b = normalize(json!([{"type": "ai", "text": "hi"}]));
        for msgs in [a, b] {
            assert_eq!(msgs.len(), 1);
            assert_eq!(msgs[0].role, Role::Assistant);
            assert_eq!(msgs[0].content, "hi");
        }
    }

    #[test]
    fn test_wrapped_messages_and_defaults() {
        let msgs = normalize(json!({"messages": [
            {"id": "m1", "type": "human", "content": "", "text": "q", "timestamp": "2024-05-01T10:00:00Z"},
            {"timestamp": 1714557600000i64},
        ]}));
        assert_eq!(msgs[0].id, "m1");
        assert_eq!(msgs[0].role, Role::User);
        assert_eq!(msgs[0].content, "q");
        assert_eq!(msgs[0].timestamp.to_rfc3339(), "2024-05-01T10:00:00+00:00");
        assert_eq!(msgs[1].role, Role::User);
        assert_eq!(msgs[1].content, "");
        assert!(!msgs[1].id.is_empty());
        assert_eq!(msgs[1].timestamp, msgs[0].timestamp);
    }

    #[test]
    fn test_numeric_message_id_keeps_history() {
        let msgs = normalize(json!({"messages": [
            {"id": 7, "role": "assistant", "content": "hi"},
            {"id": null, "role": null, "type": "ai", "content": null, "text": "there"},
        ]}));
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].id, "7");
        assert_eq!(msgs[0].role, Role::Assistant);
        assert!(!msgs[1].id.is_empty());
        assert_eq!(msgs[1].role, Role::Assistant);
        assert_eq!(msgs[1].content, "there");
    }

    #[test]
    fn test_type_other_than_ai_is_user() {
        let msgs = normalize(json!([{"type": "assistant", "text": "x"}, {"role": "system", "content": "y"}]));
        assert_eq!(msgs[0].role, Role::User);
        assert_eq!(msgs[1].role, Role::User);
    }

    #[test]
    fn test_documents_with_numeric_ids_and_nulls() {
        let resp: DocumentsResponse = serde_json::from_value(json!({"documents": [
            {"id": 3, "filename": "n.pdf", "fileUrl": "/n", "status": "ready"},
            {"id": "x", "filename": "a.pdf", "fileUrl": null, "status": null},
        ]}))
        .unwrap();
        let chats: Vec<Chat> = resp.documents.into_iter().map(Chat::from).collect();
        assert_eq!(chats[0].id, "3");
        assert_eq!(chats[0].file_name, "n.pdf");
        assert_eq!(chats[1].id, "x");
        assert_eq!(chats[1].file_url, "");
        assert_eq!(chats[1].status, "");
    }

    #[test]
    fn test_numeric_session_ids() {
        let created: SessionRef = serde_json::from_value(json!({"sessionId": 12})).unwrap();
        assert_eq!(created.created_id(), Some("12"));
    }

    #[test]
    fn test_session_id_preference() {
        let created: SessionRef = serde_json::from_value(json!({"id": "a", "sessionId": "b"})).unwrap();
        assert_eq!(created.created_id(), Some("b"));
        assert_eq!(created.listed_id(), Some("a"));
        let empty: SessionRef = serde_json::from_value(json!({"id": ""})).unwrap();
        assert_eq!(empty.created_id(), None);
    }

    #[test]
    fn test_sessions_response_shapes() {
        let wrapped: SessionsResponse = serde_json::from_value(json!({"sessions": [{"id": "s1"}]})).unwrap();
        assert_eq!(wrapped.into_sessions()[0].listed_id(), Some("s1"));
        let bare: SessionsResponse = serde_json::from_value(json!([{"sessionId": "s2"}])).unwrap();
        assert_eq!(bare.into_sessions()[0].listed_id(), Some("s2"));
    }

    #[test]
    fn test_document_dto_to_chat() {
        let dto: DocumentDto = serde_json::from_value(json!({
            "id": "d1", "filename": "a.pdf", "fileUrl": "/files/a.pdf", "status": "ready"
        }))
        .unwrap();
        let chat = Chat::from(dto);
        assert_eq!(chat.file_name, "a.pdf");
        assert_eq!(PdfInfo::from(&chat).file_url, "/files/a.pdf");
    }

    #[test]
    fn test_placeholders_get_unique_ids() {
        let a = ChatMessage::assistant_placeholder();
        let b = ChatMessage::assistant_placeholder();
        assert_ne!(a.id, b.id);
        assert!(a.content.is_empty());
    }
}
