pub mod health;
pub mod stream;

use crate::config::AppConfig;
use reqwest::{multipart, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use std::time::Duration;
use stream::QueryStream;
use tracing::debug;

const USER_AGENT: &str = concat!("pdf-chat/", env!("CARGO_PKG_VERSION"));

/// Path of the streaming query endpoint. It lives under `/api`, unlike the
/// `/chat/...` resource routes.
pub const QUERY_PATH: &str = "/api/chat/query";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    session_id: &'a str,
    query: &'a str,
}

/// Thin wrapper over a shared `reqwest::Client` bound to one backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl ApiClient {
    pub fn new(config: &AppConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) if !token.is_empty() => {
                req.header("Authorization", format!("Bearer {}", token))
            }
            _ => req,
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        debug!(path, "GET");
        let resp = self.authorize(self.client.get(self.url(path))).send().await?;
        read_json(resp).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(path, "POST");
        let resp = self
            .authorize(self.client.post(self.url(path)))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;
        read_json(resp).await
    }

    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: multipart::Form,
    ) -> Result<T, ApiError> {
        debug!(path, "POST multipart");
        let resp = self
            .authorize(self.client.post(self.url(path)))
            .multipart(form)
            .send()
            .await?;
        read_json(resp).await
    }

    /// DELETE without a meaningful response body.
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        debug!(path, "DELETE");
        let resp = self.authorize(self.client.delete(self.url(path))).send().await?;
        check_status(resp).await?;
        Ok(())
    }

    /// Opens the streaming query endpoint. Status errors surface here; body
    /// errors surface while polling the returned stream.
    pub async fn open_query(&self, session_id: &str, query: &str) -> Result<QueryStream, ApiError> {
        debug!(session_id, "opening query stream");
        let resp = self
            .authorize(self.client.post(self.url(QUERY_PATH)))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&QueryRequest { session_id, query })
            .send()
            .await?;
        let resp = check_status(resp).await?;
        Ok(QueryStream::from_response(resp))
    }
}

async fn check_status(resp: Response) -> Result<Response, ApiError> {
    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        return Err(ApiError::Api {
            status,
            message: text,
        });
    }
    Ok(resp)
}

async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
    let resp = check_status(resp).await?;
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Parse(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Parse error: {0}")]
    Parse(String),
}

impl Serialize for ApiError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> AppConfig {
        AppConfig {
            api_base_url: url.to_string(),
            auth_token: None,
            connect_timeout_secs: 1,
        }
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ApiClient::new(&config("http://localhost:3000/")).unwrap();
        assert_eq!(client.base_url(), "http://localhost:3000");
        assert_eq!(client.url("/chat/documents"), "http://localhost:3000/chat/documents");
    }

    #[test]
    fn test_query_request_uses_camel_case() {
        let body = serde_json::to_value(QueryRequest {
            session_id: "s1",
            query: "what?",
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"sessionId": "s1", "query": "what?"}));
    }

    #[test]
    fn test_api_error_serializes_as_message() {
        let err = ApiError::Api {
            status: 404,
            message: "missing".into(),
        };
        assert_eq!(
            serde_json::to_string(&err).unwrap(),
            "\"API error: 404 - missing\""
        );
    }

    #[tokio::test]
    async fn test_delete_reports_status_errors() {
        use axum::{http::StatusCode, routing::delete, Router};

        let app = Router::new()
            .route("/gone", delete(|| async { StatusCode::NO_CONTENT }))
            .route("/locked", delete(|| async { (StatusCode::CONFLICT, "locked") }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = ApiClient::new(&config(&format!("http://{}", addr))).unwrap();
        client.delete("/gone").await.unwrap();
        match client.delete("/locked").await {
            Err(ApiError::Api { status, message }) => {
                assert_eq!(status, 409);
                assert_eq!(message, "locked");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
