//! Diagnostic checks. The payloads are backend-defined and passed through
//! untouched.

use super::{ApiClient, ApiError};
use serde_json::Value;

pub async fn check_server_connection(api: &ApiClient) -> Result<Value, ApiError> {
    api.get("/api/health").await
}

pub async fn check_database_connection(api: &ApiClient) -> Result<Value, ApiError> {
    api.get("/api/health/db").await
}
