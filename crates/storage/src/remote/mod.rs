//! Client for the hosted backend: a PostgREST-style table API under
//! `/rest/v1` and an object storage API under `/storage/v1`.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::repository::StorageError;

mod articles;
mod objects;
mod progress;

/// PostgREST code for "`.single()` matched zero rows".
const NO_ROWS: &str = "PGRST116";
/// PostgREST code for a table missing from the schema cache.
const UNKNOWN_TABLE: &str = "PGRST205";
/// Postgres `undefined_table`.
const UNDEFINED_TABLE: &str = "42P01";
/// Postgres `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteConfig {
    pub base_url: String,
    pub api_key: String,
    pub bucket: String,
    pub timeout: Duration,
}

#[derive(Clone)]
pub struct RemoteClient {
    client: Client,
    config: Arc<RemoteConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "statusCode")]
    status_code: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

impl RemoteClient {
    /// Build a client with the configured request timeout.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the HTTP client cannot be built.
    pub fn new(config: RemoteConfig) -> Result<Self, StorageError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base())
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/storage/v1/object/{}/{key}", self.base(), self.config.bucket)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StorageError> {
        let response = self
            .authed(request)
            .send()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        check_status(response).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, StorageError> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

async fn check_status(response: Response) -> Result<Response, StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let body: ApiErrorBody = serde_json::from_str(&text).unwrap_or_default();
    Err(classify(status, &body, &text))
}

fn classify(status: StatusCode, body: &ApiErrorBody, raw: &str) -> StorageError {
    let code = body.code.as_deref().unwrap_or_default();
    let not_found = matches!(code, NO_ROWS | UNKNOWN_TABLE | UNDEFINED_TABLE);
    if not_found || status == StatusCode::NOT_FOUND {
        return StorageError::NotFound;
    }

    let storage_duplicate = body.error.as_deref() == Some("Duplicate")
        || body
            .status_code
            .as_ref()
            .is_some_and(|v| v.as_str() == Some("409") || v.as_u64() == Some(409));
    if code == UNIQUE_VIOLATION || status == StatusCode::CONFLICT || storage_duplicate {
        return StorageError::Conflict;
    }

    let message = body.message.as_deref().unwrap_or(raw);
    StorageError::Connection(format!("{status}: {message}"))
}

/// `in.(...)` filter value with each id quoted.
fn in_filter<'a>(ids: impl IntoIterator<Item = &'a str>) -> String {
    let quoted: Vec<String> = ids
        .into_iter()
        .map(|id| format!("\"{}\"", id.replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(code: &str, message: &str) -> ApiErrorBody {
        ApiErrorBody {
            code: Some(code.into()),
            message: Some(message.into()),
            ..ApiErrorBody::default()
        }
    }

    #[test]
    fn no_rows_and_missing_table_are_not_found() {
        assert!(matches!(
            classify(StatusCode::NOT_ACCEPTABLE, &body(NO_ROWS, "0 rows"), ""),
            StorageError::NotFound
        ));
        assert!(matches!(
            classify(
                StatusCode::NOT_FOUND,
                &body(UNDEFINED_TABLE, "relation \"articles\" does not exist"),
                ""
            ),
            StorageError::NotFound
        ));
    }

    #[test]
    fn missing_column_is_a_connection_error() {
        let err = classify(
            StatusCode::BAD_REQUEST,
            &body(
                "42703",
                "column \"image_url\" of relation \"articles\" does not exist",
            ),
            "",
        );
        assert!(matches!(err, StorageError::Connection(msg) if msg.contains("image_url")));
    }

    #[test]
    fn duplicates_are_conflicts() {
        assert!(matches!(
            classify(StatusCode::CONFLICT, &body(UNIQUE_VIOLATION, "dup"), ""),
            StorageError::Conflict
        ));
        let storage = ApiErrorBody {
            status_code: Some(serde_json::json!("409")),
            error: Some("Duplicate".into()),
            ..ApiErrorBody::default()
        };
        assert!(matches!(
            classify(StatusCode::BAD_REQUEST, &storage, ""),
            StorageError::Conflict
        ));
    }

    #[test]
    fn other_failures_are_connection_errors() {
        assert!(matches!(
            classify(StatusCode::INTERNAL_SERVER_ERROR, &ApiErrorBody::default(), "boom"),
            StorageError::Connection(msg) if msg.contains("boom")
        ));
    }

    #[test]
    fn in_filter_quotes_ids() {
        assert_eq!(in_filter(["a", "b\"c"]), "in.(\"a\",\"b\\\"c\")");
    }
}
