//! HTTP/JSON client for a document REST gateway.
//!
//! Paths map one-to-one onto the document tree described in
//! [`crate::remote`]:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | `save_reading` | `POST {base}/users/{uid}/sensor_readings` -> `{"id": ...}` |
//! | `latest_readings` | `GET {base}/users/{uid}/sensor_readings?orderBy=timestamp&direction=desc&limit=N` |
//! | `save_profile` / `get_profile` | `PUT` / `GET {base}/users/{uid}` |
//! | `save_settings` / `get_settings` | `PUT` / `GET {base}/users/{uid}/settings` |
//! | `upload_file` | `PUT {base}/users/{uid}/files/{name}` -> `{"url": ...}` |
//!
//! User ids and file names are percent-encoded as single path segments.
//!
//! # Example
//!
//! ```no_run
//! use airmon_core::http_remote::HttpRemote;
//! use airmon_core::RemoteStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let remote = HttpRemote::new("https://store.example.com/v1", Some("token".into()))?;
//! let latest = remote.latest_readings("u1", 10).await?;
//! println!("{} readings", latest.len());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use airmon_types::{UserProfile, UserSettings};

use crate::remote::{
    FILES, READINGS, RemoteError, RemoteReading, RemoteResult, RemoteStore, SETTINGS, USERS,
    file_path, readings_path, settings_path, user_path,
};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct CreatedDocument {
    id: String,
}

#[derive(Debug, Deserialize)]
struct UploadedFile {
    url: String,
}

/// Remote store backed by HTTP.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: String,
    base: Url,
    token: Option<String>,
}

impl HttpRemote {
    /// Create a client with the default timeout.
    pub fn new(base_url: &str, token: Option<String>) -> RemoteResult<Self> {
        Self::with_timeout(base_url, token, DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom request timeout.
    pub fn with_timeout(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> RemoteResult<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(RemoteError::Other(format!(
                "URL must start with http:// or https://, got: {}",
                base_url
            )));
        }
        let base = Url::parse(&base_url)
            .map_err(|e| RemoteError::Other(format!("Invalid URL {}: {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(RemoteError::Other(format!(
                "URL cannot carry a path: {}",
                base_url
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Other(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            base,
            token,
        })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Append `segments` to the base URL, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> RemoteResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| RemoteError::Other(format!("URL cannot carry a path: {}", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, path: &str, request: RequestBuilder) -> RemoteResult<Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| RemoteError::Network(format!("{}/{}: {}", self.base_url, path, e)))?;
        debug!("{} -> {}", path, response.status());
        Ok(response)
    }

    async fn handle_response<T: DeserializeOwned>(
        path: &str,
        response: Response,
    ) -> RemoteResult<T> {
        let status = response.status();
        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| RemoteError::InvalidDocument(e.to_string()))
        } else {
            Err(Self::error_from(path, response).await)
        }
    }

    async fn handle_empty(path: &str, response: Response) -> RemoteResult<()> {
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from(path, response).await)
        }
    }

    async fn error_from(path: &str, response: Response) -> RemoteError {
        let status = response.status();
        let message = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
            .unwrap_or_else(|| status.to_string());
        RemoteError::from_status(status.as_u16(), path, message)
    }

    async fn get_optional<T: DeserializeOwned>(
        &self,
        path: &str,
        segments: &[&str],
    ) -> RemoteResult<Option<T>> {
        let response = self.send(path, self.client.get(self.url(segments)?)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::handle_response(path, response).await.map(Some)
    }
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn save_reading(&self, user_id: &str, reading: &RemoteReading) -> RemoteResult<String> {
        let path = readings_path(user_id);
        let request = self
            .client
            .post(self.url(&[USERS, user_id, READINGS])?)
            .json(reading);
        let response = self.send(&path, request).await?;
        let created: CreatedDocument = Self::handle_response(&path, response).await?;
        Ok(created.id)
    }

    async fn latest_readings(
        &self,
        user_id: &str,
        limit: usize,
    ) -> RemoteResult<Vec<RemoteReading>> {
        let path = readings_path(user_id);
        let limit = limit.to_string();
        let request = self.client.get(self.url(&[USERS, user_id, READINGS])?).query(&[
            ("orderBy", "timestamp"),
            ("direction", "desc"),
            ("limit", limit.as_str()),
        ]);
        let response = self.send(&path, request).await?;
        Self::handle_response(&path, response).await
    }

    async fn save_profile(&self, profile: &UserProfile) -> RemoteResult<()> {
        let path = user_path(&profile.id);
        let request = self.client.put(self.url(&[USERS, &profile.id])?).json(profile);
        let response = self.send(&path, request).await?;
        Self::handle_empty(&path, response).await
    }

    async fn get_profile(&self, user_id: &str) -> RemoteResult<Option<UserProfile>> {
        self.get_optional(&user_path(user_id), &[USERS, user_id])
            .await
    }

    async fn save_settings(&self, user_id: &str, settings: &UserSettings) -> RemoteResult<()> {
        let path = settings_path(user_id);
        let request = self
            .client
            .put(self.url(&[USERS, user_id, SETTINGS])?)
            .json(settings);
        let response = self.send(&path, request).await?;
        Self::handle_empty(&path, response).await
    }

    async fn get_settings(&self, user_id: &str) -> RemoteResult<Option<UserSettings>> {
        self.get_optional(&settings_path(user_id), &[USERS, user_id, SETTINGS])
            .await
    }

    async fn upload_file(&self, user_id: &str, name: &str, data: &[u8]) -> RemoteResult<String> {
        let path = file_path(user_id, name);
        let request = self
            .client
            .put(self.url(&[USERS, user_id, FILES, name])?)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data.to_vec());
        let response = self.send(&path, request).await?;
        let uploaded: UploadedFile = Self::handle_response(&path, response).await?;
        Ok(uploaded.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let remote = HttpRemote::new("https://store.example.com/v1/", None).unwrap();
        assert_eq!(remote.base_url(), "https://store.example.com/v1");
        assert_eq!(
            remote.url(&[USERS, "u1", READINGS]).unwrap().as_str(),
            "https://store.example.com/v1/users/u1/sensor_readings"
        );
    }

    #[test]
    fn test_segments_are_percent_encoded() {
        let remote = HttpRemote::new("https://store.example.com/v1", None).unwrap();
        let url = remote
            .url(&[USERS, "u/1", FILES, "a b#1.csv"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://store.example.com/v1/users/u%2F1/files/a%20b%231.csv"
        );
        assert_eq!(url.fragment(), None);

        let root = HttpRemote::new("http://127.0.0.1:8080/", None).unwrap();
        assert_eq!(
            root.url(&[USERS, "u1", SETTINGS]).unwrap().as_str(),
            "http://127.0.0.1:8080/users/u1/settings"
        );
    }

    #[test]
    fn test_client_invalid_url() {
        let result = HttpRemote::new("store.example.com", None);
        assert!(matches!(result, Err(RemoteError::Other(_))));
    }

    #[tokio::test]
    async fn test_unreachable_store_is_network_error() {
        let remote =
            HttpRemote::with_timeout("http://127.0.0.1:9", None, Duration::from_millis(500))
                .unwrap();
        let err = remote.get_settings("u1").await.unwrap_err();
        assert!(matches!(err, RemoteError::Network(_)));
    }
}
