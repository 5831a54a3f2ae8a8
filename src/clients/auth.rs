//! Authenticated HTTP session
//!
//! Logs in once with a login/password pair, attaches the bearer token to every
//! call and transparently logs in again when the server answers 401. Clients
//! hold an `AuthSession` instead of re-implementing the handshake.

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::error::ClientError;

/// Login/password pair sent to the login endpoint
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

impl Credentials {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }
}

/// Custom Debug that redacts the password to prevent accidental log leakage.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    #[serde(alias = "token")]
    access_token: String,
}

pub struct AuthSession {
    http: reqwest::Client,
    base_url: String,
    login_path: String,
    credentials: Credentials,
    token: RwLock<Option<String>>,
}

impl AuthSession {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        login_path: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            login_path: login_path.into(),
            credentials,
            token: RwLock::new(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Log in and cache the fresh token
    pub async fn login(&self) -> Result<String, ClientError> {
        let url = self.url(&self.login_path);
        debug!(%url, login = %self.credentials.login, "Logging in");

        let response = self.http.post(&url).json(&self.credentials).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Auth {
                url,
                message: format!("status {}: {}", status, body),
            });
        }

        let body: LoginResponse = response
            .json()
            .await
            .map_err(|e| ClientError::decode(&url, e))?;

        *self.token.write().await = Some(body.access_token.clone());
        info!(base_url = %self.base_url, "Session established");
        Ok(body.access_token)
    }

    async fn current_token(&self) -> Result<String, ClientError> {
        if let Some(token) = self.token.read().await.as_ref() {
            return Ok(token.clone());
        }
        self.login().await
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        token: &str,
    ) -> Result<Response, ClientError> {
        Ok(self
            .http
            .post(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await?)
    }

    /// POST `body` to `path`, re-authenticating once on 401
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Response, ClientError> {
        let token = self.current_token().await?;
        let response = self.send(path, body, &token).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return check_status(response).await;
        }

        warn!(base_url = %self.base_url, path, "Session expired, logging in again");
        *self.token.write().await = None;
        let token = self.login().await?;
        let response = self.send(path, body, &token).await?;
        check_status(response).await
    }

    /// POST and decode a JSON response
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let response = self.post(path, body).await?;
        response
            .json()
            .await
            .map_err(|e| ClientError::decode(self.url(path), e))
    }

    /// POST and read a hash returned either as a JSON string or as plain text
    pub async fn post_for_hash<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<String, ClientError> {
        let text = self.post(path, body).await?.text().await?;
        parse_hash(&text).ok_or_else(|| ClientError::decode(self.url(path), "empty hash"))
    }
}

async fn check_status(response: Response) -> Result<Response, ClientError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status { url, status, body })
}

fn parse_hash(text: &str) -> Option<String> {
    let hash = match serde_json::from_str::<String>(text) {
        Ok(hash) => hash,
        Err(_) => text.trim().to_string(),
    };
    if hash.is_empty() {
        None
    } else {
        Some(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hash_json_string() {
        assert_eq!(parse_hash("\"0xabc\""), Some("0xabc".to_string()));
    }

    #[test]
    fn test_parse_hash_plain_text() {
        assert_eq!(parse_hash(" 0xabc\n"), Some("0xabc".to_string()));
    }

    #[test]
    fn test_parse_hash_empty() {
        assert_eq!(parse_hash(""), None);
        assert_eq!(parse_hash("\"\""), None);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let session = AuthSession::new(
            reqwest::Client::new(),
            "http://localhost:8080/",
            "/login",
            Credentials::new("node", "secret"),
        );
        assert_eq!(session.base_url(), "http://localhost:8080");
        assert_eq!(session.url("/names"), "http://localhost:8080/names");
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let debug = format!("{:?}", Credentials::new("node", "hunter2"));
        assert!(debug.contains("node"));
        assert!(!debug.contains("hunter2"));
    }
}
