//! Authentication
//!
//! Password sign-in and sign-up against the managed database's auth API
//! (`/auth/v1`). A successful sign-in yields the access token that
//! [`RestBackend::with_access_token`](super::RestBackend::with_access_token)
//! sends on every request.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::rest::{check_status, transport_error};
use super::{BackendError, BackendResult};
use crate::config::BackendConfig;
use crate::models::Role;

/// An authenticated account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Tokens for a signed-in user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    pub user: AuthUser,
}

/// Sign-up either starts a session or, when email confirmation is on,
/// returns the bare user
#[derive(Deserialize)]
#[serde(untagged)]
enum SignUpReply {
    Session(AuthSession),
    User(AuthUser),
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct SignUpBody<'a> {
    email: &'a str,
    password: &'a str,
    data: SignUpMetadata<'a>,
}

#[derive(Serialize)]
struct SignUpMetadata<'a> {
    full_name: &'a str,
    role: Role,
}

/// Error bodies use different field names depending on the endpoint
#[derive(Deserialize)]
struct AuthErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Client for the auth endpoints
pub struct AuthClient {
    client: Client,
    auth_url: String,
    anon_key: String,
}

impl AuthClient {
    pub fn new(config: &BackendConfig) -> BackendResult<Self> {
        let url = config
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| BackendError::NotConfigured("backend url missing".to_string()))?;
        let anon_key = config
            .anon_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| BackendError::NotConfigured("anon key missing".to_string()))?;

        let client = Client::builder()
            .timeout(std::time::Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            auth_url: format!("{}/auth/v1", url.trim_end_matches('/')),
            anon_key,
        })
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> BackendResult<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/{}", self.auth_url, path))
            .header("apikey", &self.anon_key)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        check_status(response).await.map_err(auth_error)
    }

    /// Sign in with email and password
    pub async fn sign_in(&self, email: &str, password: &str) -> BackendResult<AuthSession> {
        let session: AuthSession = self
            .post("token?grant_type=password", &Credentials { email, password })
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        tracing::info!(user_id = %session.user.id, "Signed in");
        Ok(session)
    }

    /// Create an account; the name and role are stored as user metadata
    ///
    /// Returns the new user and, unless email confirmation is pending, a session.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
        role: Role,
    ) -> BackendResult<(AuthUser, Option<AuthSession>)> {
        let body = SignUpBody {
            email,
            password,
            data: SignUpMetadata { full_name, role },
        };
        let reply: SignUpReply = self
            .post("signup", &body)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        let result = match reply {
            SignUpReply::Session(session) => (session.user.clone(), Some(session)),
            SignUpReply::User(user) => (user, None),
        };
        tracing::info!(user_id = %result.0.id, confirmed = result.1.is_some(), "Signed up");
        Ok(result)
    }
}

/// Rewrite API errors into `Auth` with the readable message
fn auth_error(e: BackendError) -> BackendError {
    match e {
        BackendError::Api { message, .. }
        | BackendError::NotFound(message)
        | BackendError::Conflict(message) => BackendError::Auth(error_message(&message)),
        other => other,
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<AuthErrorBody>(body)
        .ok()
        .and_then(|b| b.error_description.or(b.msg).or(b.message))
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_config() {
        assert!(matches!(
            AuthClient::new(&BackendConfig::default()),
            Err(BackendError::NotConfigured(_))
        ));

        let client = AuthClient::new(&BackendConfig {
            url: Some("https://demo.supabase.co/".to_string()),
            anon_key: Some("anon".to_string()),
            ..BackendConfig::default()
        })
        .unwrap();
        assert_eq!(client.auth_url, "https://demo.supabase.co/auth/v1");
    }

    #[test]
    fn test_sign_up_reply_shapes() {
        let session = r#"{
            "access_token": "jwt", "token_type": "bearer", "expires_in": 3600,
            "refresh_token": "r", "user": {"id": "u-1", "email": "a@example.com"}
        }"#;
        match serde_json::from_str::<SignUpReply>(session).unwrap() {
            SignUpReply::Session(s) => {
                assert_eq!(s.access_token, "jwt");
                assert_eq!(s.user.id, "u-1");
            }
            SignUpReply::User(_) => panic!("Expected a session"),
        }

        let pending = r#"{"id": "u-2", "email": "b@example.com", "confirmation_sent_at": "2024-01-01T00:00:00Z"}"#;
        assert!(matches!(
            serde_json::from_str::<SignUpReply>(pending).unwrap(),
            SignUpReply::User(AuthUser { ref id, .. }) if id == "u-2"
        ));
    }

    #[test]
    fn test_sign_up_body() {
        let body = SignUpBody {
            email: "a@example.com",
            password: "secret",
            data: SignUpMetadata {
                full_name: "Alice",
                role: Role::Teacher,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["data"]["full_name"], "Alice");
        assert_eq!(json["data"]["role"], "teacher");
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            error_message(r#"{"error": "invalid_grant", "error_description": "Invalid login credentials"}"#),
            "Invalid login credentials"
        );
        assert_eq!(
            error_message(r#"{"code": 422, "msg": "User already registered"}"#),
            "User already registered"
        );
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");

        let err = auth_error(BackendError::Api {
            status: 400,
            message: r#"{"error_description": "Email not confirmed"}"#.to_string(),
        });
        assert_eq!(err.to_string(), "Authentication failed: Email not confirmed");
    }
}
