//! REST Backend
//!
//! PostgREST-style client for the managed database (`/rest/v1/{table}`).

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use super::changes::{ChangeEvent, ChangeFeed, ChangeKind, ChangeSubscription, Table};
use super::realtime::RealtimeListener;
use super::{Backend, BackendError, BackendResult};
use crate::config::BackendConfig;
use crate::models::{
    ContentItem, ContentPatch, CourseStep, NewContent, NewStep, Profile, ProfilePatch, StepPatch,
};

/// REST client for the managed database
///
/// Mutations that succeed are echoed on the local change feed.
pub struct RestBackend {
    client: Client,
    project_url: String,
    rest_url: String,
    anon_key: String,
    access_token: Option<String>,
    feed: ChangeFeed,
}

impl RestBackend {
    /// Create a client from configuration
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

        let project_url = url.trim_end_matches('/').to_string();
        Ok(Self {
            client,
            rest_url: format!("{}/rest/v1", project_url),
            project_url,
            anon_key,
            access_token: config.access_token.clone(),
            feed: ChangeFeed::default(),
        })
    }

    /// URL of a table with a query string
    fn table_url(&self, table: Table, query: &str) -> String {
        if query.is_empty() {
            format!("{}/{}", self.rest_url, table.name())
        } else {
            format!("{}/{}?{}", self.rest_url, table.name(), query)
        }
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        let token = self.access_token.as_deref().unwrap_or(&self.anon_key);
        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
    }

    async fn send(&self, builder: RequestBuilder) -> BackendResult<Response> {
        let response = builder.send().await.map_err(transport_error)?;
        check_status(response).await
    }

    async fn select<T: DeserializeOwned>(&self, table: Table, query: &str) -> BackendResult<Vec<T>> {
        let url = self.table_url(table, &format!("select=*{}", query));
        let response = self.send(self.request(Method::GET, url)).await?;
        response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn insert<B, T>(&self, table: Table, body: &B) -> BackendResult<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let builder = self
            .request(Method::POST, self.table_url(table, "select=*"))
            .header("Prefer", "return=representation")
            .json(&[body]);
        let rows: Vec<T> = self
            .send(builder)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::Decode(format!("insert into {} returned no row", table)))
    }

    async fn patch<B: Serialize + Sync>(
        &self,
        table: Table,
        id: &str,
        body: &B,
        representation: bool,
    ) -> BackendResult<Response> {
        let query = format!("id=eq.{}", urlencoding::encode(id));
        let prefer = if representation {
            "return=representation"
        } else {
            "return=minimal"
        };
        let builder = self
            .request(Method::PATCH, self.table_url(table, &query))
            .header("Prefer", prefer)
            .json(body);
        self.send(builder).await
    }

    async fn delete(&self, table: Table, id: &str) -> BackendResult<()> {
        let query = format!("id=eq.{}", urlencoding::encode(id));
        self.send(self.request(Method::DELETE, self.table_url(table, &query)))
            .await?;
        Ok(())
    }

    fn echo(&self, table: Table, kind: ChangeKind, id: impl ToString) {
        self.feed.publish(ChangeEvent::new(table, kind, id));
    }

    /// Builder method: act as a signed-in user
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Forward changes made by other clients to this backend's feed
    ///
    /// Must be called inside a tokio runtime. The listener reconnects until
    /// the returned handle is aborted.
    pub fn listen(&self, tables: &[Table]) -> JoinHandle<()> {
        let token = self.access_token.as_deref().unwrap_or(&self.anon_key);
        RealtimeListener::new(&self.project_url, &self.anon_key, token, self.feed.clone())
            .tables(tables.iter().copied())
            .spawn()
    }
}

/// Map a reqwest transport failure
pub(super) fn transport_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout
    } else if e.is_connect() {
        BackendError::Unavailable
    } else {
        BackendError::Request(e)
    }
}

/// Turn a non-2xx response into an error carrying the body text
pub(super) async fn check_status(response: Response) -> BackendResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    Err(match status.as_u16() {
        404 => BackendError::NotFound(message),
        409 => BackendError::Conflict(message),
        code => BackendError::Api {
            status: code,
            message,
        },
    })
}

#[derive(Deserialize)]
struct SettingRow {
    value: Option<String>,
}

#[async_trait]
impl Backend for RestBackend {
    async fn fetch_profile(&self, id: &str) -> BackendResult<Option<Profile>> {
        let query = format!("&id=eq.{}&limit=1", urlencoding::encode(id));
        let rows: Vec<Profile> = self.select(Table::Profiles, &query).await?;
        Ok(rows.into_iter().next())
    }

    async fn list_students(&self) -> BackendResult<Vec<Profile>> {
        self.select(Table::Profiles, "&role=eq.student&order=full_name.asc")
            .await
    }

    async fn insert_profile(&self, profile: &Profile) -> BackendResult<Profile> {
        let stored: Profile = self.insert(Table::Profiles, profile).await?;
        self.echo(Table::Profiles, ChangeKind::Insert, &stored.id);
        Ok(stored)
    }

    async fn update_profile(&self, id: &str, patch: &ProfilePatch) -> BackendResult<()> {
        self.patch(Table::Profiles, id, patch, false).await?;
        self.echo(Table::Profiles, ChangeKind::Update, id);
        Ok(())
    }

    async fn list_content(&self) -> BackendResult<Vec<ContentItem>> {
        self.select(Table::Content, "&order=created_at.desc").await
    }

    async fn insert_content(&self, item: &NewContent) -> BackendResult<ContentItem> {
        let stored: ContentItem = self.insert(Table::Content, item).await?;
        self.echo(Table::Content, ChangeKind::Insert, stored.id);
        Ok(stored)
    }

    async fn update_content(&self, id: i64, patch: &ContentPatch) -> BackendResult<()> {
        self.patch(Table::Content, &id.to_string(), patch, false)
            .await?;
        self.echo(Table::Content, ChangeKind::Update, id);
        Ok(())
    }

    async fn delete_content(&self, id: i64) -> BackendResult<()> {
        self.delete(Table::Content, &id.to_string()).await?;
        self.echo(Table::Content, ChangeKind::Delete, id);
        Ok(())
    }

    async fn list_steps(&self, course_id: i64) -> BackendResult<Vec<CourseStep>> {
        let query = format!("&course_id=eq.{}&order=sequence_order.asc", course_id);
        self.select(Table::CourseSteps, &query).await
    }

    async fn insert_step(&self, step: &NewStep) -> BackendResult<CourseStep> {
        let stored: CourseStep = self.insert(Table::CourseSteps, step).await?;
        self.echo(Table::CourseSteps, ChangeKind::Insert, stored.id);
        Ok(stored)
    }

    async fn update_step(&self, id: i64, patch: &StepPatch) -> BackendResult<CourseStep> {
        let rows: Vec<CourseStep> = self
            .patch(Table::CourseSteps, &id.to_string(), patch, true)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        let stored = rows
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::NotFound(format!("course step {}", id)))?;
        self.echo(Table::CourseSteps, ChangeKind::Update, id);
        Ok(stored)
    }

    async fn delete_step(&self, id: i64) -> BackendResult<()> {
        self.delete(Table::CourseSteps, &id.to_string()).await?;
        self.echo(Table::CourseSteps, ChangeKind::Delete, id);
        Ok(())
    }

    async fn fetch_setting(&self, key: &str) -> BackendResult<Option<String>> {
        let query = format!("&key=eq.{}&limit=1", urlencoding::encode(key));
        let rows: Vec<SettingRow> = self.select(Table::SystemSettings, &query).await?;
        Ok(rows.into_iter().next().and_then(|row| row.value))
    }

    fn changes(&self) -> ChangeSubscription {
        self.feed.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BackendConfig {
        BackendConfig {
            url: Some("https://demo.supabase.co/".to_string()),
            anon_key: Some("anon".to_string()),
            ..BackendConfig::default()
        }
    }

    #[test]
    fn test_requires_url_and_key() {
        assert!(matches!(
            RestBackend::new(&BackendConfig::default()),
            Err(BackendError::NotConfigured(_))
        ));

        let no_key = BackendConfig {
            anon_key: None,
            ..config()
        };
        assert!(matches!(
            RestBackend::new(&no_key),
            Err(BackendError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_table_url() {
        let backend = RestBackend::new(&config()).unwrap();
        assert_eq!(
            backend.table_url(Table::CourseSteps, "select=*&course_id=eq.4"),
            "https://demo.supabase.co/rest/v1/course_steps?select=*&course_id=eq.4"
        );
        assert_eq!(
            backend.table_url(Table::Profiles, ""),
            "https://demo.supabase.co/rest/v1/profiles"
        );
    }

    #[test]
    fn test_request_headers() {
        let backend = RestBackend::new(&config()).unwrap();
        let request = backend
            .request(Method::GET, backend.table_url(Table::Content, "select=*"))
            .build()
            .unwrap();

        assert_eq!(request.headers()["apikey"], "anon");
        assert_eq!(request.headers()["authorization"], "Bearer anon");

        let signed_in = RestBackend::new(&config()).unwrap().with_access_token("jwt");
        let request = signed_in
            .request(Method::GET, signed_in.table_url(Table::SystemSettings, "select=*"))
            .build()
            .unwrap();
        assert_eq!(request.headers()["apikey"], "anon");
        assert_eq!(request.headers()["authorization"], "Bearer jwt");
    }
}
