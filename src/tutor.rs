//! Tutor Chat
//!
//! The portal side of the AI tutor: a chat transcript plus a client for the
//! proxy server. Transport failures never reach the student; they become a
//! fixed reply in the transcript.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::ai::{AiService, ChatTurn, Classification};
use crate::classroom::Classroom;
use crate::models::QuizQuestion;

/// Proxy base URL used when none is configured
pub const DEFAULT_API_URL: &str = "http://localhost:3001/api/ai";

/// First message of every transcript
pub const GREETING: &str =
    "Hi! I'm Pesta, your AI Tutor. Ask me anything about your current lesson.";

/// Reply shown when the proxy cannot be reached
pub const UNREACHABLE_REPLY: &str =
    "I'm having trouble retrieving an answer right now. Please ensure the AI Server is running.";

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("AI server unreachable: {0}")]
    Request(#[from] reqwest::Error),

    #[error("AI server error: {0}")]
    Status(u16),
}

/// Anything that can answer a tutor chat message
#[async_trait]
pub trait TutorApi: Send + Sync {
    async fn chat(
        &self,
        message: &str,
        context: Option<&str>,
        history: &[ChatTurn],
    ) -> Result<String, ProxyError>;
}

/// HTTP client for the proxy's `/api/ai/*` endpoints
#[derive(Debug, Clone)]
pub struct ProxyClient {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct ChatBody<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a str>,
    history: &'a [ChatTurn],
}

#[derive(Deserialize)]
struct ChatReply {
    response: String,
}

#[derive(Deserialize)]
struct QuestionsReply {
    #[serde(default)]
    questions: Vec<QuizQuestion>,
}

impl ProxyClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ProxyError> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<reqwest::Response, ProxyError> {
        let response = self.client.post(self.url(endpoint)).json(body).send().await?;
        if !response.status().is_success() {
            return Err(ProxyError::Status(response.status().as_u16()));
        }
        Ok(response)
    }

    /// Generated diagnostic questions; empty on any failure
    pub async fn diagnostic(&self, topic: &str) -> Vec<QuizQuestion> {
        let result = async {
            let reply: QuestionsReply = self
                .post("diagnostic", &serde_json::json!({ "topic": topic }))
                .await?
                .json()
                .await?;
            Ok::<_, ProxyError>(reply.questions)
        }
        .await;

        result.unwrap_or_else(|e| {
            tracing::error!(error = %e, "Diagnostic request failed");
            Vec::new()
        })
    }

    /// Classification of a performance record; None on any failure
    pub async fn classify(&self, performance: &serde_json::Value) -> Option<Classification> {
        let result = async {
            let reply: Classification = self
                .post("classify", &serde_json::json!({ "performance": performance }))
                .await?
                .json()
                .await?;
            Ok::<_, ProxyError>(reply)
        }
        .await;

        match result {
            Ok(classification) => Some(classification),
            Err(e) => {
                tracing::error!(error = %e, "Classification request failed");
                None
            }
        }
    }

    /// Placement questions; empty on any failure
    pub async fn placement(&self) -> Vec<QuizQuestion> {
        let result = async {
            let reply: QuestionsReply = self
                .post("placement", &serde_json::json!({}))
                .await?
                .json()
                .await?;
            Ok::<_, ProxyError>(reply.questions)
        }
        .await;

        result.unwrap_or_else(|e| {
            tracing::error!(error = %e, "Placement request failed");
            Vec::new()
        })
    }
}

#[async_trait]
impl TutorApi for ProxyClient {
    async fn chat(
        &self,
        message: &str,
        context: Option<&str>,
        history: &[ChatTurn],
    ) -> Result<String, ProxyError> {
        let body = ChatBody {
            message,
            context,
            history,
        };
        let reply: ChatReply = self.post("chat", &body).await?.json().await?;
        Ok(reply.response)
    }
}

/// In-process tutor, used when no proxy is running
#[async_trait]
impl TutorApi for AiService {
    async fn chat(
        &self,
        message: &str,
        context: Option<&str>,
        history: &[ChatTurn],
    ) -> Result<String, ProxyError> {
        Ok(AiService::chat(self, message, context, history).await)
    }
}

/// Who wrote a transcript message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub sender: Sender,
    pub text: String,
}

/// A student's conversation with the tutor
pub struct TutorSession<T: TutorApi> {
    api: T,
    messages: Vec<Message>,
    context: String,
    typing: bool,
    next_id: u64,
}

impl<T: TutorApi> TutorSession<T> {
    pub fn new(api: T) -> Self {
        Self {
            api,
            messages: vec![Message {
                id: 1,
                sender: Sender::Bot,
                text: GREETING.to_string(),
            }],
            context: String::new(),
            typing: false,
            next_id: 2,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_typing(&self) -> bool {
        self.typing
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    /// Replace the lesson context sent with each message
    pub fn update_context(&mut self, context: impl Into<String>) {
        self.context = context.into();
    }

    /// Use the classroom's current step as the lesson context
    ///
    /// Call after every step change so questions are answered about the
    /// step on screen.
    pub fn follow(&mut self, room: &Classroom) {
        self.context = room.lesson_context().unwrap_or_default();
    }

    /// History as sent to the proxy: every message before the new one
    fn history(&self) -> Vec<ChatTurn> {
        self.messages
            .iter()
            .map(|m| {
                let role = match m.sender {
                    Sender::Bot => "pesta",
                    Sender::User => "user",
                };
                ChatTurn::new(role, m.text.clone())
            })
            .collect()
    }

    fn push(&mut self, sender: Sender, text: String) {
        self.messages.push(Message {
            id: self.next_id,
            sender,
            text,
        });
        self.next_id += 1;
    }

    /// Send a message and append the tutor's reply; returns the reply
    pub async fn send(&mut self, text: &str) -> String {
        let history = self.history();
        self.push(Sender::User, text.to_string());
        self.typing = true;

        let context = (!self.context.is_empty()).then_some(self.context.as_str());
        let reply = match self.api.chat(text, context, &history).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(error = %e, "Chat error");
                UNREACHABLE_REPLY.to_string()
            }
        };

        self.push(Sender::Bot, reply.clone());
        self.typing = false;
        reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{ScriptedModel, MISSING_KEY_REPLY};
    use crate::api::{build_router, AppState};
    use crate::backend::{Backend, MemoryBackend};
    use crate::classroom::Advance;
    use crate::config::Config;
    use std::sync::Mutex;

    struct EchoTutor {
        seen: Mutex<Vec<(String, Option<String>, Vec<ChatTurn>)>>,
    }

    #[async_trait]
    impl TutorApi for EchoTutor {
        async fn chat(
            &self,
            message: &str,
            context: Option<&str>,
            history: &[ChatTurn],
        ) -> Result<String, ProxyError> {
            self.seen.lock().unwrap().push((
                message.to_string(),
                context.map(str::to_string),
                history.to_vec(),
            ));
            Ok(format!("echo: {}", message))
        }
    }

    struct DownTutor;

    #[async_trait]
    impl TutorApi for DownTutor {
        async fn chat(&self, _: &str, _: Option<&str>, _: &[ChatTurn]) -> Result<String, ProxyError> {
            Err(ProxyError::Status(502))
        }
    }

    async fn spawn_proxy() -> String {
        let state = AppState::new(AiService::unconfigured(), Config::default());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_router(state)).await.unwrap();
        });
        format!("http://{}/api/ai", addr)
    }

    #[test]
    fn test_session_starts_with_greeting() {
        let session = TutorSession::new(DownTutor);
        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.messages()[0].sender, Sender::Bot);
        assert_eq!(session.messages()[0].text, GREETING);
        assert!(!session.is_typing());
    }

    #[tokio::test]
    async fn test_send_builds_history_before_message() {
        let mut session = TutorSession::new(EchoTutor {
            seen: Mutex::new(Vec::new()),
        });
        session.update_context("Current Step: Loops\nContent:\nfor x in xs");

        assert_eq!(session.send("What is a loop?").await, "echo: What is a loop?");
        session.send("Example?").await;

        let seen = session.api.seen.lock().unwrap();
        let (message, context, history) = &seen[1];
        assert_eq!(message, "Example?");
        assert!(context.as_deref().unwrap().starts_with("Current Step: Loops"));
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].role, "pesta");
        assert_eq!(history[1].role, "user");
        assert_eq!(history[2].content, "echo: What is a loop?");
        assert!(seen[0].2.iter().all(|t| t.content != "What is a loop?"));
    }

    #[tokio::test]
    async fn test_context_follows_classroom() {
        let steps = MemoryBackend::demo().list_steps(1).await.unwrap();
        let mut room = Classroom::new(steps);
        let mut session = TutorSession::new(EchoTutor {
            seen: Mutex::new(Vec::new()),
        });

        session.follow(&room);
        assert!(session.context().starts_with("Current Step: What is AI?"));

        assert_eq!(room.advance().unwrap(), Advance::Moved(1));
        session.follow(&room);
        session.send("Can I get a hint?").await;
        let context = session.api.seen.lock().unwrap()[0].1.clone().unwrap();
        assert!(context.starts_with("Current Step: Learning from data\nContent:\nMachine learning"));

        room.select(0).unwrap();
        session.follow(&room);
        assert!(session.context().starts_with("Current Step: What is AI?"));

        session.follow(&Classroom::new(Vec::new()));
        assert_eq!(session.context(), "");
    }

    #[tokio::test]
    async fn test_transport_failure_yields_fixed_reply() {
        let mut session = TutorSession::new(DownTutor);
        let reply = session.send("hello").await;

        assert_eq!(reply, UNREACHABLE_REPLY);
        assert_eq!(session.messages().len(), 3);
        assert_eq!(session.messages()[2].sender, Sender::Bot);
        assert!(!session.is_typing());
    }

    #[tokio::test]
    async fn test_in_process_tutor() {
        let service = AiService::new(ScriptedModel::replying("Loops repeat work."));
        let mut session = TutorSession::new(service);
        assert_eq!(session.send("loops?").await, "Loops repeat work.");
    }

    #[tokio::test]
    async fn test_unreachable_proxy() {
        let client = ProxyClient::new("http://127.0.0.1:9/api/ai/").unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:9/api/ai");

        let mut session = TutorSession::new(client.clone());
        assert_eq!(session.send("hi").await, UNREACHABLE_REPLY);
        assert!(client.diagnostic("Rust").await.is_empty());
        assert!(client.classify(&serde_json::json!({"score": 3})).await.is_none());
        assert!(client.placement().await.is_empty());
    }

    #[tokio::test]
    async fn test_against_running_proxy() {
        let client = ProxyClient::new(spawn_proxy().await).unwrap();

        let mut session = TutorSession::new(client.clone());
        assert_eq!(session.send("hi").await, MISSING_KEY_REPLY);

        let questions = client.diagnostic("Rust").await;
        assert_eq!(questions.len(), 1);

        let classification = client.classify(&serde_json::json!({"score": 3})).await;
        assert_eq!(classification.unwrap().level, "Beginner");

        assert_eq!(client.placement().await.len(), 10);
    }
}
