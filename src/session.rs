use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: i64,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: now_millis(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// A generated component together with the request that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedArtifact {
    pub id: String,
    pub code: String,
    pub prompt: String,
    pub timestamp: i64,
    pub messages: Vec<Message>,
}

impl GeneratedArtifact {
    pub fn new(code: impl Into<String>, prompt: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            code: code.into(),
            prompt: prompt.into(),
            timestamp: now_millis(),
            messages,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    #[serde(skip_serializing)]
    pub credential: Option<String>,
    pub current_artifact: Option<GeneratedArtifact>,
    pub is_generating: bool,
    pub last_error: Option<String>,
    pub conversation: Vec<Message>,
}

impl SessionState {
    pub fn has_credential(&self) -> bool {
        self.credential.as_deref().is_some_and(|c| !c.is_empty())
    }

    pub fn can_generate(&self) -> bool {
        self.has_credential() && !self.is_generating
    }
}

/// Owner of the single [`SessionState`] of a running process.
///
/// Every mutator publishes the new snapshot to subscribers, so derived values
/// read from a received snapshot are always current.
pub struct SessionStore {
    tx: watch::Sender<SessionState>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState::default());
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    pub fn has_credential(&self) -> bool {
        self.tx.borrow().has_credential()
    }

    pub fn can_generate(&self) -> bool {
        self.tx.borrow().can_generate()
    }

    pub fn conversation(&self) -> Vec<Message> {
        self.tx.borrow().conversation.clone()
    }

    pub fn current_artifact(&self) -> Option<GeneratedArtifact> {
        self.tx.borrow().current_artifact.clone()
    }

    pub fn set_credential(&self, credential: Option<String>) {
        self.tx.send_modify(|s| s.credential = credential);
    }

    pub fn set_current_artifact(&self, artifact: Option<GeneratedArtifact>) {
        self.tx.send_modify(|s| s.current_artifact = artifact);
    }

    pub fn set_generating(&self, is_generating: bool) {
        self.tx.send_modify(|s| s.is_generating = is_generating);
    }

    pub fn set_error(&self, error: Option<String>) {
        self.tx.send_modify(|s| s.last_error = error);
    }

    pub fn add_message(&self, message: Message) {
        self.tx.send_modify(|s| s.conversation.push(message));
    }

    pub fn load_conversation(&self, messages: Vec<Message>) {
        self.tx.send_modify(|s| s.conversation = messages);
    }

    pub fn clear_conversation(&self) {
        self.tx.send_modify(|s| s.conversation.clear());
    }

    /// Clears everything except the credential.
    pub fn reset(&self) {
        self.tx.send_modify(|s| {
            let credential = s.credential.take();
            *s = SessionState {
                credential,
                ..SessionState::default()
            };
        });
    }
}
