use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::generation::{GenerationClient, GenerationError};
use crate::history::HistoryStack;
use crate::prompts::{self, Enhancement, ValidationError};
use crate::session::{GeneratedArtifact, Message, SessionStore};
use crate::storage::PersistentStore;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkbenchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("no component to iterate on")]
    NothingToIterate,
}

/// Snapshot of the history position, for callers that render undo/redo controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStatus {
    pub can_undo: bool,
    pub can_redo: bool,
    pub len: usize,
}

/// Wires the generation client, session state, history and storage together
/// for the generate / iterate / undo / redo flows.
///
/// Keeps `current_artifact` in the session aligned with the history cursor.
pub struct Workbench {
    client: GenerationClient,
    session: SessionStore,
    history: Mutex<HistoryStack>,
    store: PersistentStore,
    runs: AtomicU64,
}

/// Clears `is_generating` when a run ends, however it ends, unless a newer run has started.
struct IdleOnDrop<'a> {
    workbench: &'a Workbench,
    run: u64,
}

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        if self.workbench.runs.load(Ordering::SeqCst) == self.run {
            self.workbench.session.set_generating(false);
        }
    }
}

impl Workbench {
    pub fn new(client: GenerationClient, session: SessionStore, history: HistoryStack, store: PersistentStore) -> Self {
        Self { client, session, history: Mutex::new(history), store, runs: AtomicU64::new(0) }
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn store(&self) -> &PersistentStore {
        &self.store
    }

    pub fn client(&self) -> &GenerationClient {
        &self.client
    }

    pub async fn history_status(&self) -> HistoryStatus {
        let h = self.history.lock().await;
        HistoryStatus { can_undo: h.can_undo(), can_redo: h.can_redo(), len: h.len() }
    }

    pub fn configure(&self, credential: &str) {
        self.client.initialize(credential);
        self.session.set_credential(Some(credential.to_string()));
        self.store.credential().save(credential);
    }

    /// Forgets the credential in the client, session state and storage.
    pub fn forget_credential(&self) {
        self.client.clear_credential();
        self.session.set_credential(None);
        self.store.credential().remove();
    }

    /// Reloads the saved credential and artifacts from storage.
    pub async fn restore(&self) {
        if let Some(credential) = self.store.credential().get() {
            self.client.initialize(credential.as_str());
            self.session.set_credential(Some(credential));
        }

        let mut saved = self.store.get_all().await;
        saved.reverse();
        let mut history = self.history.lock().await;
        history.load(saved);
        let current = history.current().cloned();
        if let Some(a) = &current {
            self.session.load_conversation(a.messages.clone());
        }
        info!(entries = history.len(), "restored history");
        self.session.set_current_artifact(current);
    }

    pub async fn submit(&self, prompt: &str, enhancements: &[Enhancement]) -> Result<GeneratedArtifact, WorkbenchError> {
        prompts::validate(prompt)?;
        let request = prompts::enhance(prompt, enhancements);
        self.run(prompt, prompt, &request, None).await
    }

    pub async fn iterate(&self, feedback: &str) -> Result<GeneratedArtifact, WorkbenchError> {
        prompts::validate_feedback(feedback)?;
        let current = self.session.current_artifact().ok_or(WorkbenchError::NothingToIterate)?;
        let request = prompts::build_iteration_prompt(&current.prompt, feedback, &current.code);
        self.run(&current.prompt, feedback, &request, Some(&current.code)).await
    }

    async fn run(
        &self,
        artifact_prompt: &str,
        user_turn: &str,
        request: &str,
        existing_code: Option<&str>,
    ) -> Result<GeneratedArtifact, WorkbenchError> {
        let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        self.session.set_error(None);
        self.session.set_generating(true);
        let _idle = IdleOnDrop { workbench: self, run };

        let conversation = self.session.conversation();
        let code = match self.client.generate(request, &conversation, existing_code).await {
            Ok(code) => code,
            Err(GenerationError::Cancelled) => return Err(GenerationError::Cancelled.into()),
            Err(e) => {
                warn!(error = %e, "generation failed");
                self.session.set_error(Some(e.to_string()));
                return Err(e.into());
            }
        };

        let user = Message::user(user_turn);
        let reply = Message::assistant(if existing_code.is_some() { "Component updated" } else { "Component generated" });
        let mut messages = conversation;
        messages.push(user.clone());
        messages.push(reply.clone());
        let artifact = GeneratedArtifact::new(code, artifact_prompt, messages);

        self.session.add_message(user);
        self.session.add_message(reply);
        self.session.set_current_artifact(Some(artifact.clone()));
        self.history.lock().await.push(artifact.clone());
        self.store.save(&artifact).await;
        info!(id = %artifact.id, bytes = artifact.code.len(), "artifact accepted");
        Ok(artifact)
    }

    pub fn cancel(&self) {
        self.client.cancel_pending();
        self.session.set_generating(false);
    }

    pub async fn undo(&self) -> Option<GeneratedArtifact> {
        let found = self.history.lock().await.undo().cloned();
        if found.is_some() {
            self.session.set_current_artifact(found.clone());
        }
        found
    }

    pub async fn redo(&self) -> Option<GeneratedArtifact> {
        let found = self.history.lock().await.redo().cloned();
        if found.is_some() {
            self.session.set_current_artifact(found.clone());
        }
        found
    }

    /// Clears the session (credential kept) and the in-memory history. Stored artifacts stay.
    pub async fn new_session(&self) {
        self.client.cancel_pending();
        self.session.reset();
        self.history.lock().await.clear();
    }
}
