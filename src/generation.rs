//! LLM request lifecycle: request assembly, supersede-on-new-call cancellation,
//! response cleanup and error classification.

use std::borrow::Cow;
use std::sync::{Arc, LazyLock, Mutex, RwLock};

use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::models::{ChatMessage, ChatRequest, ChatTransport, SamplingParams, TransportError};
use crate::session::{Message, Role};

pub const SYSTEM_PROMPT: &str = "You are an expert Svelte developer. Generate complete, production-ready Svelte components based on user requirements.

CRITICAL RULES:
1. Output ONLY valid Svelte component code - no explanations, no markdown
2. Use Svelte 4+ syntax with script, style, and markup sections
3. Make components fully functional and interactive
4. Use plain JavaScript (no TypeScript) in script tags
5. Include proper event handlers, state management, and reactivity
6. Add professional styling with scoped CSS
7. Make components responsive and accessible
8. Use semantic HTML and ARIA attributes where appropriate
9. Include smooth transitions and animations where suitable
10. Ensure code is clean, optimized, and follows best practices

Component Requirements:
- Self-contained (no external dependencies except Svelte)
- Production-ready with error handling
- Responsive design (mobile-first)
- Accessible (WCAG 2.1 AA compliant)
- Performance optimized
- Clean, maintainable code

Output Format: Return ONLY the complete .svelte file content, no code blocks or explanations.";

pub const SAMPLING: SamplingParams = SamplingParams {
    model: "gpt-4-turbo-preview",
    temperature: 0.7,
    max_tokens: 4000,
    presence_penalty: 0.1,
    frequency_penalty: 0.1,
};

/// How many trailing conversation messages are considered for request context.
pub const CONTEXT_WINDOW: usize = 5;

pub const FALLBACK_COMPONENT: &str = "<script>
  // Component logic
  let message = 'Component generated';
</script>

<div>
  <p>{message}</p>
</div>

<style>
  div {
    padding: 1rem;
  }
</style>";

static FENCE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"```[A-Za-z0-9_+.-]*[ \t]*\r?\n?").ok());

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("API key not configured")]
    NotConfigured,
    #[error("Generation cancelled")]
    Cancelled,
    #[error("Invalid API key")]
    InvalidCredential,
    #[error("Rate limit exceeded. Please try again later")]
    RateLimited,
    #[error("{0}")]
    GenerationFailed(String),
}

impl From<TransportError> for GenerationError {
    fn from(err: TransportError) -> Self {
        match err.status() {
            Some(401) => GenerationError::InvalidCredential,
            Some(429) => GenerationError::RateLimited,
            _ => {
                let msg = err.message();
                if msg.is_empty() {
                    GenerationError::GenerationFailed("Failed to generate component".into())
                } else {
                    GenerationError::GenerationFailed(msg.to_string())
                }
            }
        }
    }
}

struct InFlight {
    seq: u64,
    token: CancellationToken,
}

pub struct GenerationClient {
    transport: Arc<dyn ChatTransport>,
    credential: RwLock<Option<String>>,
    in_flight: Mutex<Option<InFlight>>,
    seq: Mutex<u64>,
}

impl GenerationClient {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            transport,
            credential: RwLock::new(None),
            in_flight: Mutex::new(None),
            seq: Mutex::new(0),
        }
    }

    /// Sets or rotates the credential used for subsequent requests.
    pub fn initialize(&self, credential: impl Into<String>) {
        let credential = credential.into();
        let mut guard = self.credential.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(credential);
        info!("generation client configured");
    }

    /// Drops the credential; later calls fail with `NotConfigured` until the next `initialize`.
    pub fn clear_credential(&self) {
        *self.credential.write().unwrap_or_else(|e| e.into_inner()) = None;
        info!("generation client credential cleared");
    }

    pub fn is_configured(&self) -> bool {
        self.credential.read().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    /// Cancels the outstanding request, if any.
    pub fn cancel_pending(&self) {
        let previous = self.in_flight.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(prev) = previous {
            debug!(seq = prev.seq, "cancelling in-flight generation");
            prev.token.cancel();
        }
    }

    pub async fn generate(
        &self,
        prompt: &str,
        conversation_history: &[Message],
        existing_code: Option<&str>,
    ) -> Result<String, GenerationError> {
        let credential = self
            .credential
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(GenerationError::NotConfigured)?;

        let (seq, token) = self.begin();
        let _finish = FinishOnDrop { client: self, seq };
        let request = build_request(prompt, conversation_history, existing_code);
        debug!(seq, messages = request.messages.len(), "issuing generation request");

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => Err(GenerationError::Cancelled),
            res = self.transport.complete(&credential, request) => res.map_err(GenerationError::from),
        };

        if token.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }
        outcome.map(|raw| clean_response(&raw))
    }

    fn begin(&self) -> (u64, CancellationToken) {
        self.cancel_pending();
        let seq = {
            let mut s = self.seq.lock().unwrap_or_else(|e| e.into_inner());
            *s += 1;
            *s
        };
        let token = CancellationToken::new();
        *self.in_flight.lock().unwrap_or_else(|e| e.into_inner()) = Some(InFlight { seq, token: token.clone() });
        (seq, token)
    }

    fn finish(&self, seq: u64) {
        let mut guard = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if guard.as_ref().is_some_and(|f| f.seq == seq) {
            *guard = None;
        }
    }
}

/// Releases the in-flight slot even when the `generate` future is dropped mid-request.
struct FinishOnDrop<'a> {
    client: &'a GenerationClient,
    seq: u64,
}

impl Drop for FinishOnDrop<'_> {
    fn drop(&mut self) {
        self.client.finish(self.seq);
    }
}

pub fn build_request(prompt: &str, history: &[Message], existing_code: Option<&str>) -> ChatRequest {
    let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];

    if let Some(code) = existing_code {
        messages.push(ChatMessage::system(format!("Current component to iterate on:\n\n{code}")));
    }

    let start = history.len().saturating_sub(CONTEXT_WINDOW);
    messages.extend(
        history[start..]
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| ChatMessage::user(m.content.clone())),
    );

    messages.push(ChatMessage::user(prompt));
    ChatRequest { messages, params: SAMPLING }
}

/// Strips code fences and guarantees a structurally plausible component.
pub fn clean_response(raw: &str) -> String {
    let cleaned = match FENCE.as_ref() {
        Some(re) => re.replace_all(raw, ""),
        None => Cow::Borrowed(raw),
    };
    let cleaned = cleaned.trim();
    if !cleaned.contains("<script") && !cleaned.contains("<style") && !cleaned.starts_with('<') {
        return FALLBACK_COMPONENT.to_string();
    }
    cleaned.to_string()
}


#[cfg(test)]
mod tests {
    use super::testing::{MockTransport, Reply};
    use super::*;
    use crate::models::ChatRole;

    fn client(replies: Vec<Reply>) -> (Arc<GenerationClient>, Arc<MockTransport>, tokio::sync::mpsc::UnboundedReceiver<()>) {
        let (t, rx) = MockTransport::new(replies);
        let t = Arc::new(t);
        let c = Arc::new(GenerationClient::new(t.clone()));
        (c, t, rx)
    }

    #[tokio::test]
    async fn requires_credential() {
        let (c, t, _rx) = client(vec![]);
        assert!(!c.is_configured());
        let err = c.generate("a pricing page", &[], None).await.unwrap_err();
        assert_eq!(err, GenerationError::NotConfigured);
        assert!(t.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn initialize_rotates_credential() {
        let (c, t, _rx) = client(vec![]);
        c.initialize("sk-one");
        c.initialize("sk-two");
        assert!(c.is_configured());
        c.generate("a pricing page", &[], None).await.unwrap();
        assert_eq!(t.requests.lock().unwrap()[0].0, "sk-two");
    }

    #[tokio::test]
    async fn second_call_supersedes_first() {
        let (c, _t, mut started) = client(vec![Reply::Hang, Reply::Text("<div>second</div>".into())]);
        c.initialize("sk");

        let first_client = c.clone();
        let first = tokio::spawn(async move { first_client.generate("first request here", &[], None).await });
        started.recv().await.unwrap();

        let second = c.generate("second request here", &[], None).await;
        assert_eq!(second.unwrap(), "<div>second</div>");
        assert_eq!(first.await.unwrap(), Err(GenerationError::Cancelled));
    }

    #[tokio::test]
    async fn cancel_pending_is_idempotent() {
        let (c, _t, mut started) = client(vec![Reply::Hang]);
        c.initialize("sk");
        c.cancel_pending();
        c.cancel_pending();

        let runner = c.clone();
        let pending = tokio::spawn(async move { runner.generate("hang forever please", &[], None).await });
        started.recv().await.unwrap();
        c.cancel_pending();
        assert_eq!(pending.await.unwrap(), Err(GenerationError::Cancelled));
        c.cancel_pending();
    }

    #[tokio::test]
    async fn clear_credential_blocks_generation() {
        let (c, t, _rx) = client(vec![]);
        c.initialize("sk-revoked");
        c.clear_credential();
        assert!(!c.is_configured());
        assert_eq!(c.generate("a pricing page", &[], None).await, Err(GenerationError::NotConfigured));
        assert!(t.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dropped_request_releases_in_flight_slot() {
        let (c, _t, mut started) = client(vec![Reply::Hang]);
        c.initialize("sk");

        let runner = c.clone();
        let pending = tokio::spawn(async move { runner.generate("hang until dropped", &[], None).await });
        started.recv().await.unwrap();
        assert!(c.in_flight.lock().unwrap().is_some());

        pending.abort();
        assert!(pending.await.unwrap_err().is_cancelled());
        assert!(c.in_flight.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn request_assembly_order() {
        let (c, t, _rx) = client(vec![]);
        c.initialize("sk");
        let history = vec![
            Message::user("u0 dropped by window"),
            Message::user("u1"),
            Message::assistant("a1"),
            Message::user("u2"),
            Message::assistant("a2"),
            Message::user("u3"),
        ];
        c.generate("new prompt", &history, Some("<div>old</div>")).await.unwrap();

        let req = t.last_request().unwrap();
        let roles: Vec<ChatRole> = req.messages.iter().map(|m| m.role).collect();
        let contents: Vec<&str> = req.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            roles,
            vec![ChatRole::System, ChatRole::System, ChatRole::User, ChatRole::User, ChatRole::User, ChatRole::User]
        );
        assert_eq!(contents[0], SYSTEM_PROMPT);
        assert_eq!(contents[1], "Current component to iterate on:\n\n<div>old</div>");
        assert_eq!(&contents[2..], &["u1", "u2", "u3", "new prompt"]);
        assert_eq!(req.params, SAMPLING);
    }

    #[tokio::test]
    async fn classifies_transport_errors() {
        let (c, _t, _rx) = client(vec![
            Reply::Fail(TransportError::Status { status: 401, message: "bad key".into() }),
            Reply::Fail(TransportError::Status { status: 429, message: "slow".into() }),
            Reply::Fail(TransportError::Status { status: 500, message: "upstream exploded".into() }),
            Reply::Fail(TransportError::Other("connection refused".into())),
        ]);
        c.initialize("sk");
        let p = "a pricing page";
        assert_eq!(c.generate(p, &[], None).await, Err(GenerationError::InvalidCredential));
        assert_eq!(c.generate(p, &[], None).await, Err(GenerationError::RateLimited));
        assert_eq!(
            c.generate(p, &[], None).await,
            Err(GenerationError::GenerationFailed("upstream exploded".into()))
        );
        assert_eq!(
            c.generate(p, &[], None).await,
            Err(GenerationError::GenerationFailed("connection refused".into()))
        );
    }

    #[test]
    fn cleans_fenced_response() {
        let inner = "<script>\n  let n = 0;\n</script>\n\n<button on:click={() => n++}>{n}</button>";
        for fence in ["```svelte", "```html", "```javascript", "```"] {
            let raw = format!("  {fence}\n{inner}\n```  \n");
            assert_eq!(clean_response(&raw), inner);
        }
    }

    #[test]
    fn non_structural_output_gets_fallback() {
        assert_eq!(clean_response("Sure! Here is your component."), FALLBACK_COMPONENT);
        assert_eq!(clean_response(""), FALLBACK_COMPONENT);
        assert_eq!(clean_response("```\n```"), FALLBACK_COMPONENT);
        assert_eq!(clean_response("<div>kept</div>"), "<div>kept</div>");
        assert_eq!(clean_response("note\n<style>p{}</style>"), "note\n<style>p{}</style>");
    }

    #[test]
    fn error_messages_are_human_readable() {
        assert_eq!(GenerationError::NotConfigured.to_string(), "API key not configured");
        assert_eq!(GenerationError::Cancelled.to_string(), "Generation cancelled");
        assert_eq!(
            GenerationError::from(TransportError::Other(String::new())).to_string(),
            "Failed to generate component"
        );
    }
}
