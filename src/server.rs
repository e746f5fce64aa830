use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};

use crate::engine::{HistoryStatus, Workbench, WorkbenchError};
use crate::generation::GenerationError;
use crate::prompts;
use crate::session::{GeneratedArtifact, SessionState};

#[derive(Clone)]
pub struct AppState {
    pub workbench: Arc<Workbench>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub struct ApiError(StatusCode, String);

impl From<WorkbenchError> for ApiError {
    fn from(err: WorkbenchError) -> Self {
        let status = match &err {
            WorkbenchError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            WorkbenchError::NothingToIterate => StatusCode::CONFLICT,
            WorkbenchError::Generation(g) => match g {
                GenerationError::NotConfigured | GenerationError::InvalidCredential => StatusCode::UNAUTHORIZED,
                GenerationError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                GenerationError::Cancelled => StatusCode::CONFLICT,
                GenerationError::GenerationFailed(_) => StatusCode::BAD_GATEWAY,
            },
        };
        ApiError(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(ErrorBody { error: self.1 })).into_response()
    }
}

fn not_found() -> ApiError {
    ApiError(StatusCode::NOT_FOUND, "not found".into())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StateResponse {
    #[serde(flatten)]
    session: SessionState,
    has_credential: bool,
    can_generate: bool,
    #[serde(flatten)]
    history: HistoryStatus,
}

async fn get_state(State(state): State<AppState>) -> Json<StateResponse> {
    let session = state.workbench.session().snapshot();
    let history = state.workbench.history_status().await;
    Json(StateResponse {
        has_credential: session.has_credential(),
        can_generate: session.can_generate(),
        session,
        history,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialBody {
    pub api_key: String,
}

async fn put_credential(State(state): State<AppState>, Json(body): Json<CredentialBody>) -> Result<StatusCode, ApiError> {
    if body.api_key.trim().is_empty() {
        return Err(ApiError(StatusCode::UNPROCESSABLE_ENTITY, "apiKey must not be empty".into()));
    }
    state.workbench.configure(body.api_key.trim());
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_credential(State(state): State<AppState>) -> StatusCode {
    state.workbench.forget_credential();
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
pub struct GenerateBody {
    pub prompt: String,
    #[serde(default)]
    pub enhancements: Vec<String>,
}

async fn generate(State(state): State<AppState>, Json(body): Json<GenerateBody>) -> Result<Json<GeneratedArtifact>, ApiError> {
    let selected = prompts::parse_enhancements(&body.enhancements);
    let artifact = state.workbench.submit(&body.prompt, &selected).await?;
    Ok(Json(artifact))
}

#[derive(Debug, Deserialize)]
pub struct IterateBody {
    pub feedback: String,
}

async fn iterate(State(state): State<AppState>, Json(body): Json<IterateBody>) -> Result<Json<GeneratedArtifact>, ApiError> {
    Ok(Json(state.workbench.iterate(&body.feedback).await?))
}

async fn cancel(State(state): State<AppState>) -> StatusCode {
    state.workbench.cancel();
    StatusCode::NO_CONTENT
}

async fn undo(State(state): State<AppState>) -> Result<Json<GeneratedArtifact>, ApiError> {
    state.workbench.undo().await.map(Json).ok_or_else(not_found)
}

async fn redo(State(state): State<AppState>) -> Result<Json<GeneratedArtifact>, ApiError> {
    state.workbench.redo().await.map(Json).ok_or_else(not_found)
}

async fn list_artifacts(State(state): State<AppState>) -> Json<Vec<GeneratedArtifact>> {
    Json(state.workbench.store().get_all().await)
}

async fn get_artifact(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<GeneratedArtifact>, ApiError> {
    state.workbench.store().get_by_id(&id).await.map(Json).ok_or_else(not_found)
}

async fn delete_artifact(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    state.workbench.store().delete(&id).await;
    StatusCode::NO_CONTENT
}

async fn clear_artifacts(State(state): State<AppState>) -> StatusCode {
    state.workbench.store().clear().await;
    StatusCode::NO_CONTENT
}

async fn reset_session(State(state): State<AppState>) -> StatusCode {
    state.workbench.new_session().await;
    StatusCode::NO_CONTENT
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/state", get(get_state))
        .route("/v1/credential", put(put_credential).delete(delete_credential))
        .route("/v1/generate", post(generate))
        .route("/v1/iterate", post(iterate))
        .route("/v1/cancel", post(cancel))
        .route("/v1/history/undo", post(undo))
        .route("/v1/history/redo", post(redo))
        .route("/v1/artifacts", get(list_artifacts).delete(clear_artifacts))
        .route("/v1/artifacts/:id", get(get_artifact).delete(delete_artifact))
        .route("/v1/session/reset", post(reset_session))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GenerationClient;
    use crate::generation::testing::{MockTransport, Reply};
    use crate::history::HistoryStack;
    use crate::session::SessionStore;
    use crate::storage::{MemoryKvStore, PersistentStore};

    async fn spawn(replies: Vec<Reply>) -> String {
        let (t, _rx) = MockTransport::new(replies);
        let store = PersistentStore::initialize(None, Arc::new(MemoryKvStore::new())).await;
        let wb = Workbench::new(GenerationClient::new(Arc::new(t)), SessionStore::new(), HistoryStack::new(), store);
        let app = router(AppState { workbench: Arc::new(wb) });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn generate_flow_over_http() {
        let base = spawn(vec![Reply::Text("<section>tiers</section>".into())]).await;
        let http = reqwest::Client::new();

        let res = http
            .post(format!("{base}/v1/generate"))
            .json(&serde_json::json!({"prompt": "Build me a pricing page with three tiers"}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 401);

        let res = http
            .put(format!("{base}/v1/credential"))
            .json(&serde_json::json!({"apiKey": "sk-http"}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 204);

        let res = http
            .post(format!("{base}/v1/generate"))
            .json(&serde_json::json!({"prompt": "Build me a pricing page with three tiers", "enhancements": ["darkMode"]}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        let artifact: serde_json::Value = res.json().await.unwrap();
        assert_eq!(artifact["code"], "<section>tiers</section>");
        let id = artifact["id"].as_str().unwrap().to_string();

        let state: serde_json::Value = http.get(format!("{base}/v1/state")).send().await.unwrap().json().await.unwrap();
        assert_eq!(state["canGenerate"], true);
        assert_eq!(state["isGenerating"], false);
        assert_eq!(state["len"], 1);
        assert!(state.get("credential").is_none());

        let got = http.get(format!("{base}/v1/artifacts/{id}")).send().await.unwrap();
        assert_eq!(got.status(), 200);

        let res = http.delete(format!("{base}/v1/artifacts/{id}")).send().await.unwrap();
        assert_eq!(res.status(), 204);
        let missing = http.get(format!("{base}/v1/artifacts/{id}")).send().await.unwrap();
        assert_eq!(missing.status(), 404);
    }

    #[tokio::test]
    async fn validation_errors_are_unprocessable() {
        let base = spawn(vec![]).await;
        let res = reqwest::Client::new()
            .post(format!("{base}/v1/generate"))
            .json(&serde_json::json!({"prompt": "<script>alert(1)</script> build me a page"}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 422);
        let body: serde_json::Value = res.json().await.unwrap();
        assert_eq!(body["error"], "invalid prompt: unsafe content");
    }
}
