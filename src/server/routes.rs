//! Route handlers for the `/api` surface.
//!
//! Handlers validate input, render prompts through the template
//! catalog, dispatch model calls through the provider registry, and
//! persist results. Streaming debate turns go out as SSE frames.

use std::collections::HashMap;
use std::convert::Infallible;

use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use futures_util::future::join_all;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::{session_token_from_cookies, SESSION_COOKIE};
use crate::billing::CREDIT_PACKAGES;
use crate::error::{AppError, AppResult, AuthError, StorageError};
use crate::export;
use crate::providers::{CallOptions, ModelMessage, StreamChunk};
use crate::sessions::{DebateLedger, DebateTurn, ResumeContext};
use crate::storage::{
    ArcArtifact, ArcMessage, ArcRun, Comparison, DebateSession, DebateStatus, VixraSection,
    VixraSession,
};

use super::{SharedState, StreamEvent};

const DEFAULT_LIST_LIMIT: u32 = 20;
const MAX_COMPARE_MODELS: usize = 8;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Markdown,
    Text,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub format: ExportFormat,
}

fn document(format: ExportFormat, body: String) -> Response {
    let content_type = match format {
        ExportFormat::Markdown => "text/markdown; charset=utf-8",
        ExportFormat::Text => "text/plain; charset=utf-8",
    };
    ([(CONTENT_TYPE, content_type)], body).into_response()
}

fn invalid(message: impl Into<String>) -> AppError {
    AppError::InvalidRequest {
        message: message.into(),
    }
}

// --- Health and catalog ---

#[derive(Debug, Deserialize)]
pub struct HealthQuery {
    /// When set, probe each configured provider's API.
    #[serde(default)]
    pub probe: bool,
}

pub async fn health(
    State(state): State<SharedState>,
    Query(query): Query<HealthQuery>,
) -> AppResult<Json<Value>> {
    let providers = state.registry.statuses().await;

    let mut body = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "providers": providers,
    });
    if query.probe {
        let probes: HashMap<String, bool> = state.registry.probe_all().await.into_iter().collect();
        body["reachable"] = json!(probes);
    }
    Ok(Json(body))
}

pub async fn models(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({ "models": state.registry.all_models() }))
}

// --- Compare ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareRequest {
    pub prompt: String,
    pub model_ids: Vec<String>,
    /// Compare-mode template to wrap the prompt in; raw prompt when absent.
    pub template: Option<String>,
    pub context: Option<String>,
}

pub async fn compare(
    State(state): State<SharedState>,
    Json(request): Json<CompareRequest>,
) -> AppResult<Json<Value>> {
    if request.prompt.trim().is_empty() {
        return Err(invalid("prompt is required"));
    }
    if request.model_ids.is_empty() {
        return Err(invalid("at least one model id is required"));
    }
    if request.model_ids.len() > MAX_COMPARE_MODELS {
        return Err(invalid(format!(
            "at most {MAX_COMPARE_MODELS} models per comparison"
        )));
    }

    let prompt = match &request.template {
        Some(template_id) => {
            let mut vars: HashMap<String, Value> = HashMap::new();
            vars.insert("prompt".to_string(), json!(request.prompt));
            if let Some(context) = &request.context {
                vars.insert("context".to_string(), json!(context));
            }
            state.templates.render("compare", template_id, &vars)?
        }
        None => request.prompt.clone(),
    };

    let messages = vec![ModelMessage::user(prompt)];
    let options = CallOptions::new();

    let calls = request.model_ids.iter().map(|model_id| {
        let messages = &messages;
        let options = &options;
        let registry = &state.registry;
        async move {
            (
                model_id.clone(),
                registry.call_model(messages, model_id, options).await,
            )
        }
    });

    let mut responses = HashMap::new();
    let mut errors: HashMap<String, String> = HashMap::new();
    for (model_id, result) in join_all(calls).await {
        match result {
            Ok(response) => {
                responses.insert(model_id, response);
            }
            Err(e) => {
                warn!(model = %model_id, error = %e, "Model failed during comparison");
                errors.insert(model_id, e.to_string());
            }
        }
    }

    if responses.is_empty() {
        return Err(invalid(format!(
            "all models failed: {}",
            errors
                .values()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join("; ")
        )));
    }

    let comparison = Comparison::new(request.prompt, request.model_ids, responses);
    state.storage.save_comparison(&comparison).await?;
    info!(
        id = %comparison.id,
        models = comparison.model_ids.len(),
        failed = errors.len(),
        "Comparison saved"
    );

    Ok(Json(json!({ "comparison": comparison, "errors": errors })))
}

pub async fn list_comparisons(
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Value>> {
    let comparisons = state
        .storage
        .list_comparisons(query.limit.unwrap_or(DEFAULT_LIST_LIMIT))
        .await?;
    Ok(Json(json!({ "comparisons": comparisons })))
}

pub async fn get_comparison(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> AppResult<Json<Comparison>> {
    let comparison = state
        .storage
        .get_comparison(&id)
        .await?
        .ok_or(StorageError::ComparisonNotFound { id })?;
    Ok(Json(comparison))
}

pub async fn export_comparison(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> AppResult<Response> {
    let comparison = state
        .storage
        .get_comparison(&id)
        .await?
        .ok_or(StorageError::ComparisonNotFound { id })?;
    let body = match query.format {
        ExportFormat::Markdown => export::comparison_markdown(&comparison),
        ExportFormat::Text => export::comparison_text(&comparison),
    };
    Ok(document(query.format, body))
}

// --- Battle ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleStartRequest {
    pub prompt: String,
    pub model_id: String,
}

pub async fn battle_start(
    State(state): State<SharedState>,
    Json(request): Json<BattleStartRequest>,
) -> AppResult<Json<Value>> {
    if request.prompt.trim().is_empty() {
        return Err(invalid("prompt is required"));
    }

    let mut vars = HashMap::new();
    vars.insert("prompt".to_string(), json!(request.prompt));
    let rendered = state
        .templates
        .render("battle", "challenger-opening", &vars)?;

    let response = state
        .registry
        .call_model(
            &[ModelMessage::user(rendered)],
            &request.model_id,
            &CallOptions::new(),
        )
        .await?;

    Ok(Json(json!({
        "modelId": request.model_id,
        "response": response,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleContinueRequest {
    pub prompt: String,
    /// The answer being challenged.
    pub response: String,
    pub model_id: String,
    pub battle_type: String,
}

pub async fn battle_continue(
    State(state): State<SharedState>,
    Json(request): Json<BattleContinueRequest>,
) -> AppResult<Json<Value>> {
    let template_id = match request.battle_type.as_str() {
        "critique" => "critique-response",
        "improve" => "improve-response",
        "defend" => "defend-response",
        other => {
            return Err(invalid(format!(
                "unknown battle type {other}: expected critique, improve, or defend"
            )))
        }
    };

    let mut vars = HashMap::new();
    vars.insert("prompt".to_string(), json!(request.prompt));
    vars.insert("response".to_string(), json!(request.response));
    vars.insert("battleType".to_string(), json!(request.battle_type));
    let rendered = state.templates.render("battle", template_id, &vars)?;

    let response = state
        .registry
        .call_model(
            &[
                ModelMessage::context(format!("Original prompt: {}", request.prompt)),
                ModelMessage::user(rendered),
            ],
            &request.model_id,
            &CallOptions::new(),
        )
        .await?;

    Ok(Json(json!({
        "modelId": request.model_id,
        "battleType": request.battle_type,
        "response": response,
    })))
}

// --- Debate ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebateInitRequest {
    pub topic: String,
    pub model_a: String,
    pub model_b: String,
    pub intensity: Option<u8>,
}

pub async fn debate_init(
    State(state): State<SharedState>,
    Json(request): Json<DebateInitRequest>,
) -> AppResult<Json<DebateSession>> {
    if request.topic.trim().is_empty() {
        return Err(invalid("topic is required"));
    }
    for model_id in [&request.model_a, &request.model_b] {
        if state.registry.get_model_by_id(model_id).is_none() {
            return Err(invalid(format!("unknown model id: {model_id}")));
        }
    }
    if request.model_a == request.model_b {
        return Err(invalid("a model cannot debate itself"));
    }

    let session = DebateSession::new(
        request.topic,
        request.model_a,
        request.model_b,
        request.intensity.unwrap_or(5),
    );
    state.storage.save_debate_session(&session).await?;

    let ledger = DebateLedger::new(&session.id, &session.model_a, &session.model_b);
    state
        .ledgers
        .write()
        .await
        .insert(session.id.clone(), ledger);

    info!(id = %session.id, topic = %session.topic, "Debate session created");
    Ok(Json(session))
}

async fn load_debate(state: &SharedState, id: &str) -> AppResult<DebateSession> {
    Ok(state
        .storage
        .get_debate_session(id)
        .await?
        .ok_or_else(|| StorageError::SessionNotFound {
            session_id: id.to_string(),
        })?)
}

/// The live ledger for a session, rebuilt from the stored snapshot if
/// this process has not seen the session before.
async fn ledger_for(state: &SharedState, session: &DebateSession) -> DebateLedger {
    let mut ledgers = state.ledgers.write().await;
    ledgers
        .entry(session.id.clone())
        .or_insert_with(|| {
            let mut ledger = DebateLedger::new(&session.id, &session.model_a, &session.model_b);
            ledger.hydrate_from_session(session);
            ledger
        })
        .clone()
}

/// Pick the template and variables for the next debate turn.
fn debate_turn_prompt(
    session: &DebateSession,
    resume: &ResumeContext,
    opponent_content: Option<&str>,
) -> (&'static str, HashMap<String, Value>) {
    let is_pro = resume.next_turn_number % 2 == 1;
    let role = if is_pro { "pro" } else { "con" };
    let position = if is_pro {
        format!("In favor of: {}", session.topic)
    } else {
        format!("Against: {}", session.topic)
    };

    let mut vars = HashMap::new();
    vars.insert("topic".to_string(), json!(session.topic));
    vars.insert("intensity".to_string(), json!(session.intensity));
    vars.insert("role".to_string(), json!(role));
    vars.insert("position".to_string(), json!(position));
    vars.insert("originalPrompt".to_string(), json!(session.topic));
    vars.insert("turnNumber".to_string(), json!(resume.next_turn_number));

    let template_id = match resume.next_turn_number {
        1 => "pro-opening",
        2 => "con-opening",
        _ => "standard-rebuttal",
    };
    if template_id == "standard-rebuttal" {
        vars.insert(
            "response".to_string(),
            json!(opponent_content.unwrap_or_default()),
        );
    }
    (template_id, vars)
}

pub async fn debate_snapshot(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let session = load_debate(&state, &id).await?;
    let ledger = ledger_for(&state, &session).await;
    Ok(Json(json!({
        "session": session,
        "messages": ledger.messages(),
        "resume": ledger.resume_context(),
    })))
}

/// Run the next debate turn, streaming output as SSE frames.
///
/// Frame order: one `status`, then `reasoning`/`text` deltas, then a
/// terminal `complete` (after the turn is persisted) or `error`.
pub async fn debate_stream(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> AppResult<Sse<ReceiverStream<Result<Event, Infallible>>>> {
    let session = load_debate(&state, &id).await?;
    if session.status == DebateStatus::Completed {
        return Err(invalid("debate is already completed"));
    }

    let ledger = ledger_for(&state, &session).await;
    let resume = ledger.resume_context();
    let opponent_content = ledger
        .last_opponent_content(&resume.next_model_id)
        .map(|s| s.to_string());

    let (template_id, vars) = debate_turn_prompt(&session, &resume, opponent_content.as_deref());
    let rendered = state.templates.render("debate", template_id, &vars)?;

    let mut messages = Vec::new();
    if let Some(content) = &opponent_content {
        messages.push(ModelMessage::context(format!(
            "Your opponent's latest statement:\n{content}"
        )));
    }
    messages.push(ModelMessage::user(rendered));

    let (event_tx, event_rx) = mpsc::channel::<Result<Event, Infallible>>(64);
    let state = state.clone();

    tokio::spawn(async move {
        let model_id = resume.next_model_id.clone();
        let turn_number = resume.next_turn_number;

        let _ = event_tx
            .send(Ok(StreamEvent::status(format!(
                "Turn {turn_number}: calling {model_id}"
            ))
            .into_sse()))
            .await;

        let (chunk_tx, mut chunk_rx) = mpsc::channel::<StreamChunk>(64);
        let forward_tx = event_tx.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(chunk) = chunk_rx.recv().await {
                let frame = match chunk {
                    StreamChunk::Reasoning(text) => StreamEvent::reasoning(text),
                    StreamChunk::Text(text) => StreamEvent::text(text),
                };
                if forward_tx.send(Ok(frame.into_sse())).await.is_err() {
                    break;
                }
            }
        });

        let result = state
            .registry
            .call_model_stream(&messages, &model_id, &CallOptions::new(), chunk_tx)
            .await;
        let _ = forwarder.await;

        match result {
            Ok(response) => {
                let response_id = Uuid::new_v4().to_string();
                let turn =
                    DebateTurn::from_response(turn_number, &model_id, &response_id, &response);

                let mut session = session;
                {
                    let mut ledgers = state.ledgers.write().await;
                    let ledger = ledgers
                        .entry(session.id.clone())
                        .or_insert_with(|| {
                            DebateLedger::new(&session.id, &session.model_a, &session.model_b)
                        });
                    ledger.record_turn(turn.clone());
                    session.set_turns(ledger.turns().to_vec());
                }

                let frame = match state.storage.update_debate_session(&session).await {
                    Ok(()) => {
                        info!(
                            session = %session.id,
                            turn = turn_number,
                            model = %model_id,
                            "Debate turn persisted"
                        );
                        StreamEvent::Complete {
                            response_id,
                            turn_number,
                            model_id,
                            token_usage: response.token_usage,
                            cost: response.cost,
                        }
                    }
                    Err(e) => {
                        error!(session = %session.id, error = %e, "Failed to persist debate turn");
                        StreamEvent::error(format!("Failed to persist turn: {e}"))
                    }
                };
                let _ = event_tx.send(Ok(frame.into_sse())).await;
            }
            Err(e) => {
                warn!(session = %session.id, model = %model_id, error = %e, "Debate turn failed");
                let _ = event_tx
                    .send(Ok(StreamEvent::error(e.to_string()).into_sse()))
                    .await;
            }
        }
    });

    Ok(Sse::new(ReceiverStream::new(event_rx)).keep_alive(KeepAlive::default()))
}

pub async fn debate_complete(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> AppResult<Json<DebateSession>> {
    let mut session = load_debate(&state, &id).await?;
    session.status = DebateStatus::Completed;
    state.storage.update_debate_session(&session).await?;
    info!(id = %session.id, turns = session.turns.len(), "Debate completed");
    Ok(Json(session))
}

pub async fn list_debates(
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Value>> {
    let sessions = state
        .storage
        .list_debate_sessions(query.limit.unwrap_or(DEFAULT_LIST_LIMIT))
        .await?;
    Ok(Json(json!({ "sessions": sessions })))
}

pub async fn export_debate(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> AppResult<Response> {
    let session = load_debate(&state, &id).await?;
    let body = match query.format {
        ExportFormat::Markdown => export::debate_markdown(&session),
        ExportFormat::Text => export::debate_text(&session),
    };
    Ok(document(query.format, body))
}

// --- Vixra ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VixraSectionRequest {
    /// Existing session to extend; a new session is created when absent.
    pub session_id: Option<String>,
    /// Template id of the section to generate.
    pub section_id: String,
    pub model_id: String,
    pub variables: HashMap<String, Value>,
}

pub async fn vixra_section(
    State(state): State<SharedState>,
    Json(request): Json<VixraSectionRequest>,
) -> AppResult<Json<Value>> {
    let rendered = state
        .templates
        .render("vixra", &request.section_id, &request.variables)?;

    let mut session = match &request.session_id {
        Some(id) => state.storage.get_vixra_session(id).await?.ok_or_else(|| {
            StorageError::SessionNotFound {
                session_id: id.clone(),
            }
        })?,
        None => VixraSession::new(request.variables.clone()),
    };
    session.model_id = Some(request.model_id.clone());

    let response = state
        .registry
        .call_model(
            &[ModelMessage::user(rendered)],
            &request.model_id,
            &CallOptions::new(),
        )
        .await?;

    let title = state
        .templates
        .get("vixra", &request.section_id)
        .map(|t| t.name.clone())
        .unwrap_or_else(|_| request.section_id.clone());
    let section = VixraSection {
        section_id: request.section_id,
        title,
        content: response.content.clone(),
    };
    session.upsert_section(section.clone());
    state.storage.save_vixra_session(&session).await?;

    Ok(Json(json!({
        "sessionId": session.id,
        "section": section,
        "response": response,
    })))
}

pub async fn list_vixra(
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Value>> {
    let sessions = state
        .storage
        .list_vixra_sessions(query.limit.unwrap_or(DEFAULT_LIST_LIMIT))
        .await?;
    Ok(Json(json!({ "sessions": sessions })))
}

async fn load_vixra(state: &SharedState, id: &str) -> AppResult<VixraSession> {
    Ok(state
        .storage
        .get_vixra_session(id)
        .await?
        .ok_or_else(|| StorageError::SessionNotFound {
            session_id: id.to_string(),
        })?)
}

pub async fn vixra_snapshot(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> AppResult<Json<VixraSession>> {
    Ok(Json(load_vixra(&state, &id).await?))
}

pub async fn export_vixra(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let session = load_vixra(&state, &id).await?;
    let body = export::vixra_paper(&session.variables, &session.sections);
    Ok(document(ExportFormat::Markdown, body))
}

// --- Billing ---

pub async fn stripe_packages() -> Json<Value> {
    Json(json!({ "packages": CREDIT_PACKAGES }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentRequest {
    pub package_id: String,
}

pub async fn create_payment_intent(
    State(state): State<SharedState>,
    Json(request): Json<PaymentIntentRequest>,
) -> AppResult<Json<Value>> {
    let intent = state
        .stripe
        .create_payment_intent(&request.package_id)
        .await?;
    Ok(Json(json!({ "paymentIntent": intent })))
}

// --- Auth ---

fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(session_token_from_cookies)
}

pub async fn auth_google(State(state): State<SharedState>) -> AppResult<Redirect> {
    let oauth_state = state.auth_sessions.issue_state().await;
    let url = state.auth.authorization_url(&oauth_state)?;
    Ok(Redirect::temporary(&url))
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

pub async fn auth_google_callback(
    State(state): State<SharedState>,
    Query(query): Query<OAuthCallbackQuery>,
) -> AppResult<Response> {
    let code = query.code.ok_or_else(|| invalid("missing code parameter"))?;
    let oauth_state = query
        .state
        .ok_or_else(|| invalid("missing state parameter"))?;

    if !state.auth_sessions.consume_state(&oauth_state).await {
        return Err(AuthError::InvalidState.into());
    }

    let user = state.auth.exchange_code(&code).await?;
    let token = state.auth_sessions.create_session(user).await;
    let cookie = format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax");
    Ok(([(SET_COOKIE, cookie)], Redirect::to("/")).into_response())
}

pub async fn auth_logout(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> AppResult<Response> {
    if let Some(token) = session_token(&headers) {
        state.auth_sessions.remove_session(&token).await;
    }
    let clear = format!("{SESSION_COOKIE}=; Path=/; HttpOnly; Max-Age=0");
    Ok(([(SET_COOKIE, clear)], Json(json!({ "ok": true }))).into_response())
}

pub async fn auth_user(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let token = session_token(&headers).ok_or(AuthError::NotAuthenticated)?;
    let user = state
        .auth_sessions
        .get_user(&token)
        .await
        .ok_or(AuthError::NotAuthenticated)?;
    Ok(Json(json!({ "user": user })))
}

// --- ARC run log ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArcRunRequest {
    pub task_id: Option<String>,
    pub status: Option<String>,
    pub metadata: Option<Value>,
}

pub async fn create_arc_run(
    State(state): State<SharedState>,
    Json(request): Json<ArcRunRequest>,
) -> AppResult<Json<ArcRun>> {
    let mut run = ArcRun::new(request.status.unwrap_or_else(|| "running".to_string()));
    if let Some(task_id) = request.task_id {
        run = run.with_task(task_id);
    }
    if let Some(metadata) = request.metadata {
        run = run.with_metadata(metadata);
    }
    state.storage.create_arc_run(&run).await?;
    Ok(Json(run))
}

async fn load_arc_run(state: &SharedState, id: &str) -> AppResult<ArcRun> {
    Ok(state
        .storage
        .get_arc_run(id)
        .await?
        .ok_or_else(|| StorageError::RunNotFound {
            run_id: id.to_string(),
        })?)
}

pub async fn get_arc_run(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let run = load_arc_run(&state, &id).await?;
    let messages = state.storage.get_arc_messages(&id).await?;
    let artifacts = state.storage.get_arc_artifacts(&id).await?;
    Ok(Json(json!({
        "run": run,
        "messages": messages,
        "artifacts": artifacts,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ArcRunUpdate {
    pub status: String,
}

pub async fn update_arc_run(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(update): Json<ArcRunUpdate>,
) -> AppResult<Json<ArcRun>> {
    state
        .storage
        .update_arc_run_status(&id, &update.status)
        .await?;
    Ok(Json(load_arc_run(&state, &id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ArcMessageRequest {
    pub role: String,
    pub content: String,
}

pub async fn add_arc_message(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(request): Json<ArcMessageRequest>,
) -> AppResult<Json<ArcMessage>> {
    let message = ArcMessage::new(id, request.role, request.content);
    state.storage.add_arc_message(&message).await?;
    Ok(Json(message))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArcArtifactRequest {
    pub artifact_type: String,
    pub content: String,
    pub metadata: Option<Value>,
}

pub async fn add_arc_artifact(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(request): Json<ArcArtifactRequest>,
) -> AppResult<Json<ArcArtifact>> {
    let mut artifact = ArcArtifact::new(id, request.artifact_type, request.content);
    if let Some(metadata) = request.metadata {
        artifact = artifact.with_metadata(metadata);
    }
    state.storage.add_arc_artifact(&artifact).await?;
    Ok(Json(artifact))
}
