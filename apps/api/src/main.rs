use axum::{
    extract::{Multipart, Query, State},
    http::header,
    response::sse::{Event, Sse},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

mod pipeline;

use dotenv::dotenv;
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use bpr_core::{DocumentKind, SessionState, UploadedDocument};
use bpr_error::BprError;
use bpr_llm::{ChatModel, OpenAiCompatClient, OpenAiCompatConfig, StreamOutcome};
use bpr_report::{build_followup_prompt, export_report, session_context};
use pipeline::{run_report_pipeline, run_stream, validate_followup, GenerateInput};

static SESSIONS: Lazy<tokio::sync::RwLock<HashMap<Uuid, SessionState>>> =
    Lazy::new(|| tokio::sync::RwLock::new(HashMap::new()));

#[derive(Clone)]
struct AppState {
    chat: Arc<dyn ChatModel>,
}

#[derive(Debug, Deserialize)]
struct AppConfig {
    server: ServerCfg,
    chat_provider: ChatCfgYaml,
}

#[derive(Debug, Deserialize)]
struct ServerCfg {
    host: String,
    port: u16,
}

#[derive(Debug, Deserialize)]
struct ChatCfgYaml {
    kind: String,
    base_url: Option<String>,
    api_key_env: Option<String>,
    model: String,
    insecure_skip_verify: Option<bool>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    dotenv().ok();

    let cfg: AppConfig = load_config()?;

    let chat: Arc<dyn ChatModel> = match cfg.chat_provider.kind.as_str() {
        "openai_compat" => Arc::new(
            OpenAiCompatClient::new(OpenAiCompatConfig {
                base_url: cfg
                    .chat_provider
                    .base_url
                    .unwrap_or_else(|| "https://api.openai.com".into()),
                api_key: read_env(
                    &cfg.chat_provider
                        .api_key_env
                        .unwrap_or_else(|| "GENAI_API_KEY".into()),
                )?,
                chat_model: cfg.chat_provider.model,
                insecure_skip_verify: cfg.chat_provider.insecure_skip_verify.unwrap_or(false),
            })
            .map_err(|e| anyhow::anyhow!(e.to_string()))?,
        ),
        other => anyhow::bail!("unsupported chat provider kind={}", other),
    };

    let state = AppState { chat };

    let app = Router::new()
        .route("/api/v1/report/generate", post(generate_report))
        .route("/api/v1/report/followup", post(ask_followup))
        .route("/api/v1/report/export", get(download_report))
        .route("/api/v1/health", get(health))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port).parse()?;
    tracing::info!(%addr, "bpr-api listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};
    let fmt_layer = fmt::layer().with_target(false);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,tower_http=info"))
        .unwrap();
    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn load_config() -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string("configs/default.yaml")?;
    let cfg: AppConfig = serde_yaml::from_str(&s)?;
    tracing::info!("load_config: {:?}", cfg);
    Ok(cfg)
}

fn read_env(key: &str) -> anyhow::Result<String> {
    std::env::var(key).map_err(|_| anyhow::anyhow!("missing env {}", key))
}

type EventStream = UnboundedReceiverStream<Result<Event, Infallible>>;

// ===============
// Report generation
// ===============

async fn generate_report(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Sse<EventStream>, BprError> {
    let mut user_name = String::new();
    let mut organization = String::new();
    let mut documents: Vec<UploadedDocument> = Vec::new();
    let mut descriptions: Vec<String> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| BprError::InvalidRequest {
            reason: e.to_string(),
        })?
    {
        let name = field.name().map(|s| s.to_string()).unwrap_or_default();
        if name == "user_name" {
            user_name = field.text().await.unwrap_or_default();
        } else if name == "organization" {
            organization = field.text().await.unwrap_or_default();
        } else if name == "description" {
            descriptions.push(field.text().await.unwrap_or_default());
        } else if name == "file" {
            let file_name = field
                .file_name()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "upload.bin".into());
            let data = field
                .bytes()
                .await
                .map_err(|e| BprError::InvalidRequest {
                    reason: e.to_string(),
                })?;
            documents.push(UploadedDocument {
                kind: DocumentKind::from_file_name(&file_name),
                name: file_name,
                bytes: data.to_vec(),
                description: None,
            });
        }
    }

    // description parts pair with file parts by arrival order
    for (doc, desc) in documents.iter_mut().zip(descriptions) {
        let desc = desc.trim().to_string();
        if !desc.is_empty() {
            doc.description = Some(desc);
        }
    }

    let input = GenerateInput {
        user_name,
        organization,
        documents,
    };
    pipeline::validate_generate(&input)?;

    let session_id = Uuid::new_v4();
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let chat = state.chat.clone();
    tokio::spawn(async move {
        let _ = tx.send(Ok(Event::default()
            .event("session")
            .data(session_id.to_string())));

        let render = tx.clone();
        let result = run_report_pipeline(chat.as_ref(), input, move |buf| {
            let _ = render.send(Ok(Event::default().event("text").data(buf)));
        })
        .await;

        if let StreamOutcome::Failed { error } = &result.outcome {
            let _ = tx.send(Ok(Event::default()
                .event("error")
                .data(error.user_message())));
        }

        // partial output is stored too, never discarded
        let report_text = result.session.report_text.clone();
        save_session(session_id, &result.session).await;
        let _ = tx.send(Ok(Event::default().event("done").data(report_text)));
    });

    Ok(Sse::new(UnboundedReceiverStream::new(rx)))
}

// ===============
// Follow-up questions
// ===============

#[derive(Deserialize)]
struct FollowUpReq {
    session_id: Uuid,
    question: String,
}

async fn ask_followup(
    State(state): State<AppState>,
    Json(req): Json<FollowUpReq>,
) -> Result<Sse<EventStream>, BprError> {
    validate_followup(&req.question)?;
    let session = load_session(req.session_id)
        .await
        .ok_or_else(|| BprError::NotFound {
            resource: format!("session {}", req.session_id),
        })?;

    let prompt = build_followup_prompt(&session_context(&session), req.question.trim());

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let chat = state.chat.clone();
    tokio::spawn(async move {
        let render = tx.clone();
        let collected = run_stream(chat.as_ref(), &prompt, move |buf| {
            let _ = render.send(Ok(Event::default().event("text").data(buf)));
        })
        .await;

        if let StreamOutcome::Failed { error } = &collected.outcome {
            let _ = tx.send(Ok(Event::default()
                .event("error")
                .data(error.user_message())));
        }

        // display-only: follow-up answers never replace the stored report
        let _ = tx.send(Ok(Event::default().event("done").data(collected.text)));
    });

    Ok(Sse::new(UnboundedReceiverStream::new(rx)))
}

// ===============
// Export
// ===============

#[derive(Deserialize)]
struct ExportQuery {
    session_id: Uuid,
}

async fn download_report(Query(q): Query<ExportQuery>) -> Result<impl IntoResponse, BprError> {
    let session = load_session(q.session_id)
        .await
        .ok_or_else(|| BprError::NotFound {
            resource: format!("session {}", q.session_id),
        })?;

    let artifact = export_report(
        &session.user_name,
        &session.organization,
        &session.report_text,
        session.generated_at,
    );

    let headers = [
        (header::CONTENT_TYPE, artifact.content_type.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", artifact.file_name),
        ),
    ];
    Ok((headers, artifact.bytes))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

async fn load_session(id: Uuid) -> Option<SessionState> {
    SESSIONS.read().await.get(&id).cloned()
}

async fn save_session(id: Uuid, st: &SessionState) {
    SESSIONS.write().await.insert(id, st.clone());
}
