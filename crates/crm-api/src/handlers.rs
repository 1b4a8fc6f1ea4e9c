//! Route handler functions for all API endpoints.
//!
//! The chat endpoint accepts either a JSON body or a multipart form carrying
//! `message`, `sessionId` and up to ten `files`. Uploads are written to the
//! upload directory and staged with the message. They are deleted again
//! unless the message ends up staging an email draft that holds them.

use std::path::{Path, PathBuf};

use axum::extract::{FromRequest, Multipart, Query, Request, State};
use axum::http::header;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crm_chat::ChatReply;
use crm_core::types::{AttachmentRef, Message};

use crate::error::ApiError;
use crate::state::AppState;

/// Most files accepted with a single chat message.
pub const MAX_UPLOAD_FILES: usize = 10;

const DEFAULT_MIMETYPE: &str = "application/octet-stream";

// =============================================================================
// Request types
// =============================================================================

/// JSON body of POST /api/v1/query/chat.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequestBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// A file received in a multipart chat request, not yet on disk.
#[derive(Debug)]
pub struct UploadedFile {
    pub filename: String,
    pub mimetype: String,
    pub bytes: Vec<u8>,
}

/// A chat request decoded from either JSON or multipart.
#[derive(Debug)]
pub struct ChatInput {
    pub message: String,
    pub session_id: Option<String>,
    pub files: Vec<UploadedFile>,
}

impl<S> FromRequest<S> for ChatInput
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("multipart/form-data"));

        if is_multipart {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            read_multipart(multipart).await
        } else {
            let Json(body) = Json::<ChatRequestBody>::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            Ok(ChatInput {
                message: body.message,
                session_id: body.session_id,
                files: Vec::new(),
            })
        }
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<ChatInput, ApiError> {
    let mut input = ChatInput {
        message: String::new(),
        session_id: None,
        files: Vec::new(),
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "message" => {
                input.message = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            }
            "sessionId" => {
                input.session_id = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::BadRequest(e.body_text()))?,
                );
            }
            "files" | "files[]" => {
                if input.files.len() == MAX_UPLOAD_FILES {
                    return Err(ApiError::PayloadTooLarge(format!(
                        "At most {} files can be attached",
                        MAX_UPLOAD_FILES
                    )));
                }
                let filename = field.file_name().unwrap_or("attachment").to_string();
                let mimetype = field.content_type().unwrap_or(DEFAULT_MIMETYPE).to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                input.files.push(UploadedFile {
                    filename,
                    mimetype,
                    bytes: bytes.to_vec(),
                });
            }
            other => debug!(field = %other, "Ignoring unknown multipart field"),
        }
    }

    Ok(input)
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryData {
    pub result: Vec<Message>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatHistoryResponse {
    pub success: bool,
    pub data: HistoryData,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub success: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_secs: u64,
}

// =============================================================================
// Handlers
// =============================================================================

/// POST /api/v1/query/chat (also POST /chat).
pub async fn chat(
    State(state): State<AppState>,
    input: ChatInput,
) -> Result<Json<ChatReply>, ApiError> {
    let attachments = save_uploads(&state.upload_dir, input.files)
        .await
        .map_err(|e| ApiError::internal("Failed to store attachments", e, state.environment()))?;
    let session_key = input.session_id.unwrap_or_default();
    let stored: Vec<PathBuf> = attachments.iter().map(|a| PathBuf::from(&a.path)).collect();

    let result = state
        .router
        .handle_message(&session_key, &input.message, attachments)
        .await;
    if !matches!(&result, Ok(reply) if reply.draft.is_some()) {
        discard_uploads(&stored).await;
    }

    let reply = result.map_err(|e| ApiError::from_chat(e, state.environment()))?;
    Ok(Json(reply))
}

/// GET /api/v1/query/chat-history?sessionId=...
pub async fn chat_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<ChatHistoryResponse>, ApiError> {
    let session_id = params
        .session_id
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("sessionId query parameter is required".into()))?;

    let history = state.router.history(&session_id).await.map_err(|e| {
        ApiError::internal("Failed to fetch chat history", e, state.environment())
    })?;

    Ok(Json(ChatHistoryResponse {
        success: true,
        data: HistoryData { result: history },
    }))
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        success: true,
        message: "Server is healthy".to_string(),
        timestamp: Utc::now(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

// =============================================================================
// Uploads
// =============================================================================

/// Write each upload under `dir` with a unique prefix and return the
/// references to stage with the message.
pub async fn save_uploads(
    dir: &Path,
    files: Vec<UploadedFile>,
) -> std::io::Result<Vec<AttachmentRef>> {
    if files.is_empty() {
        return Ok(Vec::new());
    }
    tokio::fs::create_dir_all(dir).await?;

    let mut saved: Vec<AttachmentRef> = Vec::with_capacity(files.len());
    for file in files {
        let filename = sanitize_filename(&file.filename);
        let path: PathBuf = dir.join(format!("{}-{}", Uuid::new_v4(), filename));
        if let Err(e) = tokio::fs::write(&path, &file.bytes).await {
            let written: Vec<PathBuf> = saved.iter().map(|a| PathBuf::from(&a.path)).collect();
            discard_uploads(&written).await;
            return Err(e);
        }
        info!(
            filename = %filename,
            bytes = file.bytes.len(),
            path = %path.display(),
            "Attachment stored"
        );
        saved.push(AttachmentRef {
            filename,
            path: path.to_string_lossy().into_owned(),
            mimetype: file.mimetype,
        });
    }
    Ok(saved)
}

/// Remove uploads that no pending draft refers to.
pub async fn discard_uploads(paths: &[PathBuf]) {
    for path in paths {
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!(path = %path.display(), "Unused attachment removed"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove attachment"),
        }
    }
}

/// Keep only the final path component of a client-supplied name.
fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if base.is_empty() || base == "." || base == ".." {
        "attachment".to_string()
    } else {
        base.to_string()
    }
}
