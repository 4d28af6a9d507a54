//! HTTP surface: router, shared state and the extraction handler.

use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    response::Json,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, info_span, Instrument};

use crate::config::Config;
use crate::content::{self, MediaKind};
use crate::error::ApiError;
use crate::extractor::TravellerExtractor;
use crate::openai::{CompletionService, OpenAiClient};
use crate::schema::ExtractionResult;
use crate::upload::UploadedFile;

pub const PROCESS_TRAVELLERS_PATH: &str = "/api/process-travellers";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    extractor: TravellerExtractor,
}

impl AppState {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self {
            extractor: TravellerExtractor::new(completion),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(Arc::new(OpenAiClient::new(config)))
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            PROCESS_TRAVELLERS_PATH,
            post(process_travellers).fallback(method_not_allowed),
        )
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

/// Upload one file and extract travellers from it.
async fn process_travellers(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ExtractionResult>, ApiError> {
    let multipart = multipart.map_err(|e| ApiError::MalformedBody(e.body_text()))?;
    let span = info_span!("process_travellers", upload_id = %uuid::Uuid::new_v4());
    handle_upload(state, multipart).instrument(span).await
}

async fn handle_upload(
    state: AppState,
    mut multipart: Multipart,
) -> Result<Json<ExtractionResult>, ApiError> {
    let upload = read_file_field(&mut multipart).await?;

    info!(
        "File received: {} ({}, {} bytes)",
        upload.filename, upload.media_type, upload.size
    );

    // `upload` owns the temp file; it is removed when this function returns.
    let data = upload
        .read()
        .await
        .map_err(|e| ApiError::Internal(format!("failed to read stored upload: {}", e)))?;

    let kind = MediaKind::from_media_type(&upload.media_type);
    let document = tokio::task::spawn_blocking(move || content::extract(kind, &data))
        .await
        .map_err(|e| ApiError::Internal(format!("extraction task failed: {}", e)))??;
    debug!("Content read successfully as {:?}", kind);

    let result = state.extractor.extract(document).await?;

    info!("Returning {} travellers", result.travellers.len());
    Ok(Json(result))
}

/// First `file` field of the form; any later parts are left unread.
async fn read_file_field(multipart: &mut Multipart) -> Result<UploadedFile, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(ApiError::from)?
    {
        if field.name() == Some("file") {
            return Ok(UploadedFile::from_field(field).await?);
        }
        debug!("Ignoring multipart field {:?}", field.name());
    }

    Err(ApiError::MissingFile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorBody;
    use crate::openai::{CompletionError, Message};
    use async_trait::async_trait;
    use reqwest::multipart::{Form, Part};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls and answers with one fixed traveller.
    #[derive(Default)]
    struct CountingCompletion {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CompletionService for CountingCompletion {
        async fn complete_json(
            &self,
            _messages: Vec<Message>,
            _schema_name: &str,
            _schema: serde_json::Value,
        ) -> Result<String, CompletionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(r#"{"travellers":[{"firstName":"John","lastName":"Smith","dateOfBirth":"19900502","gender":"male","nationality":"Swedish","disability":null}],"globalInfo":{"nationality":"Swedish","disability":null}}"#.to_string())
        }
    }

    async fn spawn_app(completion: Arc<CountingCompletion>) -> String {
        let app = router(AppState::new(completion), 1024 * 1024);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}{}", addr, PROCESS_TRAVELLERS_PATH)
    }

    #[tokio::test]
    async fn test_text_upload_returns_travellers() {
        let completion = Arc::new(CountingCompletion::default());
        let url = spawn_app(completion.clone()).await;

        let form = Form::new().part(
            "file",
            Part::bytes(b"John Smith, born 1990-05-02, Swedish".to_vec())
                .file_name("note.txt")
                .mime_str("text/plain")
                .unwrap(),
        );
        let resp = reqwest::Client::new().post(&url).multipart(form).send().await.unwrap();

        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["travellers"][0]["firstName"], "John");
        assert_eq!(body["globalInfo"]["nationality"], "Swedish");
        assert_eq!(completion.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_file_is_400_without_model_call() {
        let completion = Arc::new(CountingCompletion::default());
        let url = spawn_app(completion.clone()).await;

        let form = Form::new().text("note", "no file here");
        let resp = reqwest::Client::new().post(&url).multipart(form).send().await.unwrap();

        assert_eq!(resp.status(), 400);
        let body: ErrorBody = resp.json().await.unwrap();
        assert_eq!(body.message, "No file uploaded");
        assert_eq!(completion.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_get_is_method_not_allowed() {
        let completion = Arc::new(CountingCompletion::default());
        let url = spawn_app(completion.clone()).await;

        let resp = reqwest::Client::new().get(&url).send().await.unwrap();

        assert_eq!(resp.status(), 405);
        let body: ErrorBody = resp.json().await.unwrap();
        assert_eq!(body.message, "Method not allowed");
    }

    #[tokio::test]
    async fn test_non_multipart_body_is_rejected() {
        let completion = Arc::new(CountingCompletion::default());
        let url = spawn_app(completion.clone()).await;

        let resp = reqwest::Client::new()
            .post(&url)
            .header("content-type", "application/json")
            .body("{}")
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 400);
        let body: ErrorBody = resp.json().await.unwrap();
        assert_eq!(body.message, "Error processing file");
        assert_eq!(completion.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_corrupt_pdf_is_extraction_error() {
        let completion = Arc::new(CountingCompletion::default());
        let url = spawn_app(completion.clone()).await;

        let form = Form::new().part(
            "file",
            Part::bytes(b"%PDF-not-really".to_vec())
                .file_name("list.pdf")
                .mime_str("application/pdf")
                .unwrap(),
        );
        let resp = reqwest::Client::new().post(&url).multipart(form).send().await.unwrap();

        assert_eq!(resp.status(), 500);
        let body: ErrorBody = resp.json().await.unwrap();
        assert_eq!(body.message, "Error extracting file content");
        assert!(body.error.contains("PDF"));
        assert_eq!(completion.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_upload_over_body_limit_is_413() {
        let completion = Arc::new(CountingCompletion::default());
        let app = router(AppState::new(completion.clone()), 1024);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let form = Form::new().part(
            "file",
            Part::bytes(vec![b'a'; 8 * 1024])
                .file_name("note.txt")
                .mime_str("text/plain")
                .unwrap(),
        );
        let resp = reqwest::Client::new()
            .post(format!("http://{}{}", addr, PROCESS_TRAVELLERS_PATH))
            .multipart(form)
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 413);
        let body: ErrorBody = resp.json().await.unwrap();
        assert_eq!(body.message, "File too large");
        assert_eq!(completion.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_health() {
        let completion = Arc::new(CountingCompletion::default());
        let url = spawn_app(completion).await;
        let health = url.replace(PROCESS_TRAVELLERS_PATH, "/health");

        let resp = reqwest::get(&health).await.unwrap();
        assert_eq!(resp.text().await.unwrap(), "ok");
    }
}
