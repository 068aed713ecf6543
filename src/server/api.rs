use crate::agent::CallflowAgent;
use crate::error::{ AnalyzerError, ValidationError };
use crate::models::api::{
    AnalyzeRequest,
    AnalyzeResponse,
    MessageResponse,
    SessionSnapshot,
    UploadResponse,
};
use crate::session::Session;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use axum::{
    routing::{ get, post },
    Router,
    extract::{ DefaultBodyLimit, Multipart, State },
    http::{ HeaderValue, Method },
    Json,
};
use tower_http::cors::{ AllowHeaders, Any, CorsLayer };
use log::{ info, error };

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Session>,
    pub agent: Arc<CallflowAgent>,
    pub upload_packet_ceiling: usize,
    pub upload_timeout: Duration,
}

/// A concrete origin gets credentialed CORS; `*` falls back to an open,
/// credential-less policy since browsers reject the combination.
pub fn cors_layer(origin: &str) -> Result<CorsLayer, Box<dyn Error + Send + Sync>> {
    if origin.trim() == "*" {
        return Ok(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));
    }
    let origin = origin
        .parse::<HeaderValue>()
        .map_err(|e| format!("Invalid CORS origin '{}': {}", origin, e))?;
    Ok(
        CorsLayer::new()
            .allow_origin(origin)
            .allow_credentials(true)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(AllowHeaders::mirror_request())
    )
}

pub fn router(app_state: AppState, cors: CorsLayer, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/upload", post(upload_handler))
        .route("/analyze", post(analyze_handler))
        .route("/state", get(state_handler))
        .route("/reset", post(reset_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .with_state(app_state)
}

pub async fn start_http_server(
    addr: &str,
    app: Router,
    tls: Option<(String, String)>
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = addr.parse::<SocketAddr>()?;

    if let Some((cert_path, key_path)) = tls {
        let tls_config = axum_server::tls_rustls::RustlsConfig
            ::from_pem_file(cert_path, key_path).await?;
        info!("Starting HTTPS API server on: https://{}", addr);
        axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service()).await?;
    } else {
        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            error!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e);
            e
        })?;
        info!("Starting HTTP API server on: http://{}", addr);
        axum::serve(listener, app.into_make_service()).await?;
    }

    Ok(())
}

async fn root_handler() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "5G Callflow Analyzer API".into(),
    })
}

async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart
) -> Result<Json<UploadResponse>, AnalyzerError> {
    let mut upload = None;
    while
        let Some(field) = multipart
            .next_field().await
            .map_err(|e| ValidationError::MalformedUpload(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or(ValidationError::MissingField("filename"))?;
        let bytes = field
            .bytes().await
            .map_err(|e| ValidationError::MalformedUpload(e.to_string()))?;
        upload = Some((filename, bytes));
        break;
    }
    let (filename, bytes) = upload.ok_or(ValidationError::MissingField("file"))?;

    let capture = state.session.captures().store(&filename, &bytes).await?;
    let packet_count = state.agent
        .extractor()
        .count_packets(&capture.path, state.upload_packet_ceiling, state.upload_timeout).await?;

    Ok(
        Json(UploadResponse {
            message: format!("Successfully uploaded {}", capture.filename),
            file_id: capture.id,
            filename: capture.filename,
            size: capture.size,
            packet_count,
        })
    )
}

async fn analyze_handler(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>
) -> Result<Json<AnalyzeResponse>, AnalyzerError> {
    let outcome = state.agent.analyze(&state.session, &request).await?;
    Ok(
        Json(AnalyzeResponse {
            response: outcome.response,
            model_used: outcome.model_used,
            kernel_state: state.session.snapshot().await,
        })
    )
}

async fn state_handler(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.session.snapshot().await)
}

async fn reset_handler(State(state): State<AppState>) -> Json<MessageResponse> {
    state.session.reset().await;
    Json(MessageResponse {
        message: "Kernel reset successfully".into(),
    })
}
