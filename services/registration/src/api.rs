use crate::blob_classifier::classify;
use crate::config::{ApiConfig, ExportConfig, UploadConfig};
use crate::document::DocumentRenderer;
use crate::error::RegistrationError;
use crate::record_store::RecordStore;
use crate::registration::Registration;
use crate::schema::AttachmentField;
use crate::submission::{SubmissionForm, UploadPolicy};
use crate::util::sanitize_download_name;
use crate::workbook::{WorkbookRenderer, EXPORT_FILENAME, XLSX_CONTENT_TYPE};
use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};
use uuid::Uuid;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: RecordStore,
    pub upload_policy: Arc<UploadPolicy>,
    pub workbook: Arc<WorkbookRenderer>,
    pub document: Arc<DocumentRenderer>,
}

impl AppState {
    pub fn new(store: RecordStore, uploads: &UploadConfig, export: &ExportConfig) -> Self {
        let workbook = WorkbookRenderer::new(store.schema(), export);

        Self {
            upload_policy: Arc::new(UploadPolicy::from_config(uploads)),
            workbook: Arc::new(workbook),
            document: Arc::new(DocumentRenderer::new(export)),
            store,
        }
    }
}

/// Successful registration response
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub id: Uuid,
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    let body_limit = state.upload_policy.request_body_limit();

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/api/register", post(register))
        .route("/api/register/:id", get(get_registration))
        .route("/api/image/:id/:field", get(view_attachment))
        .route("/api/download/:id/:field/:filename", get(download_attachment))
        .route("/api/export", get(export_workbook))
        .route("/api/export/pdf", post(export_pdf))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "registration-service"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected",
                "error": e.to_string()
            })),
        ),
    }
}

/// Validate and store a multipart registration
#[instrument(skip(state, multipart))]
async fn register(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<RegisterResponse>), RegistrationError> {
    let form = SubmissionForm::from_multipart(multipart, &state.upload_policy).await?;
    let inserted = state.store.create(&form).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "Registration successful".to_string(),
            id: inserted.id,
        }),
    ))
}

/// Fetch one registration with base64-encoded attachments
#[instrument(skip(state))]
async fn get_registration(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Registration>, RegistrationError> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| RegistrationError::NotFound("Registration".to_string()))?;

    Ok(Json(state.store.get(id).await?))
}

/// Serve an attachment inline
#[instrument(skip(state))]
async fn view_attachment(
    State(state): State<AppState>,
    Path((id, field)): Path<(String, String)>,
) -> Result<Response, RegistrationError> {
    serve_attachment(&state, &id, &field, None).await
}

/// Serve an attachment as a forced download
#[instrument(skip(state))]
async fn download_attachment(
    State(state): State<AppState>,
    Path((id, field, filename)): Path<(String, String, String)>,
) -> Result<Response, RegistrationError> {
    serve_attachment(&state, &id, &field, Some(&filename)).await
}

/// Look up one attachment and answer with its sniffed content type.
///
/// The field name is validated before any lookup, so an invalid field is a
/// 400 whether or not the registration exists.
async fn serve_attachment(
    state: &AppState,
    id: &str,
    field: &str,
    download_name: Option<&str>,
) -> Result<Response, RegistrationError> {
    let field: AttachmentField = field.parse()?;
    let not_found = || RegistrationError::NotFound("File".to_string());

    let id = Uuid::parse_str(id).map_err(|_| not_found())?;
    let registration = match state.store.get(id).await {
        Ok(registration) => registration,
        Err(RegistrationError::NotFound(_)) => return Err(not_found()),
        Err(e) => return Err(e),
    };
    let bytes = registration.attachment(field).ok_or_else(not_found)?;

    let kind = classify(bytes);
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(kind.mime_type()));

    if let Some(name) = download_name {
        let filename = sanitize_download_name(name, field.name());
        headers.insert(header::CONTENT_DISPOSITION, attachment_disposition(&filename)?);
    }

    metrics::counter!("registration.attachments_served", "field" => field.name()).increment(1);

    Ok((headers, bytes.to_vec()).into_response())
}

/// Export every registration as an XLSX workbook
#[instrument(skip(state))]
async fn export_workbook(State(state): State<AppState>) -> Result<Response, RegistrationError> {
    let registrations = state.store.list().await?;
    let count = registrations.len();

    let renderer = state.workbook.clone();
    let buffer = tokio::task::spawn_blocking(move || renderer.render(&registrations))
        .await
        .map_err(|e| RegistrationError::Render(e.to_string()))??;

    info!(count, bytes = buffer.len(), "Workbook exported");
    metrics::counter!("registration.exports", "format" => "xlsx").increment(1);

    file_response(XLSX_CONTENT_TYPE, EXPORT_FILENAME, buffer)
}

/// Render an unsaved submission as a PDF application form
#[instrument(skip(state, multipart))]
async fn export_pdf(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, RegistrationError> {
    let form = SubmissionForm::from_multipart(multipart, &state.upload_policy).await?;
    let filename = DocumentRenderer::download_filename(&form);

    let renderer = state.document.clone();
    let buffer = tokio::task::spawn_blocking(move || renderer.render(&form))
        .await
        .map_err(|e| RegistrationError::Render(e.to_string()))??;

    info!(filename = %filename, bytes = buffer.len(), "Application form rendered");
    metrics::counter!("registration.exports", "format" => "pdf").increment(1);

    file_response("application/pdf", &filename, buffer)
}

fn attachment_disposition(filename: &str) -> Result<HeaderValue, RegistrationError> {
    HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
        .map_err(|e| RegistrationError::validation("filename", e.to_string()))
}

fn file_response(
    content_type: &'static str,
    filename: &str,
    body: Vec<u8>,
) -> Result<Response, RegistrationError> {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(header::CONTENT_DISPOSITION, attachment_disposition(filename)?);

    Ok((headers, body).into_response())
}

/// Start the registration API server
pub async fn start_api_server(state: AppState, config: &ApiConfig) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting registration API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .await
        .context("API server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MockRegistrationRepository;
    use crate::schema::RegistrationSchema;
    use crate::test_support::{memory_store, PNG_1X1};
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    const BOUNDARY: &str = "registration-test-boundary";

    enum Part<'a> {
        Text(&'a str, &'a str),
        File {
            name: &'a str,
            filename: &'a str,
            content_type: &'a str,
            bytes: &'a [u8],
        },
    }

    fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n")
                            .as_bytes(),
                    );
                    body.extend_from_slice(value.as_bytes());
                }
                Part::File {
                    name,
                    filename,
                    content_type,
                    bytes,
                } => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                             Content-Type: {content_type}\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(bytes);
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn required_parts() -> Vec<Part<'static>> {
        vec![
            Part::Text("name", "Asha Rao"),
            Part::Text("fatherName", "Ravi Rao"),
            Part::Text("address", "Medchal Road, Hyderabad"),
            Part::Text("mobile", "9876543210"),
            Part::Text("resident", "Telangana"),
            Part::Text("board12th", "TSBIE"),
            Part::Text("maxMarks12th", "1000"),
            Part::Text("marksObtained12th", "912"),
            Part::Text("percentage12th", "91.2"),
            Part::Text("priorities", r#"["CSE","ECE"]"#),
            Part::File {
                name: "memo12th",
                filename: "memo.pdf",
                content_type: "application/pdf",
                bytes: b"%PDF-1.4 memo",
            },
        ]
    }

    fn multipart_request(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn app_with_store(store: RecordStore) -> Router {
        let state = AppState::new(store, &UploadConfig::default(), &ExportConfig::default());
        create_router(state, &ApiConfig::default())
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    async fn register_with_photo(app: &Router) -> String {
        let mut parts = required_parts();
        parts.push(Part::File {
            name: "photo",
            filename: "photo.png",
            content_type: "image/png",
            bytes: PNG_1X1,
        });

        let response = app
            .clone()
            .oneshot(multipart_request("/api/register", &parts))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let json = body_json(response).await;
        assert_eq!(json["message"], "Registration successful");
        json["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_register_then_fetch() {
        let app = app_with_store(memory_store());
        let id = register_with_photo(&app).await;

        let response = app
            .oneshot(get_request(&format!("/api/register/{id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["id"], id.as_str());
        assert_eq!(json["fatherName"], "Ravi Rao");
        assert_eq!(json["maxMarks12th"], 1000.0);
        assert_eq!(json["priorities"], serde_json::json!(["CSE", "ECE"]));
        assert_eq!(json["memo12th"], "JVBERi0xLjQgbWVtbw==");
        assert_eq!(json["memo10th"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_register_missing_memo_is_rejected() {
        let store = memory_store();
        let app = app_with_store(store.clone());
        let mut parts = required_parts();
        parts.pop();

        let response = app
            .oneshot(multipart_request("/api/register", &parts))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = body_json(response).await;
        assert_eq!(json["code"], "VALIDATION_ERROR");
        assert_eq!(json["field"], "memo12th");
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_register_rejects_disallowed_type() {
        let app = app_with_store(memory_store());
        let mut parts = required_parts();
        parts.push(Part::File {
            name: "photo",
            filename: "photo.gif",
            content_type: "image/gif",
            bytes: b"GIF89a",
        });

        let response = app
            .oneshot(multipart_request("/api/register", &parts))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["field"], "photo");
    }

    fn photo_of_size(len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        bytes[..3].copy_from_slice(&[0xFF, 0xD8, 0xFF]);
        bytes
    }

    #[tokio::test]
    async fn test_register_rejects_oversize_photo() {
        let store = memory_store();
        let app = app_with_store(store.clone());
        let photo = photo_of_size(UploadConfig::default().max_file_bytes + 1);
        let mut parts = required_parts();
        parts.push(Part::File {
            name: "photo",
            filename: "photo.jpg",
            content_type: "image/jpeg",
            bytes: &photo,
        });

        let response = app
            .oneshot(multipart_request("/api/register", &parts))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = body_json(response).await;
        assert_eq!(json["code"], "VALIDATION_ERROR");
        assert_eq!(json["field"], "photo");
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_register_accepts_photo_at_size_limit() {
        let store = memory_store();
        let app = app_with_store(store.clone());
        let photo = photo_of_size(UploadConfig::default().max_file_bytes);
        let mut parts = required_parts();
        parts.push(Part::File {
            name: "photo",
            filename: "photo.jpg",
            content_type: "image/jpeg",
            bytes: &photo,
        });

        let response = app
            .oneshot(multipart_request("/api/register", &parts))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let stored = store.list().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(
            stored[0].attachment(AttachmentField::Photo).map(<[u8]>::len),
            Some(photo.len())
        );
    }

    #[tokio::test]
    async fn test_register_rejects_malformed_priorities() {
        let app = app_with_store(memory_store());
        let mut parts = required_parts();
        parts.push(Part::Text("priorities", "CSE"));

        let response = app
            .oneshot(multipart_request("/api/register", &parts))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["field"], "priorities");
    }

    #[tokio::test]
    async fn test_unknown_registration_is_not_found() {
        let app = app_with_store(memory_store());

        for uri in [
            format!("/api/register/{}", Uuid::new_v4()),
            "/api/register/not-a-uuid".to_string(),
        ] {
            let response = app.clone().oneshot(get_request(&uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            assert_eq!(body_json(response).await["message"], "Registration not found");
        }
    }

    #[tokio::test]
    async fn test_view_attachment_sniffs_content_type() {
        let app = app_with_store(memory_store());
        let id = register_with_photo(&app).await;

        let response = app
            .clone()
            .oneshot(get_request(&format!("/api/image/{id}/photo")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        assert!(response.headers().get(header::CONTENT_DISPOSITION).is_none());
        assert_eq!(body_bytes(response).await, PNG_1X1);

        let response = app
            .oneshot(get_request(&format!("/api/image/{id}/memo12th")))
            .await
            .unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
    }

    #[tokio::test]
    async fn test_invalid_field_is_bad_request_before_lookup() {
        let app = app_with_store(memory_store());
        let id = register_with_photo(&app).await;

        for uri in [
            format!("/api/image/{id}/resume"),
            format!("/api/image/{}/resume", Uuid::new_v4()),
            "/api/image/not-a-uuid/resume".to_string(),
            format!("/api/download/{id}/resume/resume.pdf"),
        ] {
            let response = app.clone().oneshot(get_request(&uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body_json(response).await["message"], "Invalid field");
        }
    }

    #[tokio::test]
    async fn test_missing_attachment_is_not_found() {
        let app = app_with_store(memory_store());
        let id = register_with_photo(&app).await;

        for uri in [
            format!("/api/image/{id}/jeeRankCard"),
            format!("/api/image/{}/photo", Uuid::new_v4()),
            "/api/image/not-a-uuid/photo".to_string(),
        ] {
            let response = app.clone().oneshot(get_request(&uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(body_json(response).await["message"], "File not found");
        }
    }

    #[tokio::test]
    async fn test_download_forces_attachment() {
        let app = app_with_store(memory_store());
        let id = register_with_photo(&app).await;

        let response = app
            .oneshot(get_request(&format!("/api/download/{id}/memo12th/memo%2012th%22.pdf")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"memo_12th_.pdf\""
        );
        assert_eq!(body_bytes(response).await, b"%PDF-1.4 memo");
    }

    #[tokio::test]
    async fn test_export_workbook() {
        let app = app_with_store(memory_store());
        register_with_photo(&app).await;

        let response = app.oneshot(get_request("/api/export")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], XLSX_CONTENT_TYPE);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"registrations_export.xlsx\""
        );
        assert!(body_bytes(response).await.starts_with(b"PK"));
    }

    #[tokio::test]
    async fn test_export_pdf_is_not_persisted() {
        let store = memory_store();
        let app = app_with_store(store.clone());

        let response = app
            .oneshot(multipart_request("/api/export/pdf", &required_parts()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"application_Asha_Rao.pdf\""
        );
        assert!(body_bytes(response).await.starts_with(b"%PDF"));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_export_pdf_without_name() {
        let app = app_with_store(memory_store());

        let response = app
            .oneshot(multipart_request("/api/export/pdf", &[Part::Text("mobile", "98")]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"application_form.pdf\""
        );
    }

    #[tokio::test]
    async fn test_health_and_readiness() {
        let app = app_with_store(memory_store());

        let response = app.clone().oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(get_request("/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ready");
    }

    #[tokio::test]
    async fn test_readiness_reports_unreachable_store() {
        let mut repository = MockRegistrationRepository::new();
        repository
            .expect_ping()
            .returning(|| Err(RegistrationError::Persistence(sqlx::Error::PoolTimedOut)));
        let store = RecordStore::new(
            Arc::new(RegistrationSchema::standard()),
            Arc::new(repository),
        );

        let response = app_with_store(store).oneshot(get_request("/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_persistence_failure_hides_details() {
        let mut repository = MockRegistrationRepository::new();
        repository
            .expect_insert()
            .returning(|_| Err(RegistrationError::Persistence(sqlx::Error::PoolTimedOut)));
        let store = RecordStore::new(
            Arc::new(RegistrationSchema::standard()),
            Arc::new(repository),
        );

        let response = app_with_store(store)
            .oneshot(multipart_request("/api/register", &required_parts()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(response).await;
        assert_eq!(json["message"], "Internal server error");
        assert_eq!(json["code"], "PERSISTENCE_ERROR");
    }
}
