use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::Config;
use crate::errors::AppError;
use crate::models::ProvisionedResources;
use crate::pipeline::ProvisioningPipeline;
use crate::validation::request_from_json;

/// Form page served at `/`.
const FORM_PAGE: &str = include_str!("../static/index.html");

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration, validated once at startup.
    pub config: Arc<Config>,
    /// Provisioning chain bound to the configured ad account.
    pub pipeline: ProvisioningPipeline,
}

/// Success body of `POST /create-ad`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAdResponse {
    pub success: bool,
    pub campaign_id: String,
    pub ad_set_id: String,
    pub creative_id: String,
    pub ad_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_hash: Option<String>,
}

impl From<ProvisionedResources> for CreateAdResponse {
    fn from(resources: ProvisionedResources) -> Self {
        Self {
            success: true,
            campaign_id: resources.campaign.id,
            ad_set_id: resources.ad_set.id,
            creative_id: resources.creative.id,
            ad_id: resources.ad.id,
            image_hash: resources.image.map(|image| image.id),
        }
    }
}

/// Health check endpoint.
///
/// Returns the service status, version, and the ad account it provisions into.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "ad-provisioning-api",
            "version": env!("CARGO_PKG_VERSION"),
            "adAccountId": state.config.ad_account_id,
        })),
    )
}

/// GET /
///
/// Serves the static creation form.
pub async fn form_page() -> Html<&'static str> {
    Html(FORM_PAGE)
}

/// POST /create-ad
///
/// Validates the request, runs the provisioning chain, and reports the created
/// ids. Every response carries an `x-request-id` header that also appears on
/// the request's log lines.
///
/// * 200 - `{success: true, campaignId, adSetId, creativeId, adId[, imageHash]}`
/// * 400 - `{success: false, error, violations: [{field, reason}]}`
/// * 500 - `{success: false, error, errorType, step, details, fbtrace_id}`
pub async fn create_ad(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let span = tracing::info_span!("create_ad", request_id = %request_id);

    let mut response = provision(&state, payload)
        .instrument(span)
        .await
        .into_response();

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

async fn provision(
    state: &AppState,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<CreateAdResponse>, AppError> {
    let Json(body) = payload.map_err(|e| {
        tracing::warn!("Unreadable request body: {}", e);
        AppError::BadRequest(e.body_text())
    })?;

    // Must happen before any network call
    let request = request_from_json(&body)?;

    tracing::info!(
        "📨 Received create-ad request: campaign='{}' ad='{}' image={}",
        request.campaign_name.trim(),
        request.ad_name.trim(),
        request.image_url().is_some()
    );

    let resources = state.pipeline.run(&request).await?;
    Ok(Json(CreateAdResponse::from(resources)))
}

/// Serves the OpenAPI specification YAML file.
///
/// Reads `openapi.yml` from the working directory; 404 if it is missing.
pub async fn serve_openapi_spec() -> impl IntoResponse {
    match tokio::fs::read_to_string("openapi.yml").await {
        Ok(content) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/yaml")],
            content,
        )
            .into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "OpenAPI spec not found").into_response(),
    }
}

/// Serves the Swagger UI HTML page, pointed at `serve_openapi_spec`.
pub async fn serve_swagger_ui() -> impl IntoResponse {
    let html = r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Ad Provisioning API - Swagger UI</title>
    <link rel="stylesheet" type="text/css" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css">
    <style>
        body { margin: 0; padding: 0; }
    </style>
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-standalone-preset.js"></script>
    <script>
        window.onload = function() {
            window.ui = SwaggerUIBundle({
                url: "/api-docs/openapi.yml",
                dom_id: '#swagger-ui',
                deepLinking: true,
                presets: [
                    SwaggerUIBundle.presets.apis,
                    SwaggerUIStandalonePreset
                ],
                layout: "StandaloneLayout"
            });
        };
    </script>
</body>
</html>
"#;
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        html,
    )
}
