use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use std::time::Duration;

use crate::config::Config;
use crate::errors::{RemoteApiError, RemoteErrorKind};
use crate::models::{AdPayload, AdSetPayload, CampaignPayload, CreativePayload, RemoteResourceRef};
use crate::validation::is_public_url;

type HmacSha256 = Hmac<Sha256>;

/// Response fields requested from every creation call.
pub const DEFAULT_FIELDS: &[&str] = &["id", "name"];

/// Largest image the client will download before uploading.
pub const MAX_IMAGE_BYTES: usize = 30 * 1024 * 1024;
const MAX_REDIRECTS: usize = 5;

/// Graph API error codes that mean "slow down".
const RATE_LIMIT_CODES: &[i64] = &[4, 17, 32, 613, 80004];
/// Graph API error codes for unknown / temporarily unavailable.
const TRANSIENT_CODES: &[i64] = &[1, 2];

/// Creation operations on the remote ad platform.
///
/// Each call is one network round-trip. Authentication is the implementor's
/// concern, never the caller's.
#[async_trait]
pub trait RemoteResourceClient: Send + Sync {
    async fn create_campaign(
        &self,
        fields: &[&str],
        payload: &CampaignPayload,
    ) -> Result<RemoteResourceRef, RemoteApiError>;

    async fn create_ad_set(
        &self,
        fields: &[&str],
        payload: &AdSetPayload,
    ) -> Result<RemoteResourceRef, RemoteApiError>;

    async fn create_ad_creative(
        &self,
        fields: &[&str],
        payload: &CreativePayload,
    ) -> Result<RemoteResourceRef, RemoteApiError>;

    async fn create_ad(
        &self,
        fields: &[&str],
        payload: &AdPayload,
    ) -> Result<RemoteResourceRef, RemoteApiError>;

    /// Uploads the image at `source_url`. The returned ref's `id` is the image hash.
    async fn upload_image(&self, source_url: &str) -> Result<RemoteResourceRef, RemoteApiError>;
}

/// Client for the Graph API marketing endpoints of one ad account.
#[derive(Clone)]
pub struct GraphApiClient {
    client: reqwest::Client,
    graph_root: String,
    ad_account_id: String,
    access_token: String,
    appsecret_proof: Option<String>,
    max_image_bytes: usize,
}

impl GraphApiClient {
    /// Creates a new `GraphApiClient` from validated configuration.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        // Redirects may not lead a download onto an internal host
        let redirect_policy = reqwest::redirect::Policy::custom(|attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else if !is_public_url(attempt.url()) {
                attempt.error("redirect to a non-public host")
            } else {
                attempt.follow()
            }
        });

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .redirect(redirect_policy)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create Graph API client: {}", e))?;

        let appsecret_proof = match config.app_secret.as_deref() {
            Some(secret) => Some(appsecret_proof(secret, &config.access_token)?),
            None => None,
        };

        Ok(Self {
            client,
            graph_root: config.graph_root(),
            ad_account_id: config.ad_account_id.clone(),
            access_token: config.access_token.clone(),
            appsecret_proof,
            max_image_bytes: MAX_IMAGE_BYTES,
        })
    }

    /// Overrides the download cap for `upload_image`.
    pub fn with_max_image_bytes(mut self, max_image_bytes: usize) -> Self {
        self.max_image_bytes = max_image_bytes;
        self
    }

    fn edge_url(&self, edge: &str) -> String {
        format!("{}/{}/{}", self.graph_root, self.ad_account_id, edge)
    }

    fn auth_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("access_token".to_string(), self.access_token.clone())];
        if let Some(ref proof) = self.appsecret_proof {
            params.push(("appsecret_proof".to_string(), proof.clone()));
        }
        params
    }

    /// POSTs a form-encoded creation request to an account edge and reads back
    /// the created object's id and name.
    async fn create_object<P: Serialize>(
        &self,
        edge: &str,
        fields: &[&str],
        payload: &P,
        fallback_name: &str,
    ) -> Result<RemoteResourceRef, RemoteApiError> {
        let mut params = to_form_params(payload)?;
        if !fields.is_empty() {
            params.push(("fields".to_string(), fields.join(",")));
        }
        params.extend(self.auth_params());

        let body = self.post_form(edge, &params).await?;
        let id = extract_id(&body).ok_or_else(|| {
            tracing::warn!("Unexpected Graph API response for {}: {}", edge, body);
            RemoteApiError::permanent(format!("Response from {} missing 'id' field", edge))
        })?;
        let name = body
            .get("name")
            .and_then(|n| n.as_str())
            .unwrap_or(fallback_name)
            .to_string();

        Ok(RemoteResourceRef { id, name })
    }

    async fn post_form(
        &self,
        edge: &str,
        params: &[(String, String)],
    ) -> Result<Value, RemoteApiError> {
        let url = self.edge_url(edge);
        tracing::debug!("POST {} (credentials redacted)", url);

        let response = self
            .client
            .post(&url)
            .form(params)
            .send()
            .await
            .map_err(|e| RemoteApiError::network(format!("Graph API request failed: {}", e)))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            RemoteApiError::network(format!("Failed to read Graph API response: {}", e))
        })?;

        if !status.is_success() {
            return Err(parse_graph_error(status.as_u16(), &text));
        }

        serde_json::from_str(&text).map_err(|e| {
            RemoteApiError::permanent(format!("Failed to parse Graph API response: {}", e))
                .with_status(status.as_u16())
        })
    }

    async fn download_image(&self, source_url: &str) -> Result<Vec<u8>, RemoteApiError> {
        tracing::info!("Downloading image: {}", source_url);

        let mut response = self.client.get(source_url).send().await.map_err(|e| {
            if e.is_redirect() {
                RemoteApiError::permanent(format!("Image download redirect refused: {}", e))
            } else {
                RemoteApiError::network(format!("Image download failed: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = format!("Image download returned status {}", status);
            let err = if status.is_server_error() {
                RemoteApiError::transient(message)
            } else {
                RemoteApiError::permanent(message)
            };
            return Err(err.with_status(status.as_u16()));
        }

        if let Some(length) = response.content_length() {
            if length > self.max_image_bytes as u64 {
                return Err(self.image_too_large(length));
            }
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| RemoteApiError::network(format!("Failed to read image body: {}", e)))?
        {
            if bytes.len() + chunk.len() > self.max_image_bytes {
                return Err(self.image_too_large((bytes.len() + chunk.len()) as u64));
            }
            bytes.extend_from_slice(&chunk);
        }
        if bytes.is_empty() {
            return Err(RemoteApiError::permanent("Downloaded image is empty"));
        }

        Ok(bytes)
    }

    fn image_too_large(&self, size: u64) -> RemoteApiError {
        tracing::warn!(
            "Image exceeds download limit: {} > {} bytes",
            size,
            self.max_image_bytes
        );
        RemoteApiError::permanent(format!(
            "Image exceeds the {} byte limit",
            self.max_image_bytes
        ))
    }
}

#[async_trait]
impl RemoteResourceClient for GraphApiClient {
    async fn create_campaign(
        &self,
        fields: &[&str],
        payload: &CampaignPayload,
    ) -> Result<RemoteResourceRef, RemoteApiError> {
        tracing::info!("Creating campaign: {}", payload.name);
        let created = self
            .create_object("campaigns", fields, payload, &payload.name)
            .await?;
        tracing::info!("✓ Campaign created: {}", created.id);
        Ok(created)
    }

    async fn create_ad_set(
        &self,
        fields: &[&str],
        payload: &AdSetPayload,
    ) -> Result<RemoteResourceRef, RemoteApiError> {
        tracing::info!(
            "Creating ad set '{}' under campaign {}",
            payload.name,
            payload.campaign_id
        );
        let created = self
            .create_object("adsets", fields, payload, &payload.name)
            .await?;
        tracing::info!("✓ Ad set created: {}", created.id);
        Ok(created)
    }

    async fn create_ad_creative(
        &self,
        fields: &[&str],
        payload: &CreativePayload,
    ) -> Result<RemoteResourceRef, RemoteApiError> {
        tracing::info!(
            "Creating ad creative '{}' for page {}",
            payload.name,
            payload.object_story_spec.page_id
        );
        let created = self
            .create_object("adcreatives", fields, payload, &payload.name)
            .await?;
        tracing::info!("✓ Ad creative created: {}", created.id);
        Ok(created)
    }

    async fn create_ad(
        &self,
        fields: &[&str],
        payload: &AdPayload,
    ) -> Result<RemoteResourceRef, RemoteApiError> {
        tracing::info!(
            "Creating ad '{}' in ad set {} with creative {}",
            payload.name,
            payload.adset_id,
            payload.creative.creative_id
        );
        let created = self.create_object("ads", fields, payload, &payload.name).await?;
        tracing::info!("✓ Ad created: {}", created.id);
        Ok(created)
    }

    async fn upload_image(&self, source_url: &str) -> Result<RemoteResourceRef, RemoteApiError> {
        let bytes = self.download_image(source_url).await?;
        let filename = image_filename(source_url);

        let mut params = vec![
            ("bytes".to_string(), BASE64.encode(&bytes)),
            ("name".to_string(), filename.clone()),
        ];
        params.extend(self.auth_params());

        tracing::info!("Uploading image {} ({} bytes)", filename, bytes.len());
        let body = self.post_form("adimages", &params).await?;

        let hash = body
            .get("images")
            .and_then(|images| images.as_object())
            .and_then(|images| images.values().next())
            .and_then(|image| image.get("hash"))
            .and_then(|hash| hash.as_str())
            .ok_or_else(|| {
                RemoteApiError::permanent("Image upload response missing 'images.*.hash'")
            })?;

        tracing::info!("✓ Image uploaded: {}", hash);
        Ok(RemoteResourceRef::new(hash, filename))
    }
}

/// `hex(HMAC-SHA256(app_secret, access_token))`, sent as `appsecret_proof`.
pub fn appsecret_proof(app_secret: &str, access_token: &str) -> anyhow::Result<String> {
    let mut mac = HmacSha256::new_from_slice(app_secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Failed to create HMAC: {}", e))?;
    mac.update(access_token.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Flattens a payload into Graph API form parameters. Scalars are sent as-is,
/// nested objects and arrays as JSON strings.
pub fn to_form_params<P: Serialize>(payload: &P) -> Result<Vec<(String, String)>, RemoteApiError> {
    let value = serde_json::to_value(payload)
        .map_err(|e| RemoteApiError::permanent(format!("Failed to encode payload: {}", e)))?;
    let object = match value {
        Value::Object(map) => map,
        other => {
            return Err(RemoteApiError::permanent(format!(
                "Payload must encode to an object, got {}",
                other
            )))
        }
    };

    Ok(object
        .into_iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let encoded = match v {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (k, encoded)
        })
        .collect())
}

/// Reads an object id that may be a string or a number.
fn extract_id(body: &Value) -> Option<String> {
    match body.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn image_filename(source_url: &str) -> String {
    url::Url::parse(source_url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "image".to_string())
}

#[derive(Debug, Deserialize)]
struct GraphErrorEnvelope {
    error: GraphErrorBody,
}

#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    message: Option<String>,
    code: Option<i64>,
    error_subcode: Option<i64>,
    is_transient: Option<bool>,
    fbtrace_id: Option<String>,
}

/// Decodes a Graph API error response and classifies it.
pub fn parse_graph_error(status: u16, body: &str) -> RemoteApiError {
    match serde_json::from_str::<GraphErrorEnvelope>(body) {
        Ok(GraphErrorEnvelope { error }) => {
            let kind = classify(status, error.code, error.is_transient.unwrap_or(false));
            let message = error
                .message
                .unwrap_or_else(|| format!("Graph API returned status {}", status));
            let mut err = RemoteApiError::new(kind, message)
                .with_status(status)
                .with_code(error.code, error.error_subcode);
            if let Some(trace) = error.fbtrace_id {
                err = err.with_trace_id(trace);
            }
            err
        }
        Err(_) => {
            let kind = classify(status, None, false);
            RemoteApiError::new(
                kind,
                format!("Graph API returned status {}: {}", status, body),
            )
            .with_status(status)
        }
    }
}

fn classify(status: u16, code: Option<i64>, is_transient: bool) -> RemoteErrorKind {
    if status == 429 || code.is_some_and(|c| RATE_LIMIT_CODES.contains(&c)) {
        RemoteErrorKind::RateLimited
    } else if is_transient
        || code.is_some_and(|c| TRANSIENT_CODES.contains(&c))
        || (500..600).contains(&status)
    {
        RemoteErrorKind::Transient
    } else {
        RemoteErrorKind::Permanent
    }
}
