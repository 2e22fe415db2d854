//! Request validation. Runs before any network call; one violation aborts the
//! whole request with no remote side effects.

use serde::Serialize;
use serde_json::{Map, Value};
use std::net::{Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

use crate::models::ProvisioningRequest;

pub const MAX_NAME_CHARS: usize = 400;
pub const MAX_BODY_CHARS: usize = 2000;
const MAX_PAGE_ID_DIGITS: usize = 20;

/// Request fields in reporting order.
const REQUEST_FIELDS: [&str; 8] = [
    "campaignName",
    "adSetName",
    "adName",
    "creativeTitle",
    "creativeBody",
    "pageId",
    "link",
    "imageUrl",
];

/// A single problem with one request field. `field` uses the JSON field name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub reason: String,
}

impl FieldViolation {
    pub fn new(field: &str, reason: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Returns every violation in field order, at most one per field.
pub fn collect_violations(request: &ProvisioningRequest) -> Vec<FieldViolation> {
    let mut violations = Vec::new();

    let text_fields = [
        ("campaignName", request.campaign_name.as_str(), MAX_NAME_CHARS),
        ("adSetName", request.ad_set_name.as_str(), MAX_NAME_CHARS),
        ("adName", request.ad_name.as_str(), MAX_NAME_CHARS),
        ("creativeTitle", request.creative_title.as_str(), MAX_NAME_CHARS),
        ("creativeBody", request.creative_body.as_str(), MAX_BODY_CHARS),
    ];
    for (field, value, max_chars) in text_fields {
        if let Some(v) = check_text(field, value, max_chars) {
            violations.push(v);
        }
    }

    if let Some(v) = check_page_id(&request.page_id) {
        violations.push(v);
    }

    if let Some(v) = check_required_url("link", &request.link) {
        violations.push(v);
    }

    if let Some(image_url) = request.image_url() {
        if let Err(reason) = check_url(image_url).and_then(|_| check_fetchable(image_url)) {
            violations.push(FieldViolation::new("imageUrl", reason));
        }
    }

    violations
}

/// Builds a request from a raw JSON body and validates it in one pass.
///
/// Absent and `null` fields read as empty, numbers and booleans as their JSON
/// text. Arrays and objects are reported as type violations next to every
/// other violation, so one bad field never hides the rest.
pub fn request_from_json(body: &Value) -> Result<ProvisioningRequest, Vec<FieldViolation>> {
    let Some(object) = body.as_object() else {
        return Err(vec![FieldViolation::new("body", "must be a JSON object")]);
    };

    let mut type_violations = Vec::new();
    let mut text = |field: &'static str| match read_text(object, field) {
        Ok(value) => value,
        Err(violation) => {
            type_violations.push(violation);
            String::new()
        }
    };

    let request = ProvisioningRequest {
        campaign_name: text("campaignName"),
        ad_set_name: text("adSetName"),
        ad_name: text("adName"),
        creative_title: text("creativeTitle"),
        creative_body: text("creativeBody"),
        page_id: text("pageId"),
        link: text("link"),
        image_url: Some(text("imageUrl")).filter(|url| !url.is_empty()),
    };

    let mut violations: Vec<FieldViolation> = collect_violations(&request)
        .into_iter()
        .filter(|v| !type_violations.iter().any(|t| t.field == v.field))
        .collect();
    violations.extend(type_violations);
    violations.sort_by_key(|v| field_position(&v.field));

    if violations.is_empty() {
        Ok(request)
    } else {
        Err(violations)
    }
}

fn read_text(object: &Map<String, Value>, field: &'static str) -> Result<String, FieldViolation> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(scalar @ (Value::Number(_) | Value::Bool(_))) => Ok(scalar.to_string()),
        Some(_) => Err(FieldViolation::new(field, "must be a string")),
    }
}

fn field_position(field: &str) -> usize {
    REQUEST_FIELDS
        .iter()
        .position(|f| *f == field)
        .unwrap_or(REQUEST_FIELDS.len())
}

/// `Ok(())` when the request may proceed, otherwise the full violation list.
pub fn validate_request(request: &ProvisioningRequest) -> Result<(), Vec<FieldViolation>> {
    let violations = collect_violations(request);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

fn check_text(field: &str, value: &str, max_chars: usize) -> Option<FieldViolation> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Some(FieldViolation::new(field, "is required"));
    }
    let len = trimmed.chars().count();
    if len > max_chars {
        return Some(FieldViolation::new(
            field,
            format!("must be at most {} characters (got {})", max_chars, len),
        ));
    }
    None
}

/// Page ids are numeric object ids on the remote API.
fn check_page_id(value: &str) -> Option<FieldViolation> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Some(FieldViolation::new("pageId", "is required"));
    }
    if trimmed.len() > MAX_PAGE_ID_DIGITS || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Some(FieldViolation::new(
            "pageId",
            format!("must be a numeric id of 1-{} digits", MAX_PAGE_ID_DIGITS),
        ));
    }
    None
}

fn check_required_url(field: &str, value: &str) -> Option<FieldViolation> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Some(FieldViolation::new(field, "is required"));
    }
    check_url(trimmed)
        .err()
        .map(|reason| FieldViolation::new(field, reason))
}

fn check_url(value: &str) -> Result<(), String> {
    let parsed = Url::parse(value.trim()).map_err(|e| format!("must be a valid URL ({})", e))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err("must use http or https".to_string());
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err("must include a host".to_string());
    }
    Ok(())
}

/// The server downloads `imageUrl` itself, so it must point at a public host.
fn check_fetchable(value: &str) -> Result<(), String> {
    let parsed = Url::parse(value.trim()).map_err(|e| format!("must be a valid URL ({})", e))?;
    if is_public_url(&parsed) {
        Ok(())
    } else {
        Err("must not point at a loopback, private or link-local host".to_string())
    }
}

/// False for `localhost` names and for loopback, private, link-local and
/// unspecified addresses. Names that merely resolve to such addresses pass.
pub fn is_public_url(url: &Url) -> bool {
    match url.host() {
        None => false,
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            domain != "localhost" && !domain.ends_with(".localhost")
        }
        Some(Host::Ipv4(ip)) => is_public_ipv4(ip),
        Some(Host::Ipv6(ip)) => is_public_ipv6(ip),
    }
}

fn is_public_ipv4(ip: Ipv4Addr) -> bool {
    !(ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        // 100.64.0.0/10 carrier-grade NAT
        || (ip.octets()[0] == 100 && (ip.octets()[1] & 0xc0) == 64))
}

fn is_public_ipv6(ip: Ipv6Addr) -> bool {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return is_public_ipv4(mapped);
    }
    let first = ip.segments()[0];
    !(ip.is_loopback()
        || ip.is_unspecified()
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10 link-local
        || (first & 0xffc0) == 0xfe80)
}
