use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use innapse_contracts::prompt::{GenerationRequest, RequestKind};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};

use crate::client::{GeneratedPayload, GenerationClient, GenerationError};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_EDIT_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_GENERATE_MODEL: &str = "imagen-4.0-generate-001";
const REQUEST_TIMEOUT_SECONDS: u64 = 90;

/// Google image client: Gemini `generateContent` for edits and fusion,
/// Imagen `predict` for text-only generation.
pub struct GoogleClient {
    api_base: String,
    api_key: Option<String>,
    edit_model: String,
    generate_model: String,
    http: HttpClient,
}

impl GoogleClient {
    pub fn new(api_base: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            api_base: api_base.into().trim().trim_end_matches('/').to_string(),
            api_key,
            edit_model: DEFAULT_EDIT_MODEL.to_string(),
            generate_model: DEFAULT_GENERATE_MODEL.to_string(),
            http: HttpClient::new(),
        }
    }

    pub fn from_env() -> Self {
        let api_base = non_empty_env("GEMINI_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let api_key = non_empty_env("GEMINI_API_KEY")
            .or_else(|| non_empty_env("GOOGLE_API_KEY"))
            .or_else(|| non_empty_env("API_KEY"));
        let mut client = Self::new(api_base, api_key);
        if let Some(model) = non_empty_env("INNAPSE_EDIT_MODEL") {
            client.edit_model = model;
        }
        if let Some(model) = non_empty_env("INNAPSE_GENERATE_MODEL") {
            client.generate_model = model;
        }
        client
    }

    pub fn with_models(mut self, edit_model: &str, generate_model: &str) -> Self {
        self.edit_model = edit_model.to_string();
        self.generate_model = generate_model.to_string();
        self
    }

    pub fn endpoint(&self, kind: RequestKind) -> String {
        match kind {
            RequestKind::Edit => format!(
                "{}/{}:generateContent",
                self.api_base,
                model_path(&self.edit_model)
            ),
            RequestKind::Generate => format!(
                "{}/{}:predict",
                self.api_base,
                model_path(&self.generate_model)
            ),
        }
    }

    fn post(&self, endpoint: &str, api_key: &str, payload: &Value) -> Result<Value> {
        let response = self
            .http
            .post(endpoint)
            .query(&[("key", api_key)])
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .json(payload)
            .send()
            .with_context(|| format!("request to {endpoint} failed"))?;
        response_json_or_error(response)
    }
}

impl GenerationClient for GoogleClient {
    fn name(&self) -> &str {
        "google"
    }

    fn generate(&self, request: &GenerationRequest) -> Result<GeneratedPayload, GenerationError> {
        let kind = request.kind();
        let provider = provider_label(kind);
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(GenerationError::MissingApiKey {
                provider: provider.to_string(),
            });
        };
        let endpoint = self.endpoint(kind);
        let payload = match kind {
            RequestKind::Edit => build_edit_payload(request),
            RequestKind::Generate => build_generate_payload(request),
        };
        log::debug!(
            "sending {} request with {} reference image(s) to {endpoint}",
            kind.as_str(),
            request.images.len()
        );

        let request_error = |err: anyhow::Error| GenerationError::Request {
            provider: provider.to_string(),
            message: error_chain_text(&err, 512),
        };
        let response = self.post(&endpoint, api_key, &payload).map_err(request_error)?;
        let image = match kind {
            RequestKind::Edit => extract_inline_image(&response),
            RequestKind::Generate => extract_prediction(&response),
        }
        .map_err(request_error)?;

        image.ok_or_else(|| GenerationError::NoImage {
            provider: provider.to_string(),
            kind: match kind {
                RequestKind::Edit => "editing".to_string(),
                RequestKind::Generate => "generation".to_string(),
            },
        })
    }
}

fn provider_label(kind: RequestKind) -> &'static str {
    match kind {
        RequestKind::Edit => "Gemini",
        RequestKind::Generate => "Imagen",
    }
}

fn model_path(model: &str) -> String {
    let trimmed = model.trim();
    if trimmed.starts_with("models/") {
        trimmed.to_string()
    } else {
        format!("models/{trimmed}")
    }
}

/// Text first, then every reference image in request order. The service
/// picks output geometry from the references, so no aspect ratio is sent.
pub fn build_edit_payload(request: &GenerationRequest) -> Value {
    let mut parts = vec![json!({ "text": request.prompt })];
    for image in &request.images {
        parts.push(json!({
            "inlineData": {
                "mimeType": image.mime_type(),
                "data": image.to_base64(),
            }
        }));
    }
    json!({
        "contents": [{
            "role": "user",
            "parts": parts,
        }],
        "generationConfig": {
            "responseModalities": ["IMAGE"],
        },
    })
}

pub fn build_generate_payload(request: &GenerationRequest) -> Value {
    json!({
        "instances": [{
            "prompt": request.prompt,
        }],
        "parameters": {
            "sampleCount": 1,
            "aspectRatio": request.aspect_ratio.as_str(),
        },
    })
}

/// First inline image part of the first candidate.
pub fn extract_inline_image(response: &Value) -> Result<Option<GeneratedPayload>> {
    let parts = response
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    for part in parts {
        let Some(inline) = part
            .get("inlineData")
            .or_else(|| part.get("inline_data"))
            .and_then(Value::as_object)
        else {
            continue;
        };
        let data = inline
            .get("data")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if data.is_empty() {
            continue;
        }
        let bytes = BASE64
            .decode(data.as_bytes())
            .context("Gemini image base64 decode failed")?;
        let mime_type = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(Value::as_str)
            .unwrap_or("image/png")
            .to_string();
        return Ok(Some(GeneratedPayload { bytes, mime_type }));
    }
    Ok(None)
}

/// First prediction carrying image bytes.
pub fn extract_prediction(response: &Value) -> Result<Option<GeneratedPayload>> {
    let predictions = response
        .get("predictions")
        .or_else(|| response.get("generatedImages"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    for row in predictions {
        let holder = row
            .get("image")
            .filter(|value| value.is_object())
            .unwrap_or(&row);
        let Some(encoded) = holder
            .get("bytesBase64Encoded")
            .or_else(|| holder.get("imageBytes"))
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
        else {
            continue;
        };
        let bytes = BASE64
            .decode(encoded.as_bytes())
            .context("Imagen image base64 decode failed")?;
        let mime_type = holder
            .get("mimeType")
            .and_then(Value::as_str)
            .unwrap_or("image/png")
            .to_string();
        return Ok(Some(GeneratedPayload { bytes, mime_type }));
    }
    Ok(None)
}

fn response_json_or_error(response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response.text().context("response body read failed")?;
    if !status.is_success() {
        bail!("status {code}: {}", truncate_text(&body, 512));
    }
    let parsed: Value = serde_json::from_str(&body).context("response was not valid JSON")?;
    Ok(parsed)
}

fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() || parts.last().map(String::as_str) == Some(trimmed) {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use innapse_contracts::config::{AspectRatio, ImageRef};
    use serde_json::json;

    use super::*;

    fn request(images: Vec<ImageRef>) -> GenerationRequest {
        GenerationRequest {
            prompt: "make it snow".to_string(),
            images,
            aspect_ratio: AspectRatio::Portrait,
        }
    }

    #[test]
    fn endpoints_follow_request_kind() {
        let client = GoogleClient::new("https://example.test/v1beta/", Some("k".to_string()));
        assert_eq!(
            client.endpoint(RequestKind::Edit),
            "https://example.test/v1beta/models/gemini-2.5-flash-image:generateContent"
        );
        assert_eq!(
            client.endpoint(RequestKind::Generate),
            "https://example.test/v1beta/models/imagen-4.0-generate-001:predict"
        );
        let custom = client.with_models("models/gemini-x", "imagen-y");
        assert_eq!(
            custom.endpoint(RequestKind::Edit),
            "https://example.test/v1beta/models/gemini-x:generateContent"
        );
    }

    #[test]
    fn edit_payload_puts_text_before_images_and_omits_ratio() {
        let payload = build_edit_payload(&request(vec![
            ImageRef::from_bytes(vec![1, 2], "image/jpeg", "a.jpg"),
            ImageRef::from_bytes(vec![3], "image/png", "b.png"),
        ]));
        let parts = &payload["contents"][0]["parts"];
        assert_eq!(parts[0], json!({ "text": "make it snow" }));
        assert_eq!(parts[1]["inlineData"]["mimeType"], json!("image/jpeg"));
        assert_eq!(parts[1]["inlineData"]["data"], json!(BASE64.encode([1u8, 2])));
        assert_eq!(parts[2]["inlineData"]["mimeType"], json!("image/png"));
        assert_eq!(
            payload["generationConfig"]["responseModalities"],
            json!(["IMAGE"])
        );
        assert!(payload.to_string().find("9:16").is_none());
    }

    #[test]
    fn generate_payload_requests_one_image_at_ratio() {
        let payload = build_generate_payload(&request(Vec::new()));
        assert_eq!(payload["instances"][0]["prompt"], json!("make it snow"));
        assert_eq!(payload["parameters"]["sampleCount"], json!(1));
        assert_eq!(payload["parameters"]["aspectRatio"], json!("9:16"));
    }

    #[test]
    fn extract_inline_image_skips_text_parts() -> Result<()> {
        let response = json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "here you go" },
                        { "inlineData": { "mimeType": "image/webp", "data": BASE64.encode([9u8, 8]) } }
                    ]
                }
            }]
        });
        let image = extract_inline_image(&response)?;
        assert_eq!(
            image,
            Some(GeneratedPayload {
                bytes: vec![9, 8],
                mime_type: "image/webp".to_string(),
            })
        );
        assert_eq!(extract_inline_image(&json!({ "candidates": [] }))?, None);
        Ok(())
    }

    #[test]
    fn extract_prediction_reads_both_shapes() -> Result<()> {
        let flat = json!({ "predictions": [{ "bytesBase64Encoded": BASE64.encode([1u8]), "mimeType": "image/png" }] });
        assert_eq!(extract_prediction(&flat)?.map(|image| image.bytes), Some(vec![1]));

        let nested = json!({ "generatedImages": [{ "image": { "imageBytes": BASE64.encode([2u8]) } }] });
        let image = extract_prediction(&nested)?;
        assert_eq!(image.as_ref().map(|image| image.bytes.clone()), Some(vec![2]));
        assert_eq!(image.map(|image| image.mime_type), Some("image/png".to_string()));

        assert_eq!(extract_prediction(&json!({ "predictions": [{}] }))?, None);
        Ok(())
    }

    #[test]
    fn corrupt_base64_is_an_error() {
        let response = json!({ "predictions": [{ "bytesBase64Encoded": "@@not-base64@@" }] });
        assert!(extract_prediction(&response).is_err());
    }

    #[test]
    fn missing_key_fails_before_any_request() {
        let client = GoogleClient::new(DEFAULT_API_BASE, None);
        let err = client.generate(&request(Vec::new())).err();
        assert!(matches!(
            err,
            Some(GenerationError::MissingApiKey { ref provider }) if provider == "Imagen"
        ));
    }

    #[test]
    fn error_chain_text_joins_causes() {
        let err = anyhow::anyhow!("connection refused").context("request to x failed");
        assert_eq!(
            error_chain_text(&err, 512),
            "request to x failed | caused by: connection refused"
        );
        assert_eq!(truncate_text("abcdef", 3), "abc…");
    }
}
