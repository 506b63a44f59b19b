use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::RgbImage;
use reqwest::blocking::{multipart, Client};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub const DETECT_PATH: &str = "detect";
pub const EXPORT_LOG_PATH: &str = "export-log";
pub const IMAGE_FIELD: &str = "image";
pub const FRAME_FILE_NAME: &str = "frame.jpg";

/// Result of running detection on one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    #[serde(default)]
    pub gesture: Option<String>,
    /// Estimated hand distance in centimetres. Non-numeric values are dropped.
    #[serde(default, deserialize_with = "number_or_none")]
    pub distance: Option<f64>,
    /// Annotated frame as base64 JPEG
    #[serde(default)]
    pub processed_image: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl DetectionResult {
    pub fn with_gesture(gesture: &str, distance: Option<f64>) -> Self {
        Self {
            gesture: Some(gesture.to_string()),
            distance,
            ..Self::default()
        }
    }

    /// The gesture label, treating an empty string as no gesture
    pub fn gesture(&self) -> Option<&str> {
        self.gesture.as_deref().filter(|g| !g.is_empty())
    }
}

fn number_or_none<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_f64()))
}

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("server answered {status}: {message}")]
    Status { status: u16, message: String },
    #[error("invalid response body: {0}")]
    InvalidResponse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("processed image is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("processed image could not be decoded: {0}")]
    Image(#[from] image::ImageError),
}

/// Anything that can turn a JPEG frame into a detection
pub trait Detector: Send + 'static {
    fn detect(&self, jpeg: Vec<u8>) -> Result<DetectionResult, DetectError>;
}

/// Detector talking to the server over HTTP. The server accepts one JPEG
/// frame per request as multipart form data and answers with a small JSON
/// document; how the gesture is inferred is entirely its business.
#[derive(Debug, Clone)]
pub struct HttpDetector {
    client: Client,
    endpoint: String,
}

impl HttpDetector {
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self, DetectError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint_url(server_url, DETECT_PATH),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Detector for HttpDetector {
    fn detect(&self, jpeg: Vec<u8>) -> Result<DetectionResult, DetectError> {
        let part = multipart::Part::bytes(jpeg)
            .file_name(FRAME_FILE_NAME)
            .mime_str("image/jpeg")?;
        let form = multipart::Form::new().part(IMAGE_FIELD, part);

        let response = self.client.post(&self.endpoint).multipart(form).send()?;
        let status = response.status().as_u16();
        let body = response.bytes()?;

        parse_response(status, &body)
    }
}

/// Join a server base URL and an endpoint path with exactly one slash
pub fn endpoint_url(server_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        server_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Interpret a `/detect` response. Non-2xx statuses are errors, carrying the
/// server's `error` message when the body has one.
pub fn parse_response(status: u16, body: &[u8]) -> Result<DetectionResult, DetectError> {
    if !(200..300).contains(&status) {
        let message = serde_json::from_slice::<DetectionResult>(body)
            .ok()
            .and_then(|r| r.error)
            .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string());
        return Err(DetectError::Status { status, message });
    }

    Ok(serde_json::from_slice(body)?)
}

/// Decode the server's annotated frame. Accepts bare base64 or a `data:` URL.
pub fn decode_processed_image(payload: &str) -> Result<RgbImage, DecodeError> {
    let encoded = match payload.split_once("base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => payload,
    };
    let bytes = STANDARD.decode(encoded.trim())?;
    Ok(image::load_from_memory(&bytes)?.to_rgb8())
}
