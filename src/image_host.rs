use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use tracing::debug;

use crate::error::{BoardError, Result};

const IMGBB_UPLOAD_URL: &str = "https://api.imgbb.com/1/upload";

/// Image hosting for avatars: takes raw bytes, returns a public URL.
pub trait ImageHost {
    fn upload(&self, name: &str, bytes: &[u8]) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct ImgbbData {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ImgbbError {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImgbbResponse {
    success: bool,
    data: Option<ImgbbData>,
    error: Option<ImgbbError>,
}

#[derive(Debug)]
pub struct ImgbbHost {
    api_key: String,
    endpoint: String,
    client: reqwest::blocking::Client,
}

impl ImgbbHost {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            endpoint: IMGBB_UPLOAD_URL.to_string(),
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl ImageHost for ImgbbHost {
    fn upload(&self, name: &str, bytes: &[u8]) -> Result<String> {
        let encoded = STANDARD.encode(bytes);
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .form(&[("image", encoded.as_str()), ("name", name)])
            .send()?;

        let body: ImgbbResponse = response.json()?;
        let url = parse_upload(body)?;
        debug!(name, %url, "avatar uploaded");
        Ok(url)
    }
}

fn parse_upload(body: ImgbbResponse) -> Result<String> {
    if body.success {
        if let Some(data) = body.data {
            return Ok(data.url);
        }
    }
    let message = body
        .error
        .and_then(|e| e.message)
        .unwrap_or_else(|| "ImgBB upload failed".to_string());
    Err(BoardError::Upload(message))
}
