use anyhow::{bail, Context, Result};
use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::Value;

use crate::config::Credential;

/// A file attached to a multipart request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub field: &'static str,
    pub file_name: &'static str,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

impl FilePart {
    pub fn png(field: &'static str, bytes: Vec<u8>) -> Self {
        let file_name = match field {
            "mask" => "mask.png",
            _ => "image.png",
        };
        Self {
            field,
            file_name,
            mime: "image/png",
            bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    Multipart {
        fields: Vec<(String, String)>,
        files: Vec<FilePart>,
    },
}

/// One authenticated POST against the service.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub url: String,
    pub token: Credential,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn field(&self, name: &str) -> Option<&str> {
        match &self.body {
            RequestBody::Json(payload) => payload.get(name).and_then(Value::as_str),
            RequestBody::Multipart { fields, .. } => fields
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str()),
        }
    }

    pub fn file(&self, field: &str) -> Option<&FilePart> {
        match &self.body {
            RequestBody::Json(_) => None,
            RequestBody::Multipart { files, .. } => files.iter().find(|file| file.field == field),
        }
    }
}

/// Network seam between the client and the wire.
pub trait Transport: Send + Sync {
    /// Sends the request and returns the decoded JSON body. Error payloads
    /// (`{"code": ...}`) are returned as values, whatever the HTTP status.
    fn post(&self, request: ApiRequest) -> Result<Value>;

    /// Plain GET of a result URL.
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    http: HttpClient,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(http: HttpClient) -> Self {
        Self { http }
    }
}

impl Transport for HttpTransport {
    fn post(&self, request: ApiRequest) -> Result<Value> {
        let ApiRequest { url, token, body } = request;
        let builder = self.http.post(&url).bearer_auth(token.expose());
        let builder = match body {
            RequestBody::Json(payload) => builder.json(&payload),
            RequestBody::Multipart { fields, files } => {
                let mut form = MultipartForm::new();
                for (key, value) in fields {
                    form = form.text(key, value);
                }
                for file in files {
                    let part = MultipartPart::bytes(file.bytes)
                        .file_name(file.file_name)
                        .mime_str(file.mime)
                        .with_context(|| format!("invalid mime '{}'", file.mime))?;
                    form = form.part(file.field, part);
                }
                builder.multipart(form)
            }
        };
        let response = builder
            .send()
            .with_context(|| format!("Recraft request failed ({url})"))?;
        response_payload(response)
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(url)
            .send()
            .with_context(|| format!("failed downloading Recraft image ({url})"))?;
        if !response.status().is_success() {
            let code = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            bail!(
                "Recraft image download failed ({code}): {}",
                truncate_text(&body, 512)
            );
        }
        let bytes = response
            .bytes()
            .context("failed reading Recraft image bytes")?;
        Ok(bytes.to_vec())
    }
}

fn response_payload(response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .context("Recraft response body read failed")?;
    match serde_json::from_str::<Value>(&body) {
        Ok(payload) if status.is_success() || payload.get("code").is_some() => Ok(payload),
        Ok(_) => bail!(
            "Recraft request failed ({code}): {}",
            truncate_text(&body, 512)
        ),
        Err(err) if status.is_success() => {
            Err(err).context("Recraft returned invalid JSON payload")
        }
        Err(_) => bail!(
            "Recraft request failed ({code}): {}",
            truncate_text(&body, 512)
        ),
    }
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
