use std::fmt;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::{Credential, RecraftConfig, DEFAULT_API_BASE};
use crate::error::{RecraftError, EMPTY_SERVICE_MESSAGE};
use crate::transport::{
    truncate_text, ApiRequest, FilePart, HttpTransport, RequestBody, Transport,
};

/// Multipart endpoints under `/images/{operation}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    ImageToImage,
    RemoveBackground,
    ReplaceBackground,
    Inpaint,
    CrispUpscale,
    CreativeUpscale,
    ClarityUpscale,
    GenerativeUpscale,
}

impl Operation {
    pub const ALL: [Operation; 8] = [
        Operation::ImageToImage,
        Operation::RemoveBackground,
        Operation::ReplaceBackground,
        Operation::Inpaint,
        Operation::CrispUpscale,
        Operation::CreativeUpscale,
        Operation::ClarityUpscale,
        Operation::GenerativeUpscale,
    ];

    pub fn endpoint(self) -> &'static str {
        match self {
            Operation::ImageToImage => "imageToImage",
            Operation::RemoveBackground => "removeBackground",
            Operation::ReplaceBackground => "replaceBackground",
            Operation::Inpaint => "inpaint",
            Operation::CrispUpscale => "crispUpscale",
            Operation::CreativeUpscale => "creativeUpscale",
            Operation::ClarityUpscale => "clarityUpscale",
            Operation::GenerativeUpscale => "generativeUpscale",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.endpoint())
    }
}

/// Optional request fields. Unset fields are left out of the request so the
/// service applies its own defaults; empty strings count as unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub substyle: Option<String>,
    #[serde(rename = "size", skip_serializing_if = "Option::is_none")]
    pub image_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strength: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub random_seed: Option<u64>,
}

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prompt(mut self, value: &str) -> Self {
        self.prompt = non_empty(value);
        self
    }

    pub fn model(mut self, value: &str) -> Self {
        self.model = non_empty(value);
        self
    }

    pub fn style(mut self, value: &str) -> Self {
        self.style = non_empty(value);
        self
    }

    pub fn substyle(mut self, value: &str) -> Self {
        self.substyle = non_empty(value);
        self
    }

    pub fn image_size(mut self, value: &str) -> Self {
        self.image_size = non_empty(value);
        self
    }

    pub fn strength(mut self, value: f64) -> Self {
        self.strength = Some(value);
        self
    }

    pub fn random_seed(mut self, value: Option<u64>) -> Self {
        self.random_seed = value;
        self
    }

    fn to_object(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self).context("failed serializing request params")? {
            Value::Object(map) => Ok(map),
            other => bail!("request params serialized to {other}"),
        }
    }

    /// Multipart text fields in declaration order.
    pub fn form_fields(&self) -> Result<Vec<(String, String)>> {
        Ok(self
            .to_object()?
            .into_iter()
            .map(|(key, value)| (key, form_text(&value)))
            .collect())
    }
}

/// Blocking client for the Recraft image API. Cheap to clone.
#[derive(Clone)]
pub struct RecraftClient {
    token: Credential,
    api_base: String,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for RecraftClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecraftClient")
            .field("token", &self.token)
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl RecraftClient {
    /// Client against the public endpoint over HTTP.
    pub fn new(token: &str) -> Result<Self> {
        Self::with_transport(
            Credential::new(token)?,
            DEFAULT_API_BASE,
            Arc::new(HttpTransport::new()),
        )
    }

    pub fn with_transport(
        token: Credential,
        api_base: &str,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let api_base = api_base.trim().trim_end_matches('/').to_string();
        if api_base.is_empty() {
            return Err(RecraftError::configuration("API base URL is required"));
        }
        Ok(Self {
            token,
            api_base,
            transport,
        })
    }

    /// Resolves the token (explicit > config file > environment) and builds
    /// a client that sends through `transport`.
    pub fn from_config(
        config: &RecraftConfig,
        explicit_token: Option<&str>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let token = config.resolve_token(explicit_token)?;
        Self::with_transport(token, &config.api_base, transport)
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn generate_image(&self, prompt: &str, params: RequestParams) -> Result<String> {
        let mut payload = params.to_object()?;
        payload.insert("prompt".to_string(), Value::String(prompt.to_string()));
        let response = self.transport.post(ApiRequest {
            url: format!("{}/images/generations", self.api_base),
            token: self.token.clone(),
            body: RequestBody::Json(Value::Object(payload)),
        })?;
        extract_image_url(&response)
    }

    pub fn image_to_image(&self, image: Vec<u8>, params: RequestParams) -> Result<String> {
        self.process(Operation::ImageToImage, image, None, params)
    }

    pub fn remove_background(&self, image: Vec<u8>, random_seed: Option<u64>) -> Result<String> {
        self.process(
            Operation::RemoveBackground,
            image,
            None,
            RequestParams::new().random_seed(random_seed),
        )
    }

    pub fn crisp_upscale(&self, image: Vec<u8>, random_seed: Option<u64>) -> Result<String> {
        self.upscale(Operation::CrispUpscale, image, random_seed)
    }

    pub fn creative_upscale(&self, image: Vec<u8>, random_seed: Option<u64>) -> Result<String> {
        self.upscale(Operation::CreativeUpscale, image, random_seed)
    }

    pub fn clarity_upscale(&self, image: Vec<u8>, random_seed: Option<u64>) -> Result<String> {
        self.upscale(Operation::ClarityUpscale, image, random_seed)
    }

    pub fn generative_upscale(&self, image: Vec<u8>, random_seed: Option<u64>) -> Result<String> {
        self.upscale(Operation::GenerativeUpscale, image, random_seed)
    }

    pub fn replace_background(&self, image: Vec<u8>, params: RequestParams) -> Result<String> {
        self.process(Operation::ReplaceBackground, image, None, params)
    }

    pub fn inpaint(&self, image: Vec<u8>, mask: Vec<u8>, params: RequestParams) -> Result<String> {
        self.process(Operation::Inpaint, image, Some(mask), params)
    }

    /// Downloads a result URL returned by one of the operations above.
    pub fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        self.transport.fetch(url)
    }

    fn upscale(
        &self,
        operation: Operation,
        image: Vec<u8>,
        random_seed: Option<u64>,
    ) -> Result<String> {
        self.process(
            operation,
            image,
            None,
            RequestParams::new().random_seed(random_seed),
        )
    }

    fn process(
        &self,
        operation: Operation,
        image: Vec<u8>,
        mask: Option<Vec<u8>>,
        params: RequestParams,
    ) -> Result<String> {
        let mut files = vec![FilePart::png("image", image)];
        if let Some(mask) = mask {
            files.push(FilePart::png("mask", mask));
        }
        let response = self.transport.post(ApiRequest {
            url: format!("{}/images/{}", self.api_base, operation.endpoint()),
            token: self.token.clone(),
            body: RequestBody::Multipart {
                fields: params.form_fields()?,
                files,
            },
        })?;
        extract_image_url(&response)
    }
}

/// Classifies a response payload: `code` means failure, otherwise the URL
/// sits at `image.url` or `data[0].url`.
pub fn extract_image_url(payload: &Value) -> Result<String> {
    if let Some(code) = payload.get("code") {
        let message = payload
            .get("message")
            .map(form_text)
            .unwrap_or_else(|| EMPTY_SERVICE_MESSAGE.to_string());
        return Err(RecraftError::Service {
            code: Some(form_text(code)),
            message,
        }
        .into());
    }

    let url = payload
        .get("image")
        .and_then(|image| image.get("url"))
        .or_else(|| {
            payload
                .get("data")
                .and_then(|data| data.get(0))
                .and_then(|first| first.get("url"))
        })
        .and_then(Value::as_str);
    match url {
        Some(url) => Ok(url.to_string()),
        None => bail!(
            "Recraft response missing image url: {}",
            truncate_text(&payload.to_string(), 512)
        ),
    }
}

fn form_text(value: &Value) -> String {
    match value {
        Value::String(raw) => raw.to_string(),
        other => other.to_string(),
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}
