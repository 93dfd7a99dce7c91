//! In-memory transport for network-free tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use serde_json::Value;

use crate::codec::encode_image;
use crate::transport::{ApiRequest, Transport};

/// Replays canned JSON responses, serves one image for every fetch, and
/// records everything it was asked to send.
pub(crate) struct RecordingTransport {
    responses: Mutex<VecDeque<Value>>,
    image: Mutex<Vec<u8>>,
    requests: Mutex<Vec<ApiRequest>>,
    fetched: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl RecordingTransport {
    pub(crate) fn replying(response: Value) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::from([response])),
            image: Mutex::new(tiny_png()),
            requests: Mutex::new(Vec::new()),
            fetched: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    pub(crate) fn with_image(self: Arc<Self>, bytes: Vec<u8>) -> Arc<Self> {
        if let Ok(mut image) = self.image.lock() {
            *image = bytes;
        }
        self
    }

    /// Total POSTs and GETs attempted.
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<ApiRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub(crate) fn only_request(&self) -> Result<ApiRequest> {
        let mut requests = self.requests();
        if requests.len() != 1 {
            bail!("expected exactly one request, saw {}", requests.len());
        }
        requests.pop().ok_or_else(|| anyhow!("no request recorded"))
    }

    pub(crate) fn fetched(&self) -> Vec<String> {
        self.fetched
            .lock()
            .map(|urls| urls.clone())
            .unwrap_or_default()
    }
}

impl Transport for RecordingTransport {
    fn post(&self, request: ApiRequest) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .map_err(|_| anyhow!("requests lock poisoned"))?
            .push(request);
        self.responses
            .lock()
            .map_err(|_| anyhow!("responses lock poisoned"))?
            .pop_front()
            .ok_or_else(|| anyhow!("no canned response left"))
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.fetched
            .lock()
            .map_err(|_| anyhow!("fetched lock poisoned"))?
            .push(url.to_string());
        Ok(self
            .image
            .lock()
            .map_err(|_| anyhow!("image lock poisoned"))?
            .clone())
    }
}

/// A 2x1 RGB PNG: one red pixel, one blue pixel.
pub(crate) fn tiny_png() -> Vec<u8> {
    let pixels = ndarray::Array4::from_shape_vec((1, 1, 2, 3), vec![255u8, 0, 0, 0, 0, 255])
        .unwrap_or_else(|_| ndarray::Array4::zeros((1, 1, 2, 3)));
    encode_image(pixels.view()).unwrap_or_default()
}
