//! Fetching proof content.
//!
//! The engine only ever needs one thing from the network: the bytes at a url.
//! [Requestor] is that one thing. [HttpRequestor] does it for real (with the
//! `http` feature), [MockRequestor] hands back canned responses.

use crate::{
    context::Context,
    error::{Error, Result},
    util::Url,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// Fetches the content at a url.
#[async_trait]
pub trait Requestor: Send + Sync {
    /// GET `url`. Fails with [Request][Error::Request] if the transport fails,
    /// or with the context's error if it finishes first.
    async fn get(&self, ctx: &Context, url: &Url) -> Result<Vec<u8>>;
}

/// Fetches proofs over http(s).
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpRequestor {
    client: reqwest::Client,
    max_content_bytes: usize,
}

#[cfg(feature = "http")]
impl HttpRequestor {
    pub fn new(config: &crate::config::Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent().as_str())
            .build()
            .map_err(|e| Error::Request(e.to_string()))?;
        Ok(Self {
            client,
            max_content_bytes: *config.max_content_bytes(),
        })
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl Requestor for HttpRequestor {
    /// Stops reading as soon as the body would go over the configured
    /// `max_content_bytes`, failing with
    /// [ProofContentInvalid][Error::ProofContentInvalid].
    async fn get(&self, ctx: &Context, url: &Url) -> Result<Vec<u8>> {
        debug!(%url, "request: get");
        let max = self.max_content_bytes;
        ctx.run(async {
            let mut res = self
                .client
                .get(url.as_str())
                .send()
                .await
                .map_err(|e| Error::Request(e.to_string()))?;
            let status = res.status();
            if !status.is_success() {
                Err(Error::Request(format!("http error {}", status.as_u16())))?;
            }
            if let Some(len) = res.content_length() {
                if len > max as u64 {
                    Err(Error::ProofContentInvalid(format!("content too large ({} bytes)", len)))?;
                }
            }
            let mut body = Vec::new();
            while let Some(chunk) = res.chunk().await.map_err(|e| Error::Request(e.to_string()))? {
                if body.len() + chunk.len() > max {
                    Err(Error::ProofContentInvalid(format!("content too large (over {} bytes)", max)))?;
                }
                body.extend_from_slice(&chunk);
            }
            Ok(body)
        })
        .await
    }
}

#[derive(Debug, Clone)]
enum MockResponse {
    Body(Vec<u8>),
    Error(String),
}

/// A requestor with canned responses, keyed by url.
#[derive(Debug, Default)]
pub struct MockRequestor {
    responses: RwLock<HashMap<String, MockResponse>>,
    requested: RwLock<Vec<String>>,
}

impl MockRequestor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer requests for `url` with `body`.
    pub fn set_response(&self, url: &str, body: Vec<u8>) {
        let mut responses = self.responses.write().unwrap_or_else(|e| e.into_inner());
        responses.insert(url.to_string(), MockResponse::Body(body));
    }

    /// Fail requests for `url` with a transport error whose message is `err`.
    pub fn set_error(&self, url: &str, err: &str) {
        let mut responses = self.responses.write().unwrap_or_else(|e| e.into_inner());
        responses.insert(url.to_string(), MockResponse::Error(err.to_string()));
    }

    /// Every url we've been asked for, in order.
    pub fn requested(&self) -> Vec<String> {
        self.requested.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Requestor for MockRequestor {
    async fn get(&self, ctx: &Context, url: &Url) -> Result<Vec<u8>> {
        ctx.check()?;
        self.requested.write().unwrap_or_else(|e| e.into_inner()).push(url.to_string());
        let response = self.responses.read().unwrap_or_else(|e| e.into_inner()).get(url.as_str()).cloned();
        match response {
            Some(MockResponse::Body(body)) => Ok(body),
            Some(MockResponse::Error(err)) => Err(Error::Request(err)),
            None => Err(Error::Request(format!("http error 404 for {}", url))),
        }
    }
}
