//! Item API client. Houses [`ItemClient`], its error type, and the
//! [`HttpTransport`] seam the client issues GET requests through.

use crate::client::metrics::{ClientMetrics, ClientMetricsSnapshot};
use crate::client::options::ClientOptions;
use crate::client::retry::{
    RetryContext, GET_ITEM_RETRY, GET_MAX_ITEM_RETRY, GET_RAW_RETRY,
};
use crate::model::{Item, ItemId};
use anyhow::{anyhow, Context, Result};
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use tokio::time::{sleep, Instant};

/// Body the API returns with a 2xx status for a resource that exists but is not
/// materialized yet.
pub const ABSENT_SENTINEL: &str = "null";

#[derive(Debug)]
pub enum ClientError {
    /// No response was received.
    Transport { url: String, message: String },
    /// A response was received but it was not a usable 2xx body.
    Protocol { status: u16, body: String },
    /// A usable body could not be interpreted.
    Parse { what: &'static str, message: String },
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Protocol { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn is_absent(&self) -> bool {
        matches!(
            self,
            ClientError::Protocol { status, body }
                if is_success(*status) && body == ABSENT_SENTINEL
        )
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Transport { url, message } => {
                write!(f, "transport error requesting {url}: {message}")
            }
            ClientError::Protocol { status, body } => write!(f, "http error: {status} {body}"),
            ClientError::Parse { what, message } => write!(f, "failed to parse {what}: {message}"),
        }
    }
}

impl std::error::Error for ClientError {}

/// Status and body of a response, before any classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

pub trait HttpTransport: Send + Sync {
    /// Issues a single GET. Errors mean no response was received.
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<RawResponse>>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(options: &ClientOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.http_timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<RawResponse>> {
        Box::pin(async move {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|err| anyhow!("GET failed: {err}"))?;
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|err| anyhow!("failed to read response body: {err}"))?;
            Ok(RawResponse { status, body })
        })
    }
}

#[derive(Clone)]
pub struct ItemClient {
    transport: Arc<dyn HttpTransport>,
    options: ClientOptions,
    metrics: Arc<ClientMetrics>,
}

impl fmt::Debug for ItemClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemClient")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ItemClient {
    pub fn new(options: ClientOptions) -> Result<Self> {
        options.validate()?;
        let transport = ReqwestTransport::new(&options)?;
        Self::with_transport(options, Arc::new(transport))
    }

    pub fn with_transport(options: ClientOptions, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            transport,
            options,
            metrics: Arc::new(ClientMetrics::default()),
        })
    }

    pub fn metrics(&self) -> ClientMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Builds `{base}/{version}/{parts...}.json`.
    pub fn make_url(&self, parts: &[&str]) -> String {
        let mut url = String::from(self.options.base_url.trim().trim_end_matches('/'));
        url.push('/');
        url.push_str(self.options.api_version.trim());
        for part in parts {
            url.push('/');
            url.push_str(part);
        }
        url.push_str(".json");
        url
    }

    pub async fn get_max_item_id(&self) -> Result<ItemId> {
        let url = self.make_url(&["maxitem"]);
        let body = self
            .get_with_retry(&url, RetryContext::new(&GET_MAX_ITEM_RETRY))
            .await?;

        body.parse::<ItemId>().map_err(|err| {
            ClientError::Parse {
                what: "max item id",
                message: format!("{err:#}"),
            }
            .into()
        })
    }

    pub async fn get_item(&self, id: ItemId) -> Result<Item> {
        let id_part = id.to_string();
        let url = self.make_url(&["item", &id_part]);
        let body = self
            .get_with_retry(&url, RetryContext::with_item(&GET_ITEM_RETRY, id))
            .await?;

        Item::from_payload(id, self.options.api_version.clone(), body).map_err(|err| {
            ClientError::Parse {
                what: "item",
                message: format!("{err:#}"),
            }
            .into()
        })
    }

    /// Fetches `url` under the client's retry policy and returns the body of the
    /// first usable 2xx response.
    pub async fn get(&self, url: &str) -> Result<String> {
        Ok(self
            .get_with_retry(url, RetryContext::new(&GET_RAW_RETRY))
            .await?)
    }

    /// Every failure class consumes one attempt: transport errors, the absent
    /// sentinel, 429, 5xx and every other non-2xx status. The error returned
    /// after exhaustion describes the last response received, or the last
    /// transport failure when no response ever arrived.
    async fn get_with_retry(
        &self,
        url: &str,
        context: RetryContext<'_>,
    ) -> std::result::Result<String, ClientError> {
        let max_attempts = self.options.max_attempts;
        let mut last_response: Option<ClientError> = None;
        let mut last_transport: Option<ClientError> = None;

        for attempt in 0..max_attempts {
            let backoff = self.options.backoff_before(attempt);
            if !backoff.is_zero() {
                sleep(backoff).await;
            }

            let start = Instant::now();
            let failure = match self.transport.get(url).await {
                Ok(response) => match classify(response) {
                    Ok(body) => {
                        self.metrics.record_success(start.elapsed());
                        context.log_success(attempt + 1);
                        return Ok(body);
                    }
                    Err(err) => {
                        if err.is_absent() {
                            self.metrics.record_absent(start.elapsed());
                        } else {
                            self.metrics.record_failure(start.elapsed());
                        }
                        err
                    }
                },
                Err(err) => {
                    self.metrics.record_transport_error(start.elapsed());
                    ClientError::Transport {
                        url: url.to_owned(),
                        message: format!("{err:#}"),
                    }
                }
            };

            if attempt + 1 < max_attempts {
                context.log_retry(attempt + 1, self.options.backoff_before(attempt + 1), &failure);
            }

            match failure {
                ClientError::Transport { .. } => last_transport = Some(failure),
                other => last_response = Some(other),
            }
        }

        let err = last_response
            .or(last_transport)
            .unwrap_or_else(|| ClientError::Transport {
                url: url.to_owned(),
                message: "no attempts were made".to_owned(),
            });
        context.log_exhausted(max_attempts, &err);
        Err(err)
    }
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

fn classify(response: RawResponse) -> std::result::Result<String, ClientError> {
    let RawResponse { status, body } = response;
    if is_success(status) && body != ABSENT_SENTINEL {
        Ok(body)
    } else {
        Err(ClientError::Protocol { status, body })
    }
}
