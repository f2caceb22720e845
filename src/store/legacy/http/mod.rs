//! reqwest client for the store's v2 keys API
//!
//! Reads are `GET /v2/keys{key}`. Watches long-poll the same path with
//! `wait=true`, resuming from `waitIndex` = last `modifiedIndex` + 1. Error
//! bodies carry a numeric `errorCode` that maps onto [`LegacyErrorCode`].


use std::sync::Arc;
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::Client;
use reqwest::StatusCode;
use reqwest::Url;
use serde::Deserialize;
use tonic::async_trait;
use tracing::debug;
use tracing::error;
use tracing::trace;
use tracing::warn;

use super::GetOptions;
use super::LegacyAction;
use super::LegacyError;
use super::LegacyErrorCode;
use super::LegacyKeysApi;
use super::LegacyNode;
use super::LegacyResponse;
use super::LegacyWatcher;
use super::WatcherOptions;
use crate::store::address_str;
use crate::CallScope;
use crate::NetworkConfig;
use crate::StoreError;
use crate::StoreResult;

const KEYS_PATH: &str = "/v2/keys";
const INDEX_HEADER: &str = "X-Etcd-Index";

type Query = Vec<(&'static str, String)>;

/// Legacy generation transport over HTTP
///
/// Endpoints are tried in order on every request; only connection failures
/// move on to the next one. Cloning shares the connection pool.
#[derive(Clone, Debug)]
pub struct HttpKeysApi {
    client: Client,
    endpoints: Arc<[Url]>,
    request_timeout: Option<Duration>,
}

impl HttpKeysApi {
    pub fn new(
        endpoints: &[String],
        config: &NetworkConfig,
    ) -> StoreResult<Self> {
        let endpoints = endpoints
            .iter()
            .map(|endpoint| parse_endpoint(endpoint))
            .collect::<StoreResult<Vec<_>>>()?;
        if endpoints.is_empty() {
            return Err(StoreError::NoReachableEndpoint(Vec::new()));
        }

        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .tcp_keepalive(config.tcp_keepalive())
            .gzip(config.enable_compression)
            .build()?;
        debug!(?endpoints, "legacy http client created");

        Ok(Self {
            client,
            endpoints: endpoints.into(),
            request_timeout: config.request_timeout(),
        })
    }

    /// Issues `GET /v2/keys{key}` and decodes the body
    ///
    /// `Ok(None)` is an empty 200 body, which the store sends when a long poll
    /// ends without an event.
    async fn send(
        &self,
        key: &str,
        query: &Query,
        timeout: Option<Duration>,
    ) -> StoreResult<Option<LegacyResponse>> {
        let mut unreachable = Vec::new();
        for base in self.endpoints.iter() {
            let mut request = self.client.get(keys_url(base, key, query));
            if let Some(timeout) = timeout {
                request = request.timeout(timeout);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    let index = header_index(response.headers());
                    let body = response.bytes().await?;
                    trace!(%base, key, %status, ?index, "legacy keys response");
                    return decode_body(status, index, &body);
                }
                Err(e) if e.is_connect() => {
                    warn!(%base, error = %e, "store endpoint unreachable, trying next");
                    unreachable.push(base.to_string());
                }
                Err(e) => return Err(e.into()),
            }
        }
        error!(endpoints = ?unreachable, "no reachable store endpoint");
        Err(StoreError::NoReachableEndpoint(unreachable))
    }
}

#[async_trait]
impl LegacyKeysApi for HttpKeysApi {
    async fn get(
        &self,
        scope: &CallScope,
        key: &str,
        opts: GetOptions,
    ) -> StoreResult<LegacyResponse> {
        let mut query = Query::new();
        if opts.recursive {
            query.push(("recursive", "true".to_string()));
        }
        let timeout = match (scope.remaining(), self.request_timeout) {
            (Some(remaining), Some(limit)) => Some(remaining.min(limit)),
            (remaining, limit) => remaining.or(limit),
        };

        self.send(key, &query, timeout)
            .await?
            .ok_or_else(|| StoreError::UnexpectedResponse(format!("empty body reading {key}")))
    }

    fn watcher(
        &self,
        key: &str,
        opts: WatcherOptions,
    ) -> Box<dyn LegacyWatcher> {
        Box::new(HttpKeyWatcher {
            api: self.clone(),
            key: key.to_string(),
            recursive: opts.recursive,
            wait_index: (opts.after_index > 0).then(|| opts.after_index + 1),
        })
    }
}

/// Long-poll watcher handed out by [`HttpKeysApi`]
pub struct HttpKeyWatcher {
    api: HttpKeysApi,
    key: String,
    recursive: bool,
    /// `None` until the first event: the store then waits for the next change
    wait_index: Option<u64>,
}

impl HttpKeyWatcher {
    fn query(&self) -> Query {
        let mut query = vec![("wait", "true".to_string())];
        if self.recursive {
            query.push(("recursive", "true".to_string()));
        }
        if let Some(index) = self.wait_index {
            query.push(("waitIndex", index.to_string()));
        }
        query
    }
}

#[async_trait]
impl LegacyWatcher for HttpKeyWatcher {
    async fn next(
        &mut self,
        scope: &CallScope,
    ) -> StoreResult<LegacyResponse> {
        loop {
            let query = self.query();
            match self.api.send(&self.key, &query, scope.remaining()).await? {
                Some(response) => {
                    self.wait_index = Some(response.node.modified_index + 1);
                    return Ok(response);
                }
                None => {
                    trace!(key = %self.key, "long poll ended without event");
                    scope.ensure_live()?;
                }
            }
        }
    }
}

fn parse_endpoint(endpoint: &str) -> StoreResult<Url> {
    Url::parse(&address_str(endpoint)).map_err(|e| StoreError::InvalidEndpoint(format!("{endpoint}: {e}")))
}

/// `{base}/v2/keys{key}?{query}`; the key is percent-encoded as a path
pub(crate) fn keys_url(
    base: &Url,
    key: &str,
    query: &[(&'static str, String)],
) -> Url {
    let mut url = base.clone();
    url.set_path(&format!("{KEYS_PATH}/{}", key.trim_start_matches('/')));
    url.set_query(None);
    if !query.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(query.iter().map(|(name, value)| (*name, value.as_str())));
    }
    url
}

fn header_index(headers: &HeaderMap) -> Option<u64> {
    headers.get(INDEX_HEADER)?.to_str().ok()?.parse().ok()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    action: String,
    node: WireNode,
    #[serde(default)]
    prev_node: Option<WireNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireNode {
    #[serde(default)]
    key: String,
    #[serde(default)]
    value: String,
    #[serde(default)]
    dir: bool,
    #[serde(default)]
    modified_index: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireError {
    error_code: u32,
    #[serde(default)]
    message: String,
    #[serde(default)]
    cause: String,
    #[serde(default)]
    index: u64,
}

impl From<WireNode> for LegacyNode {
    fn from(node: WireNode) -> Self {
        Self {
            key: node.key,
            value: node.value,
            dir: node.dir,
            modified_index: node.modified_index,
        }
    }
}

/// Maps one keys API response onto the wire model
///
/// `index` is the `X-Etcd-Index` header; the node's own index stands in when
/// the header is missing.
pub(crate) fn decode_body(
    status: StatusCode,
    index: Option<u64>,
    body: &[u8],
) -> StoreResult<Option<LegacyResponse>> {
    if status.is_success() {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        let wire: WireResponse = serde_json::from_slice(body)?;
        let action = LegacyAction::parse(&wire.action)
            .ok_or_else(|| StoreError::UnexpectedResponse(format!("unknown action {:?}", wire.action)))?;
        let node = LegacyNode::from(wire.node);
        return Ok(Some(LegacyResponse {
            action,
            index: index.unwrap_or(node.modified_index),
            node,
            prev_node: wire.prev_node.map(Into::into),
        }));
    }

    match serde_json::from_slice::<WireError>(body) {
        Ok(wire) => Err(LegacyError::new(
            LegacyErrorCode::from_code(wire.error_code),
            wire.message,
            wire.cause,
            wire.index,
        )
        .into()),
        Err(_) => Err(StoreError::UnexpectedResponse(format!(
            "HTTP {status}: {}",
            String::from_utf8_lossy(body)
        ))),
    }
}
