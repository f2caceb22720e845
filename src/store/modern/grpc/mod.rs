//! tonic client for the store's v3 `KV` and `Watch` gRPC services

pub mod proto;

#[cfg(test)]
mod grpc_test;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::async_trait;
use tonic::client::Grpc;
use tonic::codec::CompressionEncoding;
use tonic::codec::ProstCodec;
use tonic::codec::Streaming;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;
use tonic::transport::Endpoint;
use tracing::debug;
use tracing::error;
use tracing::trace;
use tracing::warn;

use self::proto::watch_request::RequestUnion;
use super::EventKind;
use super::KeyValue;
use super::ModernEvent;
use super::ModernKv;
use super::ModernWatchApi;
use super::RangeResult;
use super::WatchBatch;
use super::WatchChannel;
use super::WatchSender;
use crate::constants::RANGE_PATH;
use crate::constants::WATCH_PATH;
use crate::store::address_str;
use crate::CallScope;
use crate::NetworkConfig;
use crate::StoreError;
use crate::StoreResult;

/// Modern generation transport over a single tonic channel
///
/// `Channel` is reference counted, so cloning the store shares the connection.
#[derive(Clone, Debug)]
pub struct GrpcStore {
    channel: Channel,
    enable_compression: bool,
    watch_buffer_size: usize,
}

impl GrpcStore {
    /// Connects to the first reachable endpoint, trying them in order
    pub async fn connect(
        endpoints: &[String],
        config: &NetworkConfig,
    ) -> StoreResult<Self> {
        for endpoint in endpoints {
            let addr = address_str(endpoint);
            match Self::create_channel(addr.clone(), config).await {
                Ok(channel) => {
                    debug!(%addr, "connected to store");
                    return Ok(Self::from_channel(channel, config));
                }
                Err(e) => {
                    warn!(%addr, error = %e, "store endpoint unreachable, trying next");
                }
            }
        }
        error!(?endpoints, "no reachable store endpoint");
        Err(StoreError::NoReachableEndpoint(endpoints.to_vec()))
    }

    /// Wraps an existing channel (lazy channels, custom connectors)
    pub fn from_channel(
        channel: Channel,
        config: &NetworkConfig,
    ) -> Self {
        Self {
            channel,
            enable_compression: config.enable_compression,
            watch_buffer_size: config.watch_buffer_size.max(1),
        }
    }

    pub(crate) async fn create_channel(
        addr: String,
        config: &NetworkConfig,
    ) -> StoreResult<Channel> {
        debug!("create_channel, addr = {:?}", &addr);
        let mut endpoint = Endpoint::try_from(addr)?
            .connect_timeout(config.connect_timeout())
            .tcp_keepalive(config.tcp_keepalive())
            .http2_keep_alive_interval(config.http2_keepalive_interval())
            .keep_alive_timeout(config.http2_keepalive_timeout());
        if let Some(timeout) = config.request_timeout() {
            endpoint = endpoint.timeout(timeout);
        }
        endpoint.connect().await.map_err(Into::into)
    }

    async fn client(&self) -> StoreResult<Grpc<Channel>> {
        let mut grpc = Grpc::new(self.channel.clone());
        if self.enable_compression {
            grpc = grpc
                .send_compressed(CompressionEncoding::Gzip)
                .accept_compressed(CompressionEncoding::Gzip);
        }
        grpc.ready().await?;
        Ok(grpc)
    }
}

#[async_trait]
impl ModernKv for GrpcStore {
    async fn range(
        &self,
        scope: &CallScope,
        key: &[u8],
    ) -> StoreResult<RangeResult> {
        let mut request = tonic::Request::new(proto::RangeRequest {
            key: key.to_vec(),
            ..Default::default()
        });
        if let Some(remaining) = scope.remaining() {
            request.set_timeout(remaining);
        }

        let mut grpc = self.client().await?;
        let codec: ProstCodec<proto::RangeRequest, proto::RangeResponse> = ProstCodec::default();
        let response = grpc
            .unary(request, PathAndQuery::from_static(RANGE_PATH), codec)
            .await?
            .into_inner();

        Ok(response.into())
    }
}

#[async_trait]
impl ModernWatchApi for GrpcStore {
    async fn watch(
        &self,
        scope: &CallScope,
        prefix: &str,
    ) -> StoreResult<WatchChannel> {
        let (requests, request_rx) = mpsc::channel(1);
        requests
            .send(create_request(prefix))
            .await
            .map_err(|_| StoreError::ChannelClosed("watch request stream".to_string()))?;

        let mut grpc = self.client().await?;
        let codec: ProstCodec<proto::WatchRequest, proto::WatchResponse> = ProstCodec::default();
        let inbound = grpc
            .streaming(
                tonic::Request::new(ReceiverStream::new(request_rx)),
                PathAndQuery::from_static(WATCH_PATH),
                codec,
            )
            .await?
            .into_inner();

        let (sender, channel) = WatchChannel::bounded(self.watch_buffer_size);
        tokio::spawn(forward_watch(
            prefix.to_string(),
            inbound,
            requests,
            sender,
            scope.token().clone(),
        ));
        Ok(channel)
    }
}

/// Relays watch responses into the adapter's channel until the stream ends,
/// the adapter goes away or the scope is cancelled.
///
/// `requests` is held so the outbound half stays open for the stream's life.
async fn forward_watch(
    prefix: String,
    mut inbound: Streaming<proto::WatchResponse>,
    requests: mpsc::Sender<proto::WatchRequest>,
    sender: WatchSender,
    token: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = token.cancelled() => {
                trace!(%prefix, "watch scope cancelled");
                break;
            }
            _ = sender.closed() => break,
            message = inbound.message() => message,
        };

        let item = match message {
            Ok(Some(response)) if response.canceled => Err(StoreError::WatchCanceled {
                prefix: prefix.clone(),
                reason: response.cancel_reason,
            }),
            Ok(Some(response)) if response.events.is_empty() => {
                trace!(%prefix, created = response.created, "watch response without events");
                continue;
            }
            Ok(Some(response)) => Ok(WatchBatch::from(response)),
            Ok(None) => {
                debug!(%prefix, "watch stream ended");
                break;
            }
            Err(status) => Err(status.into()),
        };

        let terminal = item.is_err();
        if sender.send(item).await.is_err() || terminal {
            break;
        }
    }
    drop(requests);
}

fn create_request(prefix: &str) -> proto::WatchRequest {
    let key = prefix.as_bytes().to_vec();
    proto::WatchRequest {
        request_union: Some(RequestUnion::CreateRequest(proto::WatchCreateRequest {
            range_end: prefix_range_end(&key),
            key,
            ..Default::default()
        })),
    }
}

/// Exclusive end of the key range covered by `prefix`
///
/// Trailing `0xff` bytes cannot be incremented and are dropped first. A prefix
/// made only of `0xff` bytes maps to `[0]`, which the store reads as "every key
/// from `key` onwards".
pub fn prefix_range_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xff {
            end.push(last + 1);
            return end;
        }
    }
    vec![0]
}

impl From<proto::KeyValue> for KeyValue {
    fn from(kv: proto::KeyValue) -> Self {
        Self {
            key: kv.key,
            value: kv.value,
            create_revision: kv.create_revision,
            mod_revision: kv.mod_revision,
            version: kv.version,
        }
    }
}

impl From<proto::RangeResponse> for RangeResult {
    fn from(response: proto::RangeResponse) -> Self {
        Self {
            revision: response.header.map(|h| h.revision).unwrap_or_default(),
            count: response.count,
            kvs: response.kvs.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<proto::Event> for ModernEvent {
    fn from(event: proto::Event) -> Self {
        let kind = match event.r#type() {
            proto::event::EventType::Put => EventKind::Put,
            proto::event::EventType::Delete => EventKind::Delete,
        };
        Self {
            kind,
            kv: event.kv.map(Into::into).unwrap_or_default(),
        }
    }
}

impl From<proto::WatchResponse> for WatchBatch {
    fn from(response: proto::WatchResponse) -> Self {
        WatchBatch::new(
            response.header.map(|h| h.revision).unwrap_or_default(),
            response.events.into_iter().map(Into::into).collect(),
        )
    }
}
