use prost::Message;
use tracing_test::traced_test;

use super::proto;
use super::*;

#[test]
fn test_prefix_range_end_increments_last_byte() {
    assert_eq!(prefix_range_end(b"/data"), b"/datb".to_vec());
    assert_eq!(prefix_range_end(b"/block/"), b"/block0".to_vec());
}

#[test]
fn test_prefix_range_end_skips_trailing_max_bytes() {
    assert_eq!(prefix_range_end(&[b'a', 0xff, 0xff]), vec![b'b']);
    assert_eq!(prefix_range_end(&[0x01, 0xfe, 0xff]), vec![0x01, 0xff]);
}

#[test]
fn test_prefix_range_end_of_all_max_bytes_is_keyspace_tail() {
    assert_eq!(prefix_range_end(&[0xff, 0xff]), vec![0]);
    assert_eq!(prefix_range_end(&[]), vec![0]);
}

#[test]
fn test_create_request_covers_prefix_range() {
    let request = create_request("/data");

    match request.request_union {
        Some(RequestUnion::CreateRequest(create)) => {
            assert_eq!(create.key, b"/data".to_vec());
            assert_eq!(create.range_end, b"/datb".to_vec());
            assert_eq!(create.start_revision, 0);
        }
        other => panic!("unexpected request {other:?}"),
    }
}

#[test]
fn test_range_response_conversion() {
    let response = proto::RangeResponse {
        header: Some(proto::ResponseHeader {
            revision: 42,
            ..Default::default()
        }),
        kvs: vec![proto::KeyValue {
            key: b"/data/3".to_vec(),
            value: b"three".to_vec(),
            mod_revision: 40,
            ..Default::default()
        }],
        more: false,
        count: 1,
    };

    let result = RangeResult::from(response);
    assert_eq!(result.revision, 42);
    assert_eq!(result.count, 1);
    assert_eq!(result.kvs[0].key, b"/data/3".to_vec());
    assert_eq!(result.kvs[0].value, b"three".to_vec());
    assert_eq!(result.kvs[0].mod_revision, 40);
}

#[test]
fn test_watch_response_conversion_keeps_event_order() {
    let response = proto::WatchResponse {
        header: Some(proto::ResponseHeader {
            revision: 7,
            ..Default::default()
        }),
        events: vec![
            proto::Event {
                r#type: proto::event::EventType::Put as i32,
                kv: Some(proto::KeyValue {
                    key: b"/data/1".to_vec(),
                    value: b"a".to_vec(),
                    ..Default::default()
                }),
                prev_kv: None,
            },
            proto::Event {
                r#type: proto::event::EventType::Delete as i32,
                kv: Some(proto::KeyValue {
                    key: b"/data/2".to_vec(),
                    ..Default::default()
                }),
                prev_kv: None,
            },
        ],
        ..Default::default()
    };

    let batch = WatchBatch::from(response);
    assert_eq!(batch.revision, 7);
    assert_eq!(
        batch.events,
        vec![ModernEvent::put("/data/1", "a"), ModernEvent::delete("/data/2")]
    );
}

#[test]
fn test_event_decoded_from_wire_bytes() {
    let encoded = proto::Event {
        r#type: proto::event::EventType::Delete as i32,
        kv: Some(proto::KeyValue {
            key: b"/block/3".to_vec(),
            ..Default::default()
        }),
        prev_kv: None,
    }
    .encode_to_vec();

    let decoded = proto::Event::decode(encoded.as_slice()).unwrap();
    let event = ModernEvent::from(decoded);
    assert_eq!(event.kind, EventKind::Delete);
    assert_eq!(event.kv.key, b"/block/3".to_vec());
}

#[tokio::test]
#[traced_test]
async fn test_connect_without_reachable_endpoint() {
    let config = NetworkConfig {
        connect_timeout_ms: 50,
        ..Default::default()
    };
    let endpoints = vec!["127.0.0.1:1".to_string(), "not a uri".to_string()];

    let result = GrpcStore::connect(&endpoints, &config).await;

    match result {
        Err(StoreError::NoReachableEndpoint(tried)) => assert_eq!(tried, endpoints),
        other => panic!("expected NoReachableEndpoint, got {other:?}"),
    }
    assert!(logs_contain("no reachable store endpoint"));
}
