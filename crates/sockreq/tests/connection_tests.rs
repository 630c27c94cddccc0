//! Tests for the virtual-request connection.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde_json::{Value, json};

use sockreq::headers::{HandshakeHeaders, Headers, RequestHeaders};
use sockreq::transport::{LoopbackFactory, LoopbackTransport, Transport};
use sockreq::{
    ConnectionState, Method, ResponseBody, ResponseEnvelope, Result, SocketConnection, SocketError,
    TransportOptions,
};

const URL: &str = "http://localhost:1337";

type Outcomes = Arc<Mutex<Vec<Result<ResponseEnvelope>>>>;
type OnComplete = Box<dyn FnOnce(Result<ResponseEnvelope>) + Send>;

/// Server stand-in answering `GET /hello` with `world` and echoing everything else.
fn echo_router(channel: &str, payload: &Value) -> Option<Value> {
    let body = match payload["url"].as_str() {
        Some("/hello") => json!("world"),
        _ => json!({"channel": channel, "payload": payload}),
    };
    Some(json!({"statusCode": 200, "headers": {"content-type": "text/plain"}, "body": body}))
}

fn collector() -> (Outcomes, impl Fn() -> OnComplete) {
    let outcomes: Outcomes = Arc::new(Mutex::new(Vec::new()));
    let sink = outcomes.clone();
    let make = move || -> OnComplete {
        let sink = sink.clone();
        Box::new(move |result: Result<ResponseEnvelope>| sink.lock().push(result))
    };
    (outcomes, make)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn open(factory: &LoopbackFactory) -> (SocketConnection, Arc<LoopbackTransport>) {
    init_tracing();
    let socket = SocketConnection::new(URL, factory).expect("Failed to open connection");
    let transport = factory.last().expect("No transport opened");
    (socket, transport)
}

fn emitted_paths(transport: &LoopbackTransport) -> Vec<String> {
    transport
        .emitted()
        .iter()
        .map(|m| m.payload["url"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[test]
fn test_queued_request_completes_after_connect() {
    let factory = LoopbackFactory::new().with_router(echo_router);
    let (socket, transport) = open(&factory);
    let (outcomes, complete) = collector();

    socket.get(Some("tag"), "/hello", None, complete());
    assert_eq!(socket.queued_requests(), 1);
    assert!(transport.emitted().is_empty());
    assert!(outcomes.lock().is_empty());

    socket.connect().expect("connect failed");

    assert_eq!(socket.queued_requests(), 0);
    let outcomes = outcomes.lock();
    assert_eq!(outcomes.len(), 1);
    let response = outcomes[0].as_ref().expect("request failed");
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.body(), &ResponseBody::Text("world".into()));
    assert!(!response.is_error());

    let emitted = transport.emitted();
    let sent = &emitted[0];
    assert_eq!(sent.channel, "get");
    assert_eq!(
        sent.payload,
        json!({"method": "get", "url": "/hello", "params": {}, "headers": {}})
    );
}

#[test]
fn test_connected_request_is_sent_immediately() {
    let factory = LoopbackFactory::new().with_router(echo_router);
    let (socket, transport) = open(&factory);
    socket.connect().expect("connect failed");
    let (outcomes, complete) = collector();

    socket.post(None, "/hello", Some(json!({"foo": "posted!"})), complete());

    assert_eq!(socket.queued_requests(), 0);
    assert_eq!(outcomes.lock().len(), 1);
    let emitted = transport.emitted();
    let sent = &emitted[0];
    assert_eq!(sent.channel, "post");
    assert_eq!(sent.payload["params"], json!({"foo": "posted!"}));
}

#[test]
fn test_verb_channels() {
    let factory = LoopbackFactory::new().with_router(echo_router);
    let (socket, transport) = open(&factory);
    socket.connect().expect("connect failed");

    socket.get(None, "/v", None, |_| {});
    socket.post(None, "/v", None, |_| {});
    socket.put(None, "/v", None, |_| {});
    socket.delete(None, "/v", None, |_| {});

    let channels: Vec<String> = transport.emitted().into_iter().map(|m| m.channel).collect();
    assert_eq!(channels, vec!["get", "post", "put", "delete"]);
    let methods: Vec<Value> = transport
        .emitted()
        .into_iter()
        .map(|m| m.payload["method"].clone())
        .collect();
    assert_eq!(methods, vec![json!("get"), json!("post"), json!("put"), json!("delete")]);
}

#[test]
fn test_queue_replays_in_issue_order() {
    let factory = LoopbackFactory::new();
    let (socket, transport) = open(&factory);

    for path in ["/a", "/b", "/c"] {
        socket.get(None, path, None, |_| {});
    }
    socket.connect().expect("connect failed");

    assert_eq!(emitted_paths(&transport), vec!["/a", "/b", "/c"]);
}

#[test]
fn test_connection_headers_and_request_removal() {
    let factory = LoopbackFactory::new();
    let (socket, transport) = open(&factory);
    socket.connect().expect("connect failed");

    socket.set_headers(Headers::from([
        ("x-test-header-one".to_string(), "foo".to_string()),
        ("x-test-header-two".to_string(), "bar".to_string()),
    ]));
    socket.request(
        None,
        Method::Get,
        "/headersRemove",
        None,
        RequestHeaders::from([
            ("x-test-header-one".to_string(), None),
            ("x-test-header-three".to_string(), Some("baz".to_string())),
        ]),
        |_| {},
    );

    assert_eq!(
        transport.emitted()[0].payload["headers"],
        json!({"x-test-header-two": "bar", "x-test-header-three": "baz"})
    );
    // Connection scope is untouched by the per-request removal.
    assert_eq!(socket.headers().len(), 2);
}

#[test]
fn test_headers_are_captured_at_request_time() {
    let factory = LoopbackFactory::new();
    let (socket, transport) = open(&factory);

    socket.set_headers(Headers::from([("x-a".to_string(), "old".to_string())]));
    socket.get(None, "/queued", None, |_| {});
    socket.set_headers(Headers::from([("x-a".to_string(), "new".to_string())]));
    socket.connect().expect("connect failed");

    assert_eq!(transport.emitted()[0].payload["headers"], json!({"x-a": "old"}));
}

#[test]
fn test_empty_connection_headers_are_ignored() {
    let factory = LoopbackFactory::new();
    let (socket, _) = open(&factory);

    socket.set_headers(Headers::from([("x-a".to_string(), "1".to_string())]));
    socket.set_headers(Headers::new());
    assert_eq!(socket.headers().get("x-a").map(String::as_str), Some("1"));

    socket.clear_headers();
    assert!(socket.headers().is_empty());
}

#[test]
fn test_remove_requests_by_tag() {
    let factory = LoopbackFactory::new();
    let (socket, transport) = open(&factory);
    let (outcomes, complete) = collector();

    socket.get(Some("t"), "/one", None, complete());
    socket.get(Some("other"), "/two", None, complete());
    socket.get(None, "/three", None, complete());
    socket.get(Some("t"), "/four", None, complete());

    assert_eq!(socket.remove_requests_by_tag("t").expect("removal failed"), 2);
    assert_eq!(socket.queued_requests(), 2);

    socket.connect().expect("connect failed");
    assert_eq!(emitted_paths(&transport), vec!["/two", "/three"]);
    assert!(outcomes.lock().is_empty());
}

#[test]
fn test_remove_requests_with_empty_tag_fails() {
    let factory = LoopbackFactory::new();
    let (socket, _) = open(&factory);
    socket.get(Some("t"), "/one", None, |_| {});

    assert!(matches!(
        socket.remove_requests_by_tag(""),
        Err(SocketError::InvalidArgument(_))
    ));
    assert_eq!(socket.queued_requests(), 1);
}

#[test]
fn test_remove_all_requests() {
    let factory = LoopbackFactory::new();
    let (socket, transport) = open(&factory);
    socket.get(Some("t"), "/one", None, |_| {});
    socket.get(None, "/two", None, |_| {});

    assert_eq!(socket.remove_all_requests(), 2);
    socket.connect().expect("connect failed");
    assert!(transport.emitted().is_empty());
}

#[test]
fn test_reconnect_drains_queue() {
    let factory = LoopbackFactory::new().with_router(echo_router);
    let (socket, transport) = open(&factory);
    socket.connect().expect("connect failed");

    transport.simulate_disconnect();
    assert_eq!(socket.state(), ConnectionState::Disconnected);

    let (outcomes, complete) = collector();
    socket.get(None, "/while-down", None, complete());
    assert_eq!(socket.queued_requests(), 1);

    transport.simulate_reconnecting(1);
    assert_eq!(socket.state(), ConnectionState::Reconnecting);
    assert_eq!(socket.queued_requests(), 1);

    transport.simulate_reconnect(1);
    assert_eq!(socket.state(), ConnectionState::Connected);
    assert_eq!(socket.queued_requests(), 0);
    assert_eq!(outcomes.lock().len(), 1);
    assert_eq!(emitted_paths(&transport), vec!["/while-down"]);
}

#[test]
fn test_state_transitions_and_preconditions() {
    let factory = LoopbackFactory::new().manual_connect();
    let (socket, transport) = open(&factory);
    assert_eq!(socket.state(), ConnectionState::Disconnected);
    assert_eq!(socket.disconnect(), Err(SocketError::AlreadyDisconnected));

    socket.connect().expect("connect failed");
    assert_eq!(socket.state(), ConnectionState::Connecting);
    assert_eq!(socket.connect(), Err(SocketError::AlreadyConnecting));
    assert_eq!(socket.reconnect(), Err(SocketError::AlreadyConnecting));

    transport.simulate_connect();
    assert!(socket.is_connected());
    assert_eq!(socket.connect(), Err(SocketError::AlreadyConnected));
    assert_eq!(socket.reconnect(), Err(SocketError::AlreadyConnected));

    socket.disconnect().expect("disconnect failed");
    assert_eq!(socket.state(), ConnectionState::Disconnected);
    assert_eq!(socket.disconnect(), Err(SocketError::AlreadyDisconnected));

    socket.reconnect().expect("reconnect failed");
    assert_eq!(socket.state(), ConnectionState::Connecting);
    assert_eq!(transport.connect_calls(), 2);
}

#[test]
fn test_connect_error_returns_to_disconnected() {
    let factory = LoopbackFactory::new().manual_connect();
    let (socket, transport) = open(&factory);
    socket.get(None, "/kept", None, |_| {});

    socket.connect().expect("connect failed");
    transport.simulate_connect_error("ECONNREFUSED");

    assert_eq!(socket.state(), ConnectionState::Disconnected);
    assert_eq!(socket.queued_requests(), 1);
    socket.connect().expect("retry should be allowed");
}

#[test]
fn test_disconnect_abandons_pending_attempt() {
    let factory = LoopbackFactory::new().manual_connect();
    let (socket, _) = open(&factory);

    socket.connect().expect("connect failed");
    socket.disconnect().expect("disconnect failed");
    assert_eq!(socket.state(), ConnectionState::Disconnected);
}

#[test]
fn test_malformed_reply_reaches_completion_as_error() {
    let factory = LoopbackFactory::new().with_router(|_, _| Some(json!({"statusCode": 200})));
    let (socket, _) = open(&factory);
    socket.connect().expect("connect failed");
    let (outcomes, complete) = collector();

    socket.get(None, "/broken", None, complete());

    let outcomes = outcomes.lock();
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(outcomes[0], Err(SocketError::MalformedResponse(_))));
}

#[test]
fn test_application_errors_are_ordinary_responses() {
    let factory = LoopbackFactory::new();
    let (socket, transport) = open(&factory);
    socket.connect().expect("connect failed");
    let (outcomes, complete) = collector();

    socket.get(None, "/missing", None, complete());
    let id = transport.pending_ids()[0];
    transport.acknowledge(id, json!({"statusCode": 404, "headers": {}, "body": "Not Found"}));

    let outcomes = outcomes.lock();
    let response = outcomes[0].as_ref().expect("404 is not a transport failure");
    assert!(response.is_error());
    assert_eq!(response.body_text(), Some("Not Found"));
}

#[test]
fn test_unanswered_request_never_completes() {
    let factory = LoopbackFactory::new();
    let (socket, transport) = open(&factory);
    socket.connect().expect("connect failed");
    let (outcomes, complete) = collector();

    socket.get(None, "/silent", None, complete());
    assert_eq!(transport.pending_ids().len(), 1);
    assert!(outcomes.lock().is_empty());
}

#[test]
fn test_sdk_marker_in_transport_query() {
    let factory = LoopbackFactory::new();
    let options = TransportOptions::new().query("foo=bar");
    let socket = SocketConnection::with_options(URL, options, &factory).expect("Failed to open");

    let transport = factory.last().expect("No transport opened");
    assert_eq!(
        transport.options().query.as_deref(),
        Some("foo=bar&__sails_io_sdk_version=0.13.7")
    );
    assert_eq!(socket.options().query.as_deref(), Some("foo=bar"));
    assert_eq!(socket.url().as_str(), "http://localhost:1337/");
}

#[test]
fn test_wraps_preopened_transport() {
    let url: url::Url = URL.parse().expect("valid url");
    let transport = Arc::new(LoopbackTransport::new(url.clone(), TransportOptions::new()));
    transport.set_router(echo_router);

    let socket = SocketConnection::from_transport(
        url,
        TransportOptions::new(),
        Arc::clone(&transport) as Arc<dyn Transport>,
    );
    let (outcomes, complete) = collector();
    socket.get(None, "/hello", None, complete());
    socket.connect().expect("connect failed");

    assert_eq!(outcomes.lock().len(), 1);
    assert_eq!(emitted_paths(&transport), vec!["/hello"]);
    assert_eq!(transport.listener_count("connect"), 1);

    drop(socket);
    assert_eq!(transport.listener_count("connect"), 0);
    assert!(transport.is_closed());
}

#[test]
fn test_invalid_url_is_rejected() {
    let factory = LoopbackFactory::new();
    assert!(matches!(
        SocketConnection::new("not a url", &factory),
        Err(SocketError::InvalidUrl(_))
    ));
    assert!(factory.transports().is_empty());
}

#[test]
fn test_handshake_headers_passed_to_transport() {
    let factory = LoopbackFactory::new();
    let (socket, transport) = open(&factory);
    let handshake: HandshakeHeaders =
        HashMap::from([("cookie".to_string(), vec!["sails.sid=abc".to_string()])]);

    socket.connect_with_headers(handshake.clone()).expect("connect failed");
    assert_eq!(transport.handshake_headers(), handshake);
}

#[test]
fn test_custom_event_listeners() {
    let factory = LoopbackFactory::new();
    let (socket, transport) = open(&factory);
    let received = Arc::new(Mutex::new(Vec::new()));

    let received_clone = received.clone();
    let id = socket.on("user", move |payload| received_clone.lock().push(payload.clone()));
    let once_count = Arc::new(AtomicUsize::new(0));
    let once_clone = once_count.clone();
    socket.once("user", move |_| {
        once_clone.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(transport.fire("user", &json!({"verb": "created"})), 2);
    assert_eq!(transport.fire("user", &json!({"verb": "updated"})), 1);
    assert!(socket.off("user", id));
    assert_eq!(transport.fire("user", &json!({"verb": "destroyed"})), 0);
    assert!(!socket.off("user", id));

    assert_eq!(
        *received.lock(),
        vec![json!({"verb": "created"}), json!({"verb": "updated"})]
    );
    assert_eq!(once_count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_requests_during_connect() {
    let factory = LoopbackFactory::new().manual_connect().with_router(echo_router);
    let (socket, transport) = open(&factory);
    socket.connect().expect("connect failed");
    let completed = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for t in 0..4 {
        let socket = socket.clone();
        let completed = completed.clone();
        handles.push(std::thread::spawn(move || {
            for i in 0..50 {
                let completed = completed.clone();
                socket.get(None, &format!("/{t}/{i}"), None, move |result| {
                    assert!(result.is_ok());
                    completed.fetch_add(1, Ordering::SeqCst);
                });
            }
        }));
    }
    transport.simulate_connect();
    for handle in handles {
        handle.join().expect("request thread panicked");
    }

    assert_eq!(socket.queued_requests(), 0);
    assert_eq!(completed.load(Ordering::SeqCst), 200);
    assert_eq!(transport.emitted().len(), 200);
}

#[tokio::test]
async fn test_async_request() {
    let factory = LoopbackFactory::new().with_router(echo_router);
    let (socket, _) = open(&factory);

    let pending = socket.get_async(None, "/hello", None);
    socket.connect().expect("connect failed");

    let response = pending.await.expect("request failed");
    assert_eq!(response.body_text(), Some("world"));
    assert_eq!(response.header("Content-Type"), Some("text/plain"));
}

#[tokio::test]
async fn test_async_reply_from_another_task() {
    let factory = LoopbackFactory::new();
    let (socket, transport) = open(&factory);
    socket.connect().expect("connect failed");

    let pending = socket.put_async(None, "/item/1", Some(json!({"name": "x"})));
    let id = transport.pending_ids()[0];
    tokio::spawn(async move {
        transport.acknowledge(id, json!({"statusCode": 200, "headers": {}, "body": {"id": 1}}));
    });

    let response = pending.await.expect("request failed");
    assert_eq!(response.body(), &ResponseBody::Json(json!({"id": 1})));
}

#[tokio::test]
async fn test_async_request_cancelled_by_removal() {
    let factory = LoopbackFactory::new();
    let (socket, _) = open(&factory);

    let pending = socket.delete_async(Some("drop-me"), "/item/1", None);
    socket.remove_requests_by_tag("drop-me").expect("removal failed");

    assert_eq!(pending.await, Err(SocketError::Cancelled));
}

#[test]
fn test_pending_response_try_take() {
    let factory = LoopbackFactory::new();
    let (socket, transport) = open(&factory);
    socket.connect().expect("connect failed");

    let mut pending =
        socket.request_async(None, Method::Post, "/x", None, RequestHeaders::new());
    assert!(pending.try_take().is_none());

    transport.drop_pending();
    assert_eq!(pending.try_take(), Some(Err(SocketError::Cancelled)));
}
