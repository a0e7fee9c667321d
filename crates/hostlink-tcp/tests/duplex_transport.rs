//! Integration tests for the duplex transport against a scripted in-process host

use std::sync::Arc;
use std::time::Duration;

use hostlink_core::{
    wire::StreamDecoder, ExecutionContext, HostDescriptor, HostlinkConfig, HostlinkError, Notification,
    NotificationCategory, NotificationListener, RequestId, Transport, TransportError, TransportKind,
};
use hostlink_tcp::TcpTransport;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_test::assert_err;

// ----------------------------------------------------------------------------
// Test Utilities
// ----------------------------------------------------------------------------

/// Host side of one accepted connection
struct HostConnection {
    stream: TcpStream,
    decoder: StreamDecoder,
}

impl HostConnection {
    /// Read the next complete request the client wrote
    async fn next_request(&mut self) -> Value {
        let mut buf = [0u8; 512];
        loop {
            if let Some(value) = self.decoder.next_value().unwrap() {
                return value;
            }
            let read = timeout(Duration::from_secs(2), self.stream.read(&mut buf))
                .await
                .expect("client did not send a request")
                .unwrap();
            assert!(read > 0, "client closed the connection");
            self.decoder.extend(&buf[..read]);
        }
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
        self.stream.flush().await.unwrap();
    }

    async fn send(&mut self, value: Value) {
        self.send_raw(&serde_json::to_vec(&value).unwrap()).await;
    }

    async fn reply(&mut self, request: &Value, result: Value) {
        self.send(json!({"jsonrpc": "2.0", "id": request["id"].clone(), "result": result}))
            .await;
    }
}

/// Start a listener and connect a transport to it
async fn connect_pair(context: ExecutionContext) -> (Arc<TcpTransport>, HostConnection) {
    connect_pair_on(context, &Handle::current()).await
}

/// Same, with the read loop running on `runtime`
async fn connect_pair_on(context: ExecutionContext, runtime: &Handle) -> (Arc<TcpTransport>, HostConnection) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let host = HostDescriptor::new("fake", "127.0.0.1", port, TransportKind::Tcp);

    let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
    let transport = TcpTransport::connect(host, HostlinkConfig::testing().duplex, context, runtime)
        .await
        .unwrap();
    let stream = accept.await.unwrap();

    (
        Arc::new(transport),
        HostConnection {
            stream,
            decoder: StreamDecoder::new(),
        },
    )
}

fn channel_listener() -> (Arc<dyn NotificationListener>, mpsc::UnboundedReceiver<Notification>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let listener: Arc<dyn NotificationListener> = Arc::new(move |notification: &Notification| {
        let _ = tx.send(notification.clone());
    });
    (listener, rx)
}

// ----------------------------------------------------------------------------
// Calls
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_call_receives_matching_reply() {
    let (transport, mut host) = connect_pair(ExecutionContext::current("test")).await;

    let call = {
        let transport = Arc::clone(&transport);
        tokio::spawn(async move {
            transport
                .call("Application.GetProperties", json!({"properties": ["volume"]}), RequestId(7))
                .await
        })
    };

    let request = host.next_request().await;
    assert_eq!(request["jsonrpc"], "2.0");
    assert_eq!(request["id"], 7);
    assert_eq!(request["method"], "Application.GetProperties");
    host.reply(&request, json!({"volume": 40})).await;

    assert_eq!(call.await.unwrap(), Ok(json!({"volume": 40})));
    assert_eq!(transport.pending_calls(), 0);
}

#[tokio::test]
async fn test_out_of_order_replies_reach_their_own_callers() {
    let (transport, mut host) = connect_pair(ExecutionContext::current("test")).await;

    let first = {
        let transport = Arc::clone(&transport);
        tokio::spawn(async move { transport.call("A.First", Value::Null, RequestId(1)).await })
    };
    let first_request = host.next_request().await;

    let second = {
        let transport = Arc::clone(&transport);
        tokio::spawn(async move { transport.call("B.Second", Value::Null, RequestId(2)).await })
    };
    let second_request = host.next_request().await;

    host.reply(&second_request, json!("second")).await;
    assert_eq!(second.await.unwrap(), Ok(json!("second")));
    assert!(!first.is_finished());

    host.reply(&first_request, json!("first")).await;
    assert_eq!(first.await.unwrap(), Ok(json!("first")));
}

#[tokio::test]
async fn test_duplicate_request_id_rejected_while_outstanding() {
    let (transport, mut host) = connect_pair(ExecutionContext::current("test")).await;

    let first = {
        let transport = Arc::clone(&transport);
        tokio::spawn(async move { transport.call("A.Call", Value::Null, RequestId(5)).await })
    };
    let request = host.next_request().await;

    assert_eq!(
        transport.call("A.Call", Value::Null, RequestId(5)).await,
        Err(TransportError::DuplicateRequestId(RequestId(5)))
    );

    host.reply(&request, json!(true)).await;
    assert_eq!(first.await.unwrap(), Ok(json!(true)));
}

#[tokio::test]
async fn test_remote_error_reply_fails_the_call() {
    let (transport, mut host) = connect_pair(ExecutionContext::current("test")).await;

    let call = {
        let transport = Arc::clone(&transport);
        tokio::spawn(async move { transport.call("Bad.Method", Value::Null, RequestId(3)).await })
    };
    let request = host.next_request().await;
    host.send(json!({
        "jsonrpc": "2.0",
        "id": request["id"].clone(),
        "error": {"code": -32601, "message": "Method not found."}
    }))
    .await;

    assert_eq!(
        call.await.unwrap(),
        Err(TransportError::Remote {
            code: -32601,
            message: "Method not found.".into()
        })
    );
}

#[tokio::test]
async fn test_unmatched_reply_is_dropped_and_stream_survives() {
    let (transport, mut host) = connect_pair(ExecutionContext::current("test")).await;

    let call = {
        let transport = Arc::clone(&transport);
        tokio::spawn(async move { transport.call("A.Call", Value::Null, RequestId(1)).await })
    };
    let request = host.next_request().await;

    host.send(json!({"jsonrpc": "2.0", "id": 999, "result": "stray"})).await;
    host.reply(&request, json!("mine")).await;

    assert_eq!(call.await.unwrap(), Ok(json!("mine")));
    assert!(transport.is_connected());
}

// ----------------------------------------------------------------------------
// Notifications
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_notifications_interleaved_with_replies_without_delimiters() {
    let context = ExecutionContext::current("test");
    let (transport, mut host) = connect_pair(context.clone()).await;
    let (listener, mut notifications) = channel_listener();
    let _link = transport.subscribe(NotificationCategory::Player, listener);

    let call = {
        let transport = Arc::clone(&transport);
        tokio::spawn(async move { transport.call("Player.GetActivePlayers", Value::Null, RequestId(9)).await })
    };
    let request = host.next_request().await;

    let mut bytes = serde_json::to_vec(&json!({
        "jsonrpc": "2.0",
        "method": "Player.OnPause",
        "params": {"data": {"player": {"playerid": 1}}, "sender": "xbmc"}
    }))
    .unwrap();
    bytes.extend(serde_json::to_vec(&json!({"jsonrpc": "2.0", "id": 9, "result": []})).unwrap());
    host.send_raw(&bytes).await;

    assert_eq!(call.await.unwrap(), Ok(json!([])));
    let notification = timeout(Duration::from_secs(1), notifications.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(notification.category, NotificationCategory::Player);
    assert_eq!(notification.event(), "OnPause");
}

#[tokio::test]
async fn test_unlinked_listener_stops_receiving() {
    let context = ExecutionContext::current("test");
    let (transport, mut host) = connect_pair(context.clone()).await;
    let (listener, mut notifications) = channel_listener();
    let link = transport.subscribe(NotificationCategory::Application, listener);
    assert_eq!(transport.notifications().listener_count(NotificationCategory::Application), 1);

    link.unlink();
    assert_eq!(transport.notifications().listener_count(NotificationCategory::Application), 0);

    host.send(json!({"jsonrpc": "2.0", "method": "Application.OnVolumeChanged", "params": {}}))
        .await;
    // A later reply proves the notification was already read
    let call = {
        let transport = Arc::clone(&transport);
        tokio::spawn(async move { transport.call("A.Call", Value::Null, RequestId(1)).await })
    };
    let request = host.next_request().await;
    host.reply(&request, json!(null)).await;
    call.await.unwrap().unwrap();
    context.flush().await;

    assert!(notifications.try_recv().is_err());
}

// ----------------------------------------------------------------------------
// Dispose and Failure
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_dispose_cancels_pending_and_rejects_new_calls() {
    let (transport, mut host) = connect_pair(ExecutionContext::current("test")).await;

    let pending = {
        let transport = Arc::clone(&transport);
        tokio::spawn(async move { transport.call("A.Slow", Value::Null, RequestId(1)).await })
    };
    host.next_request().await;

    transport.dispose().await;
    assert_eq!(pending.await.unwrap(), Err(TransportError::Cancelled));
    assert!(transport.is_disposed());
    assert_eq!(
        transport.call("A.Call", Value::Null, RequestId(2)).await,
        Err(TransportError::NotConnected)
    );

    // Second dispose is a no-op
    transport.dispose().await;
    assert!(transport.is_disposed());
}

#[tokio::test]
async fn test_host_close_fails_pending_calls_and_reports_error() {
    let context = ExecutionContext::current("test");
    let (errors_tx, mut errors) = mpsc::unbounded_channel();
    context.set_error_handler(move |err: HostlinkError| {
        let _ = errors_tx.send(err);
    });
    let (transport, mut host) = connect_pair(context).await;

    let pending = {
        let transport = Arc::clone(&transport);
        tokio::spawn(async move { transport.call("A.Call", Value::Null, RequestId(1)).await })
    };
    host.next_request().await;
    drop(host);

    let err = assert_err!(pending.await.unwrap());
    assert!(matches!(err, TransportError::Io(_)), "{:?}", err);
    let reported = timeout(Duration::from_secs(1), errors.recv()).await.unwrap().unwrap();
    assert!(matches!(reported.transport(), Some(TransportError::Io(_))));

    assert!(!transport.is_connected());
    assert_eq!(
        transport.call("A.Call", Value::Null, RequestId(2)).await,
        Err(TransportError::NotConnected)
    );
}

#[tokio::test]
async fn test_connect_to_closed_port_fails() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let host = HostDescriptor::new("gone", "127.0.0.1", port, TransportKind::Tcp);
    let result = TcpTransport::connect(
        host,
        HostlinkConfig::testing().duplex,
        ExecutionContext::current("test"),
        &Handle::current(),
    )
    .await;
    assert!(matches!(result, Err(TransportError::Io(_))));
}

#[tokio::test]
async fn test_reports_push_capability() {
    let (transport, _host) = connect_pair(ExecutionContext::current("test")).await;
    assert!(transport.capabilities().supports_notifications());
    assert_eq!(transport.host().name, "fake");
}

#[tokio::test]
async fn test_read_loop_runs_on_the_given_runtime() {
    let io = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap();
    let (transport, mut host) = connect_pair_on(ExecutionContext::current("test"), io.handle()).await;

    let call = {
        let transport = Arc::clone(&transport);
        tokio::spawn(async move { transport.call("A.Call", Value::Null, RequestId(5)).await })
    };
    let request = host.next_request().await;
    host.reply(&request, json!("done")).await;

    // This thread is blocked, so only the io runtime can route the reply
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while transport.pending_calls() > 0 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(transport.pending_calls(), 0);

    assert_eq!(call.await.unwrap(), Ok(json!("done")));
    transport.dispose().await;
    io.shutdown_background();
}
