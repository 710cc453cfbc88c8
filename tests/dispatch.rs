//! Dispatch-path integration tests: listener fan-out, interceptor ordering,
//! collectors, and replace-on-reregister semantics, all against the
//! in-memory mock server.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{default_connection, wait_until, Recorder};
use xmppc::error::BoxError;
use xmppc::packet::{
    IdFilter, KindFilter, Message, MessageType, MessageTypeFilter, Packet, Presence, StanzaKind,
};

fn chat_with_id(id: &str) -> Packet {
    let mut message = Message::chat("someone@mock.example.org", "hello");
    message.id = id.to_string();
    message.from = Some("peer@mock.example.org/home".to_string());
    Packet::Message(message)
}

fn headline(id: &str) -> Packet {
    let mut message = Message::chat("someone@mock.example.org", "news");
    message.id = id.to_string();
    message.message_type = MessageType::Headline;
    Packet::Message(message)
}

// Scenario A: a filtered receive listener sees exactly the matching packet.
#[tokio::test]
async fn receive_listener_honors_filter() {
    let (connection, connector) = default_connection();
    connection.connect().await.unwrap();

    let recorder = Recorder::new();
    connection.add_receive_listener(
        recorder.clone(),
        Some(Arc::new(MessageTypeFilter::new(MessageType::Chat))),
    );

    assert!(connector.inject(headline("not-chat")).await);
    assert!(connector.inject(chat_with_id("is-chat")).await);

    wait_until("chat packet delivered", || recorder.len() == 1).await;
    // Give the non-matching packet time to have been (wrongly) delivered.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let packets = recorder.packets();
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].id(), "is-chat");

    connection.disconnect().await;
}

// Scenario B: a collector receives matching packets in decode order and
// nothing else.
#[tokio::test]
async fn collector_receives_only_matches() {
    let (connection, connector) = default_connection();
    connection.connect().await.unwrap();

    let collector = connection
        .create_packet_collector(Some(Arc::new(IdFilter::new("iq1"))))
        .unwrap();

    for id in ["iq0", "iq1", "iq2"] {
        assert!(connector.inject(chat_with_id(id)).await);
    }

    let packet = collector
        .next_result_timeout(Duration::from_secs(2))
        .await
        .expect("matching packet");
    assert_eq!(packet.id(), "iq1");
    assert_eq!(collector.poll_result(), None);

    collector.cancel();
    connection.disconnect().await;
}

#[tokio::test]
async fn collector_timeout_returns_none() {
    let (connection, _connector) = default_connection();
    connection.connect().await.unwrap();

    let collector = connection
        .create_packet_collector(Some(Arc::new(IdFilter::new("never"))))
        .unwrap();
    assert_eq!(
        collector.next_result_timeout(Duration::from_millis(80)).await,
        None
    );

    collector.cancel();
    connection.disconnect().await;
}

// Interceptors run in registration order, each seeing the previous one's
// mutation, before the transport write; send listeners fire after the write
// with the final packet.
#[tokio::test]
async fn interceptors_run_in_order_before_write() {
    let (connection, connector) = default_connection();
    connection.connect().await.unwrap();

    for tag in ["one", "two", "three"] {
        connection.add_interceptor(
            Arc::new(move |packet: &mut Packet| -> Result<(), BoxError> {
                if let Packet::Message(message) = packet {
                    let body = message.body.take().unwrap_or_default();
                    message.body = Some(format!("{}|{}", body, tag));
                }
                Ok(())
            }),
            None,
        );
    }

    let sent = Recorder::new();
    connection.add_send_listener(sent.clone(), Some(Arc::new(KindFilter::new(StanzaKind::Message))));

    connection
        .send_packet(Packet::Message(Message::chat("bob@mock.example.org", "base")))
        .await
        .unwrap();

    wait_until("server received the message", || {
        connector
            .received()
            .iter()
            .any(|p| p.kind() == StanzaKind::Message)
    })
    .await;

    let on_wire = connector
        .received()
        .into_iter()
        .find_map(|p| match p {
            Packet::Message(m) => Some(m),
            _ => None,
        })
        .expect("message on wire");
    assert_eq!(on_wire.body.as_deref(), Some("base|one|two|three"));

    // Send listener observed the post-interception packet.
    wait_until("send listener notified", || sent.len() == 1).await;
    let Packet::Message(observed) = sent.packets().remove(0) else {
        panic!("expected message");
    };
    assert_eq!(observed.body.as_deref(), Some("base|one|two|three"));

    connection.disconnect().await;
}

// Re-registering at a handle keeps exactly one active entry using the
// newest filter, verified through dispatch behavior.
#[tokio::test]
async fn reregistration_replaces_filter() {
    let (connection, connector) = default_connection();
    connection.connect().await.unwrap();

    let recorder = Recorder::new();
    let handle = connection.add_receive_listener(
        recorder.clone(),
        Some(Arc::new(MessageTypeFilter::new(MessageType::Chat))),
    );
    connection
        .replace_receive_listener(
            handle,
            recorder.clone(),
            Some(Arc::new(MessageTypeFilter::new(MessageType::Headline))),
        )
        .unwrap();

    assert!(connector.inject(chat_with_id("chat-1")).await);
    assert!(connector.inject(headline("headline-1")).await);

    wait_until("headline delivered", || recorder.len() >= 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let packets = recorder.packets();
    assert_eq!(packets.len(), 1, "exactly one entry must remain active");
    assert_eq!(packets[0].id(), "headline-1");

    connection.disconnect().await;
}

#[tokio::test]
async fn replace_with_unknown_handle_is_invalid_argument() {
    let (connection, _connector) = default_connection();

    let recorder = Recorder::new();
    let handle = connection.add_receive_listener(recorder.clone(), None);
    connection.remove_receive_listener(handle);
    connection.remove_receive_listener(handle); // no-op

    let error = connection
        .replace_receive_listener(handle, recorder, None)
        .unwrap_err();
    assert!(matches!(error, xmppc::Error::InvalidArgument(_)));
}

// A failing listener is isolated: siblings still run, the error is counted.
#[tokio::test]
async fn failing_listener_does_not_block_siblings() {
    let (connection, connector) = default_connection();
    connection.connect().await.unwrap();

    connection.add_receive_listener(
        Arc::new(|_: &Packet| -> Result<(), BoxError> { Err("listener exploded".into()) }),
        None,
    );
    let recorder = Recorder::new();
    connection.add_receive_listener(recorder.clone(), None);

    assert!(connector.inject(chat_with_id("survivor")).await);

    wait_until("surviving listener ran", || recorder.len() == 1).await;
    assert!(connection.stats().dispatch_errors() >= 1);

    connection.disconnect().await;
}

// Collector queues are bounded: overflow drops the oldest entry.
#[tokio::test]
async fn collector_overflow_drops_oldest() {
    let mut config = xmppc::config::ConnectionConfig::new("mock.example.org");
    config.collector_capacity = 2;
    let (connection, connector) = common::connection_with_mock(
        config,
        xmppc::transport::MockServerConfig::default(),
    );
    connection.connect().await.unwrap();

    let collector = connection.create_packet_collector(None).unwrap();

    for id in ["first", "second", "third"] {
        assert!(connector.inject(chat_with_id(id)).await);
    }

    wait_until("overflow recorded", || {
        connection.stats().collector_overflows() == 1
    })
    .await;

    assert_eq!(
        collector.poll_result().map(|p| p.id().to_string()),
        Some("second".to_string())
    );
    assert_eq!(
        collector.poll_result().map(|p| p.id().to_string()),
        Some("third".to_string())
    );
    assert_eq!(collector.poll_result(), None);

    collector.cancel();
    connection.disconnect().await;
}

// Presence injected by the server reaches kind-filtered listeners.
#[tokio::test]
async fn kind_filter_selects_presence() {
    let (connection, connector) = default_connection();
    connection.connect().await.unwrap();

    let recorder = Recorder::new();
    connection.add_receive_listener(
        recorder.clone(),
        Some(Arc::new(KindFilter::new(StanzaKind::Presence))),
    );

    let mut presence = Presence::available();
    presence.from = Some("peer@mock.example.org".to_string());
    assert!(connector.inject(Packet::Presence(presence)).await);
    assert!(connector.inject(chat_with_id("noise")).await);

    wait_until("presence delivered", || recorder.len() == 1).await;
    assert_eq!(recorder.packets()[0].kind(), StanzaKind::Presence);

    connection.disconnect().await;
}
