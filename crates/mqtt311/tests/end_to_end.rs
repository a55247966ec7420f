//! Client scenarios driven against a hand-scripted in-memory broker.

use bytes::Bytes;
use mqtt311::transport::mock::{broker_pair, BrokerLink, MockBroker};
use mqtt311::{
    ConnectOptions, ConnectReturnCode, Message, MqttClient, MqttError, QoS, ReconnectPolicy,
    Subscription, SubscriptionResult, TransportConfig,
};
use mqtt311_protocol::packet::{
    ConnAckPacket, PubAckPacket, PubCompPacket, PubRecPacket, PubRelPacket, PublishPacket,
    SubAckPacket,
};
use mqtt311_protocol::Packet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn new_client(options: ConnectOptions) -> (MqttClient, MockBroker) {
    let (connector, broker) = broker_pair();
    let client = MqttClient::new(TransportConfig::Mock(connector), options).unwrap();
    (client, broker)
}

fn fast_retry() -> ReconnectPolicy {
    ReconnectPolicy::Retry {
        max_attempts: Some(5),
        initial_backoff: Duration::from_millis(20),
        max_backoff: Duration::from_millis(100),
        jitter: false,
    }
}

async fn accept_and_handshake(broker: &mut MockBroker, session_present: bool) -> BrokerLink {
    let mut link = broker.accept().await.expect("client should open a connection");
    let packet = link.read_packet().await.unwrap();
    assert!(
        matches!(packet, Packet::Connect(_)),
        "expected CONNECT, got {packet:?}"
    );
    link.write_packet(&Packet::ConnAck(ConnAckPacket::new(
        session_present,
        ConnectReturnCode::Accepted,
    )))
    .await
    .unwrap();
    link
}

async fn connect(
    client: &MqttClient,
    broker: &mut MockBroker,
    session_present: bool,
) -> BrokerLink {
    let (result, link) = tokio::join!(
        client.connect(),
        accept_and_handshake(broker, session_present)
    );
    result.unwrap();
    link
}

fn counting_listener(client: &MqttClient) -> (mqtt311::ListenerHandle, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = count.clone();
    let handle = client.add_message_listener(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    (handle, count)
}

#[tokio::test]
async fn clean_session_qos0_publish() {
    let (client, mut broker) = new_client(ConnectOptions::new("c1"));

    let connect_fut = client.connect();
    let broker_script = async {
        let mut link = broker.accept().await.unwrap();
        let Packet::Connect(connect) = link.read_packet().await.unwrap() else {
            panic!("expected CONNECT first");
        };
        assert_eq!(connect.client_id, "c1");
        assert!(connect.clean_session);
        assert_eq!(connect.keep_alive_secs, 60);
        link.write_packet(&Packet::ConnAck(ConnAckPacket::new(
            false,
            ConnectReturnCode::Accepted,
        )))
        .await
        .unwrap();
        link
    };
    let (result, mut link) = tokio::join!(connect_fut, broker_script);
    result.unwrap();

    client
        .publish(Message::new("a", b"x".to_vec()))
        .await
        .unwrap();

    let expected = PublishPacket::new("a", Bytes::from_static(b"x"), QoS::AtMostOnce);
    assert_eq!(
        link.read_packet().await.unwrap(),
        Packet::Publish(expected)
    );
}

#[tokio::test]
async fn qos1_publish_completes_on_puback() {
    let (client, mut broker) = new_client(ConnectOptions::new("c1"));
    let mut link = connect(&client, &mut broker, false).await;

    let publish_fut = client.publish(Message::new("a/b", b"m".to_vec()).with_qos(QoS::AtLeastOnce));
    let broker_script = async {
        let Packet::Publish(publish) = link.read_packet().await.unwrap() else {
            panic!("expected PUBLISH");
        };
        assert_eq!(publish.qos, QoS::AtLeastOnce);
        let id = publish.packet_id.unwrap();
        link.write_packet(&Packet::PubAck(PubAckPacket::new(id)))
            .await
            .unwrap();
    };
    let (result, ()) = tokio::join!(publish_fut, broker_script);
    result.unwrap();
}

#[tokio::test]
async fn qos1_publish_retransmits_with_dup_after_reconnect() {
    let options = ConnectOptions::new("c1")
        .with_clean_session(false)
        .with_publish_retry_interval(Duration::from_secs(60))
        .with_reconnect(fast_retry());
    let (client, mut broker) = new_client(options);
    let link = connect(&client, &mut broker, false).await;

    let publish_fut = client.publish(Message::new("a/b", Vec::new()).with_qos(QoS::AtLeastOnce));
    let broker_script = async {
        let mut link = link;
        let Packet::Publish(first) = link.read_packet().await.unwrap() else {
            panic!("expected PUBLISH");
        };
        assert!(!first.dup);
        let id = first.packet_id.unwrap();

        // transport dies before the PUBACK is sent
        link.close().await.unwrap();

        // the client reconnects; the broker kept the session
        let mut link = accept_and_handshake(&mut broker, true).await;
        let Packet::Publish(second) = link.read_packet().await.unwrap() else {
            panic!("expected retransmitted PUBLISH");
        };
        assert!(second.dup);
        assert_eq!(second.packet_id, Some(id));
        assert_eq!(second.topic, "a/b");

        link.write_packet(&Packet::PubAck(PubAckPacket::new(id)))
            .await
            .unwrap();
    };
    let (result, ()) = tokio::join!(publish_fut, broker_script);
    result.unwrap();
}

#[tokio::test]
async fn qos1_restarts_without_dup_when_session_lost() {
    let options = ConnectOptions::new("c1")
        .with_publish_retry_interval(Duration::from_secs(60))
        .with_reconnect(fast_retry());
    let (client, mut broker) = new_client(options);
    let link = connect(&client, &mut broker, false).await;

    let publish_fut = client.publish(Message::new("a", b"x".to_vec()).with_qos(QoS::AtLeastOnce));
    let broker_script = async {
        let mut link = link;
        let Packet::Publish(first) = link.read_packet().await.unwrap() else {
            panic!("expected PUBLISH");
        };
        let id = first.packet_id.unwrap();
        link.close().await.unwrap();

        // fresh session on reconnect: the publish restarts without DUP
        let mut link = accept_and_handshake(&mut broker, false).await;
        let Packet::Publish(second) = link.read_packet().await.unwrap() else {
            panic!("expected restarted PUBLISH");
        };
        assert!(!second.dup);
        link.write_packet(&Packet::PubAck(PubAckPacket::new(id)))
            .await
            .unwrap();
    };
    let (result, ()) = tokio::join!(publish_fut, broker_script);
    result.unwrap();
}

#[tokio::test]
async fn qos2_duplicate_inbound_invokes_listener_once() {
    let (client, mut broker) = new_client(ConnectOptions::new("c1"));
    let (_handle, count) = counting_listener(&client);
    let mut link = connect(&client, &mut broker, false).await;

    let publish = PublishPacket::new("t", Bytes::from_static(b"m"), QoS::ExactlyOnce)
        .with_packet_id(7);
    link.write_packet(&Packet::Publish(publish.clone()))
        .await
        .unwrap();
    assert_eq!(
        link.read_packet().await.unwrap(),
        Packet::PubRec(PubRecPacket::new(7))
    );

    // retransmission before our PUBREC was acknowledged
    link.write_packet(&Packet::Publish(publish.with_dup(true)))
        .await
        .unwrap();
    assert_eq!(
        link.read_packet().await.unwrap(),
        Packet::PubRec(PubRecPacket::new(7))
    );

    link.write_packet(&Packet::PubRel(PubRelPacket::new(7)))
        .await
        .unwrap();
    assert_eq!(
        link.read_packet().await.unwrap(),
        Packet::PubComp(PubCompPacket::new(7))
    );

    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn inbound_qos1_publish_is_acked_and_delivered() {
    let (client, mut broker) = new_client(ConnectOptions::new("c1"));
    let (handle, count) = counting_listener(&client);
    let mut link = connect(&client, &mut broker, false).await;

    let publish = PublishPacket::new("t", Bytes::from_static(b"m"), QoS::AtLeastOnce)
        .with_packet_id(9);
    link.write_packet(&Packet::Publish(publish.clone()))
        .await
        .unwrap();
    assert_eq!(
        link.read_packet().await.unwrap(),
        Packet::PubAck(PubAckPacket::new(9))
    );
    assert_eq!(count.load(Ordering::SeqCst), 1);

    // a stopped listener no longer receives messages
    handle.stop();
    link.write_packet(&Packet::Publish(
        publish.with_packet_id(10).with_dup(false),
    ))
    .await
    .unwrap();
    assert_eq!(
        link.read_packet().await.unwrap(),
        Packet::PubAck(PubAckPacket::new(10))
    );
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn subscribe_round_trip_and_timeout() {
    let options = ConnectOptions::new("c1")
        .with_subscription_timeout(Duration::from_millis(100));
    let (client, mut broker) = new_client(options);
    let mut link = connect(&client, &mut broker, false).await;

    // the broker never answers the first SUBSCRIBE
    let subscribe_fut = client.subscribe(vec![Subscription::new("t", QoS::AtMostOnce)]);
    let broker_script = async {
        let Packet::Subscribe(subscribe) = link.read_packet().await.unwrap() else {
            panic!("expected SUBSCRIBE");
        };
        subscribe.packet_id
    };
    let (result, first_id) = tokio::join!(subscribe_fut, broker_script);
    assert_eq!(result.unwrap_err(), MqttError::Timeout);

    // a second subscribe proceeds normally
    let subscribe_fut = client.subscribe(vec![
        Subscription::new("t", QoS::AtLeastOnce),
        Subscription::new("u/#", QoS::ExactlyOnce),
    ]);
    let broker_script = async {
        let Packet::Subscribe(subscribe) = link.read_packet().await.unwrap() else {
            panic!("expected SUBSCRIBE");
        };
        assert_ne!(subscribe.packet_id, first_id);
        assert_eq!(subscribe.subscriptions.len(), 2);
        link.write_packet(&Packet::SubAck(SubAckPacket::new(
            subscribe.packet_id,
            vec![
                SubscriptionResult::Granted(QoS::AtLeastOnce),
                SubscriptionResult::Failed,
            ],
        )))
        .await
        .unwrap();
    };
    let (result, ()) = tokio::join!(subscribe_fut, broker_script);
    assert_eq!(
        result.unwrap(),
        vec![
            SubscriptionResult::Granted(QoS::AtLeastOnce),
            SubscriptionResult::Failed,
        ]
    );
}

#[tokio::test]
async fn auth_refusal_fails_connect_and_suppresses_reconnect() {
    let options = ConnectOptions::new("c1").with_reconnect(fast_retry());
    let (client, mut broker) = new_client(options);

    let connect_fut = client.connect();
    let broker_script = async {
        let mut link = broker.accept().await.unwrap();
        let _ = link.read_packet().await.unwrap();
        link.write_packet(&Packet::ConnAck(ConnAckPacket::new(
            false,
            ConnectReturnCode::NotAuthorized,
        )))
        .await
        .unwrap();
        link
    };
    let (result, _link) = tokio::join!(connect_fut, broker_script);
    assert_eq!(
        result.unwrap_err(),
        MqttError::ConnectionRefused(ConnectReturnCode::NotAuthorized)
    );

    // an auth-class refusal must not trigger the retry policy
    assert!(
        tokio::time::timeout(Duration::from_millis(300), broker.accept())
            .await
            .is_err(),
        "client reconnected after an authentication refusal"
    );
}

#[tokio::test]
async fn transport_loss_reconnects_per_policy() {
    let options = ConnectOptions::new("c1").with_reconnect(fast_retry());
    let (client, mut broker) = new_client(options);
    let link = connect(&client, &mut broker, false).await;

    link.close().await.unwrap();

    // the supervisor re-enters Connecting after the backoff
    let _link = accept_and_handshake(&mut broker, false).await;
}

#[tokio::test(start_paused = true)]
async fn keep_alive_pings_when_idle() {
    let options = ConnectOptions::new("c1").with_keep_alive(Duration::from_secs(8));
    let (client, mut broker) = new_client(options);
    let mut link = connect(&client, &mut broker, false).await;

    assert_eq!(link.read_packet().await.unwrap(), Packet::PingReq);
    link.write_packet(&Packet::PingResp).await.unwrap();

    // answered ping keeps the connection up; another follows later
    assert_eq!(link.read_packet().await.unwrap(), Packet::PingReq);
}

#[tokio::test(start_paused = true)]
async fn keep_alive_timeout_closes_transport() {
    let options = ConnectOptions::new("c1").with_keep_alive(Duration::from_secs(8));
    let (client, mut broker) = new_client(options);
    let mut link = connect(&client, &mut broker, false).await;

    assert_eq!(link.read_packet().await.unwrap(), Packet::PingReq);

    // no PINGRESP: the client closes the transport
    assert!(link.read_packet().await.is_err());
}

#[tokio::test]
async fn disconnect_sends_packet_and_closes_write_side() {
    let (client, mut broker) = new_client(ConnectOptions::new("c1"));
    let mut link = connect(&client, &mut broker, false).await;

    let (result, ()) = tokio::join!(client.disconnect(), async {
        assert_eq!(link.read_packet().await.unwrap(), Packet::Disconnect);
    });
    result.unwrap();
    assert!(link.read_packet().await.is_err());

    // disconnect is idempotent
    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn shutdown_fails_outstanding_requests() {
    let (client, _broker) = new_client(ConnectOptions::new("c1"));

    // queued while disconnected, then the client shuts down
    let publish_fut = client.publish(Message::new("a", b"x".to_vec()).with_qos(QoS::AtLeastOnce));
    let (result, ()) = tokio::join!(publish_fut, async {
        client.shutdown();
    });
    assert_eq!(result.unwrap_err(), MqttError::ClientShutdown);

    // the listener handle is a no-op after shutdown
    let handle = client.add_message_listener(|_| {});
    handle.stop();
}

#[tokio::test]
async fn publish_rejects_wildcard_topic() {
    let (client, _broker) = new_client(ConnectOptions::new("c1"));
    let result = client.publish(Message::new("a/+", b"x".to_vec())).await;
    assert!(matches!(result, Err(MqttError::InvalidTopicName(_))));
}
