// Relay scenarios driven through in-memory outbound queues, plus one
// loopback run over real WebSockets.

use crate::connection::{ConnectionId, ConnectionState, OutboundMessage};
use crate::*;
use presence_core::{EventName, ParticipantId, PresenceError, ProtocolEvent, Vec3};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};

struct Peer {
    id: ConnectionId,
    rx: UnboundedReceiver<OutboundMessage>,
}

impl Peer {
    fn connect(coordinator: &RelayCoordinator) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let addr = "127.0.0.1:50000".parse().expect("valid address");
        let id = coordinator.on_connect(addr, tx);
        Self { id, rx }
    }

    /// Everything queued for this peer so far, decoded.
    fn received(&mut self) -> Vec<ProtocolEvent> {
        let mut events = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            match message {
                OutboundMessage::Text(text) => {
                    events.push(ProtocolEvent::decode(&text).expect("server sends valid frames"))
                }
                OutboundMessage::Close(reason) => panic!("unexpected close: {reason}"),
            }
        }
        events
    }
}

fn coordinator() -> Arc<RelayCoordinator> {
    Arc::new(RelayCoordinator::new(&ServerConfig::default()))
}

fn join_text(id: &str, x: f64, y: f64, z: f64) -> String {
    format!(
        r#"{{"event":"character-join","data":{{"id":"{id}","username":"{id}-name","position":{{"x":{x},"y":{y},"z":{z}}},"rotation":{{"x":0,"y":0,"z":0}}}}}}"#
    )
}

fn position_text(id: &str, x: f64) -> String {
    format!(
        r#"{{"event":"character-position","data":{{"id":"{id}","position":{{"x":{x},"y":0,"z":0}}}}}}"#
    )
}

fn ping_text(id: &str) -> String {
    format!(r#"{{"event":"character-ping","data":{{"id":"{id}"}}}}"#)
}

fn pid(id: &str) -> ParticipantId {
    ParticipantId::from(id)
}

#[tokio::test]
async fn test_duplicate_join_keeps_original_record() {
    let relay = coordinator();
    let mut first = Peer::connect(&relay);
    let mut second = Peer::connect(&relay);

    relay
        .handle_message(first.id, &join_text("a", 0.0, 0.0, 0.0))
        .await
        .expect("first join accepted");
    second.received();

    let result = relay
        .handle_message(second.id, &join_text("a", 1.0, 1.0, 1.0))
        .await;
    assert_eq!(result, Err(PresenceError::DuplicateParticipant(pid("a"))));

    let registry = relay.registry();
    let registry = registry.lock().await;
    assert_eq!(registry.len(), 1);
    assert_eq!(
        registry.get(&pid("a")).map(|r| r.position),
        Some(Vec3::zero())
    );
    drop(registry);

    assert!(first.received().is_empty());
    assert_eq!(
        relay.connections().state(second.id),
        Some(ConnectionState::Connected)
    );
}

#[tokio::test]
async fn test_join_is_broadcast_and_roster_introduced() {
    let relay = coordinator();
    let mut a = Peer::connect(&relay);
    let mut b = Peer::connect(&relay);

    let dispatch = relay
        .handle_message(a.id, &join_text("a", 0.0, 0.0, 0.0))
        .await
        .expect("join a");
    assert_eq!(
        dispatch,
        Dispatch::Joined {
            id: pid("a"),
            recipients: 1,
            introduced: Some(0),
            replaced: None,
        }
    );
    // b is connected but unidentified; it still sees the join.
    assert_eq!(b.received().len(), 1);

    relay
        .handle_message(b.id, &join_text("b", 5.0, 0.0, 0.0))
        .await
        .expect("join b");

    let to_a = a.received();
    assert_eq!(to_a.len(), 1);
    assert!(matches!(&to_a[0], ProtocolEvent::Join(j) if j.id == pid("b")));

    let to_b = b.received();
    assert_eq!(to_b.len(), 1);
    assert!(matches!(&to_b[0], ProtocolEvent::Join(j) if j.id == pid("a") && j.username == "a-name"));
}

#[tokio::test]
async fn test_position_reaches_only_other_connections() {
    let relay = coordinator();
    let mut a = Peer::connect(&relay);
    let mut b = Peer::connect(&relay);
    relay.handle_message(a.id, &join_text("a", 0.0, 0.0, 0.0)).await.expect("join a");
    relay.handle_message(b.id, &join_text("b", 0.0, 0.0, 0.0)).await.expect("join b");
    a.received();
    b.received();

    let dispatch = relay
        .handle_message(a.id, &position_text("a", 2.0))
        .await
        .expect("position accepted");
    assert_eq!(
        dispatch,
        Dispatch::Relayed {
            event: EventName::Position,
            id: pid("a"),
            recipients: 1,
        }
    );

    assert!(a.received().is_empty());
    let to_b = b.received();
    assert_eq!(to_b.len(), 1);
    match &to_b[0] {
        ProtocolEvent::Position(update) => {
            assert_eq!(update.id, pid("a"));
            assert_eq!(update.position, Vec3::new(2.0, 0.0, 0.0));
        }
        other => panic!("expected position, got {other:?}"),
    }
}

#[tokio::test]
async fn test_update_for_absent_participant_is_dropped() {
    let relay = coordinator();
    let a = Peer::connect(&relay);
    let mut b = Peer::connect(&relay);

    let result = relay.handle_message(a.id, &position_text("ghost", 1.0)).await;
    assert_eq!(result, Err(PresenceError::UnknownParticipant(pid("ghost"))));

    let rotation = r#"{"event":"character-rotation","data":{"id":"ghost","rotation":{"x":0,"y":1,"z":0}}}"#;
    assert_eq!(
        relay.handle_message(a.id, rotation).await,
        Err(PresenceError::UnknownParticipant(pid("ghost")))
    );
    assert!(b.received().is_empty());
    assert_eq!(relay.participant_count().await, 0);
}

#[tokio::test]
async fn test_ping_is_recorded_but_never_broadcast() {
    let relay = coordinator();
    let a = Peer::connect(&relay);
    let mut b = Peer::connect(&relay);
    relay.handle_message(a.id, &join_text("a", 0.0, 0.0, 0.0)).await.expect("join a");
    b.received();

    assert_eq!(
        relay.handle_message(a.id, &ping_text("a")).await,
        Ok(Dispatch::Pinged(pid("a")))
    );
    assert!(b.received().is_empty());

    assert_eq!(
        relay.handle_message(a.id, &ping_text("nobody")).await,
        Err(PresenceError::UnknownParticipant(pid("nobody")))
    );
}

#[tokio::test]
async fn test_malformed_and_forbidden_frames_are_rejected() {
    let relay = coordinator();
    let a = Peer::connect(&relay);
    let mut b = Peer::connect(&relay);

    for frame in [
        "not json",
        r#"{"event":"character-teleport","data":{"id":"a"}}"#,
        r#"{"event":"character-position","data":{"id":"a"}}"#,
        r#"{"event":"character-part","data":{"id":"a"}}"#,
    ] {
        let result = relay.handle_message(a.id, frame).await;
        assert!(
            matches!(result, Err(PresenceError::InvalidPayload(_))),
            "{frame} should be rejected, got {result:?}"
        );
    }

    let oversized = join_text(&"x".repeat(20 * 1024), 0.0, 0.0, 0.0);
    assert!(matches!(
        relay.handle_message(a.id, &oversized).await,
        Err(PresenceError::InvalidPayload(_))
    ));

    assert!(b.received().is_empty());
    assert_eq!(relay.participant_count().await, 0);
}

#[tokio::test]
async fn test_explicit_introduce_excludes_requester() {
    let relay = coordinator();
    let mut a = Peer::connect(&relay);
    let b = Peer::connect(&relay);
    relay.handle_message(a.id, &join_text("a", 0.0, 0.0, 0.0)).await.expect("join a");
    relay.handle_message(b.id, &join_text("b", 0.0, 0.0, 0.0)).await.expect("join b");
    a.received();

    let dispatch = relay
        .handle_message(a.id, r#"{"event":"introduce"}"#)
        .await
        .expect("introduce");
    assert_eq!(dispatch, Dispatch::Introduced { sent: 1 });

    let roster = a.received();
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0].participant_id(), Some(&pid("b")));
}

#[tokio::test(start_paused = true)]
async fn test_join_introduce_is_throttled_per_connection() {
    let relay = coordinator();
    let a = Peer::connect(&relay);
    let other = Peer::connect(&relay);
    relay.handle_message(other.id, &join_text("o", 0.0, 0.0, 0.0)).await.expect("join o");

    let first = relay.handle_message(a.id, &join_text("a1", 0.0, 0.0, 0.0)).await;
    assert!(matches!(first, Ok(Dispatch::Joined { introduced: Some(1), .. })));

    tokio::time::advance(Duration::from_millis(400)).await;
    let second = relay.handle_message(a.id, &join_text("a2", 0.0, 0.0, 0.0)).await;
    assert!(matches!(
        second,
        Ok(Dispatch::Joined { introduced: None, ref replaced, .. }) if *replaced == Some(pid("a1"))
    ));

    tokio::time::advance(Duration::from_millis(600)).await;
    let third = relay.handle_message(a.id, &join_text("a3", 0.0, 0.0, 0.0)).await;
    assert!(matches!(third, Ok(Dispatch::Joined { introduced: Some(1), .. })));
}

#[tokio::test]
async fn test_rejoin_with_new_id_parts_previous_identity() {
    let relay = coordinator();
    let a = Peer::connect(&relay);
    let mut b = Peer::connect(&relay);
    relay.handle_message(a.id, &join_text("old", 0.0, 0.0, 0.0)).await.expect("join old");
    b.received();

    relay.handle_message(a.id, &join_text("new", 0.0, 0.0, 0.0)).await.expect("join new");

    let to_b = b.received();
    assert_eq!(to_b, vec![
        ProtocolEvent::part(pid("old")),
        ProtocolEvent::Join(presence_core::JoinPayload {
            id: pid("new"),
            username: "new-name".to_string(),
            position: Vec3::zero(),
            rotation: presence_core::Rotation::euler(0.0, 0.0, 0.0),
        }),
    ]);
    assert_eq!(relay.connections().participant_of(a.id), Some(pid("new")));
    assert_eq!(relay.participant_count().await, 1);
}

#[tokio::test]
async fn test_disconnect_before_join_changes_nothing() {
    let relay = coordinator();
    let a = Peer::connect(&relay);
    let mut b = Peer::connect(&relay);

    assert_eq!(relay.on_disconnect(a.id).await, None);
    assert!(b.received().is_empty());
    assert_eq!(relay.participant_count().await, 0);
    assert_eq!(relay.connections().connection_count(), 1);
}

#[tokio::test]
async fn test_disconnect_parts_and_notifies_remaining() {
    let relay = coordinator();
    let a = Peer::connect(&relay);
    let mut b = Peer::connect(&relay);
    let mut c = Peer::connect(&relay);
    relay.handle_message(a.id, &join_text("a", 0.0, 0.0, 0.0)).await.expect("join a");
    b.received();
    c.received();

    assert_eq!(relay.on_disconnect(a.id).await, Some(pid("a")));
    assert_eq!(b.received(), vec![ProtocolEvent::part(pid("a"))]);
    assert_eq!(c.received(), vec![ProtocolEvent::part(pid("a"))]);
    assert_eq!(relay.participant_count().await, 0);

    // A second teardown of the same connection is a no-op.
    assert_eq!(relay.on_disconnect(a.id).await, None);
}

#[tokio::test(start_paused = true)]
async fn test_liveness_eviction_is_broadcast_once() {
    let relay = coordinator();
    let monitor = relay.liveness_monitor(LivenessConfig::default());
    let mut a = Peer::connect(&relay);
    let mut b = Peer::connect(&relay);
    let mut c = Peer::connect(&relay);
    relay.handle_message(a.id, &join_text("a", 0.0, 0.0, 0.0)).await.expect("join a");
    relay.handle_message(b.id, &join_text("b", 0.0, 0.0, 0.0)).await.expect("join b");
    a.received();
    b.received();
    c.received();

    tokio::time::advance(Duration::from_secs(20)).await;
    relay.handle_message(b.id, &ping_text("b")).await.expect("ping b");
    tokio::time::advance(Duration::from_secs(15)).await;

    let expired = monitor.sweep().await;
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].id, pid("a"));

    // Every connection hears it, including the one that owned "a".
    assert_eq!(a.received(), vec![ProtocolEvent::part(pid("a"))]);
    assert_eq!(b.received(), vec![ProtocolEvent::part(pid("a"))]);
    assert_eq!(c.received(), vec![ProtocolEvent::part(pid("a"))]);
    assert_eq!(
        relay.connections().state(a.id),
        Some(ConnectionState::Connected)
    );

    // The evicted participant's connection closing later announces nothing.
    assert_eq!(relay.on_disconnect(a.id).await, None);
    assert!(b.received().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_evicted_connection_can_join_again() {
    let relay = coordinator();
    let monitor = relay.liveness_monitor(LivenessConfig::default());
    let mut a = Peer::connect(&relay);
    let mut b = Peer::connect(&relay);
    relay.handle_message(a.id, &join_text("a", 0.0, 0.0, 0.0)).await.expect("join a");
    relay.handle_message(b.id, &join_text("b", 0.0, 0.0, 0.0)).await.expect("join b");

    tokio::time::advance(Duration::from_secs(20)).await;
    relay.handle_message(b.id, &ping_text("b")).await.expect("ping b");
    tokio::time::advance(Duration::from_secs(15)).await;
    monitor.sweep().await;
    a.received();
    b.received();

    assert_eq!(
        relay.handle_message(a.id, &position_text("a", 4.0)).await,
        Err(PresenceError::UnknownParticipant(pid("a")))
    );
    assert!(b.received().is_empty());

    let dispatch = relay
        .handle_message(a.id, &join_text("a", 4.0, 0.0, 0.0))
        .await
        .expect("rejoin after eviction");
    assert!(matches!(
        dispatch,
        Dispatch::Joined { ref id, recipients: 1, introduced: Some(1), replaced: None } if *id == pid("a")
    ));
    assert!(matches!(
        b.received().as_slice(),
        [ProtocolEvent::Join(join)] if join.id == pid("a") && join.position == Vec3::new(4.0, 0.0, 0.0)
    ));
    assert!(matches!(
        a.received().as_slice(),
        [ProtocolEvent::Join(join)] if join.id == pid("b")
    ));

    relay
        .handle_message(a.id, &position_text("a", 5.0))
        .await
        .expect("updates flow again");
    assert_eq!(b.received().len(), 1);
}

#[tokio::test]
async fn test_close_all_requests_close_frames() {
    let relay = coordinator();
    let mut a = Peer::connect(&relay);
    let mut b = Peer::connect(&relay);

    assert_eq!(relay.close_all("bye"), 2);
    assert_eq!(a.rx.try_recv(), Ok(OutboundMessage::Close("bye".into())));
    assert_eq!(b.rx.try_recv(), Ok(OutboundMessage::Close("bye".into())));
}

mod loopback {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use tokio::net::TcpStream;
    use tokio::time::timeout;
    use tokio_tungstenite::{
        connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
    };

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn next_event(client: &mut Client) -> ProtocolEvent {
        loop {
            let frame = timeout(Duration::from_secs(5), client.next())
                .await
                .expect("frame within timeout")
                .expect("stream open")
                .expect("frame ok");
            if let Message::Text(text) = frame {
                return ProtocolEvent::decode(text.as_str()).expect("valid event");
            }
        }
    }

    async fn wait_for_participants(server: &RelayServer, count: usize) {
        timeout(Duration::from_secs(5), async {
            while server.coordinator().participant_count().await != count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("participants registered");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_two_clients_over_websockets() {
        let config = ServerConfig {
            bind_address: "127.0.0.1:0".parse().expect("valid address"),
            ..Default::default()
        };
        let server = Arc::new(create_server_with_config(config));
        let listener = server.bind().await.expect("bind loopback");
        let addr = listener.local_addr().expect("local addr");
        let shutdown = ShutdownState::new();

        let serving = {
            let server = server.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { server.serve(listener, shutdown).await })
        };

        let url = format!("ws://{addr}");
        let (mut a, _) = connect_async(url.as_str()).await.expect("client a connects");
        let (mut b, _) = connect_async(url.as_str()).await.expect("client b connects");

        a.send(Message::text(join_text("a", 0.0, 0.0, 0.0)))
            .await
            .expect("send join a");
        wait_for_participants(&server, 1).await;

        b.send(Message::text(join_text("b", 1.0, 0.0, 0.0)))
            .await
            .expect("send join b");

        // b's join is broadcast to a; a is introduced to b.
        assert_eq!(next_event(&mut a).await.participant_id(), Some(&pid("b")));
        assert_eq!(next_event(&mut b).await.participant_id(), Some(&pid("a")));

        a.send(Message::text(position_text("a", 3.0)))
            .await
            .expect("send position");
        match next_event(&mut b).await {
            ProtocolEvent::Position(update) => {
                assert_eq!(update.position, Vec3::new(3.0, 0.0, 0.0))
            }
            other => panic!("expected position, got {other:?}"),
        }

        drop(a);
        assert_eq!(next_event(&mut b).await, ProtocolEvent::part(pid("a")));

        server.shutdown(&shutdown).await.expect("connections close in time");
        assert!(shutdown.is_shutdown_complete());
        timeout(Duration::from_secs(5), serving)
            .await
            .expect("server stops")
            .expect("server task joins")
            .expect("server exits cleanly");
    }
}
