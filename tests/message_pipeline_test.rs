mod common;

use uuid::Uuid;

use realtime_service::error::AppError;
use realtime_service::models::message::{DeliveryStatus, MessageType};
use realtime_service::websocket::events::ServerEvent;
use realtime_service::websocket::handlers::dispatch_event;
use realtime_service::websocket::message_types::ClientEvent;

#[tokio::test]
async fn join_reports_per_chat_success_and_failure() {
    let h = common::harness();
    let alice = Uuid::new_v4();
    let member_chat = Uuid::new_v4();
    let outsider_chat = Uuid::new_v4();
    h.directory.allow(alice, member_chat);

    let (conn, mut rx) = common::connect(&h.state, alice).await;
    dispatch_event(
        &h.state,
        &conn,
        ClientEvent::JoinChats {
            chat_ids: vec![member_chat, outsider_chat],
        },
    )
    .await
    .unwrap();

    let events = common::drain(&mut rx);
    let ServerEvent::ChatsJoined { joined, failed } = &events[0] else {
        panic!("expected chats_joined, got {:?}", events[0]);
    };
    assert_eq!(joined, &vec![member_chat]);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].chat_id, outsider_chat);
    assert!(h.state.topics.is_subscribed(conn.id, member_chat).await);
    assert!(!h.state.topics.is_subscribed(conn.id, outsider_chat).await);
}

// Each subscribed connection gets new_message exactly once, sender's
// connections included, and the sender additionally gets message_sent.
#[tokio::test]
async fn send_fans_out_to_every_subscribed_connection() {
    let h = common::harness();
    let chat = Uuid::new_v4();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    h.directory.allow(alice, chat);
    h.directory.allow(bob, chat);

    let (alice_conn, mut alice_rx) = common::connect(&h.state, alice).await;
    let (bob_a, mut bob_a_rx) = common::connect(&h.state, bob).await;
    let (bob_b, mut bob_b_rx) = common::connect(&h.state, bob).await;
    h.state.topics.join(&alice_conn, chat).await;
    h.state.topics.join(&bob_a, chat).await;
    h.state.topics.join(&bob_b, chat).await;

    dispatch_event(
        &h.state,
        &alice_conn,
        ClientEvent::SendMessage {
            chat_id: chat,
            message_type: MessageType::Text,
            content: "hello everyone".into(),
            meta: None,
        },
    )
    .await
    .unwrap();

    for rx in [&mut bob_a_rx, &mut bob_b_rx] {
        let events = common::drain(rx);
        assert_eq!(events.len(), 1);
        let ServerEvent::NewMessage { message } = &events[0] else {
            panic!("expected new_message, got {:?}", events[0]);
        };
        assert_eq!(message.content, "hello everyone");
        assert_eq!(message.sender_id, alice);
        assert_eq!(message.status, DeliveryStatus::Sent);
    }

    let alice_events = common::drain(&mut alice_rx);
    assert_eq!(alice_events.len(), 2);
    assert!(matches!(alice_events[0], ServerEvent::NewMessage { .. }));
    assert!(matches!(alice_events[1], ServerEvent::MessageSent { .. }));
}

#[tokio::test]
async fn send_implicitly_joins_a_member_who_never_subscribed() {
    let h = common::harness();
    let chat = Uuid::new_v4();
    let alice = Uuid::new_v4();
    h.directory.allow(alice, chat);

    let (conn, mut rx) = common::connect(&h.state, alice).await;
    let ack = h
        .state
        .messages
        .send_message(&conn, chat, MessageType::Text, "first".into(), None)
        .await
        .unwrap();
    assert!(matches!(ack, ServerEvent::MessageSent { .. }));
    assert!(h.state.topics.is_subscribed(conn.id, chat).await);

    // The implicit join happened before fan-out, so the sender's own
    // connection received the broadcast too.
    let events = common::drain(&mut rx);
    assert!(matches!(events[0], ServerEvent::NewMessage { .. }));
}

#[tokio::test]
async fn send_to_foreign_chat_fails_only_for_the_sender() {
    let h = common::harness();
    let chat = Uuid::new_v4();
    let eve = Uuid::new_v4();

    let (conn, mut rx) = common::connect(&h.state, eve).await;
    let err = h
        .state
        .messages
        .send_message(&conn, chat, MessageType::Text, "let me in".into(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));
    assert!(common::drain(&mut rx).is_empty());
}

#[tokio::test]
async fn stored_message_is_encrypted_but_broadcast_plaintext() {
    let h = common::harness();
    let chat = Uuid::new_v4();
    let alice = Uuid::new_v4();
    h.directory.allow(alice, chat);

    let (conn, mut rx) = common::connect(&h.state, alice).await;
    let ack = h
        .state
        .messages
        .send_message(&conn, chat, MessageType::Text, "top secret".into(), None)
        .await
        .unwrap();
    let ServerEvent::MessageSent { message, .. } = ack else {
        panic!("expected message_sent");
    };

    let stored = h.store.get(message.id).unwrap();
    assert!(!stored.cipher.content_encrypted.is_empty());
    assert!(!stored.cipher.iv.is_empty());
    assert!(!stored.cipher.auth_tag.is_empty());

    let events = common::drain(&mut rx);
    let ServerEvent::NewMessage { message } = &events[0] else {
        panic!("expected new_message");
    };
    assert_eq!(message.content, "top secret");
    let wire = serde_json::to_value(message).unwrap();
    assert!(wire.get("content_encrypted").is_none());
    assert!(wire.get("cipher").is_none());
}

#[tokio::test]
async fn typing_relay_excludes_the_origin_connection() {
    let h = common::harness();
    let chat = Uuid::new_v4();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    let (alice_conn, mut alice_rx) = common::connect(&h.state, alice).await;
    let (bob_conn, mut bob_rx) = common::connect(&h.state, bob).await;
    h.state.topics.join(&alice_conn, chat).await;
    h.state.topics.join(&bob_conn, chat).await;

    dispatch_event(
        &h.state,
        &alice_conn,
        ClientEvent::Typing {
            chat_id: chat,
            is_typing: true,
        },
    )
    .await
    .unwrap();

    assert!(common::drain(&mut alice_rx).is_empty());
    let events = common::drain(&mut bob_rx);
    assert!(matches!(
        events[0],
        ServerEvent::Typing { user_id, is_typing: true, .. } if user_id == alice
    ));
}
