//! Tests for WebSocket connection fan-out.

use taskfeed_api::ws::{ServerMessage, WsManager};

fn banner() -> ServerMessage {
    ServerMessage::PostCreated {
        post_id: 1,
        post_number: "TF-000001".into(),
        template_name: Some("Pre-OP".into()),
    }
}

#[tokio::test]
async fn organization_messages_reach_only_that_organization() {
    let manager = WsManager::new();
    let mut own = manager.add("a".into(), Some(1), Some(10)).await;
    let mut other = manager.add("b".into(), Some(2), Some(20)).await;
    let mut anonymous = manager.add("c".into(), None, None).await;

    let sent = manager.send_to_organization(1, banner().to_message()).await;

    assert_eq!(sent, 1);
    assert!(own.try_recv().is_ok());
    assert!(other.try_recv().is_err());
    assert!(anonymous.try_recv().is_err());
}

#[tokio::test]
async fn broadcast_reaches_every_connection() {
    let manager = WsManager::new();
    let mut first = manager.add("a".into(), Some(1), None).await;
    let mut second = manager.add("b".into(), None, None).await;

    let message = ServerMessage::Invalidate {
        targets: vec!["task-feed-posts".into()],
    };
    manager.broadcast(message.to_message()).await;

    assert!(first.try_recv().is_ok());
    assert!(second.try_recv().is_ok());
}

#[tokio::test]
async fn removed_connection_is_not_counted() {
    let manager = WsManager::new();
    let _rx = manager.add("a".into(), Some(1), None).await;
    assert_eq!(manager.connection_count().await, 1);

    manager.remove("a").await;
    assert_eq!(manager.connection_count().await, 0);
}
