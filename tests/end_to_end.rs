//! End-to-end tests running the supervised loops against a webhook endpoint.

use std::{collections::HashMap, time::Duration};

use chrono::Utc;
use herald::{
    config::{AppConfig, DispatcherConfig, EventsWorkerConfig},
    models::SubscriptionData,
    persistence::traits::{EntityStore, EventStore, NotificationStore},
    supervisor::Supervisor,
    test_helpers::{EventBuilder, TriggerBuilder, create_test_store},
};
use mockito::{Matcher, Mock};
use serde_json::json;

fn config(webhook_url: String) -> AppConfig {
    AppConfig {
        dispatcher: DispatcherConfig {
            poll_interval: Duration::from_millis(20),
            ..Default::default()
        },
        events_worker: EventsWorkerConfig {
            poll_interval: Duration::from_millis(20),
            ..Default::default()
        },
        senders: vec![HashMap::from([
            ("name".to_string(), "webhook".to_string()),
            ("url".to_string(), webhook_url),
        ])],
        contact_types: vec!["webhook".to_string()],
        shutdown_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

async fn wait_until_matched(mock: &Mock) {
    for _ in 0..250 {
        if mock.matched_async().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("webhook was never called");
}

#[tokio::test]
async fn test_contact_test_notification_reaches_webhook() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/hook")
        .match_body(Matcher::PartialJson(json!({
            "trigger": {"name": "Test notification"},
            "events": [{"metric": "Test.metric.value", "state": "TEST"}],
        })))
        .with_status(200)
        .create_async()
        .await;

    let store = create_test_store().await.unwrap();
    let supervisor = Supervisor::builder()
        .config(config(format!("{}/hook", server.url())))
        .store(store.clone())
        .build()
        .unwrap();
    let contacts = supervisor.contacts().clone();
    let shutdown = supervisor.shutdown_token();
    let running = tokio::spawn(supervisor.run());

    let contact = contacts.create_contact("alice", "webhook", "").await.unwrap();
    contacts.test_contact(&contact.id, Utc::now()).await.unwrap();

    wait_until_matched(&mock).await;
    shutdown.cancel();
    running.await.unwrap().unwrap();

    assert!(store.fetch_events(10).await.unwrap().is_empty());
    assert!(store.peek_due_notifications(Utc::now()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_trigger_event_is_delivered_to_subscribed_contact() {
    let mut server = mockito::Server::new_async().await;
    let store = create_test_store().await.unwrap();
    let supervisor = Supervisor::builder()
        .config(config(format!("{}/fallback", server.url())))
        .store(store.clone())
        .build()
        .unwrap();
    let contacts = supervisor.contacts().clone();

    // The contact's own URL wins over the configured one.
    let contact = contacts
        .create_contact("alice", "webhook", &format!("{}/alice", server.url()))
        .await
        .unwrap();
    let mock = server
        .mock("POST", "/alice")
        .match_body(Matcher::PartialJson(json!({
            "trigger": {"id": "t1", "tags": ["db"]},
            "contact": {"id": contact.id.clone()},
            "events": [{"metric": "db.latency", "value": 42.0}],
        })))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;
    store.save_trigger(&TriggerBuilder::new("t1").tags(&["db"]).build()).await.unwrap();
    store
        .save_subscription(&SubscriptionData {
            id: "s1".to_string(),
            user: "alice".to_string(),
            enabled: true,
            tags: vec!["db".to_string()],
            contacts: vec![contact.id.clone()],
        })
        .await
        .unwrap();

    let shutdown = supervisor.shutdown_token();
    let running = tokio::spawn(supervisor.run());
    store
        .push_event(&EventBuilder::new("t1").metric("db.latency").value(42.0).build())
        .await
        .unwrap();

    wait_until_matched(&mock).await;
    shutdown.cancel();
    running.await.unwrap().unwrap();
    mock.assert_async().await;
}
