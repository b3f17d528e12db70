//! Event Bus Integration Tests
//!
//! Tests for delivery order, late subscribers, handler failure isolation
//! and stopping the listen loop.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Map, Value};
use skyras::core::{ChannelMap, EventBus, MemoryBackend, StateStore};
use skyras::domain::{categories, Event};
use tokio::task::JoinHandle;

type Seen = Arc<Mutex<Vec<String>>>;

fn payload(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn start_bus(store: StateStore) -> (Arc<EventBus>, JoinHandle<()>) {
    let bus = Arc::new(EventBus::new(store).with_poll_interval(Duration::from_millis(20)));
    let listener = tokio::spawn({
        let bus = bus.clone();
        async move {
            bus.listen().await.unwrap();
        }
    });
    (bus, listener)
}

fn recorder(seen: &Seen, label: &'static str) -> impl Fn(Event) -> std::future::Ready<anyhow::Result<()>> + Send + Sync + 'static {
    let seen = seen.clone();
    move |event: Event| {
        let id = event
            .payload
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or("?")
            .to_string();
        seen.lock().unwrap().push(format!("{}:{}", label, id));
        std::future::ready(Ok(()))
    }
}

/// Poll until `seen` holds `count` entries or give up after a second
async fn wait_for(seen: &Seen, count: usize) {
    for _ in 0..100 {
        if seen.lock().unwrap().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn memory_store() -> StateStore {
    StateStore::new(Arc::new(MemoryBackend::new()), "test")
}

#[tokio::test]
async fn test_events_delivered_in_publish_order() {
    let (bus, listener) = start_bus(memory_store());
    let seen: Seen = Arc::default();
    let tasks = bus.channels().tasks.clone();
    bus.subscribe(&tasks, recorder(&seen, "h")).await.unwrap();

    for id in ["e1", "e2", "e3"] {
        let event = bus.create_event(categories::TASK_CREATED, "letitia", payload(json!({"id": id})));
        assert_eq!(bus.publish(&event).await.unwrap(), 1);
    }

    wait_for(&seen, 3).await;
    assert_eq!(*seen.lock().unwrap(), vec!["h:e1", "h:e2", "h:e3"]);

    bus.shutdown();
    listener.await.unwrap();
}

#[tokio::test]
async fn test_handlers_run_in_registration_order() {
    let (bus, listener) = start_bus(memory_store());
    let seen: Seen = Arc::default();
    let system = bus.channels().system.clone();
    bus.subscribe(&system, recorder(&seen, "first")).await.unwrap();
    bus.subscribe(&system, recorder(&seen, "second")).await.unwrap();

    let event = bus.create_event(categories::HEALTH_CHECK, "marcus", payload(json!({"id": "e1"})));
    // two handlers on one channel still count as one subscriber
    assert_eq!(bus.publish(&event).await.unwrap(), 1);

    wait_for(&seen, 2).await;
    assert_eq!(*seen.lock().unwrap(), vec!["first:e1", "second:e1"]);

    bus.shutdown();
    listener.await.unwrap();
}

#[tokio::test]
async fn test_no_delivery_before_subscribe() {
    let (bus, listener) = start_bus(memory_store());
    let seen: Seen = Arc::default();

    let early = bus.create_event(categories::FILE_UPLOADED, "cai", payload(json!({"id": "early"})));
    assert_eq!(bus.publish(&early).await.unwrap(), 0);

    let files = bus.channels().files.clone();
    bus.subscribe(&files, recorder(&seen, "h")).await.unwrap();

    let late = bus.create_event(categories::FILE_UPLOADED, "cai", payload(json!({"id": "late"})));
    bus.publish(&late).await.unwrap();

    wait_for(&seen, 1).await;
    // give a replayed message a chance to show up
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(*seen.lock().unwrap(), vec!["h:late"]);

    bus.shutdown();
    listener.await.unwrap();
}

#[tokio::test]
async fn test_events_routed_to_category_channel() {
    let (bus, listener) = start_bus(memory_store());
    let tasks_seen: Seen = Arc::default();
    let system_seen: Seen = Arc::default();
    let channels = bus.channels().clone();
    bus.subscribe(&channels.tasks, recorder(&tasks_seen, "tasks"))
        .await
        .unwrap();
    bus.subscribe(&channels.system, recorder(&system_seen, "system"))
        .await
        .unwrap();

    let task = bus.create_event(categories::TASK_COMPLETED, "letitia", payload(json!({"id": "t"})));
    let episode = bus.create_event(categories::EPISODE_CREATED, "marcus", payload(json!({"id": "ep"})));
    bus.publish(&task).await.unwrap();
    bus.publish(&episode).await.unwrap();

    wait_for(&tasks_seen, 1).await;
    wait_for(&system_seen, 1).await;
    assert_eq!(*tasks_seen.lock().unwrap(), vec!["tasks:t"]);
    assert_eq!(*system_seen.lock().unwrap(), vec!["system:ep"]);

    bus.shutdown();
    listener.await.unwrap();
}

#[tokio::test]
#[allow(unreachable_code)]
async fn test_failing_handler_does_not_stop_others() {
    let (bus, listener) = start_bus(memory_store());
    let seen: Seen = Arc::default();
    let system = bus.channels().system.clone();

    bus.subscribe(&system, |_event: Event| async {
        Err::<(), anyhow::Error>(anyhow::anyhow!("handler blew up"))
    })
    .await
    .unwrap();
    bus.subscribe(&system, |_event: Event| async {
        panic!("handler panicked");
        Ok::<(), anyhow::Error>(())
    })
    .await
    .unwrap();
    bus.subscribe(&system, recorder(&seen, "survivor")).await.unwrap();

    for id in ["e1", "e2"] {
        let event = bus.create_event(categories::HEALTH_CHECK, "marcus", payload(json!({"id": id})));
        bus.publish(&event).await.unwrap();
    }

    wait_for(&seen, 2).await;
    assert_eq!(*seen.lock().unwrap(), vec!["survivor:e1", "survivor:e2"]);

    bus.shutdown();
    listener.await.unwrap();
}

#[tokio::test]
async fn test_undecodable_message_is_skipped() {
    let store = memory_store();
    let (bus, listener) = start_bus(store.clone());
    let seen: Seen = Arc::default();
    let system = bus.channels().system.clone();
    bus.subscribe(&system, recorder(&seen, "h")).await.unwrap();

    store.publish(&system, "not an event").await.unwrap();
    let event = bus.create_event(categories::HEALTH_CHECK, "marcus", payload(json!({"id": "ok"})));
    bus.publish(&event).await.unwrap();

    wait_for(&seen, 1).await;
    assert_eq!(*seen.lock().unwrap(), vec!["h:ok"]);

    bus.shutdown();
    listener.await.unwrap();
}

#[tokio::test]
async fn test_custom_channel_names() {
    let channels = ChannelMap {
        tasks: "studio:tasks".to_string(),
        files: "studio:files".to_string(),
        system: "studio:system".to_string(),
    };
    let bus = EventBus::with_channels(memory_store(), channels);

    let event = bus.create_event(categories::TASK_CREATED, "letitia", Map::new());
    assert_eq!(bus.channels().for_category(&event.category), "studio:tasks");
}

#[tokio::test]
async fn test_shutdown_stops_idle_listener() {
    let (bus, listener) = start_bus(memory_store());

    tokio::time::sleep(Duration::from_millis(50)).await;
    bus.shutdown();

    tokio::time::timeout(Duration::from_secs(1), listener)
        .await
        .expect("listener did not stop")
        .unwrap();
}
