//! Eventing integration tests
//!
//! Producer and consumer contexts are modelled as separate component sets
//! sharing nothing but a store.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use desk_events::{
    ActionDispatcher, ActionKind, Command, CommandKind, CommandQueue, EventSystem, EventingConfig,
    NewCommand, SystemBus,
};
use desk_store::{FileStore, MemoryStore, PersistentStore, SharedStore};
use serde_json::{json, Value};

// ============================================================================
// Helpers
// ============================================================================

fn fast_config() -> EventingConfig {
    EventingConfig {
        poll_interval_ms: 10,
        ..Default::default()
    }
}

fn recorder(queue: &CommandQueue) -> Arc<Mutex<Vec<Command>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    queue.on_any(move |c| sink.lock().unwrap().push(c.clone()));
    seen
}

async fn wait_for(seen: &Arc<Mutex<Vec<Command>>>, count: usize) {
    for _ in 0..200 {
        if seen.lock().unwrap().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ============================================================================
// Cross-context command delivery
// ============================================================================

#[tokio::test]
async fn test_polling_delivers_in_enqueue_order() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let producer = CommandQueue::new(store.clone(), &fast_config());
    let consumer = CommandQueue::new(store.clone(), &fast_config());
    let seen = recorder(&consumer);
    consumer.start_default_polling().unwrap();

    let mut expected = Vec::new();
    for round in 0..5 {
        for kind in [CommandKind::Toast, CommandKind::WriteStorage, CommandKind::Crash] {
            let cmd = producer
                .enqueue(NewCommand::new(kind, "console").with_payload(json!({ "round": round })))
                .unwrap();
            expected.push(cmd.id);
        }
        tokio::time::sleep(Duration::from_millis(3)).await;
    }

    wait_for(&seen, expected.len()).await;
    consumer.stop_polling();

    let ids: Vec<u64> = seen.lock().unwrap().iter().map(|c| c.id).collect();
    assert_eq!(ids, expected, "no duplicates, omissions or reordering");
    assert!(producer.is_empty().unwrap());
}

#[tokio::test]
async fn test_reboot_from_console_within_one_tick() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let console = EventSystem::new(store.clone(), EventingConfig::default());
    let desktop = EventSystem::new(store.clone(), EventingConfig::default());
    let seen = recorder(desktop.queue());
    desktop.queue().start_polling(Duration::from_millis(250)).unwrap();

    console
        .queue()
        .enqueue(NewCommand::new(CommandKind::Reboot, "console"))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let received = seen.lock().unwrap().clone();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].kind, CommandKind::Reboot);
    assert_eq!(received[0].source, "console");
    assert!(desktop.queue().dequeue().unwrap().is_none());
    desktop.queue().stop_polling();
}

#[test]
fn test_two_producers_one_drain() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let tab_a = CommandQueue::new(store.clone(), &EventingConfig::default());
    let tab_b = CommandQueue::new(store.clone(), &EventingConfig::default());
    let consumer = CommandQueue::new(store.clone(), &EventingConfig::default());

    for i in 0..4 {
        let queue = if i % 2 == 0 { &tab_a } else { &tab_b };
        queue.enqueue(NewCommand::new(CommandKind::Toast, format!("tab{}", i % 2))).unwrap();
    }
    assert_eq!(consumer.len().unwrap(), 4);

    let seen = recorder(&consumer);
    assert_eq!(consumer.drain(), 4);
    let drained = seen.lock().unwrap();
    for pair in drained.windows(2) {
        assert!(pair[0].id < pair[1].id);
        assert!(pair[0].enqueued_at <= pair[1].enqueued_at);
    }
}

#[test]
fn test_producer_threads_keep_ids_unique() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let queue = CommandQueue::new(store.clone(), &EventingConfig::default());
            std::thread::spawn(move || {
                for _ in 0..25 {
                    queue.enqueue(NewCommand::new(CommandKind::Toast, format!("t{}", t))).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let consumer = CommandQueue::new(store, &EventingConfig::default());
    let ids: Vec<u64> = consumer.pending().unwrap().iter().map(|c| c.id).collect();
    assert_eq!(ids, (0..100).collect::<Vec<u64>>());
}

#[test]
fn test_dequeue_on_empty_queue_writes_nothing() {
    let store = Arc::new(MemoryStore::new());
    let queue = CommandQueue::new(store.clone(), &EventingConfig::default());
    queue.enqueue(NewCommand::new(CommandKind::Shutdown, "console")).unwrap();
    queue.drain();

    let writes = store.write_count();
    for _ in 0..3 {
        assert!(queue.dequeue().unwrap().is_none());
    }
    assert_eq!(store.write_count(), writes);
}

#[tokio::test]
async fn test_corrupt_queue_does_not_stop_polling() {
    let store = Arc::new(MemoryStore::new());
    let system = EventSystem::new(store.clone(), fast_config());
    let seen = recorder(system.queue());
    system.queue().start_default_polling().unwrap();

    store.set("desk.command_queue", "<<garbage>>").unwrap();
    tokio::time::sleep(Duration::from_millis(40)).await;
    system
        .queue()
        .enqueue(NewCommand::new(CommandKind::Recovery, "console"))
        .unwrap();
    wait_for(&seen, 1).await;
    system.queue().stop_polling();

    assert_eq!(seen.lock().unwrap()[0].kind, CommandKind::Recovery);
    let errors = system.dispatcher().by_kind(ActionKind::Error);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].action, "command_queue_corrupt");
}

#[test]
fn test_legacy_array_is_migrated_and_drained() {
    let store = Arc::new(MemoryStore::new());
    store
        .set(
            "desk.command_queue",
            r#"[{"id":10,"type":"LOCKDOWN","payload":null,"source":"console","enqueuedAt":1},
                {"id":11,"type":"TOAST","payload":{"text":"hi"},"source":"console","enqueuedAt":2}]"#,
        )
        .unwrap();
    let queue = CommandQueue::new(store.clone(), &EventingConfig::default());

    let next = queue.enqueue(NewCommand::new(CommandKind::Wipe, "console")).unwrap();
    assert_eq!(next.id, 12);

    let seen = recorder(&queue);
    assert_eq!(queue.drain(), 3);
    let kinds: Vec<CommandKind> = seen.lock().unwrap().iter().map(|c| c.kind).collect();
    assert_eq!(kinds, vec![CommandKind::Lockdown, CommandKind::Toast, CommandKind::Wipe]);

    let raw: Value = serde_json::from_str(&store.get("desk.command_queue").unwrap().unwrap()).unwrap();
    assert_eq!(raw["version"], 1);
}

#[tokio::test]
async fn test_dropping_last_handle_stops_poller() {
    let store = Arc::new(MemoryStore::new());
    let queue = CommandQueue::new(store.clone(), &fast_config());
    queue.start_default_polling().unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(queue);

    let producer = CommandQueue::new(store.clone(), &fast_config());
    producer.enqueue(NewCommand::new(CommandKind::Toast, "console")).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(producer.len().unwrap(), 1, "nothing drains after teardown");
}

// ============================================================================
// Action log
// ============================================================================

#[test]
fn test_ring_eviction_keeps_last_entries() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let config = EventingConfig {
        action_capacity: 5,
        ..Default::default()
    };
    let dispatcher = ActionDispatcher::new(store.clone(), &config);
    for i in 0..12 {
        dispatcher.app(format!("launch{}", i), Value::Null);
    }

    let ids: Vec<u64> = dispatcher.actions().iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![7, 8, 9, 10, 11]);

    let reloaded = ActionDispatcher::new(store, &config);
    assert_eq!(reloaded.load_from_storage(), 5);
    assert_eq!(reloaded.actions()[0].action, "launch7");
}

#[test]
fn test_persistence_toggle_controls_stored_log() {
    let store = Arc::new(MemoryStore::new());
    let dispatcher = ActionDispatcher::new(store.clone(), &EventingConfig::default());
    dispatcher.system("boot_complete", Value::Null);
    let snapshot = store.get("desk.actions").unwrap();

    dispatcher.set_persistence(false);
    dispatcher.user("click", Value::Null);
    assert_eq!(store.get("desk.actions").unwrap(), snapshot);

    dispatcher.set_persistence(true);
    dispatcher.user("click", Value::Null);
    assert_ne!(store.get("desk.actions").unwrap(), snapshot);
}

#[test]
fn test_corrupt_log_loads_as_empty() {
    let store = Arc::new(MemoryStore::new());
    store.set("desk.actions", "[{\"id\":1,").unwrap();
    let dispatcher = ActionDispatcher::new(store.clone(), &EventingConfig::default());

    assert_eq!(dispatcher.load_from_storage(), 0);
    assert!(dispatcher.is_empty());
    let next = dispatcher.system("boot_complete", Value::Null);
    assert_eq!(next.id, 0);
}

#[test]
fn test_quota_failure_keeps_ring() {
    let store = Arc::new(MemoryStore::with_quota(256));
    let dispatcher = ActionDispatcher::new(store.clone(), &EventingConfig::default());
    let faults = Arc::new(Mutex::new(Vec::new()));
    {
        let faults = Arc::clone(&faults);
        dispatcher.on_fault(move |err| faults.lock().unwrap().push(err.to_string()));
    }

    for i in 0..20 {
        dispatcher.file(format!("save{}", i), json!({ "path": "/home/guest/document.txt" }));
    }

    assert_eq!(dispatcher.len(), 20);
    assert!(!dispatcher.is_persistent());
    assert_eq!(faults.lock().unwrap().len(), 1);

    store.set_quota(None);
    dispatcher.set_persistence(true);
    let saved = dispatcher.file("save_after_cleanup", Value::Null);
    assert!(saved.persisted);
}

#[test]
fn test_unsubscribe_inside_fanout() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let dispatcher = ActionDispatcher::new(store, &EventingConfig::default());
    let log = Arc::new(Mutex::new(Vec::new()));

    let pending: Arc<Mutex<Option<desk_events::Subscription>>> = Arc::new(Mutex::new(None));
    {
        let pending = Arc::clone(&pending);
        let log = Arc::clone(&log);
        dispatcher.subscribe(move |a| {
            log.lock().unwrap().push(format!("first:{}", a.id));
            if let Some(sub) = pending.lock().unwrap().take() {
                assert!(sub.unsubscribe());
            }
        });
    }
    {
        let log = Arc::clone(&log);
        let sub = dispatcher.subscribe(move |a| log.lock().unwrap().push(format!("second:{}", a.id)));
        *pending.lock().unwrap() = Some(sub);
    }
    {
        let log = Arc::clone(&log);
        dispatcher.subscribe(move |a| log.lock().unwrap().push(format!("third:{}", a.id)));
    }

    dispatcher.user("click", Value::Null);
    dispatcher.user("click", Value::Null);
    assert_eq!(
        *log.lock().unwrap(),
        vec!["first:0", "second:0", "third:0", "first:1", "third:1"]
    );
}

// ============================================================================
// System bus
// ============================================================================

#[test]
fn test_theme_change_reaches_only_existing_subscribers() {
    let bus = SystemBus::new();
    let any = Arc::new(Mutex::new(Vec::new()));
    {
        let any = Arc::clone(&any);
        bus.on_any(move |e| any.lock().unwrap().push(e.kind.clone()));
    }

    bus.emit("theme:change", json!({ "theme": "dark" }));

    let late = Arc::new(Mutex::new(0));
    {
        let late = Arc::clone(&late);
        bus.on("theme:change", move |_| *late.lock().unwrap() += 1);
    }
    assert_eq!(*any.lock().unwrap(), vec!["theme:change"]);
    assert_eq!(*late.lock().unwrap(), 0);
}

#[test]
fn test_panics_are_isolated_in_every_tier() {
    let system = EventSystem::new(Arc::new(MemoryStore::new()), EventingConfig::default());
    let survivors = Arc::new(Mutex::new(Vec::new()));

    system.dispatcher().subscribe(|_| panic!("dispatcher listener"));
    system.queue().on_any(|_| panic!("queue listener"));
    system.bus().on_any(|_| panic!("bus listener"));
    {
        let s = Arc::clone(&survivors);
        system.dispatcher().subscribe(move |_| s.lock().unwrap().push("dispatcher"));
    }
    {
        let s = Arc::clone(&survivors);
        system.queue().on_any(move |_| s.lock().unwrap().push("queue"));
    }
    {
        let s = Arc::clone(&survivors);
        system.bus().on_any(move |_| s.lock().unwrap().push("bus"));
    }

    system.dispatcher().security("lockdown", Value::Null);
    system
        .queue()
        .enqueue(NewCommand::new(CommandKind::Bugcheck, "console"))
        .unwrap();
    system.queue().drain();
    system.bus().emit("window:focus", Value::Null);

    assert_eq!(*survivors.lock().unwrap(), vec!["dispatcher", "queue", "bus"]);
}

// ============================================================================
// File-backed store shared by two contexts
// ============================================================================

#[test]
fn test_file_store_carries_commands_between_processes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("desk-store.json");

    let console_store: SharedStore = Arc::new(FileStore::open(&path).unwrap());
    let console = EventSystem::new(console_store, EventingConfig::default());
    console.boot(false);
    console
        .queue()
        .enqueue(NewCommand::new(CommandKind::Toast, "console").with_payload(json!({ "text": "hello" })))
        .unwrap();

    let desktop_store: SharedStore = Arc::new(FileStore::open(&path).unwrap());
    let desktop = EventSystem::new(desktop_store, EventingConfig::default());
    let boot = desktop.boot(true);
    assert_eq!(boot.details["restoredActions"], 1);

    let seen = recorder(desktop.queue());
    assert_eq!(desktop.queue().drain(), 1);
    assert_eq!(seen.lock().unwrap()[0].payload["text"], "hello");
    assert!(console.queue().is_empty().unwrap());
}

#[test]
fn test_file_store_enqueue_races_dequeue_without_loss() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("desk-store.json");

    let producer_store: SharedStore = Arc::new(FileStore::open(&path).unwrap());
    let consumer_store: SharedStore = Arc::new(FileStore::open(&path).unwrap());
    let producer = CommandQueue::new(producer_store, &EventingConfig::default());
    let consumer = CommandQueue::new(consumer_store, &EventingConfig::default());

    let sender = std::thread::spawn(move || {
        for i in 0..100 {
            producer
                .enqueue(NewCommand::new(CommandKind::Toast, "console").with_payload(json!({ "n": i })))
                .unwrap();
        }
    });

    let mut delivered = Vec::new();
    while !sender.is_finished() {
        if let Some(cmd) = consumer.dequeue().unwrap() {
            delivered.push(cmd.id);
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    sender.join().unwrap();
    while let Some(cmd) = consumer.dequeue().unwrap() {
        delivered.push(cmd.id);
    }

    assert_eq!(delivered, (0..100).collect::<Vec<u64>>(), "each command exactly once, in order");
    assert!(consumer.is_empty().unwrap());
}
