use std::time::Duration;
use worklog_server::broadcast::{BroadcastSettings, Broadcaster};
use worklog_server::registry::ClientRegistry;
use worklog_types::Entry;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_register_and_drop_leaves_registry_empty() {
    let registry = ClientRegistry::default();

    let mut handles = Vec::new();
    for _ in 0..32 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..50 {
                let sub = registry.register();
                tokio::task::yield_now().await;
                drop(sub);
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert!(registry.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fanout_runs_while_viewers_come_and_go() {
    let registry = ClientRegistry::default();
    let broadcaster = Broadcaster::start(registry.clone(), BroadcastSettings::default());
    let mut steady = registry.register();

    let churn = {
        let registry = registry.clone();
        tokio::spawn(async move {
            for _ in 0..200 {
                let sub = registry.register();
                tokio::task::yield_now().await;
                drop(sub);
            }
        })
    };

    for id in 1..=10 {
        broadcaster.publish(Entry {
            id,
            username: None,
            message: format!("entry {id}"),
            tags: None,
            timestamp: "2026-10-18T09:00:00Z".to_string(),
        });
        let got = tokio::time::timeout(Duration::from_secs(2), steady.recv())
            .await
            .expect("steady viewer should keep receiving")
            .unwrap();
        assert_eq!(got.id, id);
    }

    churn.await.unwrap();
    assert_eq!(registry.len(), 1);
}
