//! Behavioural properties of the work queue as seen by a sync worker.

use std::sync::Arc;
use std::time::Duration;
use workqueue::{ExponentialBackoff, WorkQueue};

fn queue() -> Arc<WorkQueue<String>> {
    Arc::new(WorkQueue::new(
        "properties",
        ExponentialBackoff::new(Duration::from_millis(1000), Duration::from_secs(300))
            .with_max_steps(5),
    ))
}

#[tokio::test]
async fn enqueue_twice_before_dequeue_yields_single_entry() {
    let q = queue();
    q.enqueue("ns/a".to_string());
    q.enqueue("ns/a".to_string());

    assert_eq!(q.len(), 1);
    assert_eq!(q.dequeue().await.as_deref(), Some("ns/a"));
    assert!(q.is_empty());
}

#[tokio::test]
async fn repeated_enqueue_while_processing_collapses_to_one_round() {
    let q = queue();
    q.enqueue("ns/a".to_string());
    let key = q.dequeue().await.unwrap();

    for _ in 0..5 {
        q.enqueue("ns/a".to_string());
    }
    q.mark_done(&key);

    // exactly one additional round
    assert_eq!(q.len(), 1);
    let again = q.dequeue().await.unwrap();
    assert_eq!(again, "ns/a");
    q.mark_done(&again);
    assert!(q.is_empty());
}

#[tokio::test]
async fn shutdown_abandons_queued_keys() {
    let q = queue();
    q.enqueue("ns/a".to_string());
    q.enqueue("ns/b".to_string());

    let in_flight = q.dequeue().await.unwrap();
    q.shutdown();

    assert_eq!(q.dequeue().await, None);
    assert_eq!(q.dequeue().await, None);

    // the round already in flight may still finish
    q.mark_done(&in_flight);
    assert_eq!(q.dequeue().await, None);
}

#[tokio::test(start_paused = true)]
async fn requeue_delays_grow_then_cap_without_dropping_the_key() {
    let q = queue();
    let key = "ns/a".to_string();
    q.enqueue(key.clone());

    let mut delays = Vec::new();
    for _ in 0..6 {
        let k = q.dequeue().await.unwrap();
        delays.push(q.requeue(k.clone(), &"programmer unavailable"));
        q.mark_done(&k);
        // the retry is delivered once its delay elapses
        assert!(q.is_empty());
    }

    assert_eq!(
        delays,
        vec![
            Duration::from_millis(1000),
            Duration::from_millis(2000),
            Duration::from_millis(4000),
            Duration::from_millis(8000),
            Duration::from_millis(16000),
            Duration::from_millis(16000),
        ]
    );
    assert_eq!(q.num_requeues(&key), 6);

    // still retried after the sixth failure
    assert_eq!(q.dequeue().await, Some(key.clone()));

    q.forget(&key);
    assert_eq!(q.num_requeues(&key), 0);
    assert!(q.backoff_record(&key).is_none());
}

#[tokio::test(start_paused = true)]
async fn requeue_after_shutdown_never_redelivers() {
    let q = queue();
    q.enqueue("ns/a".to_string());
    let key = q.dequeue().await.unwrap();
    q.requeue(key.clone(), &"boom");
    q.mark_done(&key);
    q.shutdown();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(q.is_empty());
    assert_eq!(q.dequeue().await, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_workers_never_share_a_key() {
    let q = queue();
    let in_flight = Arc::new(std::sync::Mutex::new(std::collections::HashSet::new()));
    let rounds = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let q = q.clone();
            let in_flight = in_flight.clone();
            let rounds = rounds.clone();
            tokio::spawn(async move {
                while let Some(key) = q.dequeue().await {
                    assert!(
                        in_flight.lock().unwrap().insert(key.clone()),
                        "key {key} handed to two workers"
                    );
                    tokio::task::yield_now().await;
                    in_flight.lock().unwrap().remove(&key);
                    rounds.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    q.mark_done(&key);
                }
            })
        })
        .collect();

    for i in 0..200 {
        q.enqueue(format!("ns/{}", i % 7));
        if i % 10 == 0 {
            tokio::task::yield_now().await;
        }
    }
    while !q.is_empty() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    q.shutdown();
    for worker in workers {
        worker.await.unwrap();
    }
    assert!(rounds.load(std::sync::atomic::Ordering::SeqCst) >= 7);
}
