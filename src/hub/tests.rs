use super::*;
use std::thread;
use std::time::{Duration, Instant};
use tokio_stream::StreamExt;

#[test]
fn test_publish_reaches_every_subscriber() {
    let hub = BroadcastHub::new("test", 10);
    let mut a = hub.subscribe();
    let mut b = hub.subscribe();

    let report = hub.publish(7u32);

    assert_eq!(report, PublishReport { delivered: 2, dropped: 0 });
    assert_eq!(a.try_recv(), Some(7));
    assert_eq!(b.try_recv(), Some(7));
}

#[test]
fn test_publish_without_subscribers_is_fine() {
    let hub: BroadcastHub<u32> = BroadcastHub::new("test", 10);
    let report = hub.publish(1);
    assert_eq!(report.delivered, 0);
    assert_eq!(hub.stats().published, 1);
}

#[test]
fn test_unsubscribed_handle_gets_nothing() {
    let hub = BroadcastHub::new("test", 10);
    let mut sub = hub.subscribe();
    let mut other = hub.subscribe();

    assert!(sub.unsubscribe());
    hub.publish("after".to_string());

    assert_eq!(sub.try_recv(), None);
    assert_eq!(other.try_recv().as_deref(), Some("after"));
    assert_eq!(hub.subscriber_count(), 1);
}

#[test]
fn test_unsubscribe_is_idempotent() {
    let hub: BroadcastHub<u32> = BroadcastHub::new("test", 10);
    let mut sub = hub.subscribe();

    assert!(sub.is_active());
    assert!(sub.unsubscribe());
    assert!(!sub.unsubscribe());
    assert!(!sub.is_active());
    assert_eq!(hub.subscriber_count(), 0);
}

#[test]
fn test_drop_unsubscribes() {
    let hub: BroadcastHub<u32> = BroadcastHub::new("test", 10);
    {
        let _sub = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);
    }
    assert_eq!(hub.subscriber_count(), 0);
}

#[test]
fn test_subscription_outliving_hub() {
    let hub: BroadcastHub<u32> = BroadcastHub::new("test", 10);
    let mut sub = hub.subscribe();
    hub.publish(1);
    drop(hub);

    // Still drains what was queued, unsubscribe has nothing to remove
    assert_eq!(sub.try_recv(), Some(1));
    assert!(!sub.unsubscribe());
}

#[test]
fn test_full_queue_drops_only_for_that_subscriber() {
    let hub = BroadcastHub::new("test", 2);
    let mut slow = hub.subscribe();
    let mut fast = hub.subscribe();

    for i in 0..5u32 {
        hub.publish(i);
        // fast keeps up, slow never reads
        assert_eq!(fast.try_recv(), Some(i));
    }

    assert_eq!(slow.try_recv(), Some(0));
    assert_eq!(slow.try_recv(), Some(1));
    assert_eq!(slow.try_recv(), None);

    let stats = hub.stats();
    assert_eq!(stats.published, 5);
    assert_eq!(stats.dropped, 3);
}

#[test]
fn test_events_below_capacity_all_observed_in_order() {
    let hub = BroadcastHub::new("test", 10);
    let mut sub = hub.subscribe();

    for i in 0..10u32 {
        assert_eq!(hub.publish(i).delivered, 1);
    }

    let received: Vec<u32> = std::iter::from_fn(|| sub.try_recv()).collect();
    assert_eq!(received, (0..10).collect::<Vec<_>>());
}

#[test]
fn test_publish_never_blocks_on_frozen_subscribers() {
    let hub = BroadcastHub::new("test", DEFAULT_SUBSCRIBER_CAPACITY);
    // Subscribers that never read
    let _frozen: Vec<_> = (0..50).map(|_| hub.subscribe()).collect();

    let started = Instant::now();
    for i in 0..1_000u32 {
        hub.publish(i);
    }
    let elapsed = started.elapsed();

    assert!(
        elapsed < Duration::from_secs(1),
        "publishing took {:?}",
        elapsed
    );
    let stats = hub.stats();
    assert_eq!(stats.published, 1_000);
    assert_eq!(stats.dropped, 50 * (1_000 - DEFAULT_SUBSCRIBER_CAPACITY as u64));
}

#[test]
fn test_zero_capacity_is_clamped() {
    let hub = BroadcastHub::new("test", 0);
    assert_eq!(hub.capacity(), 1);
    let mut sub = hub.subscribe();
    hub.publish(3u8);
    assert_eq!(sub.try_recv(), Some(3));
}

#[test]
fn test_clones_share_subscribers() {
    let hub = BroadcastHub::new("test", 10);
    let producer = hub.clone();
    let mut sub = hub.subscribe();

    producer.publish(42u64);

    assert_eq!(sub.try_recv(), Some(42));
    assert_eq!(producer.subscriber_count(), 1);
}

#[test]
fn test_concurrent_subscribe_and_publish() {
    let hub = BroadcastHub::new("test", 100);
    let mut handles = vec![];

    for _ in 0..8 {
        let hub = hub.clone();
        handles.push(thread::spawn(move || {
            let mut sub = hub.subscribe();
            for i in 0..50u32 {
                hub.publish(i);
            }
            let mut seen = 0;
            while sub.try_recv().is_some() {
                seen += 1;
            }
            sub.unsubscribe();
            seen
        }));
    }

    for handle in handles {
        let seen = handle.join().unwrap();
        // Each subscriber at least sees its own publishes
        assert!(seen >= 50);
    }
    assert_eq!(hub.subscriber_count(), 0);
}

#[tokio::test]
async fn test_recv_ends_after_unsubscribe() {
    let hub = BroadcastHub::new("test", 10);
    let mut sub = hub.subscribe();

    hub.publish(1u32);
    sub.unsubscribe();

    // Queued event is still drained, then the queue reports closed
    assert_eq!(sub.recv().await, Some(1));
    assert_eq!(sub.recv().await, None);
}

#[tokio::test]
async fn test_subscription_as_stream() {
    let hub = BroadcastHub::new("test", 10);
    let sub = hub.subscribe();

    let producer = hub.clone();
    tokio::spawn(async move {
        for i in 1..=3u32 {
            producer.publish(i);
        }
    });

    let collected: Vec<u32> = sub.take(3).collect().await;
    assert_eq!(collected, vec![1, 2, 3]);
}
