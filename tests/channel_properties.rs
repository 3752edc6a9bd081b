use std::thread;
use std::time::{Duration, Instant};

use scene_kernel::BoundedChannel;

#[test]
fn fifo_for_any_prefix_that_fits() {
    for n in 1..=16usize {
        let channel = BoundedChannel::new(16).unwrap();
        let items: Vec<String> = (0..n).map(|i| format!("item-{}", i)).collect();
        for item in &items {
            assert!(channel.offer(item.clone()));
        }
        let taken: Vec<String> = (0..n)
            .map(|_| channel.take(Duration::from_millis(10)).unwrap())
            .collect();
        assert_eq!(taken, items);
        assert!(channel.is_empty());
    }
}

#[test]
fn full_channel_drops_without_blocking_or_corruption() {
    let channel = BoundedChannel::new(3).unwrap();
    for i in 0..3 {
        assert!(channel.offer(i));
    }

    let started = Instant::now();
    for i in 3..1_000 {
        assert!(!channel.offer(i));
        assert_eq!(channel.len(), 3);
    }
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(channel.dropped(), 997);
    assert!(channel.is_full());

    let remaining: Vec<i32> = std::iter::from_fn(|| channel.try_take()).collect();
    assert_eq!(remaining, vec![0, 1, 2]);
}

#[test]
fn producer_and_consumer_threads_preserve_order() {
    let channel = BoundedChannel::new(4).unwrap();
    let producer = channel.clone();

    let handle = thread::spawn(move || {
        let mut accepted = Vec::new();
        for i in 0..500u32 {
            if producer.offer(i) {
                accepted.push(i);
            }
            if i % 50 == 0 {
                thread::sleep(Duration::from_millis(1));
            }
        }
        accepted
    });

    let mut received = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match channel.take(Duration::from_millis(20)) {
            Some(item) => received.push(item),
            None if handle.is_finished() && channel.is_empty() => break,
            None if Instant::now() > deadline => break,
            None => {}
        }
    }
    let accepted = handle.join().unwrap();

    assert_eq!(received, accepted);
    assert_eq!(channel.dropped() as usize, 500 - accepted.len());
}
