use super::*;

#[test]
fn fifo_order_is_preserved() {
    let q = BoundedQueue::new(3);
    for i in 0..3 {
        q.push(i).unwrap();
    }
    assert_eq!(q.try_push(99), Err(99));
    assert_eq!(q.pull(), Some(0));
    assert_eq!(q.pull(), Some(1));
    assert_eq!(q.pull(), Some(2));
    assert!(q.is_empty());
}

#[test]
fn capacity_is_at_least_one() {
    let q = BoundedQueue::<u8>::new(0);
    assert_eq!(q.capacity(), 1);
}

#[test]
fn close_drains_then_ends() {
    let q = BoundedQueue::new(4);
    q.push("a").unwrap();
    q.push("b").unwrap();
    q.close();
    assert_eq!(q.push("c"), Err("c"));
    assert_eq!(q.pull(), Some("a"));
    assert_eq!(q.pull(), Some("b"));
    assert_eq!(q.pull(), None);
}

#[test]
fn stop_keeps_items_for_drain_and_resume_rearms() {
    let q = BoundedQueue::new(4);
    q.push(1).unwrap();
    q.push(2).unwrap();
    q.stop();
    assert!(q.is_stopped());
    assert_eq!(q.pull(), None);
    assert_eq!(q.push(3), Err(3));

    q.resume();
    assert_eq!(q.pull(), Some(1));
    assert_eq!(q.drain(), vec![2]);
    assert!(q.is_empty());
}

#[test]
fn pull_timeout_returns_none_when_idle() {
    let q = BoundedQueue::<u32>::new(1);
    let start = Instant::now();
    assert_eq!(q.pull_timeout(Duration::from_millis(20)), None);
    assert!(start.elapsed() >= Duration::from_millis(20));
}
