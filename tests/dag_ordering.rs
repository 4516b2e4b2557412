mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chronodag::{Outcome, Scheduler};

use crate::common::init_tracing;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[test]
fn dependent_runs_after_its_predecessor() {
    init_tracing();
    let scheduler = Scheduler::new(4);
    scheduler.start();

    let order = Arc::new(AtomicUsize::new(0));

    let t1 = {
        let order = order.clone();
        scheduler.schedule_at(
            Instant::now() + ms(50),
            move || order.store(1, Ordering::SeqCst),
            &[],
        )
    };
    let t2 = {
        let order = order.clone();
        scheduler.schedule_at(
            Instant::now() + ms(100),
            move || {
                assert_eq!(order.load(Ordering::SeqCst), 1);
                order.store(2, Ordering::SeqCst);
            },
            &[t1],
        )
    };

    assert_eq!(scheduler.wait(t2).unwrap(), Outcome::Success);
    assert_eq!(order.load(Ordering::SeqCst), 2);
    scheduler.stop();
}

#[test]
fn chain_of_three_runs_in_order() {
    init_tracing();
    let scheduler = Scheduler::new(4);
    scheduler.start();

    let seen: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
    let push = |seen: &Arc<Mutex<Vec<u64>>>, id: u64| {
        let seen = seen.clone();
        move || seen.lock().unwrap().push(id)
    };

    let a = scheduler.schedule_at(Instant::now() + ms(10), push(&seen, 1), &[]);
    let b = scheduler.schedule_at(Instant::now() + ms(10), push(&seen, 2), &[a]);
    let c = scheduler.schedule_at(Instant::now() + ms(10), push(&seen, 3), &[b]);

    assert_eq!(scheduler.wait(c).unwrap(), Outcome::Success);
    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    scheduler.stop();
}

#[test]
fn diamond_joins_after_both_branches() {
    init_tracing();
    let scheduler = Scheduler::new(4);
    scheduler.start();

    let seen: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
    let push = |seen: &Arc<Mutex<Vec<u64>>>, id: u64| {
        let seen = seen.clone();
        move || seen.lock().unwrap().push(id)
    };

    let a = scheduler.schedule_at(Instant::now() + ms(10), push(&seen, 1), &[]);
    let b = scheduler.schedule_at(Instant::now() + ms(20), push(&seen, 2), &[a]);
    let c = scheduler.schedule_at(Instant::now() + ms(20), push(&seen, 3), &[a]);
    let d = scheduler.schedule_at(Instant::now() + ms(30), push(&seen, 4), &[b, c]);

    assert_eq!(scheduler.wait(d).unwrap(), Outcome::Success);

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 4);
    assert_eq!(seen[0], 1);
    assert_eq!(seen[3], 4);
    // The two branches may run in either order.
    assert!(seen[1..3] == [2, 3] || seen[1..3] == [3, 2]);
    scheduler.stop();
}

#[test]
fn handles_are_valid_unique_and_submission_ordered() {
    init_tracing();
    let scheduler = Scheduler::new(1);

    let a = scheduler.schedule_at(Instant::now() + ms(10), || {}, &[]);
    let b = scheduler.schedule_at(Instant::now() + ms(10), || {}, &[]);
    let c = scheduler.schedule_at(Instant::now() + ms(10), || {}, &[a, b]);

    assert!(a.is_valid() && b.is_valid() && c.is_valid());
    assert!(a.id() < b.id() && b.id() < c.id());
    scheduler.stop();
}

#[test]
fn past_start_instant_dispatches_promptly() {
    init_tracing();
    let scheduler = Scheduler::new(2);
    scheduler.start();

    let begun = Instant::now();
    let h = scheduler.schedule_at(begun, || {}, &[]);

    assert_eq!(scheduler.wait(h).unwrap(), Outcome::Success);
    assert!(begun.elapsed() < Duration::from_secs(1));
    scheduler.stop();
}

#[test]
fn no_start_before_the_start_instant() {
    init_tracing();
    let scheduler = Scheduler::new(2);
    scheduler.start();

    let fired_at: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));
    let begun = Instant::now();
    let start_at = begun + ms(150);

    let h = {
        let fired_at = fired_at.clone();
        scheduler.schedule_at(
            start_at,
            move || {
                *fired_at.lock().unwrap() = Some(Instant::now());
            },
            &[],
        )
    };

    assert_eq!(scheduler.wait(h).unwrap(), Outcome::Success);
    let fired = fired_at.lock().unwrap().expect("task ran");
    assert!(fired >= start_at, "task started before its start instant");
    scheduler.stop();
}
