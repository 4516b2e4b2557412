use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{TimeZone, Timelike, Utc};
use proptest::prelude::*;

use chronodag::{cron, Outcome, Scheduler};

// Strategy to generate an acyclic dependency layout: task N may only
// depend on tasks 0..N-1.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = Vec<Vec<usize>>> {
    (2..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_tasks),
            num_tasks,
        )
        .prop_map(|raw_deps| {
            raw_deps
                .into_iter()
                .enumerate()
                .map(|(i, potential)| {
                    let mut deps: Vec<usize> = potential
                        .into_iter()
                        .filter(|_| i > 0)
                        .map(|d| d % i)
                        .collect();
                    deps.sort_unstable();
                    deps.dedup();
                    deps
                })
                .collect()
        })
    })
}

fn cron_field_strategy(min: u32, max: u32) -> impl Strategy<Value = String> {
    prop_oneof![
        Just("*".to_string()),
        (min..=max).prop_map(|v| v.to_string()),
        (min.max(1)..=max).prop_map(|k| format!("*/{k}")),
    ]
}

fn cron_expr_strategy() -> impl Strategy<Value = String> {
    (
        cron_field_strategy(0, 59),
        cron_field_strategy(0, 23),
        cron_field_strategy(1, 31),
        cron_field_strategy(1, 12),
        cron_field_strategy(0, 6),
    )
        .prop_map(|(mi, h, dom, mo, dow)| format!("{mi} {h} {dom} {mo} {dow}"))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    // Every submitted DAG executes in an order compatible with its edges.
    #[test]
    fn dependency_order_is_respected(deps in dag_strategy(8)) {
        let scheduler = Scheduler::new(4);
        scheduler.start();

        let order: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::with_capacity(deps.len());

        for (i, task_deps) in deps.iter().enumerate() {
            let preds: Vec<_> = task_deps.iter().map(|&d| handles[d]).collect();
            let order = order.clone();
            let h = scheduler.schedule_at(
                Instant::now(),
                move || order.lock().unwrap().push(i),
                &preds,
            );
            prop_assert!(h.is_valid());
            handles.push(h);
        }

        for &h in &handles {
            prop_assert_eq!(scheduler.wait(h).unwrap(), Outcome::Success);
        }
        scheduler.stop();

        let seen = order.lock().unwrap().clone();
        prop_assert_eq!(seen.len(), deps.len());

        let position: HashMap<usize, usize> =
            seen.iter().enumerate().map(|(pos, &task)| (task, pos)).collect();
        for (i, task_deps) in deps.iter().enumerate() {
            for &d in task_deps {
                prop_assert!(
                    position[&d] < position[&i],
                    "task {} ran before its predecessor {}",
                    i,
                    d
                );
            }
        }
    }
}

proptest! {
    // Calendar math is pure; the default case count is fine here.
    #[test]
    fn next_fire_is_strictly_in_the_future(
        expr in cron_expr_strategy(),
        // 2000-01-01 .. 2100-01-01
        secs in 946_684_800i64..4_102_444_800i64,
    ) {
        let schedule = cron::parse(&expr).unwrap();
        let after = Utc.timestamp_opt(secs, 0).unwrap();
        // Impossible dates (e.g. day 30 in February) legitimately yield
        // no fire; any produced instant must be in the strict future.
        if let Some(next) = cron::next_fire(&schedule, after) {
            prop_assert!(next > after);
            prop_assert_eq!(next.second(), 0);
        }
    }

    #[test]
    fn wildcard_schedules_always_have_a_next_fire(
        secs in 946_684_800i64..4_102_444_800i64,
    ) {
        let schedule = cron::parse("* * * * *").unwrap();
        let after = Utc.timestamp_opt(secs, 0).unwrap();
        let next = cron::next_fire(&schedule, after).unwrap();
        prop_assert!(next > after);
        prop_assert!((next - after).num_seconds() <= 60);
    }
}
