//! Fault escalation acceptance tests.
//!
//! Covers the fail-closed paths: a callback returning an error and a
//! task blowing its timeliness budget must both request a global stop,
//! pulling every other task down with them. A single transient overrun
//! below the warn threshold must not.

use super::common::{ci_config, counting_callback, strict_timeliness_config, wait_for_stop};
use metronome_common::error::SchedError;
use metronome_sched::Scheduler;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_callback_failure_requests_global_stop() {
    let calls = Arc::new(AtomicU64::new(0));
    let mut sched = Scheduler::with_config(ci_config());

    let counter = Arc::clone(&calls);
    sched
        .add_task(
            move || {
                if counter.fetch_add(1, Ordering::Relaxed) >= 3 {
                    Err("simulated hardware fault".into())
                } else {
                    Ok(())
                }
            },
            "failing",
            Duration::from_millis(10),
            0,
        )
        .unwrap();

    sched.start().unwrap();
    let token = sched.stop_token();
    assert!(
        wait_for_stop(&token, Duration::from_secs(5)),
        "callback error did not request a stop"
    );
    sched.stop();

    match sched.last_fault() {
        Some(SchedError::CallbackFailure { task, reason }) => {
            assert_eq!(task, "failing");
            assert!(reason.contains("simulated hardware fault"));
        }
        other => panic!("expected CallbackFailure, got {other:?}"),
    }
}

#[test]
fn test_faulting_task_stops_healthy_tasks_too() {
    let healthy = Arc::new(AtomicU64::new(0));
    let mut sched = Scheduler::with_config(ci_config());

    sched
        .add_task(
            || Err("immediate failure".into()),
            "faulty",
            Duration::from_millis(10),
            0,
        )
        .unwrap();
    sched
        .add_task(counting_callback(&healthy), "healthy", Duration::from_millis(10), 0)
        .unwrap();

    sched.start().unwrap();
    let token = sched.stop_token();
    assert!(wait_for_stop(&token, Duration::from_secs(5)));

    // give the healthy dispatch loop a chance to notice the token
    std::thread::sleep(Duration::from_millis(100));
    let at_fault = healthy.load(Ordering::Relaxed);
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(
        healthy.load(Ordering::Relaxed),
        at_fault,
        "healthy task kept dispatching after the global stop"
    );

    sched.stop();
    assert!(sched.last_fault().is_some());
}

#[test]
fn test_sustained_overruns_trigger_timeliness_fault() {
    // 5ms tolerance on a 10ms period; a 50ms stall in every invocation
    // overruns the budget until the warn threshold is reached.
    let mut sched = Scheduler::with_config(strict_timeliness_config(
        Duration::from_millis(5),
        2,
    ));

    sched
        .add_task(
            || {
                std::thread::sleep(Duration::from_millis(50));
                Ok(())
            },
            "overrunner",
            Duration::from_millis(10),
            0,
        )
        .unwrap();

    sched.start().unwrap();
    let token = sched.stop_token();
    assert!(
        wait_for_stop(&token, Duration::from_secs(5)),
        "sustained overruns did not fault"
    );
    sched.stop();

    match sched.last_fault() {
        Some(SchedError::TimelinessFault {
            task,
            consecutive,
            threshold,
        }) => {
            assert_eq!(task, "overrunner");
            assert_eq!(threshold, 2);
            assert!(consecutive >= threshold);
        }
        other => panic!("expected TimelinessFault, got {other:?}"),
    }
}

#[test]
fn test_single_transient_overrun_recovers() {
    // Wide tolerance, threshold 3: a single injected stall warns at
    // most once and on-time invocations afterwards clear the streak.
    let mut sched = Scheduler::with_config(strict_timeliness_config(
        Duration::from_millis(200),
        3,
    ));

    let calls = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&calls);
    sched
        .add_task(
            move || {
                if counter.fetch_add(1, Ordering::Relaxed) == 3 {
                    std::thread::sleep(Duration::from_millis(300));
                }
                Ok(())
            },
            "hiccup",
            Duration::from_millis(20),
            0,
        )
        .unwrap();

    sched.start().unwrap();
    let token = sched.stop_token();
    assert!(
        !wait_for_stop(&token, Duration::from_millis(800)),
        "single transient overrun must not fault"
    );
    sched.stop();

    assert!(sched.last_fault().is_none());
    assert!(calls.load(Ordering::Relaxed) >= 10, "task stopped dispatching");
}

#[test]
fn test_fault_state_clears_on_restart() {
    let mut sched = Scheduler::with_config(ci_config());
    sched
        .add_task(|| Err("one-shot failure".into()), "flaky", Duration::from_millis(10), 0)
        .unwrap();

    sched.start().unwrap();
    let token = sched.stop_token();
    assert!(wait_for_stop(&token, Duration::from_secs(5)));
    sched.stop();
    assert!(sched.last_fault().is_some());

    // each start installs a fresh fault slot and stop token; the
    // flaky task fails again and the new run records its own fault
    sched.start().unwrap();
    let fresh_token = sched.stop_token();
    assert!(wait_for_stop(&fresh_token, Duration::from_secs(5)));
    sched.stop();
    assert!(matches!(
        sched.last_fault(),
        Some(SchedError::CallbackFailure { .. })
    ));
}
