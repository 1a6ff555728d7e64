//! Scheduler lifecycle acceptance tests.
//!
//! Covers the IDLE -> RUNNING -> STOPPED state machine from the
//! outside: registration windows, restart with registered tasks
//! intact, the stop guarantee, and implicit stop on drop.

use super::common::{ci_config, counting_callback};
use metronome_common::error::SchedError;
use metronome_common::state::SchedState;
use metronome_sched::Scheduler;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_full_lifecycle_with_restart() {
    let counter = Arc::new(AtomicU64::new(0));
    let mut sched = Scheduler::with_config(ci_config());

    sched
        .add_task(counting_callback(&counter), "worker", Duration::from_millis(10), 0)
        .unwrap();
    assert_eq!(sched.state(), SchedState::Idle);

    // first run
    sched.start().unwrap();
    assert_eq!(sched.state(), SchedState::Running);
    std::thread::sleep(Duration::from_millis(200));
    sched.stop();
    assert_eq!(sched.state(), SchedState::Stopped);

    let after_first = counter.load(Ordering::Relaxed);
    assert!(after_first >= 5, "first run barely dispatched: {after_first}");

    // restart: registered tasks and their callbacks survive the stop
    sched.start().unwrap();
    assert_eq!(sched.state(), SchedState::Running);
    std::thread::sleep(Duration::from_millis(200));
    sched.stop();

    let after_second = counter.load(Ordering::Relaxed);
    assert!(
        after_second >= after_first + 5,
        "restart did not dispatch: before={after_first} after={after_second}"
    );
}

#[test]
fn test_registration_window() {
    let mut sched = Scheduler::with_config(ci_config());
    sched
        .add_task(|| Ok(()), "early", Duration::from_millis(10), 0)
        .unwrap();

    sched.start().unwrap();
    assert!(matches!(
        sched.add_task(|| Ok(()), "during", Duration::from_millis(10), 0),
        Err(SchedError::InvalidState(_))
    ));
    sched.stop();

    // stopped scheduler accepts new registrations again
    sched
        .add_task(|| Ok(()), "after", Duration::from_millis(10), 0)
        .unwrap();
    assert_eq!(sched.task_names(), vec!["early", "after"]);
}

#[test]
fn test_invalid_registrations_rejected() {
    let mut sched = Scheduler::with_config(ci_config());

    assert!(matches!(
        sched.add_task(|| Ok(()), "", Duration::from_millis(1), 0),
        Err(SchedError::InvalidArgument(_))
    ));
    assert!(matches!(
        sched.add_task(|| Ok(()), "zero", Duration::ZERO, 0),
        Err(SchedError::InvalidArgument(_))
    ));

    sched
        .add_task(|| Ok(()), "taken", Duration::from_millis(1), 0)
        .unwrap();
    assert!(matches!(
        sched.add_task(|| Ok(()), "taken", Duration::from_millis(1), 0),
        Err(SchedError::InvalidArgument(_))
    ));
}

#[test]
fn test_double_start_and_redundant_stop() {
    let mut sched = Scheduler::with_config(ci_config());

    sched.stop(); // before any start: no-op
    assert_eq!(sched.state(), SchedState::Idle);

    sched.start().unwrap();
    assert!(matches!(sched.start(), Err(SchedError::InvalidState(_))));
    assert_eq!(sched.state(), SchedState::Running);

    sched.stop();
    sched.stop();
    assert_eq!(sched.state(), SchedState::Stopped);
}

#[test]
fn test_stop_halts_all_dispatch() {
    let counter = Arc::new(AtomicU64::new(0));
    let mut sched = Scheduler::with_config(ci_config());
    sched
        .add_task(counting_callback(&counter), "a", Duration::from_millis(5), 0)
        .unwrap();
    sched
        .add_task(counting_callback(&counter), "b", Duration::from_millis(7), 0)
        .unwrap();

    sched.start().unwrap();
    std::thread::sleep(Duration::from_millis(100));
    sched.stop();

    let at_stop = counter.load(Ordering::Relaxed);
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(
        counter.load(Ordering::Relaxed),
        at_stop,
        "dispatch continued after stop() returned"
    );
}

#[test]
fn test_drop_while_running_stops_tasks() {
    let counter = Arc::new(AtomicU64::new(0));
    {
        let mut sched = Scheduler::with_config(ci_config());
        sched
            .add_task(counting_callback(&counter), "worker", Duration::from_millis(5), 0)
            .unwrap();
        sched.start().unwrap();
        std::thread::sleep(Duration::from_millis(50));
        // dropped while RUNNING
    }

    let at_drop = counter.load(Ordering::Relaxed);
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(counter.load(Ordering::Relaxed), at_drop);
}

#[test]
fn test_max_priority_is_stable() {
    let sched = Scheduler::with_config(ci_config());
    let first = sched.max_priority();
    assert_eq!(sched.max_priority(), first);
    // realtime disabled in ci_config: only the baseline priority exists
    assert_eq!(first, 0);
}
