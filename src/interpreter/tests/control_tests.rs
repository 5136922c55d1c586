//! Pause, resume, cancel, delay, and interrupt scripts

use super::helpers::{interpreter, particle_host, script};
use crate::interpreter::vm::{RunOptions, RunStatus};
use crate::interpreter::{MemoryHost, ScriptControl};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const WAIT_LIMIT: Duration = Duration::from_secs(5);

fn wait_until(mut ready: impl FnMut() -> bool) {
    let started = Instant::now();
    while !ready() {
        assert!(started.elapsed() < WAIT_LIMIT, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}

/// Drive `control` from a helper thread once the script has paused
fn on_pause(
    control: ScriptControl,
    host: Arc<MemoryHost>,
    act: impl FnOnce(&ScriptControl, &MemoryHost) + Send + 'static,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        wait_until(|| control.is_paused());
        act(&control, &host);
    })
}

#[test]
fn test_interrupt_runs_while_paused() {
    let host = Arc::new(particle_host(3));
    let mut interp = interpreter(&host);
    let helper = on_pause(interp.control(), host.clone(), |control, host| {
        control.queue_interrupt(script("interrupt", &["print \"interrupt\""]));
        wait_until(|| host.output_lines().len() == 2);
        control.resume();
    });

    let report = interp
        .run(
            script("main", &["print \"before\"", "pause", "print \"after\""]),
            RunOptions::default(),
        )
        .unwrap();
    helper.join().unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(host.output_lines(), vec!["before", "interrupt", "after"]);
    let status = host.status_messages();
    assert!(status.contains(&"script execution paused".to_string()));
    assert!(status.contains(&"script execution resumed".to_string()));
}

#[test]
fn test_cancel_while_paused() {
    let host = Arc::new(particle_host(3));
    let mut interp = interpreter(&host);
    let helper = on_pause(interp.control(), host.clone(), |control, _| control.cancel());

    let report = interp
        .run(script("main", &["pause", "print \"after\""]), RunOptions::default())
        .unwrap();
    helper.join().unwrap();

    assert_eq!(report.status, RunStatus::Cancelled);
    assert!(host.output_lines().is_empty());
    assert!(host
        .status_messages()
        .contains(&"script execution interrupted".to_string()));
    assert!(!interp.control().is_cancelled());
}

#[test]
fn test_exit_in_interrupt_keeps_main_script() {
    let host = Arc::new(particle_host(3));
    let mut interp = interpreter(&host);
    let helper = on_pause(interp.control(), host.clone(), |control, host| {
        control.queue_interrupt(script("interrupt", &["print \"i\"", "exit", "print \"unreached\""]));
        wait_until(|| !host.output_lines().is_empty());
        control.resume();
    });

    let report = interp
        .run(script("main", &["pause", "print \"after\""]), RunOptions::default())
        .unwrap();
    helper.join().unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(host.output_lines(), vec!["i", "after"]);
}

#[test]
fn test_delay_waits() {
    let host = Arc::new(particle_host(1));
    let mut interp = interpreter(&host);
    let started = Instant::now();
    interp
        .run(script("main", &["delay 0.05", "print \"done\""]), RunOptions::default())
        .unwrap();

    assert!(started.elapsed() >= Duration::from_millis(50));
    assert_eq!(host.output_lines(), vec!["done"]);
}

#[test]
fn test_delay_runs_interrupts() {
    let host = Arc::new(particle_host(1));
    let mut interp = interpreter(&host);
    interp
        .control()
        .queue_interrupt(script("interrupt", &["print \"interrupt\""]));

    interp
        .run(script("main", &["delay 0.05", "print \"done\""]), RunOptions::default())
        .unwrap();
    assert_eq!(host.output_lines(), vec!["interrupt", "done"]);
}

#[test]
fn test_resume_statement_clears_pause() {
    let host = Arc::new(particle_host(1));
    let mut interp = interpreter(&host);
    let control = interp.control();
    control.pause();

    // the pause only takes effect at a statement boundary; an interrupt resumes it
    control.queue_interrupt(script("interrupt", &["resume"]));
    let report = interp
        .run(script("main", &["print \"one\"", "print \"two\""]), RunOptions::default())
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(host.output_lines(), vec!["one", "two"]);
}
