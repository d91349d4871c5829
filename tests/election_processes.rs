//! 多进程选举与故障转移测试

#![cfg(unix)]

mod common;

use common::{Coordinator, Harness};
use serial_test::serial;
use std::thread;
use std::time::Duration;

#[test]
#[serial]
fn first_master_then_subordinate_then_failover() {
    let h = Harness::new();

    let a = Coordinator::spawn(h.process());
    a.wait_for("Status: MASTER");
    let a_pid = a.pid();

    let mut b = Coordinator::spawn(h.process());
    b.wait_for("Status: SUBORDINATE");
    assert_eq!(h.store().snapshot().unwrap().master_id, a_pid);

    // the master dies without releasing its claim
    a.kill();
    let record = h.store().snapshot().unwrap();
    assert!(record.is_master_held);
    assert_eq!(record.master_id, a_pid);

    let c = Coordinator::spawn(h.process());
    c.wait_for("Status: MASTER");
    let c_pid = c.pid();
    assert_eq!(h.store().snapshot().unwrap().master_id, c_pid);

    // the surviving subordinate keeps its role and still sees the counter
    b.send("set 9");
    b.wait_for("Counter set to: 9");
    assert!(b.finish().success());
    assert!(c.finish().success());

    let journal = h.journal();
    assert!(journal.contains(&format!("Master (PID: {a_pid}) died")));
    assert!(journal.contains(&format!("[pid {c_pid} master] Master shutting down")));
    assert!(!h.store().snapshot().unwrap().is_master_held);
}

#[test]
#[serial]
fn clean_exit_hands_role_to_next_process() {
    let h = Harness::new();

    let a = Coordinator::spawn(h.process());
    a.wait_for("Status: MASTER");
    assert!(a.finish().success());

    let b = Coordinator::spawn(h.process());
    b.wait_for("Status: MASTER");
    assert!(b.finish().success());

    assert!(h.journal().contains("No master found. This process is now MASTER"));
}

#[test]
#[serial]
fn every_process_counts() {
    let h = Harness::new();

    let mut cmd = h.process();
    cmd.env("COUNTER_WARDEN_COUNTER_PERIOD_MS", "10");
    let mut master = Coordinator::spawn(cmd);
    master.wait_for("Status: MASTER");

    let mut cmd = h.process();
    cmd.env("COUNTER_WARDEN_COUNTER_PERIOD_MS", "10");
    let sub = Coordinator::spawn(cmd);
    sub.wait_for("Status: SUBORDINATE");

    thread::sleep(Duration::from_millis(300));
    master.send("get");
    let line = master.wait_for("Current counter value:");
    let value: i64 = line
        .rsplit(' ')
        .next()
        .and_then(|v| v.parse().ok())
        .expect("counter value");
    assert!(value > 0, "counter never advanced: {line}");

    assert!(sub.finish().success());
    assert!(master.finish().success());
}

#[test]
#[serial]
fn simultaneous_starters_elect_one_master() {
    for _ in 0..3 {
        let h = Harness::new();

        let starters: Vec<Coordinator> = (0..6).map(|_| Coordinator::spawn(h.process())).collect();
        let masters = starters
            .iter()
            .map(|c| c.wait_for("Status: "))
            .filter(|line| line.contains("Status: MASTER"))
            .count();
        assert_eq!(masters, 1);

        let record = h.store().snapshot().unwrap();
        assert!(record.is_master_held);
        assert!(starters.iter().any(|c| c.pid() == record.master_id));

        for starter in starters {
            assert!(starter.finish().success());
        }
    }
}
