/*!
 * Fork and Wait Tests
 * Child creation, return values, status propagation and reaping
 */

use super::common::{kernel, program, settle, Probe};
use pretty_assertions::assert_eq;
use proc_kernel::core::limits::{FORK_PRIORITY_HINT, USER_DATA_BASE};
use proc_kernel::{errno, Errno, ExecutionSubstrate, Kernel, Pid, ProcessError, ProcessResult, ThreadSubstrate, WaitKind, WaitStatus};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Forked(Pid),
    Child { v0: u32, a3: u32, pid: Pid, ppid: Pid },
    Parent(Pid),
    Reaped(Pid, WaitStatus),
    Error(Errno),
    Word(u32),
}

#[test]
fn test_fork_returns_child_pid_and_zero_in_child() {
    let kernel = kernel();
    let probe = Probe::new();
    let p = probe.clone();

    kernel.register(
        "/bin/forker",
        program("forker", move |u, tf| {
            if u.resumed_after_fork(tf) {
                let (pid, ppid) = (u.getpid(), u.getppid());
                p.record(Event::Child { v0: tf.v0, a3: tf.a3, pid, ppid });
                return u.exit(7);
            }

            p.record(Event::Parent(u.getpid()));
            let child = u.fork().unwrap();
            p.record(Event::Forked(child));
            let status = u.waitpid(child).unwrap();
            p.record(Event::Reaped(child, status));
            u.exit(0)
        }),
    );

    let root = kernel.run_program("/bin/forker", &["forker"]).unwrap();
    settle(&kernel);

    let events = probe.events();
    let child = events
        .iter()
        .find_map(|e| match e {
            Event::Forked(pid) => Some(*pid),
            _ => None,
        })
        .unwrap();

    assert!(events.contains(&Event::Parent(root)));
    assert!(events.contains(&Event::Child { v0: 0, a3: 0, pid: child, ppid: root }));
    assert!(events.contains(&Event::Reaped(child, WaitStatus::exited(7))));
    assert_ne!(child, root);
}

#[test]
fn test_wait_on_zombie_and_on_running_child() {
    let kernel = kernel();
    let probe = Probe::new();
    let p = probe.clone();

    kernel.register(
        "/bin/parent",
        program("parent", move |u, tf| {
            if u.resumed_after_fork(tf) {
                let slow = u.load_word(USER_DATA_BASE).unwrap() == 1;
                if slow {
                    std::thread::sleep(Duration::from_millis(50));
                }
                return u.exit(if slow { 2 } else { 1 });
            }

            u.store_word(USER_DATA_BASE, 0).unwrap();
            let fast = u.fork().unwrap();
            u.store_word(USER_DATA_BASE, 1).unwrap();
            let slow = u.fork().unwrap();

            // By now the fast child has most likely exited
            std::thread::sleep(Duration::from_millis(20));
            for child in [fast, slow] {
                let status = u.waitpid(child).unwrap();
                p.record(Event::Reaped(child, status));
            }
            u.exit(0)
        }),
    );

    kernel.run_program("/bin/parent", &["parent"]).unwrap();
    settle(&kernel);

    let statuses: Vec<i32> = probe
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Reaped(_, status) => status.exit_code(),
            _ => None,
        })
        .collect();
    assert_eq!(statuses, vec![1, 2]);
}

#[test]
fn test_waitpid_errors() {
    let kernel = kernel();
    let probe = Probe::new();
    let p = probe.clone();

    kernel.register(
        "/bin/waiter",
        program("waiter", move |u, tf| {
            if u.resumed_after_fork(tf) {
                return u.exit(0);
            }

            let me = u.getpid();
            let child = u.fork().unwrap();

            // Not children
            p.record(Event::Error(u.waitpid_raw(me, 0, 0).unwrap_err()));
            p.record(Event::Error(u.waitpid_raw(9999, 0, 0).unwrap_err()));
            // Options are not supported, even for a real child
            p.record(Event::Error(u.waitpid_raw(child, 0, 1).unwrap_err()));
            // Status pointer into unmapped and kernel memory
            p.record(Event::Error(u.waitpid_raw(child, 0x10, 0).unwrap_err()));
            p.record(Event::Error(u.waitpid_raw(child, 0x8000_0000, 0).unwrap_err()));
            // Text is not writable
            p.record(Event::Error(u.waitpid_raw(child, 0x0040_0000, 0).unwrap_err()));

            // NULL status discards it
            assert_eq!(u.waitpid_raw(child, 0, 0), Ok(child));
            // Already reaped
            p.record(Event::Error(u.waitpid_raw(child, 0, 0).unwrap_err()));
            u.exit(0)
        }),
    );

    kernel.run_program("/bin/waiter", &["waiter"]).unwrap();
    settle(&kernel);

    assert_eq!(
        probe.events(),
        vec![
            Event::Error(errno::ECHILD),
            Event::Error(errno::ECHILD),
            Event::Error(errno::EINVAL),
            Event::Error(errno::EFAULT),
            Event::Error(errno::EFAULT),
            Event::Error(errno::EFAULT),
            Event::Error(errno::ECHILD),
        ]
    );
}

#[test]
fn test_waitpid_options_do_not_block() {
    let kernel = kernel();
    let probe = Probe::new();
    let p = probe.clone();
    let release = Arc::new(AtomicBool::new(false));
    let finished = Arc::new(AtomicBool::new(false));

    kernel.register(
        "/bin/holder",
        program("holder", move |u, tf| {
            if u.resumed_after_fork(tf) {
                while !release.load(Ordering::Acquire) {
                    std::thread::sleep(Duration::from_millis(1));
                }
                finished.store(true, Ordering::Release);
                return u.exit(3);
            }

            let child = u.fork().unwrap();
            p.record(Event::Error(u.waitpid_raw(child, 0, 1).unwrap_err()));
            p.record(Event::Word(finished.load(Ordering::Acquire) as u32));

            release.store(true, Ordering::Release);
            p.record(Event::Reaped(child, u.waitpid(child).unwrap()));
            u.exit(0)
        }),
    );

    kernel.run_program("/bin/holder", &["holder"]).unwrap();
    settle(&kernel);

    let events = probe.events();
    assert_eq!(events[0], Event::Error(errno::EINVAL));
    // The child was still running when waitpid returned
    assert_eq!(events[1], Event::Word(0));
    assert!(matches!(events[2], Event::Reaped(_, status) if status == WaitStatus::exited(3)));
}

#[test]
fn test_fork_copies_address_space() {
    let kernel = kernel();
    let probe = Probe::new();
    let p = probe.clone();

    kernel.register(
        "/bin/copier",
        program("copier", move |u, tf| {
            if u.resumed_after_fork(tf) {
                let seen = u.load_word(USER_DATA_BASE).unwrap();
                u.store_word(USER_DATA_BASE, 0xdead).unwrap();
                return u.exit(seen as i32);
            }

            u.store_word(USER_DATA_BASE, 41).unwrap();
            let child = u.fork().unwrap();
            let status = u.waitpid(child).unwrap();
            p.record(Event::Reaped(child, status));
            p.record(Event::Word(u.load_word(USER_DATA_BASE).unwrap()));
            u.exit(0)
        }),
    );

    kernel.run_program("/bin/copier", &["copier"]).unwrap();
    settle(&kernel);

    let events = probe.events();
    assert!(matches!(events[0], Event::Reaped(_, status) if status.exit_code() == Some(41)));
    assert_eq!(events[1], Event::Word(41));
}

#[test]
fn test_fork_out_of_frames() {
    // One simple process with a one-page stack needs 4 frames
    let kernel = Kernel::builder()
        .with_total_frames(6)
        .with_stack_pages(1)
        .build();
    let probe = Probe::new();
    let p = probe.clone();

    kernel.register(
        "/bin/greedy",
        program("greedy", move |u, _| {
            let before = u.kernel().stats().processes.live;
            p.record(Event::Error(u.fork().unwrap_err()));
            assert_eq!(u.kernel().stats().processes.live, before);
            assert_eq!(u.kernel().frames().used(), 4);
            u.exit(0)
        }),
    );

    kernel.run_program("/bin/greedy", &["greedy"]).unwrap();
    settle(&kernel);
    assert_eq!(probe.events(), vec![Event::Error(errno::ENOMEM)]);
}

#[test]
fn test_fork_too_many_processes_and_pid_reuse() {
    let kernel = Kernel::builder()
        .with_max_processes(2)
        .with_stack_pages(1)
        .build();
    let probe = Probe::new();
    let p = probe.clone();

    kernel.register(
        "/bin/limited",
        program("limited", move |u, tf| {
            if u.resumed_after_fork(tf) {
                return u.exit(0);
            }

            let first = u.fork().unwrap();
            // The unreaped zombie still holds its pid
            p.record(Event::Error(u.fork().unwrap_err()));
            u.waitpid(first).unwrap();
            let second = u.fork().unwrap();
            p.record(Event::Forked(first));
            p.record(Event::Forked(second));
            u.waitpid(second).unwrap();
            u.exit(0)
        }),
    );

    kernel.run_program("/bin/limited", &["limited"]).unwrap();
    settle(&kernel);

    let events = probe.events();
    assert_eq!(events[0], Event::Error(errno::ENPROC));
    assert_eq!(events[1], events[2], "reaped pid is reused");
}

#[test]
fn test_fork_child_priority_hint() {
    let kernel = kernel();
    let probe = Probe::new();
    let p = probe.clone();

    kernel.register(
        "/bin/prio",
        program("prio", move |u, tf| {
            p.record(ThreadSubstrate::current_priority());
            if u.resumed_after_fork(tf) {
                return u.exit(0);
            }
            let child = u.fork().unwrap();
            u.waitpid(child).unwrap();
            u.exit(0)
        }),
    );

    kernel.run_program("/bin/prio", &["prio"]).unwrap();
    settle(&kernel);
    assert_eq!(probe.events(), vec![Some(0), Some(FORK_PRIORITY_HINT)]);
}

/// Starts `allowed` contexts, then refuses
struct LimitedSubstrate {
    inner: ThreadSubstrate,
    allowed: AtomicUsize,
}

impl ExecutionSubstrate for LimitedSubstrate {
    fn spawn(&self, name: &str, priority: u8, entry: proc_kernel::thread::Entry) -> ProcessResult<()> {
        let granted = self
            .allowed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if granted {
            self.inner.spawn(name, priority, entry)
        } else {
            Err(ProcessError::NoMemory("no threads left".into()))
        }
    }

    fn live(&self) -> usize {
        self.inner.live()
    }
}

#[test]
fn test_fork_spawn_failure_rolls_back() {
    let kernel = Kernel::builder()
        .with_stack_pages(1)
        .with_substrate(Arc::new(LimitedSubstrate {
            inner: ThreadSubstrate::new(),
            allowed: AtomicUsize::new(1),
        }))
        .build();
    let probe = Probe::new();
    let p = probe.clone();

    kernel.register(
        "/bin/lonely",
        program("lonely", move |u, _| {
            p.record(Event::Error(u.fork().unwrap_err()));
            let me = u.process().unwrap().info();
            assert!(me.children.is_empty());
            assert_eq!(u.kernel().stats().processes.live, 1);
            assert_eq!(u.kernel().frames().used(), 4);
            u.exit(0)
        }),
    );

    kernel.run_program("/bin/lonely", &["lonely"]).unwrap();
    settle(&kernel);
    assert_eq!(probe.events(), vec![Event::Error(errno::ENOMEM)]);
}

#[test]
fn test_wait_status_kinds_survive_reaping() {
    let kernel = kernel();
    let probe = Probe::new();
    let p = probe.clone();

    kernel.register(
        "/bin/codes",
        program("codes", move |u, tf| {
            if u.resumed_after_fork(tf) {
                let code = u.load_word(USER_DATA_BASE).unwrap() as i32;
                return u.exit(code);
            }
            for code in [0, 1, 255, -1] {
                u.store_word(USER_DATA_BASE, code as u32).unwrap();
                let child = u.fork().unwrap();
                p.record(u.waitpid(child).unwrap());
            }
            u.exit(0)
        }),
    );

    kernel.run_program("/bin/codes", &["codes"]).unwrap();
    settle(&kernel);

    let statuses = probe.events();
    assert!(statuses.iter().all(|s| s.kind() == WaitKind::Exited));
    let codes: Vec<_> = statuses.iter().filter_map(|s| s.exit_code()).collect();
    assert_eq!(codes, vec![0, 1, 255, -1]);
}
