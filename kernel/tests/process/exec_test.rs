/*!
 * Exec Tests
 * Argument marshaling, image replacement and failure handling
 */

use super::common::{kernel, program, settle, Probe};
use pretty_assertions::assert_eq;
use proc_kernel::core::limits::{
    PAGE_SIZE, PATH_MAX, SIGKILL, STACK_ALIGN, USERSTACK, USER_DATA_BASE, USER_TEXT_BASE,
};
use proc_kernel::{errno, Address, Errno, Kernel, Pid, ProcessError, ProgramImage, TrapFrame, UserThread, WaitStatus};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
struct Entered {
    args: Vec<String>,
    argc: u32,
    aligned: bool,
    null_terminated: bool,
    sp_is_argv: bool,
}

fn entered(u: &mut UserThread, tf: &TrapFrame) -> Entered {
    let argv = tf.a1 as Address;
    Entered {
        args: u.args(tf).unwrap(),
        argc: tf.a0,
        aligned: tf.sp as usize % STACK_ALIGN == 0,
        null_terminated: u.load_word(argv + tf.a0 as usize * 4) == Ok(0),
        sp_is_argv: tf.sp == tf.a1,
    }
}

/// Register /bin/show, which reports how it was entered
fn register_show(kernel: &Kernel, probe: &Probe<Entered>) {
    let p = probe.clone();
    kernel.register(
        "/bin/show",
        program("show", move |u, tf| {
            p.record(entered(u, tf));
            u.exit(0)
        }),
    );
}

fn run_exec(args: Vec<String>) -> Entered {
    let kernel = kernel();
    let probe = Probe::new();
    register_show(&kernel, &probe);
    kernel.register(
        "/bin/launcher",
        program("launcher", move |u, _| {
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            match u.execv("/bin/show", &args) {
                Ok(token) => token,
                Err(errno) => u.exit(errno),
            }
        }),
    );

    kernel.run_program("/bin/launcher", &["launcher"]).unwrap();
    settle(&kernel);
    probe.events().pop().expect("exec did not reach /bin/show")
}

#[test]
fn test_exec_with_arguments() {
    let seen = run_exec(vec!["show".into(), "one".into(), "two".into()]);
    assert_eq!(
        seen,
        Entered {
            args: vec!["show".into(), "one".into(), "two".into()],
            argc: 3,
            aligned: true,
            null_terminated: true,
            sp_is_argv: true,
        }
    );
}

#[test]
fn test_exec_without_arguments() {
    let seen = run_exec(Vec::new());
    assert_eq!(seen.argc, 0);
    assert!(seen.args.is_empty());
    assert!(seen.aligned && seen.null_terminated && seen.sp_is_argv);
}

#[test]
fn test_exec_single_argument() {
    let seen = run_exec(vec!["show".into()]);
    assert_eq!(seen.args, vec!["show".to_string()]);
    assert_eq!(seen.argc, 1);
    assert!(seen.aligned && seen.null_terminated && seen.sp_is_argv);
}

#[test]
fn test_exec_many_arguments() {
    let args: Vec<String> = (0..200).map(|i| "x".repeat(i % 7 + 1)).collect();
    let seen = run_exec(args.clone());
    assert_eq!(seen.args, args);
    assert!(seen.aligned && seen.null_terminated);
}

#[test]
fn test_bootstrap_arguments() {
    let kernel = kernel();
    let probe = Probe::new();
    register_show(&kernel, &probe);

    kernel.run_program("/bin/show", &["show", "-v"]).unwrap();
    settle(&kernel);

    let seen = probe.events().pop().unwrap();
    assert_eq!(seen.args, vec!["show".to_string(), "-v".to_string()]);
    assert!(seen.aligned && seen.null_terminated);
}

#[test]
fn test_exec_preserves_identity() {
    let kernel = kernel();
    let probe: Probe<(Pid, Pid)> = Probe::new();
    let p = probe.clone();

    kernel.register(
        "/bin/who",
        program("who", move |u, _| {
            let ids = (u.getpid(), u.getppid());
            p.record(ids);
            u.exit(5)
        }),
    );
    let p = probe.clone();
    kernel.register(
        "/bin/parent",
        program("parent", move |u, tf| {
            if u.resumed_after_fork(tf) {
                p.record((u.getpid(), u.getppid()));
                return u.execv("/bin/who", &["who"]).unwrap_or_else(|e| u.exit(e));
            }
            let child = u.fork().unwrap();
            let status = u.waitpid(child).unwrap();
            assert_eq!(status, WaitStatus::exited(5));
            u.exit(0)
        }),
    );

    kernel.run_program("/bin/parent", &["parent"]).unwrap();
    settle(&kernel);

    let events = probe.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0], events[1]);
}

#[test]
fn test_exec_failures_leave_caller_intact() {
    let kernel = kernel();
    let probe: Probe<Result<u32, Errno>> = Probe::new();
    let p = probe.clone();

    // Entry outside any executable segment
    kernel.register(
        "/bin/broken",
        ProgramImage::builder("broken", Arc::new(|u: &mut UserThread, _: &TrapFrame| u.exit(0)))
            .data_segment(USER_DATA_BASE, Vec::new(), PAGE_SIZE)
            .entry(USER_DATA_BASE)
            .build(),
    );
    kernel.register(
        "/bin/stubborn",
        program("stubborn", move |u, _| {
            u.store_word(USER_DATA_BASE, 1234).unwrap();

            p.record(u.execv("/bin/missing", &["missing"]).map(|_| 0));
            p.record(u.execv("/bin/broken", &["broken"]).map(|_| 0));

            let long_path = "/".repeat(PATH_MAX + 1);
            p.record(u.execv(&long_path, &[]).map(|_| 0));

            // Bad path and argv pointers
            let argv = u.push_argv(&[]).unwrap();
            p.record(u.execv_raw(0x10, argv).map(|_| 0));
            let path = u.push_cstr("/bin/missing").unwrap();
            p.record(u.execv_raw(path, 0).map(|_| 0));

            // Still the same program with the same memory
            p.record(u.load_word(USER_DATA_BASE));
            u.exit(0)
        }),
    );

    kernel.run_program("/bin/stubborn", &["stubborn"]).unwrap();
    settle(&kernel);

    assert_eq!(
        probe.events(),
        vec![
            Err(errno::ENOENT),
            Err(errno::ENOEXEC),
            Err(errno::ENAMETOOLONG),
            Err(errno::EFAULT),
            Err(errno::EFAULT),
            Ok(1234),
        ]
    );
}

#[test]
fn test_exec_argument_block_too_big() {
    // Default stacks are large enough to stage the strings in user memory
    let kernel = Kernel::builder().with_total_frames(2048).build();
    let probe = Probe::new();
    let p = probe.clone();

    kernel.register(
        "/bin/greedy",
        program("greedy", move |u, _| {
            // Two strings that fit alone exceed the argument block together
            let big = "b".repeat(40_000);
            p.record(u.execv("/bin/true", &[&big, &big]).map(|_| 0));
            u.exit(0)
        }),
    );
    kernel.register("/bin/true", program("true", |u, _| u.exit(0)));

    kernel.run_program("/bin/greedy", &["greedy"]).unwrap();
    settle(&kernel);
    assert_eq!(probe.events(), vec![Err::<u32, Errno>(errno::E2BIG)]);
}

#[test]
fn test_exec_arguments_larger_than_stack() {
    // Four stack pages: 20000 bytes pass the argument limit but cannot fit
    let kernel = kernel();
    let probe: Probe<Result<u32, Errno>> = Probe::new();
    let p = probe.clone();

    kernel.register("/bin/true", program("true", |u, _| u.exit(0)));
    kernel.register(
        "/bin/staging",
        ProgramImage::builder(
            "staging",
            Arc::new(move |u: &mut UserThread, _: &TrapFrame| {
                let path = USER_DATA_BASE + 64;
                let arg = USER_DATA_BASE + PAGE_SIZE;
                u.store(path, b"/bin/true\0").unwrap();
                let mut big = vec![b'a'; 20_000];
                big.push(0);
                u.store(arg, &big).unwrap();
                u.store_word(USER_DATA_BASE, arg as u32).unwrap();
                u.store_word(USER_DATA_BASE + 4, 0).unwrap();
                u.store_word(USER_DATA_BASE + 128, 77).unwrap();

                p.record(u.execv_raw(path, USER_DATA_BASE).map(|_| 0));
                p.record(u.load_word(USER_DATA_BASE + 128));
                u.exit(0)
            }),
        )
        .text_segment(USER_TEXT_BASE, PAGE_SIZE)
        .data_segment(USER_DATA_BASE, Vec::new(), 8 * PAGE_SIZE)
        .build(),
    );

    kernel.run_program("/bin/staging", &["staging"]).unwrap();
    settle(&kernel);
    assert_eq!(probe.events(), vec![Err(errno::E2BIG), Ok(77)]);

    let big = "a".repeat(20_000);
    assert!(matches!(
        kernel.run_program("/bin/true", &[&big]),
        Err(ProcessError::ArgumentListTooLong { .. })
    ));
    assert_eq!(kernel.stats().processes.live, 0);
}

#[test]
fn test_exec_rejects_non_utf8_path() {
    let kernel = kernel();
    let probe: Probe<Result<u32, Errno>> = Probe::new();
    let p = probe.clone();

    // What a lossy conversion of the path below would name
    kernel.register("/bin/\u{FFFD}", program("replacement", |u, _| u.exit(0)));
    kernel.register(
        "/bin/bytes",
        program("bytes", move |u, _| {
            let path = u.push_bytes(&[b'/', b'b', b'i', b'n', b'/', 0xff, 0]).unwrap();
            let argv = u.push_argv(&[]).unwrap();
            p.record(u.execv_raw(path, argv).map(|_| 0));
            u.exit(0)
        }),
    );

    kernel.run_program("/bin/bytes", &["bytes"]).unwrap();
    settle(&kernel);
    assert_eq!(probe.events(), vec![Err(errno::ENOENT)]);
}

#[test]
fn test_exec_failure_after_switch_kills_process() {
    let kernel = kernel();
    let probe = Probe::new();
    let p = probe.clone();

    // Loads fine, but its data sits where the stack has to go
    kernel.register(
        "/bin/clash",
        ProgramImage::builder("clash", Arc::new(|u: &mut UserThread, _: &TrapFrame| u.exit(0)))
            .text_segment(USER_TEXT_BASE, PAGE_SIZE)
            .data_segment(USERSTACK - PAGE_SIZE, Vec::new(), PAGE_SIZE)
            .build(),
    );
    kernel.register(
        "/bin/parent",
        program("parent", move |u, tf| {
            if u.resumed_after_fork(tf) {
                let result = u.execv("/bin/clash", &["clash"]);
                // Never reached: the old image is gone either way
                return result.unwrap_or_else(|e| u.exit(100 + e));
            }
            let child = u.fork().unwrap();
            p.record(u.waitpid(child).unwrap());
            u.exit(0)
        }),
    );

    kernel.run_program("/bin/parent", &["parent"]).unwrap();
    settle(&kernel);
    assert_eq!(probe.events(), vec![WaitStatus::signaled(SIGKILL)]);
}

#[test]
fn test_exec_releases_old_image() {
    let kernel = kernel();
    let probe = Probe::new();
    let p = probe.clone();

    kernel.register(
        "/bin/measure",
        program("measure", move |u, _| {
            p.record(u.kernel().frames().used());
            u.exit(0)
        }),
    );
    let p = probe.clone();
    kernel.register(
        "/bin/big",
        ProgramImage::builder("big", Arc::new(move |u: &mut UserThread, _: &TrapFrame| {
            p.record(u.kernel().frames().used());
            u.execv("/bin/measure", &["measure"]).unwrap_or_else(|e| u.exit(e))
        }))
        .text_segment(USER_TEXT_BASE, PAGE_SIZE)
        .data_segment(USER_DATA_BASE, Vec::new(), 16 * PAGE_SIZE)
        .build(),
    );

    kernel.run_program("/bin/big", &["big"]).unwrap();
    settle(&kernel);

    // stack 4 + root 1 + text 1 + data 16, then data shrinks to 1 page
    assert_eq!(probe.events(), vec![22, 7]);
}

#[test]
fn test_run_program_errors() {
    let kernel = Kernel::builder().with_total_frames(3).build();
    kernel.register("/bin/true", program("true", |u, _| u.exit(0)));
    kernel.register(
        "/bin/empty",
        ProgramImage::builder("empty", Arc::new(|u: &mut UserThread, _: &TrapFrame| u.exit(0))).build(),
    );

    assert_eq!(
        kernel.run_program("/bin/none", &[]),
        Err(ProcessError::NotFound("/bin/none".into()))
    );
    assert!(matches!(
        kernel.run_program("/bin/empty", &[]),
        Err(ProcessError::NotExecutable(_))
    ));
    assert!(matches!(
        kernel.run_program("/bin/true", &["true"]),
        Err(ProcessError::NoMemory(_))
    ));

    let stats = kernel.stats();
    assert_eq!(stats.programs, 2);
    assert_eq!(stats.processes.live, 0);
    assert_eq!(stats.frames.used_frames, 0);
}
