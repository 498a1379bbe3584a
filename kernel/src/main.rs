/*!
 * Process Kernel - Demo Entry Point
 *
 * Boots a kernel, runs a small shell that forks and execs, waits until every
 * process has been reclaimed and prints the kernel counters as JSON.
 */

use miette::{miette, IntoDiagnostic, Result};
use proc_kernel::core::limits::USER_DATA_BASE;
use proc_kernel::{init_tracing, Kernel, KernelConfig, ProgramImage, TrapFrame, UserText, UserThread};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Prints its arguments
fn echo() -> UserText {
    Arc::new(|u: &mut UserThread, tf: &TrapFrame| match u.args(tf) {
        Ok(args) => {
            info!(pid = u.getpid(), output = %args.get(1..).unwrap_or_default().join(" "), "echo");
            u.exit(0)
        }
        Err(errno) => u.exit(errno),
    })
}

/// Sleeps for argv[1] milliseconds, outliving the shell
fn sleep() -> UserText {
    Arc::new(|u: &mut UserThread, tf: &TrapFrame| {
        let millis = u
            .args(tf)
            .ok()
            .and_then(|args| args.get(1).and_then(|ms| ms.parse().ok()))
            .unwrap_or(10);
        std::thread::sleep(Duration::from_millis(millis));
        info!(pid = u.getpid(), ppid = u.getppid(), "sleeper done");
        u.exit(0)
    })
}

/// Runs echo in a child and waits for it, then leaves a sleeper behind
fn shell() -> UserText {
    Arc::new(|u: &mut UserThread, tf: &TrapFrame| {
        if u.resumed_after_fork(tf) {
            // The parent stored which program this child should become
            let which = u.load_word(USER_DATA_BASE).unwrap_or(0);
            let pid = u.getpid();
            let result = if which == 0 {
                let greeting = format!("from pid {}", pid);
                u.execv("/bin/echo", &["echo", "hello", &greeting])
            } else {
                u.execv("/bin/sleep", &["sleep", "20"])
            };
            return match result {
                Ok(token) => token,
                Err(errno) => {
                    error!(pid, errno, "exec failed");
                    u.exit(1)
                }
            };
        }

        for which in 0..2u32 {
            if u.store_word(USER_DATA_BASE, which).is_err() {
                return u.exit(1);
            }
            match u.fork() {
                Ok(child) if which == 0 => match u.waitpid(child) {
                    Ok(status) => info!(child, %status, "child finished"),
                    Err(errno) => warn!(child, errno, "waitpid failed"),
                },
                Ok(child) => info!(child, "leaving child to run on"),
                Err(errno) => {
                    error!(errno, "fork failed");
                    return u.exit(1);
                }
            }
        }
        u.exit(0)
    })
}

fn main() -> Result<()> {
    let config = KernelConfig::from_env();
    init_tracing(config.trace_json);

    let kernel = Kernel::new(config);
    kernel.register("/bin/sh", ProgramImage::simple("sh", shell()));
    kernel.register("/bin/echo", ProgramImage::simple("echo", echo()));
    kernel.register("/bin/sleep", ProgramImage::simple("sleep", sleep()));

    let pid = kernel.run_program("/bin/sh", &["sh"])?;
    info!(pid, "shell started");

    if !kernel.wait_quiescent(Duration::from_secs(10)) {
        return Err(miette!("processes still running after 10s"));
    }

    let stats = serde_json::to_string_pretty(&kernel.stats()).into_diagnostic()?;
    println!("{}", stats);
    Ok(())
}
