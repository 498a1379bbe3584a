/*!
 * User Mode
 *
 * A process's user code is a routine mapped into its address space. The
 * routine runs on the process's own context and enters the kernel only
 * through [`UserThread::syscall`] and the wrappers built on it.
 *
 * A routine gives up its context by returning a [`ThreadExit`]. Only `_exit`
 * and a successful `execv` produce one, so user code cannot fall off the end
 * of a program without terminating or replacing it. A routine that panics
 * has faulted and the process is killed with `SIGSEGV`, like a jump to
 * unmapped code.
 *
 * # Fork
 *
 * A forked child starts the routine mapped at the parent's resume address
 * with a trap frame whose `v0` is 0. Routines tell the two apart with
 * [`UserThread::resumed_after_fork`] and by whatever the parent stored in
 * memory before forking.
 */

use super::trapframe::TrapFrame;
use crate::core::errno;
use crate::core::limits::{ARG_MAX, SIGSEGV, STRING_ALIGN, USER_PTR_SIZE};
use crate::core::types::{Address, Errno, ExitCode, Pid};
use crate::kernel::Kernel;
use crate::memory::{copyin, copyin_word, copyinstr, copyout, copyout_word, AddressSpace};
use crate::process::exit;
use crate::process::status::WaitStatus;
use crate::process::ProcessRecord;
use crate::syscall::numbers::*;
use crate::syscall::{dispatch, Trap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{trace, warn};

/// User code mapped at an address
pub type UserText = Arc<dyn Fn(&mut UserThread, &TrapFrame) -> ThreadExit + Send + Sync>;

/// Proof that user code gave up its context
#[must_use = "user code must return the token to give up its context"]
#[derive(Debug)]
pub struct ThreadExit {
    _private: (),
}

impl ThreadExit {
    pub(crate) fn new() -> Self {
        Self { _private: () }
    }
}

/// The user-mode side of a running process
pub struct UserThread {
    kernel: Kernel,
    process: Option<Arc<ProcessRecord>>,
    frame: TrapFrame,
    reentry: bool,
}

impl UserThread {
    fn new(kernel: Kernel, process: Arc<ProcessRecord>, frame: TrapFrame) -> Self {
        Self {
            kernel,
            process: Some(process),
            frame,
            reentry: false,
        }
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    /// Attached process, until it exits
    pub fn process(&self) -> Option<&Arc<ProcessRecord>> {
        self.process.as_ref()
    }

    /// Current register state
    pub fn frame(&self) -> &TrapFrame {
        &self.frame
    }

    pub fn pc(&self) -> Address {
        self.frame.epc as Address
    }

    pub fn sp(&self) -> Address {
        self.frame.sp as Address
    }

    pub fn set_sp(&mut self, sp: Address) {
        self.frame.sp = sp as u32;
    }

    /// Whether this routine was entered by a fork rather than exec
    pub fn resumed_after_fork(&self, tf: &TrapFrame) -> bool {
        self.with_space(|space| space.entry()) != Some(tf.epc as Address)
    }

    pub(crate) fn current(&self) -> Arc<ProcessRecord> {
        match &self.process {
            Some(record) => Arc::clone(record),
            None => panic!("kernel entered from a context with no process"),
        }
    }

    pub(crate) fn detach(&mut self) -> Option<Arc<ProcessRecord>> {
        self.process.take()
    }

    pub(crate) fn with_space<R>(&self, f: impl FnOnce(&mut AddressSpace) -> R) -> R {
        let record = self.current();
        match record.with_space(f) {
            Some(result) => result,
            None => panic!("process {} has no address space", record.pid()),
        }
    }

    // ------------------------------------------------------------------------
    // User memory
    // ------------------------------------------------------------------------

    pub fn load(&self, addr: Address, buf: &mut [u8]) -> Result<(), Errno> {
        self.with_space(|space| copyin(space, addr, buf))
            .map_err(|e| e.errno())
    }

    pub fn store(&mut self, addr: Address, bytes: &[u8]) -> Result<(), Errno> {
        self.with_space(|space| copyout(space, addr, bytes))
            .map_err(|e| e.errno())
    }

    pub fn load_word(&self, addr: Address) -> Result<u32, Errno> {
        self.with_space(|space| copyin_word(space, addr))
            .map_err(|e| e.errno())
    }

    pub fn store_word(&mut self, addr: Address, value: u32) -> Result<(), Errno> {
        self.with_space(|space| copyout_word(space, addr, value))
            .map_err(|e| e.errno())
    }

    pub fn load_cstr(&self, addr: Address) -> Result<String, Errno> {
        self.with_space(|space| copyinstr(space, addr, ARG_MAX))
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .map_err(|e| e.errno())
    }

    /// Reserve space on the user stack and fill it with `bytes`
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Result<Address, Errno> {
        let padded = bytes.len().div_ceil(STRING_ALIGN) * STRING_ALIGN;
        let sp = self.sp().checked_sub(padded).ok_or(errno::EFAULT)?;
        let mut block = bytes.to_vec();
        block.resize(padded, 0);
        self.store(sp, &block)?;
        self.set_sp(sp);
        Ok(sp)
    }

    /// Push a NUL-terminated copy of `s`
    pub fn push_cstr(&mut self, s: &str) -> Result<Address, Errno> {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        self.push_bytes(&bytes)
    }

    /// Push the strings and a NULL-terminated pointer array for them
    pub fn push_argv(&mut self, args: &[&str]) -> Result<Address, Errno> {
        let mut pointers = vec![0u32; args.len() + 1];
        for (i, arg) in args.iter().enumerate().rev() {
            pointers[i] = self.push_cstr(arg)? as u32;
        }
        let table: Vec<u8> = pointers.iter().flat_map(|p| p.to_le_bytes()).collect();
        self.push_bytes(&table)
    }

    /// Arguments a program was entered with (`a0 = argc`, `a1 = argv`)
    pub fn args(&self, tf: &TrapFrame) -> Result<Vec<String>, Errno> {
        (0..tf.a0 as usize)
            .map(|i| {
                let ptr = self.load_word(tf.a1 as Address + i * USER_PTR_SIZE)?;
                self.load_cstr(ptr as Address)
            })
            .collect()
    }

    // ------------------------------------------------------------------------
    // System calls
    // ------------------------------------------------------------------------

    /// Trap into the kernel with call `number` and arguments `a0..a2`
    pub fn syscall(&mut self, number: u32, args: [u32; 3]) -> Trap {
        let mut tf = self.frame;
        tf.v0 = number;
        tf.a0 = args[0];
        tf.a1 = args[1];
        tf.a2 = args[2];

        let trap = dispatch(self, &mut tf);
        if let Trap::Resume = trap {
            self.frame = tf;
        }
        trap
    }

    /// Result registers of the last system call that returned
    pub fn last_result(&self) -> Result<u32, Errno> {
        self.frame.result()
    }

    fn call(&mut self, number: u32, args: [u32; 3]) -> Result<u32, Errno> {
        match self.syscall(number, args) {
            Trap::Resume => self.last_result(),
            Trap::Exit(_) => panic!("system call {} gave up the context", number),
        }
    }

    pub fn fork(&mut self) -> Result<Pid, Errno> {
        self.call(SYS_FORK, [0; 3])
    }

    pub fn getpid(&mut self) -> Pid {
        self.call(SYS_GETPID, [0; 3]).unwrap_or_default()
    }

    /// Parent pid, or 0 once the parent is gone
    pub fn getppid(&mut self) -> Pid {
        self.call(SYS_GETPPID, [0; 3]).unwrap_or_default()
    }

    pub fn exit(&mut self, code: ExitCode) -> ThreadExit {
        match self.syscall(SYS_EXIT, [code as u32, 0, 0]) {
            Trap::Exit(token) => token,
            Trap::Resume => panic!("_exit returned"),
        }
    }

    /// `execv` with a user path pointer and argv array
    pub fn execv_raw(&mut self, path: Address, argv: Address) -> Result<ThreadExit, Errno> {
        match self.syscall(SYS_EXECV, [path as u32, argv as u32, 0]) {
            Trap::Exit(token) => Ok(token),
            Trap::Resume => match self.last_result() {
                Err(errno) => Err(errno),
                Ok(_) => panic!("execv returned success"),
            },
        }
    }

    /// Stage `path` and `args` on the stack and exec
    pub fn execv(&mut self, path: &str, args: &[&str]) -> Result<ThreadExit, Errno> {
        let saved_sp = self.sp();
        let result = self
            .push_argv(args)
            .and_then(|argv| Ok((self.push_cstr(path)?, argv)))
            .and_then(|(path, argv)| self.execv_raw(path, argv));
        if result.is_err() {
            self.set_sp(saved_sp);
        }
        result
    }

    pub fn waitpid_raw(&mut self, pid: Pid, status: Address, options: i32) -> Result<Pid, Errno> {
        self.call(SYS_WAITPID, [pid, status as u32, options as u32])
    }

    /// Wait for child `pid` and return its status
    pub fn waitpid(&mut self, pid: Pid) -> Result<WaitStatus, Errno> {
        let saved_sp = self.sp();
        let result = self.push_bytes(&[0; USER_PTR_SIZE]).and_then(|slot| {
            self.waitpid_raw(pid, slot, 0)?;
            self.load_word(slot)
        });
        self.set_sp(saved_sp);
        result.map(|raw| WaitStatus::from_raw(raw as i32))
    }
}

impl std::fmt::Debug for UserThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserThread")
            .field("process", &self.process.as_ref().map(|p| p.pid()))
            .field("frame", &self.frame)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Entry points
// ============================================================================

/// Run `process` on the calling context from `frame` until it terminates
pub(crate) fn run(kernel: Kernel, process: Arc<ProcessRecord>, frame: TrapFrame) {
    process.with_space(AddressSpace::activate);
    let mut thread = UserThread::new(kernel, process, frame);

    while let Some(process) = thread.process.clone() {
        let tf = thread.frame;
        let text = process
            .with_space(|space| space.text_at(tf.epc as Address))
            .flatten();
        drop(process);

        let _exit = match text {
            Some(text) => match panic::catch_unwind(AssertUnwindSafe(|| text(&mut thread, &tf))) {
                Ok(token) => token,
                Err(_) => {
                    thread.reentry = false;
                    if thread.process.is_none() {
                        break;
                    }
                    warn!(pid = thread.process().map(|p| p.pid()), pc = tf.epc, "user code faulted");
                    exit::terminate(&mut thread, WaitStatus::signaled(SIGSEGV))
                }
            },
            None => {
                warn!(pid = thread.process().map(|p| p.pid()), pc = tf.epc, "no code at resume address");
                exit::terminate(&mut thread, WaitStatus::signaled(SIGSEGV))
            }
        };

        // Only a successful exec asks to run again
        if !std::mem::take(&mut thread.reentry) {
            break;
        }
    }

    debug_assert!(thread.process.is_none(), "user code returned without exiting");
    trace!("context finished");
}

/// Start a new program on the calling context (enter_new_process)
pub(crate) fn enter_new_process(
    thread: &mut UserThread,
    argc: usize,
    argv: Address,
    sp: Address,
    entry: Address,
) -> ThreadExit {
    thread.frame = TrapFrame {
        a0: argc as u32,
        a1: argv as u32,
        sp: sp as u32,
        epc: entry as u32,
        ..TrapFrame::default()
    };
    thread.reentry = true;
    ThreadExit::new()
}

/// Entry of a forked child's context (enter_forked_process)
///
/// The child returns 0 from fork and resumes after the system call.
pub(crate) fn enter_forked_process(kernel: Kernel, process: Arc<ProcessRecord>, mut tf: TrapFrame) {
    tf.complete(Ok(0));
    run(kernel, process, tf);
}
