/*!
 * Kernel
 *
 * Bundles the frame pool, program registry, execution substrate and process
 * table, and starts the first user program.
 */

use crate::config::KernelConfig;
use crate::core::errors::{ProcessError, ProcessResult};
use crate::core::limits::{BOOT_PRIORITY_HINT, PAGE_SIZE};
use crate::core::types::Pid;
use crate::loader::{ProgramImage, ProgramRegistry};
use crate::memory::{AddressSpace, FramePool, FrameStats};
use crate::process::argv;
use crate::process::exec::load_image;
use crate::process::{ProcessTable, TableStats};
use crate::thread::usermode;
use crate::thread::{ExecutionSubstrate, ThreadSubstrate, TrapFrame};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn, Span};

/// Kernel-wide counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelStats {
    pub frames: FrameStats,
    pub processes: TableStats,
    pub threads_live: usize,
    pub programs: usize,
}

/// Shared kernel handle; clones refer to the same kernel
#[derive(Clone)]
pub struct Kernel {
    inner: Arc<KernelInner>,
}

struct KernelInner {
    config: KernelConfig,
    frames: FramePool,
    registry: ProgramRegistry,
    substrate: Arc<dyn ExecutionSubstrate>,
    table: ProcessTable,
}

/// Builder for [`Kernel`]
pub struct KernelBuilder {
    config: KernelConfig,
    registry: Option<ProgramRegistry>,
    substrate: Option<Arc<dyn ExecutionSubstrate>>,
}

impl KernelBuilder {
    pub fn new() -> Self {
        Self {
            config: KernelConfig::default(),
            registry: None,
            substrate: None,
        }
    }

    pub fn with_config(mut self, config: KernelConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_total_frames(mut self, frames: usize) -> Self {
        self.config.total_frames = frames;
        self
    }

    pub fn with_max_processes(mut self, max: usize) -> Self {
        self.config.max_processes = max;
        self
    }

    pub fn with_stack_pages(mut self, pages: usize) -> Self {
        self.config.stack_pages = pages;
        self
    }

    /// Share an existing program registry
    pub fn with_registry(mut self, registry: ProgramRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Replace the thread-per-process substrate
    pub fn with_substrate(mut self, substrate: Arc<dyn ExecutionSubstrate>) -> Self {
        self.substrate = Some(substrate);
        self
    }

    pub fn build(self) -> Kernel {
        let config = self.config;
        info!(
            frames = config.total_frames,
            max_processes = config.max_processes,
            stack_pages = config.stack_pages,
            "kernel initialized"
        );

        Kernel {
            inner: Arc::new(KernelInner {
                frames: FramePool::new(config.total_frames),
                registry: self.registry.unwrap_or_default(),
                substrate: self
                    .substrate
                    .unwrap_or_else(|| Arc::new(ThreadSubstrate::new())),
                table: ProcessTable::new(config.max_processes),
                config,
            }),
        }
    }
}

impl Default for KernelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Kernel {
    pub fn new(config: KernelConfig) -> Self {
        KernelBuilder::new().with_config(config).build()
    }

    pub fn builder() -> KernelBuilder {
        KernelBuilder::new()
    }

    pub fn config(&self) -> &KernelConfig {
        &self.inner.config
    }

    pub fn frames(&self) -> &FramePool {
        &self.inner.frames
    }

    pub fn registry(&self) -> &ProgramRegistry {
        &self.inner.registry
    }

    pub fn substrate(&self) -> &Arc<dyn ExecutionSubstrate> {
        &self.inner.substrate
    }

    pub fn table(&self) -> &ProcessTable {
        &self.inner.table
    }

    /// Install a program at `path`
    pub fn register(&self, path: impl Into<String>, image: ProgramImage) {
        self.inner.registry.register(path, image);
    }

    /// Start `path` as a new parentless process (runprogram)
    ///
    /// `args` is the complete argument vector, `argv[0]` included. Failures
    /// to find, validate or load the program are reported here; once this
    /// returns the process is running.
    #[instrument(skip(self, args), fields(pid))]
    pub fn run_program(&self, path: &str, args: &[&str]) -> ProcessResult<Pid> {
        let image = self.registry().open(path)?;
        image.validate()?;
        let args: Vec<Vec<u8>> = args.iter().map(|a| a.as_bytes().to_vec()).collect();
        argv::check_fits(&args, self.config().stack_pages * PAGE_SIZE)?;

        let record = self.table().create(path, None)?;
        let pid = record.pid();
        Span::current().record("pid", pid);

        let prepared = AddressSpace::create(self.frames(), self.config().stack_pages)
            .map_err(ProcessError::from)
            .and_then(|mut space| {
                let launch = load_image(&mut space, &image, &args)?;
                Ok((space, launch))
            });
        let (space, launch) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(pid, path, error = %e, "program could not be loaded");
                self.table().abandon(record);
                return Err(e);
            }
        };
        record.install_space(space);

        let frame = TrapFrame {
            a0: launch.args.argc as u32,
            a1: launch.args.argv as u32,
            sp: launch.args.sp as u32,
            epc: launch.entry as u32,
            ..TrapFrame::default()
        };
        let kernel = self.clone();
        let process = Arc::clone(&record);
        let spawned = self.substrate().spawn(
            &format!("{}[{}]", path, pid),
            BOOT_PRIORITY_HINT,
            Box::new(move || usermode::run(kernel, process, frame)),
        );
        if let Err(e) = spawned {
            warn!(pid, path, error = %e, "program could not be started");
            self.table().abandon(record);
            return Err(e);
        }

        info!(pid, path, argc = launch.args.argc, "program started");
        Ok(pid)
    }

    /// Block until every process record has been destroyed
    ///
    /// Returns false if `timeout` passed first.
    pub fn wait_quiescent(&self, timeout: Duration) -> bool {
        let drained = self.table().wait_quiescent(timeout);
        if drained {
            info!("all processes reclaimed");
        } else {
            warn!(live = self.table().stats().live, "processes still live after timeout");
        }
        drained
    }

    pub fn stats(&self) -> KernelStats {
        KernelStats {
            frames: self.frames().stats(),
            processes: self.table().stats(),
            threads_live: self.substrate().live(),
            programs: self.registry().len(),
        }
    }
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("config", &self.inner.config)
            .field("frames", &self.inner.frames)
            .field("table", &self.inner.table)
            .finish_non_exhaustive()
    }
}
