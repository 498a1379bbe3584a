/*!
 * Process Exec
 *
 * Replace the caller's image in place. Everything up to and including the
 * creation of the new address space can fail back to the caller; once the
 * new address space is installed the old image is gone and any failure kills
 * the process.
 */

use super::argv::{self, ArgvLayout};
use super::exit;
use super::status::WaitStatus;
use crate::core::errors::{ProcessError, ProcessResult};
use crate::core::limits::{PAGE_SIZE, PATH_MAX, SIGKILL};
use crate::core::types::Address;
use crate::loader::ProgramImage;
use crate::memory::{copyinstr, AddressSpace};
use crate::thread::usermode::enter_new_process;
use crate::thread::{ThreadExit, UserThread};
use tracing::{error, info, instrument, Span};

/// A loaded program ready to enter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Launch {
    pub entry: Address,
    pub args: ArgvLayout,
}

/// Load `image` into `space`, define its stack and marshal `args` onto it
pub(crate) fn load_image(
    space: &mut AddressSpace,
    image: &ProgramImage,
    args: &[Vec<u8>],
) -> ProcessResult<Launch> {
    let entry = image.load_into(space)?;
    let stack_top = space.define_stack()?;
    let args = argv::marshal(space, stack_top, args)?;
    Ok(Launch { entry, args })
}

/// `execv(path, argv)`
///
/// Returns only on failure before the switch; otherwise the calling code is
/// gone and the token hands control to the new program.
#[instrument(skip(thread), fields(pid, path))]
pub fn sys_execv(
    thread: &mut UserThread,
    path_ptr: Address,
    argv_ptr: Address,
) -> ProcessResult<ThreadExit> {
    let record = thread.current();
    let kernel = thread.kernel().clone();
    Span::current().record("pid", record.pid());

    let (path, args) = thread.with_space(|space| -> ProcessResult<_> {
        let path = copyinstr(space, path_ptr, PATH_MAX)?;
        let args = argv::copyin_args(space, argv_ptr)?;
        Ok((path, args))
    })?;
    // Registry paths are UTF-8, so no other path can name a program
    let path = String::from_utf8(path)
        .map_err(|e| ProcessError::NotFound(String::from_utf8_lossy(e.as_bytes()).into_owned()))?;
    Span::current().record("path", path.as_str());

    let image = kernel.registry().open(&path)?;
    image.validate()?;
    argv::check_fits(&args, kernel.config().stack_pages * PAGE_SIZE)?;
    let space = AddressSpace::create(kernel.frames(), kernel.config().stack_pages)?;

    // Point of no return
    if let Some(mut old) = record.install_space(space) {
        old.deactivate();
        old.destroy();
    }
    thread.with_space(AddressSpace::activate);

    match thread.with_space(|space| load_image(space, &image, &args)) {
        Ok(launch) => {
            info!(pid = record.pid(), path = %path, argc = launch.args.argc, "exec");
            Ok(enter_new_process(
                thread,
                launch.args.argc,
                launch.args.argv,
                launch.args.sp,
                launch.entry,
            ))
        }
        Err(e) => {
            error!(pid = record.pid(), path = %path, error = %e, "exec failed after replacing the image");
            Ok(exit::terminate(thread, WaitStatus::signaled(SIGKILL)))
        }
    }
}
