/*!
 * Threads
 * Trap frames, the execution substrate and the user-mode side of a process
 */

pub mod substrate;
pub mod trapframe;
pub mod usermode;

pub use substrate::{Entry, ExecutionSubstrate, ThreadSubstrate};
pub use trapframe::TrapFrame;
pub use usermode::{ThreadExit, UserText, UserThread};
