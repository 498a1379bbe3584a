/*!
 * Memory Module
 * Physical frame accounting, user address spaces and user/kernel copy primitives
 */

pub mod address_space;
pub mod copy;
pub mod frames;
pub mod types;

// Re-export for convenience
pub use address_space::{AddressSpace, Protection};
pub use copy::{copyin, copyin_word, copyinstr, copyout, copyout_word};
pub use frames::FramePool;
pub use types::*;
