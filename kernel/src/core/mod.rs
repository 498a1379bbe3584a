/*!
 * Core Module
 * Fundamental kernel types, limits, identity allocation and error handling
 */

pub mod errors;
pub mod id;
pub mod limits;
pub mod types;

// Re-export for convenience
pub use errors::*;
pub use id::PidAllocator;
pub use types::*;
