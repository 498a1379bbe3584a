/*!
 * System Calls
 * Call numbers and the trap dispatcher
 */

pub mod dispatch;
pub mod numbers;

pub use dispatch::{dispatch, Trap};
