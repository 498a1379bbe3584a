/*!
 * Program Loader
 * Program images and the registry exec resolves paths against
 */

pub mod image;
pub mod registry;

pub use image::{LoaderError, LoaderResult, ProgramImage, ProgramImageBuilder, Segment};
pub use registry::ProgramRegistry;
