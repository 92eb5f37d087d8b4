//! Viewer-side state: smoothing authoritative snapshots for rendering

pub mod interpolation;

pub use interpolation::{Interpolator, RenderedPose};
