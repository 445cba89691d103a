//! Block-luminance motion detection.
//!
//! Frames are reduced to a coarse grid of block averages, compared with
//! the previous committed grid under a detection mask, and confirmed
//! over consecutive frames before a motion event fires.
//!
//! ```text
//! sensor → BlockAverager → FrameStore(current, previous) → MotionClassifier
//!                                            ↑
//!                                         MaskGrid
//! ```

mod averager;
mod classifier;
mod grid;
mod mask;
mod store;

pub use averager::BlockAverager;
pub use classifier::{count_changed_blocks, Classification, MotionClassifier};
pub use grid::BlockGrid;
pub use mask::MaskGrid;
pub use store::FrameStore;
