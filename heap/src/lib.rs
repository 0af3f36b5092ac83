mod allocator;
mod flags;
mod heap;

pub use allocator::{SegmentAllocator, SystemAllocator};
pub use flags::CellFlags;
pub use heap::*;
