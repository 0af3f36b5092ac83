use std::{alloc::Layout, ptr::NonNull};

/// Source of raw memory for heap segments.
///
/// The heap asks for one segment at a time and hands every segment back
/// through [`SegmentAllocator::deallocate`] when it is dropped. Returning
/// `None` makes the heap report out-of-memory instead of aborting.
pub trait SegmentAllocator {
    fn allocate(&mut self, layout: Layout) -> Option<NonNull<u8>>;

    /// # Safety
    /// `ptr` must come from a previous call to `allocate` on this allocator
    /// with the same `layout`, and must not be used afterwards.
    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, layout: Layout);
}

/// Allocator backed by the global Rust allocator.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl SegmentAllocator for SystemAllocator {
    fn allocate(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        if layout.size() == 0 {
            return None;
        }
        // SAFETY: layout has a non-zero size
        NonNull::new(unsafe { std::alloc::alloc(layout) })
    }

    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: guaranteed by the caller
        unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) }
    }
}
