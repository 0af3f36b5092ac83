//! Segmented cell heap with a mark-sweep collector.
//!
//! Cells live in fixed-size segments obtained from a [`SegmentAllocator`].
//! Unused cells are threaded through a free list. When the free list runs dry
//! the collector marks everything reachable from a [`RootProvider`] and sweeps
//! the rest back onto the free list, growing the heap by one segment when a
//! collection does not recover enough cells.
//!
//! This crate is decoupled from any specific object model. Consumers provide:
//! - A [`HeapCell`] type that knows its outgoing edges and its vacant form.
//! - A [`RootProvider`] to supply live roots at GC time.

use std::{alloc::Layout, mem, ptr::NonNull};

use thiserror::Error;

use crate::{CellFlags, SegmentAllocator, SystemAllocator};

// ── Public API types ──────────────────────────────────────────────────

/// Stable index of a cell in the heap.
///
/// Cells never move, so a `CellRef` stays valid as long as the cell it names
/// is reachable from a root.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct CellRef(u32);

impl CellRef {
    #[inline(always)]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline(always)]
    const fn from_index(index: usize) -> Self {
        Self(index as u32)
    }
}

/// A cell type that can live in a [`Heap`].
pub trait HeapCell: Sized {
    /// A free-list cell pointing at the next free cell.
    fn vacant(next: Option<CellRef>) -> Self;

    /// `Some` link for vacant cells, `None` for the tail and for live cells.
    fn next_vacant(&self) -> Option<CellRef>;

    fn is_vacant(&self) -> bool;

    fn flags(&self) -> CellFlags;

    fn set_flags(&mut self, flags: CellFlags);

    /// Calls `visitor` for every cell this one references.
    fn trace(&self, visitor: &mut dyn FnMut(CellRef));
}

/// Consumers implement this to provide GC roots.
///
/// Called whenever the heap needs to collect: from the registers, symbol
/// table, and temporary root stacks of whoever owns the heap.
pub trait RootProvider {
    fn visit_roots(&self, visitor: &mut dyn FnMut(CellRef));
}

/// Errors surfaced by the heap.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HeapError {
    #[error("out of memory: {segments} segments of {segment_size} cells exhausted")]
    OutOfMemory { segments: usize, segment_size: usize },
    /// A payload buffer (string or vector storage) larger than allowed.
    #[error("out of memory: cannot allocate a buffer of {requested} elements (limit {limit})")]
    BufferTooLarge { requested: usize, limit: usize },
    #[error("invalid heap settings: {0}")]
    InvalidSettings(&'static str),
}

/// Outcome of one collection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GcStats {
    /// Previously live cells returned to the free list.
    pub collected: usize,
    /// Cells that survived.
    pub live: usize,
    /// Free cells after the sweep.
    pub free: usize,
    pub segments: usize,
}

// ── Heap settings ─────────────────────────────────────────────────────

/// Configuration for the segmented heap.
#[derive(Debug, Clone)]
pub struct HeapSettings {
    /// Number of cells in one segment.
    pub segment_size: usize,
    /// Hard cap on the number of segments.
    pub max_segments: usize,
    /// Segments allocated when the heap is created.
    pub initial_segments: usize,
    /// A collection that leaves fewer free cells than this grows the heap
    /// by one segment (if the cap allows).
    pub min_free_after_gc: usize,
}

impl Default for HeapSettings {
    fn default() -> Self {
        Self {
            segment_size: 5_000,
            max_segments: 500,
            initial_segments: 3,
            min_free_after_gc: 1_250, // segment_size / 4
        }
    }
}

impl HeapSettings {
    #[inline]
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.segment_size == 0 || self.max_segments == 0 {
            return Err("sizes must be > 0");
        }
        if self.initial_segments == 0 {
            return Err("at least one initial segment is required");
        }
        if self.initial_segments > self.max_segments {
            return Err("initial_segments exceeds max_segments");
        }
        match self.segment_size.checked_mul(self.max_segments) {
            Some(total) if total <= u32::MAX as usize => Ok(()),
            _ => Err("segment_size * max_segments must fit in 32 bits"),
        }
    }
}

// ── Segments ──────────────────────────────────────────────────────────

struct Segment<C> {
    cells: NonNull<C>,
    len: usize,
}

impl<C> Segment<C> {
    /// # Safety
    /// `offset` must be below `len`.
    #[inline(always)]
    unsafe fn slot(&self, offset: usize) -> *mut C {
        // SAFETY: guaranteed by the caller
        unsafe { self.cells.as_ptr().add(offset) }
    }
}

// ── Heap ──────────────────────────────────────────────────────────────

pub struct Heap<C: HeapCell> {
    settings: HeapSettings,
    allocator: Box<dyn SegmentAllocator>,
    segments: Vec<Segment<C>>,
    free_head: Option<CellRef>,
    free_count: usize,
    collections: usize,
    verbose: bool,
    /// Reused between collections.
    worklist: Vec<CellRef>,
    children: Vec<CellRef>,
}

impl<C: HeapCell> Heap<C> {
    pub fn new(settings: HeapSettings) -> Result<Self, HeapError> {
        Self::with_allocator(settings, Box::new(SystemAllocator))
    }

    pub fn with_allocator(
        settings: HeapSettings,
        allocator: Box<dyn SegmentAllocator>,
    ) -> Result<Self, HeapError> {
        settings.validate().map_err(HeapError::InvalidSettings)?;
        Layout::array::<C>(settings.segment_size)
            .map_err(|_| HeapError::InvalidSettings("segment layout overflows"))?;

        let initial = settings.initial_segments;
        let mut heap = Self {
            settings,
            allocator,
            segments: Vec::new(),
            free_head: None,
            free_count: 0,
            collections: 0,
            verbose: false,
            worklist: Vec::new(),
            children: Vec::new(),
        };
        for _ in 0..initial {
            heap.grow()?;
        }
        Ok(heap)
    }

    #[inline]
    pub fn settings(&self) -> &HeapSettings {
        &self.settings
    }

    /// Report collections at `info` instead of `debug`.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    #[inline]
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    #[inline]
    pub fn free_cells(&self) -> usize {
        self.free_count
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.segments.len() * self.settings.segment_size
    }

    #[inline]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    #[inline]
    pub fn collections(&self) -> usize {
        self.collections
    }

    #[inline]
    fn segment_layout(&self) -> Layout {
        // checked in `with_allocator`
        Layout::array::<C>(self.settings.segment_size).unwrap_or_else(|_| Layout::new::<C>())
    }

    fn out_of_memory(&self) -> HeapError {
        HeapError::OutOfMemory {
            segments: self.segments.len(),
            segment_size: self.settings.segment_size,
        }
    }

    /// Adds one segment and threads its cells onto the free list.
    pub fn grow(&mut self) -> Result<(), HeapError> {
        if self.segments.len() >= self.settings.max_segments {
            return Err(self.out_of_memory());
        }
        let layout = self.segment_layout();
        let Some(raw) = self.allocator.allocate(layout) else {
            log::warn!(
                "segment allocator refused {} bytes after {} segments",
                layout.size(),
                self.segments.len()
            );
            return Err(self.out_of_memory());
        };

        let len = self.settings.segment_size;
        let base = self.segments.len() * len;
        let cells = raw.cast::<C>();
        // Written back to front so the free list hands out ascending indices.
        for offset in (0..len).rev() {
            // SAFETY: offset < len and the segment is freshly allocated
            unsafe { cells.as_ptr().add(offset).write(C::vacant(self.free_head)) };
            self.free_head = Some(CellRef::from_index(base + offset));
        }
        self.free_count += len;
        self.segments.push(Segment { cells, len });
        log::debug!(
            "heap grew to {} segments ({} cells)",
            self.segments.len(),
            self.capacity()
        );
        Ok(())
    }

    #[inline]
    fn locate(&self, cell: CellRef) -> (usize, usize) {
        let size = self.settings.segment_size;
        (cell.index() / size, cell.index() % size)
    }

    /// Borrows a cell.
    ///
    /// # Panics
    /// If `cell` does not name a slot of this heap.
    #[inline]
    pub fn get(&self, cell: CellRef) -> &C {
        let (segment, offset) = self.locate(cell);
        let segment = &self.segments[segment];
        assert!(offset < segment.len);
        // SAFETY: bounds checked above, cells are always initialised
        unsafe { &*segment.slot(offset) }
    }

    /// Mutably borrows a cell.
    ///
    /// # Panics
    /// If `cell` does not name a slot of this heap.
    #[inline]
    pub fn get_mut(&mut self, cell: CellRef) -> &mut C {
        let (segment, offset) = self.locate(cell);
        let segment = &self.segments[segment];
        assert!(offset < segment.len);
        // SAFETY: bounds checked above, cells are always initialised, and
        // `&mut self` guarantees exclusivity
        unsafe { &mut *segment.slot(offset) }
    }

    // ── Allocation ────────────────────────────────────────────────────

    /// Stores `value` in a free cell.
    ///
    /// Cells referenced by `value` are treated as roots if this allocation
    /// has to collect, so a caller may pass freshly allocated but otherwise
    /// unrooted cells as the fields of a new cell.
    pub fn allocate(&mut self, roots: &dyn RootProvider, value: C) -> Result<CellRef, HeapError> {
        if self.free_head.is_none() {
            self.replenish(roots, Some(&value), 1)?;
        }
        let Some(cell) = self.free_head else {
            return Err(self.out_of_memory());
        };
        let slot = self.get_mut(cell);
        let next = slot.next_vacant();
        *slot = value;
        self.free_head = next;
        self.free_count -= 1;
        Ok(cell)
    }

    /// Guarantees that the next `count` allocations succeed without a
    /// collection.
    pub fn reserve(&mut self, roots: &dyn RootProvider, count: usize) -> Result<(), HeapError> {
        if self.free_count >= count {
            return Ok(());
        }
        self.replenish(roots, None, count)
    }

    fn replenish(
        &mut self,
        roots: &dyn RootProvider,
        pending: Option<&C>,
        wanted: usize,
    ) -> Result<(), HeapError> {
        self.collect_with(roots, pending);
        while self.free_count < wanted {
            self.grow()?;
        }
        if self.free_count < self.settings.min_free_after_gc
            && self.segments.len() < self.settings.max_segments
        {
            // best effort: the request itself is already satisfied
            let _ = self.grow();
        }
        Ok(())
    }

    // ── Collection ────────────────────────────────────────────────────

    /// Runs a full mark-sweep cycle.
    pub fn collect(&mut self, roots: &dyn RootProvider) -> GcStats {
        self.collect_with(roots, None)
    }

    fn collect_with(&mut self, roots: &dyn RootProvider, pending: Option<&C>) -> GcStats {
        let before = self.free_count;
        self.mark(roots, pending);
        let stats = self.sweep(before);
        self.collections += 1;

        if self.verbose {
            log::info!(
                "gc #{}: {} cells collected, {} live, {} free, {} segments",
                self.collections,
                stats.collected,
                stats.live,
                stats.free,
                stats.segments
            );
        } else {
            log::debug!(
                "gc #{}: {} cells collected, {} live, {} free, {} segments",
                self.collections,
                stats.collected,
                stats.live,
                stats.free,
                stats.segments
            );
        }
        stats
    }

    #[inline]
    fn mark_and_push(&mut self, cell: CellRef, worklist: &mut Vec<CellRef>) {
        let slot = self.get_mut(cell);
        let flags = slot.flags();
        if !flags.contains(CellFlags::MARKED) {
            slot.set_flags(flags.with(CellFlags::MARKED));
            worklist.push(cell);
        }
    }

    /// Cells are marked when pushed, so the work list never holds more
    /// entries than there are live cells, and nothing recurses.
    fn mark(&mut self, roots: &dyn RootProvider, pending: Option<&C>) {
        let mut worklist = mem::take(&mut self.worklist);
        let mut children = mem::take(&mut self.children);

        roots.visit_roots(&mut |cell| children.push(cell));
        if let Some(value) = pending {
            value.trace(&mut |cell| children.push(cell));
        }
        for cell in children.drain(..) {
            self.mark_and_push(cell, &mut worklist);
        }

        while let Some(cell) = worklist.pop() {
            self.get(cell).trace(&mut |child| children.push(child));
            for child in children.drain(..) {
                self.mark_and_push(child, &mut worklist);
            }
        }

        self.worklist = worklist;
        self.children = children;
    }

    fn sweep(&mut self, free_before: usize) -> GcStats {
        let mut free_head = None;
        let mut free = 0;
        let mut live = 0;

        let segment_size = self.settings.segment_size;
        for (index, segment) in self.segments.iter().enumerate().rev() {
            for offset in (0..segment.len).rev() {
                // SAFETY: offset < len, cells are initialised and nothing
                // else borrows the heap during the sweep
                let slot = unsafe { &mut *segment.slot(offset) };
                let flags = slot.flags();
                if flags.contains(CellFlags::MARKED) {
                    slot.set_flags(flags.without(CellFlags::MARKED));
                    live += 1;
                } else {
                    *slot = C::vacant(free_head);
                    free_head = Some(CellRef::from_index(index * segment_size + offset));
                    free += 1;
                }
            }
        }

        self.free_head = free_head;
        self.free_count = free;
        GcStats {
            collected: free.saturating_sub(free_before),
            live,
            free,
            segments: self.segments.len(),
        }
    }
}

impl<C: HeapCell> Drop for Heap<C> {
    fn drop(&mut self) {
        let layout = self.segment_layout();
        for segment in self.segments.drain(..) {
            for offset in 0..segment.len {
                // SAFETY: every slot holds an initialised cell
                unsafe { segment.slot(offset).drop_in_place() };
            }
            // SAFETY: the segment came from this allocator with this layout
            unsafe { self.allocator.deallocate(segment.cells.cast(), layout) };
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::{cell::Cell as StdCell, rc::Rc};

    use super::*;

    #[derive(Debug)]
    enum Payload {
        Vacant(Option<CellRef>),
        Leaf(i64),
        Node(Option<CellRef>, Option<CellRef>),
    }

    #[derive(Debug)]
    struct TestCell {
        flags: CellFlags,
        payload: Payload,
    }

    impl TestCell {
        fn leaf(value: i64) -> Self {
            Self {
                flags: CellFlags::NONE,
                payload: Payload::Leaf(value),
            }
        }

        fn node(left: Option<CellRef>, right: Option<CellRef>) -> Self {
            Self {
                flags: CellFlags::NONE,
                payload: Payload::Node(left, right),
            }
        }
    }

    impl HeapCell for TestCell {
        fn vacant(next: Option<CellRef>) -> Self {
            Self {
                flags: CellFlags::NONE,
                payload: Payload::Vacant(next),
            }
        }

        fn next_vacant(&self) -> Option<CellRef> {
            match self.payload {
                Payload::Vacant(next) => next,
                _ => None,
            }
        }

        fn is_vacant(&self) -> bool {
            matches!(self.payload, Payload::Vacant(_))
        }

        fn flags(&self) -> CellFlags {
            self.flags
        }

        fn set_flags(&mut self, flags: CellFlags) {
            self.flags = flags;
        }

        fn trace(&self, visitor: &mut dyn FnMut(CellRef)) {
            if let Payload::Node(left, right) = self.payload {
                left.into_iter().chain(right).for_each(visitor);
            }
        }
    }

    /// A simple root provider that holds a list of cells.
    struct TestRoots {
        roots: Vec<CellRef>,
    }

    impl TestRoots {
        fn new() -> Self {
            Self { roots: Vec::new() }
        }

        fn push(&mut self, cell: CellRef) {
            self.roots.push(cell);
        }
    }

    impl RootProvider for TestRoots {
        fn visit_roots(&self, visitor: &mut dyn FnMut(CellRef)) {
            for root in &self.roots {
                visitor(*root);
            }
        }
    }

    fn create_test_settings() -> HeapSettings {
        HeapSettings {
            segment_size: 16,
            max_segments: 4,
            initial_segments: 1,
            min_free_after_gc: 4,
        }
    }

    fn leaf_value(heap: &Heap<TestCell>, cell: CellRef) -> Option<i64> {
        match heap.get(cell).payload {
            Payload::Leaf(value) => Some(value),
            _ => None,
        }
    }

    /// Counts live segments handed out by the allocator.
    struct CountingAllocator {
        live: Rc<StdCell<usize>>,
        limit: usize,
    }

    impl SegmentAllocator for CountingAllocator {
        fn allocate(&mut self, layout: Layout) -> Option<NonNull<u8>> {
            if self.live.get() >= self.limit {
                return None;
            }
            self.live.set(self.live.get() + 1);
            SystemAllocator.allocate(layout)
        }

        unsafe fn deallocate(&mut self, ptr: NonNull<u8>, layout: Layout) {
            self.live.set(self.live.get() - 1);
            unsafe { SystemAllocator.deallocate(ptr, layout) }
        }
    }

    #[test]
    fn test_settings_validation() {
        assert!(HeapSettings::default().validate().is_ok());
        let zero = HeapSettings {
            segment_size: 0,
            ..create_test_settings()
        };
        assert!(zero.validate().is_err());
        let too_many_initial = HeapSettings {
            initial_segments: 5,
            ..create_test_settings()
        };
        assert!(matches!(
            Heap::<TestCell>::new(too_many_initial),
            Err(HeapError::InvalidSettings(_))
        ));
    }

    #[test]
    fn test_allocation_basic() {
        let mut heap = Heap::new(create_test_settings()).unwrap();
        let roots = TestRoots::new();

        assert_eq!(heap.free_cells(), 16);
        let a = heap.allocate(&roots, TestCell::leaf(1)).unwrap();
        let b = heap.allocate(&roots, TestCell::leaf(2)).unwrap();
        assert_ne!(a, b);
        assert_eq!(heap.free_cells(), 14);
        assert_eq!(leaf_value(&heap, a), Some(1));
        assert_eq!(leaf_value(&heap, b), Some(2));
        assert_eq!(heap.collections(), 0);
    }

    #[test]
    fn test_collect_keeps_reachable_and_frees_garbage() {
        let mut heap = Heap::new(create_test_settings()).unwrap();
        let mut roots = TestRoots::new();

        let leaf = heap.allocate(&roots, TestCell::leaf(7)).unwrap();
        let node = heap.allocate(&roots, TestCell::node(Some(leaf), None)).unwrap();
        roots.push(node);
        for i in 0..5 {
            heap.allocate(&roots, TestCell::leaf(i)).unwrap();
        }

        let stats = heap.collect(&roots);
        assert_eq!(stats.live, 2);
        assert_eq!(stats.collected, 5);
        assert_eq!(heap.free_cells(), 14);
        assert_eq!(leaf_value(&heap, leaf), Some(7));
        assert!(!heap.get(node).flags().contains(CellFlags::MARKED));
    }

    #[test]
    fn test_cycles_are_traced_once() {
        let mut heap = Heap::new(create_test_settings()).unwrap();
        let mut roots = TestRoots::new();

        let a = heap.allocate(&roots, TestCell::node(None, None)).unwrap();
        let b = heap.allocate(&roots, TestCell::node(Some(a), None)).unwrap();
        heap.get_mut(a).payload = Payload::Node(Some(b), None);

        roots.push(a);
        assert_eq!(heap.collect(&roots).live, 2);

        roots.roots.clear();
        let stats = heap.collect(&roots);
        assert_eq!(stats.live, 0);
        assert_eq!(stats.collected, 2);
    }

    #[test]
    fn test_pending_value_edges_survive_collection() {
        let mut heap = Heap::new(create_test_settings()).unwrap();
        let roots = TestRoots::new();

        // fill the heap with garbage except for one unrooted leaf
        let leaf = heap.allocate(&roots, TestCell::leaf(99)).unwrap();
        while heap.free_cells() > 0 {
            heap.allocate(&roots, TestCell::leaf(0)).unwrap();
        }
        let node = heap.allocate(&roots, TestCell::node(Some(leaf), None)).unwrap();
        assert_eq!(heap.collections(), 1);
        assert_eq!(leaf_value(&heap, leaf), Some(99));
        assert!(matches!(heap.get(node).payload, Payload::Node(Some(l), None) if l == leaf));
    }

    #[test]
    fn test_heap_grows_when_collection_recovers_too_little() {
        let mut heap = Heap::new(create_test_settings()).unwrap();
        let mut roots = TestRoots::new();

        for i in 0..16 {
            let cell = heap.allocate(&roots, TestCell::leaf(i)).unwrap();
            roots.push(cell);
        }
        assert_eq!(heap.segment_count(), 1);
        let extra = heap.allocate(&roots, TestCell::leaf(16)).unwrap();
        assert_eq!(heap.segment_count(), 2);
        assert_eq!(leaf_value(&heap, extra), Some(16));
        for (i, cell) in roots.roots.iter().enumerate() {
            assert_eq!(leaf_value(&heap, *cell), Some(i as i64));
        }
    }

    #[test]
    fn test_out_of_memory_at_segment_cap() {
        let mut heap = Heap::new(create_test_settings()).unwrap();
        let mut roots = TestRoots::new();

        let mut result = Ok(());
        for i in 0..100 {
            match heap.allocate(&roots, TestCell::leaf(i)) {
                Ok(cell) => roots.push(cell),
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
        }
        assert!(matches!(result, Err(HeapError::OutOfMemory { segments: 4, .. })));
        assert_eq!(roots.roots.len(), 64);
    }

    #[test]
    fn test_reserve_prevents_collection() {
        let mut heap = Heap::new(create_test_settings()).unwrap();
        let mut roots = TestRoots::new();

        for i in 0..10 {
            let cell = heap.allocate(&roots, TestCell::leaf(i)).unwrap();
            roots.push(cell);
        }
        heap.reserve(&roots, 20).unwrap();
        let collections = heap.collections();
        assert!(heap.free_cells() >= 20);

        let empty = TestRoots::new();
        for i in 0..20 {
            heap.allocate(&empty, TestCell::leaf(i)).unwrap();
        }
        assert_eq!(heap.collections(), collections);
        for (i, cell) in roots.roots.iter().enumerate() {
            assert_eq!(leaf_value(&heap, *cell), Some(i as i64));
        }
    }

    #[test]
    fn test_deep_structure_marks_without_recursion() {
        let settings = HeapSettings {
            segment_size: 50_000,
            max_segments: 4,
            initial_segments: 3,
            min_free_after_gc: 1,
        };
        let mut heap = Heap::new(settings).unwrap();
        let mut roots = TestRoots::new();

        let mut head = heap.allocate(&roots, TestCell::leaf(0)).unwrap();
        roots.push(head);
        for _ in 0..100_000 {
            head = heap.allocate(&roots, TestCell::node(Some(head), None)).unwrap();
            roots.roots[0] = head;
        }
        let stats = heap.collect(&roots);
        assert_eq!(stats.live, 100_001);
        assert!(heap.worklist.capacity() <= stats.live);
    }

    #[test]
    fn test_custom_allocator_is_used_and_released() {
        let live = Rc::new(StdCell::new(0));
        let allocator = CountingAllocator {
            live: live.clone(),
            limit: 2,
        };
        {
            let mut heap =
                Heap::with_allocator(create_test_settings(), Box::new(allocator)).unwrap();
            let mut roots = TestRoots::new();
            assert_eq!(live.get(), 1);

            let mut failed = false;
            for i in 0..40 {
                match heap.allocate(&roots, TestCell::leaf(i)) {
                    Ok(cell) => roots.push(cell),
                    Err(HeapError::OutOfMemory { .. }) => {
                        failed = true;
                        break;
                    }
                    Err(err) => panic!("unexpected {err}"),
                }
            }
            assert!(failed);
            assert_eq!(live.get(), 2);
            assert_eq!(roots.roots.len(), 32);
        }
        assert_eq!(live.get(), 0);
    }
}
