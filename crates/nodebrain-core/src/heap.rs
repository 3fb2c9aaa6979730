//! Slab allocator with size-class free lists for small byte buffers, plus a
//! bump-allocated page pool for the backing storage (spec §4.1).
//!
//! String cells (§4.4) allocate their byte payload through this heap rather
//! than through ad hoc `Vec<u8>`/`String` allocation, so that repeated
//! intern/destroy cycles of similarly-sized strings reuse memory instead of
//! round-tripping through the global allocator on every assertion wave.
//!
//! Allocations larger than [`LARGE_THRESHOLD`] bypass the pool entirely and
//! go straight to the global allocator, matching "Allocations >4096 bytes
//! bypass the pool and go to the OS allocator."

/// Page size for the bump-allocated backing pages (128 KiB, per spec).
const PAGE_SIZE: usize = 128 * 1024;

/// Requests at or above this size skip the pool and use the OS allocator
/// directly (spec: "strings ≥ 4096 bytes bypass the pool").
pub const LARGE_THRESHOLD: usize = 4096;

/// Round a request up to the next multiple of 8, the pool's allocation
/// granularity.
fn round_up8(n: usize) -> usize {
    (n + 7) & !7
}

/// `(size - 1) / 8` size-class index used to pick a free list (spec §4.1).
fn size_class(n: usize) -> usize {
    (round_up8(n).max(8) - 1) / 8
}

/// A single bump-allocated page. Carves space from the high-water mark down
/// to zero; once exhausted a new page is requested from the pool.
struct Page {
    buf: Vec<u8>,
    high_water: usize,
}

impl Page {
    fn new() -> Self {
        Self {
            buf: vec![0u8; PAGE_SIZE],
            high_water: PAGE_SIZE,
        }
    }

    fn carve(&mut self, len: usize) -> Option<Vec<u8>> {
        if len > self.high_water {
            return None;
        }
        self.high_water -= len;
        Some(self.buf[self.high_water..self.high_water + len].to_vec())
    }
}

/// Size-class-indexed free lists plus the page pool that backs carve
/// requests when no free block is available.
pub struct Heap {
    size_classes: Vec<Vec<Vec<u8>>>,
    pages: Vec<Page>,
    allocated: usize,
    recycled: usize,
}

impl Heap {
    pub fn new() -> Self {
        Self {
            size_classes: Vec::new(),
            pages: Vec::new(),
            allocated: 0,
            recycled: 0,
        }
    }

    /// Allocate `n` bytes, zero-initialized. Mirrors spec §4.1 `alloc(n)`:
    /// rounds up to 8, returns a free-list block if one is available,
    /// otherwise carves from the current page (allocating a new page if
    /// necessary). Requests ≥ [`LARGE_THRESHOLD`] go straight to the OS
    /// allocator (a plain `Vec` allocation).
    pub fn alloc(&mut self, n: usize) -> Vec<u8> {
        if n >= LARGE_THRESHOLD {
            self.allocated += 1;
            return vec![0u8; n];
        }
        let rounded = round_up8(n);
        let class = size_class(rounded);
        if class >= self.size_classes.len() {
            self.size_classes.resize_with(class + 1, Vec::new);
        }
        if let Some(block) = self.size_classes[class].pop() {
            self.recycled += 1;
            return block;
        }
        self.allocated += 1;
        loop {
            if let Some(last) = self.pages.last_mut() {
                if let Some(block) = last.carve(rounded) {
                    return block;
                }
            }
            // Allocation failure against the OS allocator itself is fatal
            // (spec §4.1 "Failure policy"); `Vec::with_capacity` aborts via
            // the global allocator's own handler on real exhaustion, so we
            // do not second-guess it here — we only grow the page pool.
            self.pages.push(Page::new());
        }
    }

    /// Release a buffer back to its size class's free list. Buffers that
    /// bypassed the pool (≥ [`LARGE_THRESHOLD`]) are simply dropped.
    pub fn free(&mut self, buf: Vec<u8>) {
        let n = buf.len();
        if n >= LARGE_THRESHOLD {
            return;
        }
        let class = size_class(n);
        if class >= self.size_classes.len() {
            self.size_classes.resize_with(class + 1, Vec::new);
        }
        self.size_classes[class].push(buf);
    }

    pub fn stats(&self) -> HeapStats {
        HeapStats {
            pages: self.pages.len(),
            allocated: self.allocated,
            recycled: self.recycled,
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    pub pages: usize,
    pub allocated: usize,
    pub recycled: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_alloc_rounds_to_size_class() {
        let mut heap = Heap::new();
        let a = heap.alloc(3);
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn free_then_alloc_recycles() {
        let mut heap = Heap::new();
        let a = heap.alloc(16);
        heap.free(a);
        let before = heap.stats();
        let _b = heap.alloc(16);
        let after = heap.stats();
        assert_eq!(after.recycled, before.recycled + 1);
    }

    #[test]
    fn large_alloc_bypasses_pool() {
        let mut heap = Heap::new();
        let big = heap.alloc(LARGE_THRESHOLD);
        assert_eq!(big.len(), LARGE_THRESHOLD);
        assert!(heap.pages.is_empty());
    }
}
