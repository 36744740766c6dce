//! Caller-supplied allocation for buffers handed back across the boundary.
//!
//! Internal code allocates normally. Only text returned to a caller (the
//! diagnostic log, marshalled strings) is copied into a buffer obtained
//! from the caller's [`Heap`], and that buffer goes back to the same heap
//! when the [`HeapBuffer`] is dropped.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Allocate/free pair supplied by a caller.
pub trait Heap: Send + Sync {
    /// Return a zero-filled block of exactly `len` bytes, or `None` when the
    /// allocation cannot be satisfied.
    fn allocate(&self, len: usize) -> Option<Vec<u8>>;

    /// Take back a block returned by [`Heap::allocate`].
    fn free(&self, block: Vec<u8>);
}

/// Default heap backed by the global allocator.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHeap;

impl Heap for SystemHeap {
    fn allocate(&self, len: usize) -> Option<Vec<u8>> {
        let mut block = Vec::new();
        block.try_reserve_exact(len).ok()?;
        block.resize(len, 0);
        Some(block)
    }

    fn free(&self, block: Vec<u8>) {
        drop(block);
    }
}

/// The heap used when a caller does not furnish one.
pub fn default_heap() -> Arc<dyn Heap> {
    Arc::new(SystemHeap)
}

/// Null-terminated byte buffer owned by a caller's heap.
pub struct HeapBuffer {
    block: Option<Vec<u8>>,
    heap: Arc<dyn Heap>,
}

impl HeapBuffer {
    /// Copy `text` plus a terminating zero byte into a block from `heap`.
    pub fn from_text(heap: &Arc<dyn Heap>, text: &str) -> Result<Self> {
        let len = text.len() + 1;
        let mut block = heap.allocate(len).ok_or(Error::OutOfMemory)?;
        if block.len() != len {
            heap.free(block);
            return Err(Error::OutOfMemory);
        }
        block[..text.len()].copy_from_slice(text.as_bytes());
        block[text.len()] = 0;
        Ok(Self {
            block: Some(block),
            heap: Arc::clone(heap),
        })
    }

    /// Contents including the terminating zero.
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        self.block.as_deref().unwrap_or_default()
    }

    /// Contents without the terminating zero.
    pub fn as_bytes(&self) -> &[u8] {
        let bytes = self.as_bytes_with_nul();
        bytes.strip_suffix(&[0]).unwrap_or(bytes)
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(self.as_bytes()).into_owned()
    }
}

impl Deref for HeapBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl Drop for HeapBuffer {
    fn drop(&mut self) {
        if let Some(block) = self.block.take() {
            self.heap.free(block);
        }
    }
}

impl fmt::Debug for HeapBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HeapBuffer").field(&self.to_string_lossy()).finish()
    }
}
