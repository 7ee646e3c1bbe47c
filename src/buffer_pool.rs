//! Reusable connection buffers
//!
//! Connections churn; their read and write buffers do not have to. A
//! lock-free queue hands buffers back out instead of reallocating on
//! every accept.

use std::sync::Arc;

use bytes::BytesMut;
use crossbeam_queue::ArrayQueue;

/// Initial capacity of a fresh buffer
const BUFFER_CAPACITY: usize = 4096;

/// How many idle buffers the pool keeps
const POOL_SLOTS: usize = 128;

/// Buffers grown past this are dropped rather than pooled
const MAX_RECLAIM_CAPACITY: usize = 32 * 1024;

pub struct BufferPool {
    slots: ArrayQueue<BytesMut>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self {
            slots: ArrayQueue::new(POOL_SLOTS),
        }
    }

    /// Pop an idle buffer or allocate a fresh one.
    pub fn get(&self) -> BytesMut {
        self.slots
            .pop()
            .unwrap_or_else(|| BytesMut::with_capacity(BUFFER_CAPACITY))
    }

    /// Return a buffer for reuse. Oversized buffers are dropped so one
    /// large publish does not pin memory forever; a full pool drops too.
    pub fn put(&self, mut buf: BytesMut) {
        if buf.capacity() > MAX_RECLAIM_CAPACITY {
            return;
        }
        buf.clear();
        let _ = self.slots.push(buf);
    }

    pub fn idle(&self) -> usize {
        self.slots.len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: std::sync::OnceLock<Arc<BufferPool>> = std::sync::OnceLock::new();

fn global() -> &'static Arc<BufferPool> {
    GLOBAL.get_or_init(|| Arc::new(BufferPool::new()))
}

/// Take a buffer from the shared pool.
pub fn get_buffer() -> BytesMut {
    global().get()
}

/// Hand a buffer back to the shared pool.
pub fn put_buffer(buf: BytesMut) {
    global().put(buf);
}
