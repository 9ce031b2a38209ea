// src/motion/pipeline.rs - bounded producer/consumer queue of motion blocks
//
// Classic two-index ring buffer reserving one slot: put_pos is written only
// by the producer (add), get_pos only by the consumer (remove). With one
// writer per index and release/acquire ordering no lock is needed between
// the planner context and the tick context.

use std::sync::atomic::{AtomicUsize, Ordering};

use super::block::MotionBlock;

#[derive(Debug)]
pub struct RingBufferPosn {
    put_pos: AtomicUsize,
    get_pos: AtomicUsize,
    size: usize,
}

impl RingBufferPosn {
    pub fn new(size: usize) -> Self {
        Self {
            put_pos: AtomicUsize::new(0),
            get_pos: AtomicUsize::new(0),
            size: size.max(2),
        }
    }

    pub fn clear(&self) {
        self.get_pos.store(0, Ordering::Release);
        self.put_pos.store(0, Ordering::Release);
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn can_put(&self) -> bool {
        let put = self.put_pos.load(Ordering::Acquire);
        let get = self.get_pos.load(Ordering::Acquire);
        (put + 1) % self.size != get
    }

    pub fn can_get(&self) -> bool {
        let put = self.put_pos.load(Ordering::Acquire);
        let get = self.get_pos.load(Ordering::Acquire);
        put != get
    }

    pub fn count(&self) -> usize {
        let put = self.put_pos.load(Ordering::Acquire);
        let get = self.get_pos.load(Ordering::Acquire);
        (put + self.size - get) % self.size
    }

    pub fn put_pos(&self) -> usize {
        self.put_pos.load(Ordering::Acquire)
    }

    pub fn get_pos(&self) -> usize {
        self.get_pos.load(Ordering::Acquire)
    }

    /// Producer side: the slot at put_pos has been filled.
    pub fn has_put(&self) {
        let put = self.put_pos.load(Ordering::Acquire);
        self.put_pos.store((put + 1) % self.size, Ordering::Release);
    }

    /// Consumer side: the slot at get_pos has been consumed.
    pub fn has_got(&self) {
        let get = self.get_pos.load(Ordering::Acquire);
        self.get_pos.store((get + 1) % self.size, Ordering::Release);
    }

    /// Slot index of the Nth most recently put element (0 = newest), or None
    /// if fewer than N+1 elements are queued.
    pub fn nth_from_put(&self, n: usize) -> Option<usize> {
        if n >= self.count() {
            return None;
        }
        let put = self.put_pos.load(Ordering::Acquire);
        Some((put + self.size - 1 - n) % self.size)
    }

    /// Slot index of the Nth element from the head (0 = next to be got).
    pub fn nth_from_get(&self, n: usize) -> Option<usize> {
        if n >= self.count() {
            return None;
        }
        let get = self.get_pos.load(Ordering::Acquire);
        Some((get + n) % self.size)
    }
}

/// Fixed-capacity FIFO of motion blocks. The planner appends and re-plans
/// queued blocks; the actuator peeks the head each tick and removes blocks it
/// has finished. Capacity is size - 1 because of the reserved slot.
#[derive(Debug)]
pub struct MotionPipeline {
    posn: RingBufferPosn,
    slots: Vec<MotionBlock>,
}

impl MotionPipeline {
    pub fn new(pipeline_len: usize) -> Self {
        let size = pipeline_len.max(2);
        let mut slots = Vec::with_capacity(size);
        slots.resize_with(size, MotionBlock::new);
        Self {
            posn: RingBufferPosn::new(size),
            slots,
        }
    }

    /// Drop all queued blocks. Producer-context only.
    pub fn clear(&self) {
        self.posn.clear();
    }

    pub fn count(&self) -> usize {
        self.posn.count()
    }

    /// Whether another block can be appended.
    pub fn can_accept(&self) -> bool {
        self.posn.can_put()
    }

    /// Whether there is a head block to execute.
    pub fn can_get(&self) -> bool {
        self.posn.can_get()
    }

    /// Append a block. Fails (false) when the buffer is full.
    pub fn add(&mut self, block: MotionBlock) -> bool {
        if !self.posn.can_put() {
            return false;
        }
        self.slots[self.posn.put_pos()] = block;
        self.posn.has_put();
        true
    }

    /// Head block without removing it. Tick-context safe.
    pub fn peek_get(&self) -> Option<&MotionBlock> {
        if !self.posn.can_get() {
            return None;
        }
        Some(&self.slots[self.posn.get_pos()])
    }

    /// Pop the head block. Only ever called by the actuator once the block
    /// has completed.
    pub fn remove(&self) -> bool {
        if !self.posn.can_get() {
            return false;
        }
        self.posn.has_got();
        true
    }

    /// Nth most recently added block (0 = newest). Planner read cursor; never
    /// touches get_pos.
    pub fn peek_nth_from_put(&self, n: usize) -> Option<&MotionBlock> {
        self.posn.nth_from_put(n).map(|idx| &self.slots[idx])
    }

    /// Mutable variant for the re-planning passes. Callers must skip blocks
    /// that are already executing.
    pub fn peek_nth_from_put_mut(&mut self, n: usize) -> Option<&mut MotionBlock> {
        let idx = self.posn.nth_from_put(n)?;
        Some(&mut self.slots[idx])
    }

    /// Nth block from the head (0 = next to execute).
    pub fn peek_nth_from_get(&self, n: usize) -> Option<&MotionBlock> {
        self.posn.nth_from_get(n).map(|idx| &self.slots[idx])
    }

    /// Debug dump of queued blocks, oldest first.
    pub fn debug_show_blocks(&self) {
        for n in 0..self.count() {
            if let Some(block) = self.peek_nth_from_get(n) {
                tracing::debug!(
                    "blk {} entry {:.3} exit {:.3} maxEntry {:.3} steps {:?} canExec {} exec {}",
                    n,
                    block.entry_speed_mmps,
                    block.exit_speed_mmps,
                    block.max_entry_speed_mmps,
                    block.steps_to_target.vals,
                    block.can_execute(),
                    block.is_executing(),
                );
            }
        }
    }
}
