//! Abortable buffer FIFO with byte accounting
//!
//! Each sink owns one of these. The decode thread puts entries, the sink's
//! consumer gets them, and playlist mutations flush or purge in between.
//! Accounting (`queued_bytes`, `queued_buffers`) covers real buffers only;
//! the end-of-playlist marker passes through uncounted.

use crate::playback::buffer::Buffer;
use crate::playback::playlist::ItemId;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

/// Queue element: a decoded buffer, or the end-of-playlist marker
pub(crate) enum QueueEntry {
    Audio(Arc<Buffer>),
    End,
}

struct QueueState {
    entries: VecDeque<QueueEntry>,
    queued_bytes: usize,
    queued_buffers: usize,
    aborted: bool,
}

pub(crate) struct BufferQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl BufferQueue {
    pub(crate) fn new() -> BufferQueue {
        BufferQueue {
            state: Mutex::new(QueueState {
                entries: VecDeque::new(),
                queued_bytes: 0,
                queued_buffers: 0,
                aborted: false,
            }),
            ready: Condvar::new(),
        }
    }

    pub(crate) fn put(&self, entry: QueueEntry) {
        let mut state = self.state.lock().unwrap();
        if let QueueEntry::Audio(buffer) = &entry {
            state.queued_bytes += buffer.size();
            state.queued_buffers += 1;
        }
        state.entries.push_back(entry);
        self.ready.notify_one();
    }

    /// Dequeue the next entry. With `block`, waits until an entry arrives
    /// or the queue is aborted; otherwise returns `None` when empty.
    pub(crate) fn get(&self, block: bool) -> Option<QueueEntry> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(entry) = state.entries.pop_front() {
                if let QueueEntry::Audio(buffer) = &entry {
                    state.queued_bytes -= buffer.size();
                    state.queued_buffers -= 1;
                }
                return Some(entry);
            }
            if state.aborted || !block {
                return None;
            }
            state = self.ready.wait(state).unwrap();
        }
    }

    /// Discard every queued entry
    pub(crate) fn flush(&self) {
        let mut state = self.state.lock().unwrap();
        state.entries.clear();
        state.queued_bytes = 0;
        state.queued_buffers = 0;
    }

    /// Evict buffers decoded from `item`, returning how many were dropped
    pub(crate) fn purge(&self, item: ItemId) -> usize {
        let mut state = self.state.lock().unwrap();
        let before = state.entries.len();
        let mut dropped_bytes = 0;
        let mut dropped_buffers = 0;
        state.entries.retain(|entry| match entry {
            QueueEntry::Audio(buffer) if buffer.item() == item => {
                dropped_bytes += buffer.size();
                dropped_buffers += 1;
                false
            }
            _ => true,
        });
        state.queued_bytes -= dropped_bytes;
        state.queued_buffers -= dropped_buffers;
        before - state.entries.len()
    }

    /// Wake blocked getters; subsequent blocking gets return immediately
    pub(crate) fn abort(&self) {
        let mut state = self.state.lock().unwrap();
        state.aborted = true;
        self.ready.notify_all();
    }

    /// Clear a prior abort so the queue blocks normally again
    pub(crate) fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.aborted = false;
    }

    pub(crate) fn queued_bytes(&self) -> usize {
        self.state.lock().unwrap().queued_bytes
    }

    pub(crate) fn queued_buffers(&self) -> usize {
        self.state.lock().unwrap().queued_buffers
    }
}
