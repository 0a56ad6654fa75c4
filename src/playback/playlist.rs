//! Playlist: the ordered item sequence, its mutation API, and ownership of
//! the decode thread
//!
//! All structural mutation happens under the playlist lock, the same lock
//! the decode thread holds for the body of each iteration. Items live in a
//! stable-id arena ordered by play position; buffers and purge matching
//! refer to items by id only, so a removed item's id stays meaningful for
//! equality after the item itself is gone.

use crate::audio::filter::FilterGraph;
use crate::audio::source::AudioFile;
use crate::audio::types::AudioFormat;
use crate::error::{Error, Result};
use crate::playback::engine;
use crate::playback::sink::Sink;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

/// Stable identifier of one playlist item.
///
/// Ids are unique for the life of the process; they never recycle, so a
/// buffer's originating-item id can be compared safely after removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemId(Uuid);

impl ItemId {
    pub(crate) fn new() -> ItemId {
        ItemId(Uuid::new_v4())
    }
}

/// One entry in the playlist: a file and its per-item gain
pub(crate) struct PlaylistItem {
    pub(crate) id: ItemId,
    pub(crate) file: Arc<AudioFile>,
    pub(crate) gain: f64,
}

/// Sinks sharing one output format. The first sink is the example that
/// parameterizes the group's filter branch.
pub(crate) struct SinkGroup {
    pub(crate) format: AudioFormat,
    pub(crate) sinks: Vec<Arc<Sink>>,
}

/// State guarded by the playlist lock
pub(crate) struct PlaylistState {
    /// Items in play order
    pub(crate) items: Vec<PlaylistItem>,
    /// The item currently being decoded
    pub(crate) decode_head: Option<ItemId>,
    /// User-set global volume multiplier
    pub(crate) volume: f64,
    /// `volume * decode_head.gain`, fed to the filter graph
    pub(crate) composite_volume: f64,
    /// Forces a filter graph rebuild on the next decode iteration
    pub(crate) rebuild_graph: bool,
    /// Attached sinks grouped by output format, one group per filter branch
    pub(crate) groups: Vec<SinkGroup>,
    pub(crate) graph: Option<FilterGraph>,
    /// Whether the end-of-playlist marker has been delivered since the
    /// decode head last became empty
    pub(crate) sent_end_of_q: bool,
    /// Times the filter graph has been built since creation
    pub(crate) graph_builds: u64,
}

impl PlaylistState {
    pub(crate) fn index_of(&self, id: ItemId) -> Option<usize> {
        self.items.iter().position(|item| item.id == id)
    }

    pub(crate) fn item(&self, id: ItemId) -> Option<&PlaylistItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Id of the item after `id` in play order
    pub(crate) fn next_of(&self, id: ItemId) -> Option<ItemId> {
        let index = self.index_of(id)?;
        self.items.get(index + 1).map(|item| item.id)
    }
}

/// Shared core between the playlist handle and its decode thread
pub(crate) struct PlaylistShared {
    pub(crate) state: Mutex<PlaylistState>,
    pub(crate) paused: AtomicBool,
    pub(crate) abort: AtomicBool,
}

impl PlaylistShared {
    /// Insert a sink into the group matching its format, creating a new
    /// group (and so a new filter branch) when none matches. Prepend at
    /// both levels.
    pub(crate) fn attach_sink(&self, sink: &Arc<Sink>) {
        let mut state = self.state.lock().unwrap();
        let format = sink.format();

        match state.groups.iter().position(|g| g.format == format) {
            Some(index) => state.groups[index].sinks.insert(0, Arc::clone(sink)),
            None => state.groups.insert(
                0,
                SinkGroup {
                    format,
                    sinks: vec![Arc::clone(sink)],
                },
            ),
        }

        // the output-format set changed
        state.rebuild_graph = true;
    }

    /// Remove a sink from its group; an emptied group is dropped and the
    /// graph rebuilt without its branch.
    pub(crate) fn remove_sink(&self, sink: &Arc<Sink>) -> Result<()> {
        let mut state = self.state.lock().unwrap();

        let mut found = None;
        for (group_index, group) in state.groups.iter_mut().enumerate() {
            if let Some(sink_index) = group.sinks.iter().position(|s| Arc::ptr_eq(s, sink)) {
                group.sinks.remove(sink_index);
                found = Some(group_index);
                break;
            }
        }

        match found {
            Some(group_index) => {
                if state.groups[group_index].sinks.is_empty() {
                    state.groups.remove(group_index);
                }
                state.rebuild_graph = true;
                Ok(())
            }
            None => Err(Error::NotAttached),
        }
    }
}

/// A playlist with its own decode thread.
///
/// Creating a playlist starts the thread; dropping it clears the items,
/// stops the thread, and detaches every sink.
pub struct Playlist {
    shared: Arc<PlaylistShared>,
    thread: Option<JoinHandle<()>>,
}

impl Playlist {
    /// Create an empty playlist and start its decode thread
    pub fn new() -> Playlist {
        let shared = Arc::new(PlaylistShared {
            state: Mutex::new(PlaylistState {
                items: Vec::new(),
                decode_head: None,
                volume: 1.0,
                composite_volume: 1.0,
                rebuild_graph: false,
                groups: Vec::new(),
                graph: None,
                sent_end_of_q: false,
                graph_builds: 0,
            }),
            paused: AtomicBool::new(false),
            abort: AtomicBool::new(false),
        });

        let thread = {
            let shared = Arc::clone(&shared);
            std::thread::spawn(move || engine::run(shared))
        };

        info!("playlist created");

        Playlist {
            shared,
            thread: Some(thread),
        }
    }

    pub(crate) fn shared(&self) -> &Arc<PlaylistShared> {
        &self.shared
    }

    /// Insert a file before `before`, or append when `before` is `None`.
    /// Inserting into an empty playlist points the decode head at the new
    /// item and queues a rewind to its start.
    pub fn insert(
        &self,
        file: Arc<AudioFile>,
        gain: f64,
        before: Option<ItemId>,
    ) -> Result<ItemId> {
        let mut state = self.shared.state.lock().unwrap();
        let id = ItemId::new();
        let item = PlaylistItem {
            id,
            file: Arc::clone(&file),
            gain,
        };

        match before {
            Some(next) => {
                let index = state.index_of(next).ok_or(Error::UnknownItem)?;
                state.items.insert(index, item);
            }
            None => {
                let was_empty = state.items.is_empty();
                state.items.push(item);
                if was_empty {
                    state.decode_head = Some(id);
                    file.request_seek(0.0, false);
                }
            }
        }

        debug!("inserted item {:?} (gain {})", id, gain);
        Ok(id)
    }

    /// Remove an item. If it is currently decoding, the decode head moves
    /// to the following item. Every sink's queue is purged of the item's
    /// buffers before this returns, and each sink's purge callback fires.
    pub fn remove(&self, id: ItemId) -> Result<()> {
        let removed = {
            let mut state = self.shared.state.lock().unwrap();
            let index = state.index_of(id).ok_or(Error::UnknownItem)?;

            if state.decode_head == Some(id) {
                state.decode_head = state.items.get(index + 1).map(|item| item.id);
            }

            let removed = state.items.remove(index);

            // every queued buffer of this item must be gone before the item is
            for group in &state.groups {
                for sink in &group.sinks {
                    sink.purge_item(id);
                }
            }

            removed
        };

        debug!("removed item {:?}", id);
        drop(removed);
        Ok(())
    }

    /// Remove every item, head first
    pub fn clear(&self) {
        loop {
            let head = {
                let state = self.shared.state.lock().unwrap();
                match state.items.first() {
                    Some(item) => item.id,
                    None => break,
                }
            };
            // the id was just read under the lock; removal cannot miss
            let _ = self.remove(head);
        }
    }

    /// Number of items
    pub fn count(&self) -> usize {
        self.shared.state.lock().unwrap().items.len()
    }

    /// Item ids in play order
    pub fn items(&self) -> Vec<ItemId> {
        self.shared
            .state
            .lock()
            .unwrap()
            .items
            .iter()
            .map(|item| item.id)
            .collect()
    }

    /// The file behind an item
    pub fn file(&self, id: ItemId) -> Result<Arc<AudioFile>> {
        let state = self.shared.state.lock().unwrap();
        state
            .item(id)
            .map(|item| Arc::clone(&item.file))
            .ok_or(Error::UnknownItem)
    }

    /// An item's gain
    pub fn gain(&self, id: ItemId) -> Result<f64> {
        let state = self.shared.state.lock().unwrap();
        state.item(id).map(|item| item.gain).ok_or(Error::UnknownItem)
    }

    /// Seek within an item's file and make it the decode head. Queued
    /// buffers in every sink are flushed when the decode thread performs
    /// the seek.
    pub fn seek(&self, id: ItemId, seconds: f64) -> Result<()> {
        let mut state = self.shared.state.lock().unwrap();
        let file = state
            .item(id)
            .map(|item| Arc::clone(&item.file))
            .ok_or(Error::UnknownItem)?;

        // file seek lock nests inside the playlist lock
        file.request_seek(seconds, true);
        state.decode_head = Some(id);
        Ok(())
    }

    /// Set an item's gain. Affects the composite volume immediately when
    /// the item is the decode head.
    pub fn set_gain(&self, id: ItemId, gain: f64) -> Result<()> {
        let mut state = self.shared.state.lock().unwrap();
        let index = state.index_of(id).ok_or(Error::UnknownItem)?;
        state.items[index].gain = gain;

        if state.decode_head == Some(id) {
            state.composite_volume = state.volume * gain;
        }
        Ok(())
    }

    /// Set the global volume multiplier
    pub fn set_volume(&self, volume: f64) {
        let mut state = self.shared.state.lock().unwrap();
        state.volume = volume;
        state.composite_volume = match state.decode_head.and_then(|id| state.item(id)) {
            Some(item) => volume * item.gain,
            None => volume,
        };
    }

    /// The global volume multiplier
    pub fn volume(&self) -> f64 {
        self.shared.state.lock().unwrap().volume
    }

    /// The decode head and its position in seconds, when decoding
    pub fn position(&self) -> Option<(ItemId, f64)> {
        let state = self.shared.state.lock().unwrap();
        let head = state.decode_head?;
        let seconds = state.item(head).map(|item| item.file.position())?;
        Some((head, seconds))
    }

    /// Resume production after [`Playlist::pause`]
    pub fn play(&self) {
        self.shared.paused.store(false, Ordering::Relaxed);
    }

    /// Pause. The decode thread latches the transition and notifies the
    /// current source.
    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::Relaxed);
    }

    pub fn playing(&self) -> bool {
        !self.shared.paused.load(Ordering::Relaxed)
    }

    /// Number of distinct output formats among attached sinks
    pub fn attached_format_count(&self) -> usize {
        self.shared.state.lock().unwrap().groups.len()
    }

    /// Times the filter graph has been built since creation. Unchanged
    /// volume and input parameters cause no rebuild.
    pub fn graph_rebuild_count(&self) -> u64 {
        self.shared.state.lock().unwrap().graph_builds
    }
}

impl Default for Playlist {
    fn default() -> Playlist {
        Playlist::new()
    }
}

impl Drop for Playlist {
    fn drop(&mut self) {
        self.clear();

        self.shared.abort.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }

        // detach every sink, unblocking any waiting consumer
        let groups = {
            let mut state = self.shared.state.lock().unwrap();
            state.graph = None;
            std::mem::take(&mut state.groups)
        };
        for group in groups {
            for sink in group.sinks {
                sink.queue.abort();
                sink.queue.flush();
            }
        }

        info!("playlist destroyed");
    }
}
