//! Consumer endpoints
//!
//! A [`Sink`] declares the audio format it wants and drains decoded buffers
//! from its queue with [`Sink::get_buffer`]. Attachment groups the sink
//! with others sharing the same format; each group is fed by one branch of
//! the playlist's filter graph.
//!
//! Backpressure: a sink is full once its queued bytes reach
//! `min_queue_bytes`. The decode thread stops producing only when every
//! attached sink is full.

use crate::audio::types::AudioFormat;
use crate::error::{Error, Result};
use crate::playback::buffer::Buffer;
use crate::playback::playlist::{ItemId, Playlist, PlaylistShared};
use crate::playback::queue::{BufferQueue, QueueEntry};
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

/// Default sink queue depth in frames
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

type FlushFn = Box<dyn Fn(&Sink) + Send + Sync>;
type PurgeFn = Box<dyn Fn(&Sink, ItemId) + Send + Sync>;

/// Result of dequeueing from a sink
pub enum SinkRead {
    /// A decoded buffer in the sink's declared format
    Buffer(Arc<Buffer>),
    /// The playlist has been decoded to its end
    End,
    /// Queue momentarily empty, or aborted by detach
    Empty,
}

/// A consumer endpoint with a declared output format
pub struct Sink {
    format: AudioFormat,
    buffer_size: usize,
    pub(crate) queue: BufferQueue,
    playlist: Mutex<Weak<PlaylistShared>>,
    flush_cb: Option<FlushFn>,
    purge_cb: Option<PurgeFn>,
}

impl Sink {
    pub fn new(format: AudioFormat) -> Sink {
        Sink {
            format,
            buffer_size: DEFAULT_BUFFER_SIZE,
            queue: BufferQueue::new(),
            playlist: Mutex::new(Weak::new()),
            flush_cb: None,
            purge_cb: None,
        }
    }

    /// Override the queue depth, in frames of the sink's format
    pub fn with_buffer_size(mut self, frames: usize) -> Sink {
        self.buffer_size = frames;
        self
    }

    /// Callback invoked after the decode thread flushes this sink's queue
    /// following a seek
    pub fn on_flush(mut self, callback: impl Fn(&Sink) + Send + Sync + 'static) -> Sink {
        self.flush_cb = Some(Box::new(callback));
        self
    }

    /// Callback invoked after a removed item's buffers have been evicted
    /// from this sink's queue
    pub fn on_purge(mut self, callback: impl Fn(&Sink, ItemId) + Send + Sync + 'static) -> Sink {
        self.purge_cb = Some(Box::new(callback));
        self
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Queue depth in frames
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Bytes of audio per second in this sink's format
    pub fn bytes_per_sec(&self) -> usize {
        self.format.bytes_per_sec()
    }

    /// Backpressure threshold in bytes
    pub fn min_queue_bytes(&self) -> usize {
        self.buffer_size * self.format.frame_bytes()
    }

    /// Bytes currently queued (end-of-playlist markers excluded)
    pub fn queued_bytes(&self) -> usize {
        self.queue.queued_bytes()
    }

    /// Buffers currently queued (end-of-playlist markers excluded)
    pub fn queued_buffers(&self) -> usize {
        self.queue.queued_buffers()
    }

    /// Attach to a playlist. The sink joins the group matching its format,
    /// creating a new filter branch when no group matches.
    pub fn attach(self: &Arc<Self>, playlist: &Playlist) -> Result<()> {
        debug!(
            "attaching sink: rate={} layout={:#x} fmt={} queue={} bytes",
            self.format.sample_rate,
            self.format.channel_layout.bits(),
            self.format.sample_format.name(),
            self.min_queue_bytes()
        );

        playlist.shared().attach_sink(self);

        // clear any abort left over from a previous detach
        self.queue.reset();
        *self.playlist.lock().unwrap() = Arc::downgrade(playlist.shared());
        Ok(())
    }

    /// Detach from the playlist, aborting and draining the queue. Any
    /// blocked [`Sink::get_buffer`] call returns [`SinkRead::Empty`].
    pub fn detach(self: &Arc<Self>) -> Result<()> {
        let shared = self
            .playlist
            .lock()
            .unwrap()
            .upgrade()
            .ok_or(Error::NotAttached)?;

        self.queue.abort();
        self.queue.flush();

        let result = shared.remove_sink(self);
        *self.playlist.lock().unwrap() = Weak::new();
        result
    }

    /// Dequeue the next buffer. With `block`, waits for the decode thread
    /// to deliver one (or for the end-of-playlist marker, or an abort).
    /// Ownership of the returned buffer passes to the caller.
    pub fn get_buffer(&self, block: bool) -> SinkRead {
        match self.queue.get(block) {
            Some(QueueEntry::Audio(buffer)) => SinkRead::Buffer(buffer),
            Some(QueueEntry::End) => SinkRead::End,
            None => SinkRead::Empty,
        }
    }

    pub(crate) fn is_full(&self) -> bool {
        self.queue.queued_bytes() >= self.min_queue_bytes()
    }

    pub(crate) fn enqueue(&self, buffer: Arc<Buffer>) {
        self.queue.put(QueueEntry::Audio(buffer));
    }

    pub(crate) fn signal_end(&self) {
        self.queue.put(QueueEntry::End);
    }

    pub(crate) fn flush_queue(&self) {
        self.queue.flush();
        if let Some(callback) = &self.flush_cb {
            callback(self);
        }
    }

    pub(crate) fn purge_item(&self, item: ItemId) {
        self.queue.purge(item);
        if let Some(callback) = &self.purge_cb {
            callback(self, item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::types::{ChannelLayout, SampleFormat};

    #[test]
    fn test_derived_fields() {
        let format = AudioFormat::new(44100, ChannelLayout::STEREO, SampleFormat::S16);
        let sink = Sink::new(format);

        assert_eq!(sink.buffer_size(), DEFAULT_BUFFER_SIZE);
        assert_eq!(sink.bytes_per_sec(), 44100 * 2 * 2);
        assert_eq!(sink.min_queue_bytes(), DEFAULT_BUFFER_SIZE * 2 * 2);

        let small = Sink::new(format).with_buffer_size(1024);
        assert_eq!(small.min_queue_bytes(), 1024 * 4);
    }

    #[test]
    fn test_get_buffer_maps_queue_results() {
        let format = AudioFormat::new(44100, ChannelLayout::MONO, SampleFormat::F32);
        let sink = Sink::new(format);

        assert!(matches!(sink.get_buffer(false), SinkRead::Empty));

        sink.signal_end();
        assert!(matches!(sink.get_buffer(false), SinkRead::End));
    }

    #[test]
    fn test_detach_without_attach_fails() {
        let format = AudioFormat::new(44100, ChannelLayout::MONO, SampleFormat::F32);
        let sink = Arc::new(Sink::new(format));
        assert!(sink.detach().is_err());
    }
}
