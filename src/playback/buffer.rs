//! Decoded audio buffers delivered to sinks
//!
//! A [`Buffer`] is one decoded, format-converted frame. Buffers are shared
//! between sinks by reference count (`Arc`): enqueueing clones the handle,
//! dropping the last handle releases the sample data. The originating-item
//! id is carried only so removed items' buffers can be purged by equality;
//! it is never dereferenced.

use crate::audio::types::AudioFormat;
use crate::playback::playlist::ItemId;

/// One decoded, format-converted audio frame
#[derive(Debug)]
pub struct Buffer {
    data: Vec<u8>,
    frame_count: usize,
    format: AudioFormat,
    pos: f64,
    item: ItemId,
}

impl Buffer {
    pub(crate) fn new(
        data: Vec<u8>,
        frame_count: usize,
        format: AudioFormat,
        pos: f64,
        item: ItemId,
    ) -> Buffer {
        Buffer {
            data,
            frame_count,
            format,
            pos,
            item,
        }
    }

    /// Raw interleaved sample bytes in this buffer's format
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Size of the sample data in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Number of interleaved frames
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Playback position of this buffer within its file, in seconds
    pub fn pos(&self) -> f64 {
        self.pos
    }

    /// Id of the playlist item this buffer was decoded from. Compare only;
    /// the item may already have been removed.
    pub fn item(&self) -> ItemId {
        self.item
    }

    /// View the data as f32 samples. The buffer's format must be f32.
    pub fn f32_samples(&self) -> Vec<f32> {
        debug_assert_eq!(
            self.format.sample_format,
            crate::audio::types::SampleFormat::F32
        );
        self.data
            .chunks_exact(4)
            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    }

    /// View the data as i16 samples. The buffer's format must be s16.
    pub fn i16_samples(&self) -> Vec<i16> {
        debug_assert_eq!(
            self.format.sample_format,
            crate::audio::types::SampleFormat::S16
        );
        self.data
            .chunks_exact(2)
            .map(|b| i16::from_ne_bytes([b[0], b[1]]))
            .collect()
    }
}
