//! # platter
//!
//! Audio playlist decode engine.
//!
//! **Purpose:** Continuously decode a user-managed ordered sequence of audio
//! files and deliver decoded, format-converted, volume-adjusted buffers to
//! any number of independent consumers ("sinks"), each with its own declared
//! output format.
//!
//! **Architecture:** One decode thread per [`Playlist`] drives a
//! read → decode → filter → fan-out pipeline built on symphonia + rubato.
//! Sinks sharing an output format share one branch of the filter graph; the
//! graph is rebuilt lazily whenever the input stream, the set of output
//! formats, or the composite volume changes.
//!
//! The engine never touches an audio device. It only produces buffers;
//! attaching a sink and draining it with [`Sink::get_buffer`] is the whole
//! consumer contract.

pub mod audio;
pub mod error;
pub mod playback;

pub use audio::source::{AudioFile, AudioSource, InputFrame, MediaFile, SourceRead};
pub use audio::types::{AudioFormat, ChannelLayout, InputSpec, SampleFormat, TimeBase};
pub use error::{Error, Result};
pub use playback::buffer::Buffer;
pub use playback::playlist::{ItemId, Playlist};
pub use playback::sink::{Sink, SinkRead};
