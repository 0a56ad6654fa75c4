//! Decoded-stream sources
//!
//! [`AudioSource`] is the seam between the engine and the demux/decode
//! layer: one decoded frame per `read` call, a seek that lands on a time in
//! seconds, and pause/resume hooks for sources that care (network streams).
//! [`MediaFile`] is the symphonia-backed implementation for local files.
//!
//! [`AudioFile`] wraps a source with the shared control surface the engine
//! and external threads coordinate through: the seek request (under its own
//! lock, always acquired inside the playlist lock), the audio clock, and
//! the abort flag.

use crate::audio::types::{ChannelLayout, InputSpec, SampleFormat, TimeBase};
use crate::error::{Error, Result};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::SampleFormat as SymphoniaSampleFormat;
use symphonia::core::units::Time;
use tracing::debug;

/// One decoded audio frame in the source's native layout.
///
/// Samples are interleaved f32 across the source's channels. `pts` is the
/// presentation time of the frame in seconds when the container carries
/// timestamps; sources without timestamps leave it `None` and the engine
/// estimates the clock from delivered bytes instead.
#[derive(Debug)]
pub struct InputFrame {
    pub samples: Vec<f32>,
    pub pts: Option<f64>,
}

/// Result of reading one frame from a source
pub enum SourceRead {
    Frame(InputFrame),
    Eof,
}

/// A decoded audio stream the engine can drain.
///
/// Implementations decode one frame per `read` call. Decode failures for a
/// single packet surface as [`Error::Decode`] (the engine drops the packet
/// and continues); demuxer failures surface as [`Error::Read`] (the engine
/// treats the file as finished).
pub trait AudioSource: Send {
    /// Stream parameters the filter graph is built from
    fn spec(&self) -> InputSpec;

    /// Decode and return the next frame, or `Eof` at end of stream
    fn read(&mut self) -> Result<SourceRead>;

    /// Seek to a position in seconds and reset decoder state
    fn seek(&mut self, seconds: f64) -> Result<()>;

    /// Called when playback pauses. Only meaningful for streaming sources.
    fn pause(&mut self) {}

    /// Called when playback resumes after a pause.
    fn resume(&mut self) {}
}

/// Pending seek request for a file, guarded by [`AudioFile::seek`].
///
/// `flush` selects whether every sink's queue is discarded when the decode
/// thread performs the seek. User seeks flush; the automatic rewind when
/// the playlist advances to the next item does not.
pub(crate) struct SeekRequest {
    pub(crate) pos: Option<f64>,
    pub(crate) flush: bool,
}

/// Engine-facing handle for one playable file.
///
/// Holds the source plus the control state shared between the decode thread
/// and external threads. The seek lock is always acquired inside the
/// playlist lock, never the reverse.
pub struct AudioFile {
    pub(crate) source: Mutex<Box<dyn AudioSource>>,
    pub(crate) seek: Mutex<SeekRequest>,
    eof: AtomicBool,
    clock_bits: AtomicU64,
    abort: AtomicBool,
}

impl AudioFile {
    /// Wrap a decoded-stream source
    pub fn new(source: Box<dyn AudioSource>) -> Arc<AudioFile> {
        Arc::new(AudioFile {
            source: Mutex::new(source),
            seek: Mutex::new(SeekRequest {
                pos: None,
                flush: false,
            }),
            eof: AtomicBool::new(false),
            clock_bits: AtomicU64::new(0f64.to_bits()),
            abort: AtomicBool::new(false),
        })
    }

    /// Open a local audio file with the symphonia decoder
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Arc<AudioFile>> {
        let media = MediaFile::open(path)?;
        Ok(AudioFile::new(Box::new(media)))
    }

    /// Current decode position of this file in seconds
    pub fn position(&self) -> f64 {
        f64::from_bits(self.clock_bits.load(Ordering::Relaxed))
    }

    /// Request that the decode thread skip the rest of this file
    pub fn abort(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }

    pub(crate) fn aborted(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    pub(crate) fn set_clock(&self, seconds: f64) {
        self.clock_bits.store(seconds.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn is_eof(&self) -> bool {
        self.eof.load(Ordering::Relaxed)
    }

    pub(crate) fn set_eof(&self, eof: bool) {
        self.eof.store(eof, Ordering::Relaxed);
    }

    /// Queue a seek. The decode thread performs it at the top of the next
    /// frame, flushing every sink first when `flush` is set.
    pub(crate) fn request_seek(&self, seconds: f64, flush: bool) {
        let mut seek = self.seek.lock().unwrap();
        seek.pos = Some(seconds);
        seek.flush = flush;
    }
}

/// Symphonia-backed [`AudioSource`] for local files.
///
/// Probes the container with an extension hint, selects the first real
/// audio track, and decodes packet by packet. All decoded frames are
/// converted to interleaved f32 via symphonia's `SampleBuffer`.
pub struct MediaFile {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    spec: InputSpec,
}

impl MediaFile {
    /// Open and probe a file, preparing a decoder for its audio track
    pub fn open<P: AsRef<Path>>(path: P) -> Result<MediaFile> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| Error::UnsupportedCodec {
                path: path.to_path_buf(),
                codec: e.to_string(),
            })?;

        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::UnsupportedCodec {
                path: path.to_path_buf(),
                codec: "no audio track".to_string(),
            })?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| Error::Decode("sample rate not found".to_string()))?;

        let channel_layout = codec_params
            .channels
            .map(|c| ChannelLayout::from_bits(c.bits() as u64))
            .unwrap_or(ChannelLayout::STEREO);

        let sample_format = codec_params
            .sample_format
            .map(map_sample_format)
            .unwrap_or(SampleFormat::F32);

        let time_base = codec_params
            .time_base
            .map(|tb| TimeBase {
                num: tb.numer,
                den: tb.denom,
            })
            .unwrap_or(TimeBase {
                num: 1,
                den: sample_rate,
            });

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| Error::UnsupportedCodec {
                path: path.to_path_buf(),
                codec: e.to_string(),
            })?;

        debug!(
            "opened {}: rate={} layout={:#x} fmt={}",
            path.display(),
            sample_rate,
            channel_layout.bits(),
            sample_format.name()
        );

        Ok(MediaFile {
            format,
            decoder,
            track_id,
            spec: InputSpec {
                sample_rate,
                channel_layout,
                sample_format,
                time_base,
            },
        })
    }
}

impl AudioSource for MediaFile {
    fn spec(&self) -> InputSpec {
        self.spec
    }

    fn read(&mut self) -> Result<SourceRead> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(SourceRead::Eof);
                }
                Err(e) => return Err(Error::Read(e.to_string())),
            };

            // only the one audio track is decoded
            if packet.track_id() != self.track_id {
                continue;
            }

            let pts = self.spec.time_base.to_seconds(packet.ts());

            let decoded = self
                .decoder
                .decode(&packet)
                .map_err(|e| Error::Decode(e.to_string()))?;

            let spec = decoded.spec().to_owned();
            let duration = decoded.capacity() as u64;
            let mut buf = SampleBuffer::<f32>::new(duration, spec);
            buf.copy_interleaved_ref(decoded);

            return Ok(SourceRead::Frame(InputFrame {
                samples: buf.samples().to_vec(),
                pts: Some(pts),
            }));
        }
    }

    fn seek(&mut self, seconds: f64) -> Result<()> {
        let result = self.format.seek(
            SeekMode::Accurate,
            SeekTo::Time {
                time: Time::from(seconds),
                track_id: Some(self.track_id),
            },
        );

        // decoder state is flushed whether or not the seek landed
        self.decoder.reset();

        match result {
            Ok(_) => Ok(()),
            Err(e) => Err(Error::Seek {
                seconds,
                message: e.to_string(),
            }),
        }
    }
}

fn map_sample_format(fmt: SymphoniaSampleFormat) -> SampleFormat {
    match fmt {
        SymphoniaSampleFormat::U8 => SampleFormat::U8,
        SymphoniaSampleFormat::S16 => SampleFormat::S16,
        SymphoniaSampleFormat::S32 => SampleFormat::S32,
        SymphoniaSampleFormat::F64 => SampleFormat::F64,
        _ => SampleFormat::F32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_file_nonexistent() {
        let result = MediaFile::open("/nonexistent/file.mp3");
        assert!(result.is_err());
    }

    #[test]
    fn test_audio_file_clock() {
        struct Silent;
        impl AudioSource for Silent {
            fn spec(&self) -> InputSpec {
                InputSpec {
                    sample_rate: 44100,
                    channel_layout: ChannelLayout::STEREO,
                    sample_format: SampleFormat::F32,
                    time_base: TimeBase { num: 1, den: 44100 },
                }
            }
            fn read(&mut self) -> Result<SourceRead> {
                Ok(SourceRead::Eof)
            }
            fn seek(&mut self, _seconds: f64) -> Result<()> {
                Ok(())
            }
        }

        let file = AudioFile::new(Box::new(Silent));
        assert_eq!(file.position(), 0.0);
        file.set_clock(1.5);
        assert_eq!(file.position(), 1.5);
    }

    #[test]
    fn test_seek_request_overwrites() {
        struct Silent;
        impl AudioSource for Silent {
            fn spec(&self) -> InputSpec {
                InputSpec {
                    sample_rate: 44100,
                    channel_layout: ChannelLayout::MONO,
                    sample_format: SampleFormat::F32,
                    time_base: TimeBase { num: 1, den: 44100 },
                }
            }
            fn read(&mut self) -> Result<SourceRead> {
                Ok(SourceRead::Eof)
            }
            fn seek(&mut self, _seconds: f64) -> Result<()> {
                Ok(())
            }
        }

        let file = AudioFile::new(Box::new(Silent));
        file.request_seek(0.0, false);
        file.request_seek(5.0, true);

        let seek = file.seek.lock().unwrap();
        assert_eq!(seek.pos, Some(5.0));
        assert!(seek.flush);
    }
}
