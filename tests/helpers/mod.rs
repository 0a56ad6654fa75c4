//! Test helper modules for playlist engine integration tests
//!
//! Provides deterministic synthetic audio sources so pipeline tests do not
//! depend on real media files, plus a WAV writer for exercising the
//! symphonia-backed path.

#![allow(dead_code)]

use platter::{
    AudioSource, ChannelLayout, InputFrame, InputSpec, Result, SampleFormat, SourceRead, TimeBase,
};
use std::f32::consts::PI;
use std::path::Path;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Initialize tracing once for the whole test binary
pub fn init_tracing() {
    use std::sync::Once;
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .try_init();
    });
}

/// Poll `cond` until it holds or `timeout` elapses
pub fn wait_for(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

/// Deterministic sine-wave source of a fixed length.
///
/// Emits interleaved f32 frames of `frames_per_read` frames each, with
/// presentation timestamps unless disabled. Seeks land on the exact frame.
pub struct ToneSource {
    sample_rate: u32,
    channels: usize,
    total_frames: u64,
    position: u64,
    frames_per_read: usize,
    amplitude: f32,
    frequency: f32,
    timestamps: bool,
}

impl ToneSource {
    pub fn new(sample_rate: u32, channels: usize, seconds: f64) -> ToneSource {
        ToneSource {
            sample_rate,
            channels,
            total_frames: (seconds * sample_rate as f64) as u64,
            position: 0,
            frames_per_read: 1024,
            amplitude: 0.5,
            frequency: 440.0,
            timestamps: true,
        }
    }

    pub fn with_frames_per_read(mut self, frames: usize) -> ToneSource {
        self.frames_per_read = frames;
        self
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> ToneSource {
        self.amplitude = amplitude;
        self
    }

    /// Drop presentation timestamps so the engine estimates the clock from
    /// delivered bytes
    pub fn without_timestamps(mut self) -> ToneSource {
        self.timestamps = false;
        self
    }
}

impl AudioSource for ToneSource {
    fn spec(&self) -> InputSpec {
        InputSpec {
            sample_rate: self.sample_rate,
            channel_layout: ChannelLayout::from_channel_count(self.channels),
            sample_format: SampleFormat::F32,
            time_base: TimeBase {
                num: 1,
                den: self.sample_rate,
            },
        }
    }

    fn read(&mut self) -> Result<SourceRead> {
        if self.position >= self.total_frames {
            return Ok(SourceRead::Eof);
        }

        let frames = self
            .frames_per_read
            .min((self.total_frames - self.position) as usize);
        let mut samples = Vec::with_capacity(frames * self.channels);
        for i in 0..frames {
            let t = (self.position + i as u64) as f32 / self.sample_rate as f32;
            let value = (2.0 * PI * self.frequency * t).sin() * self.amplitude;
            for _ in 0..self.channels {
                samples.push(value);
            }
        }

        let pts = if self.timestamps {
            Some(self.position as f64 / self.sample_rate as f64)
        } else {
            None
        };
        self.position += frames as u64;

        Ok(SourceRead::Frame(InputFrame { samples, pts }))
    }

    fn seek(&mut self, seconds: f64) -> Result<()> {
        let frame = (seconds * self.sample_rate as f64) as u64;
        self.position = frame.min(self.total_frames);
        Ok(())
    }
}

/// Source wrapper counting pause/resume hook invocations
pub struct PauseProbe {
    inner: ToneSource,
    pauses: Arc<AtomicUsize>,
    resumes: Arc<AtomicUsize>,
}

impl PauseProbe {
    pub fn new(inner: ToneSource) -> (PauseProbe, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let pauses = Arc::new(AtomicUsize::new(0));
        let resumes = Arc::new(AtomicUsize::new(0));
        let probe = PauseProbe {
            inner,
            pauses: Arc::clone(&pauses),
            resumes: Arc::clone(&resumes),
        };
        (probe, pauses, resumes)
    }
}

impl AudioSource for PauseProbe {
    fn spec(&self) -> InputSpec {
        self.inner.spec()
    }

    fn read(&mut self) -> Result<SourceRead> {
        self.inner.read()
    }

    fn seek(&mut self, seconds: f64) -> Result<()> {
        self.inner.seek(seconds)
    }

    fn pause(&mut self) {
        self.pauses.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }

    fn resume(&mut self) {
        self.resumes
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }
}

/// Write a 16-bit stereo sine WAV for the symphonia-backed path
pub fn write_sine_wav<P: AsRef<Path>>(
    path: P,
    sample_rate: u32,
    duration_ms: u64,
    frequency_hz: f32,
    amplitude: f32,
) -> std::result::Result<(), hound::Error> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    let total_frames = (sample_rate as u64 * duration_ms) / 1000;

    for i in 0..total_frames {
        let t = i as f32 / sample_rate as f32;
        let value = (2.0 * PI * frequency_hz * t).sin() * amplitude;
        let sample = (value * i16::MAX as f32) as i16;
        writer.write_sample(sample)?;
        writer.write_sample(sample)?;
    }

    writer.finalize()?;
    Ok(())
}
