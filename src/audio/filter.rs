//! Filter graph: one decoded input stream to N per-format output branches
//!
//! The graph applies the composite volume, splits the stream across one
//! branch per distinct sink format, and converts each branch to its target
//! channel layout, sample rate, and sample format:
//!
//! ```text
//! input -> [volume] -> [split(N)] -> remix/resample/convert -> branch queue  (for each format)
//! ```
//!
//! The volume stage is omitted when the clamped volume is exactly 1.0, and
//! the split when there is a single branch. The graph is immutable once
//! built; the decode thread tears it down and builds a fresh one whenever
//! the input spec, the composite volume, or the branch format set changes.

use crate::audio::types::{AudioFormat, InputSpec, SampleFormat};
use crate::error::{Error, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};
use std::collections::VecDeque;
use tracing::debug;

/// One format-converted frame pulled from a branch.
///
/// `data` is interleaved raw samples in the branch's sample format.
pub struct OutputFrame {
    pub data: Vec<u8>,
    pub frame_count: usize,
}

struct Branch {
    format: AudioFormat,
    pending: VecDeque<OutputFrame>,
}

/// The transform from one input stream to N per-format output streams
pub struct FilterGraph {
    input: InputSpec,
    /// Composite volume the graph was built with, unclamped. Compared
    /// exactly against the playlist's current value to decide rebuilds.
    built_volume: f64,
    /// Clamped gain applied by the volume stage; `None` when omitted
    gain: Option<f32>,
    branches: Vec<Branch>,
}

impl FilterGraph {
    /// Build a graph for the given input stream, composite volume, and
    /// branch formats (one per distinct sink format, in sink-map order).
    pub fn new(input: InputSpec, volume: f64, formats: &[AudioFormat]) -> Result<FilterGraph> {
        debug!(
            "graph input: rate={} layout={:#x} fmt={} tb={}/{}",
            input.sample_rate,
            input.channel_layout.bits(),
            input.sample_format.name(),
            input.time_base.num,
            input.time_base.den
        );

        let clamped = volume.clamp(0.0, 1.0);
        let gain = if clamped == 1.0 {
            None
        } else {
            debug!("graph volume: {}", clamped);
            Some(clamped as f32)
        };

        if formats.len() > 1 {
            debug!("graph split: {}", formats.len());
        }

        let branches = formats
            .iter()
            .map(|format| {
                debug!(
                    "graph branch: rate={} layout={:#x} fmt={}",
                    format.sample_rate,
                    format.channel_layout.bits(),
                    format.sample_format.name()
                );
                Branch {
                    format: *format,
                    pending: VecDeque::new(),
                }
            })
            .collect();

        Ok(FilterGraph {
            input,
            built_volume: volume,
            gain,
            branches,
        })
    }

    /// The input spec this graph was built for
    pub fn input_spec(&self) -> InputSpec {
        self.input
    }

    /// The unclamped composite volume this graph was built with
    pub fn built_volume(&self) -> f64 {
        self.built_volume
    }

    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    /// Whether the volume stage is present
    pub fn has_volume_stage(&self) -> bool {
        self.gain.is_some()
    }

    /// Whether the stream is split across multiple branches
    pub fn has_split_stage(&self) -> bool {
        self.branches.len() > 1
    }

    /// Submit one decoded input frame. Converted output accumulates in each
    /// branch's pending queue until pulled.
    pub fn push_frame(&mut self, samples: &[f32]) -> Result<()> {
        let in_channels = self.input.channel_layout.channels();
        if samples.is_empty() || in_channels == 0 {
            return Ok(());
        }

        let mut frame = samples.to_vec();
        if let Some(gain) = self.gain {
            for sample in &mut frame {
                *sample *= gain;
            }
        }

        for branch in &mut self.branches {
            let out = convert(&frame, in_channels, self.input.sample_rate, &branch.format)?;
            if out.frame_count > 0 {
                branch.pending.push_back(out);
            }
        }
        Ok(())
    }

    /// Pull the next converted frame from branch `index`, or `None` when
    /// the branch is drained.
    pub fn pull_frame(&mut self, index: usize) -> Option<OutputFrame> {
        self.branches.get_mut(index).and_then(|b| b.pending.pop_front())
    }
}

/// Convert one volume-adjusted input frame to a branch's target format
fn convert(samples: &[f32], in_channels: usize, in_rate: u32, target: &AudioFormat) -> Result<OutputFrame> {
    if target.channels() == 0 {
        return Err(Error::Filter("branch format has no channels".to_string()));
    }

    let remixed = remix(samples, in_channels, target.channels());
    let resampled = resample(&remixed, in_rate, target.sample_rate, target.channels())?;

    let frame_count = resampled.len() / target.channels().max(1);
    let mut data = Vec::with_capacity(resampled.len() * target.sample_format.bytes_per_sample());
    for &sample in &resampled {
        write_sample(target.sample_format, sample, &mut data);
    }

    Ok(OutputFrame { data, frame_count })
}

/// Remap interleaved samples from `in_channels` to `out_channels`.
///
/// Mono duplicates, stereo downmix averages alternating channels, anything
/// wider than the input repeats source channels.
fn remix(samples: &[f32], in_channels: usize, out_channels: usize) -> Vec<f32> {
    if in_channels == out_channels {
        return samples.to_vec();
    }

    let frames = samples.len() / in_channels;
    let mut out = Vec::with_capacity(frames * out_channels);

    for frame in samples.chunks_exact(in_channels) {
        match out_channels {
            1 => {
                let sum: f32 = frame.iter().sum();
                out.push(sum / in_channels as f32);
            }
            2 => {
                if in_channels == 1 {
                    out.push(frame[0]);
                    out.push(frame[0]);
                } else {
                    let mut left_sum = 0.0f32;
                    let mut right_sum = 0.0f32;
                    for (ch, &sample) in frame.iter().enumerate() {
                        if ch % 2 == 0 {
                            left_sum += sample;
                        } else {
                            right_sum += sample;
                        }
                    }
                    out.push(left_sum / (in_channels as f32 / 2.0));
                    out.push(right_sum / (in_channels as f32 / 2.0));
                }
            }
            _ => {
                for ch in 0..out_channels {
                    out.push(frame[ch % in_channels]);
                }
            }
        }
    }

    out
}

/// Resample interleaved audio between rates, one rubato pass per frame
fn resample(input: &[f32], in_rate: u32, out_rate: u32, channels: usize) -> Result<Vec<f32>> {
    if in_rate == out_rate {
        return Ok(input.to_vec());
    }

    let planar_input = deinterleave(input, channels);
    let input_frames = planar_input[0].len();
    if input_frames == 0 {
        return Ok(Vec::new());
    }

    let mut resampler = FastFixedIn::<f32>::new(
        out_rate as f64 / in_rate as f64,
        1.0,
        PolynomialDegree::Septic,
        input_frames,
        channels,
    )
    .map_err(|e| Error::Filter(format!("failed to create resampler: {}", e)))?;

    let planar_output = resampler
        .process(&planar_input, None)
        .map_err(|e| Error::Filter(format!("resampling failed: {}", e)))?;

    Ok(interleave(planar_output))
}

/// Convert interleaved samples to planar format for rubato
fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let frames = samples.len() / channels;
    let mut planar = vec![Vec::with_capacity(frames); channels];

    for frame in samples.chunks_exact(channels) {
        for (ch, &sample) in frame.iter().enumerate() {
            planar[ch].push(sample);
        }
    }

    planar
}

/// Convert planar samples back to interleaved format
fn interleave(planar: Vec<Vec<f32>>) -> Vec<f32> {
    if planar.is_empty() {
        return Vec::new();
    }

    let channels = planar.len();
    let frames = planar[0].len();
    let mut interleaved = Vec::with_capacity(frames * channels);

    for frame_idx in 0..frames {
        for channel in &planar {
            interleaved.push(channel[frame_idx]);
        }
    }

    interleaved
}

/// Encode one f32 sample into the target format's raw bytes
fn write_sample(fmt: SampleFormat, sample: f32, out: &mut Vec<u8>) {
    let sample = sample.clamp(-1.0, 1.0);
    match fmt {
        SampleFormat::U8 => out.push((sample * 127.0 + 128.0) as u8),
        SampleFormat::S16 => out.extend_from_slice(&((sample * i16::MAX as f32) as i16).to_ne_bytes()),
        SampleFormat::S32 => {
            out.extend_from_slice(&((sample as f64 * i32::MAX as f64) as i32).to_ne_bytes())
        }
        SampleFormat::F32 => out.extend_from_slice(&sample.to_ne_bytes()),
        SampleFormat::F64 => out.extend_from_slice(&(sample as f64).to_ne_bytes()),
    }
}
