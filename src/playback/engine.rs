//! The decode thread
//!
//! One thread per playlist drives read, decode, filter, and fan-out. Each
//! iteration's body runs under the playlist lock: idle when there is
//! nothing to decode (delivering the end-of-playlist marker exactly once),
//! back off while every sink is full, otherwise decode one frame and push
//! its converted output into every attached sink's queue.

use crate::audio::filter::FilterGraph;
use crate::audio::source::{AudioFile, SourceRead};
use crate::audio::types::{AudioFormat, InputSpec};
use crate::error::{Error, Result};
use crate::playback::buffer::Buffer;
use crate::playback::playlist::{ItemId, PlaylistShared, PlaylistState};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// How long to sleep when there is nothing to decode, or when every sink
/// is full
const NOOP_DELAY: Duration = Duration::from_millis(5);

/// Outcome of one decode step
enum Step {
    /// More of the current file remains
    Continue,
    /// The current file is complete; move to the next item
    Finished,
}

pub(crate) fn run(shared: Arc<PlaylistShared>) {
    info!("decode thread started");
    let mut last_paused = false;

    while !shared.abort.load(Ordering::Relaxed) {
        let mut state = shared.state.lock().unwrap();

        let Some(head) = state.decode_head else {
            // nothing to decode: tell every sink the playlist is done, once
            if !state.sent_end_of_q {
                for group in &state.groups {
                    for sink in &group.sinks {
                        sink.signal_end();
                    }
                }
                state.sent_end_of_q = true;
            }
            drop(state);
            std::thread::sleep(NOOP_DELAY);
            continue;
        };
        state.sent_end_of_q = false;

        // a slow sink only holds back production when no sink has room
        if every_sink_full(&state) {
            drop(state);
            std::thread::sleep(NOOP_DELAY);
            continue;
        }

        let (file, gain) = match state.item(head) {
            Some(item) => (Arc::clone(&item.file), item.gain),
            None => {
                state.decode_head = None;
                continue;
            }
        };
        state.composite_volume = gain * state.volume;

        match decode_one_frame(&shared, &mut state, head, &file, &mut last_paused) {
            Ok(Step::Continue) => {}
            Ok(Step::Finished) => advance_decode_head(&mut state, head),
            Err(e) => error!("decode iteration failed: {}", e),
        }
    }

    info!("decode thread exiting");
}

fn every_sink_full(state: &PlaylistState) -> bool {
    state
        .groups
        .iter()
        .flat_map(|group| group.sinks.iter())
        .all(|sink| sink.is_full())
}

fn flush_every_sink(state: &PlaylistState) {
    for group in &state.groups {
        for sink in &group.sinks {
            sink.flush_queue();
        }
    }
}

/// Move the decode head past `finished` and queue a rewind on the next
/// file so it starts from its beginning. Already-queued audio is kept.
fn advance_decode_head(state: &mut PlaylistState, finished: ItemId) {
    let next = state.next_of(finished);
    state.decode_head = next;

    if let Some(id) = next {
        if let Some(item) = state.item(id) {
            item.file.request_seek(0.0, false);
        }
    }
}

/// Rebuild the filter graph when the input stream, the sink-format set, or
/// the composite volume changed since the last build. The volume check is
/// an exact comparison against the value the graph was built with.
fn maybe_rebuild_graph(state: &mut PlaylistState, spec: InputSpec) -> Result<()> {
    let rebuild = match &state.graph {
        None => true,
        Some(graph) => {
            state.rebuild_graph
                || graph.input_spec() != spec
                || graph.built_volume() != state.composite_volume
        }
    };
    if !rebuild {
        return Ok(());
    }

    let formats: Vec<AudioFormat> = state.groups.iter().map(|group| group.format).collect();

    // tear down first; frames already delivered are unaffected
    state.graph = None;
    state.graph = Some(FilterGraph::new(spec, state.composite_volume, &formats)?);
    state.rebuild_graph = false;
    state.graph_builds += 1;
    Ok(())
}

/// Decode one frame of the current file and fan its converted output out
/// to every sink. Called with the playlist lock held.
fn decode_one_frame(
    shared: &PlaylistShared,
    state: &mut PlaylistState,
    head: ItemId,
    file: &Arc<AudioFile>,
    last_paused: &mut bool,
) -> Result<Step> {
    let mut source = file.source.lock().unwrap();

    maybe_rebuild_graph(state, source.spec())?;

    if file.aborted() {
        return Ok(Step::Finished);
    }

    // latch pause transitions so the source hooks run once per flip
    let paused = shared.paused.load(Ordering::Relaxed);
    if paused != *last_paused {
        *last_paused = paused;
        if paused {
            source.pause();
        } else {
            source.resume();
        }
    }

    // pending seek, under the file's seek lock
    {
        let mut seek = file.seek.lock().unwrap();
        if let Some(pos) = seek.pos.take() {
            match source.seek(pos) {
                Ok(()) => {
                    if seek.flush {
                        flush_every_sink(state);
                    }
                }
                // the request is still cleared; decoding resumes in place
                Err(e) => warn!("{}", e),
            }
            seek.flush = false;
            file.set_eof(false);
        }
    }

    if file.is_eof() {
        // symphonia decoders hold no delayed frames; the file is complete
        return Ok(Step::Finished);
    }

    let frame = match source.read() {
        Ok(SourceRead::Frame(frame)) => frame,
        Ok(SourceRead::Eof) => {
            file.set_eof(true);
            return Ok(Step::Continue);
        }
        Err(Error::Decode(message)) => {
            warn!("dropping undecodable packet: {}", message);
            return Ok(Step::Continue);
        }
        Err(e) => {
            warn!("read failed, treating as end of file: {}", e);
            file.set_eof(true);
            return Ok(Step::Continue);
        }
    };
    drop(source);

    if let Some(pts) = frame.pts {
        file.set_clock(pts);
    }

    let mut graph = state
        .graph
        .take()
        .ok_or_else(|| Error::Filter("graph missing after rebuild".to_string()))?;

    if let Err(e) = graph.push_frame(&frame.samples) {
        state.graph = Some(graph);
        return Err(e);
    }

    // pull each branch dry, wrapping output frames as shared buffers and
    // handing one reference to every sink in the branch's group
    let mut max_data_size = 0usize;
    let mut clock_adjustment = 0.0f64;

    for (index, group) in state.groups.iter().enumerate() {
        let example = &group.sinks[0];
        let mut data_size = 0usize;

        while let Some(out) = graph.pull_frame(index) {
            let buffer = Arc::new(Buffer::new(
                out.data,
                out.frame_count,
                group.format,
                file.position(),
                head,
            ));
            data_size += buffer.size();

            for sink in &group.sinks {
                sink.enqueue(Arc::clone(&buffer));
            }
            // the local handle drops here; if no sink accepted the buffer
            // that drop was the last reference
        }

        if data_size > max_data_size {
            max_data_size = data_size;
            clock_adjustment = data_size as f64 / example.bytes_per_sec() as f64;
        }
    }

    state.graph = Some(graph);

    // without timestamps, estimate the clock from the delivered bytes
    if frame.pts.is_none() {
        file.set_clock(file.position() + clock_adjustment);
    }

    Ok(Step::Continue)
}
