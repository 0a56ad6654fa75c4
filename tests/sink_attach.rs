//! Sink attachment tests: format grouping, detach behavior, and consumer
//! unblocking.

mod helpers;

use helpers::{init_tracing, ToneSource};
use platter::{AudioFile, AudioFormat, ChannelLayout, Playlist, SampleFormat, Sink, SinkRead};
use std::sync::Arc;
use std::time::Duration;

fn stereo_s16() -> AudioFormat {
    AudioFormat::new(44100, ChannelLayout::STEREO, SampleFormat::S16)
}

fn mono_f32() -> AudioFormat {
    AudioFormat::new(48000, ChannelLayout::MONO, SampleFormat::F32)
}

#[test]
fn test_sinks_group_by_format() {
    init_tracing();

    let playlist = Playlist::new();
    let s1 = Arc::new(Sink::new(stereo_s16()));
    let s2 = Arc::new(Sink::new(stereo_s16()));
    let s3 = Arc::new(Sink::new(mono_f32()));

    s1.attach(&playlist).unwrap();
    assert_eq!(playlist.attached_format_count(), 1);

    // same format joins the existing group
    s2.attach(&playlist).unwrap();
    assert_eq!(playlist.attached_format_count(), 1);

    // a new format opens a new group
    s3.attach(&playlist).unwrap();
    assert_eq!(playlist.attached_format_count(), 2);
}

#[test]
fn test_attach_detach_restores_map() {
    init_tracing();

    let playlist = Playlist::new();
    let s1 = Arc::new(Sink::new(stereo_s16()));
    s1.attach(&playlist).unwrap();
    assert_eq!(playlist.attached_format_count(), 1);

    let s2 = Arc::new(Sink::new(mono_f32()));
    s2.attach(&playlist).unwrap();
    assert_eq!(playlist.attached_format_count(), 2);

    s2.detach().unwrap();
    assert_eq!(playlist.attached_format_count(), 1);

    s1.detach().unwrap();
    assert_eq!(playlist.attached_format_count(), 0);

    // a detached sink cannot detach again
    assert!(s1.detach().is_err());
}

#[test]
fn test_group_survives_partial_detach() {
    init_tracing();

    let playlist = Playlist::new();
    let s1 = Arc::new(Sink::new(stereo_s16()));
    let s2 = Arc::new(Sink::new(stereo_s16()));
    s1.attach(&playlist).unwrap();
    s2.attach(&playlist).unwrap();

    s1.detach().unwrap();
    assert_eq!(playlist.attached_format_count(), 1);

    s2.detach().unwrap();
    assert_eq!(playlist.attached_format_count(), 0);
}

#[test]
fn test_detach_unblocks_waiting_consumer() {
    init_tracing();

    let playlist = Playlist::new();
    let file = AudioFile::new(Box::new(ToneSource::new(44100, 2, 10.0)));
    playlist.insert(file, 1.0, None).unwrap();

    // zero-frame threshold: the sink counts as full, so nothing is produced
    // and the consumer stays blocked until detach aborts the queue
    let sink = Arc::new(Sink::new(stereo_s16()).with_buffer_size(0));
    sink.attach(&playlist).unwrap();

    let waiter = {
        let sink = Arc::clone(&sink);
        std::thread::spawn(move || matches!(sink.get_buffer(true), SinkRead::Empty))
    };

    std::thread::sleep(Duration::from_millis(50));
    sink.detach().unwrap();

    assert!(waiter.join().unwrap(), "blocked get must resolve to Empty");
}

#[test]
fn test_reattach_after_detach_delivers_again() {
    init_tracing();

    let playlist = Playlist::new();
    let sink = Arc::new(Sink::new(stereo_s16()).with_buffer_size(44100 * 4));
    sink.attach(&playlist).unwrap();
    sink.detach().unwrap();

    let file = AudioFile::new(Box::new(ToneSource::new(44100, 2, 0.2)));
    playlist.insert(file, 1.0, None).unwrap();

    // the queue abort from detach is cleared on reattach
    sink.attach(&playlist).unwrap();

    let mut frames = 0usize;
    loop {
        match sink.get_buffer(true) {
            SinkRead::Buffer(buffer) => frames += buffer.frame_count(),
            SinkRead::End => break,
            SinkRead::Empty => panic!("queue aborted unexpectedly"),
        }
    }
    assert_eq!(frames, (0.2 * 44100.0) as usize);
}

#[test]
fn test_playlist_drop_detaches_sinks() {
    init_tracing();

    let playlist = Playlist::new();
    let file = AudioFile::new(Box::new(ToneSource::new(44100, 2, 10.0)));
    playlist.insert(file, 1.0, None).unwrap();

    let sink = Arc::new(Sink::new(stereo_s16()).with_buffer_size(0));
    sink.attach(&playlist).unwrap();

    // teardown clears the playlist before stopping the thread, so the
    // waiter may see either the end marker or the queue abort
    let waiter = {
        let sink = Arc::clone(&sink);
        std::thread::spawn(move || !matches!(sink.get_buffer(true), SinkRead::Buffer(_)))
    };

    std::thread::sleep(Duration::from_millis(50));
    drop(playlist);

    assert!(waiter.join().unwrap(), "drop must unblock waiting consumers");
}
