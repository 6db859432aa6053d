//! Stream composition
//!
//! The recorder input is the display's first video track plus every track of
//! the mixed audio stream. Tracks are shared references; nothing is re-encoded.

use crate::capture::MediaStream;

pub fn compose(display: &MediaStream, mixed_audio: &MediaStream) -> MediaStream {
    let mut combined = MediaStream::empty();

    if let Some(video) = display.video_tracks().next() {
        combined.add_track(video.clone());
    } else {
        let display_id = display.id();
        tracing::warn!("Display stream {} has no video track", display_id);
    }

    for track in mixed_audio.audio_tracks() {
        combined.add_track(track.clone());
    }

    tracing::debug!(
        "Composed stream {} with {} tracks",
        combined.id(),
        combined.tracks().len()
    );
    combined
}
