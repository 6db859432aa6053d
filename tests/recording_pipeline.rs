//! End-to-end sessions against the simulated platform

use screen_recorder_lib::capture::simulated::{DeviceResponse, SimulatedDevices, SimulatedPlatform};
use screen_recorder_lib::capture::{MediaTrack, SourceKind, TrackKind};
use screen_recorder_lib::config::RecorderConfig;
use screen_recorder_lib::export::DirectoryDownloads;
use screen_recorder_lib::recorder::{RecorderHandle, RecordingPhase, RecordingQuality, RecordingSettings};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::{tempdir, TempDir};

struct Harness {
    platform: SimulatedPlatform,
    handle: RecorderHandle,
    dir: TempDir,
}

fn harness(devices: SimulatedDevices) -> Harness {
    let dir = tempdir().unwrap();
    let platform = SimulatedPlatform::new(devices);
    let handle = RecorderHandle::spawn(
        Arc::new(platform.clone()),
        Arc::new(DirectoryDownloads::new(dir.path())),
        RecorderConfig::default(),
    );
    Harness {
        platform,
        handle,
        dir,
    }
}

fn settings(enable_mic: bool, enable_webcam: bool) -> RecordingSettings {
    RecordingSettings {
        enable_mic,
        enable_webcam,
        ..RecordingSettings::default()
    }
}

fn saved_files(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut files: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    files.sort();
    files
}

/// Poll until `check` holds; the acquisition task releases on its own schedule
async fn eventually(check: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_webcam_denied_recording_continues() {
    let h = harness(SimulatedDevices {
        webcam: DeviceResponse::Deny,
        ..SimulatedDevices::default()
    });

    h.handle.start(settings(true, true)).await.unwrap();
    let status = h.handle.wait_until_settled().await.unwrap();

    assert_eq!(status.phase, RecordingPhase::Recording);
    assert!(!h.handle.preview().is_attached());
    let recorder = &h.platform.recorders()[0];
    assert_eq!(recorder.track_ids.len(), 2);
    assert_eq!(recorder.audio_track_count, 1);

    h.platform.emit_chunk(vec![1; 16]);
    let status = h.handle.stop_and_wait().await.unwrap();
    assert_eq!(status.last_export.unwrap().size_bytes, 16);
}

#[tokio::test]
async fn test_display_denied_never_records() {
    let h = harness(SimulatedDevices {
        display: DeviceResponse::Deny,
        ..SimulatedDevices::default()
    });

    h.handle.start(settings(true, true)).await.unwrap();
    let status = h.handle.wait_until_settled().await.unwrap();

    assert_eq!(status.phase, RecordingPhase::Idle);
    assert!(!status.is_recording());
    assert_eq!(status.chunk_count, 0);
    assert!(status.last_error.unwrap().contains("Permission denied"));
    // Mic and webcam are never requested once the display is refused
    assert_eq!(h.platform.user_media_requests(), 0);
    assert!(h.platform.recorders().is_empty());
    assert!(h.platform.audio_contexts().is_empty());
    assert!(saved_files(h.dir.path()).is_empty());
}

#[tokio::test]
async fn test_artifact_is_chunks_in_order() {
    let h = harness(SimulatedDevices::default());
    h.handle.start(settings(true, false)).await.unwrap();
    h.handle.wait_until_settled().await.unwrap();

    let chunks: Vec<Vec<u8>> = vec![b"first".to_vec(), Vec::new(), b"-second".to_vec(), b"-third".to_vec()];
    for chunk in &chunks {
        assert!(h.platform.emit_chunk(chunk.clone()));
    }
    let recording = h.handle.wait_for(|s| s.chunk_count == 3).await.unwrap();
    assert_eq!(recording.recorded_bytes, 18);

    let status = h.handle.stop_and_wait().await.unwrap();
    let summary = status.last_export.unwrap();
    let path = summary.saved_path.unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), b"first-second-third");
    assert_eq!(summary.size_bytes, 18);
    assert_eq!(summary.chunk_count, 3);
    assert_eq!(status.chunk_count, 0);
}

#[tokio::test]
async fn test_double_stop_releases_once() {
    let h = harness(SimulatedDevices::default());
    h.handle.start(settings(true, true)).await.unwrap();
    h.handle.wait_until_settled().await.unwrap();
    assert!(h.handle.preview().is_attached());
    h.platform.emit_chunk(vec![9; 4]);

    h.handle.stop().await.unwrap();
    h.handle.stop().await.unwrap();
    h.handle.wait_until_idle().await.unwrap();
    h.handle.stop().await.unwrap();

    assert_eq!(h.platform.recorders()[0].stop_calls(), 1);
    assert_eq!(h.platform.audio_contexts()[0].close_count(), 1);
    assert_eq!(h.platform.tracks().len(), 3);
    assert!(h.platform.tracks().iter().all(|t| t.stop_count() == 1));
    assert!(!h.handle.preview().is_attached());
    assert_eq!(saved_files(h.dir.path()).len(), 1);
}

#[tokio::test]
async fn test_revoked_share_ends_session() {
    let h = harness(SimulatedDevices {
        system_audio: true,
        ..SimulatedDevices::default()
    });
    h.handle.start(settings(true, false)).await.unwrap();
    h.handle.wait_until_settled().await.unwrap();
    // System audio and mic both feed the mix
    assert_eq!(h.platform.audio_contexts()[0].source_track_ids().len(), 2);
    h.platform.emit_chunk(vec![5; 10]);
    h.handle.wait_for(|s| s.chunk_count == 1).await.unwrap();

    h.platform.revoke_display();
    let status = h.handle.wait_until_idle().await.unwrap();
    // A late user stop changes nothing
    h.handle.stop().await.unwrap();

    assert_eq!(status.last_export.unwrap().size_bytes, 10);
    assert_eq!(h.platform.recorders()[0].stop_calls(), 1);
    assert_eq!(h.platform.audio_contexts()[0].close_count(), 1);
    assert!(h.platform.tracks().iter().all(|t| t.stop_count() == 1));
}

#[tokio::test]
async fn test_mic_track_ending_does_not_stop() {
    let h = harness(SimulatedDevices::default());
    h.handle.start(settings(true, false)).await.unwrap();
    h.handle.wait_until_settled().await.unwrap();

    for track in h.platform.tracks_for(SourceKind::Mic) {
        track.end();
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.handle.status().phase, RecordingPhase::Recording);

    h.handle.stop_and_wait().await.unwrap();
}

#[tokio::test]
async fn test_sessions_get_distinct_file_names() {
    let h = harness(SimulatedDevices::default());
    let mut names = Vec::new();

    for n in 0..2u8 {
        h.handle.start(settings(false, false)).await.unwrap();
        h.handle.wait_until_settled().await.unwrap();
        h.platform.emit_chunk(vec![n; 3]);
        let status = h.handle.stop_and_wait().await.unwrap();
        names.push(status.last_export.unwrap().file_name);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_ne!(names[0], names[1]);
    for name in &names {
        assert!(name.starts_with("screen-recording-"));
        assert!(!name.contains(':'));
        assert_eq!(name.matches('.').count(), 1);
        assert!(name.ends_with(".webm"));
    }
    assert_eq!(saved_files(h.dir.path()).len(), 2);
}

#[tokio::test]
async fn test_medium_quality_with_mic() {
    let h = harness(SimulatedDevices::default());
    let settings = RecordingSettings {
        enable_mic: true,
        enable_webcam: false,
        auto_download: true,
        recording_quality: RecordingQuality::Medium,
    };

    h.handle.start(settings).await.unwrap();
    let status = h.handle.wait_until_settled().await.unwrap();
    assert_eq!(status.mime_type.as_deref(), Some("video/webm;codecs=vp9,opus"));

    let recorder = &h.platform.recorders()[0];
    assert_eq!(recorder.options.video_bits_per_second, 4_000_000);
    assert_eq!(recorder.options.audio_bits_per_second, 256_000);
    assert_eq!(recorder.audio_track_count, 1);
    assert!(h.platform.tracks_for(SourceKind::Webcam).is_empty());

    for i in 0..8u8 {
        h.platform.emit_chunk(vec![i; 100]);
    }
    h.handle.wait_for(|s| s.chunk_count == 8).await.unwrap();
    let status = h.handle.stop_and_wait().await.unwrap();

    let summary = status.last_export.unwrap();
    assert_eq!(summary.chunk_count, 8);
    assert_eq!(summary.size_bytes, 800);
    // webm is not broadly playable, so the user gets a link to open it
    let hint = summary.compatibility_hint.unwrap();
    assert!(hint.open_url.unwrap().starts_with("file://"));
}

#[tokio::test]
async fn test_mic_denied_records_without_audio() {
    let h = harness(SimulatedDevices {
        microphone: DeviceResponse::Deny,
        ..SimulatedDevices::default()
    });

    h.handle.start(settings(true, true)).await.unwrap();
    let status = h.handle.wait_until_settled().await.unwrap();

    assert_eq!(status.phase, RecordingPhase::Recording);
    assert!(h.handle.preview().is_attached());
    let recorder = &h.platform.recorders()[0];
    assert_eq!(recorder.audio_track_count, 0);
    // The webcam is previewed, not recorded
    assert_eq!(recorder.track_ids.len(), 1);
    assert!(h.platform.audio_contexts()[0].source_track_ids().is_empty());

    h.platform.emit_chunk(vec![1]);
    h.handle.stop_and_wait().await.unwrap();
    assert_eq!(h.platform.audio_contexts()[0].close_count(), 1);
    assert!(!h.handle.preview().is_attached());
}

#[tokio::test]
async fn test_mic_denied_keeps_system_audio() {
    let h = harness(SimulatedDevices {
        microphone: DeviceResponse::Deny,
        system_audio: true,
        ..SimulatedDevices::default()
    });

    h.handle.start(settings(true, true)).await.unwrap();
    let status = h.handle.wait_until_settled().await.unwrap();

    assert_eq!(status.phase, RecordingPhase::Recording);
    assert!(h.handle.preview().is_attached());
    let recorder = &h.platform.recorders()[0];
    assert_eq!(recorder.audio_track_count, 1);
    assert_eq!(recorder.track_ids.len(), 2);

    let system_audio: Vec<String> = h
        .platform
        .tracks_for(SourceKind::Display)
        .iter()
        .filter(|t| t.kind() == TrackKind::Audio)
        .map(|t| t.id().to_string())
        .collect();
    assert_eq!(system_audio.len(), 1);
    assert_eq!(h.platform.audio_contexts()[0].source_track_ids(), system_audio);

    h.platform.emit_chunk(vec![2; 8]);
    let status = h.handle.stop_and_wait().await.unwrap();
    assert_eq!(status.last_export.unwrap().size_bytes, 8);
    assert!(h.platform.tracks().iter().all(|t| t.stop_count() == 1));
    assert!(!h.handle.preview().is_attached());
}

#[tokio::test]
async fn test_stop_while_prompt_pending_rolls_back() {
    let h = harness(SimulatedDevices {
        microphone: DeviceResponse::Pending,
        ..SimulatedDevices::default()
    });

    h.handle.start(settings(true, false)).await.unwrap();
    h.platform.wait_for_pending_request().await;
    assert_eq!(h.handle.status().phase, RecordingPhase::Requesting);

    let status = {
        h.handle.stop().await.unwrap();
        h.handle.wait_until_idle().await.unwrap()
    };
    assert!(status.last_export.is_none());

    // The display stream granted before the mic prompt is released
    let display = h.platform.tracks_for(SourceKind::Display);
    assert_eq!(display.len(), 1);
    eventually(|| display[0].stop_count() == 1).await;
    assert!(h.platform.recorders().is_empty());

    // A fresh session can start afterwards
    h.platform.set_devices(SimulatedDevices::default());
    h.handle.start(settings(true, false)).await.unwrap();
    let status = h.handle.wait_until_settled().await.unwrap();
    assert_eq!(status.phase, RecordingPhase::Recording);
    h.handle.stop_and_wait().await.unwrap();
}

#[tokio::test]
async fn test_auto_download_off_keeps_artifact() {
    let h = harness(SimulatedDevices::default());
    let settings = RecordingSettings {
        auto_download: false,
        ..RecordingSettings::default()
    };

    h.handle.start(settings).await.unwrap();
    h.handle.wait_until_settled().await.unwrap();
    h.platform.emit_chunk(b"kept".to_vec());
    let status = h.handle.stop_and_wait().await.unwrap();

    assert!(status.last_export.unwrap().saved_path.is_none());
    assert!(saved_files(h.dir.path()).is_empty());

    let summary = h.handle.save_last_recording().await.unwrap();
    let path = summary.saved_path.unwrap();
    assert_eq!(std::fs::read(path).unwrap(), b"kept");
    assert!(h.handle.save_last_recording().await.is_err());
}

#[tokio::test]
async fn test_encoder_start_failure_releases_everything() {
    let h = harness(SimulatedDevices {
        recorder_start_fails: true,
        ..SimulatedDevices::default()
    });

    h.handle.start(settings(true, true)).await.unwrap();
    let status = h.handle.wait_until_settled().await.unwrap();

    assert_eq!(status.phase, RecordingPhase::Idle);
    assert!(status.last_error.unwrap().contains("Encoder"));
    assert_eq!(h.platform.audio_contexts()[0].close_count(), 1);
    assert!(h.platform.tracks().iter().all(|t| t.stop_count() == 1));
    assert!(!h.handle.preview().is_attached());
}

#[tokio::test]
async fn test_encoder_error_mid_session_keeps_data() {
    let h = harness(SimulatedDevices::default());
    h.handle.start(settings(false, false)).await.unwrap();
    h.handle.wait_until_settled().await.unwrap();
    h.platform.emit_chunk(vec![3; 6]);

    h.platform.fail_recorder("disk full");
    let status = h.handle.wait_until_idle().await.unwrap();

    assert_eq!(status.last_export.unwrap().size_bytes, 6);
    assert!(status.last_error.unwrap().contains("disk full"));
    let display = h.platform.tracks_for(SourceKind::Display);
    assert!(display.iter().all(|t| t.kind() != TrackKind::Video || t.stop_count() == 1));
}

#[tokio::test]
async fn test_stop_without_chunks_returns_to_idle() {
    let h = harness(SimulatedDevices::default());
    h.handle.start(settings(false, false)).await.unwrap();
    h.handle.wait_until_settled().await.unwrap();

    let status = h.handle.stop_and_wait().await.unwrap();

    assert_eq!(status.phase, RecordingPhase::Idle);
    assert!(status.last_export.is_none());
    assert!(status.last_error.is_some());
    assert!(saved_files(h.dir.path()).is_empty());
}

#[tokio::test]
async fn test_recorder_ending_on_its_own_is_not_stopped_again() {
    let h = harness(SimulatedDevices::default());
    h.handle.start(settings(true, false)).await.unwrap();
    h.handle.wait_until_settled().await.unwrap();
    h.platform.emit_chunk(vec![4; 4]);
    h.handle.wait_for(|s| s.chunk_count == 1).await.unwrap();

    assert!(h.platform.end_recorder());
    let status = h.handle.wait_until_idle().await.unwrap();

    assert_eq!(status.last_export.unwrap().size_bytes, 4);
    assert_eq!(h.platform.recorders()[0].stop_calls(), 0);
    assert_eq!(h.platform.audio_contexts()[0].close_count(), 1);
    assert!(h.platform.tracks().iter().all(|t| t.stop_count() == 1));
    assert_eq!(saved_files(h.dir.path()).len(), 1);
}

#[tokio::test]
async fn test_unsaved_recording_is_replaced_by_next_session() {
    let h = harness(SimulatedDevices::default());
    let settings = RecordingSettings {
        auto_download: false,
        ..RecordingSettings::default()
    };

    for data in [b"older".to_vec(), b"newer".to_vec()] {
        h.handle.start(settings.clone()).await.unwrap();
        h.handle.wait_until_settled().await.unwrap();
        h.platform.emit_chunk(data);
        h.handle.stop_and_wait().await.unwrap();
    }

    let artifact = h.handle.take_last_recording().await.unwrap().unwrap();
    assert_eq!(artifact.data, b"newer");
    assert!(h.handle.take_last_recording().await.unwrap().is_none());
}
