//! Simulated media platform
//!
//! An in-process implementation of [`MediaPlatform`] with scriptable
//! permission outcomes. Used by the demo binary and by tests to drive full
//! sessions without real devices. Every track, audio context and recorder it
//! hands out is kept so callers can inspect how they were used.

use super::constraints::{AudioContextOptions, DisplayConstraints, UserMediaConstraints};
use super::traits::{
    AudioContext, CaptureError, MediaPlatform, MediaRecorder, MediaStream, MediaTrack, NodeId,
    RecorderOptions, SourceKind, TrackKind,
};
use crate::mixer::MixerError;
use crate::recorder::machine::RecorderEventSink;
use crate::recorder::RecordingError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How a simulated permission prompt resolves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceResponse {
    Grant,
    Deny,
    Unavailable,
    /// The prompt never resolves
    Pending,
}

/// How the simulated recorder produces data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkMode {
    /// Chunks are only produced through [`SimulatedPlatform::emit_chunk`]
    Manual,
    /// A chunk sized from the bitrate is produced every timeslice
    Synthetic,
}

/// Scripted device behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatedDevices {
    pub display: DeviceResponse,
    /// Whether the display stream carries a system audio track
    pub system_audio: bool,
    pub microphone: DeviceResponse,
    pub webcam: DeviceResponse,
    /// Media types the encoder reports as supported
    pub supported_types: Vec<String>,
    pub chunk_mode: ChunkMode,
    /// Make `MediaRecorder::start` fail
    pub recorder_start_fails: bool,
}

impl Default for SimulatedDevices {
    fn default() -> Self {
        Self {
            display: DeviceResponse::Grant,
            system_audio: false,
            microphone: DeviceResponse::Grant,
            webcam: DeviceResponse::Grant,
            supported_types: vec![
                "video/webm;codecs=vp9,opus".to_string(),
                "video/webm;codecs=vp8,opus".to_string(),
                "video/webm".to_string(),
            ],
            chunk_mode: ChunkMode::Manual,
            recorder_start_fails: false,
        }
    }
}

/// A track handed out by the simulated platform
#[derive(Debug)]
pub struct SimulatedTrack {
    id: String,
    kind: TrackKind,
    label: String,
    stop_count: AtomicUsize,
    ended: watch::Sender<bool>,
}

impl SimulatedTrack {
    fn new(id: String, kind: TrackKind, label: &str) -> Self {
        let (ended, _) = watch::channel(false);
        Self {
            id,
            kind,
            label: label.to_string(),
            stop_count: AtomicUsize::new(0),
            ended,
        }
    }

    /// Number of times `stop` was called
    pub fn stop_count(&self) -> usize {
        self.stop_count.load(Ordering::SeqCst)
    }

    /// End the track from the platform side, like a revoked screen share
    pub fn end(&self) {
        self.ended.send_replace(true);
    }
}

impl MediaTrack for SimulatedTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn is_live(&self) -> bool {
        !*self.ended.borrow()
    }

    fn stop(&self) {
        self.stop_count.fetch_add(1, Ordering::SeqCst);
        self.ended.send_replace(true);
    }

    fn ended(&self) -> watch::Receiver<bool> {
        self.ended.subscribe()
    }
}

/// Observable record of one simulated audio context
#[derive(Debug)]
pub struct AudioContextProbe {
    pub options: AudioContextOptions,
    close_count: AtomicUsize,
    source_track_ids: Mutex<Vec<String>>,
    gains: Mutex<HashMap<NodeId, f32>>,
    connections: Mutex<Vec<(NodeId, NodeId)>>,
}

impl AudioContextProbe {
    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    /// IDs of tracks wired in as sources
    pub fn source_track_ids(&self) -> Vec<String> {
        self.source_track_ids.lock().clone()
    }

    /// Current gain values, in node creation order
    pub fn gains(&self) -> Vec<f32> {
        let gains = self.gains.lock();
        let mut nodes: Vec<_> = gains.iter().collect();
        nodes.sort_by_key(|(node, _)| node.0);
        nodes.into_iter().map(|(_, gain)| *gain).collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }
}

#[derive(Debug)]
struct SimulatedAudioContext {
    probe: Arc<AudioContextProbe>,
    next_node: u32,
    closed: bool,
    destination: Option<Arc<SimulatedTrack>>,
}

impl SimulatedAudioContext {
    fn node(&mut self) -> Result<NodeId, MixerError> {
        if self.closed {
            return Err(MixerError::Closed);
        }
        self.next_node += 1;
        Ok(NodeId(self.next_node))
    }
}

impl AudioContext for SimulatedAudioContext {
    fn sample_rate(&self) -> u32 {
        self.probe.options.sample_rate
    }

    fn create_track_source(&mut self, track: Arc<dyn MediaTrack>) -> Result<NodeId, MixerError> {
        if track.kind() != TrackKind::Audio {
            return Err(MixerError::Graph(format!("track {} is not audio", track.id())));
        }
        let node = self.node()?;
        self.probe
            .source_track_ids
            .lock()
            .push(track.id().to_string());
        Ok(node)
    }

    fn create_gain(&mut self, gain: f32) -> Result<NodeId, MixerError> {
        let node = self.node()?;
        self.probe.gains.lock().insert(node, gain);
        Ok(node)
    }

    fn set_gain(&mut self, node: NodeId, gain: f32) -> Result<(), MixerError> {
        if self.closed {
            return Err(MixerError::Closed);
        }
        match self.probe.gains.lock().get_mut(&node) {
            Some(value) => {
                *value = gain;
                Ok(())
            }
            None => Err(MixerError::Graph(format!("node {} is not a gain node", node.0))),
        }
    }

    fn create_stream_destination(&mut self) -> Result<(NodeId, MediaStream), MixerError> {
        let node = self.node()?;
        let track = Arc::new(SimulatedTrack::new(
            format!("mix-{}", node.0),
            TrackKind::Audio,
            "Mixed audio",
        ));
        self.destination = Some(track.clone());
        let output: Arc<dyn MediaTrack> = track;
        Ok((node, MediaStream::new(format!("mix-stream-{}", node.0), vec![output])))
    }

    fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), MixerError> {
        if self.closed {
            return Err(MixerError::Closed);
        }
        self.probe.connections.lock().push((from, to));
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
        self.probe.close_count.fetch_add(1, Ordering::SeqCst);
        if let Some(track) = self.destination.take() {
            track.end();
        }
    }
}

/// Observable record of one simulated recorder
#[derive(Debug)]
pub struct RecorderProbe {
    pub options: RecorderOptions,
    /// IDs of the tracks in the stream handed to the recorder
    pub track_ids: Vec<String>,
    pub audio_track_count: usize,
    started: AtomicBool,
    stop_calls: AtomicUsize,
    sink: RecorderEventSink,
}

impl RecorderProbe {
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct SimulatedRecorder {
    probe: Arc<RecorderProbe>,
    mode: ChunkMode,
    fail_start: bool,
    ticker: Option<(CancellationToken, JoinHandle<()>)>,
    stopped: bool,
}

impl SimulatedRecorder {
    fn bytes_per_slice(&self, timeslice_ms: u64) -> usize {
        let bits = (self.probe.options.video_bits_per_second as u64
            + self.probe.options.audio_bits_per_second as u64)
            * timeslice_ms
            / 1000;
        (bits / 8) as usize
    }
}

impl MediaRecorder for SimulatedRecorder {
    fn mime_type(&self) -> &str {
        &self.probe.options.mime_type
    }

    fn start(&mut self, timeslice_ms: u64) -> Result<(), RecordingError> {
        if self.fail_start {
            return Err(RecordingError::Encoder(
                "simulated encoder refused to start".to_string(),
            ));
        }
        self.probe.started.store(true, Ordering::SeqCst);

        if self.mode == ChunkMode::Synthetic {
            let token = CancellationToken::new();
            let sink = self.probe.sink.clone();
            let size = self.bytes_per_slice(timeslice_ms).max(1);
            let cancel = token.clone();
            let handle = tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_millis(timeslice_ms.max(1)));
                // The first tick completes immediately
                interval.tick().await;
                let mut sequence: u8 = 0;
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = interval.tick() => {
                            if !sink.data_available(vec![sequence; size]) {
                                break;
                            }
                            sequence = sequence.wrapping_add(1);
                        }
                    }
                }
            });
            self.ticker = Some((token, handle));
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RecordingError> {
        self.probe.stop_calls.fetch_add(1, Ordering::SeqCst);
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;

        let sink = self.probe.sink.clone();
        match self.ticker.take() {
            Some((token, handle)) => {
                token.cancel();
                // Acknowledge only after the ticker can no longer emit
                tokio::spawn(async move {
                    let _ = handle.await;
                    sink.stopped();
                });
            }
            None => {
                sink.stopped();
            }
        }
        Ok(())
    }
}

struct Inner {
    devices: Mutex<SimulatedDevices>,
    next_id: AtomicU32,
    tracks: Mutex<Vec<(SourceKind, Arc<SimulatedTrack>)>>,
    contexts: Mutex<Vec<Arc<AudioContextProbe>>>,
    recorders: Mutex<Vec<Arc<RecorderProbe>>>,
    user_media_requests: AtomicUsize,
    pending: Notify,
}

/// Scriptable in-process media platform
#[derive(Clone)]
pub struct SimulatedPlatform {
    inner: Arc<Inner>,
}

impl SimulatedPlatform {
    pub fn new(devices: SimulatedDevices) -> Self {
        Self {
            inner: Arc::new(Inner {
                devices: Mutex::new(devices),
                next_id: AtomicU32::new(0),
                tracks: Mutex::new(Vec::new()),
                contexts: Mutex::new(Vec::new()),
                recorders: Mutex::new(Vec::new()),
                user_media_requests: AtomicUsize::new(0),
                pending: Notify::new(),
            }),
        }
    }

    /// Change scripted behaviour for subsequent requests
    pub fn set_devices(&self, devices: SimulatedDevices) {
        *self.inner.devices.lock() = devices;
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{prefix}-{n}")
    }

    /// Create a standalone track that is not registered as acquired
    pub fn make_track(&self, kind: TrackKind, label: &str) -> Arc<SimulatedTrack> {
        Arc::new(SimulatedTrack::new(self.next_id("track"), kind, label))
    }

    fn acquire_track(&self, source: SourceKind, kind: TrackKind, label: &str) -> Arc<SimulatedTrack> {
        let track = self.make_track(kind, label);
        self.inner.tracks.lock().push((source, track.clone()));
        track
    }

    /// Every track handed out by a capture request
    pub fn tracks(&self) -> Vec<Arc<SimulatedTrack>> {
        self.inner.tracks.lock().iter().map(|(_, t)| t.clone()).collect()
    }

    /// Tracks handed out for one source
    pub fn tracks_for(&self, source: SourceKind) -> Vec<Arc<SimulatedTrack>> {
        self.inner
            .tracks
            .lock()
            .iter()
            .filter(|(s, _)| *s == source)
            .map(|(_, t)| t.clone())
            .collect()
    }

    pub fn user_media_requests(&self) -> usize {
        self.inner.user_media_requests.load(Ordering::SeqCst)
    }

    pub fn audio_contexts(&self) -> Vec<Arc<AudioContextProbe>> {
        self.inner.contexts.lock().clone()
    }

    pub fn recorders(&self) -> Vec<Arc<RecorderProbe>> {
        self.inner.recorders.lock().clone()
    }

    /// Wait until some request is parked on a prompt that never resolves
    pub async fn wait_for_pending_request(&self) {
        self.inner.pending.notified().await;
    }

    /// Push a chunk through the most recently created recorder.
    /// Returns false if there is no recorder or its session is gone.
    pub fn emit_chunk(&self, data: Vec<u8>) -> bool {
        match self.inner.recorders.lock().last() {
            Some(probe) => probe.sink.data_available(data),
            None => false,
        }
    }

    /// Report an encoder failure through the most recent recorder
    pub fn fail_recorder(&self, message: &str) -> bool {
        match self.inner.recorders.lock().last() {
            Some(probe) => probe.sink.error(message.to_string()),
            None => false,
        }
    }

    /// Stop the most recent recorder from the platform side, without a
    /// `stop()` call from the session
    pub fn end_recorder(&self) -> bool {
        match self.inner.recorders.lock().last() {
            Some(probe) => probe.sink.stopped(),
            None => false,
        }
    }

    /// End every display video track, as if the user revoked the share
    pub fn revoke_display(&self) {
        for track in self.tracks_for(SourceKind::Display) {
            if track.kind() == TrackKind::Video {
                track.end();
            }
        }
    }

    async fn resolve(&self, source: SourceKind, response: DeviceResponse) -> Result<(), CaptureError> {
        match response {
            DeviceResponse::Grant => Ok(()),
            DeviceResponse::Deny => Err(CaptureError::PermissionDenied(source)),
            DeviceResponse::Unavailable => Err(CaptureError::NotFound(source)),
            DeviceResponse::Pending => {
                tracing::debug!("Simulated {} prompt left pending", source);
                self.inner.pending.notify_one();
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl MediaPlatform for SimulatedPlatform {
    async fn get_display_media(
        &self,
        constraints: &DisplayConstraints,
    ) -> Result<MediaStream, CaptureError> {
        let (response, system_audio) = {
            let devices = self.inner.devices.lock();
            (devices.display, devices.system_audio)
        };
        self.resolve(SourceKind::Display, response).await?;

        let video: Arc<dyn MediaTrack> = self.acquire_track(
            SourceKind::Display,
            TrackKind::Video,
            &format!(
                "Screen {}x{}",
                constraints.video.ideal_width, constraints.video.ideal_height
            ),
        );
        let mut tracks = vec![video];
        if constraints.system_audio && system_audio {
            tracks.push(self.acquire_track(SourceKind::Display, TrackKind::Audio, "System audio"));
        }
        Ok(MediaStream::new(self.next_id("display"), tracks))
    }

    async fn get_user_media(
        &self,
        constraints: &UserMediaConstraints,
    ) -> Result<MediaStream, CaptureError> {
        self.inner.user_media_requests.fetch_add(1, Ordering::SeqCst);

        let (source, kind, label) = if constraints.video.is_some() {
            (SourceKind::Webcam, TrackKind::Video, "FaceTime HD Camera")
        } else {
            (SourceKind::Mic, TrackKind::Audio, "Built-in Microphone")
        };
        let response = {
            let devices = self.inner.devices.lock();
            match source {
                SourceKind::Webcam => devices.webcam,
                _ => devices.microphone,
            }
        };
        self.resolve(source, response).await?;

        let track: Arc<dyn MediaTrack> = self.acquire_track(source, kind, label);
        Ok(MediaStream::new(self.next_id(&source.to_string()), vec![track]))
    }

    fn create_audio_context(
        &self,
        options: &AudioContextOptions,
    ) -> Result<Box<dyn AudioContext>, MixerError> {
        let probe = Arc::new(AudioContextProbe {
            options: *options,
            close_count: AtomicUsize::new(0),
            source_track_ids: Mutex::new(Vec::new()),
            gains: Mutex::new(HashMap::new()),
            connections: Mutex::new(Vec::new()),
        });
        self.inner.contexts.lock().push(probe.clone());
        Ok(Box::new(SimulatedAudioContext {
            probe,
            next_node: 0,
            closed: false,
            destination: None,
        }))
    }

    fn is_type_supported(&self, mime_type: &str) -> bool {
        self.inner
            .devices
            .lock()
            .supported_types
            .iter()
            .any(|t| t == mime_type)
    }

    fn create_recorder(
        &self,
        stream: &MediaStream,
        options: &RecorderOptions,
        events: RecorderEventSink,
    ) -> Result<Box<dyn MediaRecorder>, RecordingError> {
        let (mode, fail_start) = {
            let devices = self.inner.devices.lock();
            (devices.chunk_mode, devices.recorder_start_fails)
        };
        let probe = Arc::new(RecorderProbe {
            options: options.clone(),
            track_ids: stream.tracks().iter().map(|t| t.id().to_string()).collect(),
            audio_track_count: stream.audio_tracks().count(),
            started: AtomicBool::new(false),
            stop_calls: AtomicUsize::new(0),
            sink: events,
        });
        self.inner.recorders.lock().push(probe.clone());
        Ok(Box::new(SimulatedRecorder {
            probe,
            mode,
            fail_start,
            ticker: None,
            stopped: false,
        }))
    }
}
