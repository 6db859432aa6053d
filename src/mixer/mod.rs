//! Audio mixing graph
//!
//! Wires every live audio input through its own gain node into one shared
//! destination, producing a single mixed stream for the recorder:
//!
//! ```text
//! mic track    -> source -> gain(1.0) -\
//!                                       +-> destination -> mixed stream
//! system audio -> source -> gain(1.0) -/
//! ```
//!
//! Per-input gain nodes allow balancing sources without re-acquiring them.

use crate::capture::constraints::AudioContextOptions;
use crate::capture::traits::{AudioContext, MediaPlatform, MediaStream, MediaTrack, NodeId, SourceKind};
use std::sync::Arc;
use thiserror::Error;

/// Mixer errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MixerError {
    #[error("Audio context is closed")]
    Closed,

    #[error("Audio graph error: {0}")]
    Graph(String),

    #[error("Audio context unavailable: {0}")]
    Unavailable(String),

    #[error("No audio input from {0}")]
    NoSuchSource(SourceKind),
}

/// Wiring for one input track
#[derive(Debug, Clone)]
pub struct AudioGraphNode {
    pub source: SourceKind,
    pub track_id: String,
    pub source_node: NodeId,
    pub gain_node: NodeId,
    pub destination_node: NodeId,
    pub gain: f32,
}

/// Open mixing graph. Closing (explicitly or on drop) tears down the context.
#[derive(Debug)]
pub struct AudioMixer {
    context: Box<dyn AudioContext>,
    nodes: Vec<AudioGraphNode>,
    output: MediaStream,
    closed: bool,
}

impl AudioMixer {
    /// Create the context and wire each input into the mix.
    ///
    /// With no inputs the output stream is empty; that is not an error.
    pub fn open(
        platform: &dyn MediaPlatform,
        options: &AudioContextOptions,
        inputs: Vec<(SourceKind, Arc<dyn MediaTrack>)>,
    ) -> Result<Self, MixerError> {
        let context = platform.create_audio_context(options)?;
        tracing::debug!(
            "Opened audio context at {} Hz for {} inputs",
            context.sample_rate(),
            inputs.len()
        );

        let mut mixer = Self {
            context,
            nodes: Vec::new(),
            output: MediaStream::empty(),
            closed: false,
        };

        if inputs.is_empty() {
            tracing::info!("No audio inputs, recording without audio");
            return Ok(mixer);
        }

        // A failure below drops `mixer`, which closes the context.
        let (destination, output) = mixer.context.create_stream_destination()?;
        for (source, track) in inputs {
            let track_id = track.id().to_string();
            let source_node = mixer.context.create_track_source(track)?;
            let gain_node = mixer.context.create_gain(1.0)?;
            mixer.context.connect(source_node, gain_node)?;
            mixer.context.connect(gain_node, destination)?;

            tracing::debug!("Mixed {} track {}", source, track_id);
            mixer.nodes.push(AudioGraphNode {
                source,
                track_id,
                source_node,
                gain_node,
                destination_node: destination,
                gain: 1.0,
            });
        }
        mixer.output = output;

        Ok(mixer)
    }

    /// The mixed stream; zero or more audio tracks
    pub fn output(&self) -> &MediaStream {
        &self.output
    }

    pub fn nodes(&self) -> &[AudioGraphNode] {
        &self.nodes
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Set the gain of every input from `source`. Returns how many nodes changed.
    pub fn set_source_gain(&mut self, source: SourceKind, gain: f32) -> Result<usize, MixerError> {
        if self.closed {
            return Err(MixerError::Closed);
        }
        if !gain.is_finite() || gain < 0.0 {
            return Err(MixerError::Graph(format!("invalid gain {gain}")));
        }

        let mut changed = 0;
        for node in self.nodes.iter_mut().filter(|n| n.source == source) {
            self.context.set_gain(node.gain_node, gain)?;
            node.gain = gain;
            changed += 1;
        }

        if changed == 0 {
            return Err(MixerError::NoSuchSource(source));
        }
        tracing::info!("Set {} gain to {}", source, gain);
        Ok(changed)
    }

    /// Close the audio context. Calling again is a no-op.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.nodes.clear();
        self.context.close();
        tracing::debug!("Closed audio context");
    }
}

impl Drop for AudioMixer {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::simulated::{SimulatedDevices, SimulatedPlatform};
    use crate::capture::TrackKind;

    fn audio_input(platform: &SimulatedPlatform, source: SourceKind) -> (SourceKind, Arc<dyn MediaTrack>) {
        let track: Arc<dyn MediaTrack> = platform.make_track(TrackKind::Audio, "input");
        (source, track)
    }

    #[test]
    fn test_mix_two_inputs_into_one_output() {
        let platform = SimulatedPlatform::new(SimulatedDevices::default());
        let inputs = vec![
            audio_input(&platform, SourceKind::Mic),
            audio_input(&platform, SourceKind::Display),
        ];

        let mixer = AudioMixer::open(&platform, &AudioContextOptions::default(), inputs).unwrap();

        assert_eq!(mixer.nodes().len(), 2);
        assert_eq!(mixer.output().audio_tracks().count(), 1);
        assert!(mixer.nodes().iter().all(|n| n.gain == 1.0));

        let probe = &platform.audio_contexts()[0];
        assert_eq!(probe.options.sample_rate, 48_000);
        assert_eq!(probe.source_track_ids().len(), 2);
        // source -> gain and gain -> destination per input
        assert_eq!(probe.connection_count(), 4);
        assert_eq!(probe.gains(), vec![1.0, 1.0]);
    }

    #[test]
    fn test_no_inputs_gives_empty_output() {
        let platform = SimulatedPlatform::new(SimulatedDevices::default());
        let mixer = AudioMixer::open(&platform, &AudioContextOptions::default(), Vec::new()).unwrap();

        assert!(mixer.output().is_empty());
        assert_eq!(platform.audio_contexts().len(), 1);
    }

    #[test]
    fn test_close_is_idempotent_and_runs_on_drop() {
        let platform = SimulatedPlatform::new(SimulatedDevices::default());
        let mut mixer = AudioMixer::open(
            &platform,
            &AudioContextOptions::default(),
            vec![audio_input(&platform, SourceKind::Mic)],
        )
        .unwrap();

        mixer.close();
        mixer.close();
        drop(mixer);

        assert_eq!(platform.audio_contexts()[0].close_count(), 1);
    }

    #[test]
    fn test_set_source_gain() {
        let platform = SimulatedPlatform::new(SimulatedDevices::default());
        let mut mixer = AudioMixer::open(
            &platform,
            &AudioContextOptions::default(),
            vec![
                audio_input(&platform, SourceKind::Mic),
                audio_input(&platform, SourceKind::Display),
            ],
        )
        .unwrap();

        assert_eq!(mixer.set_source_gain(SourceKind::Display, 0.5).unwrap(), 1);
        assert_eq!(platform.audio_contexts()[0].gains(), vec![1.0, 0.5]);
        assert_eq!(
            mixer.set_source_gain(SourceKind::Webcam, 0.5).unwrap_err(),
            MixerError::NoSuchSource(SourceKind::Webcam)
        );
        assert!(mixer.set_source_gain(SourceKind::Mic, -1.0).is_err());
    }

    #[test]
    fn test_wiring_failure_closes_context() {
        let platform = SimulatedPlatform::new(SimulatedDevices::default());
        let video: Arc<dyn MediaTrack> = platform.make_track(TrackKind::Video, "not audio");

        let result = AudioMixer::open(
            &platform,
            &AudioContextOptions::default(),
            vec![(SourceKind::Display, video)],
        );

        assert!(matches!(result, Err(MixerError::Graph(_))));
        assert_eq!(platform.audio_contexts()[0].close_count(), 1);
    }
}
