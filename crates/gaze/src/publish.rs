//! Turns frame analyses into bus events

use gaze_bus::{GazeBus, GazeEvent, GazeSample, PresenceEvent};
use metrics::counter;
use tracing::trace;

use crate::analysis::{EyeObservation, FrameAnalysis};

/// Publishes one gaze sample per pupil and one presence event per frame
#[derive(Clone)]
pub struct SamplePublisher {
    bus: GazeBus,
    reference_line_divisor: f32,
}

impl SamplePublisher {
    pub fn new(bus: GazeBus, reference_line_divisor: f32) -> Self {
        Self {
            bus,
            reference_line_divisor,
        }
    }

    pub fn bus(&self) -> &GazeBus {
        &self.bus
    }

    /// Stable reference line of an eye, independent of the pupil
    pub fn eye_line_ordinate(&self, eye: &EyeObservation) -> f32 {
        eye.region.y as f32 + eye.region.height as f32 / self.reference_line_divisor
    }

    /// Samples for every eye: one per pupil, or a single absent sample
    pub fn samples_for(&self, analysis: &FrameAnalysis) -> Vec<GazeSample> {
        analysis
            .eyes()
            .flat_map(|eye| {
                let eye_line = self.eye_line_ordinate(eye);
                if eye.pupils.is_empty() {
                    vec![GazeSample::absent(eye_line, analysis.timestamp_ns)]
                } else {
                    eye.pupils
                        .iter()
                        .map(|p| {
                            GazeSample::measured(
                                eye.region.y as f32 + p.y,
                                eye_line,
                                analysis.timestamp_ns,
                            )
                        })
                        .collect()
                }
            })
            .collect()
    }

    /// Samples followed by the frame's presence event
    pub fn events_for(&self, analysis: &FrameAnalysis) -> Vec<GazeEvent> {
        let samples = self.samples_for(analysis);
        let detected = samples.iter().any(|s| s.eye_present);
        samples
            .into_iter()
            .map(GazeEvent::Sample)
            .chain(std::iter::once(GazeEvent::Presence(PresenceEvent {
                detected,
                timestamp_ns: analysis.timestamp_ns,
            })))
            .collect()
    }

    /// Fire-and-forget; returns the number of events published
    pub fn publish(&self, analysis: &FrameAnalysis) -> usize {
        let events = self.events_for(analysis);
        let count = events.len();
        for event in events {
            let delivered = self.bus.publish(event);
            trace!("Published {:?} to {} subscribers", event, delivered);
        }
        counter!("gaze_events_published_total").increment(count as u64);
        count
    }
}
