//! Reading session: consumes the gaze bus on the consumer side

use std::future::Future;

use gaze_bus::{GazeBus, GazeEvent, Subscription};
use tracing::{debug, info};

use crate::controller::{ScrollCommand, ScrollConfig, ScrollController};
use crate::ScrollError;

/// Document surface the controller scrolls
pub trait DocumentView {
    /// Immediate relative vertical scroll
    fn apply_scroll_delta(&mut self, dy: f32);

    /// Rebuild the page cache; may be called redundantly
    fn request_page_relayout(&mut self);
}

/// "Gaze detected" UI indicator
pub trait PresenceIndicator {
    fn set_gaze_detected(&mut self, detected: bool);
}

impl PresenceIndicator for () {
    fn set_gaze_detected(&mut self, _detected: bool) {}
}

/// Counters for one `run`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub samples: u64,
    pub commands: u64,
    pub presence_updates: u64,
}

struct Consumer<V, P> {
    controller: ScrollController,
    view: V,
    indicator: P,
    stats: SessionStats,
}

impl<V: DocumentView, P: PresenceIndicator> Consumer<V, P> {
    fn handle(&mut self, event: GazeEvent) -> Result<Option<ScrollCommand>, ScrollError> {
        match event {
            GazeEvent::Sample(sample) => {
                self.stats.samples += 1;
                let command = self.controller.on_sample(&sample)?;
                if let Some(command) = command {
                    debug!(
                        "Scrolling {:.1}px (sample at {} ns)",
                        command.displacement,
                        event.timestamp_ns()
                    );
                    self.stats.commands += 1;
                    self.view.apply_scroll_delta(command.displacement);
                    if command.relayout {
                        self.view.request_page_relayout();
                    }
                }
                Ok(command)
            }
            GazeEvent::Presence(presence) => {
                self.stats.presence_updates += 1;
                self.indicator.set_gaze_detected(presence.detected);
                Ok(None)
            }
        }
    }
}

/// Subscription to the gaze bus bound to one document view
pub struct ReadingSession<V, P = ()> {
    consumer: Consumer<V, P>,
    subscription: Option<Subscription>,
}

impl<V: DocumentView, P: PresenceIndicator> ReadingSession<V, P> {
    /// Subscribe to `bus` and start tracking
    pub fn open(bus: &GazeBus, config: ScrollConfig, view: V, indicator: P) -> Result<Self, ScrollError> {
        let mut controller = ScrollController::new(config)?;
        let subscription = bus.subscribe()?;
        controller.open_session();
        info!("Reading session subscribed as {}", subscription.id());
        Ok(Self {
            consumer: Consumer {
                controller,
                view,
                indicator,
                stats: SessionStats::default(),
            },
            subscription: Some(subscription),
        })
    }

    pub fn is_open(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn controller(&self) -> &ScrollController {
        &self.consumer.controller
    }

    pub fn view(&self) -> &V {
        &self.consumer.view
    }

    pub fn indicator(&self) -> &P {
        &self.consumer.indicator
    }

    pub fn stats(&self) -> SessionStats {
        self.consumer.stats
    }

    /// Apply one event directly
    pub fn handle(&mut self, event: GazeEvent) -> Result<Option<ScrollCommand>, ScrollError> {
        if self.subscription.is_none() {
            return Err(ScrollError::SessionNotOpen);
        }
        self.consumer.handle(event)
    }

    /// Handle everything already buffered without waiting
    pub fn drain(&mut self) -> Result<usize, ScrollError> {
        let subscription = self.subscription.as_mut().ok_or(ScrollError::SessionNotOpen)?;
        let mut handled = 0;
        while let Some(event) = subscription.try_recv() {
            self.consumer.handle(event)?;
            handled += 1;
        }
        Ok(handled)
    }

    /// Consume events until `shutdown` resolves or the bus closes
    pub async fn run<F>(&mut self, shutdown: F) -> Result<SessionStats, ScrollError>
    where
        F: Future<Output = ()>,
    {
        let subscription = self.subscription.as_mut().ok_or(ScrollError::SessionNotOpen)?;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    debug!("Reading session shutdown requested");
                    break;
                }
                event = subscription.recv() => match event {
                    Some(event) => {
                        self.consumer.handle(event)?;
                    }
                    None => {
                        info!("Gaze bus closed");
                        break;
                    }
                },
            }
        }
        Ok(self.consumer.stats)
    }

    /// Unsubscribe and reset the smoothing state. Once this returns no
    /// in-flight sample can reach the controller.
    pub fn close(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.consumer.controller.close_session();
    }

    /// Close and hand back the view and indicator
    pub fn into_parts(mut self) -> (V, P) {
        self.close();
        (self.consumer.view, self.consumer.indicator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gaze_bus::{GazeSample, PresenceEvent};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingView {
        deltas: Vec<f32>,
        relayouts: usize,
    }

    impl DocumentView for RecordingView {
        fn apply_scroll_delta(&mut self, dy: f32) {
            self.deltas.push(dy);
        }

        fn request_page_relayout(&mut self) {
            self.relayouts += 1;
        }
    }

    #[derive(Default)]
    struct Indicator(Option<bool>);

    impl PresenceIndicator for Indicator {
        fn set_gaze_detected(&mut self, detected: bool) {
            self.0 = Some(detected);
        }
    }

    fn sample(eye_line: f32, pupil: f32) -> GazeEvent {
        GazeEvent::Sample(GazeSample::measured(pupil, eye_line, 0))
    }

    #[test]
    fn test_command_reaches_view() {
        let bus = GazeBus::new(8).unwrap();
        let mut session =
            ReadingSession::open(&bus, ScrollConfig::default(), RecordingView::default(), Indicator::default()).unwrap();

        bus.publish(sample(100.0, 90.0));
        bus.publish(GazeEvent::Presence(PresenceEvent { detected: true, timestamp_ns: 0 }));
        assert_eq!(session.drain().unwrap(), 2);

        assert_eq!(session.view().deltas, vec![-20.0]);
        assert_eq!(session.view().relayouts, 1);
        assert_eq!(session.indicator().0, Some(true));
        assert_eq!(
            session.stats(),
            SessionStats { samples: 1, commands: 1, presence_updates: 1 }
        );
    }

    #[test]
    fn test_close_unsubscribes_and_resets() {
        let bus = GazeBus::new(8).unwrap();
        let mut session = ReadingSession::open(&bus, ScrollConfig::default(), RecordingView::default(), ()).unwrap();
        session.handle(sample(100.0, 90.0)).unwrap();
        bus.publish(sample(100.0, 70.0));

        session.close();
        assert!(!session.is_open());
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(session.controller().state().previous_pupil_ordinate, 0.0);
        assert!(matches!(session.drain(), Err(ScrollError::SessionNotOpen)));
        assert_eq!(session.view().deltas.len(), 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let bus = GazeBus::new(8).unwrap();
        let mut session = ReadingSession::open(&bus, ScrollConfig::default(), RecordingView::default(), ()).unwrap();
        bus.publish(sample(100.0, 90.0));

        let stats = session
            .run(tokio::time::sleep(Duration::from_millis(20)))
            .await
            .unwrap();
        assert_eq!(stats.commands, 1);
        assert!(session.is_open());
    }

    #[tokio::test]
    async fn test_run_ends_when_bus_closes() {
        let bus = GazeBus::new(8).unwrap();
        let mut session = ReadingSession::open(&bus, ScrollConfig::default(), RecordingView::default(), ()).unwrap();
        bus.publish(sample(100.0, 80.0));
        bus.close();

        let stats = session.run(std::future::pending()).await.unwrap();
        assert_eq!(stats.samples, 1);
        let (view, ()) = session.into_parts();
        assert_eq!(view.deltas, vec![-40.0]);
    }
}
