//! Control-law scenarios driven through the public API

use gaze_bus::{GazeBus, GazeEvent, GazeSample};
use proptest::prelude::*;
use scroll_control::{DeadZone, DocumentView, ReadingSession, ScrollConfig, ScrollController};

#[derive(Default)]
struct Page {
    offset: f32,
    relayouts: usize,
}

impl DocumentView for Page {
    fn apply_scroll_delta(&mut self, dy: f32) {
        self.offset += dy;
    }

    fn request_page_relayout(&mut self) {
        self.relayouts += 1;
    }
}

#[test]
fn every_sample_scrolls_and_larger_offsets_scroll_further() {
    let mut controller = ScrollController::new(ScrollConfig::for_screen(1920.0)).unwrap();
    controller.open_session();

    let commands: Vec<_> = [90.0, 90.0, 70.0]
        .iter()
        .map(|&pupil| {
            controller
                .on_sample(&GazeSample::measured(pupil, 100.0, 0))
                .unwrap()
                .expect("outside the dead zone")
        })
        .collect();

    assert_eq!(commands[0].displacement, commands[1].displacement);
    assert!(commands[2].displacement.abs() > commands[1].displacement.abs());
    assert_eq!(commands[2].displacement, 30.0 * -2.0);
}

#[test]
fn reopened_session_forgets_previous_pupil() {
    let mut controller = ScrollController::new(ScrollConfig::default()).unwrap();
    controller.open_session();
    controller.on_sample(&GazeSample::measured(60.0, 100.0, 0)).unwrap();
    controller.close_session();
    controller.open_session();

    assert_eq!(controller.state().previous_pupil_ordinate, 0.0);
    // Sentinel has nothing to fall back on in a fresh session
    let sentinel = GazeSample::measured(GazeSample::UNMEASURED, 100.0, 0);
    assert_eq!(controller.on_sample(&sentinel).unwrap(), None);
}

#[tokio::test]
async fn bus_to_page() {
    let bus = GazeBus::new(8).unwrap();
    let mut session = ReadingSession::open(&bus, ScrollConfig::for_screen(1920.0), Page::default(), ()).unwrap();

    for pupil in [90.0, 90.0, 70.0, 99.0] {
        bus.publish(GazeEvent::Sample(GazeSample::measured(pupil, 100.0, 0)));
    }
    bus.close();
    let stats = session.run(std::future::pending()).await.unwrap();

    assert_eq!(stats.samples, 4);
    assert_eq!(stats.commands, 3);
    let (page, ()) = session.into_parts();
    assert_eq!(page.offset, -20.0 - 20.0 - 60.0);
    assert_eq!(page.relayouts, 3);
}

proptest! {
    #[test]
    fn dead_zone_suppresses_jitter(
        screen in 480.0f32..4000.0,
        eye_line in 50.0f32..500.0,
        fraction in 0.0f32..=1.0,
    ) {
        let config = ScrollConfig::for_screen(screen);
        let zone = DeadZone::for_config(&config);
        let delta = zone.lower + fraction * (zone.upper - zone.lower);
        prop_assume!(zone.contains(delta));

        let mut controller = ScrollController::new(config).unwrap();
        controller.open_session();
        let sample = GazeSample::measured(eye_line - delta, eye_line, 0);
        prop_assume!(zone.contains(eye_line - sample.pupil_ordinate));
        prop_assert_eq!(controller.on_sample(&sample).unwrap(), None);
    }

    #[test]
    fn outside_dead_zone_always_scrolls(
        screen in 480.0f32..4000.0,
        delta in prop_oneof![-200.0f32..-10.0, 10.0f32..200.0],
    ) {
        let config = ScrollConfig::for_screen(screen);
        let sensitivity = config.sensitivity;
        let mut controller = ScrollController::new(config).unwrap();
        controller.open_session();

        let command = controller
            .on_sample(&GazeSample::measured(300.0 - delta, 300.0, 0))
            .unwrap();
        prop_assert!(command.is_some());
        let displacement = command.map(|c| c.displacement).unwrap_or_default();
        prop_assert!((displacement - delta * sensitivity).abs() < 1e-2);
    }
}
