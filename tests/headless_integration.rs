use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use image::{Rgb, RgbImage};

use gesturecam::camera::{Camera, CameraError, CameraRequest, CameraStream, Resolution};
use gesturecam::capture::{CaptureLoop, CaptureSettings, FrameResponse, LoopState};
use gesturecam::clock::ManualClock;
use gesturecam::detection::{DetectError, DetectionResult, Detector};
use gesturecam::export::{ExportError, Navigator};
use gesturecam::runtime::{AppEvent, FixedTicker, Runner, TestEventSource};
use gesturecam::shell::{Action, AppShell, SessionTimeForwarder};
use gesturecam::stats::{StatsStore, HISTORY_LIMIT};
use gesturecam::worker::FrameWorker;

struct StillCamera;

struct StillStream;

impl Camera for StillCamera {
    fn is_supported(&self) -> bool {
        true
    }

    fn open(&mut self, _: &CameraRequest) -> Result<Box<dyn CameraStream>, CameraError> {
        Ok(Box::new(StillStream))
    }
}

impl CameraStream for StillStream {
    fn resolution(&self) -> Resolution {
        Resolution::new(16, 12)
    }

    fn grab(&mut self) -> Result<RgbImage, CameraError> {
        Ok(RgbImage::from_pixel(16, 12, Rgb([200, 150, 100])))
    }

    fn release(&mut self) {}
}

/// Answers each request with the next scripted gesture, repeating the last
struct ScriptedDetector {
    script: Vec<(&'static str, f64)>,
    calls: AtomicUsize,
}

impl Detector for ScriptedDetector {
    fn detect(&self, jpeg: Vec<u8>) -> Result<DetectionResult, DetectError> {
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8], "frames are uploaded as jpeg");
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let (gesture, distance) = self.script[n.min(self.script.len() - 1)];
        Ok(DetectionResult::with_gesture(gesture, Some(distance)))
    }
}

struct NoBrowser;

impl Navigator for NoBrowser {
    fn open(&self, _url: &str) -> Result<(), ExportError> {
        Err(ExportError::Browser("headless".into()))
    }
}

fn shell(stats: StatsStore) -> AppShell<StillCamera> {
    let settings = CaptureSettings {
        ignored_gestures: vec!["No hand detected".to_string()],
        ..CaptureSettings::default()
    };
    AppShell::new(
        CaptureLoop::new(StillCamera, settings),
        stats,
        Box::new(NoBrowser),
        "http://127.0.0.1:5000".to_string(),
        PathBuf::from("."),
    )
}

fn key(c: char) -> AppEvent {
    AppEvent::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE))
}

// Drives the same loop as the binary: keys, ticks, worker completions
#[test]
fn headless_detection_session() {
    let (tx, rx) = mpsc::channel();
    let runner = Runner::new(
        TestEventSource::new(rx),
        FixedTicker::new(Duration::from_millis(2)),
    );
    let detector = ScriptedDetector {
        script: vec![
            ("Fist", 10.0),
            ("No hand detected", 0.0),
            ("Fist", 20.0),
            ("Open Hand", 30.0),
        ],
        calls: AtomicUsize::new(0),
    };
    let worker = FrameWorker::spawn(detector, tx.clone());
    let mut shell = shell(StatsStore::new());

    tx.send(key('s')).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline && shell.stats().get_stats().total_detections < 3 {
        match runner.step() {
            AppEvent::Key(key) => shell.handle_key(key),
            AppEvent::Tick => {
                if let Some(request) = shell.on_tick() {
                    assert!(worker.submit(request));
                }
            }
            AppEvent::Frame(response) => shell.on_frame_response(response),
            AppEvent::SessionTime(_) => shell.on_session_time(),
            AppEvent::Resize => {}
        }
    }

    let stats = shell.stats().get_stats();
    assert_eq!(stats.total_detections, 3);
    assert_eq!(stats.average_distance, Some(20));
    let gestures: Vec<_> = stats
        .gesture_history
        .iter()
        .map(|e| e.gesture.as_str())
        .collect();
    assert_eq!(gestures, vec!["Open Hand", "Fist", "Fist"]);

    let dashboard = shell.dashboard();
    assert_eq!(dashboard.gesture_text, "Open Hand");
    assert_eq!(dashboard.distance_text, "Distance: 30 cm");
    assert_eq!(dashboard.total_detections, "3");
    assert_eq!(dashboard.average_distance, "20 cm");
    assert!(dashboard.gesture_changed);
    assert!(dashboard.preview.is_some());

    shell.handle_key(KeyEvent::new(KeyCode::Char('x'), KeyModifiers::NONE));
    assert_eq!(shell.state(), LoopState::Idle);
    assert!(shell.dashboard().preview.is_none());
}

#[test]
fn stale_response_after_restart_is_dropped() {
    let mut shell = shell(StatsStore::with_clock(ManualClock::new()));
    shell.perform(Action::Start);
    let old = shell.on_tick().expect("first frame");

    shell.perform(Action::Stop);
    shell.perform(Action::Start);
    let current = shell.on_tick().expect("frame after restart");

    shell.on_frame_response(FrameResponse::new(
        old.generation,
        Ok(DetectionResult::with_gesture("Fist", Some(10.0))),
    ));
    assert_eq!(shell.stats().get_stats().total_detections, 0);
    assert!(shell.capture().is_outstanding());

    shell.on_frame_response(FrameResponse::new(
        current.generation,
        Ok(DetectionResult::with_gesture("Fist", Some(10.0))),
    ));
    assert_eq!(shell.stats().get_stats().total_detections, 1);
}

#[test]
fn failed_request_allows_next_frame() {
    let mut shell = shell(StatsStore::with_clock(ManualClock::new()));
    shell.perform(Action::Start);
    let request = shell.on_tick().expect("frame");
    assert!(shell.on_tick().is_none());

    shell.on_frame_response(FrameResponse::new(
        request.generation,
        Err(DetectError::Status {
            status: 500,
            message: "model crashed".into(),
        }),
    ));

    assert_eq!(shell.dashboard().gesture_text, gesturecam::ui::NO_GESTURE);
    assert!(shell.on_tick().is_some());
}

#[test]
fn session_clock_reaches_the_dashboard() {
    let (tx, rx) = mpsc::channel();
    let clock = ManualClock::new();
    let mut stats = StatsStore::with_clock(clock.clone());
    stats.set_observer(Box::new(SessionTimeForwarder::new(tx)));
    let mut shell = shell(stats);
    shell.perform(Action::Start);

    for _ in 0..65 {
        clock.advance(Duration::from_secs(1));
        shell.on_tick();
        // leave the request outstanding; only the clock matters here
        while let Ok(event) = rx.try_recv() {
            if let AppEvent::SessionTime(_) = event {
                shell.on_session_time();
            }
        }
    }

    assert_eq!(shell.dashboard().session_time, "01:05");
    assert_eq!(shell.stats().get_stats().session_time, 65);

    // the clock freezes once stopped
    shell.perform(Action::Stop);
    clock.advance(Duration::from_secs(10));
    shell.on_tick();
    assert!(rx.try_recv().is_err());
    assert_eq!(shell.stats().get_stats().session_time, 65);
}

#[test]
fn history_keeps_newest_entries() {
    let mut stats = StatsStore::with_clock(ManualClock::new());
    stats.start_session();
    for i in 0..(HISTORY_LIMIT + 10) {
        stats.record_detection(&DetectionResult::with_gesture(
            &format!("g{i}"),
            Some(i as f64),
        ));
    }

    let snapshot = stats.get_stats();
    assert_eq!(snapshot.total_detections, (HISTORY_LIMIT + 10) as u64);
    assert_eq!(snapshot.gesture_history.len(), HISTORY_LIMIT);
    assert_eq!(snapshot.gesture_history[0].gesture, format!("g{}", HISTORY_LIMIT + 9));
    assert_eq!(snapshot.gesture_history[HISTORY_LIMIT - 1].gesture, "g10");
}

#[test]
fn dashboard_renders_headless() {
    use ratatui::{backend::TestBackend, Terminal};

    let mut shell = shell(StatsStore::with_clock(ManualClock::new()));
    shell.perform(Action::Start);
    let request = shell.on_tick().expect("frame");
    shell.on_frame_response(FrameResponse::new(
        request.generation,
        Ok(DetectionResult::with_gesture("Peace Sign", Some(45.0))),
    ));

    let backend = TestBackend::new(100, 30);
    let mut terminal = Terminal::new(backend).unwrap();
    terminal
        .draw(|f| f.render_widget(shell.view(), f.area()))
        .unwrap();

    let content: String = terminal
        .backend()
        .buffer()
        .content
        .iter()
        .map(|c| c.symbol())
        .collect();
    assert!(content.contains("Peace Sign"));
    assert!(content.contains("Distance: 45 cm"));
    assert!(content.contains("Running"));
    assert!(content.contains("(x) stop"));
}
