use std::path::PathBuf;
use std::sync::mpsc::Sender;

use chrono::Local;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::{debug, info, warn};

use crate::{
    camera::Camera,
    capture::{CaptureLoop, FrameRequest, FrameResponse, LoopState},
    export::{export_to_dir, open_server_export, Navigator},
    runtime::AppEvent,
    stats::{StatsObserver, StatsStore},
    ui::{Controls, Dashboard, DashboardView, Renderer, UiRenderer},
};

pub const NO_CAMERA_ALERT: &str = "Camera capture is not available on this system. Check that your user may access video devices, then restart.";
pub const NO_CAMERA_STATUS: &str = "Camera capture unavailable: start is disabled";

/// User-facing controls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Stop,
    ExportServer,
    ExportLocal,
    Reset,
    Quit,
}

impl Action {
    pub fn from_key(key: KeyEvent) -> Option<Self> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Some(Action::Quit);
        }
        match key.code {
            KeyCode::Char('s') => Some(Action::Start),
            KeyCode::Char('x') => Some(Action::Stop),
            KeyCode::Char('e') => Some(Action::ExportServer),
            KeyCode::Char('l') => Some(Action::ExportLocal),
            KeyCode::Char('r') => Some(Action::Reset),
            KeyCode::Char('q') | KeyCode::Esc => Some(Action::Quit),
            _ => None,
        }
    }
}

/// Forwards session clock ticks onto the event loop
pub struct SessionTimeForwarder {
    tx: Sender<AppEvent>,
}

impl SessionTimeForwarder {
    pub fn new(tx: Sender<AppEvent>) -> Self {
        Self { tx }
    }
}

impl StatsObserver for SessionTimeForwarder {
    fn session_time(&mut self, secs: u64) {
        let _ = self.tx.send(AppEvent::SessionTime(secs));
    }
}

/// Wires controls to the capture loop, statistics and exports
pub struct AppShell<C: Camera> {
    capture: CaptureLoop<C>,
    stats: StatsStore,
    ui: UiRenderer,
    navigator: Box<dyn Navigator>,
    server_url: String,
    export_dir: PathBuf,
    camera_supported: bool,
    should_quit: bool,
}

impl<C: Camera> AppShell<C> {
    pub fn new(
        capture: CaptureLoop<C>,
        stats: StatsStore,
        navigator: Box<dyn Navigator>,
        server_url: String,
        export_dir: PathBuf,
    ) -> Self {
        let camera_supported = capture.camera_supported();
        let mut ui = UiRenderer::new();
        if !camera_supported {
            warn!("no camera capability detected, start disabled");
            ui.show_alert(NO_CAMERA_ALERT);
            ui.show_error(NO_CAMERA_STATUS);
        }

        Self {
            capture,
            stats,
            ui,
            navigator,
            server_url,
            export_dir,
            camera_supported,
            should_quit: false,
        }
    }

    pub fn controls(&self) -> Controls {
        match self.capture.state() {
            LoopState::Idle | LoopState::Stopping => Controls {
                start_enabled: self.camera_supported,
                stop_enabled: false,
            },
            LoopState::Running => Controls {
                start_enabled: false,
                stop_enabled: true,
            },
            LoopState::Starting => Controls::default(),
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        // any key dismisses an open alert
        if self.ui.dismiss_alert() {
            return;
        }
        if let Some(action) = Action::from_key(key) {
            self.perform(action);
        }
    }

    pub fn perform(&mut self, action: Action) {
        let controls = self.controls();
        match action {
            Action::Start if controls.start_enabled => {
                // failures are already surfaced by the renderer
                let _ = self.capture.start(&mut self.stats, &mut self.ui);
            }
            Action::Stop if controls.stop_enabled => {
                self.capture.stop(&mut self.stats, &mut self.ui);
            }
            Action::Start | Action::Stop => {
                debug!(?action, state = %self.capture.state(), "control disabled");
            }
            Action::ExportServer => self.export_server(),
            Action::ExportLocal => self.export_local(),
            Action::Reset => self.reset(),
            Action::Quit => {
                self.capture.stop(&mut self.stats, &mut self.ui);
                self.should_quit = true;
            }
        }
    }

    /// Frame tick: advance the session clock and run the frame task
    pub fn on_tick(&mut self) -> Option<FrameRequest> {
        self.stats.poll_tick();
        self.capture.on_frame(&mut self.ui)
    }

    pub fn on_frame_response(&mut self, response: FrameResponse) {
        self.capture
            .on_response(response, &mut self.stats, &mut self.ui);
    }

    /// The session clock ticked. The store is the source of truth: a tick
    /// queued before a stop/start must not leak into the new session.
    pub fn on_session_time(&mut self) {
        if self.stats.is_session_active() {
            self.ui.update_session_time(self.stats.session_time());
        }
    }

    /// A request could not be handed to the worker
    pub fn on_submit_failed(&mut self, generation: u64) {
        warn!(generation, "frame worker unavailable");
        self.capture.stop(&mut self.stats, &mut self.ui);
        self.ui.show_error("Detection worker stopped; restart the application");
    }

    fn reset(&mut self) {
        if self.capture.is_running() {
            self.capture.restart_session(&mut self.stats, &mut self.ui);
        } else {
            self.stats.reset_state();
            self.ui.reset_ui();
        }
        self.notify("Statistics reset");
    }

    /// Status messages keep the unsupported-camera notice while it applies
    fn with_camera_notice(&self, message: &str) -> String {
        if self.camera_supported {
            message.to_string()
        } else {
            format!("{message}. {NO_CAMERA_STATUS}")
        }
    }

    fn notify(&mut self, message: &str) {
        let message = self.with_camera_notice(message);
        self.ui.notify(&message);
    }

    fn report_error(&mut self, message: &str) {
        let message = self.with_camera_notice(message);
        self.ui.show_error(&message);
    }

    fn export_server(&mut self) {
        match open_server_export(self.navigator.as_ref(), &self.server_url) {
            Ok(url) => self.notify(&format!("Opened {url}")),
            Err(e) => {
                warn!(error = %e, "server export failed");
                self.report_error(&e.to_string());
            }
        }
    }

    fn export_local(&mut self) {
        match export_to_dir(&self.export_dir, &self.stats.get_stats(), Local::now()) {
            Ok(path) => {
                info!(path = %path.display(), "local export written");
                self.notify(&format!("Saved {}", path.display()));
            }
            Err(e) => {
                warn!(error = %e, "local export failed");
                self.report_error(&e.to_string());
            }
        }
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn state(&self) -> LoopState {
        self.capture.state()
    }

    pub fn capture(&self) -> &CaptureLoop<C> {
        &self.capture
    }

    pub fn stats(&self) -> &StatsStore {
        &self.stats
    }

    pub fn dashboard(&self) -> &Dashboard {
        self.ui.dashboard()
    }

    pub fn view(&self) -> DashboardView<'_> {
        DashboardView {
            dashboard: self.ui.dashboard(),
            controls: self.controls(),
            state: self.capture.state(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)
    }

    #[test]
    fn keys_map_to_actions() {
        assert_eq!(Action::from_key(key('s')), Some(Action::Start));
        assert_eq!(Action::from_key(key('x')), Some(Action::Stop));
        assert_eq!(Action::from_key(key('e')), Some(Action::ExportServer));
        assert_eq!(Action::from_key(key('l')), Some(Action::ExportLocal));
        assert_eq!(Action::from_key(key('r')), Some(Action::Reset));
        assert_eq!(Action::from_key(key('q')), Some(Action::Quit));
        assert_eq!(
            Action::from_key(KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE)),
            Some(Action::Quit)
        );
        assert_eq!(
            Action::from_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(Action::Quit)
        );
        assert_eq!(Action::from_key(key('z')), None);
    }

    use crate::camera::{CameraError, CameraRequest, CameraStream, Resolution};
    use crate::clock::ManualClock;
    use crate::detection::DetectionResult;
    use crate::export::ExportError;
    use crate::ui::StatusLevel;
    use image::{Rgb, RgbImage};
    use std::cell::RefCell;
    use std::rc::Rc;
    use tempfile::tempdir;

    struct StubCamera {
        supported: bool,
        open_failures: u32,
    }

    impl StubCamera {
        fn new(supported: bool) -> Self {
            Self {
                supported,
                open_failures: 0,
            }
        }
    }

    struct StubStream;

    impl Camera for StubCamera {
        fn is_supported(&self) -> bool {
            self.supported
        }

        fn open(&mut self, _: &CameraRequest) -> Result<Box<dyn CameraStream>, CameraError> {
            if self.open_failures > 0 {
                self.open_failures -= 1;
                return Err(CameraError::DeviceUnavailable("no cameras found".into()));
            }
            Ok(Box::new(StubStream))
        }
    }

    impl CameraStream for StubStream {
        fn resolution(&self) -> Resolution {
            Resolution::new(4, 4)
        }

        fn grab(&mut self) -> Result<RgbImage, CameraError> {
            Ok(RgbImage::from_pixel(4, 4, Rgb([10, 20, 30])))
        }

        fn release(&mut self) {}
    }

    struct RecordingNavigator {
        opened: Rc<RefCell<Vec<String>>>,
        fail: bool,
    }

    impl Navigator for RecordingNavigator {
        fn open(&self, url: &str) -> Result<(), ExportError> {
            if self.fail {
                return Err(ExportError::Browser("no web browser available".into()));
            }
            self.opened.borrow_mut().push(url.to_string());
            Ok(())
        }
    }

    fn shell_with(
        supported: bool,
        export_dir: PathBuf,
    ) -> (AppShell<StubCamera>, Rc<RefCell<Vec<String>>>) {
        shell_with_parts(StubCamera::new(supported), ManualClock::new(), export_dir)
    }

    fn shell_with_parts(
        camera: StubCamera,
        clock: ManualClock,
        export_dir: PathBuf,
    ) -> (AppShell<StubCamera>, Rc<RefCell<Vec<String>>>) {
        let opened = Rc::new(RefCell::new(Vec::new()));
        let capture = CaptureLoop::new(camera, Default::default());
        let navigator = RecordingNavigator {
            opened: opened.clone(),
            fail: false,
        };
        let shell = AppShell::new(
            capture,
            StatsStore::with_clock(clock),
            Box::new(navigator),
            "http://127.0.0.1:5000".to_string(),
            export_dir,
        );
        (shell, opened)
    }

    fn detect_once(shell: &mut AppShell<StubCamera>, gesture: &str, distance: f64) {
        let request = shell.on_tick().expect("frame request");
        shell.on_frame_response(FrameResponse::new(
            request.generation,
            Ok(DetectionResult::with_gesture(gesture, Some(distance))),
        ));
    }

    #[test]
    fn controls_follow_loop_state() {
        let (mut shell, _) = shell_with(true, PathBuf::from("."));
        assert_eq!(
            shell.controls(),
            Controls {
                start_enabled: true,
                stop_enabled: false
            }
        );

        shell.handle_key(key('s'));
        assert_eq!(shell.state(), LoopState::Running);
        assert_eq!(
            shell.controls(),
            Controls {
                start_enabled: false,
                stop_enabled: true
            }
        );

        shell.handle_key(key('x'));
        assert_eq!(shell.state(), LoopState::Idle);
        assert!(shell.controls().start_enabled);
    }

    #[test]
    fn unsupported_camera_disables_start() {
        let (mut shell, _) = shell_with(false, PathBuf::from("."));

        assert_eq!(shell.dashboard().alert.as_deref(), Some(NO_CAMERA_ALERT));
        assert_eq!(
            shell.dashboard().status,
            Some((StatusLevel::Error, NO_CAMERA_STATUS.to_string()))
        );
        assert_eq!(shell.controls(), Controls::default());

        // first key only dismisses the alert, the second is ignored
        shell.handle_key(key('s'));
        assert!(shell.dashboard().alert.is_none());
        shell.handle_key(key('s'));
        assert_eq!(shell.state(), LoopState::Idle);
    }

    #[test]
    fn reset_while_running_restarts_session() {
        let (mut shell, _) = shell_with(true, PathBuf::from("."));
        shell.perform(Action::Start);
        detect_once(&mut shell, "Fist", 20.0);
        assert_eq!(shell.stats().get_stats().total_detections, 1);

        shell.perform(Action::Reset);

        assert!(shell.stats().is_session_active());
        assert_eq!(shell.stats().get_stats().total_detections, 0);
        assert_eq!(shell.dashboard().total_detections, "0");
        assert!(shell.dashboard().history.is_empty());
        assert_eq!(shell.state(), LoopState::Running);
    }

    #[test]
    fn reset_while_running_drops_earlier_frames() {
        let (mut shell, _) = shell_with(true, PathBuf::from("."));
        shell.perform(Action::Start);
        let before = shell.on_tick().expect("frame request");

        shell.perform(Action::Reset);
        shell.on_frame_response(FrameResponse::new(
            before.generation,
            Ok(DetectionResult::with_gesture("Fist", Some(10.0))),
        ));

        let stats = shell.stats().get_stats();
        assert_eq!(stats.total_detections, 0);
        assert_eq!(stats.average_distance, None);
        assert!(stats.gesture_history.is_empty());
        assert_eq!(shell.dashboard().gesture_text, crate::ui::NO_GESTURE);

        // the loop is free to send the next frame straight away
        detect_once(&mut shell, "Open Hand", 30.0);
        assert_eq!(shell.stats().get_stats().total_detections, 1);
    }

    #[test]
    fn missing_device_keeps_start_available() {
        let camera = StubCamera {
            supported: true,
            open_failures: 1,
        };
        let (mut shell, _) = shell_with_parts(camera, ManualClock::new(), PathBuf::from("."));

        shell.perform(Action::Start);

        assert_eq!(shell.state(), LoopState::Idle);
        assert_eq!(shell.dashboard().alert.as_deref(), Some(crate::ui::WEBCAM_ALERT));
        assert!(shell.controls().start_enabled);

        // a camera shows up; retrying works without a restart
        shell.handle_key(key('s'));
        assert!(shell.dashboard().alert.is_none());
        shell.handle_key(key('s'));
        assert_eq!(shell.state(), LoopState::Running);
    }

    #[test]
    fn unsupported_notice_survives_reset_and_export() {
        let (mut shell, _) = shell_with(false, PathBuf::from("."));

        shell.perform(Action::Reset);
        assert!(matches!(
            shell.dashboard().status,
            Some((_, ref msg)) if msg.contains(NO_CAMERA_STATUS)
        ));

        shell.perform(Action::ExportServer);
        assert!(matches!(
            shell.dashboard().status,
            Some((StatusLevel::Info, ref msg))
                if msg.starts_with("Opened ") && msg.contains(NO_CAMERA_STATUS)
        ));
    }

    #[test]
    fn reset_while_idle_clears_state() {
        let (mut shell, _) = shell_with(true, PathBuf::from("."));
        shell.perform(Action::Start);
        detect_once(&mut shell, "Fist", 20.0);
        shell.perform(Action::Stop);

        shell.perform(Action::Reset);

        assert!(!shell.stats().is_session_active());
        assert_eq!(shell.stats().get_stats(), Default::default());
    }

    #[test]
    fn quit_stops_a_running_loop() {
        let (mut shell, _) = shell_with(true, PathBuf::from("."));
        shell.perform(Action::Start);

        shell.handle_key(key('q'));

        assert!(shell.should_quit());
        assert_eq!(shell.state(), LoopState::Idle);
        assert!(!shell.stats().is_session_active());
    }

    #[test]
    fn server_export_opens_log_endpoint() {
        let (mut shell, opened) = shell_with(true, PathBuf::from("."));
        shell.handle_key(key('e'));

        assert_eq!(*opened.borrow(), vec!["http://127.0.0.1:5000/export-log".to_string()]);
        assert_eq!(
            shell.dashboard().status,
            Some((
                StatusLevel::Info,
                "Opened http://127.0.0.1:5000/export-log".to_string()
            ))
        );
    }

    #[test]
    fn server_export_failure_is_reported() {
        let capture = CaptureLoop::new(StubCamera::new(true), Default::default());
        let navigator = RecordingNavigator {
            opened: Rc::new(RefCell::new(Vec::new())),
            fail: true,
        };
        let mut shell = AppShell::new(
            capture,
            StatsStore::with_clock(ManualClock::new()),
            Box::new(navigator),
            "http://127.0.0.1:5000".to_string(),
            PathBuf::from("."),
        );

        shell.perform(Action::ExportServer);

        assert!(matches!(
            shell.dashboard().status,
            Some((StatusLevel::Error, _))
        ));
    }

    #[test]
    fn local_export_writes_csv() {
        let dir = tempdir().unwrap();
        let (mut shell, _) = shell_with(true, dir.path().to_path_buf());
        shell.perform(Action::Start);
        detect_once(&mut shell, "Thumbs Up", 42.0);

        shell.handle_key(key('l'));

        let files: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(files.len(), 1);
        let text = std::fs::read_to_string(&files[0]).unwrap();
        assert!(text.starts_with("timestamp,gesture,distance\n"));
        assert!(text.contains("Thumbs Up,42.0"));
        assert!(matches!(
            shell.dashboard().status,
            Some((StatusLevel::Info, ref msg)) if msg.starts_with("Saved ")
        ));
    }

    #[test]
    fn session_time_follows_the_store() {
        let clock = ManualClock::new();
        let (mut shell, _) =
            shell_with_parts(StubCamera::new(true), clock.clone(), PathBuf::from("."));
        shell.on_session_time();
        assert_eq!(shell.dashboard().session_time, "00:00");

        shell.perform(Action::Start);
        clock.advance(std::time::Duration::from_secs(7));
        shell.on_tick();
        shell.on_session_time();
        assert_eq!(shell.dashboard().session_time, "00:07");
    }

    #[test]
    fn queued_session_time_does_not_leak_into_new_session() {
        let clock = ManualClock::new();
        let (mut shell, _) =
            shell_with_parts(StubCamera::new(true), clock.clone(), PathBuf::from("."));
        shell.perform(Action::Start);
        clock.advance(std::time::Duration::from_secs(37));
        shell.on_tick();

        // the tick for 37s is still queued when the session restarts
        shell.perform(Action::Stop);
        shell.perform(Action::Start);
        shell.on_session_time();

        assert_eq!(shell.dashboard().session_time, "00:00");
        assert_eq!(shell.stats().session_time(), 0);
    }

    #[test]
    fn forwarder_posts_session_time() {
        let (tx, rx) = std::sync::mpsc::channel();
        let mut forwarder = SessionTimeForwarder::new(tx);
        forwarder.session_time(12);
        assert!(matches!(rx.try_recv(), Ok(AppEvent::SessionTime(12))));
    }
}
