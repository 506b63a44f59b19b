use std::sync::Arc;

use image::RgbImage;
use tracing::{debug, info, trace, warn};

use crate::camera::{Camera, CameraError, CameraRequest, CameraStream};
use crate::config::Config;
use crate::detection::{decode_processed_image, DecodeError, DetectError, DetectionResult};
use crate::frame::{Canvas, DEFAULT_JPEG_QUALITY};
use crate::stats::StatsStore;
use crate::ui::Renderer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum LoopState {
    Idle,
    Starting,
    Running,
    Stopping,
}

/// A captured frame ready for upload
#[derive(Debug, Clone)]
pub struct FrameRequest {
    pub generation: u64,
    pub jpeg: Vec<u8>,
}

/// A detection plus its already-decoded annotated image, if one was sent
#[derive(Debug, Clone)]
pub struct FrameResult {
    pub detection: DetectionResult,
    pub processed: Option<Result<RgbImage, Arc<DecodeError>>>,
}

impl FrameResult {
    /// Decode the annotated image carried by `detection`, if any
    pub fn decode(detection: DetectionResult) -> Self {
        let processed = detection
            .processed_image
            .as_deref()
            .map(|payload| decode_processed_image(payload).map_err(Arc::new));
        Self {
            detection,
            processed,
        }
    }
}

/// Completion of a [`FrameRequest`]
#[derive(Debug, Clone)]
pub struct FrameResponse {
    pub generation: u64,
    pub outcome: Result<FrameResult, Arc<DetectError>>,
}

impl FrameResponse {
    pub fn new(generation: u64, outcome: Result<DetectionResult, DetectError>) -> Self {
        Self {
            generation,
            outcome: outcome.map(FrameResult::decode).map_err(Arc::new),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    pub camera: CameraRequest,
    pub jpeg_quality: u8,
    /// Gestures shown on screen but never recorded in the statistics
    pub ignored_gestures: Vec<String>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            camera: CameraRequest::default(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            ignored_gestures: Vec::new(),
        }
    }
}

impl From<&Config> for CaptureSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            camera: CameraRequest {
                index: cfg.camera_index,
                width: cfg.frame_width,
                height: cfg.frame_height,
                frame_rate: cfg.frame_rate,
            },
            jpeg_quality: cfg.jpeg_quality,
            ignored_gestures: cfg.ignored_gestures.clone(),
        }
    }
}

/// Camera ownership and the per-frame capture, send and render cycle.
///
/// The loop never talks to the network itself. Each frame tick may produce a
/// [`FrameRequest`]; whoever drives the loop hands it to a worker and feeds the
/// matching [`FrameResponse`] back through [`CaptureLoop::on_response`]. At most
/// one request is outstanding at a time, and responses from an earlier session
/// are recognised by their generation and dropped.
pub struct CaptureLoop<C: Camera> {
    camera: C,
    settings: CaptureSettings,
    state: LoopState,
    stream: Option<Box<dyn CameraStream>>,
    canvas: Canvas,
    outstanding: bool,
    generation: u64,
}

impl<C: Camera> CaptureLoop<C> {
    pub fn new(camera: C, settings: CaptureSettings) -> Self {
        Self {
            camera,
            settings,
            state: LoopState::Idle,
            stream: None,
            canvas: Canvas::default(),
            outstanding: false,
            generation: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    pub fn is_outstanding(&self) -> bool {
        self.outstanding
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn camera_supported(&self) -> bool {
        self.camera.is_supported()
    }

    /// Acquire the camera and begin a session. Calling it while already
    /// starting or running does nothing.
    pub fn start(
        &mut self,
        stats: &mut StatsStore,
        renderer: &mut dyn Renderer,
    ) -> Result<(), CameraError> {
        if matches!(self.state, LoopState::Starting | LoopState::Running) {
            debug!(state = %self.state, "start ignored");
            return Ok(());
        }

        self.state = LoopState::Starting;
        renderer.show_starting_message();

        let stream = match self.camera.open(&self.settings.camera) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "camera acquisition failed");
                self.state = LoopState::Idle;
                renderer.show_webcam_error(&e);
                return Err(e);
            }
        };

        self.canvas.resize(stream.resolution());
        self.stream = Some(stream);
        stats.start_session();
        renderer.reset_ui();

        self.generation += 1;
        self.outstanding = false;
        self.state = LoopState::Running;
        info!(generation = self.generation, "capture loop running");
        Ok(())
    }

    /// Release the camera and end the session. A request still in flight
    /// cannot be cancelled; its response will be discarded.
    pub fn stop(&mut self, stats: &mut StatsStore, renderer: &mut dyn Renderer) {
        if !matches!(self.state, LoopState::Running | LoopState::Starting) {
            return;
        }

        self.state = LoopState::Stopping;
        if let Some(mut stream) = self.stream.take() {
            stream.release();
        }
        stats.stop_session();
        self.canvas.clear();
        renderer.clear_frame();
        renderer.reset_ui();

        self.outstanding = false;
        self.state = LoopState::Idle;
        info!(generation = self.generation, "capture loop stopped");
    }

    /// Begin a fresh statistics session while keeping the camera open.
    /// Completions for frames captured before the restart are dropped.
    pub fn restart_session(&mut self, stats: &mut StatsStore, renderer: &mut dyn Renderer) {
        if self.state != LoopState::Running {
            return;
        }

        self.generation += 1;
        self.outstanding = false;
        stats.start_session();
        renderer.reset_ui();
        info!(generation = self.generation, "session restarted");
    }

    /// Run one frame task. Returns the request to send, if any.
    pub fn on_frame(&mut self, renderer: &mut dyn Renderer) -> Option<FrameRequest> {
        if self.state != LoopState::Running {
            return None;
        }
        if self.outstanding {
            trace!("request outstanding, skipping frame");
            return None;
        }

        let stream = self.stream.as_mut()?;
        let frame = match stream.grab() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "frame grab failed");
                return None;
            }
        };

        self.canvas.draw(&frame);
        renderer.show_frame(self.canvas.image());

        let jpeg = match self.canvas.encode_jpeg(self.settings.jpeg_quality) {
            Ok(jpeg) => jpeg,
            Err(e) => {
                warn!(error = %e, "frame encode failed");
                return None;
            }
        };

        self.outstanding = true;
        trace!(bytes = jpeg.len(), "frame captured");
        Some(FrameRequest {
            generation: self.generation,
            jpeg,
        })
    }

    /// Apply a completed request. Returns false if the response was stale
    /// or failed.
    pub fn on_response(
        &mut self,
        response: FrameResponse,
        stats: &mut StatsStore,
        renderer: &mut dyn Renderer,
    ) -> bool {
        if response.generation != self.generation || self.state != LoopState::Running {
            debug!(
                generation = response.generation,
                current = self.generation,
                "discarding stale frame response"
            );
            return false;
        }
        self.outstanding = false;

        let result = match response.outcome {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "frame request failed");
                return false;
            }
        };

        match &result.processed {
            Some(Ok(image)) => renderer.show_frame(image),
            Some(Err(e)) => warn!(error = %e, "annotated frame dropped"),
            None => {}
        }

        let detection = result.detection;
        if let Some(message) = &detection.error {
            warn!(message = %message, "server reported an error");
        }

        let Some(gesture) = detection.gesture() else {
            return true;
        };

        if !self.is_ignored(gesture) {
            stats.record_detection(&detection);
        }
        renderer.update_ui(&detection, &stats.get_stats());
        true
    }

    fn is_ignored(&self, gesture: &str) -> bool {
        self.settings
            .ignored_gestures
            .iter()
            .any(|g| g.eq_ignore_ascii_case(gesture))
    }
}
