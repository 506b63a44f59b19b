use image::RgbImage;
use nokhwa::{
    pixel_format::RgbFormat,
    utils::{
        ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
        Resolution as NokhwaResolution,
    },
    NokhwaError,
};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// What to ask the camera for. Width, height and frame rate are ideals;
/// the device picks the closest format it supports.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraRequest {
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

impl Default for CameraRequest {
    fn default() -> Self {
        Self {
            index: 0,
            width: 1280,
            height: 720,
            frame_rate: 30,
        }
    }
}

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera capture is not supported on this system: {0}")]
    Unsupported(String),
    #[error("camera access was denied: {0}")]
    PermissionDenied(String),
    #[error("camera is unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("frame capture failed: {0}")]
    Capture(String),
}

/// A camera that can be opened into a stream
pub trait Camera {
    /// Whether the platform has any usable camera capability
    fn is_supported(&self) -> bool;

    fn open(&mut self, request: &CameraRequest) -> Result<Box<dyn CameraStream>, CameraError>;
}

/// An open camera stream. Dropping it must release the device.
pub trait CameraStream {
    /// Native resolution negotiated with the device
    fn resolution(&self) -> Resolution;

    fn grab(&mut self) -> Result<RgbImage, CameraError>;

    /// Stop all tracks. Safe to call more than once.
    fn release(&mut self);
}

#[derive(Debug, Clone)]
pub struct CameraDescription {
    pub index: String,
    pub name: String,
    pub description: String,
}

/// Enumerate cameras visible to the native backend
pub fn list_cameras() -> Result<Vec<CameraDescription>, CameraError> {
    let devices =
        nokhwa::query(ApiBackend::Auto).map_err(|e| CameraError::Unsupported(e.to_string()))?;
    Ok(devices
        .into_iter()
        .map(|info| CameraDescription {
            index: info.index().to_string(),
            name: info.human_name(),
            description: info.description().to_string(),
        })
        .collect())
}

/// Production camera using the platform's native capture backend
#[derive(Debug, Default)]
pub struct NokhwaCamera;

impl Camera for NokhwaCamera {
    fn is_supported(&self) -> bool {
        backend_available(nokhwa::query(ApiBackend::Auto))
    }

    fn open(&mut self, request: &CameraRequest) -> Result<Box<dyn CameraStream>, CameraError> {
        let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            CameraFormat::new(
                NokhwaResolution::new(request.width, request.height),
                FrameFormat::MJPEG,
                request.frame_rate,
            ),
        ));

        let mut camera = nokhwa::Camera::new(CameraIndex::Index(request.index), format)
            .map_err(classify_open_error)?;
        camera.open_stream().map_err(classify_open_error)?;

        let native = camera.resolution();
        let resolution = Resolution::new(native.width(), native.height());
        info!(
            index = request.index,
            width = resolution.width,
            height = resolution.height,
            "camera stream opened"
        );

        Ok(Box::new(NokhwaStream {
            camera,
            resolution,
            open: true,
        }))
    }
}

/// Capture is supported when the backend answers at all. An empty device
/// list is not fatal: `open` reports it as `DeviceUnavailable` and start can
/// be retried once a camera is plugged in.
fn backend_available<T>(query: Result<Vec<T>, NokhwaError>) -> bool {
    match query {
        Ok(devices) => {
            if devices.is_empty() {
                warn!("no cameras found yet");
            }
            true
        }
        Err(e) => {
            warn!(error = %e, "camera backend query failed");
            false
        }
    }
}

fn classify_open_error(err: NokhwaError) -> CameraError {
    let message = err.to_string();
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("authoriz") {
        CameraError::PermissionDenied(message)
    } else {
        CameraError::DeviceUnavailable(message)
    }
}

struct NokhwaStream {
    camera: nokhwa::Camera,
    resolution: Resolution,
    open: bool,
}

impl CameraStream for NokhwaStream {
    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn grab(&mut self) -> Result<RgbImage, CameraError> {
        let buffer = self
            .camera
            .frame()
            .map_err(|e| CameraError::Capture(e.to_string()))?;
        let decoded = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| CameraError::Capture(e.to_string()))?;
        let (width, height) = (decoded.width(), decoded.height());
        RgbImage::from_raw(width, height, decoded.into_raw())
            .ok_or_else(|| CameraError::Capture("frame buffer size mismatch".to_string()))
    }

    fn release(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        if let Err(e) = self.camera.stop_stream() {
            warn!(error = %e, "failed to stop camera stream");
        } else {
            info!("camera stream released");
        }
    }
}

impl Drop for NokhwaStream {
    fn drop(&mut self) {
        self.release();
    }
}
