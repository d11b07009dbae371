use crate::error::CaptureError;
use opencv::prelude::*;
use opencv::videoio;
use tracing::{debug, info, warn};

/// Opens capture devices.
pub trait CaptureSource {
    type Handle: CaptureHandle;

    fn open(&mut self, device_index: i32) -> Result<Self::Handle, CaptureError>;
}

/// An open device. Consumed by `close` so it cannot be read after release.
pub trait CaptureHandle {
    type Frame;

    /// Pulls one frame. `None` means the read failed for this poll.
    fn read_frame(&mut self) -> Option<Self::Frame>;

    fn close(self);
}

pub const DEFAULT_FRAME_WIDTH: i32 = 640;
pub const DEFAULT_FRAME_HEIGHT: i32 = 480;

pub struct CameraSource {
    width: i32,
    height: i32,
}

impl CameraSource {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

impl Default for CameraSource {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_WIDTH, DEFAULT_FRAME_HEIGHT)
    }
}

impl CaptureSource for CameraSource {
    type Handle = CameraHandle;

    fn open(&mut self, device_index: i32) -> Result<CameraHandle, CaptureError> {
        let mut cam = videoio::VideoCapture::new(device_index, videoio::CAP_ANY)?;
        if !cam.is_opened()? {
            return Err(CaptureError::DeviceUnavailable(device_index));
        }
        // the driver may pick a different mode, the request is best effort
        cam.set(videoio::CAP_PROP_FRAME_WIDTH, self.width as f64)?;
        cam.set(videoio::CAP_PROP_FRAME_HEIGHT, self.height as f64)?;
        info!(
            device_index,
            width = cam.get(videoio::CAP_PROP_FRAME_WIDTH)?,
            height = cam.get(videoio::CAP_PROP_FRAME_HEIGHT)?,
            "Opened camera"
        );
        Ok(CameraHandle { cam, device_index })
    }
}

pub struct CameraHandle {
    cam: videoio::VideoCapture,
    device_index: i32,
}

impl CaptureHandle for CameraHandle {
    type Frame = Mat;

    fn read_frame(&mut self) -> Option<Mat> {
        let mut frame = Mat::default();
        match self.cam.read(&mut frame) {
            Ok(true) => {}
            Ok(false) => {
                debug!("Camera returned no frame");
                return None;
            }
            Err(err) => {
                debug!(?err, "Failed to read frame");
                return None;
            }
        }
        match frame.size() {
            Ok(size) if size.width > 0 => Some(frame),
            _ => None,
        }
    }

    fn close(mut self) {
        if let Err(err) = self.cam.release() {
            warn!(
                ?err,
                device_index = self.device_index,
                "Failed to release camera"
            );
        } else {
            info!(device_index = self.device_index, "Released camera");
        }
    }
}
