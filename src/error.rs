use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Capture device {0} is unavailable")]
    DeviceUnavailable(i32),
    #[error("OpenCV error {0:?}")]
    OpenCv(#[from] opencv::Error),
}

#[derive(Error, Debug)]
pub enum ErrorWrapper {
    #[error("Zenoh error {0:?}")]
    ZenohError(#[from] zenoh::Error),
}
