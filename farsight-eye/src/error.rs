//! Error types for farsight-eye

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Source error: {0}")]
    Source(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Output error: {0}")]
    Output(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("ONNX Runtime error: {0}")]
    Ort(String),

    #[error("OpenCV error: {0}")]
    OpenCv(String),
}

impl From<opencv::Error> for VisionError {
    fn from(err: opencv::Error) -> Self {
        VisionError::OpenCv(err.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_and_output_messages() {
        let err = VisionError::Source("Image not found ref/50.jpg".to_string());
        assert_eq!(err.to_string(), "Source error: Image not found ref/50.jpg");

        let err = VisionError::Output("Failed to open video writer \"runs/exp/clip.mp4\"".to_string());
        assert!(err.to_string().starts_with("Output error"));
    }

    #[test]
    fn test_missing_labels_dir_is_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "labels");
        assert!(matches!(VisionError::from(io_err), VisionError::Io(_)));
    }

    #[test]
    fn test_vision_error_from_opencv() {
        let cv_err = opencv::Error::new(0, "bad mat".to_string());
        let vision_err: VisionError = cv_err.into();
        match vision_err {
            VisionError::OpenCv(msg) => assert_eq!(msg, "bad mat"),
            _ => panic!("Expected OpenCv error"),
        }
    }
}
