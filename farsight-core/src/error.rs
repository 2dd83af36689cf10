use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Calibration error: {0}")]
    Calibration(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Calibration("width must be positive".to_string());
        assert_eq!(err.to_string(), "Calibration error: width must be positive");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_every_variant_is_reported_with_its_kind() {
        let errors = [
            Error::Serialization("focal_px".to_string()),
            Error::Deserialization("calibration.json".to_string()),
            Error::Calibration("no person".to_string()),
            Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk")),
        ];
        for err in errors {
            let prefix = match &err {
                Error::Io(_) => "IO error",
                Error::Serialization(_) => "Serialization error",
                Error::Deserialization(_) => "Deserialization error",
                Error::Calibration(_) => "Calibration error",
            };
            assert!(err.to_string().starts_with(prefix));
        }
    }
}
