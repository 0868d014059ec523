use thiserror::Error;

/// Everything that can go wrong while loading cohorts, fitting or writing results.
#[derive(Debug, Error)]
pub enum HivfitError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cohort manifest could not be parsed: {0}")]
    Manifest(#[from] serde_yaml::Error),
    #[error("Parse error in {file} (line {line}): {message}")]
    Parse {
        file: String,
        line: usize,
        message: String,
    },
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("Dimension mismatch: {0}")]
    Dimension(String),
    #[error("Linear algebra failure: {0}")]
    Linalg(#[from] ndarray_linalg::error::LinalgError),
    #[error("Optimiser failure: {0}")]
    Optimizer(String),
    #[error("Insufficient data: {0}")]
    InsufficientData(String),
    #[error("Plotting failure: {0}")]
    Plot(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, HivfitError>;

impl HivfitError {
    pub fn parse(file: &str, line: usize, message: impl Into<String>) -> Self {
        HivfitError::Parse {
            file: file.to_owned(),
            line,
            message: message.into(),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_error_messages() {
        let e = HivfitError::parse("p1_pol.csv", 12, "coverage is not an integer");
        assert_eq!(
            e.to_string(),
            "Parse error in p1_pol.csv (line 12): coverage is not an integer".to_owned()
        );
        let e: HivfitError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(e.to_string().starts_with("I/O error"));
    }
}
