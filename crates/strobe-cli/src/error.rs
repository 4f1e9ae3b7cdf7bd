// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use std::fmt;
use std::process::ExitCode;

/// CLI-specific error type with exit code mapping
#[derive(Debug)]
pub enum CliError {
    /// Invalid command-line arguments
    InvalidArgs(String),
    /// Flash configuration or script could not be loaded
    Config(String),
    /// Buffer locker bookkeeping failed
    Locker(String),
    /// Flash episode did not finish in time
    Timeout(String),
    /// General error
    General(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::InvalidArgs(msg) => write!(f, "Invalid arguments: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Locker(msg) => write!(f, "Buffer locker error: {}", msg),
            CliError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            CliError::General(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> ExitCode {
        match self {
            CliError::InvalidArgs(_) => ExitCode::from(2),
            CliError::Config(_) => ExitCode::from(3),
            CliError::Locker(_) => ExitCode::from(4),
            CliError::Timeout(_) => ExitCode::from(6),
            CliError::General(_) => ExitCode::from(1),
        }
    }
}

/// Map strobe::Error to CliError with appropriate exit codes
impl From<strobe::Error> for CliError {
    fn from(err: strobe::Error) -> Self {
        use strobe::Error;

        match err {
            Error::IndexOutOfRange { .. }
            | Error::FrameCountNotFound(_)
            | Error::QueueEmpty
            | Error::AlreadyQueued(_) => {
                CliError::Locker(err.to_string())
            }
            Error::Io(io_err) => CliError::Config(format!("I/O error: {}", io_err)),
            Error::Json(json_err) => CliError::Config(format!("JSON error: {}", json_err)),
        }
    }
}

/// Helper function to convert result to exit code
pub fn result_to_exit_code<T>(result: Result<T, CliError>) -> ExitCode {
    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            e.exit_code()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            CliError::InvalidArgs("test".into()).exit_code(),
            ExitCode::from(2)
        );
        assert_eq!(
            CliError::Config("test".into()).exit_code(),
            ExitCode::from(3)
        );
        assert_eq!(
            CliError::Locker("test".into()).exit_code(),
            ExitCode::from(4)
        );
        assert_eq!(
            CliError::Timeout("test".into()).exit_code(),
            ExitCode::from(6)
        );
        assert_eq!(
            CliError::General("test".into()).exit_code(),
            ExitCode::from(1)
        );
    }

    #[test]
    fn test_library_error_mapping() {
        let err: CliError = strobe::Error::QueueEmpty.into();
        assert!(matches!(err, CliError::Locker(_)));

        let json = serde_json::from_str::<u32>("x").unwrap_err();
        let err: CliError = strobe::Error::Json(json).into();
        assert!(matches!(err, CliError::Config(_)));
    }

    #[test]
    fn test_error_display() {
        let err = CliError::Timeout("no MAIN_DONE after 350 frames".to_string());
        assert_eq!(format!("{}", err), "Timeout: no MAIN_DONE after 350 frames");
    }
}
