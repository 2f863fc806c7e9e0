use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The ECS or CloudWatch Logs API rejected a call
    #[error("{operation} failed: {message}")]
    Api {
        operation: &'static str,
        message: String,
    },
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// RunTask answered without a task, only failures
    #[error("task was not launched: {0}")]
    LaunchRejected(String),
    #[error("response is missing {0}")]
    MissingField(&'static str),
    /// The task stopped without its container ever exiting, e.g. a failed image pull
    #[error("task stopped without an exit code: {0}")]
    NoExitCode(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

impl Error {
    /// Wraps an SDK error, keeping the whole source chain in the message.
    pub fn api<E>(operation: &'static str, err: E) -> Self
    where
        E: std::error::Error,
    {
        Error::Api {
            operation,
            message: aws_sdk_ecs::error::DisplayErrorContext(err).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_names_the_operation() {
        let err = Error::api(
            "RunTask",
            std::io::Error::new(std::io::ErrorKind::Other, "access denied"),
        );
        let msg = err.to_string();
        assert!(msg.starts_with("RunTask failed: "), "{msg}");
        assert!(msg.contains("access denied"), "{msg}");
    }

    #[test]
    fn missing_field_message() {
        assert_eq!(
            Error::MissingField("task ARN").to_string(),
            "response is missing task ARN"
        );
    }
}
