use std::io;
use std::time::Duration;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with {}: {stderr}", exit_code(*.code))]
    Status {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{program} did not finish within {timeout:?} and was killed")]
    Timeout { program: String, timeout: Duration },

    #[error("could not determine the home directory to expand '~/'")]
    HomeDirUnavailable,

    #[error("could not read the current directory: {0}")]
    CurrentDir(#[source] io::Error),

    #[error("{field} must not contain control characters: {value:?}")]
    ControlCharacter { field: &'static str, value: String },
}

fn exit_code(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "no status (killed by signal)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_message_includes_code_and_stderr() {
        let err = Error::Status {
            program: "systemctl".to_string(),
            code: Some(1),
            stderr: "Failed to connect to bus".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "systemctl exited with status 1: Failed to connect to bus"
        );
    }

    #[test]
    fn status_message_without_code() {
        let err = Error::Status {
            program: "systemctl".to_string(),
            code: None,
            stderr: String::new(),
        };
        assert!(err.to_string().contains("killed by signal"));
    }

    #[test]
    fn control_character_message_escapes_value() {
        let err = Error::ControlCharacter {
            field: "User",
            value: "root\nExecStartPre=/bin/sh".to_string(),
        };
        assert_eq!(
            err.to_string(),
            r#"User must not contain control characters: "root\nExecStartPre=/bin/sh""#
        );
    }
}
