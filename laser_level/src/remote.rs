//! Text commands for remote control and the replies sent back.
//!
//! The transport carrying these lines is outside this crate.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::error::SessionResult;
use crate::session::{SampleCompletion, SampleIntent, SampleOutcome};
use crate::worker::SessionHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCommand {
    Zero,
    TakeSample,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteParseError {
    #[error("Unknown remote command: {0:?}")]
    UnknownCommand(String),
    #[error("Malformed remote reply: {0:?}")]
    MalformedReply(String),
}

impl RemoteCommand {
    pub fn intent(self) -> SampleIntent {
        match self {
            RemoteCommand::Zero => SampleIntent::Zero,
            RemoteCommand::TakeSample => SampleIntent::Append,
        }
    }
}

impl FromStr for RemoteCommand {
    type Err = RemoteParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let command = s.trim();
        if command.eq_ignore_ascii_case("ZERO") {
            Ok(RemoteCommand::Zero)
        } else if command.eq_ignore_ascii_case("TAKE_SAMPLE") {
            Ok(RemoteCommand::TakeSample)
        } else {
            Err(RemoteParseError::UnknownCommand(command.to_string()))
        }
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteCommand::Zero => f.write_str("ZERO"),
            RemoteCommand::TakeSample => f.write_str("TAKE_SAMPLE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteReply {
    ZeroComplete,
    /// Measured value in millimeters.
    Sample(f64),
    Error(String),
}

impl RemoteReply {
    pub fn from_completion(completion: &SampleCompletion) -> Self {
        match &completion.outcome {
            Ok(SampleOutcome::Zeroed { .. }) => RemoteReply::ZeroComplete,
            Ok(SampleOutcome::Measured { value_mm, .. }) => RemoteReply::Sample(*value_mm),
            Err(err) => RemoteReply::Error(err.to_string()),
        }
    }

    pub fn from_result(result: SessionResult<SampleCompletion>) -> Self {
        match result {
            Ok(completion) => Self::from_completion(&completion),
            Err(err) => RemoteReply::Error(err.to_string()),
        }
    }
}

impl fmt::Display for RemoteReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteReply::ZeroComplete => f.write_str("ZERO_COMPLETE"),
            RemoteReply::Sample(value) => write!(f, "SAMPLE {value}"),
            RemoteReply::Error(message) => write!(f, "ERROR {message}"),
        }
    }
}

impl FromStr for RemoteReply {
    type Err = RemoteParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim();
        let malformed = || RemoteParseError::MalformedReply(line.to_string());

        if line == "ZERO_COMPLETE" {
            return Ok(RemoteReply::ZeroComplete);
        }
        match line.split_once(' ') {
            Some(("SAMPLE", value)) => value
                .trim()
                .parse()
                .map(RemoteReply::Sample)
                .map_err(|_| malformed()),
            Some(("ERROR", message)) => Ok(RemoteReply::Error(message.to_string())),
            _ => Err(malformed()),
        }
    }
}

impl SessionHandle {
    /// Runs a remote command to completion and builds the reply line.
    pub async fn execute(&self, command: RemoteCommand) -> RemoteReply {
        RemoteReply::from_result(self.measure(command.intent()).await)
    }
}
