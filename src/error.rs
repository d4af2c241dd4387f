use std::fmt::{Display, Formatter};
use thiserror::Error;

use crate::k8s::ApiError;
use crate::model::{ExecutionResult, ResourceScope};
use crate::select::SelectionError;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Stage {
    ExistenceCheck,
    Listing,
    Selection,
    Streaming,
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::ExistenceCheck => "existence check",
            Self::Listing => "listing",
            Self::Selection => "selection",
            Self::Streaming => "streaming",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum StreamKind {
    Exec,
    Logs,
}

impl Display for StreamKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exec => f.write_str("exec"),
            Self::Logs => f.write_str("log"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("existence check: {scope} not available or existing")]
    NotFound { scope: ResourceScope },
    #[error("{stage} failed for {target}")]
    Api {
        stage: Stage,
        target: String,
        #[source]
        source: ApiError,
    },
    #[error("selection failed")]
    Selection(#[from] SelectionError),
    #[error("streaming: could not open {kind} stream for {pod}")]
    StreamOpen {
        kind: StreamKind,
        pod: String,
        #[source]
        source: ApiError,
    },
    #[error("streaming: {kind} stream for {pod} broke")]
    Stream {
        kind: StreamKind,
        pod: String,
        #[source]
        source: std::io::Error,
    },
    #[error("remote command failed in {pod}: {detail}")]
    RemoteCommand {
        pod: String,
        detail: String,
        result: ExecutionResult,
    },
    #[error("cancelled by operator")]
    Cancelled,
}

impl SessionError {
    pub fn stage(&self) -> Stage {
        match self {
            Self::NotFound { .. } => Stage::ExistenceCheck,
            Self::Api { stage, .. } => *stage,
            Self::Selection(_) => Stage::Selection,
            Self::StreamOpen { .. }
            | Self::Stream { .. }
            | Self::RemoteCommand { .. }
            | Self::Cancelled => Stage::Streaming,
        }
    }
}
