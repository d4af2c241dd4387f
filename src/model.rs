use serde::Serialize;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ResourceScope {
    Namespace(String),
    Node(String),
}

impl ResourceScope {
    pub fn name(&self) -> &str {
        match self {
            Self::Namespace(name) | Self::Node(name) => name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Namespace(_) => "namespace",
            Self::Node(_) => "node",
        }
    }
}

impl Display for ResourceScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind(), self.name())
    }
}

/// A pod picked out of a listing. Once built it is only ever moved or cloned,
/// never edited.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct PodRef {
    name: String,
    namespace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    phase: Option<String>,
}

impl PodRef {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            node: None,
            phase: None,
        }
    }

    pub fn on_node(mut self, node: Option<String>) -> Self {
        self.node = node;
        self
    }

    pub fn in_phase(mut self, phase: Option<String>) -> Self {
        self.phase = phase;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn node(&self) -> Option<&str> {
        self.node.as_deref()
    }
}

impl Display for PodRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct DeploymentRef {
    pub name: String,
    pub namespace: String,
    pub ready: i32,
    pub desired: i32,
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct StreamFlags {
    pub stdin: bool,
    pub stdout: bool,
    pub stderr: bool,
    pub tty: bool,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ExecMode {
    /// Shell attached to the local terminal; nothing is captured.
    Interactive { shell: Vec<String> },
    /// One-shot command whose stdout and stderr are collected in memory.
    Captured { argv: Vec<String> },
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ExecutionRequest {
    mode: ExecMode,
    container: Option<String>,
}

impl ExecutionRequest {
    pub fn interactive(shell: Vec<String>) -> Self {
        Self {
            mode: ExecMode::Interactive { shell },
            container: None,
        }
    }

    pub fn captured(argv: Vec<String>) -> Self {
        Self {
            mode: ExecMode::Captured { argv },
            container: None,
        }
    }

    pub fn in_container(mut self, container: Option<String>) -> Self {
        self.container = container;
        self
    }

    pub fn mode(&self) -> &ExecMode {
        &self.mode
    }

    pub fn container(&self) -> Option<&str> {
        self.container.as_deref()
    }

    pub fn is_interactive(&self) -> bool {
        matches!(self.mode, ExecMode::Interactive { .. })
    }

    pub fn command(&self) -> &[String] {
        match &self.mode {
            ExecMode::Interactive { shell } => shell,
            ExecMode::Captured { argv } => argv,
        }
    }

    // A TTY merges stderr into stdout, so the interactive channel never asks for it.
    pub fn stream_flags(&self) -> StreamFlags {
        match self.mode {
            ExecMode::Interactive { .. } => StreamFlags {
                stdin: true,
                stdout: true,
                stderr: false,
                tty: true,
            },
            ExecMode::Captured { .. } => StreamFlags {
                stdin: false,
                stdout: true,
                stderr: true,
                tty: false,
            },
        }
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl ExecutionResult {
    /// Why the remote command counts as failed, if it does. Any stderr output
    /// fails the command, and so does a reported non-zero exit status.
    pub fn failure_detail(&self) -> Option<String> {
        if !self.stderr.is_empty() {
            return Some(self.stderr.trim_end().to_string());
        }

        match self.exit_code {
            None | Some(0) => None,
            Some(code) => Some(format!("exited with status {code}")),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LogOptions {
    pub tail_lines: i64,
    pub follow: bool,
    pub container: Option<String>,
    pub buffer_size: usize,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            tail_lines: 100,
            follow: true,
            container: None,
            buffer_size: 2_000,
        }
    }
}
