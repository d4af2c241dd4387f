use futures::FutureExt;
use futures::channel::mpsc;
use futures::stream::{self, StreamExt};
use kube::api::TerminalSize;
use std::io::{self, Cursor};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use crate::k8s::{ApiError, BoxedReader, BoxedWriter, ClusterApi, ExecStreams, LogChunks};
use crate::model::{DeploymentRef, ExecMode, ExecutionRequest, LogOptions, PodRef, ResourceScope};

#[derive(Debug, Clone, Default)]
pub struct FakeExec {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone)]
pub enum LogEvent {
    Chunk(Vec<u8>),
    Fail(String),
}

/// In-memory cluster. Captured commands understand `echo`, `fail` (stderr and
/// exit 1) and `warn` (stderr, exit 0), also when wrapped in `<shell> -c`.
/// An interactive shell prints `interactive.stdout`, then reads its stdin until
/// EOF before hanging up.
#[derive(Default)]
pub struct FakeCluster {
    pub namespaces: Vec<String>,
    pub nodes: Vec<String>,
    pub pods: Vec<PodRef>,
    pub deployments: Vec<DeploymentRef>,
    pub lookup_failure: Option<String>,
    pub list_failure: Option<String>,
    pub list_not_found: bool,
    pub exec_open_failure: Option<String>,
    pub exec_hangs: bool,
    pub interactive: FakeExec,
    pub log_events: Vec<LogEvent>,
    pub log_hangs: bool,
    pub calls: Mutex<Vec<String>>,
    pub exec_log: Mutex<Vec<(PodRef, ExecutionRequest)>>,
    pub log_log: Mutex<Vec<LogOptions>>,
    pub held_open: Mutex<Vec<DuplexStream>>,
    pub remote_input: Arc<Mutex<Vec<u8>>>,
    pub resize_log: Mutex<Vec<mpsc::Receiver<TerminalSize>>>,
}

impl FakeCluster {
    pub fn billing() -> Self {
        Self {
            namespaces: vec!["billing".to_string(), "kube-system".to_string()],
            nodes: vec!["worker-1".to_string()],
            pods: vec![
                PodRef::new("billing-web-0", "billing").on_node(Some("worker-1".to_string())),
                PodRef::new("billing-worker-0", "billing").on_node(Some("worker-1".to_string())),
                PodRef::new("coredns-0", "kube-system").on_node(Some("worker-2".to_string())),
            ],
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("fake call log").clone()
    }

    pub fn exec_requests(&self) -> Vec<(PodRef, ExecutionRequest)> {
        self.exec_log.lock().expect("fake exec log").clone()
    }

    pub fn log_requests(&self) -> Vec<LogOptions> {
        self.log_log.lock().expect("fake log options").clone()
    }

    /// Bytes the remote shell read from its stdin before it saw EOF.
    pub fn remote_input(&self) -> Vec<u8> {
        self.remote_input.lock().expect("fake remote input").clone()
    }

    pub fn terminal_sizes(&self) -> Vec<(u16, u16)> {
        let mut sizes = Vec::new();
        for receiver in self.resize_log.lock().expect("fake resize log").iter_mut() {
            while let Ok(size) = receiver.try_recv() {
                sizes.push((size.width, size.height));
            }
        }
        sizes
    }

    fn interactive_shell(&self, banner: Vec<u8>) -> (BoxedWriter, BoxedReader) {
        let (local_in, mut remote_in) = tokio::io::duplex(1_024);
        let (mut remote_out, local_out) = tokio::io::duplex(1_024);
        let received = Arc::clone(&self.remote_input);
        tokio::spawn(async move {
            let _ = remote_out.write_all(&banner).await;
            let mut input = Vec::new();
            let _ = remote_in.read_to_end(&mut input).await;
            received.lock().expect("fake remote input").extend(input);
        });
        (Box::new(local_in), Box::new(local_out))
    }

    fn record(&self, call: String) {
        self.calls.lock().expect("fake call log").push(call);
    }

    fn stalled_reader(&self) -> BoxedReader {
        let (writer, reader) = tokio::io::duplex(64);
        self.held_open.lock().expect("fake held streams").push(writer);
        Box::new(reader)
    }
}

impl ClusterApi for FakeCluster {
    async fn lookup(&self, scope: &ResourceScope) -> Result<(), ApiError> {
        self.record(format!("lookup {scope}"));
        if let Some(message) = &self.lookup_failure {
            return Err(ApiError::transport(message.clone()));
        }

        let known = match scope {
            ResourceScope::Namespace(name) => self.namespaces.contains(name),
            ResourceScope::Node(name) => self.nodes.contains(name),
        };
        if known {
            Ok(())
        } else {
            Err(ApiError::NotFound(format!("{scope} not found")))
        }
    }

    async fn list_pods(&self, scope: &ResourceScope) -> Result<Vec<PodRef>, ApiError> {
        self.record(format!("list_pods {scope}"));
        if let Some(message) = &self.list_failure {
            return Err(ApiError::transport(message.clone()));
        }

        Ok(self
            .pods
            .iter()
            .filter(|pod| match scope {
                ResourceScope::Namespace(name) => pod.namespace() == name,
                ResourceScope::Node(name) => pod.node() == Some(name.as_str()),
            })
            .cloned()
            .collect())
    }

    async fn list_namespaces(&self) -> Result<Vec<String>, ApiError> {
        self.record("list_namespaces".to_string());
        if let Some(message) = &self.list_failure {
            return Err(ApiError::transport(message.clone()));
        }
        if self.list_not_found {
            return Err(ApiError::NotFound("namespaces not found".to_string()));
        }
        Ok(self.namespaces.clone())
    }

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<DeploymentRef>, ApiError> {
        self.record(format!("list_deployments {namespace}"));
        Ok(self
            .deployments
            .iter()
            .filter(|deployment| deployment.namespace == namespace)
            .cloned()
            .collect())
    }

    async fn open_exec(
        &self,
        pod: &PodRef,
        request: &ExecutionRequest,
    ) -> Result<ExecStreams, ApiError> {
        self.record(format!("open_exec {pod}"));
        self.exec_log
            .lock()
            .expect("fake exec log")
            .push((pod.clone(), request.clone()));
        if let Some(message) = &self.exec_open_failure {
            return Err(ApiError::transport(message.clone()));
        }

        let flags = request.stream_flags();
        if self.exec_hangs {
            return Ok(ExecStreams {
                stdin: flags
                    .stdin
                    .then(|| Box::new(tokio::io::sink()) as BoxedWriter),
                stdout: Some(self.stalled_reader()),
                stderr: None,
                resize: None,
                completion: futures::future::pending().boxed(),
            });
        }

        let argv = match request.mode() {
            ExecMode::Interactive { .. } => {
                let (stdin, stdout) = self.interactive_shell(self.interactive.stdout.clone());
                let (resize, receiver) = mpsc::channel(1);
                self.resize_log
                    .lock()
                    .expect("fake resize log")
                    .push(receiver);
                return Ok(ExecStreams {
                    stdin: Some(stdin),
                    stdout: Some(stdout),
                    stderr: None,
                    resize: Some(resize),
                    completion: futures::future::ready(Ok(self.interactive.exit_code)).boxed(),
                });
            }
            ExecMode::Captured { argv } => argv,
        };

        let output = run_command(argv);
        Ok(ExecStreams {
            stdin: None,
            stdout: flags
                .stdout
                .then(|| Box::new(Cursor::new(output.stdout)) as BoxedReader),
            stderr: flags
                .stderr
                .then(|| Box::new(Cursor::new(output.stderr)) as BoxedReader),
            resize: None,
            completion: futures::future::ready(Ok(output.exit_code)).boxed(),
        })
    }

    async fn open_logs(&self, pod: &PodRef, options: &LogOptions) -> Result<LogChunks, ApiError> {
        self.record(format!("open_logs {pod}"));
        self.log_log
            .lock()
            .expect("fake log options")
            .push(options.clone());

        let events = stream::iter(self.log_events.clone().into_iter().map(|event| match event {
            LogEvent::Chunk(bytes) => Ok(bytes),
            LogEvent::Fail(message) => Err(io::Error::other(message)),
        }));
        if self.log_hangs {
            Ok(events.chain(stream::pending()).boxed())
        } else {
            Ok(events.boxed())
        }
    }
}

fn run_command(argv: &[String]) -> FakeExec {
    let Some((program, args)) = argv.split_first() else {
        return FakeExec {
            stderr: b"no command given\n".to_vec(),
            exit_code: Some(126),
            ..FakeExec::default()
        };
    };

    if program.ends_with("sh") && args.first().map(String::as_str) == Some("-c") {
        let script = args
            .get(1)
            .map(|script| {
                script
                    .split_whitespace()
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        return run_command(&script);
    }

    let line = format!("{}\n", args.join(" ")).into_bytes();
    match program.as_str() {
        "echo" => FakeExec {
            stdout: line,
            stderr: Vec::new(),
            exit_code: Some(0),
        },
        "fail" => FakeExec {
            stdout: Vec::new(),
            stderr: line,
            exit_code: Some(1),
        },
        "warn" => FakeExec {
            stdout: Vec::new(),
            stderr: line,
            exit_code: Some(0),
        },
        other => FakeExec {
            stdout: Vec::new(),
            stderr: format!("{other}: command not found\n").into_bytes(),
            exit_code: Some(127),
        },
    }
}
