use futures::SinkExt;
use kube::api::TerminalSize;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{SessionError, StreamKind};
use crate::k8s::{ApiError, BoxedReader, ClusterApi, ExecStreams};
use crate::model::{ExecMode, ExecutionRequest, ExecutionResult, PodRef};

const PUMP_BUFFER_SIZE: usize = 4_096;

/// A command bound to one pod, not yet started. Running it consumes the
/// channel; the outcome is either a finished command or an error.
pub struct ExecChannel<'a, C> {
    api: &'a C,
    pod: PodRef,
    request: ExecutionRequest,
    terminal_size: Option<(u16, u16)>,
    cancel: CancellationToken,
}

impl<'a, C> ExecChannel<'a, C>
where
    C: ClusterApi,
{
    pub fn new(
        api: &'a C,
        pod: PodRef,
        request: ExecutionRequest,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            api,
            pod,
            request,
            terminal_size: None,
            cancel,
        }
    }

    pub fn with_terminal_size(mut self, size: Option<(u16, u16)>) -> Self {
        self.terminal_size = size;
        self
    }

    /// Interactive requests relay between `input`/`output` and the remote TTY
    /// and return an empty result. Captured requests ignore both and return
    /// what the command printed.
    pub async fn run<R, W>(self, input: R, output: W) -> Result<ExecutionResult, SessionError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        debug!(pod = %self.pod, command = ?self.request.command(), "opening exec channel");
        let mut streams = self
            .api
            .open_exec(&self.pod, &self.request)
            .await
            .map_err(|source| SessionError::StreamOpen {
                kind: StreamKind::Exec,
                pod: self.pod.to_string(),
                source,
            })?;

        match self.request.mode() {
            ExecMode::Interactive { .. } => {
                if let (Some((width, height)), Some(resize)) =
                    (self.terminal_size, streams.resize.as_mut())
                    && let Err(error) = resize.send(TerminalSize { width, height }).await
                {
                    warn!(%error, "failed to send terminal size");
                }

                let exit_code = self.pump_interactive(streams, input, output).await?;
                debug!(pod = %self.pod, ?exit_code, "interactive session closed");
                Ok(ExecutionResult::default())
            }
            ExecMode::Captured { .. } => self.collect_captured(streams).await,
        }
    }

    async fn pump_interactive<R, W>(
        &self,
        streams: ExecStreams,
        mut input: R,
        mut output: W,
    ) -> Result<Option<i32>, SessionError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let ExecStreams {
            stdin: mut remote_stdin,
            stdout,
            completion,
            ..
        } = streams;
        let mut remote_stdout = stdout.ok_or_else(|| self.broken(missing_stream("stdout")))?;
        let mut input_open = remote_stdin.is_some();
        let mut in_buffer = vec![0u8; PUMP_BUFFER_SIZE];
        let mut out_buffer = vec![0u8; PUMP_BUFFER_SIZE];

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(SessionError::Cancelled),
                read = remote_stdout.read(&mut out_buffer) => {
                    let read = read.map_err(|error| self.broken(error))?;
                    if read == 0 {
                        trace!("remote stdout closed");
                        break;
                    }
                    output.write_all(&out_buffer[..read]).await.map_err(|error| self.broken(error))?;
                    output.flush().await.map_err(|error| self.broken(error))?;
                }
                read = input.read(&mut in_buffer), if input_open => {
                    let read = read.map_err(|error| self.broken(error))?;
                    if read == 0 {
                        input_open = false;
                        if let Some(mut writer) = remote_stdin.take() {
                            writer.shutdown().await.map_err(|error| self.broken(error))?;
                        }
                        continue;
                    }
                    if let Some(writer) = remote_stdin.as_mut() {
                        writer.write_all(&in_buffer[..read]).await.map_err(|error| self.broken(error))?;
                        writer.flush().await.map_err(|error| self.broken(error))?;
                    }
                }
            }
        }

        self.finish(completion).await
    }

    async fn collect_captured(&self, streams: ExecStreams) -> Result<ExecutionResult, SessionError> {
        let ExecStreams {
            stdout,
            stderr,
            completion,
            ..
        } = streams;

        let drained = async { tokio::try_join!(drain(stdout), drain(stderr)) };
        let (stdout, stderr) = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(SessionError::Cancelled),
            drained = drained => drained.map_err(|error| self.broken(error))?,
        };
        let exit_code = self.finish(completion).await?;

        Ok(ExecutionResult {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code,
        })
    }

    async fn finish(
        &self,
        completion: futures::future::BoxFuture<'static, Result<Option<i32>, ApiError>>,
    ) -> Result<Option<i32>, SessionError> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(SessionError::Cancelled),
            status = completion => status.map_err(|error| self.broken(io::Error::other(error))),
        }
    }

    fn broken(&self, source: io::Error) -> SessionError {
        SessionError::Stream {
            kind: StreamKind::Exec,
            pod: self.pod.to_string(),
            source,
        }
    }
}

async fn drain(reader: Option<BoxedReader>) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buffer).await?;
    }
    Ok(buffer)
}

fn missing_stream(name: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotConnected,
        format!("remote {name} was not attached"),
    )
}
