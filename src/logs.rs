use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{SessionError, StreamKind};
use crate::k8s::{ClusterApi, LogChunks};
use crate::model::{LogOptions, PodRef};

pub struct LogTail {
    pod: PodRef,
    chunks: LogChunks,
    cancel: CancellationToken,
}

impl LogTail {
    pub async fn open<C>(
        api: &C,
        pod: PodRef,
        options: &LogOptions,
        cancel: CancellationToken,
    ) -> Result<Self, SessionError>
    where
        C: ClusterApi,
    {
        debug!(%pod, tail = options.tail_lines, follow = options.follow, "opening log stream");
        let chunks = api
            .open_logs(&pod, options)
            .await
            .map_err(|source| SessionError::StreamOpen {
                kind: StreamKind::Logs,
                pod: pod.to_string(),
                source,
            })?;

        Ok(Self { pod, chunks, cancel })
    }

    /// Next non-empty chunk. `None` once the remote side has closed the log.
    /// Cancellation is checked before every read.
    pub async fn next_chunk(&mut self) -> Option<Result<Vec<u8>, SessionError>> {
        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Some(Err(SessionError::Cancelled)),
                next = self.chunks.next() => next,
            };

            match next {
                None => return None,
                Some(Ok(chunk)) if chunk.is_empty() => {
                    trace!("empty log read, retrying");
                }
                Some(Ok(chunk)) => return Some(Ok(chunk)),
                Some(Err(source)) => {
                    return Some(Err(SessionError::Stream {
                        kind: StreamKind::Logs,
                        pod: self.pod.to_string(),
                        source,
                    }));
                }
            }
        }
    }

    /// Copies the log into `output` as it arrives and returns the byte count.
    pub async fn relay<W>(mut self, mut output: W) -> Result<u64, SessionError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut relayed = 0u64;
        while let Some(chunk) = self.next_chunk().await {
            let chunk = chunk?;
            let written = async {
                output.write_all(&chunk).await?;
                output.flush().await
            }
            .await;
            written.map_err(|source| SessionError::Stream {
                kind: StreamKind::Logs,
                pod: self.pod.to_string(),
                source,
            })?;
            relayed += chunk.len() as u64;
        }

        debug!(pod = %self.pod, relayed, "log stream closed");
        Ok(relayed)
    }
}
