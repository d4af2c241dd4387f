use std::io::{BufRead, Write};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{SessionError, Stage};
use crate::exec::ExecChannel;
use crate::k8s::{ApiError, ClusterApi};
use crate::logs::LogTail;
use crate::model::{
    DeploymentRef, ExecutionRequest, ExecutionResult, LogOptions, PodRef, ResourceScope,
};
use crate::select::{self, CandidateList, SelectionError};

/// Line-based prompt used for the numeric selection menus.
pub struct Console<R, W> {
    input: R,
    output: W,
}

impl<R, W> Console<R, W>
where
    R: BufRead,
    W: Write,
{
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn choose<T>(&mut self, heading: &str, list: &CandidateList<T>) -> Result<T, SessionError>
    where
        T: select::Candidate + Clone,
    {
        list.prompt(heading, &mut self.input, &mut self.output)
            .map_err(SessionError::from)
    }
}

/// `Ok(false)` only when the cluster answered "not found".
pub async fn exists<C>(api: &C, scope: &ResourceScope) -> Result<bool, ApiError>
where
    C: ClusterApi,
{
    match api.lookup(scope).await {
        Ok(()) => Ok(true),
        Err(error) if error.is_not_found() => Ok(false),
        Err(error) => Err(error),
    }
}

/// One invocation's worth of work against a single cluster client.
pub struct Session<'a, C> {
    api: &'a C,
    cancel: CancellationToken,
}

impl<'a, C> Session<'a, C>
where
    C: ClusterApi,
{
    pub fn new(api: &'a C, cancel: CancellationToken) -> Self {
        Self { api, cancel }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn ensure_exists(&self, scope: &ResourceScope) -> Result<(), SessionError> {
        debug!(%scope, "checking existence");
        match exists(self.api, scope).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(SessionError::NotFound {
                scope: scope.clone(),
            }),
            Err(source) => {
                warn!(%scope, error = %source, "existence check failed");
                Err(SessionError::Api {
                    stage: Stage::ExistenceCheck,
                    target: scope.to_string(),
                    source,
                })
            }
        }
    }

    pub async fn pods(&self, scope: &ResourceScope) -> Result<CandidateList<PodRef>, SessionError> {
        self.ensure_exists(scope).await?;
        let pods = self
            .api
            .list_pods(scope)
            .await
            .map_err(|source| SessionError::Api {
                stage: Stage::Listing,
                target: scope.to_string(),
                source,
            })?;
        debug!(%scope, count = pods.len(), "listed pods");
        Ok(CandidateList::new("pod", pods))
    }

    pub async fn deployments(&self, namespace: &str) -> Result<Vec<DeploymentRef>, SessionError> {
        let scope = ResourceScope::Namespace(namespace.to_string());
        self.ensure_exists(&scope).await?;
        self.api
            .list_deployments(namespace)
            .await
            .map_err(|source| SessionError::Api {
                stage: Stage::Listing,
                target: scope.to_string(),
                source,
            })
    }

    pub async fn search_namespaces(
        &self,
        pattern: &str,
    ) -> Result<CandidateList<String>, SessionError> {
        let matcher = select::namespace_matcher(pattern)?;
        let names = match self.api.list_namespaces().await {
            Ok(names) => names,
            Err(error) if error.is_not_found() => Vec::new(),
            Err(source) => {
                return Err(SessionError::Api {
                    stage: Stage::Listing,
                    target: format!("namespaces matching '{pattern}'"),
                    source,
                });
            }
        };

        let matches = select::filter_namespaces(names, &matcher);
        debug!(pattern, count = matches.len(), "namespace search finished");
        Ok(CandidateList::new("namespace", matches))
    }

    pub async fn pick_namespace<R, W>(
        &self,
        pattern: &str,
        console: &mut Console<R, W>,
    ) -> Result<String, SessionError>
    where
        R: BufRead,
        W: Write,
    {
        let candidates = self.search_namespaces(pattern).await?;
        console.choose(&format!("Namespaces matching \"{pattern}\":"), &candidates)
    }

    /// Lists the pods in `scope` and resolves one, by exact name when given,
    /// otherwise through the numeric menu.
    pub async fn select_pod<R, W>(
        &self,
        scope: &ResourceScope,
        by_name: Option<&str>,
        console: &mut Console<R, W>,
    ) -> Result<PodRef, SessionError>
    where
        R: BufRead,
        W: Write,
    {
        let candidates = self.pods(scope).await?;
        if candidates.is_empty() {
            return Err(SelectionError::Empty { noun: "pod" }.into());
        }

        match by_name {
            Some(name) => candidates.find_by_name(name).map_err(SessionError::from),
            None => console.choose(&format!("Pods from {scope}:"), &candidates),
        }
    }

    /// Runs the request. A captured command that wrote to stderr or exited
    /// non-zero comes back as [`SessionError::RemoteCommand`] even though the
    /// stream itself was fine.
    pub async fn execute<R, W>(
        &self,
        pod: PodRef,
        request: ExecutionRequest,
        terminal_size: Option<(u16, u16)>,
        input: R,
        output: W,
    ) -> Result<ExecutionResult, SessionError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let target = pod.to_string();
        let interactive = request.is_interactive();
        let result = ExecChannel::new(self.api, pod, request, self.cancel.clone())
            .with_terminal_size(terminal_size)
            .run(input, output)
            .await?;

        if !interactive && let Some(detail) = result.failure_detail() {
            warn!(pod = %target, %detail, "remote command failed");
            return Err(SessionError::RemoteCommand {
                pod: target,
                detail,
                result,
            });
        }

        Ok(result)
    }

    pub async fn tail_logs<W>(
        &self,
        pod: PodRef,
        options: &LogOptions,
        output: W,
    ) -> Result<u64, SessionError>
    where
        W: AsyncWrite + Unpin,
    {
        LogTail::open(self.api, pod, options, self.cancel.clone())
            .await?
            .relay(output)
            .await
    }
}
