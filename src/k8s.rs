use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{AsyncRead as FuturesAsyncRead, AsyncReadExt, FutureExt, StreamExt};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Node, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::api::{AttachParams, ListParams, LogParams, TerminalSize};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config, ResourceExt};
use std::path::Path;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace};

use crate::model::{DeploymentRef, ExecutionRequest, LogOptions, PodRef, ResourceScope};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Raw log bytes in arrival order. An empty chunk is not the end of the log;
/// only the stream finishing is.
pub type LogChunks = BoxStream<'static, std::io::Result<Vec<u8>>>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("cluster API request failed")]
    Transport(#[source] BoxError),
}

impl ApiError {
    pub fn transport(error: impl Into<BoxError>) -> Self {
        Self::Transport(error.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<kube::Error> for ApiError {
    fn from(error: kube::Error) -> Self {
        if matches!(&error, kube::Error::Api(response) if response.code == 404) {
            return Self::NotFound(error.to_string());
        }
        Self::Transport(Box::new(error))
    }
}

/// The open halves of a remote command. Streams that were not requested are
/// `None`. `completion` resolves once the remote side reports how the command
/// ended.
pub struct ExecStreams {
    pub stdin: Option<BoxedWriter>,
    pub stdout: Option<BoxedReader>,
    pub stderr: Option<BoxedReader>,
    pub resize: Option<futures::channel::mpsc::Sender<TerminalSize>>,
    pub completion: BoxFuture<'static, Result<Option<i32>, ApiError>>,
}

/// Everything the tools need from the cluster.
pub trait ClusterApi {
    async fn lookup(&self, scope: &ResourceScope) -> Result<(), ApiError>;

    async fn list_pods(&self, scope: &ResourceScope) -> Result<Vec<PodRef>, ApiError>;

    async fn list_namespaces(&self) -> Result<Vec<String>, ApiError>;

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<DeploymentRef>, ApiError>;

    async fn open_exec(
        &self,
        pod: &PodRef,
        request: &ExecutionRequest,
    ) -> Result<ExecStreams, ApiError>;

    async fn open_logs(&self, pod: &PodRef, options: &LogOptions) -> Result<LogChunks, ApiError>;
}

#[derive(Clone)]
pub struct KubeGateway {
    client: Client,
    context: String,
    cluster: String,
}

impl KubeGateway {
    pub async fn connect(kubeconfig: Option<&Path>, context: Option<String>) -> Result<Self> {
        let options = KubeConfigOptions {
            context: context.clone(),
            cluster: None,
            user: None,
        };

        let config = match kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path)
                    .with_context(|| format!("failed to read kubeconfig {}", path.display()))?;
                Config::from_custom_kubeconfig(kubeconfig, &options)
                    .await
                    .context("failed to load Kubernetes configuration")?
            }
            None if context.is_some() => Config::from_kubeconfig(&options)
                .await
                .context("failed to load Kubernetes configuration")?,
            None => Config::infer()
                .await
                .context("failed to infer Kubernetes configuration")?,
        };

        let cluster = config.cluster_url.to_string();
        let client = Client::try_from(config).context("failed to initialize Kubernetes client")?;
        let context = context
            .or_else(|| {
                Kubeconfig::read()
                    .ok()
                    .and_then(|kubeconfig| kubeconfig.current_context)
            })
            .unwrap_or_else(|| "in-cluster".to_string());

        debug!(%cluster, %context, "connected to cluster");
        Ok(Self {
            client,
            context,
            cluster,
        })
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn context(&self) -> &str {
        &self.context
    }
}

impl ClusterApi for KubeGateway {
    async fn lookup(&self, scope: &ResourceScope) -> Result<(), ApiError> {
        match scope {
            ResourceScope::Namespace(name) => {
                let namespaces: Api<Namespace> = Api::all(self.client.clone());
                namespaces.get(name).await?;
            }
            ResourceScope::Node(name) => {
                let nodes: Api<Node> = Api::all(self.client.clone());
                nodes.get(name).await?;
            }
        }
        Ok(())
    }

    async fn list_pods(&self, scope: &ResourceScope) -> Result<Vec<PodRef>, ApiError> {
        let (pods, params): (Api<Pod>, ListParams) = match scope {
            ResourceScope::Namespace(namespace) => (
                Api::namespaced(self.client.clone(), namespace),
                ListParams::default(),
            ),
            ResourceScope::Node(node) => (
                Api::all(self.client.clone()),
                ListParams::default().fields(&node_field_selector(node)),
            ),
        };

        let list = pods.list(&params).await?;
        Ok(list.into_iter().map(pod_ref).collect())
    }

    async fn list_namespaces(&self) -> Result<Vec<String>, ApiError> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let list = namespaces.list(&ListParams::default()).await?;
        Ok(list.into_iter().map(|namespace| namespace.name_any()).collect())
    }

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<DeploymentRef>, ApiError> {
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let list = deployments.list(&ListParams::default()).await?;
        Ok(list
            .into_iter()
            .map(|deployment| {
                let desired = deployment
                    .spec
                    .as_ref()
                    .and_then(|spec| spec.replicas)
                    .unwrap_or(1);
                let ready = deployment
                    .status
                    .as_ref()
                    .and_then(|status| status.ready_replicas)
                    .unwrap_or(0);
                DeploymentRef {
                    name: deployment.name_any(),
                    namespace: deployment
                        .namespace()
                        .unwrap_or_else(|| namespace.to_string()),
                    ready,
                    desired,
                }
            })
            .collect())
    }

    async fn open_exec(
        &self,
        pod: &PodRef,
        request: &ExecutionRequest,
    ) -> Result<ExecStreams, ApiError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), pod.namespace());
        let mut attached = pods
            .exec(pod.name(), request.command().to_vec(), &attach_params(request))
            .await?;

        let stdin = attached
            .stdin()
            .map(|writer| Box::new(writer) as BoxedWriter);
        let stdout = attached
            .stdout()
            .map(|reader| Box::new(reader) as BoxedReader);
        let stderr = attached
            .stderr()
            .map(|reader| Box::new(reader) as BoxedReader);
        let resize = attached.terminal_size();
        let status = attached.take_status();

        let completion = async move {
            let status = match status {
                Some(status) => status.await,
                None => None,
            };
            attached.join().await.map_err(ApiError::transport)?;
            exit_code_from_status(status)
        }
        .boxed();

        Ok(ExecStreams {
            stdin,
            stdout,
            stderr,
            resize,
            completion,
        })
    }

    async fn open_logs(&self, pod: &PodRef, options: &LogOptions) -> Result<LogChunks, ApiError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), pod.namespace());
        let params = LogParams {
            container: options.container.clone(),
            follow: options.follow,
            tail_lines: Some(options.tail_lines),
            ..LogParams::default()
        };

        let reader = pods.log_stream(pod.name(), &params).await?;
        Ok(read_chunks(reader, options.buffer_size))
    }
}

fn attach_params(request: &ExecutionRequest) -> AttachParams {
    let flags = request.stream_flags();
    let params = AttachParams::default()
        .stdin(flags.stdin)
        .stdout(flags.stdout)
        .stderr(flags.stderr)
        .tty(flags.tty);

    match request.container() {
        Some(container) => params.container(container),
        None => params,
    }
}

fn node_field_selector(node: &str) -> String {
    format!("spec.nodeName={node}")
}

fn pod_ref(pod: Pod) -> PodRef {
    let name = pod.name_any();
    let namespace = pod.namespace().unwrap_or_default();
    let node = pod.spec.as_ref().and_then(|spec| spec.node_name.clone());
    let phase = pod.status.as_ref().and_then(|status| status.phase.clone());
    PodRef::new(name, namespace).on_node(node).in_phase(phase)
}

fn read_chunks<R>(reader: R, buffer_size: usize) -> LogChunks
where
    R: FuturesAsyncRead + Send + 'static,
{
    let reader = Box::pin(reader);
    let buffer = vec![0u8; buffer_size.max(1)];
    futures::stream::try_unfold((reader, buffer), |(mut reader, mut buffer)| async move {
        let read = reader.read(&mut buffer).await?;
        if read == 0 {
            trace!("log stream reached end of data");
            return Ok(None);
        }
        let chunk = buffer[..read].to_vec();
        Ok(Some((chunk, (reader, buffer))))
    })
    .boxed()
}

fn exit_code_from_status(status: Option<Status>) -> Result<Option<i32>, ApiError> {
    let Some(status) = status else {
        return Ok(None);
    };

    if status.status.as_deref() == Some("Success") {
        return Ok(Some(0));
    }

    let code = status
        .details
        .as_ref()
        .and_then(|details| details.causes.as_ref())
        .and_then(|causes| {
            causes
                .iter()
                .find(|cause| cause.reason.as_deref() == Some("ExitCode"))
        })
        .and_then(|cause| cause.message.as_deref())
        .and_then(|message| message.trim().parse::<i32>().ok());

    match code {
        Some(code) => Ok(Some(code)),
        None => Err(ApiError::transport(
            status
                .message
                .unwrap_or_else(|| "remote command ended without an exit status".to_string()),
        )),
    }
}
