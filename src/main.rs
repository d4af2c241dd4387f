mod cli;
mod config;
mod error;
mod exec;
mod k8s;
mod logs;
mod model;
mod select;
mod session;
mod terminal;
#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{CliArgs, ExecArgs, NamespaceArgs, NodeArgs, OutputFormat, SearchArgs, ToolCommand};
use config::KrcConfig;
use error::SessionError;
use k8s::{ClusterApi, KubeGateway};
use model::{DeploymentRef, ExecutionRequest, LogOptions, PodRef, ResourceScope};
use serde::Serialize;
use session::{Console, Session};
use std::io::{self, Write};
use terminal::RawModeGuard;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

const EXIT_FAILURE: i32 = 1;
const EXIT_CANCELLED: i32 = 130;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    let code = match run(args).await {
        Ok(()) => 0,
        Err(error) => {
            eprintln!("Error: {error:#}");
            exit_code(&error)
        }
    };

    // Leaves without waiting on a blocked stdin reader from an interactive session.
    std::process::exit(code);
}

fn init_tracing(level_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level_filter)
        .or_else(|_| EnvFilter::try_new("warn"))
        .context("failed to initialize tracing filter")?;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .try_init();

    Ok(())
}

fn exit_code(error: &anyhow::Error) -> i32 {
    let Some(error) = error.downcast_ref::<SessionError>() else {
        return EXIT_FAILURE;
    };

    debug!(stage = %error.stage(), "session failed");
    match error {
        SessionError::Cancelled => EXIT_CANCELLED,
        _ => EXIT_FAILURE,
    }
}

async fn run(args: CliArgs) -> Result<()> {
    init_tracing(&args.log_filter)?;
    let config = KrcConfig::load()?;
    if let Some(source) = &config.source {
        debug!(%source, "loaded config");
    }

    let gateway = KubeGateway::connect(args.kubeconfig.as_deref(), args.context.clone()).await?;
    debug!(cluster = gateway.cluster(), context = gateway.context(), "using cluster");
    let session = Session::new(&gateway, CancellationToken::new());

    match args.command {
        ToolCommand::Exec(exec) => run_exec(&session, &config, exec).await,
        ToolCommand::Node(node) => run_node(&session, node).await,
        ToolCommand::Namespace(namespace) => run_namespace(&session, namespace).await,
        ToolCommand::Search(search) => run_search(&session, search).await,
    }
}

async fn run_exec<C>(session: &Session<'_, C>, config: &KrcConfig, args: ExecArgs) -> Result<()>
where
    C: ClusterApi,
{
    let pod = {
        let mut console = Console::new(io::stdin().lock(), io::stdout());
        let scope = if args.search {
            ResourceScope::Namespace(session.pick_namespace(&args.target, &mut console).await?)
        } else if args.node {
            ResourceScope::Node(args.target.clone())
        } else {
            ResourceScope::Namespace(args.target.clone())
        };
        session
            .select_pod(&scope, args.pod.as_deref(), &mut console)
            .await?
    };
    debug!(%pod, node = ?pod.node(), "selected pod");
    cancel_on_interrupt(session.cancel_token());

    let container = args.container.clone().or_else(|| config.container.clone());
    if args.logs {
        let options = log_options(config, &args, container);
        session
            .tail_logs(pod, &options, tokio::io::stdout())
            .await?;
        return Ok(());
    }

    let request = build_request(config, &args).in_container(container);
    if request.is_interactive() {
        let _raw_mode = RawModeGuard::engage()?;
        session
            .execute(
                pod,
                request,
                terminal::size(),
                tokio::io::stdin(),
                tokio::io::stdout(),
            )
            .await?;
        return Ok(());
    }

    match session
        .execute(pod, request, None, tokio::io::empty(), tokio::io::sink())
        .await
    {
        Ok(result) => {
            print!("{}", result.stdout);
            io::stdout().flush().context("failed to flush stdout")?;
            Ok(())
        }
        Err(error) => {
            if let SessionError::RemoteCommand { result, .. } = &error {
                print!("{}", result.stdout);
                let _ = io::stdout().flush();
            }
            Err(error.into())
        }
    }
}

async fn run_node<C>(session: &Session<'_, C>, args: NodeArgs) -> Result<()>
where
    C: ClusterApi,
{
    let scope = ResourceScope::Node(args.name.clone());
    let heading = format!("Node name: {}", args.name);
    if !args.list_pods {
        session.ensure_exists(&scope).await?;
        println!("{heading}");
        return Ok(());
    }

    let pods = session.pods(&scope).await?;
    write_pods(&mut io::stdout().lock(), &heading, pods.items(), args.output)
}

async fn run_namespace<C>(session: &Session<'_, C>, args: NamespaceArgs) -> Result<()>
where
    C: ClusterApi,
{
    let scope = ResourceScope::Namespace(args.name.clone());
    let heading = format!("Namespace name: {}", args.name);
    if args.list_deployments {
        let deployments = session.deployments(&args.name).await?;
        return write_deployments(&mut io::stdout().lock(), &heading, &deployments, args.output);
    }

    if args.list_pods {
        let pods = session.pods(&scope).await?;
        return write_pods(&mut io::stdout().lock(), &heading, pods.items(), args.output);
    }

    session.ensure_exists(&scope).await?;
    println!("{heading}");
    Ok(())
}

async fn run_search<C>(session: &Session<'_, C>, args: SearchArgs) -> Result<()>
where
    C: ClusterApi,
{
    let namespace = {
        let mut console = Console::new(io::stdin().lock(), io::stderr());
        session.pick_namespace(&args.pattern, &mut console).await?
    };
    println!("{namespace}");
    Ok(())
}

fn build_request(config: &KrcConfig, args: &ExecArgs) -> ExecutionRequest {
    if args.command.is_empty() {
        return ExecutionRequest::interactive(config.shell.clone());
    }

    if args.no_shell {
        return ExecutionRequest::captured(args.command.clone());
    }

    let mut argv = config.command_shell.clone();
    argv.push(args.command.join(" "));
    ExecutionRequest::captured(argv)
}

fn log_options(config: &KrcConfig, args: &ExecArgs, container: Option<String>) -> LogOptions {
    LogOptions {
        tail_lines: args.tail.unwrap_or(config.logs.tail_lines).max(0),
        follow: config.logs.follow && !args.no_follow,
        container,
        buffer_size: config.logs.buffer_size,
    }
}

fn cancel_on_interrupt(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => cancel.cancel(),
            Err(error) => warn!(%error, "failed to listen for interrupt"),
        }
    });
}

// JSON output stays a bare document so it can be piped; the heading is table-only.
fn write_pods<W: Write>(
    out: &mut W,
    heading: &str,
    pods: &[PodRef],
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Json => write_json(out, pods),
        OutputFormat::Table => {
            writeln!(out, "{heading}")?;
            for pod in pods {
                writeln!(out, "{} -> {}", pod.name(), pod.namespace())?;
            }
            Ok(())
        }
    }
}

fn write_deployments<W: Write>(
    out: &mut W,
    heading: &str,
    deployments: &[DeploymentRef],
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Json => write_json(out, deployments),
        OutputFormat::Table => {
            writeln!(out, "{heading}")?;
            for deployment in deployments {
                writeln!(
                    out,
                    "{} -> {} ({}/{})",
                    deployment.name, deployment.namespace, deployment.ready, deployment.desired
                )?;
            }
            Ok(())
        }
    }
}

fn write_json<W, T>(out: &mut W, value: &T) -> Result<()>
where
    W: Write,
    T: Serialize + ?Sized,
{
    let rendered = serde_json::to_string_pretty(value).context("failed to render json")?;
    writeln!(out, "{rendered}")?;
    Ok(())
}
