use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "krc",
    version,
    about = "Find a running pod, open a shell in it, run a command or tail its logs."
)]
pub struct CliArgs {
    /// Path to the kubeconfig file
    #[arg(long, global = true)]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use
    #[arg(long, global = true)]
    pub context: Option<String>,

    /// tracing filter (for example: warn,debug,trace)
    #[arg(long, global = true, default_value = "warn")]
    pub log_filter: String,

    #[command(subcommand)]
    pub command: ToolCommand,
}

#[derive(Debug, Clone, Subcommand)]
pub enum ToolCommand {
    /// Pick a pod and open a shell, run a command, or tail its logs
    Exec(ExecArgs),
    /// Check a node and list the pods scheduled on it
    Node(NodeArgs),
    /// Check a namespace and list its pods or deployments
    Namespace(NamespaceArgs),
    /// Search namespaces by name and print the one you pick
    Search(SearchArgs),
}

#[derive(Debug, Clone, Args)]
pub struct ExecArgs {
    /// Namespace to look in (node name with --node, search pattern with --search)
    pub target: String,

    /// Command to run; an interactive shell is opened when omitted
    #[arg(trailing_var_arg = true)]
    pub command: Vec<String>,

    /// Tail the pod logs instead of running a command
    #[arg(short = 'l', long, conflicts_with = "command")]
    pub logs: bool,

    /// Treat the target as a node name
    #[arg(long, conflicts_with = "search")]
    pub node: bool,

    /// Treat the target as a case-insensitive namespace search
    #[arg(short, long)]
    pub search: bool,

    /// Pick this pod by name instead of prompting
    #[arg(long)]
    pub pod: Option<String>,

    /// Container to exec into or read logs from
    #[arg(short, long)]
    pub container: Option<String>,

    /// Pass the command words as-is instead of through the configured shell
    #[arg(long)]
    pub no_shell: bool,

    /// Number of log lines to start from
    #[arg(long, requires = "logs")]
    pub tail: Option<i64>,

    /// Stop once the current log is printed
    #[arg(long, requires = "logs")]
    pub no_follow: bool,
}

#[derive(Debug, Clone, Args)]
pub struct NodeArgs {
    /// Node name
    pub name: String,

    /// List all pods on the node
    #[arg(short = 'l', long)]
    pub list_pods: bool,

    #[arg(short, long, value_enum, default_value_t)]
    pub output: OutputFormat,
}

#[derive(Debug, Clone, Args)]
pub struct NamespaceArgs {
    /// Namespace name
    pub name: String,

    /// List all pods in the namespace
    #[arg(short = 'l', long)]
    pub list_pods: bool,

    /// List all deployments in the namespace
    #[arg(long = "list-deploy", conflicts_with = "list_pods")]
    pub list_deployments: bool,

    #[arg(short, long, value_enum, default_value_t)]
    pub output: OutputFormat,
}

#[derive(Debug, Clone, Args)]
pub struct SearchArgs {
    /// Part of the namespace name, matched literally and case-insensitively
    pub pattern: String,
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}
