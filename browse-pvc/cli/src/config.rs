use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "kubectl-browse-pvc",
    author,
    version,
    about = "Open a shell in a PersistentVolumeClaim, or run a command against it",
    long_about = r#"
Mounts the claim at /mnt in a short lived job and attaches an interactive shell to it.
When a command is given after the claim name, the job runs it instead and its output is printed
once it finishes. The job removes itself shortly after it completes."#
)]
pub(super) struct Cli {
    /// Name of the PersistentVolumeClaim to browse.
    pub(super) claim: String,

    /// Image the browse job runs, it needs a `sh` at least.
    #[arg(short, long, env = "BROWSE_PVC_IMAGE", default_value = "alpine")]
    pub(super) image: String,

    /// User ID the container runs as, `0` gets just enough capabilities to fix file ownership.
    #[arg(
        short = 'u',
        long,
        env = "BROWSE_PVC_CONTAINER_USER",
        default_value_t = 0,
        allow_negative_numbers = true
    )]
    pub(super) container_user: i64,

    /// Namespace of the claim, defaults to the one of the current kubeconfig context.
    #[arg(short, long)]
    pub(super) namespace: Option<String>,

    /// Kubeconfig context to use.
    #[arg(long)]
    pub(super) context: Option<String>,

    /// Path to the kubeconfig file to use.
    #[arg(long)]
    pub(super) kubeconfig: Option<String>,

    /// Don't verify the API server's certificate.
    #[arg(long = "insecure-skip-tls-verify")]
    pub(super) accept_invalid_certificates: bool,

    /// Command to run in the job instead of an interactive shell, passed as arguments to
    /// `/bin/sh -c --`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub(super) command: Vec<String>,
}

/// Everything a browse run needs, settled once from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BrowseOptions {
    pub(crate) claim: String,
    pub(crate) image: String,
    pub(crate) container_user: i64,
    pub(crate) namespace: Option<String>,
    pub(crate) context: Option<String>,
    pub(crate) kubeconfig: Option<String>,
    pub(crate) accept_invalid_certificates: bool,
    pub(crate) command: Vec<String>,
}

impl From<Cli> for BrowseOptions {
    fn from(cli: Cli) -> Self {
        let Cli {
            claim,
            image,
            container_user,
            namespace,
            context,
            kubeconfig,
            accept_invalid_certificates,
            command,
        } = cli;

        BrowseOptions {
            claim,
            image,
            container_user,
            namespace,
            context,
            kubeconfig,
            accept_invalid_certificates,
            command,
        }
    }
}
