use browse_pvc_kube::{api::lifecycle::LifecycleError, error::KubeApiError};
use browse_pvc_session::error::SessionError;
use miette::Diagnostic;
use thiserror::Error;

pub(crate) type CliResult<T, E = CliError> = core::result::Result<T, E>;

const GENERAL_HELP: &str = r#"

- If you're still stuck:

>> Run again with `RUST_LOG=browse_pvc=debug,browse_pvc_kube=debug` to see what is sent to the cluster

>> Or open an issue in the project repository with the output attached

"#;

const GENERAL_BUG: &str = r#"This is a bug. Please report it in the project repository, with the output of a run with `BROWSE_PVC_FORCE_LOG=true RUST_LOG=debug` attached."#;

#[derive(Debug, Error, Diagnostic)]
pub(crate) enum CliError {
    #[error("Failed to build the async runtime: {0}")]
    #[diagnostic(help("{GENERAL_BUG}"))]
    RuntimeError(std::io::Error),

    #[error("Failed to create Kubernetes API client: {0}")]
    #[diagnostic(help(
        "Check that your kubeconfig is valid and that `--context` names an existing context.{GENERAL_HELP}"
    ))]
    CreateKubeApiFailed(KubeApiError),

    #[error("Failed to look up PersistentVolumeClaim `{claim}`: {source}")]
    #[diagnostic(help(
        "Check the claim name and pass `--namespace` if it lives outside the current context's namespace.{GENERAL_HELP}"
    ))]
    ClaimLookup {
        claim: String,
        #[source]
        source: KubeApiError,
    },

    #[error("PersistentVolumeClaim can't be mounted right now: {0}")]
    #[diagnostic(help(
        "Scale down or delete the pod that mounts the claim, then try again.{GENERAL_HELP}"
    ))]
    ClaimUnavailable(KubeApiError),

    #[error("Kubernetes API request failed: {0}")]
    #[diagnostic(help(
        "Check that you are allowed to list pods and read nodes in the namespace.{GENERAL_HELP}"
    ))]
    KubeApi(KubeApiError),

    #[error("Browse job did not start in time: {source}")]
    #[diagnostic(help(
        "The pod may be waiting for its image or for the volume to attach, `kubectl describe pod -l job-name={job}` shows why.{GENERAL_HELP}"
    ))]
    JobTimeout {
        job: String,
        #[source]
        source: LifecycleError,
    },

    #[error("Browse job failed: {source}")]
    #[diagnostic(help(
        "Inspect the job with `kubectl describe job {job}`, it is removed shortly after it finishes.{GENERAL_HELP}"
    ))]
    JobFailed {
        job: String,
        #[source]
        source: LifecycleError,
    },

    #[error("Command in job `{0}` failed")]
    #[diagnostic(help("The job's output above shows what went wrong."))]
    CommandFailed(String),

    #[error("Interactive session failed: {0}")]
    #[diagnostic(help(
        "The terminal was restored, if it still looks off run `reset`.{GENERAL_HELP}"
    ))]
    Session(SessionError),

    #[error("Shell in the browse pod exited with code {0}")]
    #[diagnostic(help("The last command run in the shell failed, its output is above."))]
    ShellExited(i32),

    #[error("Failed to write job output: {0}")]
    Output(std::io::Error),
}

impl CliError {
    /// Splits lifecycle failures into the ones worth waiting longer for and the rest.
    pub(crate) fn lifecycle(job: &str, source: LifecycleError) -> Self {
        let job = job.to_string();

        if source.is_timeout() {
            CliError::JobTimeout { job, source }
        } else {
            CliError::JobFailed { job, source }
        }
    }
}

impl From<SessionError> for CliError {
    fn from(fail: SessionError) -> Self {
        match fail {
            SessionError::RemoteExit(code) => CliError::ShellExited(code),
            fail => CliError::Session(fail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_get_their_own_hint() {
        let timeout = CliError::lifecycle(
            "browse-data",
            LifecycleError::ReadyTimeout {
                pod: "browse-data-x1".to_string(),
                attempts: 30,
            },
        );
        let ambiguous = CliError::lifecycle(
            "browse-data",
            LifecycleError::AmbiguousPods {
                selector: "job-name=browse-data".to_string(),
                count: 2,
            },
        );

        assert!(matches!(timeout, CliError::JobTimeout { .. }));
        assert!(matches!(ambiguous, CliError::JobFailed { .. }));
        assert!(timeout
            .help()
            .unwrap()
            .to_string()
            .contains("kubectl describe pod -l job-name=browse-data"));
    }

    #[test]
    fn remote_exit_is_not_a_terminal_problem() {
        let exited = CliError::from(SessionError::RemoteExit(2));
        let broken = CliError::from(SessionError::RemoteFailure("stream closed".to_string()));

        assert!(matches!(exited, CliError::ShellExited(2)));
        assert!(!exited.help().unwrap().to_string().contains("reset"));
        assert!(matches!(broken, CliError::Session(_)));
    }

    #[test]
    fn timeout_names_its_cause() {
        let timeout = CliError::lifecycle(
            "browse-data",
            LifecycleError::ActivationTimeout {
                job: "browse-data".to_string(),
                attempts: 30,
            },
        );

        assert!(timeout.to_string().starts_with("Browse job did not start in time: "));
    }
}
