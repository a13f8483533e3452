use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to change terminal mode: {0}")]
    Terminal(#[source] std::io::Error),

    #[error("Failed to open exec session in pod `{pod}`: {source}")]
    Exec {
        pod: String,
        #[source]
        source: kube::Error,
    },

    #[error("Exec session in pod `{pod}` has no {stream}")]
    MissingStream { pod: String, stream: &'static str },

    #[error("Terminal stream failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Remote shell exited with code {0}")]
    RemoteExit(i32),

    #[error("Remote shell failed: {0}")]
    RemoteFailure(String),
}
