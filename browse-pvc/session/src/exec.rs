use std::future::Future;

use futures::{channel::mpsc, future::BoxFuture, FutureExt};
use k8s_openapi::{api::core::v1::Pod, apimachinery::pkg::apis::meta::v1::Status};
use kube::{
    api::{AttachParams, TerminalSize},
    Api,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, Level};

use crate::error::SessionError;

/// The streams of an interactive `exec`, detached from whoever opened it.
pub struct ExecChannel {
    pub stdin: Box<dyn AsyncWrite + Send + Unpin>,
    pub stdout: Box<dyn AsyncRead + Send + Unpin>,
    /// `None` when the remote side doesn't take resizes.
    pub resize: Option<mpsc::Sender<TerminalSize>>,
    /// Resolves once the remote command exits, `None` if the connection closed without a status.
    pub status: BoxFuture<'static, Option<Status>>,
}

/// Opens TTY sessions in a running container.
pub trait RemoteExec {
    fn open(
        &self,
        command: Vec<String>,
    ) -> impl Future<Output = Result<ExecChannel, SessionError>> + Send;
}

/// [`RemoteExec`] through the pod `exec` subresource.
#[derive(Clone)]
pub struct KubeExec {
    pods: Api<Pod>,
    pod_name: String,
    container: String,
}

impl KubeExec {
    pub fn new(pods: Api<Pod>, pod_name: String, container: String) -> Self {
        KubeExec {
            pods,
            pod_name,
            container,
        }
    }

    fn missing(&self, stream: &'static str) -> SessionError {
        SessionError::MissingStream {
            pod: self.pod_name.clone(),
            stream,
        }
    }
}

impl RemoteExec for KubeExec {
    #[tracing::instrument(level = Level::DEBUG, skip(self), fields(pod = %self.pod_name), err)]
    async fn open(&self, command: Vec<String>) -> Result<ExecChannel, SessionError> {
        // a TTY multiplexes stderr into stdout, kube refuses to open both
        let params = AttachParams::interactive_tty().container(&self.container);

        let mut process = self
            .pods
            .exec(&self.pod_name, command, &params)
            .await
            .map_err(|source| SessionError::Exec {
                pod: self.pod_name.clone(),
                source,
            })?;

        let stdin = process.stdin().ok_or_else(|| self.missing("stdin"))?;
        let stdout = process.stdout().ok_or_else(|| self.missing("stdout"))?;
        let status = process.take_status().ok_or_else(|| self.missing("status"))?;
        let resize = process.terminal_size();
        debug!(resizable = resize.is_some(), "exec session open");

        Ok(ExecChannel {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            resize,
            status: status.boxed(),
        })
    }
}
