use std::io;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, Level};

use crate::{
    error::SessionError,
    exec::{ExecChannel, RemoteExec},
    resize::{forward_resizes, resize_queue, ResizeSource, ResizeWatcher},
    terminal::{RawModeGuard, TerminalMode},
};

/// Local side of the byte streams, normally the process' own stdin and stdout.
#[derive(Debug)]
pub struct SessionIo<I, O> {
    pub input: I,
    pub output: O,
}

impl SessionIo<tokio::io::Stdin, tokio::io::Stdout> {
    /// Reading from [`tokio::io::stdin`] blocks a runtime thread that can't be cancelled, the
    /// runtime has to be shut down with `shutdown_background` afterwards.
    pub fn std() -> Self {
        SessionIo {
            input: tokio::io::stdin(),
            output: tokio::io::stdout(),
        }
    }
}

pub struct Session<T, E> {
    terminal: T,
    exec: E,
}

impl<T, E> Session<T, E>
where
    T: TerminalMode,
    E: RemoteExec,
{
    pub fn new(terminal: T, exec: E) -> Self {
        Session { terminal, exec }
    }

    /// Runs `command` remotely with the local terminal attached, until the remote side closes
    /// its output. A failed read of local input ends the session early, its end of file doesn't.
    ///
    /// Raw mode goes on before anything else and comes off after everything else, whatever the
    /// outcome. The remote TTY is sized before the first byte is streamed.
    #[tracing::instrument(level = Level::DEBUG, skip(self, source, io), err)]
    pub async fn attach<S, I, O>(
        &self,
        command: Vec<String>,
        source: S,
        io: SessionIo<I, O>,
    ) -> Result<(), SessionError>
    where
        S: ResizeSource,
        I: AsyncRead + Send + Unpin + 'static,
        O: AsyncWrite + Unpin,
    {
        let _raw_mode = RawModeGuard::enable(self.terminal.clone())?;

        let (sender, queue) = resize_queue();
        let watcher = ResizeWatcher::spawn(source, self.terminal.clone(), sender);

        let channel = match self.exec.open(command).await {
            Ok(channel) => channel,
            Err(fail) => {
                watcher.stop().await;
                return Err(fail);
            }
        };

        let ExecChannel {
            stdin,
            stdout,
            resize,
            status,
        } = channel;

        let forwarder = tokio::spawn(forward_resizes(queue, resize));
        let result = stream(stdin, stdout, io).await;

        watcher.stop().await;
        if let Err(fail) = forwarder.await {
            debug!(%fail, "resize forwarder failed");
        }

        result?;
        check_status(status.await)
    }
}

async fn stream<I, O>(
    mut remote_input: Box<dyn AsyncWrite + Send + Unpin>,
    mut remote_output: Box<dyn AsyncRead + Send + Unpin>,
    local: SessionIo<I, O>,
) -> Result<(), SessionError>
where
    I: AsyncRead + Send + Unpin + 'static,
    O: AsyncWrite + Unpin,
{
    let SessionIo {
        mut input,
        mut output,
    } = local;

    let mut input_task =
        tokio::spawn(async move { tokio::io::copy(&mut input, &mut remote_input).await });
    let mut input_open = true;

    let copied = {
        let output_copy = tokio::io::copy(&mut remote_output, &mut output);
        tokio::pin!(output_copy);

        loop {
            tokio::select! {
                copied = &mut output_copy => break copied,

                sent = &mut input_task, if input_open => {
                    input_open = false;
                    let sent = sent.map_err(io::Error::other)??;
                    debug!(sent, "local input closed");
                }
            }
        }
    };
    input_task.abort();

    let bytes = copied?;
    output.flush().await?;
    debug!(bytes, "remote output closed");

    Ok(())
}

fn check_status(status: Option<Status>) -> Result<(), SessionError> {
    let Some(status) = status else {
        debug!("exec session closed without a status");
        return Ok(());
    };

    if status.status.as_deref() == Some("Success") {
        return Ok(());
    }

    if let Some(code) = exit_code(&status) {
        return Err(SessionError::RemoteExit(code));
    }

    Err(SessionError::RemoteFailure(
        status
            .message
            .or(status.reason)
            .unwrap_or_else(|| "unknown error".to_string()),
    ))
}

/// Exit code of a shell that ended with `NonZeroExitCode`, carried as an `ExitCode` cause.
fn exit_code(status: &Status) -> Option<i32> {
    if status.reason.as_deref() != Some("NonZeroExitCode") {
        return None;
    }

    status
        .details
        .as_ref()?
        .causes
        .as_ref()?
        .iter()
        .find(|cause| cause.reason.as_deref() == Some("ExitCode"))?
        .message
        .as_deref()?
        .parse()
        .ok()
}
