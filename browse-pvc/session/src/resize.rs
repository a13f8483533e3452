//! Keeps the remote TTY the same size as the local terminal.
//!
//! A [`ResizeWatcher`] listens on a [`ResizeSource`] and pushes the current terminal size into a
//! single slot [`ResizeQueue`], so a burst of window changes collapses into the latest size.

use std::{future::Future, time::Duration};

use kube::api::TerminalSize;
use tokio::{
    sync::{oneshot, watch},
    task::JoinHandle,
};
use tracing::{debug, trace, warn};

use crate::terminal::TerminalMode;

/// Local terminal size, in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeEvent {
    pub width: u16,
    pub height: u16,
}

impl From<ResizeEvent> for TerminalSize {
    fn from(ResizeEvent { width, height }: ResizeEvent) -> Self {
        TerminalSize { width, height }
    }
}

/// Creates a queue that only ever holds the most recent [`ResizeEvent`].
pub fn resize_queue() -> (ResizeSender, ResizeQueue) {
    let (tx, rx) = watch::channel(None);
    (ResizeSender(tx), ResizeQueue(rx))
}

#[derive(Debug)]
pub struct ResizeSender(watch::Sender<Option<ResizeEvent>>);

impl ResizeSender {
    /// Replaces whatever size is pending, never blocks.
    pub fn push(&self, event: ResizeEvent) {
        self.0.send_replace(Some(event));
    }
}

#[derive(Debug)]
pub struct ResizeQueue(watch::Receiver<Option<ResizeEvent>>);

impl ResizeQueue {
    /// The latest pending size, or `None` once the [`ResizeSender`] is gone and nothing is
    /// pending anymore.
    pub async fn next(&mut self) -> Option<ResizeEvent> {
        loop {
            self.0.changed().await.ok()?;

            if let Some(event) = *self.0.borrow_and_update() {
                return Some(event);
            }
        }
    }
}

/// Tells the [`ResizeWatcher`] that the local window may have changed size.
///
/// Resolving to `None` means no more notifications will come.
pub trait ResizeSource: Send + 'static {
    fn resized(&mut self) -> impl Future<Output = Option<()>> + Send;
}

/// `SIGWINCH`.
#[cfg(unix)]
#[derive(Debug)]
pub struct SignalResizeSource(tokio::signal::unix::Signal);

#[cfg(unix)]
impl SignalResizeSource {
    pub fn new() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(SignalResizeSource(signal(SignalKind::window_change())?))
    }
}

#[cfg(unix)]
impl ResizeSource for SignalResizeSource {
    async fn resized(&mut self) -> Option<()> {
        self.0.recv().await
    }
}

/// Fires on a fixed interval, for platforms without a window change signal.
#[derive(Debug)]
pub struct PollingResizeSource(tokio::time::Interval);

impl PollingResizeSource {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(250);

    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        PollingResizeSource(interval)
    }
}

impl ResizeSource for PollingResizeSource {
    async fn resized(&mut self) -> Option<()> {
        self.0.tick().await;
        Some(())
    }
}

/// Never fires, the remote keeps the size it was primed with.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopResizeSource;

impl ResizeSource for NoopResizeSource {
    async fn resized(&mut self) -> Option<()> {
        std::future::pending().await
    }
}

#[cfg(unix)]
pub type PlatformResizeSource = SignalResizeSource;

#[cfg(not(unix))]
pub type PlatformResizeSource = PollingResizeSource;

/// The resize source for the current platform.
pub fn platform_source() -> std::io::Result<PlatformResizeSource> {
    #[cfg(unix)]
    {
        SignalResizeSource::new()
    }

    #[cfg(not(unix))]
    {
        Ok(PollingResizeSource::new(PollingResizeSource::DEFAULT_INTERVAL))
    }
}

/// Background task feeding terminal sizes into a [`ResizeQueue`].
///
/// The queue closes once the watcher stops, either through [`ResizeWatcher::stop`] or by being
/// dropped.
#[derive(Debug)]
pub struct ResizeWatcher {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ResizeWatcher {
    /// Primes the queue with the current size before anything else can be pushed, then keeps it
    /// updated from `source`.
    pub fn spawn<S, T>(mut source: S, terminal: T, sender: ResizeSender) -> Self
    where
        S: ResizeSource,
        T: TerminalMode,
    {
        let mut last = match terminal.size() {
            Ok(size) => {
                sender.push(size);
                Some(size)
            }
            Err(fail) => {
                debug!(%fail, "could not read initial terminal size");
                None
            }
        };

        let (stop_tx, mut stop_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    _ = &mut stop_rx => break,

                    resized = source.resized() => {
                        if resized.is_none() {
                            debug!("resize source closed");
                            break;
                        }

                        match terminal.size() {
                            Ok(size) if Some(size) != last => {
                                trace!(?size, "terminal resized");
                                sender.push(size);
                                last = Some(size);
                            }
                            Ok(_) => {}
                            Err(fail) => debug!(%fail, "could not read terminal size"),
                        }
                    }
                }
            }
        });

        ResizeWatcher {
            stop: Some(stop_tx),
            task: Some(task),
        }
    }

    /// Stops the watcher and waits for it to let go of the queue.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }

        if let Some(task) = self.task.take() {
            if let Err(fail) = task.await {
                warn!(%fail, "resize watcher task failed");
            }
        }
    }
}

impl Drop for ResizeWatcher {
    fn drop(&mut self) {
        // dropping the sender wakes the task up as well
        self.stop.take();
    }
}

/// Sends every size from `queue` to the remote TTY until either side goes away.
pub async fn forward_resizes(
    mut queue: ResizeQueue,
    mut sink: Option<futures::channel::mpsc::Sender<TerminalSize>>,
) {
    use futures::SinkExt;

    while let Some(event) = queue.next().await {
        let Some(remote) = sink.as_mut() else {
            continue;
        };

        if let Err(fail) = remote.send(event.into()).await {
            debug!(%fail, "remote terminal stopped accepting resizes");
            sink = None;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use futures::{FutureExt, StreamExt};
    use tokio::sync::mpsc;

    use super::*;
    use crate::terminal::tests::MockTerminal;

    /// Fires once for every `()` sent, closes with the channel.
    pub(crate) struct ChannelSource(pub(crate) mpsc::UnboundedReceiver<()>);

    impl ResizeSource for ChannelSource {
        async fn resized(&mut self) -> Option<()> {
            self.0.recv().await
        }
    }

    fn size(width: u16, height: u16) -> ResizeEvent {
        ResizeEvent { width, height }
    }

    #[tokio::test]
    async fn keeps_only_latest() {
        let (sender, mut queue) = resize_queue();

        sender.push(size(80, 24));
        sender.push(size(100, 30));

        assert_eq!(queue.next().await, Some(size(100, 30)));
        assert_eq!(queue.next().now_or_never(), None);

        drop(sender);
        assert_eq!(queue.next().await, None);
    }

    #[tokio::test]
    async fn pending_size_survives_close() {
        let (sender, mut queue) = resize_queue();

        sender.push(size(80, 24));
        drop(sender);

        assert_eq!(queue.next().await, Some(size(80, 24)));
        assert_eq!(queue.next().await, None);
    }

    #[tokio::test]
    async fn watcher_primes_and_follows_resizes() {
        let terminal = MockTerminal::new(size(80, 24));
        let (notify, source) = mpsc::unbounded_channel();
        let (sender, mut queue) = resize_queue();

        let watcher = ResizeWatcher::spawn(ChannelSource(source), terminal.clone(), sender);
        assert_eq!(queue.next().await, Some(size(80, 24)));

        terminal.set_size(size(120, 40));
        notify.send(()).unwrap();
        assert_eq!(queue.next().await, Some(size(120, 40)));

        watcher.stop().await;
        assert_eq!(queue.next().await, None);
    }

    #[tokio::test]
    async fn unchanged_size_is_not_pushed() {
        let terminal = MockTerminal::new(size(80, 24));
        let (notify, source) = mpsc::unbounded_channel();
        let (sender, mut queue) = resize_queue();

        let watcher = ResizeWatcher::spawn(ChannelSource(source), terminal.clone(), sender);
        assert_eq!(queue.next().await, Some(size(80, 24)));

        notify.send(()).unwrap();
        drop(notify);

        // the source closing ends the watcher without a new size
        watcher.stop().await;
        assert_eq!(queue.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn noop_source_honors_stop() {
        let (sender, mut queue) = resize_queue();

        let watcher =
            ResizeWatcher::spawn(NoopResizeSource, MockTerminal::new(size(80, 24)), sender);

        tokio::time::timeout(Duration::from_secs(1), watcher.stop())
            .await
            .unwrap();
        assert_eq!(queue.next().await, Some(size(80, 24)));
        assert_eq!(queue.next().await, None);
    }

    #[tokio::test]
    async fn dropped_watcher_closes_queue() {
        let (sender, mut queue) = resize_queue();

        let watcher =
            ResizeWatcher::spawn(NoopResizeSource, MockTerminal::new(size(80, 24)), sender);
        drop(watcher);

        assert_eq!(queue.next().await, Some(size(80, 24)));
        assert_eq!(queue.next().await, None);
    }

    #[tokio::test]
    async fn forwards_until_queue_closes() {
        let (sender, queue) = resize_queue();
        let (remote, received) = futures::channel::mpsc::channel(4);

        let forwarder = tokio::spawn(forward_resizes(queue, Some(remote)));
        sender.push(size(90, 20));
        drop(sender);
        forwarder.await.unwrap();

        let received: Vec<_> = received
            .map(|TerminalSize { width, height }| (width, height))
            .collect()
            .await;
        assert_eq!(received, vec![(90, 20)]);
    }

    #[tokio::test]
    async fn drains_queue_without_remote() {
        let (sender, queue) = resize_queue();

        let forwarder = tokio::spawn(forward_resizes(queue, None));
        sender.push(size(90, 20));
        drop(sender);

        forwarder.await.unwrap();
    }
}
