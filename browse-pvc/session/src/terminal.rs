use std::io;

use tracing::warn;

use crate::{error::SessionError, resize::ResizeEvent};

/// The local terminal, as far as a session cares about it.
pub trait TerminalMode: Clone + Send + Sync + 'static {
    fn enable_raw(&self) -> io::Result<()>;

    fn restore(&self) -> io::Result<()>;

    fn size(&self) -> io::Result<ResizeEvent>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CrosstermTerminal;

impl TerminalMode for CrosstermTerminal {
    fn enable_raw(&self) -> io::Result<()> {
        crossterm::terminal::enable_raw_mode()
    }

    fn restore(&self) -> io::Result<()> {
        crossterm::terminal::disable_raw_mode()
    }

    fn size(&self) -> io::Result<ResizeEvent> {
        let (width, height) = crossterm::terminal::size()?;
        Ok(ResizeEvent { width, height })
    }
}

/// Raw mode for as long as this lives.
///
/// The previous mode is restored exactly once, in [`Drop`], so it also happens on early returns
/// and unwinding.
#[derive(Debug)]
pub struct RawModeGuard<T: TerminalMode> {
    terminal: T,
}

impl<T> RawModeGuard<T>
where
    T: TerminalMode,
{
    pub fn enable(terminal: T) -> Result<Self, SessionError> {
        terminal.enable_raw().map_err(SessionError::Terminal)?;
        Ok(RawModeGuard { terminal })
    }
}

impl<T> Drop for RawModeGuard<T>
where
    T: TerminalMode,
{
    fn drop(&mut self) {
        if let Err(fail) = self.terminal.restore() {
            warn!(%fail, "failed to restore terminal mode");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        panic::{catch_unwind, AssertUnwindSafe},
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
    };

    use super::*;

    /// Counts mode switches and reports a size that tests can change.
    #[derive(Debug, Clone)]
    pub(crate) struct MockTerminal {
        enabled: Arc<AtomicUsize>,
        restored: Arc<AtomicUsize>,
        size: Arc<Mutex<ResizeEvent>>,
        fail_raw: bool,
    }

    impl MockTerminal {
        pub(crate) fn new(size: ResizeEvent) -> Self {
            MockTerminal {
                enabled: Default::default(),
                restored: Default::default(),
                size: Arc::new(Mutex::new(size)),
                fail_raw: false,
            }
        }

        pub(crate) fn not_a_tty() -> Self {
            MockTerminal {
                fail_raw: true,
                ..MockTerminal::new(ResizeEvent {
                    width: 80,
                    height: 24,
                })
            }
        }

        pub(crate) fn set_size(&self, size: ResizeEvent) {
            *self.size.lock().unwrap() = size;
        }

        pub(crate) fn enabled(&self) -> usize {
            self.enabled.load(Ordering::SeqCst)
        }

        pub(crate) fn restored(&self) -> usize {
            self.restored.load(Ordering::SeqCst)
        }
    }

    impl TerminalMode for MockTerminal {
        fn enable_raw(&self) -> io::Result<()> {
            if self.fail_raw {
                return Err(io::Error::other("not a terminal"));
            }

            self.enabled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn restore(&self) -> io::Result<()> {
            self.restored.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn size(&self) -> io::Result<ResizeEvent> {
            Ok(*self.size.lock().unwrap())
        }
    }

    #[test]
    fn restores_once_on_drop() {
        let terminal = MockTerminal::new(ResizeEvent {
            width: 80,
            height: 24,
        });

        let guard = RawModeGuard::enable(terminal.clone()).unwrap();
        assert_eq!((terminal.enabled(), terminal.restored()), (1, 0));

        drop(guard);
        assert_eq!((terminal.enabled(), terminal.restored()), (1, 1));
    }

    #[test]
    fn restores_on_unwind() {
        let terminal = MockTerminal::new(ResizeEvent {
            width: 80,
            height: 24,
        });

        let result = catch_unwind(AssertUnwindSafe(|| {
            let _guard = RawModeGuard::enable(terminal.clone()).unwrap();
            panic!("session blew up");
        }));

        assert!(result.is_err());
        assert_eq!((terminal.enabled(), terminal.restored()), (1, 1));
    }

    #[test]
    fn nothing_to_restore_when_raw_mode_fails() {
        let terminal = MockTerminal::not_a_tty();

        let error = RawModeGuard::enable(terminal.clone()).unwrap_err();

        assert!(matches!(error, SessionError::Terminal(_)));
        assert_eq!(terminal.restored(), 0);
    }
}
