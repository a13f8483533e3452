use tracing_subscriber::{prelude::*, EnvFilter};

/// Forces logging on, even without `RUST_LOG`.
pub(crate) const FORCE_LOG_ENV: &str = "BROWSE_PVC_FORCE_LOG";

/// Logs go to stderr, and only when asked for, so they don't end up in the middle of the remote
/// shell by accident.
pub(crate) fn init_tracing_registry() {
    let force_log = std::env::var(FORCE_LOG_ENV).ok();
    let rust_log = std::env::var_os(EnvFilter::DEFAULT_ENV).is_some();

    if logging_enabled(force_log.as_deref(), rust_log) {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .with(EnvFilter::from_default_env())
            .init();
    }
}

fn logging_enabled(force_log: Option<&str>, rust_log: bool) -> bool {
    let force_log = force_log
        .and_then(|value| value.parse().ok())
        .unwrap_or(false);

    force_log || rust_log
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(None, false, false)]
    #[case(None, true, true)]
    #[case(Some("true"), false, true)]
    #[case(Some("false"), false, false)]
    #[case(Some("yes"), false, false)]
    #[case(Some("false"), true, true)]
    fn enabled_when_asked(
        #[case] force_log: Option<&str>,
        #[case] rust_log: bool,
        #[case] expected: bool,
    ) {
        assert_eq!(logging_enabled(force_log, rust_log), expected);
    }
}
