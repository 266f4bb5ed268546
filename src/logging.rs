use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Default filter directive for a verbosity count
///
/// `0` is `info`, `1` is `debug` and anything higher is `trace`.
pub fn level_for_verbosity(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Initialize the global tracing subscriber
///
/// `RUST_LOG` wins when set; otherwise the level follows `verbosity`. Logs go to stderr so
/// command output on stdout stays clean for piping.
pub fn init_tracing(verbosity: u8) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_for_verbosity(verbosity)));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbosity > 0);

    // A second initialization (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for_verbosity() {
        assert_eq!(level_for_verbosity(0), "info");
        assert_eq!(level_for_verbosity(1), "debug");
        assert_eq!(level_for_verbosity(5), "trace");
    }
}
