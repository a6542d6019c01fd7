use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt, reload};

use crate::config::LoggingConfig;

const DEFAULT_FILTER: &str = "info";

/// Lets the filter be replaced once the configuration has been read.
pub struct LogHandle {
    handle: reload::Handle<EnvFilter, Registry>,
    from_env: bool,
}

impl LogHandle {
    /// Switch to `logging.filter`. `RUST_LOG`, when set, always wins.
    pub fn apply(&self, cfg: &LoggingConfig) {
        if self.from_env {
            return;
        }
        let filter = match EnvFilter::try_new(&cfg.filter) {
            Ok(filter) => filter,
            Err(e) => {
                tracing::warn!(
                    "Invalid logging.filter '{}': {} - keeping {}",
                    cfg.filter,
                    e,
                    DEFAULT_FILTER
                );
                return;
            }
        };
        if let Err(e) = self.handle.reload(filter) {
            tracing::warn!("Failed to apply logging.filter: {}", e);
        }
    }
}

/// Stderr-style fmt subscriber behind a reloadable filter. Without an explicit
/// filter it starts at `info`.
pub fn subscriber<W>(
    writer: W,
    env_filter: Option<EnvFilter>,
) -> (impl Subscriber + Send + Sync + 'static, LogHandle)
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let from_env = env_filter.is_some();
    let (filter, handle) =
        reload::Layer::new(env_filter.unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER)));
    let subscriber = Registry::default().with(filter).with(
        fmt::layer()
            .with_target(false)
            .with_ansi(false)
            .with_writer(writer),
    );
    (subscriber, LogHandle { handle, from_env })
}

/// Install the global subscriber. Call before loading configuration so its
/// warnings are not lost.
pub fn init() -> LogHandle {
    let (logger, handle) = subscriber(std::io::stderr, EnvFilter::try_from_default_env().ok());
    logger.init();
    handle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_config_warnings_reach_subscriber() {
        let out = Captured::default();
        let writer = out.clone();
        let (logger, handle) = subscriber(move || writer.clone(), None);

        tracing::subscriber::with_default(logger, || {
            let cfg = Config::load_with("/nonexistent/ready-overlay.yaml", |_| None);
            assert!(out.text().contains("GEMINI_API_KEY"), "{}", out.text());

            handle.apply(&LoggingConfig {
                filter: "error".to_string(),
            });
            tracing::info!("emitted after the filter was raised");
            assert!(!out.text().contains("emitted after the filter was raised"));
            assert_eq!(cfg.logging.filter, "info");
        });
    }

    #[test]
    fn test_env_filter_is_not_replaced() {
        let out = Captured::default();
        let writer = out.clone();
        let env_filter = Some(EnvFilter::new("warn"));
        let (logger, handle) = subscriber(move || writer.clone(), env_filter);

        tracing::subscriber::with_default(logger, || {
            handle.apply(&LoggingConfig {
                filter: "error".to_string(),
            });
            tracing::warn!("still visible at warn");
            assert!(out.text().contains("still visible at warn"));
        });
    }
}
