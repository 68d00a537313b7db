//! Config file watcher for hot reload.
//!
//! Only the `[security]` section is applied live. Sections that are wired
//! into long-lived objects at startup are reported when they change and
//! otherwise left to the next restart.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::GatewayConfig;

/// Quiet period after the first change event before the file is read.
const SETTLE: Duration = Duration::from_millis(250);

/// Watches one config file and emits every valid revision.
pub struct ConfigWatcher {
    path: PathBuf,
    baseline: GatewayConfig,
    update_tx: mpsc::UnboundedSender<GatewayConfig>,
}

impl ConfigWatcher {
    /// `baseline` is the configuration the process started with.
    pub fn new(
        path: &Path,
        baseline: GatewayConfig,
    ) -> (Self, mpsc::UnboundedReceiver<GatewayConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            baseline,
            update_tx,
        };
        (watcher, update_rx)
    }

    /// Start watching. Must be called inside a tokio runtime.
    ///
    /// The parent directory is watched so editors that replace the file on
    /// save are still seen. The returned handle must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<()>();
        let file_name = self.path.file_name().map(OsString::from);
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if touches(&event, file_name.as_deref()) => {
                    let _ = event_tx.send(());
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default(),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?self.path, "Config watcher started");

        tokio::spawn(async move {
            while event_rx.recv().await.is_some() {
                // One save is usually several events.
                tokio::time::sleep(SETTLE).await;
                while event_rx.try_recv().is_ok() {}

                match load_config(&self.path) {
                    Ok(config) => {
                        for field in restart_only_changes(&self.baseline, &config) {
                            tracing::warn!(field, "Config change needs a restart to apply");
                        }
                        tracing::info!(path = ?self.path, "Config reloaded");
                        if self.update_tx.send(config).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::error!(
                        error = %e,
                        "Failed to reload config, keeping current configuration"
                    ),
                }
            }
        });

        Ok(watcher)
    }
}

fn touches(event: &Event, file_name: Option<&std::ffi::OsStr>) -> bool {
    (event.kind.is_modify() || event.kind.is_create())
        && event.paths.iter().any(|p| p.file_name() == file_name)
}

/// Settings that differ between `running` and `next` but are only read at
/// startup.
pub fn restart_only_changes(running: &GatewayConfig, next: &GatewayConfig) -> Vec<&'static str> {
    let (a, b) = (running, next);
    let checks = [
        (a.listener.bind_address != b.listener.bind_address, "listener.bind_address"),
        (a.upstream.address != b.upstream.address, "upstream.address"),
        (a.timeouts.request_secs != b.timeouts.request_secs, "timeouts.request_secs"),
        (a.observability.log_level != b.observability.log_level, "observability.log_level"),
        (
            a.observability.metrics_enabled != b.observability.metrics_enabled
                || a.observability.metrics_address != b.observability.metrics_address,
            "observability.metrics",
        ),
        (a.security.replay.strategy != b.security.replay.strategy, "security.replay.strategy"),
        (a.security.replay.ttl_secs != b.security.replay.ttl_secs, "security.replay.ttl_secs"),
        (
            a.security.replay.nonce_key_prefix != b.security.replay.nonce_key_prefix,
            "security.replay.nonce_key_prefix",
        ),
        (a.security.logging.publisher != b.security.logging.publisher, "security.logging.publisher"),
    ];
    checks
        .into_iter()
        .filter_map(|(changed, field)| changed.then_some(field))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_only_edit_needs_no_restart() {
        let running = GatewayConfig::default();
        let mut next = running.clone();
        next.security.replay.enabled = true;
        next.security.global.exclude_paths = vec!["/actuator/**".into()];
        assert!(restart_only_changes(&running, &next).is_empty());
    }

    #[test]
    fn reports_startup_sections() {
        let running = GatewayConfig::default();
        let mut next = running.clone();
        next.upstream.address = "http://10.0.0.2:9000".into();
        next.security.replay.ttl_secs = 60;
        assert_eq!(
            restart_only_changes(&running, &next),
            vec!["upstream.address", "security.replay.ttl_secs"]
        );
    }

    #[tokio::test]
    async fn emits_valid_revision_after_file_change() {
        let dir = std::env::temp_dir().join(format!("gateway-watch-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("gateway.toml");
        std::fs::write(&path, "[security.replay]\nenabled = false\n").unwrap();

        let (watcher, mut updates) = ConfigWatcher::new(&path, GatewayConfig::default());
        let _handle = watcher.run().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Invalid revision is dropped, the valid one that follows is emitted.
        std::fs::write(&path, "[upstream]\naddress = \"ftp://nope\"\n").unwrap();
        tokio::time::sleep(SETTLE * 2).await;
        std::fs::write(&path, "[security.replay]\nenabled = true\n").unwrap();

        let config = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let config = updates.recv().await.expect("watcher stopped");
                if config.security.replay.enabled {
                    break config;
                }
            }
        })
        .await
        .expect("no reload observed");
        assert!(config.security.replay.enabled);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
