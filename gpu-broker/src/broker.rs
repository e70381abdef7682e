//! Composition root: wires the registry, admission engine, reaper, and
//! wire endpoint together into a runnable broker.

use std::sync::Arc;

use device_inspector::{nvml::NvmlInspector, DeviceInspector};
use holder_supervisor::HolderSupervisor;
use snafu::ResultExt;
use tokio::net::TcpListener;

use crate::config::BrokerConfig;
use crate::dispatch::{handle_connection, BrokerState};
use crate::error::{Bind, BrokerResult, Fatal, InspectorInit, LoggerInit};
use crate::logging::Logger;
use crate::registry::Registry;

/// A running (or about-to-run) broker: the registry, admission engine,
/// reaper, and wire endpoint, composed once at startup.
pub struct Broker {
    state: BrokerState,
    listener: TcpListener,
    reaper_interval: std::time::Duration,
}

impl Broker {
    /// The address actually bound, useful in tests that bind to port 0
    /// and need to discover the chosen port.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Build a broker against the real NVML-backed inspector.
    pub async fn new(config: BrokerConfig) -> BrokerResult<Self> {
        let inspector: Arc<dyn DeviceInspector> =
            Arc::new(NvmlInspector::new().context(InspectorInit)?);
        Self::with_inspector(config, inspector).await
    }

    /// Build a broker against an arbitrary inspector — the seam the test
    /// suite uses to swap in `device_inspector::mock::MockInspector`.
    pub async fn with_inspector(
        config: BrokerConfig,
        inspector: Arc<dyn DeviceInspector>,
    ) -> BrokerResult<Self> {
        let logger = Arc::new(Logger::open(&config.logger_dir).context(LoggerInit)?);

        // On startup the broker resets every device's compute-mode to
        // DEFAULT, so it never inherits a leftover exclusive lock.
        device_inspector::reset_all_devices(&*inspector).context(InspectorInit)?;

        let listen_addr = format!("{}:{}", config.listen_host, config.listen_port);
        let listener = TcpListener::bind(&listen_addr).await.context(Bind {
            host: config.listen_host.clone(),
            port: config.listen_port,
        })?;
        logger.info(format!("listening on {}", listen_addr));

        let supervisor = HolderSupervisor::new(config.holder_binary.clone());
        let state = BrokerState {
            inspector,
            registry: Registry::new(),
            supervisor,
            logger,
            admission_lock: Arc::new(tokio::sync::Mutex::new(())),
        };

        Ok(Self {
            state,
            listener,
            reaper_interval: config.reaper_interval,
        })
    }

    /// Run the accept loop, the reaper, and dispatch until a fatal driver
    /// error is observed, then clean up and return it.
    pub async fn run(self) -> BrokerResult<()> {
        let mut reaper_tick = tokio::time::interval(self.reaper_interval);
        // The first tick fires immediately; consume it so the reaper's
        // first real scan happens one interval after startup.
        reaper_tick.tick().await;

        let result = loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, _addr)) => {
                            let state = self.state.clone();
                            tokio::spawn(handle_connection(stream, state));
                        }
                        Err(err) => {
                            self.state.logger.error(format!("accept failed: {}", err));
                        }
                    }
                }
                _ = reaper_tick.tick() => {
                    if let Some(err) = crate::reaper::reap_once(&*self.state.inspector, &self.state.registry, &self.state.logger).await {
                        break Err(err);
                    }
                }
            }
        };

        self.clean_up().await;
        result.context(Fatal)
    }

    /// Release every outstanding reservation and close the log sink:
    /// stop each holder, restore exclusive devices to DEFAULT, drop the
    /// registry entries. Driver errors here are logged, not propagated —
    /// the process is already on its way down.
    async fn clean_up(&self) {
        for handle in self.state.registry.handles().await {
            if let Some(mut reservation) = self.state.registry.remove(&handle).await {
                if let Err(err) =
                    crate::registry::stop_and_restore(&*self.state.inspector, &self.state.logger, &mut reservation)
                        .await
                {
                    self.state.logger.error(format!(
                        "failed to restore compute mode for device {} during clean-up: {}",
                        reservation.device_index, err
                    ));
                }
            }
        }
        self.state.logger.info("clean-up complete, shutting down");
        self.state.logger.close();
    }
}
