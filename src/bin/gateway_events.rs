use anyhow::Result;
use gateway_runner::bin_common::{
    config_type_from_args, init_logging_with_level, load_config_from_env, parse_args,
    BinaryRunner, GatewayAppConfig, RunConfig, ShutdownManager,
};
use gateway_runner::gateway_shard::{GatewayManager, JsonEventDecoder, StreamError};
use std::time::Duration;
use tracing::{info, warn};

struct EventsApp {
    config: RunConfig,
    manager: GatewayManager<JsonEventDecoder>,
    shutdown: ShutdownManager,
    events_seen: u64,
}

impl EventsApp {
    fn log_status(&self) {
        for event in std::iter::from_fn(|| self.manager.try_recv_shard_event()) {
            info!("Shard event: {:?}", event);
        }

        let metrics = self.manager.metrics();
        let budget = self.manager.rate_budget();
        info!(
            "Status: phase={} events={} received={} sent={} reconnects={} decode_failures={} latency={:?} budget={}/{}",
            metrics.phase,
            self.events_seen,
            metrics.frames_received,
            metrics.frames_sent,
            metrics.reconnect_count,
            metrics.decode_failures,
            metrics.latency,
            budget.tokens,
            budget.capacity,
        );
    }
}

impl BinaryRunner for EventsApp {
    async fn run(&mut self) -> Result<()> {
        let mut events = self.manager.events();
        let mut failures = self.manager.failures();

        tokio::select! {
            connected = self.manager.connect() => connected?,
            _ = self.shutdown.wait() => {
                self.manager.disconnect().await;
                return Ok(());
            }
        }

        let session = self.manager.session().await;
        info!(
            "Connected, session {}",
            session.session_id().unwrap_or("<none>")
        );

        let mut status = tokio::time::interval(Duration::from_secs(self.config.status_interval_secs));
        status.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.wait() => break,

                event = events.recv() => match event {
                    Ok(event) => {
                        self.events_seen += 1;
                        info!("{} #{:?}", event.name, event.sequence);
                    }
                    Err(StreamError::Lagged(missed)) => warn!("Event consumer lagged, {} events dropped", missed),
                    Err(StreamError::Closed) => break,
                },

                failure = failures.recv() => match failure {
                    Ok(failure) => warn!(
                        "Undecodable dispatch ({}): {}",
                        failure.error,
                        failure.raw_text().unwrap_or("<binary>")
                    ),
                    Err(StreamError::Lagged(missed)) => warn!("Failure consumer lagged, {} dropped", missed),
                    Err(StreamError::Closed) => break,
                },

                _ = status.tick() => self.log_status(),
            }
        }

        self.manager.disconnect().await;
        Ok(())
    }

    fn config(&self) -> &RunConfig {
        &self.config
    }

    fn stats(&self) -> Option<String> {
        let metrics = self.manager.metrics();
        Some(format!(
            "Events: {}, reconnects: {}, decode failures: {}",
            self.events_seen, metrics.reconnect_count, metrics.decode_failures
        ))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load config first (before logging is initialized)
    let config_path = load_config_from_env(config_type_from_args(&parse_args()));
    let config = GatewayAppConfig::load(&config_path)?;

    // Initialize logging with configured level
    init_logging_with_level(&config.log_level);
    config.log();

    let shutdown = ShutdownManager::new();
    shutdown.spawn_signal_handler();

    let mut app = EventsApp {
        config: RunConfig::new("Gateway Events").with_status_interval(config.status_interval_secs),
        manager: config.build_manager()?,
        shutdown,
        events_seen: 0,
    };

    app.execute().await
}
