// # huckleberryd - Huckleberry bridge daemon
//
// A thin integration layer: all bridge logic lives in huckleberry-core.
//
// The daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Creating the tracker backend through the registry
// 4. Setting up the integration and driving the coordinator
// 5. Logging projected entity states whenever a snapshot is published
//
// ## Configuration
//
// - `HUCKLEBERRY_EMAIL`: Account email (required)
// - `HUCKLEBERRY_PASSWORD`: Account password (required)
// - `HUCKLEBERRY_BACKEND`: Backend type (default: memory)
// - `HUCKLEBERRY_SEED_FILE`: JSON seed file (memory backend only)
// - `HUCKLEBERRY_FALLBACK_INTERVAL_SECS`: Fallback refresh interval, 10-3600 (default: 60)
// - `HUCKLEBERRY_LOG_LEVEL`: trace, debug, info, warn, error (default: info)
//
// ## Example
//
// ```bash
// export HUCKLEBERRY_EMAIL=parent@example.com
// export HUCKLEBERRY_PASSWORD=secret
// export HUCKLEBERRY_SEED_FILE=/etc/huckleberry/seed.json
//
// huckleberryd
// ```

use anyhow::Result;
use huckleberry_core::entity;
use huckleberry_core::{
    BackendConfig, BackendRegistry, CoordinatorConfig, CoordinatorEvent, HuckleberryConfig,
    Integration,
};
use std::env;
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_stream::StreamExt;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// How long the coordinator gets to stop after a shutdown signal
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
/// - 3: Integration setup failed (auth, no children, unreachable)
#[derive(Debug, Clone, Copy)]
enum HuckleberryExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
    /// Setup aborted with a setup failure reason
    SetupFailed = 3,
}

impl From<HuckleberryExitCode> for ExitCode {
    fn from(code: HuckleberryExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    email: String,
    password: String,
    backend: String,
    seed_file: Option<String>,
    fallback_interval_secs: Option<u64>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        let fallback_interval_secs = match env::var("HUCKLEBERRY_FALLBACK_INTERVAL_SECS") {
            Ok(value) => Some(value.trim().parse().map_err(|_| {
                anyhow::anyhow!(
                    "HUCKLEBERRY_FALLBACK_INTERVAL_SECS must be a number of seconds. Got: {}",
                    value
                )
            })?),
            Err(_) => None,
        };

        Ok(Self {
            email: env::var("HUCKLEBERRY_EMAIL").unwrap_or_default(),
            password: env::var("HUCKLEBERRY_PASSWORD").unwrap_or_default(),
            backend: env::var("HUCKLEBERRY_BACKEND").unwrap_or_else(|_| "memory".to_string()),
            seed_file: env::var("HUCKLEBERRY_SEED_FILE").ok(),
            fallback_interval_secs,
            log_level: env::var("HUCKLEBERRY_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.email.trim().is_empty() {
            anyhow::bail!(
                "HUCKLEBERRY_EMAIL is required. \
                Set it via: export HUCKLEBERRY_EMAIL=parent@example.com"
            );
        }
        if !self.email.contains('@') {
            anyhow::bail!("HUCKLEBERRY_EMAIL does not look like an email address: {}", self.email);
        }

        if self.password.is_empty() {
            anyhow::bail!(
                "HUCKLEBERRY_PASSWORD is required. \
                Set it via: export HUCKLEBERRY_PASSWORD=your_password"
            );
        }

        if self.backend.trim().is_empty() {
            anyhow::bail!("HUCKLEBERRY_BACKEND cannot be empty");
        }

        if let Some(path) = &self.seed_file {
            if self.backend != "memory" {
                anyhow::bail!(
                    "HUCKLEBERRY_SEED_FILE is only supported with HUCKLEBERRY_BACKEND=memory"
                );
            }
            if !std::path::Path::new(path).is_file() {
                anyhow::bail!("HUCKLEBERRY_SEED_FILE does not exist: {}", path);
            }
        }

        if let Some(interval) = self.fallback_interval_secs
            && !(10..=3600).contains(&interval)
        {
            anyhow::bail!(
                "HUCKLEBERRY_FALLBACK_INTERVAL_SECS must be between 10 and 3600 seconds. Got: {}",
                interval
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "HUCKLEBERRY_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// Build the core configuration
    fn to_core(&self) -> HuckleberryConfig {
        let backend = match self.backend.as_str() {
            "memory" => BackendConfig::Memory {
                seed_file: self.seed_file.clone(),
            },
            other => BackendConfig::Custom {
                factory: other.to_string(),
                config: serde_json::Value::Object(Default::default()),
            },
        };

        let mut coordinator = CoordinatorConfig::default();
        if let Some(secs) = self.fallback_interval_secs {
            coordinator.fallback_interval_secs = secs;
        }

        HuckleberryConfig::new(&self.email, &self.password)
            .with_backend(backend)
            .with_coordinator(coordinator)
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return HuckleberryExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return HuckleberryExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return HuckleberryExitCode::ConfigError.into();
    }

    info!("Starting huckleberryd");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return HuckleberryExitCode::RuntimeError.into();
        }
    };

    rt.block_on(run_daemon(config)).into()
}

/// Run the daemon until a shutdown signal arrives
async fn run_daemon(config: Config) -> HuckleberryExitCode {
    let core_config = config.to_core();
    if let Err(e) = core_config.validate() {
        error!("Invalid configuration: {}", e);
        return HuckleberryExitCode::ConfigError;
    }

    let registry = BackendRegistry::with_builtin();
    info!("Registered backends: {}", registry.list_backends().join(", "));

    let api = match registry.create_backend(&core_config).await {
        Ok(api) => api,
        Err(e) => {
            error!("Failed to create {} backend: {}", config.backend, e);
            return HuckleberryExitCode::ConfigError;
        }
    };

    let (integration, events) = match Integration::setup(api, &core_config).await {
        Ok(setup) => setup,
        Err(e) => {
            error!("Setup failed: {} (reason: {})", e.source, e.reason.key());
            return HuckleberryExitCode::SetupFailed;
        }
    };

    match run_integration(&integration, events).await {
        Ok(()) => HuckleberryExitCode::CleanShutdown,
        Err(e) => {
            error!("Daemon error: {}", e);
            integration.unload().await;
            HuckleberryExitCode::RuntimeError
        }
    }
}

async fn run_integration(
    integration: &Integration,
    mut events: tokio::sync::mpsc::Receiver<CoordinatorEvent>,
) -> Result<()> {
    let coordinator = integration.coordinator().clone();
    let listeners = integration.listeners();
    if !listeners.failed.is_empty() {
        warn!(
            "{} listener(s) failed to register; affected entities stay unavailable",
            listeners.failed.len()
        );
    }

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let loop_handle = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.run_with_shutdown(Some(shutdown_rx)).await })
    };

    // Log entity states on every published snapshot
    let mut updates = coordinator.updates();
    let children = coordinator.children().to_vec();
    let observer = tokio::spawn(async move {
        while let Some(snapshot) = updates.next().await {
            for entity in entity::project_all(&children, &snapshot) {
                info!(
                    entity_id = %entity.entity_id,
                    available = entity.available,
                    "{} = {}",
                    entity.name,
                    entity.state
                );
            }
        }
    });

    let event_logger = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                CoordinatorEvent::ListenerFailed { child_id, stream, error } => {
                    warn!("Listener {}/{} failed: {}", child_id, stream, error)
                }
                CoordinatorEvent::SessionMaintenanceFailed { error } => {
                    warn!("Session maintenance failed: {}", error)
                }
                other => debug!("Coordinator event: {:?}", other),
            }
        }
    });

    info!("Bridge running for {} child(ren)", coordinator.children().len());

    let signal = wait_for_shutdown().await?;
    info!("Received shutdown signal: {}", signal);

    let _ = shutdown_tx.send(());
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, loop_handle).await {
        Ok(Ok(result)) => result?,
        Ok(Err(e)) => anyhow::bail!("Coordinator task failed: {}", e),
        Err(_) => anyhow::bail!("Shutdown timeout after {:?}", SHUTDOWN_TIMEOUT),
    }
    integration.unload().await;

    observer.abort();
    event_logger.abort();
    info!("Shut down cleanly");
    Ok(())
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let signal = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(signal)
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
