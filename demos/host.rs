//! Minimal host process wiring up the orchestrator against a handful
//! of stand-in components: dependency-ordered startup, OS-signal
//! driven shutdown, and a reload hook. Mirrors the host-process
//! integration the spec describes in §6 — this binary is demonstration
//! plumbing, not part of the library surface.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use serde_json::{json, Value};
use tracing::info;

use lifecycle_orchestrator::{
    BulkStartOptions, Capabilities, Component, ComponentLifecycleRef, ComponentOptions, HealthCheckResult, Manager,
    ManagerConfig, ValueLookup,
};

#[derive(Parser, Debug)]
#[command(name = "lifecycle-demo-host", about = "Demo host for the component lifecycle orchestrator")]
struct Args {
    /// Path to a config directory or TOML file (see ManagerConfig::load_from).
    #[arg(long, env = "LCO_CONFIG")]
    config: Option<String>,
}

struct Database {
    ready: AtomicBool,
}

#[async_trait]
impl Component for Database {
    fn name(&self) -> &str {
        "database"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            health_check: true,
            get_value: true,
            ..Capabilities::none()
        }
    }

    async fn start(&self) -> anyhow::Result<()> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.ready.store(true, Ordering::SeqCst);
        info!("database connected");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.ready.store(false, Ordering::SeqCst);
        info!("database connection closed");
        Ok(())
    }

    async fn health_check(&self) -> anyhow::Result<HealthCheckResult> {
        Ok(HealthCheckResult::from(self.ready.load(Ordering::SeqCst)))
    }

    async fn get_value(&self, key: &str, _from: Option<String>) -> ValueLookup {
        match key {
            "connection-count" => ValueLookup::found(json!(1)),
            _ => ValueLookup::NotFound,
        }
    }
}

struct Cache;

#[async_trait]
impl Component for Cache {
    fn name(&self) -> &str {
        "cache"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            on_shutdown_warning: true,
            ..Capabilities::none()
        }
    }

    async fn start(&self) -> anyhow::Result<()> {
        info!("cache warmed up");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        info!("cache flushed");
        Ok(())
    }

    async fn on_shutdown_warning(&self) {
        info!("cache draining connections ahead of shutdown");
    }
}

struct ApiServer {
    handle: ComponentLifecycleRef,
}

#[async_trait]
impl Component for ApiServer {
    fn name(&self) -> &str {
        "api-server"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            on_reload: true,
            on_message: true,
            ..Capabilities::none()
        }
    }

    async fn start(&self) -> anyhow::Result<()> {
        info!("api server listening");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        info!("api server stopped accepting connections");
        Ok(())
    }

    async fn on_reload(&self) -> anyhow::Result<()> {
        let health = self.handle.check_component_health("database").await;
        info!(code = ?health.code, "api server reloaded config, rechecked database health");
        Ok(())
    }

    async fn on_message(&self, payload: Value, from: Option<String>) -> anyhow::Result<Value> {
        Ok(json!({ "echo": payload, "from": from }))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match args.config {
        Some(path) => ManagerConfig::load_from(path)?,
        None => ManagerConfig::default(),
    };

    let filter = format!("{},lifecycle_orchestrator=debug", config.logging.level);
    tracing_subscriber::fmt().with_env_filter(filter.as_str()).json().init();

    let manager = Manager::new(config);

    manager
        .register_component(
            Arc::new(Database {
                ready: AtomicBool::new(false),
            }),
            ComponentOptions::new("database")?,
        )
        .await;
    manager
        .register_component(Arc::new(Cache), ComponentOptions::new("cache")?.dependencies(["database"]))
        .await;
    manager
        .register_component(
            Arc::new(ApiServer {
                handle: manager.scoped_handle("api-server"),
            }),
            ComponentOptions::new("api-server")?.dependencies(["database", "cache"]),
        )
        .await;

    let result = manager.start_all_components(BulkStartOptions::default()).await;
    info!(code = ?result.code, started = ?result.started, "startup complete");

    manager.attach_signals().await;
    info!("signals attached; send SIGINT/SIGTERM to shut down, SIGHUP to reload");

    loop {
        tokio::time::sleep(Duration::from_secs(1)).await;
        if manager.get_system_state().await == lifecycle_orchestrator::SystemState::Stopped {
            break;
        }
    }

    Ok(())
}
