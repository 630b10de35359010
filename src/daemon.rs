//! Background supervisor: runs the failover watchdog, the drop-log tailer
//! and the deny-event aggregator until shutdown.

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::context::ControlContext;
use crate::model::Platform;
use crate::monitor::TailFollower;
use crate::signal::ShutdownToken;

/// Handles of the running background loops.
pub struct Supervisor {
    shutdown: ShutdownToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Supervisor {
    /// Spawn every enabled loop. Each one observes `shutdown`.
    pub fn start(ctx: &ControlContext, shutdown: ShutdownToken) -> Result<Self> {
        let mut tasks = Vec::new();

        if ctx.config.watchdog.enabled {
            let watchdog = ctx.watchdog();
            tasks.push(("watchdog", tokio::spawn(watchdog.run(shutdown.clone()))));
        }

        if ctx.config.monitor.enabled {
            let raiser = ctx.alert_raiser()?;

            // the drop log is an iptables artefact
            if ctx.platform == Platform::Linux {
                let tailer = ctx.drop_monitor(raiser.clone());
                let source = TailFollower::new(&ctx.config.monitor.log_path);
                tasks.push(("tailer", tokio::spawn(tailer.run(source, shutdown.clone()))));
            } else {
                info!("Drop-log tailer disabled on {}", ctx.platform);
            }

            let aggregator = ctx.deny_aggregator(raiser);
            tasks.push(("aggregator", tokio::spawn(aggregator.run(shutdown.clone()))));
        }

        info!("Started {} background task(s)", tasks.len());
        Ok(Self { shutdown, tasks })
    }

    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|(name, _)| *name).collect()
    }

    /// Cancel every loop and wait for all of them to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for (name, handle) in self.tasks {
            if let Err(e) = handle.await {
                error!("Background task '{}' ended abnormally: {}", name, e);
            }
        }
        info!("All background tasks stopped");
    }
}
