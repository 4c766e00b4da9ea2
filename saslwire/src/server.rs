use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::sync::watch;

use wire_proto::server::{AuthServer, SessionSettings};
use wire_proto::verifier::password_engines;
use wire_user::config::*;
use wire_user::login::{demo_provider::*, static_provider::*, *};

use crate::mechanisms;

pub struct Server {
    auth_server: AuthServer,
    pid_file: Option<PathBuf>,
}

impl Server {
    pub async fn from_config(config: ServerConfig) -> Result<Self> {
        let login = login_provider(config.users).await?;
        let offered = mechanisms(&config.mechanisms)?;

        let hostname = match config.hostname {
            Some(h) => h,
            None => nix::unistd::gethostname()?
                .into_string()
                .map_err(|h| anyhow!("hostname {:?} is not valid UTF-8", h))?,
        };

        let settings = SessionSettings {
            service: config.service,
            hostname,
            realm: config.realm,
        };
        tracing::debug!(settings=?settings, mechanisms=?offered, "server configured");

        Ok(Self {
            auth_server: AuthServer::new(
                config.bind_addr,
                settings,
                password_engines(offered, login),
            ),
            pid_file: config.pid,
        })
    }

    pub async fn run(self) -> Result<()> {
        let pid = std::process::id();
        tracing::info!(pid = pid, "Starting saslwire...");
        if let Some(path) = &self.pid_file {
            std::fs::write(path, pid.to_string())
                .with_context(|| format!("unable to write pid file {:?}", path))?;
        }

        let (exit_signal, _provoke_exit) = watch_ctrl_c();
        self.auth_server.run(exit_signal).await?;

        tracing::info!("Server exiting");
        Ok(())
    }
}

async fn login_provider(users: UserManagement) -> Result<ArcLoginProvider> {
    let lp: ArcLoginProvider = match users {
        UserManagement::Demo => {
            tracing::warn!("Demo users only, NOT INTENDED FOR PRODUCTION");
            Arc::new(DemoLoginProvider::new())
        }
        UserManagement::Static(cfg) => Arc::new(StaticLoginProvider::new(cfg).await?),
    };
    Ok(lp)
}

pub fn watch_ctrl_c() -> (watch::Receiver<bool>, Arc<watch::Sender<bool>>) {
    let (send_cancel, watch_cancel) = watch::channel(false);
    let send_cancel = Arc::new(send_cancel);
    let send_cancel_2 = send_cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(err=%e, "failed to install CTRL+C signal handler");
            return;
        }
        tracing::info!("Received CTRL+C, shutting down.");
        let _ = send_cancel.send(true);
    });
    (watch_cancel, send_cancel_2)
}
