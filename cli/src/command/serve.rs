use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tokio::net::TcpListener;

use boxlib::Systemctl;

use crate::server::{self, AppState};

#[derive(Debug, Args)]
pub struct Serve {
    #[arg(long, env = "BOXMAN_BIND", default_value = "0.0.0.0:1323", help = "Address to listen on")]
    pub bind: SocketAddr,
    #[arg(
        long,
        env = "BOXMAN_LIST_TIMEOUT",
        default_value_t = 10,
        value_name = "SECS",
        help = "Kill service listings still running after this many seconds"
    )]
    pub list_timeout: u64,
    #[arg(long, env = "BOXMAN_SYSTEMCTL", default_value = "systemctl", help = "systemctl binary to query")]
    pub systemctl: String,
    #[arg(
        long,
        env = "BOXMAN_HOME",
        value_name = "DIR",
        help = "Directory ~/ expands to in rendered units [default: your home directory]"
    )]
    pub home: Option<PathBuf>,
}

impl Serve {
    pub async fn run(&self) -> Result<()> {
        let lister =
            Systemctl::new(&self.systemctl).timeout(Duration::from_secs(self.list_timeout));
        let mut state = AppState::new(Arc::new(lister));
        if let Some(home) = &self.home {
            state = state.with_home_dir(home);
        }

        let listener = TcpListener::bind(self.bind)
            .await
            .with_context(|| format!("Failed to bind {}", self.bind))?;
        let addr = listener.local_addr()?;
        tracing::info!(%addr, systemctl = %self.systemctl, "listening");
        eprintln!("Listening on http://{addr}");

        axum::serve(listener, server::router(state))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server failed")?;
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
