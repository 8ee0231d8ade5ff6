//! Supervisor mode: delegate DHCP service to an external dnsmasq process.
//!
//! Instead of running the built-in protocol engine, this mode renders a
//! dnsmasq configuration from the same [`Config`] (pool range, router and
//! DNS options, static hosts), spawns dnsmasq in the foreground, and
//! stops it on shutdown. Useful where dnsmasq is already deployed and
//! only the configuration should be managed here.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::config::{Config, StaticLease};
use crate::error::{Error, Result};

/// How long `stop` waits for dnsmasq to exit before giving up.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Manages a dnsmasq child process and its generated configuration.
pub struct DnsmasqSupervisor {
    config: Arc<Config>,
    child: Option<Child>,
}

impl DnsmasqSupervisor {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            child: None,
        }
    }

    /// Renders the dnsmasq configuration file contents.
    ///
    /// DNS serving is disabled (`port=0`); dnsmasq acts purely as the
    /// DHCP daemon here.
    pub fn render_config(&self, static_leases: &[StaticLease]) -> String {
        let config = &self.config;
        let mut out = String::new();

        out.push_str("# Generated by leaselet; do not edit.\n");
        out.push_str("port=0\n");
        out.push_str("bind-interfaces\n");
        out.push_str(&format!("listen-address={}\n", config.server_ip));
        out.push_str(&format!(
            "dhcp-range={},{},{},{}s\n",
            config.pool_start, config.pool_end, config.subnet_mask, config.lease_ttl
        ));
        out.push_str(&format!("dhcp-option=option:router,{}\n", config.server_ip));
        out.push_str(&format!(
            "dhcp-option=option:dns-server,{}\n",
            config.dns_server
        ));
        out.push_str("dhcp-authoritative\n");

        for lease in static_leases {
            match &lease.hostname {
                Some(hostname) => out.push_str(&format!(
                    "dhcp-host={},{},{}\n",
                    lease.mac, lease.ip, hostname
                )),
                None => out.push_str(&format!("dhcp-host={},{}\n", lease.mac, lease.ip)),
            }
        }

        out
    }

    /// Loads static leases, renders the configuration, and writes it to
    /// the configured path.
    pub fn generate_config(&self) -> Result<PathBuf> {
        let static_leases = self.config.load_static_leases()?;
        let rendered = self.render_config(&static_leases);

        let path = PathBuf::from(&self.config.dnsmasq_config_file);
        std::fs::write(&path, rendered).map_err(|error| {
            Error::Daemon(format!(
                "failed to write dnsmasq config {}: {}",
                path.display(),
                error
            ))
        })?;

        info!("wrote dnsmasq configuration to {}", path.display());
        Ok(path)
    }

    /// Spawns dnsmasq in the foreground against the generated
    /// configuration.
    pub fn start(&mut self) -> Result<()> {
        let child = Command::new(&self.config.dnsmasq_executable)
            .arg("-C")
            .arg(&self.config.dnsmasq_config_file)
            .arg("--keep-in-foreground")
            .kill_on_drop(true)
            .spawn()
            .map_err(|error| {
                Error::Daemon(format!(
                    "failed to start {}: {}",
                    self.config.dnsmasq_executable, error
                ))
            })?;

        info!(
            "started {} (pid {:?})",
            self.config.dnsmasq_executable,
            child.id()
        );
        self.child = Some(child);
        Ok(())
    }

    /// Stops the supervised process, waiting up to [`STOP_TIMEOUT`] for
    /// it to exit. A no-op when nothing is running.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        child
            .start_kill()
            .map_err(|error| Error::Daemon(format!("failed to stop dnsmasq: {}", error)))?;

        match tokio::time::timeout(STOP_TIMEOUT, child.wait()).await {
            Ok(status) => {
                let status = status
                    .map_err(|error| Error::Daemon(format!("failed to reap dnsmasq: {}", error)))?;
                info!("dnsmasq stopped ({})", status);
                Ok(())
            }
            Err(_) => {
                warn!("dnsmasq did not exit within {:?}", STOP_TIMEOUT);
                Err(Error::Daemon("dnsmasq did not exit in time".to_string()))
            }
        }
    }

    /// Returns true if the supervised process is still running.
    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }
}
