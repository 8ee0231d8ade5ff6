//! Server configuration and static lease ingestion.
//!
//! Configuration is a JSON file with a fixed set of recognized keys
//! (server identity, pool bounds, lease TTL, bind endpoint). Static
//! MAC-to-IP reservations come from a separate line-oriented text file,
//! one `mac,ip[,hostname]` entry per line.
//!
//! All validation failures here are fatal at startup, before the socket
//! is opened.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::Path;

use crate::error::{Error, Result};
use crate::lease::MacAddr;

/// Server configuration.
///
/// Recognized keys: `server_ip`, `subnet_mask`, `dns_server`,
/// `pool_start`, `pool_end`, `lease_ttl`, `bind_address`, `bind_port`,
/// plus `static_leases_file` and the dnsmasq supervisor-mode keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// This server's own address, also handed out as router and server
    /// identifier.
    pub server_ip: Ipv4Addr,
    /// Subnet mask handed to clients (Option 1).
    pub subnet_mask: Ipv4Addr,
    /// DNS server handed to clients (Option 6). A single address.
    pub dns_server: Ipv4Addr,
    /// First address of the dynamic pool (inclusive).
    pub pool_start: Ipv4Addr,
    /// Last address of the dynamic pool (inclusive).
    pub pool_end: Ipv4Addr,
    /// Lease duration in seconds, applied to new and renewed leases.
    pub lease_ttl: u32,
    /// Address the UDP socket binds to.
    pub bind_address: Ipv4Addr,
    /// Port the UDP socket binds to (67 unless testing).
    pub bind_port: u16,
    /// Optional path to the static reservation file.
    pub static_leases_file: Option<String>,
    /// dnsmasq binary used in supervisor mode.
    pub dnsmasq_executable: String,
    /// Where supervisor mode writes the generated dnsmasq configuration.
    pub dnsmasq_config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_ip: Ipv4Addr::new(10, 0, 0, 1),
            subnet_mask: Ipv4Addr::new(255, 255, 255, 0),
            dns_server: Ipv4Addr::new(10, 0, 0, 1),
            pool_start: Ipv4Addr::new(10, 0, 0, 100),
            pool_end: Ipv4Addr::new(10, 0, 0, 200),
            lease_ttl: 3600,
            bind_address: Ipv4Addr::UNSPECIFIED,
            bind_port: 67,
            static_leases_file: None,
            dnsmasq_executable: "dnsmasq".to_string(),
            dnsmasq_config_file: "dnsmasq.conf".to_string(),
        }
    }
}

impl Config {
    /// Loads the configuration from `path`, or writes defaults there if
    /// the file does not exist yet.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path)?;
            Ok(config)
        }
    }

    /// Writes the configuration to `path` as pretty-printed JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validates pool bounds and lease duration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `pool_start > pool_end`, the
    /// server's own address lies inside the pool, or `lease_ttl` is zero.
    pub fn validate(&self) -> Result<()> {
        let start = u32::from(self.pool_start);
        let end = u32::from(self.pool_end);

        if start > end {
            return Err(Error::InvalidConfig(
                "pool_start must be less than or equal to pool_end".to_string(),
            ));
        }

        let server = u32::from(self.server_ip);
        if server >= start && server <= end {
            return Err(Error::InvalidConfig(
                "server_ip must not be within the pool range".to_string(),
            ));
        }

        if self.lease_ttl == 0 {
            return Err(Error::InvalidConfig(
                "lease_ttl must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Returns true if `ip` lies within `[pool_start, pool_end]`.
    pub fn ip_in_pool(&self, ip: Ipv4Addr) -> bool {
        let addr = u32::from(ip);
        addr >= u32::from(self.pool_start) && addr <= u32::from(self.pool_end)
    }

    /// Number of addresses in the dynamic pool.
    pub fn pool_size(&self) -> u32 {
        u32::from(self.pool_end) - u32::from(self.pool_start) + 1
    }

    /// Loads the static reservation file named by `static_leases_file`,
    /// or returns an empty list when none is configured.
    pub fn load_static_leases(&self) -> Result<Vec<StaticLease>> {
        match &self.static_leases_file {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|error| {
                    Error::InvalidConfig(format!(
                        "cannot read static lease file {}: {}",
                        path, error
                    ))
                })?;
                parse_static_leases(&content)
            }
            None => Ok(Vec::new()),
        }
    }
}

/// A permanent MAC-to-IP binding from the static lease file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticLease {
    /// Reserved hardware address.
    pub mac: MacAddr,
    /// The address this MAC always receives.
    pub ip: Ipv4Addr,
    /// Optional hostname, used only for the dnsmasq configuration.
    pub hostname: Option<String>,
}

/// Parses the static lease file contents.
///
/// Each non-blank, non-comment line must be `mac,ip` or `mac,ip,hostname`.
/// Any other field count, or an unparsable MAC or IP, is a fatal
/// configuration error.
pub fn parse_static_leases(content: &str) -> Result<Vec<StaticLease>> {
    let mut leases = Vec::new();

    for (line_number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() < 2 || fields.len() > 3 {
            return Err(Error::InvalidConfig(format!(
                "static lease line {}: expected 2 or 3 comma-separated fields, got {}",
                line_number + 1,
                fields.len()
            )));
        }

        let mac: MacAddr = fields[0].parse().map_err(|_| {
            Error::InvalidConfig(format!(
                "static lease line {}: invalid MAC address {:?}",
                line_number + 1,
                fields[0]
            ))
        })?;
        let ip: Ipv4Addr = fields[1].parse().map_err(|_| {
            Error::InvalidConfig(format!(
                "static lease line {}: invalid IP address {:?}",
                line_number + 1,
                fields[1]
            ))
        })?;
        let hostname = fields.get(2).map(|name| name.to_string());

        leases.push(StaticLease { mac, ip, hostname });
    }

    Ok(leases)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_pool_start_greater_than_end() {
        let config = Config {
            pool_start: Ipv4Addr::new(10, 0, 0, 200),
            pool_end: Ipv4Addr::new(10, 0, 0, 100),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_server_ip_in_pool_rejected() {
        let config = Config {
            server_ip: Ipv4Addr::new(10, 0, 0, 150),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_lease_ttl_rejected() {
        let config = Config {
            lease_ttl: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ip_in_pool() {
        let config = Config::default();
        assert!(config.ip_in_pool(Ipv4Addr::new(10, 0, 0, 150)));
        assert!(config.ip_in_pool(Ipv4Addr::new(10, 0, 0, 100)));
        assert!(config.ip_in_pool(Ipv4Addr::new(10, 0, 0, 200)));
        assert!(!config.ip_in_pool(Ipv4Addr::new(10, 0, 0, 50)));
        assert!(!config.ip_in_pool(Ipv4Addr::new(10, 0, 0, 250)));
    }

    #[test]
    fn test_pool_size() {
        let config = Config::default();
        assert_eq!(config.pool_size(), 101);
    }

    #[test]
    fn test_parse_static_leases() {
        let content = "\
# reserved hosts
aa:bb:cc:dd:ee:01,10.0.0.5
aa:bb:cc:dd:ee:02,10.0.0.6,printer

aa:bb:cc:dd:ee:03, 10.0.0.7 , nas
";
        let leases = parse_static_leases(content).unwrap();
        assert_eq!(leases.len(), 3);
        assert_eq!(leases[0].ip, Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(leases[0].hostname, None);
        assert_eq!(leases[1].hostname, Some("printer".to_string()));
        assert_eq!(leases[2].mac.to_string(), "aa:bb:cc:dd:ee:03");
        assert_eq!(leases[2].hostname, Some("nas".to_string()));
    }

    #[test]
    fn test_static_lease_wrong_field_count_fatal() {
        assert!(parse_static_leases("aa:bb:cc:dd:ee:01").is_err());
        assert!(parse_static_leases("aa:bb:cc:dd:ee:01,10.0.0.5,host,extra").is_err());
    }

    #[test]
    fn test_static_lease_bad_mac_fatal() {
        assert!(parse_static_leases("not-a-mac,10.0.0.5").is_err());
    }

    #[test]
    fn test_static_lease_bad_ip_fatal() {
        assert!(parse_static_leases("aa:bb:cc:dd:ee:01,10.0.0.999").is_err());
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = Config {
            static_leases_file: Some("static-leases.txt".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let restored: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.server_ip, config.server_ip);
        assert_eq!(restored.lease_ttl, config.lease_ttl);
        assert_eq!(restored.bind_port, config.bind_port);
        assert_eq!(restored.static_leases_file, config.static_leases_file);
    }
}
