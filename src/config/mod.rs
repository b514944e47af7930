mod file;

pub use file::InterfaceSpec;

use std::io::Result;
use std::net::SocketAddr;

use crate::daemon::DaemonKind;
use crate::fwd::{MemoryDataplane, SharedDataplane};

/// Parse a TOML config file and return the settings of daemon `kind`
pub fn from_file(path: &str, kind: DaemonKind) -> Result<DaemonConfig> {
    let spec = file::DaemonConfigSpec::from_file(path)?;
    Ok(DaemonConfig::from_spec(spec, kind))
}

/// In-memory daemon settings
///   Missing DaemonConfigSpec items are defaulted per daemon kind
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub listen: SocketAddr,
    pub config_path_prefix: String,
    pub max_config_files: usize,
    pub interfaces: Vec<InterfaceSpec>,
}

fn default_prefix(kind: DaemonKind) -> String {
    format!("/etc/routerd/{}.conf.", kind)
}

impl DaemonConfig {
    fn from_spec(spec: file::DaemonConfigSpec, kind: DaemonKind) -> Self {
        Self {
            listen: SocketAddr::new(
                spec.listen_addr,
                spec.listen_port.unwrap_or_else(|| kind.default_port()),
            ),
            config_path_prefix: spec
                .config_path_prefix
                .unwrap_or_else(|| default_prefix(kind)),
            max_config_files: spec.max_config_files,
            interfaces: spec.interfaces,
        }
    }

    /// Settings used when no config file is given
    pub fn default_for(kind: DaemonKind) -> Self {
        // empty document, every field takes its default
        match file::DaemonConfigSpec::from_toml("") {
            Ok(spec) => Self::from_spec(spec, kind),
            Err(_) => Self {
                listen: SocketAddr::from(([127, 0, 0, 1], kind.default_port())),
                config_path_prefix: default_prefix(kind),
                max_config_files: 10,
                interfaces: vec![],
            },
        }
    }

    /// In-memory dataplane with the configured interfaces,
    /// or the built-in set when none are listed
    pub fn dataplane(&self) -> SharedDataplane {
        if self.interfaces.is_empty() {
            return MemoryDataplane::new().shared();
        }
        let interfaces: Vec<(&str, &str)> = self
            .interfaces
            .iter()
            .map(|i| (i.name.as_str(), i.vrf.as_str()))
            .collect();
        MemoryDataplane::with_interfaces(&interfaces).shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_per_daemon() {
        let rib = DaemonConfig::default_for(DaemonKind::Rib);
        assert_eq!(rib.listen, "127.0.0.1:2001".parse().unwrap());
        assert_eq!(rib.config_path_prefix, "/etc/routerd/rib.conf.");
        let rip = DaemonConfig::default_for(DaemonKind::Rip);
        assert_eq!(rip.listen.port(), 2003);
        assert_eq!(rip.max_config_files, 10);
    }

    #[test]
    fn test_from_spec() {
        let spec = file::DaemonConfigSpec::from_toml(
            r#"
            listen_port = 4002
            [[interfaces]]
            name = "lo"
            "#,
        )
        .unwrap();
        let config = DaemonConfig::from_spec(spec, DaemonKind::Bgp);
        assert_eq!(config.listen, "127.0.0.1:4002".parse().unwrap());
        assert_eq!(config.config_path_prefix, "/etc/routerd/bgp.conf.");
        let (names, vrfs) = config.dataplane().lock().unwrap().interfaces();
        assert_eq!(names, vec!["lo"]);
        assert_eq!(vrfs, vec![""]);
    }
}
