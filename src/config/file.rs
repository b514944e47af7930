use std::fs::File;
use std::io::{self, Read};
use std::net::IpAddr;

use serde::Deserialize;

struct Defaults {}

impl Defaults {
    fn listen_addr() -> IpAddr {
        IpAddr::from([127, 0, 0, 1])
    }

    fn max_config_files() -> usize {
        10
    }

    fn vrf() -> String {
        String::new()
    }
}

/// Config (toml) representation of an in-memory dataplane interface
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct InterfaceSpec {
    pub name: String,
    // Empty for the default VRF
    #[serde(default = "Defaults::vrf")]
    pub vrf: String,
}

/// Config (toml) representation of a daemon's settings
#[derive(Debug, Deserialize)]
pub(super) struct DaemonConfigSpec {
    // Address the remote terminal listens on
    #[serde(default = "Defaults::listen_addr")]
    pub(super) listen_addr: IpAddr,
    // Will defer to the daemon's own port if not provided
    pub(super) listen_port: Option<u16>,
    // Snapshot files are named <prefix><N>
    pub(super) config_path_prefix: Option<String>,
    // Oldest snapshots beyond this many are erased, 0 keeps everything
    #[serde(default = "Defaults::max_config_files")]
    pub(super) max_config_files: usize,
    #[serde(default = "Vec::new")]
    pub(super) interfaces: Vec<InterfaceSpec>,
}

impl DaemonConfigSpec {
    pub(super) fn from_file(path: &str) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Self::from_toml(&contents)
    }

    pub(super) fn from_toml(contents: &str) -> io::Result<Self> {
        toml::from_str(contents).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_config() {
        let config = DaemonConfigSpec::from_toml(
            r#"
            listen_addr = "0.0.0.0"
            listen_port = 3001
            config_path_prefix = "/tmp/routerd/rib.conf."
            max_config_files = 5

            [[interfaces]]
            name = "eth0"

            [[interfaces]]
            name = "eth1"
            vrf = "RED"
            "#,
        )
        .unwrap();
        assert_eq!(config.listen_addr, IpAddr::from([0, 0, 0, 0]));
        assert_eq!(config.listen_port, Some(3001));
        assert_eq!(config.max_config_files, 5);
        assert_eq!(config.interfaces.len(), 2);
        assert_eq!(config.interfaces[0].vrf, "");
        assert_eq!(config.interfaces[1].vrf, "RED");
    }

    #[test]
    fn test_defaults() {
        let config = DaemonConfigSpec::from_toml("").unwrap();
        assert_eq!(config.listen_addr, Defaults::listen_addr());
        assert_eq!(config.listen_port, None);
        assert_eq!(config.config_path_prefix, None);
        assert_eq!(config.max_config_files, 10);
        assert!(config.interfaces.is_empty());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "listen_port = 4000").unwrap();
        let path = file.path().to_str().unwrap().to_string();
        assert_eq!(DaemonConfigSpec::from_file(&path).unwrap().listen_port, Some(4000));

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        writeln!(bad, "listen_port = \"x\"").unwrap();
        let path = bad.path().to_str().unwrap().to_string();
        let err = DaemonConfigSpec::from_file(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
