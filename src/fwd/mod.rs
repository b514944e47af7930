//! Forwarding plane abstraction
//!
//! Apply callbacks push interface settings through [`Dataplane`]. The
//! in-memory engine keeps an interface table and enforces address
//! uniqueness inside each VRF.
use std::collections::BTreeMap;
use std::error;
use std::fmt;
use std::sync::{Arc, Mutex};

use ipnetwork::IpNetwork;
use log::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataplaneError {
    /// [interface]
    UnknownInterface(String),
    /// Address overlaps one already assigned in the same VRF. [address, interface, vrf]
    Conflict(IpNetwork, String, String),
    /// Handle poisoned by a panicking holder
    Unavailable,
}

impl fmt::Display for DataplaneError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use DataplaneError::*;
        match self {
            UnknownInterface(i) => write!(f, "unknown interface {}", i),
            Conflict(a, i, v) => write!(
                f,
                "address {} conflicts with {} in vrf '{}'",
                a,
                i,
                vrf_label(v)
            ),
            Unavailable => write!(f, "dataplane unavailable"),
        }
    }
}

impl error::Error for DataplaneError {}

/// Interface and address operations the control plane relies on.
/// The empty string names the default VRF.
pub trait Dataplane: Send {
    /// (interface names, vrf of each interface)
    fn interfaces(&self) -> (Vec<String>, Vec<String>);
    fn interface_vrf(&self, ifname: &str) -> Result<String, DataplaneError>;
    fn interface_vrf_set(&mut self, ifname: &str, vrf: &str) -> Result<(), DataplaneError>;
    fn interface_address_add(&mut self, ifname: &str, addr: IpNetwork) -> Result<(), DataplaneError>;
    /// Removing an absent address succeeds
    fn interface_address_del(&mut self, ifname: &str, addr: IpNetwork) -> Result<(), DataplaneError>;
    fn interface_address_get(&self, ifname: &str) -> Result<Vec<IpNetwork>, DataplaneError>;
}

pub type SharedDataplane = Arc<Mutex<dyn Dataplane>>;

fn vrf_label(vrf: &str) -> &str {
    if vrf.is_empty() {
        "default"
    } else {
        vrf
    }
}

fn overlaps(a: &IpNetwork, b: &IpNetwork) -> bool {
    match (a, b) {
        (IpNetwork::V4(_), IpNetwork::V4(_)) | (IpNetwork::V6(_), IpNetwork::V6(_)) => {
            a.contains(b.network()) || b.contains(a.network())
        }
        _ => false,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Interface {
    vrf: String,
    addresses: Vec<IpNetwork>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryDataplane {
    interfaces: BTreeMap<String, Interface>,
}

impl MemoryDataplane {
    /// eth0-eth2 in the default VRF, eth3-eth4 in VRF1, eth5 in VRF2
    pub fn new() -> Self {
        Self::with_interfaces(&[
            ("eth0", ""),
            ("eth1", ""),
            ("eth2", ""),
            ("eth3", "VRF1"),
            ("eth4", "VRF1"),
            ("eth5", "VRF2"),
        ])
    }

    pub fn with_interfaces(interfaces: &[(&str, &str)]) -> Self {
        let interfaces = interfaces
            .iter()
            .map(|(name, vrf)| {
                let iface = Interface {
                    vrf: vrf.to_string(),
                    addresses: vec![],
                };
                (name.to_string(), iface)
            })
            .collect();
        Self { interfaces }
    }

    pub fn shared(self) -> SharedDataplane {
        Arc::new(Mutex::new(self))
    }

    fn get(&self, ifname: &str) -> Result<&Interface, DataplaneError> {
        self.interfaces
            .get(ifname)
            .ok_or_else(|| DataplaneError::UnknownInterface(ifname.to_string()))
    }

    // First address in `vrf` overlapping `addr`, ignoring interface `skip`
    fn conflict(&self, vrf: &str, addr: &IpNetwork, skip: &str) -> Option<(String, IpNetwork)> {
        self.interfaces
            .iter()
            .filter(|(name, iface)| iface.vrf == vrf && name.as_str() != skip)
            .flat_map(|(name, iface)| iface.addresses.iter().map(move |a| (name, a)))
            .find(|(_, existing)| overlaps(existing, addr))
            .map(|(name, existing)| (name.clone(), *existing))
    }
}

impl Dataplane for MemoryDataplane {
    fn interfaces(&self) -> (Vec<String>, Vec<String>) {
        self.interfaces
            .iter()
            .map(|(name, iface)| (name.clone(), iface.vrf.clone()))
            .unzip()
    }

    fn interface_vrf(&self, ifname: &str) -> Result<String, DataplaneError> {
        Ok(self.get(ifname)?.vrf.clone())
    }

    fn interface_vrf_set(&mut self, ifname: &str, vrf: &str) -> Result<(), DataplaneError> {
        for addr in &self.get(ifname)?.addresses {
            if let Some((other, _)) = self.conflict(vrf, addr, ifname) {
                return Err(DataplaneError::Conflict(*addr, other, vrf.to_string()));
            }
        }
        if let Some(iface) = self.interfaces.get_mut(ifname) {
            info!("Interface {} moved to vrf '{}'", ifname, vrf_label(vrf));
            iface.vrf = vrf.to_string();
        }
        Ok(())
    }

    fn interface_address_add(&mut self, ifname: &str, addr: IpNetwork) -> Result<(), DataplaneError> {
        let iface = self.get(ifname)?;
        if iface.addresses.contains(&addr) {
            return Ok(());
        }
        let vrf = iface.vrf.clone();
        let own = iface.addresses.iter().find(|a| overlaps(a, &addr));
        if let Some(existing) = own {
            return Err(DataplaneError::Conflict(*existing, ifname.to_string(), vrf));
        }
        if let Some((other, _)) = self.conflict(&vrf, &addr, ifname) {
            return Err(DataplaneError::Conflict(addr, other, vrf));
        }
        if let Some(iface) = self.interfaces.get_mut(ifname) {
            iface.addresses.push(addr);
        }
        debug!("Address {} added to {}", addr, ifname);
        Ok(())
    }

    fn interface_address_del(&mut self, ifname: &str, addr: IpNetwork) -> Result<(), DataplaneError> {
        self.get(ifname)?;
        if let Some(iface) = self.interfaces.get_mut(ifname) {
            iface.addresses.retain(|a| *a != addr);
        }
        debug!("Address {} removed from {}", addr, ifname);
        Ok(())
    }

    fn interface_address_get(&self, ifname: &str) -> Result<Vec<IpNetwork>, DataplaneError> {
        Ok(self.get(ifname)?.addresses.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> IpNetwork {
        s.parse().unwrap()
    }

    #[test]
    fn test_interfaces() {
        let dp = MemoryDataplane::new();
        let (names, vrfs) = dp.interfaces();
        assert_eq!(names, vec!["eth0", "eth1", "eth2", "eth3", "eth4", "eth5"]);
        assert_eq!(vrfs, vec!["", "", "", "VRF1", "VRF1", "VRF2"]);
        assert_eq!(dp.interface_vrf("eth5").unwrap(), "VRF2");
        assert!(dp.interface_vrf("eth9").is_err());
    }

    #[test]
    fn test_address_conflicts_per_vrf() {
        let mut dp = MemoryDataplane::new();
        dp.interface_address_add("eth0", net("10.0.0.1/24")).unwrap();
        // same address again is a no-op
        dp.interface_address_add("eth0", net("10.0.0.1/24")).unwrap();
        assert!(matches!(
            dp.interface_address_add("eth1", net("10.0.0.2/24")),
            Err(DataplaneError::Conflict(..))
        ));
        assert!(matches!(
            dp.interface_address_add("eth1", net("10.0.0.0/16")),
            Err(DataplaneError::Conflict(..))
        ));
        // other vrf, other family
        dp.interface_address_add("eth3", net("10.0.0.2/24")).unwrap();
        dp.interface_address_add("eth1", net("2001:db8::1/64")).unwrap();
        assert_eq!(dp.interface_address_get("eth0").unwrap(), vec![net("10.0.0.1/24")]);
    }

    #[test]
    fn test_address_del_is_idempotent() {
        let mut dp = MemoryDataplane::new();
        dp.interface_address_add("eth2", net("192.168.1.1/24")).unwrap();
        dp.interface_address_del("eth2", net("192.168.1.1/24")).unwrap();
        dp.interface_address_del("eth2", net("192.168.1.1/24")).unwrap();
        assert!(dp.interface_address_get("eth2").unwrap().is_empty());
        assert!(dp.interface_address_del("eth9", net("192.168.1.1/24")).is_err());
    }

    #[test]
    fn test_vrf_move_checks_conflicts() {
        let mut dp = MemoryDataplane::new();
        dp.interface_address_add("eth0", net("10.1.0.1/24")).unwrap();
        dp.interface_address_add("eth3", net("10.1.0.2/24")).unwrap();
        assert!(dp.interface_vrf_set("eth0", "VRF1").is_err());
        assert_eq!(dp.interface_vrf("eth0").unwrap(), "");
        dp.interface_vrf_set("eth0", "VRF2").unwrap();
        assert_eq!(dp.interface_vrf("eth0").unwrap(), "VRF2");
        // moving to its own vrf never conflicts with itself
        dp.interface_vrf_set("eth0", "VRF2").unwrap();
    }
}
