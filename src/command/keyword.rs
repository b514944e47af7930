use std::collections::HashMap;
use std::error;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use ipnetwork::{IpNetwork, Ipv4Network, Ipv6Network};
use log::trace;

use crate::utils::asn_from_dotted;

/// Acceptance predicate for a placeholder value, `Err` carries the rejection reason
pub type Predicate = Box<dyn Fn(&str) -> Result<(), String> + Send + Sync>;

/// Lists known interfaces as (names, vrf assignments)
pub type Lister = Arc<dyn Fn() -> (Vec<String>, Vec<String>) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeywordError {
    /// A predicate is already registered for this keyword. [keyword]
    Duplicate(String),
    /// Value was not accepted by the keyword predicate. [keyword, value, reason]
    Rejected(String, String, String),
}

impl fmt::Display for KeywordError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use KeywordError::*;
        match self {
            Duplicate(k) => write!(f, "keyword {} is already registered", k),
            Rejected(k, v, r) => write!(f, "'{}' is not a valid {}: {}", v, k, r),
        }
    }
}

impl error::Error for KeywordError {}

/// Maps placeholder names (the `X` in `{X}` or `(X)`) to acceptance predicates
///
/// Each grammar tree owns its registry, so daemons sharing the engine
/// never see each other's keywords.
pub struct KeywordRegistry {
    table: HashMap<String, Predicate>,
}

impl KeywordRegistry {
    /// Registry preloaded with the built-in keywords.
    /// `IFNAME` is checked against `lister`.
    pub fn new(lister: Lister) -> Self {
        let mut registry = Self {
            table: HashMap::new(),
        };
        registry.insert("ANY", |_| Err("wildcard is not a value".to_string()));
        registry.insert("IFNAME", move |value| {
            let (names, _vrfs) = lister();
            if names.iter().any(|n| n == value) {
                Ok(())
            } else {
                Err("interface not found".to_string())
            }
        });
        registry.insert("IFADDR", |value| {
            cidr(value)?
                .parse::<Ipv4Network>()
                .map(|_| ())
                .map_err(|err| err.to_string())
        });
        registry.insert("IFADDR6", |value| {
            cidr(value)?
                .parse::<Ipv6Network>()
                .map(|_| ())
                .map_err(|err| err.to_string())
        });
        registry.insert("IPADDR", |value| {
            value
                .parse::<IpAddr>()
                .map(|_| ())
                .map_err(|err| err.to_string())
        });
        registry.insert("NETWORK", |value| {
            let network = cidr(value)?
                .parse::<IpNetwork>()
                .map_err(|err| err.to_string())?;
            if network.ip() != network.network() {
                return Err(format!("host bits set, expected {}", network.network()));
            }
            Ok(())
        });
        registry.insert("ASN", |value| {
            asn_from_dotted(value)
                .map(|_| ())
                .map_err(|err| err.to_string())
        });
        registry.insert("RIPMETRIC", |value| match value.parse::<u8>() {
            Ok(metric) if (1..=15).contains(&metric) => Ok(()),
            _ => Err("expected metric 1-15".to_string()),
        });
        registry.insert("COMMITID", |value| {
            if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
                Ok(())
            } else {
                Err("expected numeric commit id".to_string())
            }
        });
        for free in &["HOSTNAME", "TEXT", "VRFNAME", "RT", "USERNAME", "PASSWORD"] {
            registry.insert(free, |_| Ok(()));
        }
        registry
    }

    fn insert<F>(&mut self, name: &str, predicate: F)
    where
        F: Fn(&str) -> Result<(), String> + Send + Sync + 'static,
    {
        self.table.insert(name.to_string(), Box::new(predicate));
    }

    pub fn register<F>(&mut self, name: &str, predicate: F) -> Result<(), KeywordError>
    where
        F: Fn(&str) -> Result<(), String> + Send + Sync + 'static,
    {
        if self.table.contains_key(name) {
            return Err(KeywordError::Duplicate(name.to_string()));
        }
        self.insert(name, predicate);
        Ok(())
    }

    /// Check `value` against the predicate for `name`.
    /// Unregistered keywords accept anything.
    pub fn validate(&self, name: &str, value: &str) -> Result<(), KeywordError> {
        match self.table.get(name) {
            Some(predicate) => predicate(value).map_err(|reason| {
                KeywordError::Rejected(name.to_string(), value.to_string(), reason)
            }),
            None => {
                trace!("No predicate for keyword {}, accepting '{}'", name, value);
                Ok(())
            }
        }
    }
}

impl fmt::Debug for KeywordRegistry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut names: Vec<_> = self.table.keys().collect();
        names.sort();
        f.debug_struct("KeywordRegistry").field("keywords", &names).finish()
    }
}

fn cidr(value: &str) -> Result<&str, String> {
    if value.contains('/') {
        Ok(value)
    } else {
        Err("missing prefix length".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> KeywordRegistry {
        KeywordRegistry::new(Arc::new(|| {
            (
                vec!["eth0".to_string(), "eth1".to_string()],
                vec![String::new(), "VRF1".to_string()],
            )
        }))
    }

    #[test]
    fn test_any_rejects() {
        let registry = registry();
        assert!(registry.validate("ANY", "anything").is_err());
    }

    #[test]
    fn test_ifname_uses_lister() {
        let registry = registry();
        assert!(registry.validate("IFNAME", "eth1").is_ok());
        assert!(matches!(
            registry.validate("IFNAME", "eth9"),
            Err(KeywordError::Rejected(_, _, _))
        ));
    }

    #[test]
    fn test_addresses() {
        let registry = registry();
        assert!(registry.validate("IFADDR", "1.1.1.1/24").is_ok());
        assert!(registry.validate("IFADDR", "1.1.1.1").is_err());
        assert!(registry.validate("IFADDR", "2001:db8::1/64").is_err());
        assert!(registry.validate("IFADDR6", "2001:db8::1/64").is_ok());
        assert!(registry.validate("IPADDR", "10.0.0.1").is_ok());
        assert!(registry.validate("IPADDR", "10.0.0.300").is_err());
        assert!(registry.validate("NETWORK", "10.0.0.0/8").is_ok());
        assert!(registry.validate("NETWORK", "10.0.0.1/8").is_err());
    }

    #[test]
    fn test_numeric_keywords() {
        let registry = registry();
        assert!(registry.validate("ASN", "65000").is_ok());
        assert!(registry.validate("ASN", "65000.100").is_ok());
        assert!(registry.validate("ASN", "bgp").is_err());
        assert!(registry.validate("RIPMETRIC", "15").is_ok());
        assert!(registry.validate("RIPMETRIC", "0").is_err());
        assert!(registry.validate("RIPMETRIC", "16").is_err());
        assert!(registry.validate("COMMITID", "42").is_ok());
        assert!(registry.validate("COMMITID", "4a").is_err());
    }

    #[test]
    fn test_register() {
        let mut registry = registry();
        assert!(registry.validate("COLOR", "blue").is_ok());
        registry
            .register("COLOR", |v| match v {
                "red" | "green" => Ok(()),
                _ => Err("unknown color".to_string()),
            })
            .unwrap();
        assert!(registry.validate("COLOR", "blue").is_err());
        assert_eq!(
            registry.register("COLOR", |_| Ok(())),
            Err(KeywordError::Duplicate("COLOR".to_string()))
        );
    }
}
