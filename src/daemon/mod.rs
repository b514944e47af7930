//! Daemon command sets
//!
//! Every daemon shares the engine and the common commands, and adds its own
//! grammar with apply callbacks bound to its collaborators at install time.
pub mod bgp;
pub mod rib;
pub mod rip;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use log::{debug, warn};

use crate::command::{CommandTree, InstallError, KeywordRegistry, Lister};
use crate::commit::ApplyError;
use crate::fwd::{Dataplane, DataplaneError, SharedDataplane};
use crate::helpers::{install_common, install_hostname};
use crate::utils::ParseError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DaemonKind {
    Rib,
    Bgp,
    Rip,
}

impl DaemonKind {
    pub fn name(&self) -> &'static str {
        match self {
            DaemonKind::Rib => "rib",
            DaemonKind::Bgp => "bgp",
            DaemonKind::Rip => "rip",
        }
    }

    /// Command port of each daemon
    pub fn default_port(&self) -> u16 {
        match self {
            DaemonKind::Rib => 2001,
            DaemonKind::Bgp => 2002,
            DaemonKind::Rip => 2003,
        }
    }
}

impl fmt::Display for DaemonKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for DaemonKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rib" => Ok(DaemonKind::Rib),
            "bgp" => Ok(DaemonKind::Bgp),
            "rip" => Ok(DaemonKind::Rip),
            _ => Err(ParseError::new(format!(
                "Unknown daemon '{}', expected one of: rib, bgp, rip",
                s
            ))),
        }
    }
}

/// Interface names and VRFs for the `IFNAME` keyword
pub fn interface_lister(dataplane: &SharedDataplane) -> Lister {
    let dataplane = Arc::clone(dataplane);
    Arc::new(move || match dataplane.lock() {
        Ok(dataplane) => dataplane.interfaces(),
        Err(_) => {
            warn!("Dataplane lock poisoned, no interfaces listed");
            (vec![], vec![])
        }
    })
}

/// Run `f` against the locked dataplane from an apply callback
pub(crate) fn with_dataplane<T, F>(dataplane: &SharedDataplane, f: F) -> Result<T, ApplyError>
where
    F: FnOnce(&mut dyn Dataplane) -> Result<T, DataplaneError>,
{
    let mut guard = dataplane
        .lock()
        .map_err(|_| ApplyError::new(DataplaneError::Unavailable.to_string()))?;
    f(&mut *guard).map_err(|err| ApplyError::new(err.to_string()))
}

/// Full grammar of a daemon
pub fn build(kind: DaemonKind, dataplane: &SharedDataplane) -> Result<CommandTree, InstallError> {
    let mut tree = CommandTree::new(KeywordRegistry::new(interface_lister(dataplane)));
    install_common(&mut tree)?;
    install_hostname(&mut tree)?;
    match kind {
        DaemonKind::Rib => rib::install(&mut tree, dataplane)?,
        DaemonKind::Bgp => {
            bgp::install(&mut tree)?;
        }
        DaemonKind::Rip => {
            rip::install(&mut tree)?;
        }
    }
    for path in tree.missing_descriptions() {
        debug!("Missing description: [{}]", path);
    }
    Ok(tree)
}
