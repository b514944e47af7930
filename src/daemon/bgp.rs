//! BGP daemon: router instances and their neighbors
//!
//! There is no speaker behind these commands; committed configuration is
//! kept in [`BgpState`] so it can be inspected with `show bgp neighbors`.
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::command::{apply_fn, handler, ApplyFn, CommandKind, CommandTree, InstallError, Privilege};
use crate::commit::{ApplyError, CommitAction, Direction};
use crate::dispatch::DispatchError;
use crate::display::OutputTable;
use crate::helpers::config_handler;
use crate::utils::asn_from_dotted;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Neighbor {
    remote_as: Option<u32>,
    description: Option<String>,
    configured_at: DateTime<Utc>,
}

impl Neighbor {
    fn new() -> Self {
        Self {
            remote_as: None,
            description: None,
            configured_at: Utc::now(),
        }
    }

    fn is_empty(&self) -> bool {
        self.remote_as.is_none() && self.description.is_none()
    }
}

/// One neighbor as shown by `show bgp neighbors`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborRow {
    pub address: IpAddr,
    pub local_as: u32,
    pub remote_as: Option<u32>,
    pub description: Option<String>,
    pub configured_at: DateTime<Utc>,
}

/// Committed BGP configuration, keyed by local AS
#[derive(Debug, Default)]
pub struct BgpState {
    instances: BTreeMap<u32, BTreeMap<IpAddr, Neighbor>>,
}

pub type SharedBgpState = Arc<Mutex<BgpState>>;

impl BgpState {
    pub fn instances(&self) -> Vec<u32> {
        self.instances.keys().copied().collect()
    }

    fn start(&mut self, local_as: u32) {
        if !self.instances.contains_key(&local_as) {
            self.instances.insert(local_as, BTreeMap::new());
            info!("BGP instance AS{} started", local_as);
        }
    }

    fn stop(&mut self, local_as: u32) {
        if let Some(neighbors) = self.instances.remove(&local_as) {
            info!("BGP instance AS{} stopped ({} neighbors)", local_as, neighbors.len());
        }
    }

    fn neighbor_mut(&mut self, local_as: u32, address: IpAddr) -> &mut Neighbor {
        self.instances
            .entry(local_as)
            .or_default()
            .entry(address)
            .or_insert_with(Neighbor::new)
    }

    /// Change an existing neighbor, dropping it once nothing is configured
    fn neighbor_clear<F>(&mut self, local_as: u32, address: IpAddr, clear: F)
    where
        F: FnOnce(&mut Neighbor),
    {
        let neighbors = match self.instances.get_mut(&local_as) {
            Some(neighbors) => neighbors,
            None => return,
        };
        if let Some(neighbor) = neighbors.get_mut(&address) {
            clear(neighbor);
            if neighbor.is_empty() {
                debug!("AS{} neighbor {} removed", local_as, address);
                neighbors.remove(&address);
            }
        }
    }

    pub fn rows(&self) -> Vec<NeighborRow> {
        self.instances
            .iter()
            .flat_map(|(local_as, neighbors)| {
                neighbors.iter().map(move |(address, neighbor)| NeighborRow {
                    address: *address,
                    local_as: *local_as,
                    remote_as: neighbor.remote_as,
                    description: neighbor.description.clone(),
                    configured_at: neighbor.configured_at,
                })
            })
            .collect()
    }
}

fn with_state<T, F>(state: &SharedBgpState, f: F) -> Result<T, ApplyError>
where
    F: FnOnce(&mut BgpState) -> T,
{
    let mut guard = state
        .lock()
        .map_err(|_| ApplyError::new("BGP state unavailable".to_string()))?;
    Ok(f(&mut guard))
}

fn local_as(action: &CommitAction) -> Result<u32, ApplyError> {
    let token = action.tokens().get(2).copied().unwrap_or("");
    asn_from_dotted(token).map_err(|err| ApplyError::new(err.to_string()))
}

fn neighbor_address(action: &CommitAction) -> Result<IpAddr, ApplyError> {
    let token = action.tokens().get(4).copied().unwrap_or("");
    token
        .parse()
        .map_err(|err| ApplyError::new(format!("bad neighbor address '{}': {}", token, err)))
}

// router bgp {ASN}
fn instance_apply(state: &SharedBgpState) -> ApplyFn {
    let state = Arc::clone(state);
    apply_fn(move |action: &CommitAction| {
        let asn = local_as(action)?;
        with_state(&state, |bgp| match action.direction {
            Direction::Apply => bgp.start(asn),
            Direction::Remove => bgp.stop(asn),
        })
    })
}

// router bgp {ASN} neighbor {IPADDR} description {ANY}
fn description_apply(state: &SharedBgpState) -> ApplyFn {
    let state = Arc::clone(state);
    apply_fn(move |action: &CommitAction| {
        let asn = local_as(action)?;
        let address = neighbor_address(action)?;
        let text = action.value().trim().to_string();
        with_state(&state, |bgp| match action.direction {
            Direction::Apply => bgp.neighbor_mut(asn, address).description = Some(text),
            Direction::Remove => bgp.neighbor_clear(asn, address, |n| n.description = None),
        })
    })
}

// router bgp {ASN} neighbor {IPADDR} remote-as (ASN)
fn remote_as_apply(state: &SharedBgpState) -> ApplyFn {
    let state = Arc::clone(state);
    apply_fn(move |action: &CommitAction| {
        let asn = local_as(action)?;
        let address = neighbor_address(action)?;
        let remote = asn_from_dotted(&action.value()).map_err(|err| ApplyError::new(err.to_string()))?;
        with_state(&state, |bgp| match action.direction {
            Direction::Apply => bgp.neighbor_mut(asn, address).remote_as = Some(remote),
            Direction::Remove => bgp.neighbor_clear(asn, address, |n| {
                if n.remote_as == Some(remote) {
                    n.remote_as = None;
                }
            }),
        })
    })
}

pub fn install(tree: &mut CommandTree) -> Result<SharedBgpState, InstallError> {
    let state = SharedBgpState::default();
    let conf = Privilege::Config;

    tree.install(
        CommandKind::Config,
        "router bgp {ASN}",
        conf,
        config_handler(),
        Some(instance_apply(&state)),
        "BGP instance local AS",
    )?;
    tree.install(
        CommandKind::Config,
        "router bgp {ASN} neighbor {IPADDR} description {ANY}",
        conf,
        config_handler(),
        Some(description_apply(&state)),
        "Neighbor description",
    )?;
    tree.install(
        CommandKind::Config,
        "router bgp {ASN} neighbor {IPADDR} remote-as (ASN)",
        conf,
        config_handler(),
        Some(remote_as_apply(&state)),
        "Neighbor AS number",
    )?;

    let shown = Arc::clone(&state);
    tree.install(
        CommandKind::Plain,
        "show bgp neighbors",
        Privilege::Exec,
        handler(move |_, _, _, session| {
            let lines = {
                let bgp = shown
                    .lock()
                    .map_err(|_| DispatchError::Failed("BGP state unavailable".to_string()))?;
                let mut table = OutputTable::new();
                for row in bgp.rows() {
                    table.add_row(&row);
                }
                table.lines()
            };
            for line in lines {
                session.sendln(&line);
            }
            Ok(())
        }),
        None,
        "Show BGP neighbors",
    )?;

    tree.describe("router", "Configure routing")?;
    tree.describe("router bgp", "BGP routing")?;
    tree.describe("router bgp {ASN} neighbor", "Specify a neighbor router")?;
    tree.describe("router bgp {ASN} neighbor {IPADDR}", "Neighbor address")?;
    tree.describe("router bgp {ASN} neighbor {IPADDR} description", "Neighbor description")?;
    tree.describe("router bgp {ASN} neighbor {IPADDR} remote-as", "Specify a BGP neighbor AS")?;
    tree.describe("show bgp", "Show BGP information")?;
    info!("BGP commands installed");
    Ok(state)
}
