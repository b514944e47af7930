//! RIP daemon: enabled networks per VRF with their costs
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use ipnetwork::IpNetwork;
use log::{debug, info};

use crate::command::{apply_fn, handler, ApplyFn, CommandKind, CommandTree, InstallError, Privilege};
use crate::commit::{ApplyError, CommitAction, Direction};
use crate::dispatch::DispatchError;
use crate::display::OutputTable;
use crate::helpers::config_handler;

pub const DEFAULT_COST: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
struct RipNetwork {
    cost: u8,
    added_at: DateTime<Utc>,
}

/// One network as shown by `show rip networks`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRow {
    pub vrf: String,
    pub network: IpNetwork,
    pub cost: u8,
    pub added_at: DateTime<Utc>,
}

/// Committed RIP configuration
#[derive(Debug, Default)]
pub struct RipState {
    enabled: bool,
    networks: BTreeMap<(String, IpNetwork), RipNetwork>,
}

pub type SharedRipState = Arc<Mutex<RipState>>;

impl RipState {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn cost(&self, vrf: &str, network: IpNetwork) -> Option<u8> {
        self.networks
            .get(&(vrf.to_string(), network))
            .map(|n| n.cost)
    }

    pub fn rows(&self) -> Vec<NetworkRow> {
        self.networks
            .iter()
            .map(|((vrf, network), rip)| NetworkRow {
                vrf: vrf.clone(),
                network: *network,
                cost: rip.cost,
                added_at: rip.added_at,
            })
            .collect()
    }
}

fn with_state<T, F>(state: &SharedRipState, f: F) -> Result<T, ApplyError>
where
    F: FnOnce(&mut RipState) -> T,
{
    let mut guard = state
        .lock()
        .map_err(|_| ApplyError::new("RIP state unavailable".to_string()))?;
    Ok(f(&mut guard))
}

/// VRF and network named by `router rip [vrf {VRFNAME}] network {NETWORK} ...`
fn network_key(action: &CommitAction) -> Result<(String, IpNetwork), ApplyError> {
    let tokens = action.tokens();
    let (vrf, network) = match tokens.get(2) {
        Some(&"vrf") => (tokens.get(3).copied(), tokens.get(5).copied()),
        _ => (Some(""), tokens.get(3).copied()),
    };
    match (vrf, network) {
        (Some(vrf), Some(network)) => {
            let network = network
                .parse()
                .map_err(|err| ApplyError::new(format!("bad network [{}]: {}", action.line, err)))?;
            Ok((vrf.to_string(), network))
        }
        _ => Err(ApplyError::new(format!("no network in [{}]", action.line))),
    }
}

// router rip
fn router_apply(state: &SharedRipState) -> ApplyFn {
    let state = Arc::clone(state);
    apply_fn(move |action: &CommitAction| {
        with_state(&state, |rip| {
            rip.enabled = action.direction == Direction::Apply;
            info!("RIP routing {}", if rip.enabled { "enabled" } else { "disabled" });
        })
    })
}

// router rip [vrf {VRFNAME}] network {NETWORK}
fn network_apply(state: &SharedRipState) -> ApplyFn {
    let state = Arc::clone(state);
    apply_fn(move |action: &CommitAction| {
        let key = network_key(action)?;
        with_state(&state, |rip| match action.direction {
            Direction::Apply => {
                rip.networks.entry(key).or_insert_with(|| RipNetwork {
                    cost: DEFAULT_COST,
                    added_at: Utc::now(),
                });
            }
            Direction::Remove => {
                if rip.networks.remove(&key).is_some() {
                    debug!("RIP network {} removed from vrf [{}]", key.1, key.0);
                }
            }
        })
    })
}

// router rip [vrf {VRFNAME}] network {NETWORK} cost (RIPMETRIC)
fn cost_apply(state: &SharedRipState) -> ApplyFn {
    let state = Arc::clone(state);
    apply_fn(move |action: &CommitAction| {
        let key = network_key(action)?;
        let cost: u8 = action
            .value()
            .parse()
            .map_err(|err| ApplyError::new(format!("bad cost [{}]: {}", action.line, err)))?;
        with_state(&state, |rip| match action.direction {
            Direction::Apply => {
                rip.networks
                    .entry(key)
                    .or_insert_with(|| RipNetwork {
                        cost,
                        added_at: Utc::now(),
                    })
                    .cost = cost;
            }
            Direction::Remove => {
                if let Some(network) = rip.networks.get_mut(&key) {
                    if network.cost == cost {
                        network.cost = DEFAULT_COST;
                    }
                }
            }
        })
    })
}

pub fn install(tree: &mut CommandTree) -> Result<SharedRipState, InstallError> {
    let state = SharedRipState::default();
    let conf = Privilege::Config;

    tree.install(
        CommandKind::Config,
        "router rip",
        conf,
        config_handler(),
        Some(router_apply(&state)),
        "Enable RIP routing",
    )?;
    for prefix in &["router rip", "router rip vrf {VRFNAME}"] {
        tree.install(
            CommandKind::Config,
            &format!("{} network {{NETWORK}}", prefix),
            conf,
            config_handler(),
            Some(network_apply(&state)),
            "Enable RIP on network",
        )?;
        tree.install(
            CommandKind::Config,
            &format!("{} network {{NETWORK}} cost (RIPMETRIC)", prefix),
            conf,
            config_handler(),
            Some(cost_apply(&state)),
            "RIP cost for network",
        )?;
        tree.describe(&format!("{} network", prefix), "Specify network")?;
        tree.describe(&format!("{} network {{NETWORK}} cost", prefix), "Specify cost")?;
    }

    let shown = Arc::clone(&state);
    tree.install(
        CommandKind::Plain,
        "show rip networks",
        Privilege::Exec,
        handler(move |_, _, _, session| {
            let (enabled, lines) = {
                let rip = shown
                    .lock()
                    .map_err(|_| DispatchError::Failed("RIP state unavailable".to_string()))?;
                let mut table = OutputTable::new();
                for row in rip.rows() {
                    table.add_row(&row);
                }
                (rip.is_enabled(), table.lines())
            };
            session.sendln(&format!(
                "RIP routing: {}",
                if enabled { "enabled" } else { "disabled" }
            ));
            for line in lines {
                session.sendln(&line);
            }
            Ok(())
        }),
        None,
        "Show RIP networks",
    )?;

    tree.describe("router", "Configure routing")?;
    tree.describe("router rip vrf", "Specify VRF")?;
    tree.describe("router rip vrf {VRFNAME}", "VRF name")?;
    tree.describe("show rip", "Show RIP information")?;
    info!("RIP commands installed");
    Ok(state)
}
