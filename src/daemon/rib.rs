//! RIB daemon: interface settings pushed to the dataplane
use std::sync::Arc;

use ipnetwork::IpNetwork;
use log::info;

use crate::command::{apply_fn, handler, ApplyFn, CommandKind, CommandTree, InstallError, Privilege};
use crate::commit::{ApplyError, CommitAction, Direction};
use crate::dispatch::DispatchError;
use crate::display::OutputTable;
use crate::fwd::{DataplaneError, SharedDataplane};
use crate::helpers::{config_handler, multi_value_handler, noop_apply};

use super::with_dataplane;

/// One interface as shown by `show interface`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceRow {
    pub name: String,
    pub vrf: String,
    pub addresses: Vec<IpNetwork>,
}

/// One address as shown by `show ip address`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRow {
    pub interface: String,
    pub address: IpNetwork,
    pub vrf: String,
}

fn interface_rows(dataplane: &SharedDataplane) -> Result<Vec<InterfaceRow>, DispatchError> {
    let dataplane = dataplane
        .lock()
        .map_err(|_| DispatchError::Failed(DataplaneError::Unavailable.to_string()))?;
    let (names, vrfs) = dataplane.interfaces();
    let mut rows = Vec::with_capacity(names.len());
    for (name, vrf) in names.into_iter().zip(vrfs) {
        let addresses = dataplane
            .interface_address_get(&name)
            .map_err(|err| DispatchError::Failed(err.to_string()))?;
        rows.push(InterfaceRow {
            name,
            vrf,
            addresses,
        });
    }
    Ok(rows)
}

// second token of `interface {IFNAME} ...`
fn interface_name(action: &CommitAction) -> Result<String, ApplyError> {
    action
        .tokens()
        .get(1)
        .map(|name| name.to_string())
        .ok_or_else(|| ApplyError::new(format!("no interface name in [{}]", action.line)))
}

// interface {IFNAME} ipv4|ipv6 address {ADDR}
fn address_apply(dataplane: &SharedDataplane) -> ApplyFn {
    let dataplane = Arc::clone(dataplane);
    apply_fn(move |action: &CommitAction| {
        let ifname = interface_name(action)?;
        let addr: IpNetwork = action
            .value()
            .parse()
            .map_err(|err| ApplyError::new(format!("bad address [{}]: {}", action.line, err)))?;
        with_dataplane(&dataplane, |dp| match action.direction {
            Direction::Apply => dp.interface_address_add(&ifname, addr),
            Direction::Remove => dp.interface_address_del(&ifname, addr),
        })
    })
}

// interface {IFNAME} vrf (VRFNAME)
fn vrf_apply(dataplane: &SharedDataplane) -> ApplyFn {
    let dataplane = Arc::clone(dataplane);
    apply_fn(move |action: &CommitAction| {
        let ifname = interface_name(action)?;
        let vrf = action.value();
        with_dataplane(&dataplane, |dp| match action.direction {
            Direction::Apply => dp.interface_vrf_set(&ifname, &vrf),
            Direction::Remove => {
                // only leave the vrf this line put the interface in
                if dp.interface_vrf(&ifname)? == vrf {
                    dp.interface_vrf_set(&ifname, "")
                } else {
                    Ok(())
                }
            }
        })
    })
}

pub fn install(tree: &mut CommandTree, dataplane: &SharedDataplane) -> Result<(), InstallError> {
    use CommandKind::{Config, Plain};
    let conf = Privilege::Config;

    tree.install(
        Config,
        "interface {IFNAME} description {ANY}",
        conf,
        config_handler(),
        Some(noop_apply()),
        "Interface description",
    )?;
    tree.install(
        Config,
        "interface {IFNAME} ipv4 address {IFADDR}",
        conf,
        multi_value_handler(),
        Some(address_apply(dataplane)),
        "Assign IPv4 address to interface",
    )?;
    tree.install(
        Config,
        "interface {IFNAME} ipv6 address {IFADDR6}",
        conf,
        multi_value_handler(),
        Some(address_apply(dataplane)),
        "Assign IPv6 address to interface",
    )?;
    tree.install(
        Config,
        "interface {IFNAME} shutdown",
        conf,
        config_handler(),
        Some(noop_apply()),
        "Disable interface",
    )?;
    tree.install(
        Config,
        "interface {IFNAME} vrf (VRFNAME)",
        conf,
        config_handler(),
        Some(vrf_apply(dataplane)),
        "Assign VRF to interface",
    )?;
    tree.install(Config, "ip routing", conf, config_handler(), Some(noop_apply()), "Enable IP routing")?;
    tree.install(
        Config,
        "vrf {VRFNAME} ipv4 import route-target {RT}",
        conf,
        multi_value_handler(),
        Some(noop_apply()),
        "Route-target to import",
    )?;
    tree.install(
        Config,
        "vrf {VRFNAME} ipv4 export route-target {RT}",
        conf,
        multi_value_handler(),
        Some(noop_apply()),
        "Route-target to export",
    )?;

    let dp = Arc::clone(dataplane);
    tree.install(
        Plain,
        "show interface",
        Privilege::Exec,
        handler(move |_, _, _, session| {
            let mut table = OutputTable::new();
            for row in interface_rows(&dp)? {
                table.add_row(&row);
            }
            for line in table.lines() {
                session.sendln(&line);
            }
            Ok(())
        }),
        None,
        "Show interfaces",
    )?;
    let dp = Arc::clone(dataplane);
    tree.install(
        Plain,
        "show ip address",
        Privilege::Exec,
        handler(move |_, _, _, session| {
            let mut table = OutputTable::new();
            for iface in interface_rows(&dp)? {
                for address in &iface.addresses {
                    table.add_row(&AddressRow {
                        interface: iface.name.clone(),
                        address: *address,
                        vrf: iface.vrf.clone(),
                    });
                }
            }
            for line in table.lines() {
                session.sendln(&line);
            }
            Ok(())
        }),
        None,
        "Show addresses",
    )?;

    tree.describe("interface", "Configure interface")?;
    tree.describe("interface {IFNAME}", "Interface name")?;
    tree.describe("interface {IFNAME} description", "Interface description")?;
    tree.describe("interface {IFNAME} ipv4", "IPv4 settings")?;
    tree.describe("interface {IFNAME} ipv4 address", "Assign IPv4 address")?;
    tree.describe("interface {IFNAME} ipv6", "IPv6 settings")?;
    tree.describe("interface {IFNAME} ipv6 address", "Assign IPv6 address")?;
    tree.describe("interface {IFNAME} vrf", "Assign VRF")?;
    tree.describe("ip", "Configure IP")?;
    tree.describe("vrf", "Configure VRF")?;
    tree.describe("vrf {VRFNAME}", "VRF name")?;
    tree.describe("vrf {VRFNAME} ipv4", "VRF IPv4 settings")?;
    tree.describe("vrf {VRFNAME} ipv4 import", "Import settings")?;
    tree.describe("vrf {VRFNAME} ipv4 import route-target", "Route-targets to import")?;
    tree.describe("vrf {VRFNAME} ipv4 export", "Export settings")?;
    tree.describe("vrf {VRFNAME} ipv4 export route-target", "Route-targets to export")?;
    tree.describe("show ip", "Show IP information")?;
    info!("RIB commands installed");
    Ok(())
}
