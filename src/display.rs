use std::marker::PhantomData;

use itertools::Itertools;
use prettytable::{cell, format, row, Row, Table};

use crate::daemon::bgp::NeighborRow;
use crate::daemon::rib::{AddressRow, InterfaceRow};
use crate::daemon::rip::NetworkRow;
use crate::dispatch::HistoryEntry;
use crate::utils::{format_time_as_elapsed, maybe_string, u32_to_dotted, EMPTY_VALUE};

pub trait ToRow {
    fn columns() -> Row;
    fn to_row(&self) -> Row;
}

pub struct OutputTable<T: ToRow> {
    inner: Table,
    row_type: PhantomData<T>,
}

impl<T> OutputTable<T>
where
    T: ToRow,
{
    pub fn new() -> Self {
        let format = format::FormatBuilder::new()
            .padding(1, 1)
            .separator(
                format::LinePosition::Title,
                format::LineSeparator::new('-', '+', '+', '+'),
            )
            .build();
        Self::with_format(format)
    }

    pub fn with_format(format: format::TableFormat) -> Self {
        let mut table = Table::new();
        table.set_format(format);
        table.set_titles(T::columns());
        Self {
            inner: table,
            row_type: PhantomData,
        }
    }

    pub fn add_row(&mut self, row: &T) {
        self.inner.add_row(row.to_row());
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Rendered table, one entry per output line (sessions are line oriented)
    pub fn lines(&self) -> Vec<String> {
        self.inner
            .to_string()
            .lines()
            .map(|line| line.trim_end().to_string())
            .collect()
    }
}

impl ToRow for (usize, &HistoryEntry) {
    fn columns() -> Row {
        row!["#", "Age", "Command"]
    }

    fn to_row(&self) -> Row {
        let (index, entry) = self;
        row![index.to_string(), format_time_as_elapsed(entry.at), entry.line]
    }
}

fn vrf_label(vrf: &str) -> &str {
    if vrf.is_empty() {
        "default"
    } else {
        vrf
    }
}

impl ToRow for InterfaceRow {
    fn columns() -> Row {
        row!["Interface", "VRF", "Addresses"]
    }

    fn to_row(&self) -> Row {
        let addresses = if self.addresses.is_empty() {
            String::from(EMPTY_VALUE)
        } else {
            self.addresses.iter().join(", ")
        };
        row![self.name, vrf_label(&self.vrf), addresses]
    }
}

impl ToRow for AddressRow {
    fn columns() -> Row {
        row!["Interface", "Address", "VRF"]
    }

    fn to_row(&self) -> Row {
        row![self.interface, self.address, vrf_label(&self.vrf)]
    }
}

impl ToRow for NeighborRow {
    fn columns() -> Row {
        row!["Neighbor", "AS", "Local AS", "Description", "Configured"]
    }

    fn to_row(&self) -> Row {
        row![
            self.address,
            maybe_string(self.remote_as.map(|asn| u32_to_dotted(asn, '.')).as_ref()),
            u32_to_dotted(self.local_as, '.'),
            maybe_string(self.description.as_ref()),
            format_time_as_elapsed(self.configured_at),
        ]
    }
}

impl ToRow for NetworkRow {
    fn columns() -> Row {
        row!["VRF", "Network", "Cost", "Age"]
    }

    fn to_row(&self) -> Row {
        row![
            vrf_label(&self.vrf),
            self.network,
            self.cost,
            format_time_as_elapsed(self.added_at),
        ]
    }
}
