//! Discovers the measurement hierarchy of iterations and grows the
//! column tree from it. `SchemaState` is threaded through a fold over
//! the iterations of one load (see `flatten::load_results`), it is
//! never shared between loads.

use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet},
    fmt::Display,
};

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::EnumString;

use crate::{
    debug,
    ordered_map::OrderedMap,
    raw::RawEndpointEntry,
    tree::{ColumnNode, MetricKind},
};

/// Joins the parts of a metric `data_key`.
pub const DATA_KEY_SEPARATOR: &str = "-";

/// The measurement part of `iteration_data`: type -> network ->
/// index -> entry.
pub type Measurements = OrderedMap<OrderedMap<BTreeMap<String, RawEndpointEntry>>>;

/// The client/server/port triple of an entry at network level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointIdentity<'e> {
    pub client_hostname: &'e str,
    pub server_hostname: &'e str,
    pub server_port: &'e str,
}

impl<'e> EndpointIdentity<'e> {
    pub fn from_entry(entry: &'e RawEndpointEntry) -> Self {
        Self {
            client_hostname: &entry.client_hostname,
            server_hostname: &entry.server_hostname,
            server_port: &entry.server_port,
        }
    }

    /// The port out of a formatted identity: the text after the third
    /// `:`. Hostnames containing `:` make this ambiguous.
    pub fn port_of(identity: &str) -> Option<&str> {
        identity.splitn(4, ':').nth(3)
    }
}

impl<'e> Display for EndpointIdentity<'e> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Self {
            client_hostname,
            server_hostname,
            server_port,
        } = self;
        write!(
            f,
            "client_hostname:{client_hostname}-server_hostname:{server_hostname}-server_port:{server_port}"
        )
    }
}

pub fn data_key(
    measurement_type: &str,
    network: &str,
    identity: &str,
    kind: MetricKind,
) -> String {
    let sep = DATA_KEY_SEPARATOR;
    format!("{measurement_type}{sep}{network}{sep}{identity}{sep}{kind}")
}

/// At what level the builder decides that an entry is already
/// represented in the column tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "kebab_case")]
#[serde(rename_all = "kebab-case")]
pub enum SchemaGranularity {
    /// Every endpoint not yet present under its network gets its
    /// three leaves.
    #[default]
    Endpoint,
    /// Endpoints are only added while their network node is new in
    /// the current iteration. An endpoint first seen under a network
    /// known from an earlier iteration gets no columns, although its
    /// values are still written into the record.
    Network,
}

/// Derived catalogs used by filter widgets.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Catalogs {
    /// Distinct `server_port` values of all endpoints seen
    pub observed_ports: BTreeSet<String>,
    /// Dimension name -> distinct values (as displayed), including
    /// the values of excluded (failed) iterations
    pub dimension_values: BTreeMap<String, BTreeSet<String>>,
}

/// A metric leaf written by one iteration, with its value.
#[derive(Debug, Clone, PartialEq)]
pub struct TouchedLeaf {
    pub data_key: String,
    /// Of the endpoint the leaf belongs to
    pub client_hostname: String,
    pub kind: MetricKind,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchemaState {
    pub columns: ColumnNode,
    pub catalogs: Catalogs,
    pub granularity: SchemaGranularity,
}

fn entry_value(entry: &RawEndpointEntry, kind: MetricKind) -> f64 {
    match kind {
        MetricKind::Mean => entry.mean,
        MetricKind::StdDevPct => entry.stddevpct,
        MetricKind::ClosestSample => entry.closest_sample,
    }
}

/// Index keys are numbers in practice; order them numerically, with
/// non-numeric keys after those, alphabetically.
fn sorted_entries(
    entries: &BTreeMap<String, RawEndpointEntry>,
) -> Vec<(&String, &RawEndpointEntry)> {
    let mut v: Vec<_> = entries.iter().collect();
    v.sort_by(|(a, _), (b, _)| match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    });
    v
}

impl SchemaState {
    pub fn new(granularity: SchemaGranularity) -> Self {
        Self {
            columns: ColumnNode::root(),
            catalogs: Catalogs::default(),
            granularity,
        }
    }

    /// Record the configuration values of one iteration in the
    /// dimension catalog.
    pub fn observe_dimensions<'d>(
        mut self,
        dimensions: impl IntoIterator<Item = (&'d str, String)>,
    ) -> Self {
        for (name, value) in dimensions {
            self.catalogs
                .dimension_values
                .entry(name.to_owned())
                .or_default()
                .insert(value);
        }
        self
    }

    /// Grow the column tree by the measurements of one iteration and
    /// return the metric leaves it writes.
    pub fn observe_measurements(mut self, measurements: &Measurements) -> (Self, Vec<TouchedLeaf>) {
        let mut touched = Vec::new();
        let granularity = self.granularity;
        for (measurement_type, networks) in measurements.iter() {
            let (type_node, _) = self.columns.child_or_insert(measurement_type);
            for (network, entries) in networks.iter() {
                let (network_node, network_is_new) = type_node.child_or_insert(network);
                for (_index, entry) in sorted_entries(entries) {
                    let identity = EndpointIdentity::from_entry(entry);
                    self.catalogs
                        .observed_ports
                        .insert(identity.server_port.to_owned());
                    let identity = identity.to_string();
                    let may_create = match granularity {
                        SchemaGranularity::Endpoint => true,
                        SchemaGranularity::Network => network_is_new,
                    };
                    if network_node.find_child(&identity).is_none() {
                        if may_create {
                            let mut endpoint_node = ColumnNode::new(identity.as_str());
                            for kind in MetricKind::iter() {
                                endpoint_node.children.push(ColumnNode::leaf(
                                    kind.to_string(),
                                    data_key(measurement_type, network, &identity, kind),
                                ));
                            }
                            network_node.children.push(endpoint_node);
                        } else {
                            debug!(
                                "no columns for {measurement_type:?} {network:?} {identity:?}: \
                                 network known from an earlier iteration"
                            );
                        }
                    }
                    for kind in MetricKind::iter() {
                        touched.push(TouchedLeaf {
                            data_key: data_key(measurement_type, network, &identity, kind),
                            client_hostname: entry.client_hostname.clone(),
                            kind,
                            value: entry_value(entry, kind),
                        });
                    }
                }
            }
        }
        (self, touched)
    }
}
