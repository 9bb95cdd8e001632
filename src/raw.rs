//! The input shapes as stored in the run-results store: one result
//! with its iterations, and the per-iteration sample time series.

use std::{
    collections::BTreeMap,
    fmt::Display,
    fs::File,
    io::BufReader,
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use kstring::KString;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::DeserializeOwned};
use serde_json::{Number, Value};

use crate::ordered_map::OrderedMap;

/// The key inside `iteration_data` that holds the configuration, all
/// other keys are measurement types.
pub const PARAMETERS_KEY: &str = "parameters";

/// The `client_hostname` of the entry that aggregates over all hosts.
pub const ALL_HOSTS: &str = "all";

/// One run result as read by the driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawResult {
    pub controller_name: KString,
    pub result_name: KString,
    pub iterations: Vec<RawIteration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawIteration {
    pub iteration_name: String,
    pub iteration_number: u64,
    pub iteration_data: IterationData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IterationData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Parameters>,
    /// measurement type -> network/subsystem -> index -> entry, the
    /// first two levels in input order
    #[serde(flatten)]
    pub measurements: OrderedMap<OrderedMap<BTreeMap<String, RawEndpointEntry>>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Parameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub benchmark: Option<Vec<BTreeMap<String, Value>>>,
}

impl IterationData {
    /// The first element of the benchmark configuration array, if
    /// present.
    pub fn benchmark_parameters(&self) -> Option<&BTreeMap<String, Value>> {
        self.parameters.as_ref()?.benchmark.as_ref()?.first()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEndpointEntry {
    pub client_hostname: String,
    pub server_hostname: String,
    #[serde(deserialize_with = "deserialize_port")]
    pub server_port: String,
    pub mean: f64,
    pub stddevpct: f64,
    #[serde(rename = "closest sample")]
    pub closest_sample: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(Number),
}

fn deserialize_port<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => s,
        StringOrNumber::Number(n) => n.to_string(),
    })
}

/// measurement type -> metric name -> hosts
pub type RawTimeseries = BTreeMap<String, BTreeMap<String, Vec<RawHostSeries>>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawHostSeries {
    pub client_hostname: String,
    pub timeseries: Vec<RawSample>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Epoch milliseconds
    pub date: i64,
    pub value: f64,
}

/// A configuration dimension value. Nested JSON values are kept as
/// their compact JSON text.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(Number),
    Text(KString),
}

impl Scalar {
    /// What a missing dimension resolves to when building cluster
    /// labels.
    pub const UNDEFINED: &'static str = "undefined";

    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Scalar::Null,
            Value::Bool(b) => Scalar::Bool(*b),
            Value::Number(n) => Scalar::Number(n.clone()),
            Value::String(s) => Scalar::Text(KString::from_ref(s)),
            Value::Array(_) | Value::Object(_) => Scalar::Text(value.to_string().into()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Null => f.write_str(Self::UNDEFINED),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Number(n) => write!(f, "{n}"),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(KString::from_ref(s))
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Scalar::Null => serializer.serialize_unit(),
            Scalar::Bool(b) => serializer.serialize_bool(*b),
            Scalar::Number(n) => n.serialize(serializer),
            Scalar::Text(s) => serializer.serialize_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Scalar::from_json(&value))
    }
}

/// Read a JSON file, reporting the JSON path at which decoding failed.
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| anyhow!("opening {path:?}"))?;
    let mut deserializer = serde_json::Deserializer::from_reader(BufReader::new(file));
    serde_path_to_error::deserialize(&mut deserializer)
        .map_err(|e| anyhow!("decoding {path:?} at {}: {}", e.path(), e.inner()))
}

impl RawResult {
    pub fn read_file(path: &Path) -> Result<Self> {
        read_json_file(path)
    }
}
