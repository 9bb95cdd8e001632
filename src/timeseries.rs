//! Merging the sample series of the iterations of one cluster into one
//! table for a line chart.
//!
//! Two strategies exist. `Position` pairs the n-th sample of every
//! series, which is only meaningful if all iterations were sampled with
//! the same cadence and offsets; lengths are truncated to the shortest
//! series. `Regrid` takes the timestamps of the first series as the
//! grid and interpolates the others onto it. Either way, whatever was
//! dropped or could not be matched is reported back as `MergeWarning`s.

use std::{collections::BTreeMap, fmt::Display};

use serde::{Deserialize, Serialize, Serializer, ser::SerializeMap};
use strum_macros::EnumString;

use crate::{
    flatten::IterationRecord,
    raw::{ALL_HOSTS, RawSample, RawTimeseries},
    warn,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "kebab_case")]
#[serde(rename_all = "kebab-case")]
pub enum MergeStrategy {
    #[default]
    Position,
    Regrid,
}

/// One row of the merged table, `y` is keyed by the 1-based ordinal of
/// the iteration in its cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedSeriesPoint {
    pub x: i64,
    pub y: BTreeMap<usize, f64>,
}

impl Serialize for MergedSeriesPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.y.len() + 1))?;
        map.serialize_entry("x", &self.x)?;
        for (ordinal, value) in &self.y {
            map.serialize_entry(&series_key(*ordinal), value)?;
        }
        map.end()
    }
}

/// `y{ordinal}`
pub fn series_key(ordinal: usize) -> String {
    format!("y{ordinal}")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum MergeWarning {
    /// Series lengths differed, rows past the shortest were dropped.
    Truncated { shortest: usize, longest: usize },
    /// The first position at which the series' timestamps differ.
    CadenceMismatch { position: usize },
    /// No series could be located for this ordinal.
    SeriesMissing { ordinal: usize },
}

impl Display for MergeWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeWarning::Truncated { shortest, longest } => write!(
                f,
                "series lengths differ ({shortest} to {longest} samples), \
                 truncated to {shortest}"
            ),
            MergeWarning::CadenceMismatch { position } => {
                write!(f, "sample timestamps differ at position {position}")
            }
            MergeWarning::SeriesMissing { ordinal } => {
                write!(f, "no sample series for {}", series_key(*ordinal))
            }
        }
    }
}

fn serialize_labels<S: Serializer>(
    labels: &BTreeMap<usize, String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(labels.len()))?;
    for (ordinal, label) in labels {
        map.serialize_entry(&series_key(*ordinal), label)?;
    }
    map.end()
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MergedSeries {
    pub points: Vec<MergedSeriesPoint>,
    /// ordinal -> `"{resultName}-{iterationName}"`
    #[serde(serialize_with = "serialize_labels")]
    pub labels: BTreeMap<usize, String>,
    pub strategy: MergeStrategy,
    pub warnings: Vec<MergeWarning>,
}

/// The samples charted for `record`: the series of the metric named
/// like its primary metric (of whichever measurement type), or the only
/// metric if there is no primary metric, taken from the host entry
/// aggregating all hosts.
pub fn select_series<'t>(record: &IterationRecord, raw: &'t RawTimeseries) -> Option<&'t [RawSample]> {
    let mut metrics = raw.values().flat_map(|metrics| metrics.iter());
    let hosts = match &record.primary_metric {
        Some(primary_metric) => {
            metrics
                .find(|(name, _)| *name == primary_metric)?
                .1
        }
        None => match (metrics.next(), metrics.next()) {
            (Some((_, hosts)), None) => hosts,
            _ => return None,
        },
    };
    hosts
        .iter()
        .find(|host| host.client_hostname == ALL_HOSTS)
        .map(|host| host.timeseries.as_slice())
}

/// Linear interpolation of `samples` (ascending by date) at `t`, `None`
/// outside their range.
fn interpolate(samples: &[RawSample], t: i64) -> Option<f64> {
    let i = samples.partition_point(|s| s.date < t);
    let after = samples.get(i)?;
    if after.date == t {
        return Some(after.value);
    }
    let before = samples.get(i.checked_sub(1)?)?;
    let span = (after.date - before.date) as f64;
    let fraction = (t - before.date) as f64 / span;
    Some(before.value + (after.value - before.value) * fraction)
}

fn merge_by_position(
    series: &[(usize, &[RawSample])],
    warnings: &mut Vec<MergeWarning>,
) -> Vec<MergedSeriesPoint> {
    let Some(shortest) = series.iter().map(|(_, s)| s.len()).min() else {
        return Vec::new();
    };
    let longest = series.iter().map(|(_, s)| s.len()).max().unwrap_or(shortest);
    if shortest != longest {
        warnings.push(MergeWarning::Truncated { shortest, longest });
    }
    let mut cadence_reported = false;
    (0..shortest)
        .map(|position| {
            let x = series[0].1[position].date;
            if !cadence_reported && series.iter().any(|(_, s)| s[position].date != x) {
                warnings.push(MergeWarning::CadenceMismatch { position });
                cadence_reported = true;
            }
            MergedSeriesPoint {
                x,
                y: series
                    .iter()
                    .map(|(ordinal, s)| (*ordinal, s[position].value))
                    .collect(),
            }
        })
        .collect()
}

fn merge_by_regrid(series: &[(usize, &[RawSample])]) -> Vec<MergedSeriesPoint> {
    let Some((first_ordinal, grid)) = series.first() else {
        return Vec::new();
    };
    grid.iter()
        .map(|sample| {
            let mut y = BTreeMap::new();
            y.insert(*first_ordinal, sample.value);
            for (ordinal, samples) in &series[1..] {
                if let Some(value) = interpolate(samples, sample.date) {
                    y.insert(*ordinal, value);
                }
            }
            MergedSeriesPoint { x: sample.date, y }
        })
        .collect()
}

/// Merge the series of the members of one cluster, given in member
/// order (ordinals are assigned from 1). Members without a series keep
/// their label but contribute no values.
pub fn merge(
    members: &[(&IterationRecord, Option<&[RawSample]>)],
    strategy: MergeStrategy,
) -> MergedSeries {
    let mut warnings = Vec::new();
    let mut labels = BTreeMap::new();
    let mut series = Vec::new();
    for (i, (record, samples)) in members.iter().enumerate() {
        let ordinal = i + 1;
        labels.insert(ordinal, record.display_name());
        match samples {
            Some(samples) => series.push((ordinal, *samples)),
            None => warnings.push(MergeWarning::SeriesMissing { ordinal }),
        }
    }
    let points = match strategy {
        MergeStrategy::Position => merge_by_position(&series, &mut warnings),
        MergeStrategy::Regrid => merge_by_regrid(&series),
    };
    for warning in &warnings {
        warn!("merging {} series: {warning}", members.len());
    }
    MergedSeries {
        points,
        labels,
        strategy,
        warnings,
    }
}
