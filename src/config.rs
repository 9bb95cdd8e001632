use std::{collections::BTreeMap, path::PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::{
    cluster::FilterSelection,
    config_file::LoadConfigFile,
    flatten::LoadOptions,
    schema::SchemaGranularity,
    timeseries::MergeStrategy,
    utillib::home::home_dir,
};

fn default_exclude_token() -> String {
    LoadOptions::default().exclude_token
}

/// Settings for `bench-compare`, from `~/.bench-compare.*` or the
/// file given with `--config`. Command line options take precedence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompareConfig {
    /// Dimensions to cluster by, in order
    #[serde(default)]
    pub dimensions: Vec<String>,

    /// Dimension -> required value
    #[serde(default)]
    pub filters: BTreeMap<String, String>,

    #[serde(default)]
    pub merge_strategy: MergeStrategy,

    #[serde(default)]
    pub schema_granularity: SchemaGranularity,

    /// Iterations whose name contains this string are left out
    #[serde(default = "default_exclude_token")]
    pub exclude_token: String,

    /// Size of the thread pool for fetching samples; the global rayon
    /// pool is used if not given
    #[serde(default)]
    pub threads: Option<usize>,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            dimensions: Vec::new(),
            filters: BTreeMap::new(),
            merge_strategy: MergeStrategy::default(),
            schema_granularity: SchemaGranularity::default(),
            exclude_token: default_exclude_token(),
            threads: None,
        }
    }
}

impl CompareConfig {
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            granularity: self.schema_granularity,
            exclude_token: self.exclude_token.clone(),
        }
    }

    pub fn filter_selection(&self) -> FilterSelection {
        self.filters.iter().collect()
    }
}

impl LoadConfigFile for CompareConfig {
    fn default_config_path_without_suffix() -> Result<Option<PathBuf>> {
        let home = home_dir()?;
        Ok(Some(home.join(".bench-compare")))
    }
}
