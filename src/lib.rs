//! Turns nested benchmark-run result records into a column schema,
//! flat iteration records, clusters of iterations keyed by
//! configuration dimensions, bar chart rows and merged time series.
//! No I/O happens here except through the `SampleFetcher` supplied by
//! the caller (and the file helpers used by the driver).

pub mod cluster;
pub mod comparison;
pub mod config;
pub mod config_file;
pub mod fetch;
pub mod flatten;
pub mod get_terminal_width;
pub mod graph;
pub mod ordered_map;
pub mod output_table;
pub mod raw;
pub mod schema;
pub mod timeseries;
pub mod tree;
pub mod utillib;
