use std::{
    io::{Write, stdout},
    path::PathBuf,
};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use serde::Serialize;

use bench_compare::{
    cluster::{FilterSelection, FilterTerm},
    comparison::ComparisonSession,
    config::CompareConfig,
    config_file::{FILE_EXTENSIONS, LoadConfigFile},
    fetch::{DirectorySampleFetcher, FetchPool},
    get_terminal_width::get_terminal_width,
    info,
    output_table::{OutputTable, terminal::TerminalTableOpts},
    raw::RawResult,
    schema::SchemaGranularity,
    timeseries::MergeStrategy,
    utillib::logging::{LogLevelOpt, set_log_level},
    warn,
};

const PROGRAM_NAME: &str = "bench-compare";

#[derive(clap::Parser, Debug)]
#[clap(next_line_help = true)]
#[clap(term_width = get_terminal_width(4))]
/// Compare the iterations of benchmark run results, clustered by
/// their configuration.
struct Opts {
    #[clap(flatten)]
    log_level: LogLevelOpt,

    /// Override the path to the config file (default: the paths
    /// `~/.bench-compare.*` where a single one exists where the `*` is
    /// one of json5, json, yml, yaml; if none exists, default values
    /// are used)
    #[clap(long)]
    config: Option<PathBuf>,

    /// The subcommand to run. Use `--help` after the sub-command to
    /// get a list of the allowed options there.
    #[clap(subcommand)]
    subcommand: SubCommand,
}

#[derive(clap::Args, Debug)]
struct SelectionOpts {
    /// A configuration dimension to cluster by (can be given multiple
    /// times, the order determines the cluster labels). Overrides the
    /// dimensions from the config file.
    #[clap(short, long)]
    dimension: Vec<String>,

    /// Only use iterations with the given dimension value, as
    /// `dimension=value` (can be given multiple times, all must
    /// match). Added to the filters from the config file.
    #[clap(short, long)]
    filter: Vec<FilterTerm>,

    /// Whether new columns are decided per endpoint or per network
    /// (endpoint, network)
    #[clap(long)]
    schema_granularity: Option<SchemaGranularity>,

    /// Iterations whose name contains this string are left out
    /// (default: "fail")
    #[clap(long)]
    exclude_token: Option<String>,

    /// Paths to run result files (JSON, each with `controller_name`,
    /// `result_name` and `iterations`)
    #[clap(required = true)]
    results: Vec<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Print version
    Version,

    /// Show the supported config format types.
    ConfigFormats,

    /// Show the column tree discovered from the results, the observed
    /// ports and the values seen per dimension.
    Schema {
        #[clap(flatten)]
        selection: SelectionOpts,
    },

    /// Print the flat iteration records (after filtering) as JSON.
    Records {
        #[clap(flatten)]
        selection: SelectionOpts,
    },

    /// Show the clusters as a table.
    Clusters {
        #[clap(flatten)]
        table_opts: TerminalTableOpts,

        #[clap(flatten)]
        selection: SelectionOpts,
    },

    /// Print the bar chart rows and legend per primary metric as JSON.
    Graph {
        #[clap(flatten)]
        selection: SelectionOpts,
    },

    /// Print the merged sample time series of every cluster as JSON.
    Timeseries {
        /// The directory holding the samples, laid out as
        /// `{controller}/{result}/{number}-{name}/sample{n}/result.json`
        #[clap(long)]
        samples_dir: PathBuf,

        /// How to merge series of different iterations (position,
        /// regrid)
        #[clap(long)]
        merge_strategy: Option<MergeStrategy>,

        /// Number of threads for fetching samples
        #[clap(long)]
        threads: Option<usize>,

        #[clap(flatten)]
        selection: SelectionOpts,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut out = stdout().lock();
    serde_json::to_writer_pretty(&mut out, value).with_context(|| anyhow!("writing JSON"))?;
    out.write_all(b"\n")?;
    Ok(())
}

fn open_session(config: &CompareConfig, selection: SelectionOpts) -> Result<ComparisonSession> {
    let SelectionOpts {
        dimension,
        filter,
        schema_granularity,
        exclude_token,
        results,
    } = selection;

    let mut options = config.load_options();
    if let Some(granularity) = schema_granularity {
        options.granularity = granularity;
    }
    if let Some(token) = exclude_token {
        options.exclude_token = token;
    }

    let raw_results = results
        .iter()
        .map(|path| RawResult::read_file(path))
        .collect::<Result<Vec<_>>>()?;
    info!("read {} result files", raw_results.len());

    let mut session = ComparisonSession::load(&raw_results, &options, config.merge_strategy);

    let mut filters: FilterSelection = config.filter_selection();
    for FilterTerm {
        dimension: name,
        value,
    } in filter
    {
        filters.insert(name, value);
    }
    for name in filters.0.keys() {
        if !session.loaded().catalogs.dimension_values.contains_key(name) {
            warn!("filter on dimension {name:?}, which no iteration has");
        }
    }
    if !filters.is_empty() {
        info!("filtering by {:?}", filters.0);
    }
    session.select_filters(filters);

    let dimensions = if dimension.is_empty() {
        config.dimensions.clone()
    } else {
        dimension
    };
    session.select_dimensions(dimensions);
    info!("clustering by {:?}", session.dimensions());
    Ok(session)
}

fn main() -> Result<()> {
    let Opts {
        log_level,
        config,
        subcommand,
    } = Opts::parse();

    set_log_level(log_level.try_into()?);

    // Handle those not needing the config first
    match &subcommand {
        SubCommand::Version => {
            println!("{PROGRAM_NAME} {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        SubCommand::ConfigFormats => {
            let extensions: Vec<&str> = FILE_EXTENSIONS.iter().map(|(ext, _)| *ext).collect();
            println!(
                "These configuration file extensions / formats are supported:\n\n  {}\n",
                extensions.join("\n  ")
            );
            return Ok(());
        }
        _ => (),
    }

    let config = CompareConfig::load_config(config.as_ref(), |msg| {
        info!("no config file, using defaults ({msg})");
        Ok(CompareConfig::default())
    })?;

    match subcommand {
        SubCommand::Version | SubCommand::ConfigFormats => unreachable!("handled above"),

        SubCommand::Schema { selection } => {
            let session = open_session(&config, selection)?;
            let loaded = session.loaded();
            let mut out = stdout().lock();
            write!(out, "{}", loaded.columns.to_outline())?;
            writeln!(out, "\nobserved ports: {}", loaded.observed_ports().join(", "))?;
            for (name, values) in &loaded.catalogs.dimension_values {
                let values: Vec<&str> = values.iter().map(String::as_str).collect();
                writeln!(out, "{name}: {}", values.join(", "))?;
            }
        }

        SubCommand::Records { selection } => {
            let session = open_session(&config, selection)?;
            print_json(&session.selected_records())?;
        }

        SubCommand::Clusters {
            table_opts,
            selection,
        } => {
            let session = open_session(&config, selection)?;
            let mut table = OutputTable::new(["primary metric", "id", "label", "iterations"]);
            for (primary_metric, summary) in session.cluster_summaries() {
                table.push_row(vec![
                    primary_metric.unwrap_or("-").to_string(),
                    summary.cluster_id.to_string(),
                    summary.label.clone(),
                    summary.iteration_count.to_string(),
                ]);
            }
            drop(table.print(table_opts, stdout().lock())?);
        }

        SubCommand::Graph { selection } => {
            let session = open_session(&config, selection)?;
            print_json(&session.graphs())?;
        }

        SubCommand::Timeseries {
            samples_dir,
            merge_strategy,
            threads,
            selection,
        } => {
            let config = CompareConfig {
                merge_strategy: merge_strategy.unwrap_or(config.merge_strategy),
                threads: threads.or(config.threads),
                ..config
            };
            let session = open_session(&config, selection)?;
            let pool = FetchPool::new(config.threads)?;
            let fetcher = DirectorySampleFetcher::new(samples_dir);
            info!("merging series by {:?}", session.merge_strategy());
            let outcome = session.timeseries(&pool, &fetcher);
            for notice in &outcome.notices {
                warn!("{notice}");
            }
            print_json(&outcome)?;
        }
    }

    Ok(())
}
