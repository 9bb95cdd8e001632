//! Fetching the sample time series of iterations. All requests of a
//! cluster are run concurrently on a rayon pool and joined before
//! anything is merged; there is no cancellation, timeout or retry.

use std::{
    fmt::Display,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use kstring::KString;
use rayon::{
    ThreadPool, ThreadPoolBuilder,
    iter::{IntoParallelRefIterator, ParallelIterator},
};
use serde::Serialize;

use crate::{debug, flatten::IterationRecord, raw::RawTimeseries};

/// Which samples to get: those of the closest sample of an iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleRequest {
    pub controller_name: KString,
    pub result_name: KString,
    pub iteration_number: u64,
    pub iteration_name: String,
    pub closest_sample: u64,
}

impl SampleRequest {
    /// `None` if the record has no closest sample.
    pub fn for_record(record: &IterationRecord) -> Option<Self> {
        Some(Self {
            controller_name: record.controller_name.clone(),
            result_name: record.result_name.clone(),
            iteration_number: record.iteration_number,
            iteration_name: record.iteration_name.clone(),
            closest_sample: record.closest_sample_index?,
        })
    }

    /// The iteration's directory: iteration names normally carry their
    /// number already (`1-tcp_stream-64B-1i`), bare names get it
    /// prepended.
    pub fn iteration_directory(&self) -> String {
        let prefix = format!("{}-", self.iteration_number);
        if self.iteration_name.starts_with(&prefix) {
            self.iteration_name.clone()
        } else {
            format!("{prefix}{}", self.iteration_name)
        }
    }

    /// `{controller}/{result}/{iteration directory}/sample{closest}/result.json`
    pub fn relative_path(&self) -> PathBuf {
        let Self {
            controller_name,
            result_name,
            iteration_number: _,
            iteration_name: _,
            closest_sample,
        } = self;
        PathBuf::from(controller_name.as_str())
            .join(result_name.as_str())
            .join(self.iteration_directory())
            .join(format!("sample{closest_sample}"))
            .join("result.json")
    }
}

impl Display for SampleRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.relative_path().to_string_lossy())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SampleFetchError {
    #[error("reading {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("decoding {path:?} at {at}: {message}")]
    Decode {
        path: PathBuf,
        at: String,
        message: String,
    },
    #[error("{0}")]
    Unavailable(String),
}

/// All failures of one `fetch_all` call.
#[derive(Debug)]
pub struct FetchFailure {
    pub total: usize,
    pub failures: Vec<(SampleRequest, SampleFetchError)>,
}

impl Display for FetchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} of {} sample fetches failed",
            self.failures.len(),
            self.total
        )?;
        for (request, error) in &self.failures {
            write!(f, "; {request}: {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for FetchFailure {}

/// Supplied by whoever knows where samples live.
pub trait SampleFetcher: Sync {
    fn fetch(&self, request: &SampleRequest) -> Result<RawTimeseries, SampleFetchError>;
}

/// Reads samples from a directory mirroring the results store layout.
#[derive(Debug, Clone)]
pub struct DirectorySampleFetcher {
    pub root: PathBuf,
}

impl DirectorySampleFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

fn read_samples(path: &Path) -> Result<RawTimeseries, SampleFetchError> {
    let file = File::open(path).map_err(|source| SampleFetchError::Io {
        path: path.to_owned(),
        source,
    })?;
    let mut deserializer = serde_json::Deserializer::from_reader(BufReader::new(file));
    serde_path_to_error::deserialize(&mut deserializer).map_err(|e| SampleFetchError::Decode {
        path: path.to_owned(),
        at: e.path().to_string(),
        message: e.inner().to_string(),
    })
}

impl SampleFetcher for DirectorySampleFetcher {
    fn fetch(&self, request: &SampleRequest) -> Result<RawTimeseries, SampleFetchError> {
        let path = self.root.join(request.relative_path());
        debug!("reading samples from {path:?}");
        read_samples(&path)
    }
}

/// Runs fetches on the global rayon pool, or on an own pool of a
/// given size.
pub struct FetchPool {
    pool: Option<ThreadPool>,
}

impl FetchPool {
    pub fn new(threads: Option<usize>) -> Result<Self> {
        let pool = match threads {
            Some(n) => Some(
                ThreadPoolBuilder::new()
                    .num_threads(n)
                    .thread_name(|i| format!("fetch-{i}"))
                    .build()
                    .with_context(|| anyhow!("building fetch pool with {n} threads"))?,
            ),
            None => None,
        };
        Ok(Self { pool })
    }

    /// Issue all `requests` concurrently and wait for every one of
    /// them. The results are in request order; any failure makes the
    /// whole call fail, naming each failed request.
    pub fn fetch_all(
        &self,
        fetcher: &impl SampleFetcher,
        requests: &[SampleRequest],
    ) -> Result<Vec<RawTimeseries>, FetchFailure> {
        let run = || -> Vec<Result<RawTimeseries, SampleFetchError>> {
            requests
                .par_iter()
                .map(|request| fetcher.fetch(request))
                .collect()
        };
        let results = match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        };

        let mut fetched = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (request, result) in requests.iter().zip(results) {
            match result {
                Ok(samples) => fetched.push(samples),
                Err(e) => failures.push((request.clone(), e)),
            }
        }
        if failures.is_empty() {
            Ok(fetched)
        } else {
            Err(FetchFailure {
                total: requests.len(),
                failures,
            })
        }
    }
}

/// `FetchPool::fetch_all` on the global pool.
pub fn fetch_all(
    fetcher: &impl SampleFetcher,
    requests: &[SampleRequest],
) -> Result<Vec<RawTimeseries>, FetchFailure> {
    FetchPool { pool: None }.fetch_all(fetcher, requests)
}
