//! Generic config file loader

use std::{
    ffi::OsString,
    fmt::Display,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, bail};
use serde::de::DeserializeOwned;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigBackend {
    Json5,
    Yaml,
}

/// json5 0.4.1 carries the location in its errors but does not show
/// it in `Display`.
#[derive(Debug, thiserror::Error)]
pub struct Json5FromStrError(pub json5::Error);

impl Display for Json5FromStrError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            json5::Error::Message {
                msg,
                location: Some(json5::Location { line, column }),
            } => write!(f, "{msg} at line:column {line}:{column}"),
            json5::Error::Message { msg, location: None } => write!(f, "{msg}"),
        }
    }
}

pub fn json5_from_str<T: DeserializeOwned>(s: &str) -> Result<T, Json5FromStrError> {
    json5::from_str(s).map_err(Json5FromStrError)
}

impl ConfigBackend {
    pub fn load_config_file<T: DeserializeOwned>(self, path: &Path) -> Result<T> {
        let s = std::fs::read_to_string(path)
            .with_context(|| anyhow!("loading config file from {path:?}"))?;
        self.load_config_str(&s)
            .with_context(|| anyhow!("config file {path:?}"))
    }

    pub fn load_config_str<T: DeserializeOwned>(self, s: &str) -> Result<T> {
        match self {
            ConfigBackend::Json5 => json5_from_str(s).with_context(|| anyhow!("decoding JSON5")),
            ConfigBackend::Yaml => serde_yml::from_str(s).with_context(|| anyhow!("decoding YAML")),
        }
    }
}

pub const FILE_EXTENSIONS: &[(&str, ConfigBackend)] = &[
    ("json5", ConfigBackend::Json5),
    ("json", ConfigBackend::Json5),
    ("yml", ConfigBackend::Yaml),
    ("yaml", ConfigBackend::Yaml),
];

pub fn backend_from_path(path: &Path) -> Result<ConfigBackend> {
    let Some(ext) = path.extension() else {
        bail!(
            "given file path does not have an extension \
             for determining the file type: {path:?}"
        )
    };
    let Some(ext) = ext.to_str() else {
        bail!("given file path has an extension that is not unicode: {path:?}")
    };
    match FILE_EXTENSIONS.iter().find(|(e, _)| *e == ext) {
        Some((_, backend)) => Ok(*backend),
        None => bail!("given file path has an unknown extension {ext:?}: {path:?}"),
    }
}

/// `path` with `.{extension}` appended to its file name.
fn add_extension(path: &Path, extension: &str) -> Option<PathBuf> {
    let mut file_name: OsString = path.file_name()?.to_owned();
    file_name.push(".");
    file_name.push(extension);
    Some(path.with_file_name(file_name))
}

pub trait LoadConfigFile: DeserializeOwned {
    /// The suffixes from `FILE_EXTENSIONS` are appended and tried in
    /// order
    fn default_config_path_without_suffix() -> Result<Option<PathBuf>>;

    /// If `path` is given, the file must exist. Otherwise the default
    /// location is checked; if exactly one file with a known extension
    /// exists there it is loaded, more than one is an error, and with
    /// none `or_else` is called with a message saying what was tried.
    fn load_config<P: AsRef<Path>>(
        path: Option<P>,
        or_else: impl FnOnce(String) -> Result<Self>,
    ) -> Result<Self> {
        if let Some(path) = path {
            let path = path.as_ref();
            let backend = backend_from_path(path)?;
            return backend.load_config_file(path);
        }
        let Some(base) = Self::default_config_path_without_suffix()? else {
            return or_else(
                "no path was given and there is no default config location".into(),
            );
        };
        let candidates = FILE_EXTENSIONS
            .iter()
            .map(|(extension, backend)| {
                let path = add_extension(&base, extension)
                    .ok_or_else(|| anyhow!("path is missing a file name: {base:?}"))?;
                Ok((path, *backend))
            })
            .collect::<Result<Vec<_>>>()?;
        let existing: Vec<&(PathBuf, ConfigBackend)> =
            candidates.iter().filter(|(path, _)| path.exists()).collect();
        match existing.as_slice() {
            [] => {
                let tried: Vec<&PathBuf> = candidates.iter().map(|(path, _)| path).collect();
                or_else(format!("tried the default paths: {tried:?}"))
            }
            [(path, backend)] => backend.load_config_file(path),
            _ => {
                let paths: Vec<&PathBuf> = existing.iter().map(|(path, _)| path).collect();
                bail!("multiple config file paths found, leading to ambiguity: {paths:?}")
            }
        }
    }
}
