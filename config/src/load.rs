//! Layered configuration loading.
//!
//! A configuration is merged from three layers, later layers winning:
//!
//! 1. `configuration/base.{yaml,yml,json}`, shared by every environment;
//! 2. `configuration/{environment}.{yaml,yml,json}`, selected by `APP_ENVIRONMENT`;
//! 3. `APP_`-prefixed environment variables, nested keys separated by `__`
//!    (`APP_PIPELINE__NUM_WORKERS=8`).

use std::io;
use std::path::{Path, PathBuf};

use rust_cli_config::{ConfigError, File, FileFormat, FileSourceFile};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::environment::Environment;

const CONFIGURATION_DIR: &str = "configuration";

/// Layer every environment starts from.
const BASE_LAYER: &str = "base";

/// Extensions looked up for each file layer, first match wins.
const FILE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

const ENV_PREFIX: &str = "APP";
const ENV_PREFIX_SEPARATOR: &str = "_";
const ENV_SEPARATOR: &str = "__";
const ENV_LIST_SEPARATOR: &str = ",";

/// Implemented by top-level configuration structures that can be loaded with [`load_config`].
pub trait Config {
    /// Keys whose environment values are parsed as comma separated lists.
    const LIST_PARSE_KEYS: &'static [&'static str];
}

#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("cannot read the working directory: {0}")]
    WorkingDirectory(#[source] io::Error),

    #[error("no configuration directory at `{}`", .0.display())]
    NoConfigurationDir(PathBuf),

    #[error("no `{layer}` configuration file, looked for {candidates}")]
    LayerNotFound {
        layer: &'static str,
        candidates: String,
    },

    #[error("invalid `{layer}` configuration file `{}`: {source}", path.display())]
    InvalidLayer {
        layer: &'static str,
        path: PathBuf,
        #[source]
        source: ConfigError,
    },

    #[error("cannot merge configuration layers: {0}")]
    Merge(#[source] ConfigError),

    #[error("configuration does not match the expected shape: {0}")]
    Deserialize(#[source] ConfigError),

    #[error("invalid runtime environment: {0}")]
    Environment(#[from] io::Error),
}

/// Configuration file backing one layer.
#[derive(Debug)]
struct FileLayer {
    name: &'static str,
    path: PathBuf,
}

impl FileLayer {
    fn locate(directory: &Path, name: &'static str) -> Result<Self, LoadConfigError> {
        let candidates: Vec<PathBuf> = FILE_EXTENSIONS
            .iter()
            .map(|extension| directory.join(name).with_extension(extension))
            .collect();

        match candidates.iter().find(|path| path.is_file()) {
            Some(path) => Ok(Self {
                name,
                path: path.clone(),
            }),
            None => Err(LoadConfigError::LayerNotFound {
                layer: name,
                candidates: candidates
                    .iter()
                    .map(|path| format!("`{}`", path.display()))
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }

    fn source(&self) -> File<FileSourceFile, FileFormat> {
        File::from(self.path.clone())
    }

    /// Parses the file on its own, so that a syntax error names the file it comes from.
    fn check(&self) -> Result<(), LoadConfigError> {
        rust_cli_config::Config::builder()
            .add_source(self.source())
            .build()
            .map(drop)
            .map_err(|source| LoadConfigError::InvalidLayer {
                layer: self.name,
                path: self.path.clone(),
                source,
            })
    }
}

fn environment_overrides(list_keys: &[&str]) -> rust_cli_config::Environment {
    let overrides = rust_cli_config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true);

    // A list separator without keys would split every value.
    if list_keys.is_empty() {
        return overrides;
    }

    list_keys.iter().fold(
        overrides.list_separator(ENV_LIST_SEPARATOR),
        |overrides, key| overrides.with_list_parse_key(key),
    )
}

/// Loads `T` from the `configuration` directory of the working directory, for the environment
/// named by `APP_ENVIRONMENT`.
pub fn load_config<T>() -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    let working_directory = std::env::current_dir().map_err(LoadConfigError::WorkingDirectory)?;

    load_config_from(
        &working_directory.join(CONFIGURATION_DIR),
        Environment::load()?,
    )
}

pub(crate) fn load_config_from<T>(
    directory: &Path,
    environment: Environment,
) -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    if !directory.is_dir() {
        return Err(LoadConfigError::NoConfigurationDir(directory.to_path_buf()));
    }

    let layers = [
        FileLayer::locate(directory, BASE_LAYER)?,
        FileLayer::locate(directory, environment.as_str())?,
    ];

    let mut builder = rust_cli_config::Config::builder();
    for layer in &layers {
        layer.check()?;
        builder = builder.add_source(layer.source());
    }

    builder
        .add_source(environment_overrides(T::LIST_PARSE_KEYS))
        .build()
        .map_err(LoadConfigError::Merge)?
        .try_deserialize()
        .map_err(LoadConfigError::Deserialize)
}
