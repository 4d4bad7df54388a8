// ========================================================================================
//                          Compute configuration for chunked queries
// ========================================================================================

use crate::engine::{Engine, RayonEngine, SequentialEngine};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Overrides `threads` when set to a positive integer.
pub const THREADS_ENV_VAR: &str = "GENOSTATS_THREADS";

/// Custom error type for loading, saving, and applying a compute configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize configuration to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Failed to build the worker thread pool: {0}")]
    ThreadPoolError(#[from] rayon::ThreadPoolBuildError),
    #[error("A dedicated thread pool needs at least one thread, but {0} were requested.")]
    InvalidThreads(usize),
}

/// How the chunks of a chunked query are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Schedule {
    /// One chunk after another on the calling thread.
    Sequential,
    /// Chunks spread over a rayon thread pool.
    #[default]
    Parallel,
}

/// Settings that choose the engine chunked queries run on.
///
/// Every field has a default, so an empty TOML document is a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputeConfig {
    pub schedule: Schedule,
    /// Worker threads for `Schedule::Parallel`. `None` shares rayon's global pool.
    pub threads: Option<usize>,
}

impl ComputeConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Loads a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        Self::from_toml_str(&toml_string)
    }

    /// Saves the configuration to a file in a human-readable TOML format.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Applies `GENOSTATS_THREADS` on top of the loaded values.
    pub fn with_env_overrides(self) -> Self {
        let value = std::env::var(THREADS_ENV_VAR).ok();
        self.apply_thread_override(value.as_deref())
    }

    fn apply_thread_override(mut self, value: Option<&str>) -> Self {
        match value.map(|raw| raw.trim().parse::<usize>()) {
            None => {}
            Some(Ok(0)) => {
                warn!("Ignoring {THREADS_ENV_VAR}=0; keeping {:?}", self.threads);
            }
            Some(Ok(threads)) => {
                self.threads = Some(threads);
            }
            Some(Err(err)) => {
                warn!("Ignoring unparsable {THREADS_ENV_VAR}: {err}");
            }
        }
        self
    }

    /// The number of threads chunked queries will use.
    pub fn effective_threads(&self) -> usize {
        match self.schedule {
            Schedule::Sequential => 1,
            Schedule::Parallel => self.threads.unwrap_or_else(num_cpus::get),
        }
    }

    pub fn build_engine(&self) -> Result<Engine, ConfigError> {
        let engine = match (self.schedule, self.threads) {
            (Schedule::Sequential, _) => Engine::Sequential(SequentialEngine),
            (Schedule::Parallel, None) => Engine::Parallel(RayonEngine::global()),
            (Schedule::Parallel, Some(0)) => return Err(ConfigError::InvalidThreads(0)),
            (Schedule::Parallel, Some(threads)) => Engine::Parallel(RayonEngine::with_threads(threads)?),
        };
        info!(
            "Chunked queries will run {:?} on {} thread(s)",
            self.schedule,
            engine.threads()
        );
        Ok(engine)
    }
}
