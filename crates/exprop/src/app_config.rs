//! 🔧 App Configuration -- the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." -- every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment: `EXPROP_*` environment variables, with an optional TOML file layered
//! on top. Nested keys use a double underscore, e.g. `EXPROP_PROPAGATION__MIN_INTERVAL_MILLIS`.

use std::path::Path;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::backends::{FileSinkConfig, HttpSinkConfig};

const ENV_PREFIX: &str = "EXPROP_";

/// 📦 Everything one run needs to know.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub export: ExportConfig,
    #[serde(default)]
    pub propagation: PropagationConfig,
    #[serde(default)]
    pub sink_config: SinkConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// 🪣 Where the warehouse put its export.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ExportConfig {
    /// 📍 `gs://bucket/prefix`, `s3://bucket/prefix`, `file:///abs/dir` or `memory:///prefix`.
    pub location: String,
    /// 📚 Objects per listing page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page_size() -> usize {
    10
}

/// 🧺 The two knobs the engine itself cares about.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct PropagationConfig {
    /// 📏 Flush as soon as a chunk's pending bytes reach this. 900 KiB by default, which leaves
    /// room under the usual 1 MiB request cap for the `{"records":[...]}` framing.
    #[serde(default = "default_size_threshold_bytes")]
    pub size_threshold_bytes: usize,
    /// ⏱️ Minimum gap between two propagations of the same file.
    #[serde(default = "default_min_interval_millis")]
    pub min_interval_millis: u64,
}

fn default_size_threshold_bytes() -> usize {
    900 * 1024
}

fn default_min_interval_millis() -> u64 {
    1_000
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            size_threshold_bytes: default_size_threshold_bytes(),
            min_interval_millis: default_min_interval_millis(),
        }
    }
}

/// 🕳️ Which sink the propagator sends through.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub enum SinkConfig {
    File(FileSinkConfig),
    Http(HttpSinkConfig),
    InMemory,
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig::File(FileSinkConfig::default())
    }
}

/// 🧵 How hard to work. Files run one at a time unless told otherwise.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// 🧵 Files worked on at once. Each file keeps its own throttle, and all of them share one
    /// sink whose sends are not serialized, so two files can have a POST in flight together.
    #[serde(default = "default_file_parallelism")]
    pub file_parallelism: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,
}

fn default_file_parallelism() -> usize {
    1
}

fn default_queue_capacity() -> usize {
    10
}

fn default_show_progress() -> bool {
    true
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            file_parallelism: default_file_parallelism(),
            queue_capacity: default_queue_capacity(),
            show_progress: default_show_progress(),
        }
    }
}

/// 🚀 Load the config from `EXPROP_*` env vars, plus a TOML file if one is given.
///
/// The file wins on conflicts. No file means env vars only, with no silent fallback to some
/// default file name.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    load_config_with_location(config_file_name, None)
}

/// 📍 Like [`load_config`], but `location` (from the command line, usually) beats both sources.
pub fn load_config_with_location(
    config_file_name: Option<&Path>,
    location: Option<&str>,
) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed(ENV_PREFIX).split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };
    let config = match location {
        Some(location) => config.merge(Serialized::default("export.location", location)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables ({ENV_PREFIX}*). \
             Is there an [export] table with a location?",
            path.display()
        ),
        None => format!(
            "💀 Failed to parse configuration from environment variables ({ENV_PREFIX}*). \
             No file was provided, so at least {ENV_PREFIX}EXPORT__LOCATION must be set."
        ),
    };

    config.extract().context(context_msg)
}
