pub mod file;
pub mod settings;

use anyhow::Context;
use conquer_once::Lazy;
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, path::PathBuf, str::FromStr};
use url::Url;

pub use self::{file::File, settings::Settings};

static LND_URL: Lazy<Url> = Lazy::new(|| parse_unchecked("https://localhost:8080"));

/// The network lnd runs on, it selects the macaroon directory.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
    Simnet,
}

/// Reads the given config file, or the one at the default path if none was
/// given. Without either all defaults apply.
#[allow(clippy::print_stderr)] // We cannot use `tracing` before we have the config file
pub fn read_config<T>(config_file: &Option<PathBuf>, default_config_path: T) -> anyhow::Result<File>
where
    T: FnOnce() -> anyhow::Result<PathBuf>,
{
    if let Some(path) = config_file {
        eprintln!("Using config file {}", path.display());

        return File::read(path)
            .with_context(|| format!("failed to read config file {}", path.display()));
    }

    let default_path = default_config_path()?;

    if !default_path.exists() {
        eprintln!("Config file default path is {}", default_path.display());
        return Ok(File::default());
    }

    eprintln!(
        "Using config file at default path: {}",
        default_path.display()
    );

    File::read(&default_path)
        .with_context(|| format!("failed to read config file {}", default_path.display()))
}

fn parse_unchecked<T>(str: &'static str) -> T
where
    T: FromStr + Debug,
    <T as FromStr>::Err: Send + Sync + 'static + std::error::Error,
{
    str.parse()
        .with_context(|| format!("failed to parse static string '{}' into T", str))
        .unwrap()
}
