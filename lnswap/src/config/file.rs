use crate::config::Network;
use config as config_rs;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
};
use url::Url;

/// This struct aims to represent the configuration file as it appears on disk.
///
/// Most importantly, optional elements of the configuration file are
/// represented as `Option`s` here. This allows us to create a dedicated step
/// for filling in default values for absent configuration options.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct File {
    pub logging: Option<Logging>,
    pub lnd: Option<Lnd>,
    pub chain: Option<Chain>,
    pub forwarding: Option<Forwarding>,
    pub swap: Option<Swap>,
}

impl File {
    pub fn read<D>(config_file: D) -> Result<Self, config_rs::ConfigError>
    where
        D: AsRef<OsStr>,
    {
        let config_file = Path::new(&config_file);

        config_rs::Config::builder()
            .add_source(config_rs::File::from(config_file))
            .build()?
            .try_deserialize()
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Logging {
    pub level: Option<LevelFilter>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Lnd {
    pub rest_api_url: Option<Url>,
    pub dir: Option<PathBuf>,
    pub network: Option<Network>,
    pub cert_path: Option<PathBuf>,
    pub macaroon_path: Option<PathBuf>,
    pub request_timeout_secs: Option<u64>,
}

/// Chains other than BTC and LTC need `seconds_per_block`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Chain {
    pub symbol: String,
    pub seconds_per_block: Option<u32>,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Forwarding {
    pub forward_delta_secs: Option<u32>,
    pub final_delta_secs: Option<u32>,
    pub buffer_secs: Option<u32>,
    pub intermediate_hops: Option<u32>,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Swap {
    pub invoice_expiry_secs: Option<u32>,
    pub preimage_poll_interval_secs: Option<u64>,
}
