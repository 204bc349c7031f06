use crate::{
    commitment::INVOICE_EXPIRY_SECS,
    config::{file, File, Network, LND_URL},
    fs,
    retrieve::DEFAULT_POLL_INTERVAL,
    timelock::{Chain, ForwardingPolicy},
    RelativeTime,
};
use anyhow::{Context, Result};
use log::LevelFilter;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use url::Url;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// This structs represents the settings as they are used through out the code.
///
/// Many configuration values are optional in the config file but are
/// replaced by default values when the `Settings` are created from a given
/// `File`.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub logging: Logging,
    pub lnd: Lnd,
    pub chain: Chain,
    pub forwarding: ForwardingPolicy,
    pub swap: Swap,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Logging {
    pub level: LevelFilter,
}

impl Default for Logging {
    fn default() -> Self {
        Logging {
            level: LevelFilter::Info,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Lnd {
    pub rest_api_url: Url,
    pub dir: PathBuf,
    pub cert_path: PathBuf,
    pub macaroon_path: PathBuf,
    pub request_timeout: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Swap {
    pub invoice_expiry: RelativeTime,
    pub preimage_poll_interval: Duration,
}

impl Default for Swap {
    fn default() -> Self {
        Swap {
            invoice_expiry: INVOICE_EXPIRY_SECS,
            preimage_poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl Settings {
    pub fn from_config_file_and_defaults(config_file: File) -> Result<Self> {
        let File {
            logging,
            lnd,
            chain,
            forwarding,
            swap,
        } = config_file;

        let chain = match chain {
            None => Chain::known("BTC")?,
            Some(file::Chain {
                symbol,
                seconds_per_block: None,
            }) => Chain::known(&symbol)?,
            Some(file::Chain {
                symbol,
                seconds_per_block: Some(seconds_per_block),
            }) => Chain::new(symbol, seconds_per_block)?,
        };

        let lnd = Lnd::from_file(lnd, &chain)?;

        Ok(Self {
            logging: logging
                .map(|logging| Logging {
                    level: logging.level.unwrap_or_else(|| Logging::default().level),
                })
                .unwrap_or_default(),
            lnd,
            chain,
            forwarding: forwarding.map(forwarding_policy).unwrap_or_default(),
            swap: swap
                .map(|swap| {
                    let default = Swap::default();
                    Swap {
                        invoice_expiry: swap
                            .invoice_expiry_secs
                            .map(RelativeTime::new)
                            .unwrap_or(default.invoice_expiry),
                        preimage_poll_interval: swap
                            .preimage_poll_interval_secs
                            .map(Duration::from_secs)
                            .unwrap_or(default.preimage_poll_interval),
                    }
                })
                .unwrap_or_default(),
        })
    }
}

impl Lnd {
    fn from_file(file: Option<file::Lnd>, chain: &Chain) -> Result<Self> {
        let file = file.unwrap_or_default();

        let rest_api_url = match file.rest_api_url {
            Some(url) => assert_lnd_url_https(url)?,
            None => LND_URL.clone(),
        };
        let dir = match file.dir {
            Some(dir) => dir,
            None => fs::lnd_dir().context("unable to determine default lnd directory")?,
        };
        let network = file.network.unwrap_or(Network::Mainnet);

        Ok(Lnd {
            rest_api_url,
            cert_path: file
                .cert_path
                .unwrap_or_else(|| default_lnd_cert_path(&dir)),
            macaroon_path: file
                .macaroon_path
                .unwrap_or_else(|| default_lnd_macaroon_path(&dir, chain, network)),
            dir,
            request_timeout: file
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        })
    }
}

fn forwarding_policy(file: file::Forwarding) -> ForwardingPolicy {
    let default = ForwardingPolicy::default();

    ForwardingPolicy {
        forward_delta: file
            .forward_delta_secs
            .map(RelativeTime::new)
            .unwrap_or(default.forward_delta),
        final_delta: file
            .final_delta_secs
            .map(RelativeTime::new)
            .unwrap_or(default.final_delta),
        buffer: file
            .buffer_secs
            .map(RelativeTime::new)
            .unwrap_or(default.buffer),
        intermediate_hops: file.intermediate_hops.unwrap_or(default.intermediate_hops),
    }
}

fn assert_lnd_url_https(lnd_url: Url) -> Result<Url> {
    if lnd_url.scheme() == "https" {
        Ok(lnd_url)
    } else {
        Err(anyhow::anyhow!("HTTPS scheme is expected for lnd url."))
    }
}

fn default_lnd_cert_path(lnd_dir: &Path) -> PathBuf {
    lnd_dir.join("tls.cert")
}

/// Settling and paying needs more than a read-only macaroon.
fn default_lnd_macaroon_path(lnd_dir: &Path, chain: &Chain, network: Network) -> PathBuf {
    let chain_dir = match chain.symbol.to_uppercase().as_str() {
        "BTC" => "bitcoin".to_owned(),
        "LTC" => "litecoin".to_owned(),
        other => other.to_lowercase(),
    };

    lnd_dir
        .join("data")
        .join("chain")
        .join(chain_dir)
        .join(network.to_string())
        .join("admin.macaroon")
}
