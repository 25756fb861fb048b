use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::Parser;
use jssdk_tickets::upstream::wechat::DEFAULT_BASE_URL;

/// Issues WeChat JS-SDK permission signatures for registered tenants
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Opts {
    /// The address to listen on
    #[arg(long, env = "JSSDK_LISTEN", default_value = "0.0.0.0:3000")]
    pub listen: SocketAddr,

    /// A JSON file mapping each appId to its secret
    #[arg(long, env = "JSSDK_TENANTS_FILE")]
    pub tenants_file: PathBuf,

    /// The base URL of the issuing authority
    #[arg(long, env = "JSSDK_UPSTREAM_URL", default_value = DEFAULT_BASE_URL)]
    pub upstream_url: reqwest::Url,

    /// Seconds to wait for the issuing authority before giving up
    #[arg(long, env = "JSSDK_UPSTREAM_TIMEOUT_SECS", default_value_t = 10)]
    pub upstream_timeout_secs: u64,

    /// A directory of static files, such as `index.html`, to serve
    #[arg(long, env = "JSSDK_STATIC_DIR")]
    pub static_dir: Option<PathBuf>,
}

impl Opts {
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}
