use ipnetwork::{IpNetwork, Ipv4Network, Ipv6Network};
use serde::Deserialize;

use crate::TrustedIps;

/// URL for Cloudflare's canonical list of IP ranges.
pub const CF_URL_IPS: &str = "https://api.cloudflare.com/client/v4/ips";

/// Errors that can occur when obtaining Cloudflare's IP ranges.
#[derive(Debug)]
#[non_exhaustive]
pub enum FetchError {
    /// Request failed, the response was malformed, or the API reported failure.
    Fetch,
}

impl_more::impl_display_enum!(FetchError, Fetch => "failed to fetch");

impl std::error::Error for FetchError {}

/// The `result` object of a successful IP list response.
#[derive(Debug, Deserialize)]
pub struct CfIpsResult {
    ipv4_cidrs: Vec<Ipv4Network>,
    ipv6_cidrs: Vec<Ipv6Network>,
}

/// Response body of Cloudflare's IP list API.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CfIpsResponse {
    /// Response containing the IP ranges.
    Success {
        /// Published ranges.
        result: CfIpsResult,
    },

    /// Response indicating failure, or one whose `result` could not be parsed.
    Failure {
        /// Success flag reported by the API.
        success: bool,
    },
}

impl From<CfIpsResult> for TrustedIps {
    fn from(ips: CfIpsResult) -> Self {
        ips.ipv4_cidrs
            .into_iter()
            .map(IpNetwork::V4)
            .chain(ips.ipv6_cidrs.into_iter().map(IpNetwork::V6))
            .collect()
    }
}

impl TrustedIps {
    /// Constructs trusted IP set from a Cloudflare IP list API response.
    pub fn try_from_response(res: CfIpsResponse) -> Result<Self, FetchError> {
        match res {
            CfIpsResponse::Success { result } => Ok(Self::from(result)),
            CfIpsResponse::Failure { success: false } => {
                tracing::error!("parsing response returned success: false");
                Err(FetchError::Fetch)
            }
            CfIpsResponse::Failure { success: true } => {
                tracing::error!("response reported success but its result could not be parsed");
                Err(FetchError::Fetch)
            }
        }
    }
}

/// Fetches trusted Cloudflare IP addresses from their API.
#[cfg(feature = "fetch-ips")]
pub async fn fetch_trusted_cf_ips() -> Result<TrustedIps, FetchError> {
    let client = awc::Client::new();

    tracing::debug!("fetching cloudflare ips");
    let mut res = client.get(CF_URL_IPS).send().await.map_err(|err| {
        tracing::error!("{err}");
        FetchError::Fetch
    })?;

    tracing::debug!("parsing response");
    let res = res.json::<CfIpsResponse>().await.map_err(|err| {
        tracing::error!("{err}");
        FetchError::Fetch
    })?;

    TrustedIps::try_from_response(res)
}
