//! IP geolocation for findings
//!
//! Public addresses are resolved through a pluggable backend: the ip-api
//! HTTP service or an offline MaxMind GeoLite2-City database. Private and
//! local addresses never leave the process.

pub mod maxmind;

pub use maxmind::MaxMindLocator;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

use crate::models::Outcome;

/// Marker returned for private and local addresses
pub const LOCAL_NETWORK: &str = "🏠 LAN (Local)";

/// Errors that can occur during geolocation lookups
#[derive(Error, Debug)]
pub enum GeoError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Lookup service returned status {0}")]
    Status(StatusCode),

    #[error("Database error: {0}")]
    Database(#[from] maxminddb::MaxMindDBError),

    #[error("IP address not found in database")]
    NotFound,

    #[error("Invalid IP address: {0}")]
    InvalidAddress(String),
}

impl GeoError {
    /// Placeholder shown in place of the location
    pub fn placeholder(&self) -> &'static str {
        match self {
            GeoError::Status(_) | GeoError::NotFound => "Unknown",
            _ => "Error",
        }
    }
}

/// City, country and ISP for a public address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub city: String,
    pub country_code: String,
    pub isp: String,
}

impl Location {
    /// Build from optional parts, substituting "-" for anything missing
    pub fn from_parts(city: Option<String>, country_code: Option<String>, isp: Option<String>) -> Self {
        let or_dash = |v: Option<String>| v.unwrap_or_else(|| "-".to_string());
        Location {
            city: or_dash(city),
            country_code: or_dash(country_code),
            isp: or_dash(isp),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {} ({})", self.city, self.country_code, self.isp)
    }
}

/// True for addresses that have no meaningful public location
pub fn is_local_address(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, c, d] = v4.octets();
            v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_documentation()
                || a == 0 // "this network" 0.0.0.0/8
                || (a == 192 && b == 0 && c == 0 && (d < 8 || d == 170 || d == 171)) // IETF 192.0.0.0/29, 192.0.0.170/31
                || (a == 198 && (b & 0xfe) == 18) // benchmarking 198.18.0.0/15
                || a >= 240 // reserved 240.0.0.0/4
        }
        IpAddr::V6(v6) => {
            let segments = v6.segments();
            v6.is_loopback()
                || v6.is_unspecified()
                || (segments[0] & 0xfe00) == 0xfc00 // unique local fc00::/7
                || (segments[0] & 0xffc0) == 0xfe80 // link local fe80::/10
                || (segments[0] == 0x2001 && segments[1] == 0x0db8) // documentation 2001:db8::/32
        }
    }
}

/// A geolocation backend
#[async_trait]
pub trait GeoLocator: Send + Sync {
    /// Look up a public address
    async fn lookup(&self, ip: IpAddr) -> Result<Location, GeoError>;

    /// Resolve an address string to display text.
    ///
    /// Local addresses short-circuit to [`LOCAL_NETWORK`]; every failure
    /// degrades to a placeholder instead of surfacing.
    async fn locate(&self, ip: &str) -> Outcome<String> {
        let addr: IpAddr = match ip.parse() {
            Ok(addr) => addr,
            Err(_) => {
                let err = GeoError::InvalidAddress(ip.to_string());
                log::debug!("Skipping lookup: {}", err);
                return Outcome::Degraded(err.placeholder().to_string());
            }
        };

        if is_local_address(&addr) {
            return Outcome::Success(LOCAL_NETWORK.to_string());
        }

        match self.lookup(addr).await {
            Ok(location) => Outcome::Success(location.to_string()),
            Err(e) => {
                log::warn!("Geolocation lookup for {} failed: {}", addr, e);
                Outcome::Degraded(e.placeholder().to_string())
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    city: Option<String>,

    #[serde(rename = "countryCode")]
    country_code: Option<String>,

    isp: Option<String>,
}

/// Lookup through the ip-api.com JSON endpoint
pub struct IpApiLocator {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl IpApiLocator {
    /// `endpoint` is the service base, e.g. `http://ip-api.com`
    pub fn new(client: Client, endpoint: impl Into<String>, timeout: Duration) -> Self {
        IpApiLocator {
            client,
            endpoint: endpoint.into(),
            timeout,
        }
    }

    fn url_for(&self, ip: &IpAddr) -> String {
        format!(
            "{}/json/{}?fields=countryCode,city,isp",
            self.endpoint.trim_end_matches('/'),
            ip
        )
    }
}

#[async_trait]
impl GeoLocator for IpApiLocator {
    async fn lookup(&self, ip: IpAddr) -> Result<Location, GeoError> {
        let response = self
            .client
            .get(self.url_for(&ip))
            .timeout(self.timeout)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(GeoError::Status(response.status()));
        }

        let body: IpApiResponse = response.json().await?;
        Ok(Location::from_parts(body.city, body.country_code, body.isp))
    }
}
