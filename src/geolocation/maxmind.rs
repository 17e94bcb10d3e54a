//! Offline lookups against a MaxMind GeoLite2-City database
//!
//! The database has no ISP data, so the ISP part of the location always
//! renders as "-". Users must download the database file separately from
//! MaxMind (free with registration).

use async_trait::async_trait;
use maxminddb::{geoip2, MaxMindDBError, Reader};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use super::{GeoError, GeoLocator, Location};

/// GeoLite2-City backed locator
#[derive(Clone)]
pub struct MaxMindLocator {
    reader: Arc<Reader<Vec<u8>>>,
}

impl MaxMindLocator {
    /// Open a GeoLite2-City.mmdb database
    ///
    /// # Errors
    ///
    /// Returns an error if the database file cannot be opened or is invalid.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, GeoError> {
        let reader = Reader::open_readfile(db_path.as_ref())?;
        Ok(MaxMindLocator {
            reader: Arc::new(reader),
        })
    }
}

#[async_trait]
impl GeoLocator for MaxMindLocator {
    async fn lookup(&self, ip: IpAddr) -> Result<Location, GeoError> {
        let city: geoip2::City = self.reader.lookup(ip).map_err(|e| match e {
            MaxMindDBError::AddressNotFoundError(_) => GeoError::NotFound,
            other => GeoError::Database(other),
        })?;

        let city_name = city
            .city
            .and_then(|c| c.names)
            .and_then(|n| n.get("en").copied())
            .map(String::from);
        let country_code = city
            .country
            .and_then(|c| c.iso_code)
            .map(String::from);

        Ok(Location::from_parts(city_name, country_code, None))
    }
}
