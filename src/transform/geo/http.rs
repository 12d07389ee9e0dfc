//! Geocoding over a Nominatim-compatible HTTP API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use super::gazetteer::title_case;
use super::{GeoPlace, GeoQuery, Geocoder};
use crate::config::EnrichmentCredential;
use crate::error::{LookupError, Result, TransformError};

/// Address block of a search or reverse result
#[derive(Debug, Default, Deserialize)]
struct Address {
    #[serde(rename = "ISO3166-2-lvl4")]
    iso_subdivision: Option<String>,
    country_code: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    hamlet: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Place {
    #[serde(default)]
    address: Option<Address>,
}

impl Address {
    fn into_place(self) -> Option<GeoPlace> {
        let country = self.country_code.map(|c| c.to_uppercase());
        // Country only when the service has no subdivision code
        let region = self
            .iso_subdivision
            .map(|code| code.to_uppercase())
            .or(country);
        let locality = self
            .city
            .or(self.town)
            .or(self.village)
            .or(self.hamlet)
            .map(|name| title_case(&name.to_lowercase()));

        (region.is_some() || locality.is_some()).then_some(GeoPlace { region, locality })
    }
}

/// Geocoder backed by a LocationIQ or Nominatim style service
pub struct HttpGeocoder {
    client: reqwest::Client,
    endpoint: String,
    credential: EnrichmentCredential,
}

impl HttpGeocoder {
    pub fn new(endpoint: &str, credential: &EnrichmentCredential, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("clinic-silver/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| TransformError::Configuration(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            credential: credential.clone(),
        })
    }

    async fn fetch(&self, request: reqwest::RequestBuilder) -> std::result::Result<Option<serde_json::Value>, LookupError> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(LookupError::Unavailable(format!("geocoder returned {status}")));
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(LookupError::Unavailable(format!("geocoder refused credential ({status})")));
        }
        let response = response.error_for_status()?;
        Ok(Some(response.json().await?))
    }

    async fn search(&self, text: &str) -> std::result::Result<Option<GeoPlace>, LookupError> {
        let request = self.client.get(format!("{}/search", self.endpoint)).query(&[
            ("key", self.credential.secret()),
            ("q", text),
            ("format", "json"),
            ("addressdetails", "1"),
            ("limit", "1"),
        ]);
        let Some(body) = self.fetch(request).await? else {
            return Ok(None);
        };
        let places: Vec<Place> = serde_json::from_value(body)
            .map_err(|e| LookupError::Rejected(format!("unexpected search response: {e}")))?;
        Ok(places
            .into_iter()
            .next()
            .and_then(|p| p.address)
            .and_then(Address::into_place))
    }

    async fn reverse(&self, lat: f64, lng: f64) -> std::result::Result<Option<GeoPlace>, LookupError> {
        let (lat, lon) = (lat.to_string(), lng.to_string());
        let request = self.client.get(format!("{}/reverse", self.endpoint)).query(&[
            ("key", self.credential.secret()),
            ("lat", lat.as_str()),
            ("lon", lon.as_str()),
            ("format", "json"),
        ]);
        let Some(body) = self.fetch(request).await? else {
            return Ok(None);
        };
        if body.get("error").is_some() {
            return Ok(None);
        }
        let place: Place = serde_json::from_value(body)
            .map_err(|e| LookupError::Rejected(format!("unexpected reverse response: {e}")))?;
        Ok(place.address.and_then(Address::into_place))
    }
}

#[async_trait]
impl Geocoder for HttpGeocoder {
    async fn lookup(&self, query: &GeoQuery) -> std::result::Result<Option<GeoPlace>, LookupError> {
        let text = query.text();
        if !text.is_empty() {
            return self.search(&text).await;
        }
        match query.coordinates {
            Some((lat, lng)) => self.reverse(lat, lng).await,
            None => Ok(None),
        }
    }
}
