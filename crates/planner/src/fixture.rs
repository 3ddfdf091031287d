//! File-backed inventory used for offline planning and tests.
//!
//! Document layout:
//!
//! ```json
//! {
//!   "tickets": [ { "origin": "KZN", "destination": "MOW", "price": 5400, ... } ],
//!   "hotels": { "MOW": [ { "location_id": 12153, "hotel_id": 1, ... } ] },
//!   "hotel_catalog": [ { "id": 1, "location_id": 12153, "property_type": 1, "stars": 3 } ]
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use waypoint_core::{HotelOffer, TicketOffer};

use crate::provider::{
    FlightProvider, HotelProvider, HotelQuery, HotelTypeFilter, ProviderError, TicketPage,
    TicketQuery,
};

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("could not read inventory fixture `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not parse inventory fixture: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: i64,
    pub location_id: i64,
    pub property_type: u32,
    #[serde(default)]
    pub stars: u8,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryDocument {
    #[serde(default)]
    pub tickets: Vec<TicketOffer>,
    #[serde(default)]
    pub hotels: BTreeMap<String, Vec<HotelOffer>>,
    #[serde(default)]
    pub hotel_catalog: Vec<CatalogEntry>,
}

#[derive(Clone, Debug)]
pub struct JsonInventory {
    document: InventoryDocument,
}

impl JsonInventory {
    pub fn new(document: InventoryDocument) -> Self {
        Self { document }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, FixtureError> {
        Ok(Self::new(serde_json::from_str(raw)?))
    }

    pub fn from_path(path: &Path) -> Result<Self, FixtureError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| FixtureError::Read { path: path.to_path_buf(), source })?;
        Self::from_json_str(&raw)
    }

    pub fn document(&self) -> &InventoryDocument {
        &self.document
    }

    fn matching_tickets(&self, query: &TicketQuery) -> Vec<&TicketOffer> {
        let departure_day = query.departure_at.format("%Y-%m-%d").to_string();
        let mut tickets = self
            .document
            .tickets
            .iter()
            .filter(|ticket| {
                ticket.origin == query.origin
                    && ticket.destination == query.destination
                    && ticket.departure_at.starts_with(&departure_day)
            })
            .collect::<Vec<_>>();
        tickets.sort_by(|left, right| left.price.cmp(&right.price));
        tickets
    }
}

#[async_trait]
impl FlightProvider for JsonInventory {
    async fn fetch_cheapest(
        &self,
        query: &TicketQuery,
        page: u32,
    ) -> Result<TicketPage, ProviderError> {
        let page_size = query.page_size.max(1) as usize;
        let skip = page.saturating_sub(1) as usize * page_size;
        let items = self
            .matching_tickets(query)
            .into_iter()
            .skip(skip)
            .take(page_size)
            .cloned()
            .collect();

        Ok(TicketPage { success: true, items, error: None })
    }
}

#[async_trait]
impl HotelProvider for JsonInventory {
    async fn fetch_prices(&self, query: &HotelQuery) -> Result<Vec<HotelOffer>, ProviderError> {
        Ok(self
            .document
            .hotels
            .get(&query.location)
            .map(|hotels| hotels.iter().take(query.limit as usize).cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl HotelTypeFilter for JsonInventory {
    async fn ids_for(
        &self,
        location_id: i64,
        property_types: &BTreeSet<u32>,
        min_stars: u8,
    ) -> Result<BTreeSet<i64>, ProviderError> {
        Ok(self
            .document
            .hotel_catalog
            .iter()
            .filter(|entry| {
                entry.location_id == location_id
                    && property_types.contains(&entry.property_type)
                    && entry.stars >= min_stars
            })
            .map(|entry| entry.id)
            .collect())
    }
}
