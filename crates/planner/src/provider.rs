use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use waypoint_core::{HotelOffer, InventoryKind, TicketOffer};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("{kind} provider transport failed: {message}")]
    Transport { kind: InventoryKind, message: String },
    #[error("{kind} provider reported an unsuccessful response for page {page}: {message}")]
    Unsuccessful { kind: InventoryKind, page: u32, message: String },
    #[error("{kind} provider did not answer within {secs}s")]
    Timeout { kind: InventoryKind, secs: u64 },
}

impl ProviderError {
    pub fn kind(&self) -> InventoryKind {
        match self {
            Self::Transport { kind, .. }
            | Self::Unsuccessful { kind, .. }
            | Self::Timeout { kind, .. } => *kind,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketQuery {
    pub origin: String,
    pub destination: String,
    pub departure_at: NaiveDate,
    pub return_at: NaiveDate,
    pub page_size: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TicketPage {
    pub success: bool,
    #[serde(default)]
    pub items: Vec<TicketOffer>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotelQuery {
    pub location: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub limit: u32,
}

/// Cheapest-fare search. Pages are 1-based and arrive price-ascending.
#[async_trait]
pub trait FlightProvider: Send + Sync {
    async fn fetch_cheapest(
        &self,
        query: &TicketQuery,
        page: u32,
    ) -> Result<TicketPage, ProviderError>;
}

#[async_trait]
pub trait HotelProvider: Send + Sync {
    async fn fetch_prices(&self, query: &HotelQuery) -> Result<Vec<HotelOffer>, ProviderError>;
}

/// Resolves which hotels at a location match a property-type and star
/// constraint.
#[async_trait]
pub trait HotelTypeFilter: Send + Sync {
    async fn ids_for(
        &self,
        location_id: i64,
        property_types: &BTreeSet<u32>,
        min_stars: u8,
    ) -> Result<BTreeSet<i64>, ProviderError>;
}
