use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info};
use waypoint_core::config::InventoryConfig;
use waypoint_core::{HotelFilters, HotelOffer, InventoryKind, TicketFilters, TicketOffer};

use crate::provider::{
    FlightProvider, HotelProvider, HotelQuery, HotelTypeFilter, ProviderError, TicketQuery,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchSettings {
    pub request_timeout: Duration,
    pub max_ticket_pages: u32,
    pub ticket_page_size: u32,
    pub hotel_fetch_limit: u32,
    pub hotel_property_types: BTreeSet<u32>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self::from(&waypoint_core::config::AppConfig::default().inventory)
    }
}

impl From<&InventoryConfig> for SearchSettings {
    fn from(config: &InventoryConfig) -> Self {
        Self {
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            max_ticket_pages: config.max_ticket_pages,
            ticket_page_size: config.ticket_page_size,
            hotel_fetch_limit: config.hotel_fetch_limit,
            hotel_property_types: config.hotel_property_types.iter().copied().collect(),
        }
    }
}

type TypeCacheKey = (i64, Vec<u32>, u8);

/// Fetches both inventories, applies hard filters and returns them sorted
/// by price. Hotel type lookups are cached per location for the lifetime
/// of the search.
pub struct InventorySearch {
    flights: Arc<dyn FlightProvider>,
    hotels: Arc<dyn HotelProvider>,
    hotel_types: Arc<dyn HotelTypeFilter>,
    settings: SearchSettings,
    type_cache: Mutex<HashMap<TypeCacheKey, Arc<BTreeSet<i64>>>>,
}

impl InventorySearch {
    pub fn new(
        flights: Arc<dyn FlightProvider>,
        hotels: Arc<dyn HotelProvider>,
        hotel_types: Arc<dyn HotelTypeFilter>,
        settings: SearchSettings,
    ) -> Self {
        Self { flights, hotels, hotel_types, settings, type_cache: Mutex::new(HashMap::new()) }
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    /// Pages through cheapest fares until an empty page or the page cap.
    pub async fn tickets(
        &self,
        query: &TicketQuery,
        filters: &TicketFilters,
    ) -> Result<Vec<TicketOffer>, ProviderError> {
        let mut offers = Vec::new();

        for page in 1..=self.settings.max_ticket_pages {
            let response = self
                .with_timeout(InventoryKind::Tickets, self.flights.fetch_cheapest(query, page))
                .await?;

            if !response.success {
                return Err(ProviderError::Unsuccessful {
                    kind: InventoryKind::Tickets,
                    page,
                    message: response.error.unwrap_or_else(|| "no error given".to_string()),
                });
            }
            if response.items.is_empty() {
                debug!(page, "ticket paging reached an empty page");
                break;
            }
            offers.extend(response.items);
        }

        let fetched = offers.len();
        offers.retain(|ticket| filters.admits(ticket));
        offers.sort_by(|left, right| left.price.cmp(&right.price));

        info!(
            event_name = "planner.inventory.tickets_fetched",
            origin = %query.origin,
            destination = %query.destination,
            fetched,
            kept = offers.len(),
            "ticket inventory loaded"
        );
        Ok(offers)
    }

    pub async fn hotels(
        &self,
        query: &HotelQuery,
        filters: &HotelFilters,
    ) -> Result<Vec<HotelOffer>, ProviderError> {
        let mut offers =
            self.with_timeout(InventoryKind::Hotels, self.hotels.fetch_prices(query)).await?;
        let fetched = offers.len();

        // The provider answers for one city, so the first hotel's location
        // stands for the whole list.
        if let Some(location_id) = offers.first().map(|hotel| hotel.location_id) {
            let property_types = if filters.property_types.is_empty() {
                &self.settings.hotel_property_types
            } else {
                &filters.property_types
            };
            let allowed =
                self.allowed_hotel_ids(location_id, property_types, filters.min_stars).await?;
            offers.retain(|hotel| allowed.contains(&hotel.hotel_id));
        }

        offers.sort_by(|left, right| left.price_from.cmp(&right.price_from));

        info!(
            event_name = "planner.inventory.hotels_fetched",
            location = %query.location,
            fetched,
            kept = offers.len(),
            "hotel inventory loaded"
        );
        Ok(offers)
    }

    async fn allowed_hotel_ids(
        &self,
        location_id: i64,
        property_types: &BTreeSet<u32>,
        min_stars: u8,
    ) -> Result<Arc<BTreeSet<i64>>, ProviderError> {
        let key = (location_id, property_types.iter().copied().collect::<Vec<_>>(), min_stars);
        if let Some(cached) = self.type_cache.lock().await.get(&key) {
            return Ok(Arc::clone(cached));
        }

        let ids = self
            .with_timeout(
                InventoryKind::Hotels,
                self.hotel_types.ids_for(location_id, property_types, min_stars),
            )
            .await?;
        let ids = Arc::new(ids);
        self.type_cache.lock().await.insert(key, Arc::clone(&ids));
        Ok(ids)
    }

    async fn with_timeout<T, F>(&self, kind: InventoryKind, request: F) -> Result<T, ProviderError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        tokio::time::timeout(self.settings.request_timeout, request).await.map_err(|_| {
            ProviderError::Timeout { kind, secs: self.settings.request_timeout.as_secs() }
        })?
    }
}
