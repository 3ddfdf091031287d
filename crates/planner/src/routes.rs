use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use waypoint_core::config::PlannerConfig;
use waypoint_core::inventory::select_window;
use waypoint_core::{
    HotelOffer, InventoryKind, PlanStatus, Priced, Route, RoutePlan, SearchFilters,
    StructuredQuery, TicketOffer,
};

use crate::provider::{HotelQuery, ProviderError, TicketQuery};
use crate::search::InventorySearch;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripRequest {
    pub origin: String,
    pub destination: String,
    pub departure_at: NaiveDate,
    pub return_at: NaiveDate,
    pub budget: Option<Decimal>,
    pub route_count: usize,
    #[serde(default)]
    pub filters: SearchFilters,
}

impl TripRequest {
    pub fn from_query(query: &StructuredQuery, route_count: usize) -> Self {
        Self {
            origin: query.departure.clone(),
            destination: query.destination.clone(),
            departure_at: query.arrival,
            return_at: query.return_date,
            budget: query.budget.map(Decimal::from),
            route_count,
            filters: SearchFilters::default(),
        }
    }

    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannerSettings {
    pub ticket_share_factor: Decimal,
    pub unbounded_ticket_multiplier: Decimal,
    pub unbounded_hotel_multiplier: Decimal,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self::from(&waypoint_core::config::AppConfig::default().planner)
    }
}

impl From<&PlannerConfig> for PlannerSettings {
    fn from(config: &PlannerConfig) -> Self {
        Self {
            ticket_share_factor: config.ticket_share_factor,
            unbounded_ticket_multiplier: config.unbounded_ticket_multiplier,
            unbounded_hotel_multiplier: config.unbounded_hotel_multiplier,
        }
    }
}

/// Splits one budget across a ticket and a hotel and assembles the
/// resulting trip options.
pub struct RouteBuilder {
    search: InventorySearch,
    settings: PlannerSettings,
}

impl RouteBuilder {
    pub fn new(search: InventorySearch, settings: PlannerSettings) -> Self {
        Self { search, settings }
    }

    pub async fn find_top_routes(&self, request: &TripRequest) -> Result<RoutePlan, ProviderError> {
        let search_settings = self.search.settings();
        let ticket_query = TicketQuery {
            origin: request.origin.clone(),
            destination: request.destination.clone(),
            departure_at: request.departure_at,
            return_at: request.return_at,
            page_size: search_settings.ticket_page_size,
        };
        let hotel_query = HotelQuery {
            location: request.destination.clone(),
            check_in: request.departure_at,
            check_out: request.return_at,
            limit: search_settings.hotel_fetch_limit,
        };

        let (tickets, hotels) = tokio::try_join!(
            self.search.tickets(&ticket_query, &request.filters.tickets),
            self.search.hotels(&hotel_query, &request.filters.hotels),
        )
        .map_err(|error| {
            warn!(
                event_name = "planner.routes.inventory_failed",
                inventory = %error.kind(),
                error = %error,
                "inventory search failed"
            );
            error
        })?;

        let plan = self.plan(request, &tickets, &hotels);
        info!(
            event_name = "planner.routes.built",
            origin = %request.origin,
            destination = %request.destination,
            status = ?plan.status,
            routes = plan.routes.len(),
            "route plan assembled"
        );
        Ok(plan)
    }

    /// Pure planning step over already sorted and filtered inventories.
    pub fn plan(
        &self,
        request: &TripRequest,
        tickets: &[TicketOffer],
        hotels: &[HotelOffer],
    ) -> RoutePlan {
        let (Some(cheapest_ticket), Some(cheapest_hotel)) = (tickets.first(), hotels.first())
        else {
            let missing =
                if tickets.is_empty() { InventoryKind::Tickets } else { InventoryKind::Hotels };
            return RoutePlan::no_options(missing);
        };
        let count = request.route_count;

        let (status, mut routes) = match request.budget {
            None => (PlanStatus::Unbounded, self.unbounded_routes(request, tickets, hotels)),
            Some(budget) if cheapest_ticket.price() + cheapest_hotel.price() > budget => {
                let routes = if count == 0 {
                    Vec::new()
                } else {
                    vec![build_route(request, cheapest_ticket, cheapest_hotel)]
                };
                (PlanStatus::OverBudget, routes)
            }
            Some(budget) => {
                (PlanStatus::WithinBudget, self.budget_routes(request, budget, tickets, hotels))
            }
        };

        routes.dedup_by(|next, previous| next.key() == previous.key());
        RoutePlan { status, routes }
    }

    fn unbounded_routes(
        &self,
        request: &TripRequest,
        tickets: &[TicketOffer],
        hotels: &[HotelOffer],
    ) -> Vec<Route> {
        let count = request.route_count;
        let (Some(first_ticket), Some(first_hotel)) = (tickets.first(), hotels.first()) else {
            return Vec::new();
        };
        if count == 0 {
            return Vec::new();
        }

        let mut routes = vec![build_route(request, first_ticket, first_hotel)];
        let mut ticket_ceiling = first_ticket.price();
        let mut hotel_ceiling = first_hotel.price();

        for _ in 1..count {
            // A saturated ceiling already lies above every real price.
            let settings = &self.settings;
            ticket_ceiling = raise_ceiling(ticket_ceiling, settings.unbounded_ticket_multiplier);
            hotel_ceiling = raise_ceiling(hotel_ceiling, settings.unbounded_hotel_multiplier);

            let ticket = select_window(tickets, Some(ticket_ceiling), 1);
            let hotel = select_window(hotels, Some(hotel_ceiling), 1);
            if let (Some(ticket), Some(hotel)) = (ticket.first(), hotel.first()) {
                routes.push(build_route(request, ticket, hotel));
            }
        }

        routes
    }

    fn budget_routes(
        &self,
        request: &TripRequest,
        budget: Decimal,
        tickets: &[TicketOffer],
        hotels: &[HotelOffer],
    ) -> Vec<Route> {
        let count = request.route_count;
        let (Some(first_ticket), Some(first_hotel)) = (tickets.first(), hotels.first()) else {
            return Vec::new();
        };
        let min_ticket = first_ticket.price();
        let min_hotel = first_hotel.price();

        let ticket_share = min_ticket.checked_div(min_ticket + min_hotel).unwrap_or(Decimal::ZERO);
        let ticket_budget =
            (self.settings.ticket_share_factor * ticket_share * budget).max(min_ticket);
        let ticket_window = select_window(tickets, Some(ticket_budget), count);

        let Some(median_ticket) = ticket_window.get(ticket_window.len() / 2) else {
            return Vec::new();
        };
        let hotel_budget = budget - median_ticket.price();
        let hotel_window = select_window(hotels, Some(hotel_budget), count);

        let slots = ticket_window.len().max(hotel_window.len());
        let ticket_window = pad_with_last(ticket_window, slots);
        let hotel_window = pad_with_last(hotel_window, slots);

        // Mirror pairing: the cheapest ticket goes with the priciest hotel.
        (0..slots)
            .filter_map(|index| {
                let ticket = ticket_window.get(index)?;
                let hotel = hotel_window.get(slots - 1 - index)?;
                Some(build_route(request, ticket, hotel))
            })
            .collect()
    }
}

fn raise_ceiling(ceiling: Decimal, multiplier: Decimal) -> Decimal {
    ceiling.checked_mul(multiplier).unwrap_or(ceiling)
}

fn pad_with_last<T: Clone>(mut items: Vec<T>, len: usize) -> Vec<T> {
    if let Some(last) = items.last().cloned() {
        items.resize(len, last);
    }
    items
}

fn build_route(request: &TripRequest, ticket: &TicketOffer, hotel: &HotelOffer) -> Route {
    Route {
        origin: request.origin.clone(),
        destination: request.destination.clone(),
        departure_at: request.departure_at,
        return_at: request.return_at,
        budget: request.budget,
        ticket: Some(ticket.clone()),
        hotel: Some(hotel.clone()),
    }
}
