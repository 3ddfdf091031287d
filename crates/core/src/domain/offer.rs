use std::collections::BTreeSet;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryKind {
    Tickets,
    Hotels,
}

impl std::fmt::Display for InventoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tickets => f.write_str("tickets"),
            Self::Hotels => f.write_str("hotels"),
        }
    }
}

/// Anything that can be placed on a price-ascending shelf.
pub trait Priced {
    fn price(&self) -> Decimal;
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TicketKey {
    pub airline: String,
    pub flight_number: String,
    pub departure_at: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TicketOffer {
    pub origin: String,
    pub destination: String,
    #[serde(default)]
    pub origin_airport: String,
    #[serde(default)]
    pub destination_airport: String,
    pub price: Decimal,
    pub airline: String,
    pub flight_number: String,
    pub departure_at: String,
    #[serde(default)]
    pub return_at: Option<String>,
    #[serde(default)]
    pub transfers: u32,
    #[serde(default)]
    pub return_transfers: u32,
    #[serde(default)]
    pub duration: u32,
    #[serde(default)]
    pub duration_to: u32,
    #[serde(default)]
    pub duration_back: u32,
    #[serde(default)]
    pub link: String,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "rub".to_string()
}

impl TicketOffer {
    pub fn key(&self) -> TicketKey {
        TicketKey {
            airline: self.airline.clone(),
            flight_number: self.flight_number.clone(),
            departure_at: self.departure_at.clone(),
        }
    }
}

impl Priced for TicketOffer {
    fn price(&self) -> Decimal {
        self.price
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HotelOffer {
    pub location_id: i64,
    pub hotel_id: i64,
    pub hotel_name: String,
    #[serde(default)]
    pub stars: u8,
    pub price_from: Decimal,
    #[serde(default)]
    pub price_avg: Decimal,
    #[serde(default)]
    pub city_name: String,
    #[serde(default)]
    pub country: String,
}

impl Priced for HotelOffer {
    fn price(&self) -> Decimal {
        self.price_from
    }
}

/// Hard constraints applied to tickets before any windowing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketFilters {
    pub max_transfers: Option<u32>,
    #[serde(default)]
    pub allowed_airlines: BTreeSet<String>,
    pub max_leg_duration_minutes: Option<u32>,
}

impl TicketFilters {
    pub fn admits(&self, ticket: &TicketOffer) -> bool {
        if let Some(max_transfers) = self.max_transfers {
            if ticket.transfers > max_transfers || ticket.return_transfers > max_transfers {
                return false;
            }
        }

        if !self.allowed_airlines.is_empty() && !self.allowed_airlines.contains(&ticket.airline) {
            return false;
        }

        if let Some(max_leg) = self.max_leg_duration_minutes {
            let longest_leg = ticket.duration_to.max(ticket.duration_back);
            if longest_leg > max_leg {
                return false;
            }
        }

        true
    }
}

/// Hard constraints applied to hotels before any windowing. Property types
/// default to the configured inventory set when left empty.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotelFilters {
    #[serde(default)]
    pub min_stars: u8,
    #[serde(default)]
    pub property_types: BTreeSet<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default)]
    pub tickets: TicketFilters,
    #[serde(default)]
    pub hotels: HotelFilters,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteKey {
    pub ticket: Option<TicketKey>,
    pub hotel_id: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub origin: String,
    pub destination: String,
    pub departure_at: NaiveDate,
    pub return_at: NaiveDate,
    pub budget: Option<Decimal>,
    pub ticket: Option<TicketOffer>,
    pub hotel: Option<HotelOffer>,
}

impl Route {
    pub fn key(&self) -> RouteKey {
        RouteKey {
            ticket: self.ticket.as_ref().map(TicketOffer::key),
            hotel_id: self.hotel.as_ref().map(|hotel| hotel.hotel_id),
        }
    }

    pub fn total_cost(&self) -> Decimal {
        let ticket = self.ticket.as_ref().map(|ticket| ticket.price).unwrap_or_default();
        let hotel = self.hotel.as_ref().map(|hotel| hotel.price_from).unwrap_or_default();
        ticket + hotel
    }

    pub fn summary(&self) -> String {
        let flight = match &self.ticket {
            Some(ticket) => format!(
                "Flight: {} to {}, departing {}, airline {} {}, price {} {}, transfers {}/{}, duration {} min",
                ticket.origin,
                ticket.destination,
                ticket.departure_at,
                ticket.airline,
                ticket.flight_number,
                ticket.price,
                ticket.currency,
                ticket.transfers,
                ticket.return_transfers,
                ticket.duration
            ),
            None => "No information about ticket".to_string(),
        };
        let hotel = match &self.hotel {
            Some(hotel) => format!(
                "Hotel: {}, {} stars, {} {}, price from {}",
                hotel.hotel_name, hotel.stars, hotel.city_name, hotel.country, hotel.price_from
            ),
            None => "No information about hotel".to_string(),
        };

        format!("Route from {} to {}:\n{flight}\n{hotel}", self.origin, self.destination)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlanStatus {
    WithinBudget,
    Unbounded,
    OverBudget,
    NoOptions { missing: InventoryKind },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutePlan {
    #[serde(flatten)]
    pub status: PlanStatus,
    pub routes: Vec<Route>,
}

impl RoutePlan {
    pub fn no_options(missing: InventoryKind) -> Self {
        Self { status: PlanStatus::NoOptions { missing }, routes: Vec::new() }
    }

    pub fn is_over_budget(&self) -> bool {
        matches!(self.status, PlanStatus::OverBudget)
    }
}
