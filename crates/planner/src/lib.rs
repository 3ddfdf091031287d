pub mod fixture;
pub mod provider;
pub mod routes;
pub mod search;

pub use fixture::{FixtureError, JsonInventory};
pub use provider::{
    FlightProvider, HotelProvider, HotelQuery, HotelTypeFilter, ProviderError, TicketPage,
    TicketQuery,
};
pub use routes::{PlannerSettings, RouteBuilder, TripRequest};
pub use search::{InventorySearch, SearchSettings};
