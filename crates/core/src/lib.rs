pub mod config;
pub mod conversation;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod inventory;
pub mod verify;

pub use conversation::ConversationState;
pub use domain::offer::{
    HotelFilters, HotelOffer, InventoryKind, PlanStatus, Priced, Route, RouteKey, RoutePlan,
    SearchFilters, TicketFilters, TicketKey, TicketOffer,
};
pub use domain::request::{
    ExtractionResult, FieldStatus, RequestField, StructuredQuery, NOT_FOUND_SENTINEL,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{ConversationFlow, FlowEngine, FlowState};
pub use verify::{CrossFieldError, CrossFieldRule, CrossFieldVerifier, FieldVerifier, VerifierSet};
