use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::info;
use waypoint_core::config::{AppConfig, LoadOptions};
use waypoint_core::{ApplicationError, PlanStatus, RoutePlan, SearchFilters};
use waypoint_planner::{
    FixtureError, InventorySearch, JsonInventory, PlannerSettings, RouteBuilder, SearchSettings,
    TripRequest,
};

use crate::commands::{current_thread_runtime, load_config, new_correlation_id, CommandResult};
use crate::logging::init_logging;

#[derive(Debug, Clone, Args)]
pub struct PlanArgs {
    #[arg(long, help = "JSON inventory file with tickets, hotels and a hotel catalog")]
    pub inventory: PathBuf,
    #[arg(long, help = "Departure location code, e.g. KZN")]
    pub origin: String,
    #[arg(long, help = "Destination location code, e.g. MOW")]
    pub destination: String,
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub departure: NaiveDate,
    #[arg(long = "return", value_name = "YYYY-MM-DD")]
    pub return_at: NaiveDate,
    #[arg(long, help = "Total trip budget; omit to widen price ceilings instead")]
    pub budget: Option<Decimal>,
    #[arg(long, help = "Number of routes to build (defaults to planner.route_count)")]
    pub routes: Option<usize>,
    #[arg(long)]
    pub max_transfers: Option<u32>,
    #[arg(long = "airline", help = "Allowed airline code; repeat for several")]
    pub airlines: Vec<String>,
    #[arg(long, default_value_t = 0)]
    pub min_stars: u8,
}

impl PlanArgs {
    fn trip_request(&self, config: &AppConfig) -> TripRequest {
        let mut filters = SearchFilters::default();
        filters.tickets.max_transfers = self.max_transfers;
        filters.tickets.allowed_airlines = self.airlines.iter().cloned().collect();
        filters.hotels.min_stars = self.min_stars;

        TripRequest {
            origin: self.origin.clone(),
            destination: self.destination.clone(),
            departure_at: self.departure,
            return_at: self.return_at,
            budget: self.budget,
            route_count: config.planner.route_count,
            filters,
        }
    }
}

/// Route builder over a fixture inventory, configured from `config`.
pub fn route_builder(config: &AppConfig, inventory: &Path) -> Result<RouteBuilder, FixtureError> {
    let inventory = Arc::new(JsonInventory::from_path(inventory)?);
    let search = InventorySearch::new(
        inventory.clone(),
        inventory.clone(),
        inventory,
        SearchSettings::from(&config.inventory),
    );
    Ok(RouteBuilder::new(search, PlannerSettings::from(&config.planner)))
}

/// Maps an empty-side plan to the application error it represents.
pub fn plan_error(plan: &RoutePlan) -> Option<ApplicationError> {
    match plan.status {
        PlanStatus::NoOptions { missing } => Some(ApplicationError::EmptyInventory(missing)),
        _ => None,
    }
}

pub fn run(mut options: LoadOptions, args: PlanArgs) -> CommandResult {
    // `--routes` goes through the same range check as planner.route_count.
    if args.routes.is_some() {
        options.overrides.route_count = args.routes;
    }
    let config = match load_config("plan", options) {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    init_logging(&config);

    let builder = match route_builder(&config, &args.inventory) {
        Ok(builder) => builder,
        Err(error) => return CommandResult::failure("plan", "inventory", error.to_string(), 4),
    };
    let runtime = match current_thread_runtime("plan") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let correlation_id = new_correlation_id();
    let request = args.trip_request(&config);
    let plan = match runtime.block_on(builder.find_top_routes(&request)) {
        Ok(plan) => plan,
        Err(error) => {
            let error = ApplicationError::Transport(error.to_string());
            return CommandResult::application_failure("plan", error, &correlation_id);
        }
    };

    if let Some(error) = plan_error(&plan) {
        return CommandResult::application_failure("plan", error, &correlation_id);
    }

    info!(
        event_name = "cli.plan.completed",
        correlation_id = %correlation_id,
        origin = %request.origin,
        destination = %request.destination,
        routes = plan.routes.len(),
        "route plan built"
    );
    let message = format!("built {} route(s)", plan.routes.len());
    CommandResult::success_with("plan", message, Some(json!({ "plan": plan })))
}
