use garde::Validate;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Json},
    model::{Implementation, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ServerHandler,
};
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::RunConfig;
use crate::engine::types::{OptionType, QuoteSide, SurfaceConfig};
use crate::tools;
use crate::tools::compare::CompareEntry;
use crate::tools::load_data::LoadedQuotes;
use crate::tools::response_types::{
    CompareResponse, LoadDataResponse, PriceOptionResponse, SimulationResponse,
    StrategiesResponse,
};
use crate::tools::surface::Lookup;

const NO_DATA: &str = "Error: No data loaded. Call load_data first.";

fn validate_config_source(
    config_path: &Option<String>,
) -> impl FnOnce(&Option<RunConfig>, &()) -> garde::Result + '_ {
    move |config: &Option<RunConfig>, (): &()| match (config, config_path) {
        (Some(_), Some(_)) => Err(garde::Error::new(
            "give either config or config_path, not both",
        )),
        (None, None) => Err(garde::Error::new("one of config or config_path is required")),
        _ => Ok(()),
    }
}

#[derive(Clone)]
pub struct OptsimServer {
    pub data: Arc<RwLock<Option<LoadedQuotes>>>,
    tool_router: ToolRouter<Self>,
}

impl Default for OptsimServer {
    fn default() -> Self {
        Self::new()
    }
}

impl OptsimServer {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(None)),
            tool_router: Self::tool_router(),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct LoadDataParams {
    /// Path to a Parquet file of option quote snapshots
    #[garde(length(min = 1))]
    pub file_path: String,
    /// Start filter (YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS)
    #[garde(inner(pattern(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}(T[0-9]{2}:[0-9]{2}:[0-9]{2})?$")))]
    pub start_date: Option<String>,
    /// End filter (YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS)
    #[garde(inner(pattern(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}(T[0-9]{2}:[0-9]{2}:[0-9]{2})?$")))]
    pub end_date: Option<String>,
    /// Surface settings for the cached timeline (defaults apply when omitted)
    #[serde(default)]
    #[garde(dive)]
    pub surface: SurfaceConfig,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct PriceOptionParams {
    /// Pricing time (YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS); the latest snapshot at or before it is used
    #[garde(pattern(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}(T[0-9]{2}:[0-9]{2}:[0-9]{2})?$"))]
    pub time: String,
    #[garde(skip)]
    pub option_type: OptionType,
    /// Quote side the surface is fitted on (default mark)
    #[garde(skip)]
    pub side: Option<QuoteSide>,
    /// Meaning of target: strike, moneyness, delta or price
    #[garde(skip)]
    pub lookup: Lookup,
    #[garde(skip)]
    pub target: f64,
    /// Days to expiry
    #[garde(range(min = 0.0001, max = 3650.0))]
    pub days: f64,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct RunSimulationParams {
    /// Inline run configuration
    #[garde(dive, custom(validate_config_source(&self.config_path)))]
    pub config: Option<RunConfig>,
    /// Path to a TOML run configuration
    #[garde(inner(length(min = 1)))]
    pub config_path: Option<String>,
    /// Directory for timeline.parquet and actions.parquet
    #[garde(inner(length(min = 1)))]
    pub output_dir: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CompareSimulationsParams {
    /// Run configurations to simulate side by side
    #[garde(length(min = 2, max = 32), dive)]
    pub runs: Vec<CompareEntry>,
}

use rmcp::handler::server::wrapper::Parameters;

#[tool_router]
impl OptsimServer {
    /// Load option quote snapshots from a Parquet file. **START HERE.**
    ///
    /// **Workflow Phase**: 1/4 (entry point)
    /// **When to use**: Before any pricing or simulation
    /// **Prerequisites**: None
    /// **Columns**: timestamp (or quote_datetime), expiration (or expiry), type,
    ///   strike, bid_price, mark_price, ask_price, underlying_price, and optionally
    ///   iv_ratio and spot_ratio. Prices are fractions of the underlying price.
    /// **Next tools**: price_option() or run_simulation()
    ///
    /// Quotes are grouped into one volatility surface per timestamp. Data before
    /// a simulation start is used to fill forward the first steps.
    #[tool(name = "load_data")]
    async fn load_data(
        &self,
        Parameters(params): Parameters<LoadDataParams>,
    ) -> Result<Json<LoadDataResponse>, String> {
        params
            .validate()
            .map_err(|e| format!("Validation error: {e}"))?;
        tools::load_data::execute(
            &self.data,
            &params.file_path,
            params.start_date.as_deref(),
            params.end_date.as_deref(),
            params.surface,
        )
        .await
        .map(Json)
        .map_err(|e| format!("Error: {e:#}"))
    }

    /// Browse the built-in trading strategies and their categories.
    ///
    /// **Workflow Phase**: 2/4 (exploration)
    /// **Prerequisites**: None (informational, no data required)
    /// **Next tools**: run_simulation() with a strategy config such as
    ///   `{ "strategy": "option_selling", "trade_interval": "1d" }`
    #[tool(name = "list_strategies")]
    async fn list_strategies(&self) -> Json<StrategiesResponse> {
        Json(tools::strategies::execute())
    }

    /// Price an option off the implied-volatility surface of the loaded data.
    ///
    /// **Workflow Phase**: 2/4 (exploration)
    /// **Prerequisites**: load_data() must have been called first
    /// **Lookups**: strike, moneyness (negative is out of the money), delta
    ///   (signed: calls in (0,1), puts in (-1,0)), or price (solves for the strike)
    #[tool(name = "price_option")]
    async fn price_option(
        &self,
        Parameters(params): Parameters<PriceOptionParams>,
    ) -> Result<Json<PriceOptionResponse>, String> {
        params
            .validate()
            .map_err(|e| format!("Validation error: {e}"))?;
        let time = tools::load_data::parse_time(&params.time).map_err(|e| format!("Error: {e}"))?;
        let data = self.data.read().await;
        let Some(loaded) = data.as_ref() else {
            return Err(NO_DATA.to_string());
        };
        tools::surface::execute(
            loaded,
            time,
            params.option_type,
            params.side.unwrap_or(QuoteSide::Mark),
            params.lookup,
            params.target,
            params.days,
        )
        .map(Json)
        .map_err(|e| format!("Error: {e:#}"))
    }

    /// Step a portfolio through time, letting one or more strategies trade
    /// against the loaded surfaces.
    ///
    /// **Workflow Phase**: 3/4 (simulation)
    /// **Prerequisites**: load_data() must have been called
    /// **Input**: either an inline `config` or a TOML `config_path`, each with a
    ///   `simulation` window (start, end, time_step, starting_capital), a list of
    ///   `strategies`, and an optional `timing_signal` switching between them
    /// **Each step**: liquidation of under-collateralised shorts, expiration
    ///   settlement, the active strategy, then the timeline snapshot
    /// **Window**: start at or after the first loaded snapshot; a step with no
    ///   snapshot at or before it fails the run with a no-quote-data error
    /// **Output**: metrics against a buy-and-hold benchmark, sampled timeline,
    ///   full action log, and optional Parquet exports
    #[tool(name = "run_simulation")]
    async fn run_simulation(
        &self,
        Parameters(params): Parameters<RunSimulationParams>,
    ) -> Result<Json<SimulationResponse>, String> {
        params
            .validate()
            .map_err(|e| format!("Validation error: {e}"))?;
        let config = match (params.config, params.config_path.as_deref()) {
            (Some(config), _) => config,
            (None, Some(path)) => {
                RunConfig::from_toml_file(path).map_err(|e| format!("Error: {e:#}"))?
            }
            (None, None) => return Err("Validation error: no run configuration".to_string()),
        };

        let data = self.data.read().await;
        let Some(loaded) = data.as_ref() else {
            return Err(NO_DATA.to_string());
        };
        tools::simulate::execute(loaded, &config, params.output_dir.as_deref())
            .map(Json)
            .map_err(|e| format!("Error: {e:#}"))
    }

    /// Run several simulations in parallel and rank them.
    ///
    /// **Workflow Phase**: 4/4 (comparison)
    /// **Prerequisites**: load_data() must have been called
    /// **Rankings**: by Sharpe ratio (primary) and total return
    /// **Failures**: a run that fails is reported with its error; the others still complete
    #[tool(name = "compare_simulations")]
    async fn compare_simulations(
        &self,
        Parameters(params): Parameters<CompareSimulationsParams>,
    ) -> Result<Json<CompareResponse>, String> {
        params
            .validate()
            .map_err(|e| format!("Validation error: {e}"))?;
        let data = self.data.read().await;
        let Some(loaded) = data.as_ref() else {
            return Err(NO_DATA.to_string());
        };
        tools::compare::execute(loaded, &params.runs)
            .map(Json)
            .map_err(|e| format!("Error: {e:#}"))
    }
}

#[tool_handler]
impl ServerHandler for OptsimServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: rmcp::model::ProtocolVersion::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "optsim".into(),
                title: None,
                version: "0.1.0".into(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Option strategy simulator driven by implied-volatility surfaces.\
                \n\nRecommended workflow:\
                \n1. load_data({ file_path }) — load quote snapshots from Parquet; each \
                timestamp becomes one volatility surface.\
                \n2. list_strategies() — browse the strategies (option selling, rolling \
                selling/buying, married put, costless collar, iron condor).\
                \n3. price_option({ time, option_type, lookup, target, days }) — price an \
                option by strike, moneyness, delta or premium at a given time.\
                \n4. run_simulation({ config | config_path }) — simulate one or more \
                strategies stepwise; returns metrics against buy-and-hold, the timeline \
                and the action log.\
                \n5. compare_simulations({ runs: [...] }) — run several configurations in \
                parallel and rank them by Sharpe and total return."
                    .into(),
            ),
        }
    }
}
