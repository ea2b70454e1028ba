use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;

use crate::core::{
    AssetAssumption, ContributionPolicy, DEFAULT_TRIALS, GoalSolveConfig, GoalType,
    MonteCarloSummary, ReturnAssumptions, ReturnModel, SeededRng, SimulationParameters,
    SinglePathResult, WithdrawalModel, derive_seed, run_monte_carlo, simulate_path, solve_goal,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliContributionPolicy {
    AllTraditional,
    AllRoth,
    SplitEvenly,
}

impl From<CliContributionPolicy> for ContributionPolicy {
    fn from(value: CliContributionPolicy) -> Self {
        match value {
            CliContributionPolicy::AllTraditional => ContributionPolicy::AllTraditional,
            CliContributionPolicy::AllRoth => ContributionPolicy::AllRoth,
            CliContributionPolicy::SplitEvenly => ContributionPolicy::SplitEvenly,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliReturnModel {
    Historical,
    Parametric,
    ParametricCustom,
}

impl From<CliReturnModel> for ReturnModel {
    fn from(value: CliReturnModel) -> Self {
        match value {
            CliReturnModel::Historical => ReturnModel::HistoricalResample,
            CliReturnModel::Parametric => ReturnModel::ParametricCorrelated,
            CliReturnModel::ParametricCustom => ReturnModel::ParametricCustom,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliWithdrawalModel {
    FixedReal,
    PercentOfPortfolio,
    LifeExpectancyDivisor,
}

impl From<CliWithdrawalModel> for WithdrawalModel {
    fn from(value: CliWithdrawalModel) -> Self {
        match value {
            CliWithdrawalModel::FixedReal => WithdrawalModel::FixedReal,
            CliWithdrawalModel::PercentOfPortfolio => WithdrawalModel::PercentOfPortfolio,
            CliWithdrawalModel::LifeExpectancyDivisor => WithdrawalModel::LifeExpectancyDivisor,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiContributionPolicy {
    #[serde(alias = "allTraditional", alias = "all_traditional", alias = "traditional")]
    AllTraditional,
    #[serde(alias = "allRoth", alias = "all_roth", alias = "roth")]
    AllRoth,
    #[serde(alias = "splitEvenly", alias = "split_evenly", alias = "split")]
    SplitEvenly,
}

impl From<ApiContributionPolicy> for CliContributionPolicy {
    fn from(value: ApiContributionPolicy) -> Self {
        match value {
            ApiContributionPolicy::AllTraditional => CliContributionPolicy::AllTraditional,
            ApiContributionPolicy::AllRoth => CliContributionPolicy::AllRoth,
            ApiContributionPolicy::SplitEvenly => CliContributionPolicy::SplitEvenly,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiReturnModel {
    Historical,
    Parametric,
    #[serde(alias = "parametricCustom", alias = "parametric_custom", alias = "custom")]
    ParametricCustom,
}

impl From<ApiReturnModel> for CliReturnModel {
    fn from(value: ApiReturnModel) -> Self {
        match value {
            ApiReturnModel::Historical => CliReturnModel::Historical,
            ApiReturnModel::Parametric => CliReturnModel::Parametric,
            ApiReturnModel::ParametricCustom => CliReturnModel::ParametricCustom,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiWithdrawalModel {
    #[serde(alias = "fixedReal", alias = "fixed_real", alias = "fixed")]
    FixedReal,
    #[serde(alias = "percentOfPortfolio", alias = "percent_of_portfolio", alias = "percent")]
    PercentOfPortfolio,
    #[serde(
        alias = "lifeExpectancyDivisor",
        alias = "life_expectancy_divisor",
        alias = "divisor"
    )]
    LifeExpectancyDivisor,
}

impl From<ApiWithdrawalModel> for CliWithdrawalModel {
    fn from(value: ApiWithdrawalModel) -> Self {
        match value {
            ApiWithdrawalModel::FixedReal => CliWithdrawalModel::FixedReal,
            ApiWithdrawalModel::PercentOfPortfolio => CliWithdrawalModel::PercentOfPortfolio,
            ApiWithdrawalModel::LifeExpectancyDivisor => CliWithdrawalModel::LifeExpectancyDivisor,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiGoalType {
    #[serde(alias = "requiredContribution", alias = "required_contribution")]
    RequiredContribution,
    #[serde(alias = "maxSpending", alias = "max_spending")]
    MaxSpending,
}

impl From<ApiGoalType> for GoalType {
    fn from(value: ApiGoalType) -> Self {
        match value {
            ApiGoalType::RequiredContribution => GoalType::RequiredContribution,
            ApiGoalType::MaxSpending => GoalType::MaxSpending,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    current_age: Option<u32>,
    retirement_age: Option<u32>,
    life_expectancy: Option<u32>,
    current_year: Option<i32>,
    trials: Option<u32>,
    seed: Option<u64>,

    traditional_start: Option<f64>,
    roth_start: Option<f64>,
    taxable_start: Option<f64>,

    annual_contribution: Option<f64>,
    contribution_policy: Option<ApiContributionPolicy>,

    annual_spending: Option<f64>,
    withdrawal_model: Option<ApiWithdrawalModel>,
    withdrawal_rate: Option<f64>,

    benefit_base: Option<f64>,
    benefit_claiming_age: Option<u32>,

    stock_allocation: Option<f64>,
    bond_allocation: Option<f64>,
    glide_path: Option<bool>,

    inflation_rate: Option<f64>,
    healthcare_costs: Option<bool>,
    healthcare_base_cost: Option<f64>,

    return_model: Option<ApiReturnModel>,
    stock_mean: Option<f64>,
    stock_vol: Option<f64>,
    bond_mean: Option<f64>,
    bond_vol: Option<f64>,
    cash_mean: Option<f64>,
    cash_vol: Option<f64>,

    tax_rate: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SolvePayload {
    params: SimulatePayload,
    goal_type: Option<ApiGoalType>,
    target_success_rate: Option<f64>,
    search_min: Option<f64>,
    search_max: Option<f64>,
    tolerance: Option<f64>,
    max_iterations: Option<u32>,
    trials_per_iteration: Option<u32>,
    final_trials: Option<u32>,
}

#[derive(Parser, Debug)]
#[command(
    name = "nestegg",
    about = "Monte Carlo retirement projector (traditional + Roth + taxable accounts)"
)]
struct Cli {
    #[arg(long)]
    current_age: u32,
    #[arg(long, default_value_t = 67)]
    retirement_age: u32,
    #[arg(long, default_value_t = 92, help = "Age to fund through")]
    life_expectancy: u32,
    #[arg(
        long,
        default_value_t = 2026,
        help = "Calendar year the projection starts in; fixes the birth year"
    )]
    current_year: i32,
    #[arg(long, default_value_t = DEFAULT_TRIALS)]
    trials: u32,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    #[arg(long, default_value_t = 0.0)]
    traditional_start: f64,
    #[arg(long, default_value_t = 0.0)]
    roth_start: f64,
    #[arg(long, default_value_t = 0.0)]
    taxable_start: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Annual savings while working, in today's money"
    )]
    annual_contribution: f64,
    #[arg(long, value_enum, default_value_t = CliContributionPolicy::AllTraditional)]
    contribution_policy: CliContributionPolicy,
    #[arg(long, help = "Annual retirement spending target in today's money")]
    annual_spending: f64,
    #[arg(
        long,
        value_enum,
        default_value_t = CliWithdrawalModel::FixedReal,
        help = "Retirement withdrawal model: inflation-adjusted fixed, percent of portfolio, or remaining-years divisor"
    )]
    withdrawal_model: CliWithdrawalModel,
    #[arg(
        long,
        default_value_t = 4.0,
        help = "Annual withdrawal in percent of the portfolio, percent-of-portfolio model only"
    )]
    withdrawal_rate: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Annual benefit income in today's money at the reference claiming age"
    )]
    benefit_base: f64,
    #[arg(long, default_value_t = 67, help = "Age benefit income is claimed")]
    benefit_claiming_age: u32,
    #[arg(long, default_value_t = 60.0, help = "Stock allocation in percent")]
    stock_allocation: f64,
    #[arg(long, default_value_t = 30.0, help = "Bond allocation in percent")]
    bond_allocation: f64,
    #[arg(
        long,
        help = "Derisk the allocation with age instead of using the static split"
    )]
    glide_path: bool,
    #[arg(
        long,
        default_value_t = 2.5,
        help = "Expected annual inflation in percent"
    )]
    inflation_rate: f64,
    #[arg(long, help = "Track healthcare costs with 2% excess inflation")]
    healthcare_costs: bool,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Annual healthcare cost in today's money"
    )]
    healthcare_base_cost: f64,
    #[arg(
        long,
        value_enum,
        default_value_t = CliReturnModel::Historical,
        help = "Return model: resample joint historical years, or correlated parametric draws"
    )]
    return_model: CliReturnModel,
    #[arg(long, help = "Custom stock return mean in percent")]
    stock_mean: Option<f64>,
    #[arg(long, help = "Custom stock return volatility in percent")]
    stock_vol: Option<f64>,
    #[arg(long, help = "Custom bond return mean in percent")]
    bond_mean: Option<f64>,
    #[arg(long, help = "Custom bond return volatility in percent")]
    bond_vol: Option<f64>,
    #[arg(long, help = "Custom cash return mean in percent")]
    cash_mean: Option<f64>,
    #[arg(long, help = "Custom cash return volatility in percent")]
    cash_vol: Option<f64>,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Flat tax rate in percent; accepted but not yet applied to withdrawals"
    )]
    tax_rate: f64,
}

#[derive(Debug)]
struct ApiRequest {
    params: SimulationParameters,
    trials: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    seed: u64,
    trials: u32,
    summary: MonteCarloSummary,
    sample_path: SinglePathResult,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_params(cli: Cli) -> Result<SimulationParameters, String> {
    if cli.life_expectancy <= cli.current_age {
        return Err("--life-expectancy must be > --current-age".to_string());
    }

    if cli.retirement_age < cli.current_age {
        return Err("--retirement-age must be >= --current-age".to_string());
    }

    if cli.trials == 0 {
        return Err("--trials must be > 0".to_string());
    }

    for (name, value) in [
        ("--traditional-start", cli.traditional_start),
        ("--roth-start", cli.roth_start),
        ("--taxable-start", cli.taxable_start),
        ("--annual-contribution", cli.annual_contribution),
        ("--annual-spending", cli.annual_spending),
        ("--benefit-base", cli.benefit_base),
        ("--healthcare-base-cost", cli.healthcare_base_cost),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(format!("{name} must be >= 0"));
        }
    }

    for (name, value) in [
        ("--stock-allocation", cli.stock_allocation),
        ("--bond-allocation", cli.bond_allocation),
        ("--withdrawal-rate", cli.withdrawal_rate),
        ("--tax-rate", cli.tax_rate),
    ] {
        if !(0.0..=100.0).contains(&value) {
            return Err(format!("{name} must be between 0 and 100"));
        }
    }

    if cli.stock_allocation + cli.bond_allocation > 100.0 {
        return Err(
            "--stock-allocation plus --bond-allocation cannot exceed 100".to_string(),
        );
    }

    if !cli.inflation_rate.is_finite() || cli.inflation_rate <= -100.0 {
        return Err("--inflation-rate must be > -100".to_string());
    }

    let custom_assumptions = build_custom_assumptions(&cli)?;

    Ok(SimulationParameters {
        current_age: cli.current_age,
        retirement_age: cli.retirement_age,
        life_expectancy: cli.life_expectancy,
        traditional_start: cli.traditional_start,
        roth_start: cli.roth_start,
        taxable_start: cli.taxable_start,
        annual_contribution: cli.annual_contribution,
        contribution_policy: cli.contribution_policy.into(),
        annual_spending: cli.annual_spending,
        benefit_base: cli.benefit_base,
        benefit_claiming_age: cli.benefit_claiming_age,
        stock_allocation_pct: cli.stock_allocation,
        bond_allocation_pct: cli.bond_allocation,
        glide_path: cli.glide_path,
        inflation_rate: cli.inflation_rate / 100.0,
        healthcare_enabled: cli.healthcare_costs,
        healthcare_base_cost: cli.healthcare_base_cost,
        return_model: cli.return_model.into(),
        custom_assumptions,
        withdrawal_model: cli.withdrawal_model.into(),
        withdrawal_rate_pct: cli.withdrawal_rate,
        tax_rate: cli.tax_rate / 100.0,
        current_year: cli.current_year,
        seed: cli.seed,
    })
}

fn build_custom_assumptions(cli: &Cli) -> Result<Option<ReturnAssumptions>, String> {
    let fields = [
        ("--stock-mean", cli.stock_mean),
        ("--stock-vol", cli.stock_vol),
        ("--bond-mean", cli.bond_mean),
        ("--bond-vol", cli.bond_vol),
        ("--cash-mean", cli.cash_mean),
        ("--cash-vol", cli.cash_vol),
    ];

    let provided = fields.iter().filter(|(_, value)| value.is_some()).count();
    if provided == 0 {
        return Ok(None);
    }
    if provided < fields.len() {
        return Err(
            "custom return assumptions need all of --stock-mean, --stock-vol, --bond-mean, \
             --bond-vol, --cash-mean and --cash-vol"
                .to_string(),
        );
    }

    for (name, value) in [
        ("--stock-vol", cli.stock_vol),
        ("--bond-vol", cli.bond_vol),
        ("--cash-vol", cli.cash_vol),
    ] {
        let vol = value.expect("presence checked above");
        if !vol.is_finite() || vol < 0.0 {
            return Err(format!("{name} must be >= 0"));
        }
    }

    let class = |mean: Option<f64>, vol: Option<f64>| AssetAssumption {
        mean: mean.expect("presence checked above") / 100.0,
        std_dev: vol.expect("presence checked above") / 100.0,
    };

    Ok(Some(ReturnAssumptions {
        stocks: class(cli.stock_mean, cli.stock_vol),
        bonds: class(cli.bond_mean, cli.bond_vol),
        cash: class(cli.cash_mean, cli.cash_vol),
    }))
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route("/api/solve", post(solve_handler))
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    println!("nestegg HTTP API listening on http://{addr}");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    simulate_handler_impl(payload)
}

async fn simulate_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    simulate_handler_impl(payload)
}

fn simulate_handler_impl(payload: SimulatePayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    let summary = run_monte_carlo(&request.params, request.trials, None);
    let mut sample_rng = SeededRng::new(derive_seed(request.params.seed, 0));
    let sample_path = simulate_path(&request.params, &mut sample_rng);

    json_response(
        StatusCode::OK,
        SimulateResponse {
            seed: request.params.seed,
            trials: request.trials,
            summary,
            sample_path,
        },
    )
}

async fn solve_handler(Json(payload): Json<SolvePayload>) -> Response {
    let (params, config) = match solve_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    match solve_goal(&params, config) {
        Ok(result) => json_response(StatusCode::OK, result),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        "no-store".parse().expect("valid header"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn api_request_from_json(json: &str) -> Result<ApiRequest, String> {
    let payload = serde_json::from_str::<SimulatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload)
}

fn api_request_from_payload(payload: SimulatePayload) -> Result<ApiRequest, String> {
    let cli = overlay_cli(default_cli_for_api(), payload);
    let trials = cli.trials;
    let params = build_params(cli)?;
    Ok(ApiRequest { params, trials })
}

fn solve_request_from_payload(
    payload: SolvePayload,
) -> Result<(SimulationParameters, GoalSolveConfig), String> {
    let goal_type = payload
        .goal_type
        .ok_or_else(|| "goalType is required".to_string())?;
    let search_max = payload
        .search_max
        .ok_or_else(|| "searchMax is required".to_string())?;

    let request = api_request_from_payload(payload.params)?;
    let config = GoalSolveConfig {
        goal_type: goal_type.into(),
        target_success_rate: payload.target_success_rate.unwrap_or(90.0) / 100.0,
        search_min: payload.search_min.unwrap_or(0.0),
        search_max,
        tolerance: payload.tolerance.unwrap_or(100.0),
        max_iterations: payload.max_iterations.unwrap_or(32),
        trials_per_iteration: payload.trials_per_iteration.unwrap_or(1_000),
        final_trials: payload.final_trials.unwrap_or(request.trials),
    };

    Ok((request.params, config))
}

fn overlay_cli(mut cli: Cli, payload: SimulatePayload) -> Cli {
    if let Some(v) = payload.current_age {
        cli.current_age = v;
    }
    if let Some(v) = payload.retirement_age {
        cli.retirement_age = v;
    }
    if let Some(v) = payload.life_expectancy {
        cli.life_expectancy = v;
    }
    if let Some(v) = payload.current_year {
        cli.current_year = v;
    }
    if let Some(v) = payload.trials {
        cli.trials = v;
    }
    if let Some(v) = payload.seed {
        cli.seed = v;
    }

    if let Some(v) = payload.traditional_start {
        cli.traditional_start = v;
    }
    if let Some(v) = payload.roth_start {
        cli.roth_start = v;
    }
    if let Some(v) = payload.taxable_start {
        cli.taxable_start = v;
    }

    if let Some(v) = payload.annual_contribution {
        cli.annual_contribution = v;
    }
    if let Some(v) = payload.contribution_policy {
        cli.contribution_policy = v.into();
    }

    if let Some(v) = payload.annual_spending {
        cli.annual_spending = v;
    }
    if let Some(v) = payload.withdrawal_model {
        cli.withdrawal_model = v.into();
    }
    if let Some(v) = payload.withdrawal_rate {
        cli.withdrawal_rate = v;
    }

    if let Some(v) = payload.benefit_base {
        cli.benefit_base = v;
    }
    if let Some(v) = payload.benefit_claiming_age {
        cli.benefit_claiming_age = v;
    }

    if let Some(v) = payload.stock_allocation {
        cli.stock_allocation = v;
    }
    if let Some(v) = payload.bond_allocation {
        cli.bond_allocation = v;
    }
    if let Some(v) = payload.glide_path {
        cli.glide_path = v;
    }

    if let Some(v) = payload.inflation_rate {
        cli.inflation_rate = v;
    }
    if let Some(v) = payload.healthcare_costs {
        cli.healthcare_costs = v;
    }
    if let Some(v) = payload.healthcare_base_cost {
        cli.healthcare_base_cost = v;
    }

    if let Some(v) = payload.return_model {
        cli.return_model = v.into();
    }
    if let Some(v) = payload.stock_mean {
        cli.stock_mean = Some(v);
    }
    if let Some(v) = payload.stock_vol {
        cli.stock_vol = Some(v);
    }
    if let Some(v) = payload.bond_mean {
        cli.bond_mean = Some(v);
    }
    if let Some(v) = payload.bond_vol {
        cli.bond_vol = Some(v);
    }
    if let Some(v) = payload.cash_mean {
        cli.cash_mean = Some(v);
    }
    if let Some(v) = payload.cash_vol {
        cli.cash_vol = Some(v);
    }

    if let Some(v) = payload.tax_rate {
        cli.tax_rate = v;
    }

    cli
}

fn default_cli_for_api() -> Cli {
    Cli {
        current_age: 35,
        retirement_age: 67,
        life_expectancy: 92,
        current_year: 2026,
        trials: DEFAULT_TRIALS,
        seed: 42,
        traditional_start: 0.0,
        roth_start: 0.0,
        taxable_start: 0.0,
        annual_contribution: 0.0,
        contribution_policy: CliContributionPolicy::AllTraditional,
        annual_spending: 60_000.0,
        withdrawal_model: CliWithdrawalModel::FixedReal,
        withdrawal_rate: 4.0,
        benefit_base: 0.0,
        benefit_claiming_age: 67,
        stock_allocation: 60.0,
        bond_allocation: 30.0,
        glide_path: false,
        inflation_rate: 2.5,
        healthcare_costs: false,
        healthcare_base_cost: 0.0,
        return_model: CliReturnModel::Historical,
        stock_mean: None,
        stock_vol: None,
        bond_mean: None,
        bond_vol: None,
        cash_mean: None,
        cash_vol: None,
        tax_rate: 0.0,
    }
}
