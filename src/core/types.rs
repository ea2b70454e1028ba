use serde::Serialize;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ContributionPolicy {
    AllTraditional,
    AllRoth,
    SplitEvenly,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReturnModel {
    HistoricalResample,
    ParametricCorrelated,
    ParametricCustom,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WithdrawalModel {
    FixedReal,
    PercentOfPortfolio,
    LifeExpectancyDivisor,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AssetAssumption {
    pub mean: f64,
    pub std_dev: f64,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ReturnAssumptions {
    pub stocks: AssetAssumption,
    pub bonds: AssetAssumption,
    pub cash: AssetAssumption,
}

#[derive(Debug, Clone)]
pub struct SimulationParameters {
    pub current_age: u32,
    pub retirement_age: u32,
    pub life_expectancy: u32,
    pub traditional_start: f64,
    pub roth_start: f64,
    pub taxable_start: f64,
    pub annual_contribution: f64,
    pub contribution_policy: ContributionPolicy,
    pub annual_spending: f64,
    pub benefit_base: f64,
    pub benefit_claiming_age: u32,
    pub stock_allocation_pct: f64,
    pub bond_allocation_pct: f64,
    pub glide_path: bool,
    pub inflation_rate: f64,
    pub healthcare_enabled: bool,
    pub healthcare_base_cost: f64,
    pub return_model: ReturnModel,
    pub custom_assumptions: Option<ReturnAssumptions>,
    pub withdrawal_model: WithdrawalModel,
    pub withdrawal_rate_pct: f64,
    /// Accepted for interface compatibility; withdrawals are not taxed yet.
    pub tax_rate: f64,
    pub current_year: i32,
    pub seed: u64,
}

impl SimulationParameters {
    pub fn birth_year(&self) -> i32 {
        self.current_year - self.current_age as i32
    }

    pub fn projection_years(&self) -> u32 {
        self.life_expectancy.saturating_sub(self.current_age)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SinglePathResult {
    pub success: bool,
    pub final_balance: f64,
    pub yearly_balances: Vec<f64>,
    pub depletion_age: Option<u32>,
    pub final_traditional: f64,
    pub final_roth: f64,
    pub final_taxable: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearBand {
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub mean: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonteCarloSummary {
    pub trials: u32,
    pub successes: u32,
    pub success_rate: f64,
    pub final_balance_p10: f64,
    pub final_balance_p25: f64,
    pub final_balance_p50: f64,
    pub final_balance_p75: f64,
    pub final_balance_p90: f64,
    pub yearly_bands: Vec<YearBand>,
    pub mean_depletion_age: Option<f64>,
    pub depleted_trials: u32,
}
