use super::market::{self, RandomSource, SeededRng};
use super::tables;
use super::types::{
    ContributionPolicy, MonteCarloSummary, SimulationParameters, SinglePathResult, WithdrawalModel,
    YearBand,
};

pub const DEFAULT_TRIALS: u32 = 10_000;
const PROGRESS_BATCH: u32 = 1_000;
const HEALTHCARE_EXCESS_INFLATION: f64 = 0.02;
const DEPLETION_EPSILON: f64 = 1e-9;

pub trait ProgressObserver {
    fn on_progress(&mut self, percent_complete: u32);

    fn cancelled(&self) -> bool {
        false
    }
}

/// Adapter for plain closures that only want the percent updates.
pub struct ProgressFn<F: FnMut(u32)>(pub F);

impl<F: FnMut(u32)> ProgressObserver for ProgressFn<F> {
    fn on_progress(&mut self, percent_complete: u32) {
        (self.0)(percent_complete);
    }
}

#[derive(Debug, Clone, Copy)]
struct Accounts {
    traditional: f64,
    roth: f64,
    taxable: f64,
}

impl Accounts {
    fn total(&self) -> f64 {
        self.traditional + self.roth + self.taxable
    }

    fn apply_growth(&mut self, annual_return: f64) {
        let factor = 1.0 + annual_return;
        self.traditional = (self.traditional * factor).max(0.0);
        self.roth = (self.roth * factor).max(0.0);
        self.taxable = (self.taxable * factor).max(0.0);
    }
}

enum YearOutcome {
    Funded,
    Depleted,
}

pub fn simulate_path(params: &SimulationParameters, rng: &mut dyn RandomSource) -> SinglePathResult {
    let years = params.projection_years();

    let mut accounts = Accounts {
        traditional: params.traditional_start.max(0.0),
        roth: params.roth_start.max(0.0),
        taxable: params.taxable_start.max(0.0),
    };

    let mut yearly_balances = Vec::with_capacity(years as usize + 1);
    yearly_balances.push(accounts.total());

    let mut inflation_index = 1.0;
    let mut healthcare_cost = params.healthcare_base_cost;

    for year in 1..=years {
        let age = params.current_age + year;

        inflation_index *= 1.0 + params.inflation_rate;
        if params.healthcare_enabled {
            healthcare_cost *= 1.0 + params.inflation_rate + HEALTHCARE_EXCESS_INFLATION;
        }

        let outcome = advance_year(params, &mut accounts, age, inflation_index, healthcare_cost, rng);
        if let YearOutcome::Depleted = outcome {
            for _ in year..=years {
                yearly_balances.push(0.0);
            }
            return SinglePathResult {
                success: false,
                final_balance: 0.0,
                yearly_balances,
                depletion_age: Some(age),
                final_traditional: 0.0,
                final_roth: 0.0,
                final_taxable: 0.0,
            };
        }

        yearly_balances.push(accounts.total().max(0.0));
    }

    SinglePathResult {
        success: true,
        final_balance: accounts.total().max(0.0),
        yearly_balances,
        depletion_age: None,
        final_traditional: accounts.traditional,
        final_roth: accounts.roth,
        final_taxable: accounts.taxable,
    }
}

fn advance_year(
    params: &SimulationParameters,
    accounts: &mut Accounts,
    age: u32,
    inflation_index: f64,
    healthcare_cost: f64,
    rng: &mut dyn RandomSource,
) -> YearOutcome {
    // Growth lands before any withdrawal for the year.
    let allocation = market::allocation_for_age(params, age);
    let returns = market::sample_returns(params, rng);
    accounts.apply_growth(allocation.blended_return(&returns));

    if age < params.retirement_age {
        contribute(params, accounts, inflation_index);
        return YearOutcome::Funded;
    }

    let mut spending = spending_for_year(params, accounts, age, inflation_index);
    if params.healthcare_enabled {
        spending += healthcare_cost;
    }

    let benefit = tables::benefit_income(params.benefit_base, params.benefit_claiming_age, age)
        * inflation_index;
    let need = (spending - benefit).max(0.0);

    // The mandatory distribution leaves the traditional account no matter
    // what the year's need is; an overshoot is not reinvested.
    let mandatory = tables::required_distribution(age, accounts.traditional, params.birth_year());
    accounts.traditional = (accounts.traditional - mandatory).max(0.0);

    let remaining = draw_down(accounts, need - mandatory);
    if remaining > DEPLETION_EPSILON {
        YearOutcome::Depleted
    } else {
        YearOutcome::Funded
    }
}

fn spending_for_year(
    params: &SimulationParameters,
    accounts: &Accounts,
    age: u32,
    inflation_index: f64,
) -> f64 {
    match params.withdrawal_model {
        WithdrawalModel::FixedReal => params.annual_spending * inflation_index,
        WithdrawalModel::PercentOfPortfolio => {
            accounts.total() * params.withdrawal_rate_pct / 100.0
        }
        WithdrawalModel::LifeExpectancyDivisor => {
            let remaining_years = params.life_expectancy as i64 - age as i64;
            if remaining_years <= 0 {
                accounts.total()
            } else {
                accounts.total() / remaining_years as f64
            }
        }
    }
}

// Fixed priority: taxable, then traditional, then Roth. Returns the need
// still unmet after all three accounts.
fn draw_down(accounts: &mut Accounts, required: f64) -> f64 {
    let mut remaining = required;
    if remaining <= 0.0 {
        return remaining;
    }

    let from_taxable = accounts.taxable.min(remaining);
    accounts.taxable -= from_taxable;
    remaining -= from_taxable;

    let from_traditional = accounts.traditional.min(remaining);
    accounts.traditional -= from_traditional;
    remaining -= from_traditional;

    let from_roth = accounts.roth.min(remaining);
    accounts.roth -= from_roth;
    remaining -= from_roth;

    remaining
}

fn contribute(params: &SimulationParameters, accounts: &mut Accounts, inflation_index: f64) {
    let contribution = (params.annual_contribution * inflation_index).max(0.0);
    match params.contribution_policy {
        ContributionPolicy::AllTraditional => accounts.traditional += contribution,
        ContributionPolicy::AllRoth => accounts.roth += contribution,
        ContributionPolicy::SplitEvenly => {
            accounts.traditional += contribution / 2.0;
            accounts.roth += contribution / 2.0;
        }
    }
}

pub fn run_monte_carlo(
    params: &SimulationParameters,
    trials: u32,
    mut observer: Option<&mut dyn ProgressObserver>,
) -> MonteCarloSummary {
    let years = params.projection_years() as usize;

    let mut final_balances = Vec::with_capacity(trials as usize);
    let mut yearly_columns: Vec<Vec<f64>> = (0..=years)
        .map(|_| Vec::with_capacity(trials as usize))
        .collect();
    let mut successes = 0_u32;
    let mut depleted_trials = 0_u32;
    let mut depletion_age_sum = 0.0;
    let mut completed = 0_u32;

    for trial in 0..trials {
        let mut rng = SeededRng::new(market::derive_seed(params.seed, trial));
        let path = simulate_path(params, &mut rng);

        if path.success {
            successes += 1;
        } else {
            depleted_trials += 1;
            if let Some(age) = path.depletion_age {
                depletion_age_sum += age as f64;
            }
        }

        final_balances.push(path.final_balance);
        for (column, balance) in yearly_columns.iter_mut().zip(path.yearly_balances.iter()) {
            column.push(*balance);
        }

        completed = trial + 1;
        if completed % PROGRESS_BATCH == 0 {
            if let Some(observer) = observer.as_deref_mut() {
                observer.on_progress(percent_complete(completed, trials));
                if observer.cancelled() {
                    break;
                }
            }
        }
    }

    summarize(
        completed,
        successes,
        depleted_trials,
        depletion_age_sum,
        final_balances,
        yearly_columns,
    )
}

fn percent_complete(completed: u32, trials: u32) -> u32 {
    ((completed as f64 / trials.max(1) as f64) * 100.0).round() as u32
}

fn summarize(
    trials: u32,
    successes: u32,
    depleted_trials: u32,
    depletion_age_sum: f64,
    mut final_balances: Vec<f64>,
    yearly_columns: Vec<Vec<f64>>,
) -> MonteCarloSummary {
    final_balances.sort_by(|a, b| a.total_cmp(b));

    let yearly_bands = yearly_columns
        .into_iter()
        .map(|mut column| {
            column.sort_by(|a, b| a.total_cmp(b));
            let mean = if column.is_empty() {
                0.0
            } else {
                column.iter().sum::<f64>() / column.len() as f64
            };
            YearBand {
                p10: percentile(&column, 10.0),
                p25: percentile(&column, 25.0),
                p50: percentile(&column, 50.0),
                p75: percentile(&column, 75.0),
                p90: percentile(&column, 90.0),
                mean,
            }
        })
        .collect();

    let success_rate = if trials == 0 {
        0.0
    } else {
        successes as f64 / trials as f64
    };
    let mean_depletion_age = if depleted_trials > 0 {
        Some(depletion_age_sum / depleted_trials as f64)
    } else {
        None
    };

    MonteCarloSummary {
        trials,
        successes,
        success_rate,
        final_balance_p10: percentile(&final_balances, 10.0),
        final_balance_p25: percentile(&final_balances, 25.0),
        final_balance_p50: percentile(&final_balances, 50.0),
        final_balance_p75: percentile(&final_balances, 75.0),
        final_balance_p90: percentile(&final_balances, 90.0),
        yearly_bands,
        mean_depletion_age,
        depleted_trials,
    }
}

// Nearest-rank percentile over an ascending-sorted sample.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }

    let index = ((p / 100.0) * sorted.len() as f64).floor() as usize;
    sorted[index.min(sorted.len() - 1)]
}
