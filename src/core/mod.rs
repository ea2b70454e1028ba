mod engine;
mod market;
mod solver;
mod tables;
mod types;

pub use engine::{DEFAULT_TRIALS, ProgressFn, ProgressObserver, run_monte_carlo, simulate_path};
pub use market::{
    Allocation, AssetReturns, DEFAULT_ASSUMPTIONS, RandomSource, SeededRng, STOCK_BOND_CORRELATION,
    allocation_for_age, derive_seed, sample_returns,
};
pub use solver::{GoalSolveConfig, GoalSolveIteration, GoalSolveResult, GoalType, solve_goal};
pub use tables::{
    benefit_income, claiming_adjustment, distribution_start_age, required_distribution,
};
pub use types::{
    AssetAssumption, ContributionPolicy, MonteCarloSummary, ReturnAssumptions, ReturnModel,
    SimulationParameters, SinglePathResult, WithdrawalModel, YearBand,
};
