use serde::Serialize;

use super::engine::run_monte_carlo;
use super::types::SimulationParameters;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GoalType {
    RequiredContribution,
    MaxSpending,
}

#[derive(Debug, Clone, Copy)]
pub struct GoalSolveConfig {
    pub goal_type: GoalType,
    pub target_success_rate: f64,
    pub search_min: f64,
    pub search_max: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
    pub trials_per_iteration: u32,
    pub final_trials: u32,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalSolveIteration {
    pub iteration: u32,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub candidate_value: f64,
    pub success_rate: f64,
    pub success_ci_half_width: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalSolveResult {
    pub goal_type: GoalType,
    pub target_success_rate: f64,
    pub search_min: f64,
    pub search_max: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
    pub trials_per_iteration: u32,
    pub final_trials: u32,
    pub solved_value: Option<f64>,
    pub achieved_success_rate: Option<f64>,
    pub achieved_success_ci_half_width: Option<f64>,
    pub iterations: Vec<GoalSolveIteration>,
    pub converged: bool,
    pub feasible: bool,
    pub message: String,
}

pub fn solve_goal(
    params: &SimulationParameters,
    config: GoalSolveConfig,
) -> Result<GoalSolveResult, String> {
    validate_config(config)?;

    let mut iterations = Vec::with_capacity(config.max_iterations as usize);
    let low_eval = evaluate_candidate(params, config, config.search_min);
    let high_eval = evaluate_candidate(params, config, config.search_max);

    let mut solved_value = None;
    let mut converged = false;
    let feasible;
    let message;

    match config.goal_type {
        GoalType::RequiredContribution => {
            if low_eval.success_rate + 1e-12 >= config.target_success_rate {
                solved_value = Some(config.search_min);
                converged = true;
                feasible = true;
                message = "Already meets target at the lower contribution bound.".to_string();
            } else if high_eval.success_rate + 1e-12 < config.target_success_rate {
                feasible = false;
                message = "No feasible contribution found within the search bounds.".to_string();
            } else {
                let mut lo = config.search_min;
                let mut hi = config.search_max;
                let mut it = 0;
                while it < config.max_iterations {
                    it += 1;
                    let mid = (lo + hi) * 0.5;
                    let eval = evaluate_candidate(params, config, mid);
                    iterations.push(GoalSolveIteration {
                        iteration: it,
                        lower_bound: lo,
                        upper_bound: hi,
                        candidate_value: mid,
                        success_rate: eval.success_rate,
                        success_ci_half_width: eval.success_ci_half_width,
                    });

                    if eval.success_rate + 1e-12 >= config.target_success_rate {
                        hi = mid;
                    } else {
                        lo = mid;
                    }

                    if (hi - lo).abs() <= config.tolerance {
                        converged = true;
                        solved_value = Some(hi);
                        break;
                    }
                }
                if solved_value.is_none() {
                    solved_value = Some(hi);
                }
                feasible = true;
                message = if converged {
                    "Solved required contribution.".to_string()
                } else {
                    "Reached max iterations before tolerance was met; returning best estimate."
                        .to_string()
                };
            }
        }
        GoalType::MaxSpending => {
            if low_eval.success_rate + 1e-12 < config.target_success_rate {
                feasible = false;
                message = "No feasible spending level found within the search bounds.".to_string();
            } else if high_eval.success_rate + 1e-12 >= config.target_success_rate {
                solved_value = Some(config.search_max);
                converged = true;
                feasible = true;
                message =
                    "Upper spending bound is still feasible; raise search max for a higher target."
                        .to_string();
            } else {
                let mut lo = config.search_min;
                let mut hi = config.search_max;
                let mut it = 0;
                while it < config.max_iterations {
                    it += 1;
                    let mid = (lo + hi) * 0.5;
                    let eval = evaluate_candidate(params, config, mid);
                    iterations.push(GoalSolveIteration {
                        iteration: it,
                        lower_bound: lo,
                        upper_bound: hi,
                        candidate_value: mid,
                        success_rate: eval.success_rate,
                        success_ci_half_width: eval.success_ci_half_width,
                    });

                    if eval.success_rate + 1e-12 >= config.target_success_rate {
                        lo = mid;
                    } else {
                        hi = mid;
                    }

                    if (hi - lo).abs() <= config.tolerance {
                        converged = true;
                        solved_value = Some(lo);
                        break;
                    }
                }
                if solved_value.is_none() {
                    solved_value = Some(lo);
                }
                feasible = true;
                message = if converged {
                    "Solved maximum sustainable spending.".to_string()
                } else {
                    "Reached max iterations before tolerance was met; returning best estimate."
                        .to_string()
                };
            }
        }
    }

    let mut achieved_success_rate = None;
    let mut achieved_success_ci_half_width = None;
    if let Some(value) = solved_value {
        let final_eval = evaluate_candidate(
            params,
            GoalSolveConfig {
                trials_per_iteration: config.final_trials,
                ..config
            },
            value,
        );
        achieved_success_rate = Some(final_eval.success_rate);
        achieved_success_ci_half_width = Some(final_eval.success_ci_half_width);
    }

    Ok(GoalSolveResult {
        goal_type: config.goal_type,
        target_success_rate: config.target_success_rate,
        search_min: config.search_min,
        search_max: config.search_max,
        tolerance: config.tolerance,
        max_iterations: config.max_iterations,
        trials_per_iteration: config.trials_per_iteration,
        final_trials: config.final_trials,
        solved_value,
        achieved_success_rate,
        achieved_success_ci_half_width,
        iterations,
        converged,
        feasible,
        message,
    })
}

#[derive(Debug, Clone, Copy)]
struct CandidateEval {
    success_rate: f64,
    success_ci_half_width: f64,
}

fn evaluate_candidate(
    base_params: &SimulationParameters,
    config: GoalSolveConfig,
    candidate_value: f64,
) -> CandidateEval {
    let mut params = base_params.clone();
    let trials = config.trials_per_iteration.max(1);

    match config.goal_type {
        GoalType::RequiredContribution => {
            params.annual_contribution = candidate_value.max(0.0);
        }
        GoalType::MaxSpending => {
            params.annual_spending = candidate_value.max(0.0);
        }
    }

    let summary = run_monte_carlo(&params, trials, None);
    CandidateEval {
        success_rate: summary.success_rate,
        success_ci_half_width: binomial_ci_half_width(summary.success_rate, trials),
    }
}

fn binomial_ci_half_width(p: f64, n: u32) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let p = p.clamp(0.0, 1.0);
    1.96 * (p * (1.0 - p) / n as f64).sqrt()
}

fn validate_config(config: GoalSolveConfig) -> Result<(), String> {
    if !(0.0..=1.0).contains(&config.target_success_rate) {
        return Err("target_success_rate must be between 0 and 1".to_string());
    }
    if !config.search_min.is_finite() || !config.search_max.is_finite() {
        return Err("search bounds must be finite".to_string());
    }
    if config.search_max <= config.search_min {
        return Err("search_max must be greater than search_min".to_string());
    }
    if !config.tolerance.is_finite() || config.tolerance <= 0.0 {
        return Err("tolerance must be > 0".to_string());
    }
    if config.max_iterations == 0 {
        return Err("max_iterations must be > 0".to_string());
    }
    if config.trials_per_iteration == 0 {
        return Err("trials_per_iteration must be > 0".to_string());
    }
    if config.final_trials == 0 {
        return Err("final_trials must be > 0".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{
        AssetAssumption, ContributionPolicy, ReturnAssumptions, ReturnModel, WithdrawalModel,
    };

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn deterministic_params() -> SimulationParameters {
        let flat = AssetAssumption {
            mean: 0.0,
            std_dev: 0.0,
        };
        SimulationParameters {
            current_age: 30,
            retirement_age: 32,
            life_expectancy: 32,
            traditional_start: 0.0,
            roth_start: 0.0,
            taxable_start: 0.0,
            annual_contribution: 1.0,
            contribution_policy: ContributionPolicy::AllTraditional,
            annual_spending: 100.0,
            benefit_base: 0.0,
            benefit_claiming_age: 67,
            stock_allocation_pct: 60.0,
            bond_allocation_pct: 30.0,
            glide_path: false,
            inflation_rate: 0.0,
            healthcare_enabled: false,
            healthcare_base_cost: 0.0,
            return_model: ReturnModel::ParametricCustom,
            custom_assumptions: Some(ReturnAssumptions {
                stocks: flat,
                bonds: flat,
                cash: flat,
            }),
            withdrawal_model: WithdrawalModel::FixedReal,
            withdrawal_rate_pct: 4.0,
            tax_rate: 0.0,
            current_year: 2026,
            seed: 7,
        }
    }

    fn sample_config(goal_type: GoalType) -> GoalSolveConfig {
        GoalSolveConfig {
            goal_type,
            target_success_rate: 1.0,
            search_min: 0.0,
            search_max: 200.0,
            tolerance: 0.5,
            max_iterations: 24,
            trials_per_iteration: 1,
            final_trials: 1,
        }
    }

    #[test]
    fn required_contribution_solver_finds_deterministic_solution() {
        // One accumulating year at age 31; spending of 100 at age 32 succeeds
        // exactly when the contribution reaches 100.
        let params = deterministic_params();
        let config = sample_config(GoalType::RequiredContribution);

        let result = solve_goal(&params, config).expect("must solve");
        assert!(result.feasible);
        assert!(result.solved_value.is_some());
        assert_close(
            result.solved_value.expect("value expected"),
            100.0,
            config.tolerance + 0.5,
        );
        assert_close(
            result.achieved_success_rate.expect("rate expected"),
            1.0,
            1e-9,
        );
        assert!(!result.iterations.is_empty());
    }

    #[test]
    fn max_spending_solver_finds_deterministic_solution() {
        let mut params = deterministic_params();
        params.current_age = 65;
        params.retirement_age = 65;
        params.life_expectancy = 66;
        params.taxable_start = 500.0;
        params.annual_contribution = 0.0;

        let mut config = sample_config(GoalType::MaxSpending);
        config.search_max = 600.0;

        let result = solve_goal(&params, config).expect("must solve");
        assert!(result.feasible);
        assert_close(
            result.solved_value.expect("value expected"),
            500.0,
            config.tolerance + 0.5,
        );
    }

    #[test]
    fn required_contribution_solver_reports_infeasible_when_bounds_too_low() {
        let params = deterministic_params();
        let mut config = sample_config(GoalType::RequiredContribution);
        config.search_max = 50.0;
        config.max_iterations = 16;

        let result = solve_goal(&params, config).expect("must return result");
        assert!(!result.feasible);
        assert!(result.solved_value.is_none());
        assert!(result.achieved_success_rate.is_none());
    }

    #[test]
    fn max_spending_upper_bound_still_feasible_short_circuits() {
        let mut params = deterministic_params();
        params.current_age = 65;
        params.retirement_age = 65;
        params.life_expectancy = 66;
        params.taxable_start = 1_000.0;
        params.annual_contribution = 0.0;

        let mut config = sample_config(GoalType::MaxSpending);
        config.search_max = 600.0;

        let result = solve_goal(&params, config).expect("must solve");
        assert!(result.feasible);
        assert!(result.converged);
        assert_close(result.solved_value.expect("value expected"), 600.0, 1e-9);
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let params = deterministic_params();

        let mut config = sample_config(GoalType::MaxSpending);
        config.search_max = config.search_min;
        assert!(solve_goal(&params, config).is_err());

        let mut config = sample_config(GoalType::MaxSpending);
        config.tolerance = 0.0;
        assert!(solve_goal(&params, config).is_err());

        let mut config = sample_config(GoalType::MaxSpending);
        config.target_success_rate = 1.5;
        assert!(solve_goal(&params, config).is_err());

        let mut config = sample_config(GoalType::MaxSpending);
        config.trials_per_iteration = 0;
        assert!(solve_goal(&params, config).is_err());
    }
}
