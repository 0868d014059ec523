use argmin::core::{self, CostFunction, Executor};
use argmin::solver::neldermead::NelderMead;
use ndarray::prelude::*;

use crate::base::*;

// Adapter handing any objective of ours to argmin
#[derive(Debug, Clone)]
pub struct ArgminObjective<O> {
    pub objective: O,
}

impl<O: Objective> CostFunction for ArgminObjective<O> {
    type Param = Vec<f64>;
    type Output = f64;
    fn cost(&self, p: &Self::Param) -> std::result::Result<Self::Output, core::Error> {
        let f = self.objective.evaluate(p);
        if f.is_nan() {
            Ok(f64::INFINITY)
        } else {
            Ok(f)
        }
    }
}

/// Nelder-Mead solver starting from the same simplex as `amoeba`
pub fn prepare_solver_neldermead(
    x0: &Array1<f64>,
    edges: &Array1<f64>,
    sd_tolerance: f64,
) -> Result<NelderMead<Vec<f64>, f64>> {
    let n = x0.len();
    if edges.len() != n {
        return Err(HivfitError::Dimension(format!(
            "{} simplex edges for {} parameters",
            edges.len(),
            n
        )));
    }
    let mut init_param: Vec<Vec<f64>> = vec![x0.to_vec()];
    for i in 0..n {
        let mut vertex = x0.to_vec();
        vertex[i] += edges[i];
        init_param.push(vertex);
    }
    NelderMead::new(init_param)
        .with_sd_tolerance(sd_tolerance)
        .map_err(|e| HivfitError::Optimizer(e.to_string()))
}

pub fn minimise_neldermead<O: Objective>(
    objective: O,
    x0: &Array1<f64>,
    settings: &SimplexSettings,
) -> Result<SimplexMinimum> {
    let solver = prepare_solver_neldermead(x0, &settings.edges, settings.tol_f)?;
    let cost = ArgminObjective { objective };
    let max_iters = settings.max_iters as u64;
    let res = Executor::new(cost, solver)
        .configure(|state| state.max_iters(max_iters))
        .run()
        .map_err(|e| HivfitError::Optimizer(e.to_string()))?;
    let state = res.state();
    let params = match state.best_param.clone() {
        Some(x) => x,
        None => {
            return Err(HivfitError::Optimizer(
                "Nelder-Mead finished without a best parameter set.".to_owned(),
            ))
        }
    };
    let iterations = state.iter as usize;
    let converged = iterations < settings.max_iters;
    if !converged {
        log::warn!(
            "The maximum number of iterations ({}) has been reached by the argmin Nelder-Mead solver",
            settings.max_iters
        );
    }
    Ok(SimplexMinimum {
        x: Array1::from_vec(params),
        f: state.best_cost,
        iterations,
        converged,
    })
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use super::*;

    struct Paraboloid;
    impl Objective for Paraboloid {
        fn n_params(&self) -> usize {
            2
        }
        fn evaluate(&self, params: &[f64]) -> f64 {
            (params[0] - 0.3).powi(2) + 3.0 * (params[1] - 0.7).powi(2) + 1.0
        }
    }

    #[test]
    fn test_neldermead() {
        let mut settings = SimplexSettings::new(2);
        settings.edges = Array1::from_elem(2, 0.1);
        settings.tol_f = 1e-12;
        let res = minimise_neldermead(Paraboloid, &Array1::zeros(2), &settings).unwrap();
        assert_eq!((res.x[0] * 1e3).round(), 300.0);
        assert_eq!((res.x[1] * 1e3).round(), 700.0);
        assert_eq!((res.f * 1e4).round(), 1e4);
        let solver = prepare_solver_neldermead(&Array1::zeros(3), &Array1::ones(2), 1e-8);
        assert!(solver.is_err());
    }
}
