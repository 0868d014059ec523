pub use self::{amoeba::*, neldermead::*};

mod amoeba;
mod neldermead;

use crate::base::*;
use ndarray::prelude::*;

/// Minimise an objective with the selected backend
pub fn minimise<O: Objective>(
    objective: O,
    x0: &Array1<f64>,
    settings: &SimplexSettings,
    optimizer: Optimizer,
) -> Result<SimplexMinimum> {
    if objective.n_params() != x0.len() {
        return Err(HivfitError::Dimension(format!(
            "objective takes {} parameters, starting point has {}",
            objective.n_params(),
            x0.len()
        )));
    }
    match optimizer {
        Optimizer::Amoeba => amoeba(|x| objective.evaluate(x), x0, settings),
        Optimizer::Argmin => minimise_neldermead(objective, x0, settings),
    }
}
