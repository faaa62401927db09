//! Joint optimization of model parameters and estimator hyperparameters.

use relax::Estimate;

use crate::adam::{Adam, AdamConfig};

/// Configuration for one [`optimize`] run.
#[derive(Debug, Clone, Copy)]
pub struct RunConfig {
    /// Number of iterations; the only termination control.
    pub num_iters: u64,
    /// Adam settings shared by both parameter records.
    pub adam: AdamConfig,
}

/// Final state of an [`optimize`] run.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Model logits after the last iteration.
    pub model_params: Vec<f64>,
    /// Flattened estimator hyperparameters after the last iteration.
    pub hyper_params: Vec<f64>,
    /// Batch-mean objective of the last estimate.
    pub final_objective: f64,
    /// Iterations performed.
    pub iterations: u64,
}

/// Run the estimation/update loop.
///
/// `estimate` is called once per iteration with the current model
/// parameters, the current hyperparameters, and the iteration index (which
/// keys the noise stream, so a run is reproducible end to end). The two
/// parameter records are then updated by the same Adam step function applied
/// twice — model logits from `grad_logits`, hyperparameters from
/// `grad_hyper` — and never mixed into one vector. `observer` runs after
/// every step with the iteration index, both records, and the estimate.
pub fn optimize<E, Obs>(
    mut estimate: E,
    model_init: Vec<f64>,
    hyper_init: Vec<f64>,
    config: &RunConfig,
    mut observer: Obs,
) -> RunResult
where
    E: FnMut(&[f64], &[f64], u64) -> Estimate,
    Obs: FnMut(u64, &[f64], &[f64], &Estimate),
{
    let mut model = model_init;
    let mut hyper = hyper_init;
    let mut model_opt = Adam::new(model.len(), config.adam);
    let mut hyper_opt = Adam::new(hyper.len(), config.adam);
    let mut final_objective = f64::NAN;

    for t in 0..config.num_iters {
        let est = estimate(&model, &hyper, t);
        model_opt.step(&mut model, &est.grad_logits);
        hyper_opt.step(&mut hyper, &est.grad_hyper);
        observer(t, &model, &hyper, &est);
        final_objective = est.objective;
    }

    RunResult {
        model_params: model,
        hyper_params: hyper,
        final_objective,
        iterations: config.num_iters,
    }
}
