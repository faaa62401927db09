//! RELAX demonstration: like the REBAR demo, but the control variate is a
//! small trainable network whose weights ride in the hyperparameter vector.

use relax::{relax_estimate, MlpShape, NoiseBatch, Objective, Scalar};
use relax_optim::{optimize, AdamConfig, RunConfig};

const DIM: usize = 100;
const NUM_HIDDEN: usize = 5;
const NUM_SAMPLES: usize = 10;
const NUM_ITERS: u64 = 2000;
const STEP_SIZE: f64 = 0.1;
const INIT_SCALE: f64 = 0.1;

/// Squared distance between a sample and a fixed ramp of targets in [0, 1].
struct DistanceToRamp {
    targets: Vec<f64>,
}

impl DistanceToRamp {
    fn new(dim: usize) -> Self {
        let targets = (0..dim)
            .map(|d| d as f64 / (dim - 1) as f64)
            .collect();
        DistanceToRamp { targets }
    }
}

impl Objective for DistanceToRamp {
    fn eval<T: Scalar>(&self, _params: &[T], sample: &[T]) -> T {
        self.targets
            .iter()
            .zip(sample)
            .fold(T::zero(), |acc, (&target, &s)| {
                let d = s - T::from(target).unwrap();
                acc + d * d
            })
    }
}

fn main() {
    let objective = DistanceToRamp::new(DIM);
    let shape = MlpShape::new(vec![DIM, NUM_HIDDEN, 1]);

    let model_init = vec![0.0; DIM];
    let mut hyper_init = vec![0.0, 0.0]; // [log_temperature, log_eta]
    hyper_init.extend(shape.init(INIT_SCALE, 0));

    let config = RunConfig {
        num_iters: NUM_ITERS,
        adam: AdamConfig {
            step_size: STEP_SIZE,
            ..AdamConfig::default()
        },
    };

    println!(
        "optimizing {DIM} Bernoulli logits with RELAX ({} surrogate weights)...",
        shape.num_params()
    );
    let result = optimize(
        |model, hyper, t| {
            let noise = NoiseBatch::draw(NUM_SAMPLES, DIM, t);
            relax_estimate(model, hyper, &shape, &noise, &objective)
        },
        model_init,
        hyper_init,
        &config,
        |t, _model, hyper, est| {
            if t % 10 == 0 {
                println!(
                    "iteration {t:4}  objective {:8.4}  temperature {:.4}  eta {:.4}",
                    est.objective,
                    hyper[0].exp(),
                    hyper[1].exp()
                );
            }
        },
    );

    println!(
        "done after {} iterations, final objective {:.4}",
        result.iterations, result.final_objective
    );
}
