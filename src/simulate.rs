//! Ground-truth simulation
//!
//! Draws state and observation sequences from a known parameter set, for
//! tests, benchmarks and estimator sanity checks. The composite state is
//! iterated through the raw `(F, Q-root)` pair; the observation at step
//! `n` is the observation block of the state at `n + 1` (the state
//! embeds one observation lag).

use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::model::params::StateSpaceParams;

/// One simulated trajectory with its observations.
#[derive(Debug, Clone)]
pub struct SimulatedSequence {
    /// Composite states `t_0 .. t_N` (length `N + 1`)
    pub states: Vec<DVector<f64>>,
    /// Observations `y_0 .. y_{N-1}` (length `N`)
    pub observations: Vec<DVector<f64>>,
}

/// Draw one sequence of the given length from the model.
pub fn simulate_sequence<R: Rng + ?Sized>(
    rng: &mut R,
    params: &StateSpaceParams,
    length: usize,
) -> SimulatedSequence {
    let dims = params.dims();
    let n_t = dims.n_t();
    let std_normal = Normal::new(0.0, 1.0).expect("unit normal is well-formed");

    let draw = |rng: &mut R, root: &DMatrix<f64>| -> DVector<f64> {
        let z = DVector::from_fn(n_t, |_, _| std_normal.sample(rng));
        root * z
    };

    let mut states = Vec::with_capacity(length + 1);
    let mut observations = Vec::with_capacity(length);

    let mut t = params.t0() + draw(rng, params.q0_root());
    states.push(t.clone());

    for _ in 0..length {
        t = params.f() * &t + draw(rng, params.q_root());
        observations.push(t.rows(dims.n_x, dims.n_y).into_owned());
        states.push(t.clone());
    }

    SimulatedSequence {
        states,
        observations,
    }
}

/// Draw several independent sequences from one seeded generator.
pub fn simulate_sequences(
    seed: u64,
    params: &StateSpaceParams,
    count: usize,
    length: usize,
) -> Vec<SimulatedSequence> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| simulate_sequence(&mut rng, params, length))
        .collect()
}
