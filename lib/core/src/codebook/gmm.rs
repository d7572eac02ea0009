//! Diagonal-covariance Gaussian mixture fitted with EM.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::MAX_ITERATIONS;

/// Floor applied to variances and added to every likelihood
pub const MIN_LIKELIHOOD: f64 = f32::MIN_POSITIVE as f64;

/// Per-component parameters stored alongside the codeword means
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GmmParams {
    pub mixture_weights: Vec<f32>,
    /// Diagonal covariance of every component
    pub covariances: Vec<Vec<f32>>,
}

impl GmmParams {
    pub fn len(&self) -> usize {
        self.mixture_weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mixture_weights.is_empty()
    }

    /// Concatenate per-class mixtures, dividing every weight by the class count
    pub fn concat(parts: Vec<GmmParams>) -> GmmParams {
        let num_classes = parts.len().max(1) as f32;
        let mut merged = GmmParams {
            mixture_weights: Vec::new(),
            covariances: Vec::new(),
        };
        for part in parts {
            merged
                .mixture_weights
                .extend(part.mixture_weights.iter().map(|w| w / num_classes));
            merged.covariances.extend(part.covariances);
        }
        merged
    }
}

/// Weighted Gaussian density of `x` under one diagonal component, plus
/// [`MIN_LIKELIHOOD`] so that no component ever has zero likelihood
pub fn component_likelihood(x: &[f32], mean: &[f32], variance: &[f32], weight: f64) -> f64 {
    let n = x.len() as i32;
    let det: f64 = variance.iter().map(|&v| v as f64).product();
    let prefactor = 1.0 / ((2.0 * std::f64::consts::PI).powi(n) * (det + MIN_LIKELIHOOD)).sqrt();
    let exponent: f64 = x
        .iter()
        .zip(mean)
        .zip(variance)
        .map(|((&xi, &mi), &vi)| {
            let d = xi as f64 - mi as f64;
            d * d / vi as f64
        })
        .sum();
    weight * prefactor * (-0.5 * exponent).exp() + MIN_LIKELIHOOD
}

#[derive(Debug, Clone)]
pub struct EmOutcome {
    pub means: Vec<Vec<f32>>,
    pub params: GmmParams,
    pub iterations: usize,
}

/// Fit a mixture starting from the given means, uniform weights and unit
/// variances. Stops once the arg-max component of every point is stable.
pub fn expectation_maximization(data: &[Vec<f32>], init: Vec<Vec<f32>>) -> EmOutcome {
    let k = init.len();
    let dim = init.first().map_or(0, Vec::len);
    let mut means = init;
    let mut weights = vec![1.0f32 / k.max(1) as f32; k];
    let mut variances = vec![vec![1.0f32; dim]; k];

    let mut previous: Option<Vec<usize>> = None;
    let mut iterations = 0;
    while iterations < MAX_ITERATIONS && k > 0 {
        iterations += 1;

        // E-step: hard arg-max with its normalized responsibility
        let responsibilities: Vec<(usize, f64)> = data
            .par_iter()
            .map(|x| {
                let mut best = 0;
                let mut best_lik = f64::NEG_INFINITY;
                let mut sum = 0.0;
                for c in 0..k {
                    let lik = component_likelihood(x, &means[c], &variances[c], weights[c] as f64);
                    sum += lik;
                    if lik > best_lik {
                        best_lik = lik;
                        best = c;
                    }
                }
                (best, best_lik / sum)
            })
            .collect();
        let assignments: Vec<usize> = responsibilities.iter().map(|&(c, _)| c).collect();
        if previous.as_ref() == Some(&assignments) {
            break;
        }

        // M-step
        let mut response = vec![0.0f64; k];
        let mut mean_sums = vec![vec![0.0f64; dim]; k];
        for (x, &(c, p)) in data.iter().zip(&responsibilities) {
            response[c] += p;
            for (s, &v) in mean_sums[c].iter_mut().zip(x) {
                *s += p * v as f64;
            }
        }
        let total: f64 = response.iter().sum();
        for c in 0..k {
            if total > 0.0 {
                weights[c] = (response[c] / total) as f32;
            }
            if response[c] > 0.0 {
                for (m, s) in means[c].iter_mut().zip(&mean_sums[c]) {
                    *m = (s / response[c]) as f32;
                }
            }
        }

        let mut var_sums = vec![vec![0.0f64; dim]; k];
        for (x, &(c, p)) in data.iter().zip(&responsibilities) {
            for ((s, &v), &m) in var_sums[c].iter_mut().zip(x).zip(&means[c]) {
                let d = v as f64 - m as f64;
                *s += p * d * d;
            }
        }
        for c in 0..k {
            if response[c] > 0.0 {
                for (var, s) in variances[c].iter_mut().zip(&var_sums[c]) {
                    *var = (s / response[c]).max(MIN_LIKELIHOOD) as f32;
                }
            }
        }

        previous = Some(assignments);
    }

    debug!("EM with {} components stopped after {} iterations", k, iterations);
    EmOutcome {
        means,
        params: GmmParams {
            mixture_weights: weights,
            covariances: variances,
        },
        iterations,
    }
}

/// Normalized posterior over all components. Without `prior` the
/// components are weighted uniformly.
pub fn posterior(x: &[f32], means: &[Vec<f32>], params: &GmmParams, prior: bool) -> Vec<f32> {
    let k = means.len();
    let uniform = 1.0 / k.max(1) as f64;
    let liks: Vec<f64> = means
        .iter()
        .enumerate()
        .map(|(c, mean)| {
            let weight = if prior {
                params.mixture_weights[c] as f64
            } else {
                uniform
            };
            component_likelihood(x, mean, &params.covariances[c], weight)
        })
        .collect();
    let sum: f64 = liks.iter().sum();
    liks.iter().map(|l| (l / sum) as f32).collect()
}
