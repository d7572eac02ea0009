//! Seeding and Lloyd iterations for numeric codebooks.

use rand::rngs::StdRng;
use rand::Rng;
use rayon::prelude::*;
use tracing::debug;

use crate::config::{EPSILON, MAX_ITERATIONS};
use crate::error::{Error, Result};
use crate::simd::squared_l2_simd;
use crate::vector::Vector;

/// Draw `k` training vectors uniformly without replacement.
///
/// Picks lying within 1e-4 of an already chosen codeword are discarded and
/// another vector is drawn, so the result has no duplicates.
pub fn random_sampling(data: &[Vec<f32>], k: usize, rng: &mut StdRng) -> Result<Vec<Vec<f32>>> {
    if data.len() < k {
        return Err(Error::InsufficientData {
            requested: k,
            available: data.len(),
        });
    }

    let mut pool: Vec<usize> = (0..data.len()).collect();
    let mut remaining = pool.len();
    let mut chosen: Vec<Vector> = Vec::with_capacity(k);
    while chosen.len() < k {
        if remaining == 0 {
            return Err(Error::InsufficientData {
                requested: k,
                available: chosen.len(),
            });
        }
        let r = rng.random_range(0..remaining);
        let idx = pool[r];
        pool.swap(r, remaining - 1);
        remaining -= 1;

        if chosen.iter().any(|c| c.approx_eq(&data[idx], EPSILON)) {
            continue;
        }
        chosen.push(Vector::from_slice(&data[idx]));
    }
    Ok(chosen.into_iter().map(Vector::into_inner).collect())
}

/// k-means++ seeding: every further center is drawn with probability
/// proportional to its squared distance to the closest center so far.
pub fn random_plus_plus(data: &[Vec<f32>], k: usize, rng: &mut StdRng) -> Result<Vec<Vec<f32>>> {
    if data.len() < k {
        return Err(Error::InsufficientData {
            requested: k,
            available: data.len(),
        });
    }
    if k == 0 {
        return Ok(Vec::new());
    }

    let first = rng.random_range(0..data.len());
    let mut centers = vec![data[first].clone()];
    let mut min_dist: Vec<f64> = data
        .par_iter()
        .map(|x| squared_l2_simd(x, &centers[0]) as f64)
        .collect();

    while centers.len() < k {
        let total: f64 = min_dist.iter().sum();
        if total <= 0.0 {
            // every remaining vector coincides with a chosen center
            return Err(Error::InsufficientData {
                requested: k,
                available: centers.len(),
            });
        }

        let target = rng.random::<f64>() * total;
        let mut cumulative = 0.0f64;
        let mut pick = None;
        for (i, &d) in min_dist.iter().enumerate() {
            if d <= 0.0 {
                continue;
            }
            cumulative += d;
            pick = Some(i);
            if cumulative > target {
                break;
            }
        }
        let Some(idx) = pick else {
            break;
        };

        let center = data[idx].clone();
        min_dist
            .par_iter_mut()
            .zip(data.par_iter())
            .for_each(|(m, x)| {
                let d = squared_l2_simd(x, &center) as f64;
                if d < *m {
                    *m = d;
                }
            });
        centers.push(center);
    }
    Ok(centers)
}

#[derive(Debug, Clone)]
pub struct KMeansOutcome {
    pub centroids: Vec<Vec<f32>>,
    pub iterations: usize,
    pub converged: bool,
}

/// Lloyd's algorithm from the given initial centroids.
///
/// With `normalize`, each dimension is divided by its training range inside
/// the distance only; centroids stay in the original feature space. Empty
/// clusters keep their previous centroid.
pub fn kmeans(data: &[Vec<f32>], init: Vec<Vec<f32>>, normalize: bool) -> KMeansOutcome {
    let mut centroids = init;
    if centroids.is_empty() || data.is_empty() {
        return KMeansOutcome {
            centroids,
            iterations: 0,
            converged: true,
        };
    }
    let dim = centroids[0].len();
    let inv_width = normalize.then(|| inverse_ranges(data, dim));

    let mut previous: Option<Vec<usize>> = None;
    let mut iterations = 0;
    let mut converged = false;
    while iterations < MAX_ITERATIONS {
        iterations += 1;
        let assignments: Vec<usize> = data
            .par_iter()
            .map(|x| nearest(x, &centroids, inv_width.as_deref()))
            .collect();
        if previous.as_ref() == Some(&assignments) {
            converged = true;
            break;
        }

        let mut sums = vec![vec![0.0f64; dim]; centroids.len()];
        let mut counts = vec![0usize; centroids.len()];
        for (x, &c) in data.iter().zip(&assignments) {
            counts[c] += 1;
            for (s, &v) in sums[c].iter_mut().zip(x) {
                *s += v as f64;
            }
        }
        for (c, centroid) in centroids.iter_mut().enumerate() {
            if counts[c] == 0 {
                continue;
            }
            let n = counts[c] as f64;
            for (v, s) in centroid.iter_mut().zip(&sums[c]) {
                *v = (s / n) as f32;
            }
        }
        previous = Some(assignments);
    }

    debug!(
        "k-means with {} centroids stopped after {} iterations (converged: {})",
        centroids.len(),
        iterations,
        converged
    );
    KMeansOutcome {
        centroids,
        iterations,
        converged,
    }
}

/// Index of the closest centroid; ties go to the lower index
pub(crate) fn nearest(x: &[f32], centroids: &[Vec<f32>], inv_width: Option<&[f32]>) -> usize {
    let mut best = 0;
    let mut best_dist = f32::INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let d = match inv_width {
            None => squared_l2_simd(x, c),
            Some(w) => x
                .iter()
                .zip(c)
                .zip(w)
                .map(|((a, b), s)| {
                    let diff = (a - b) * s;
                    diff * diff
                })
                .sum(),
        };
        if d < best_dist {
            best_dist = d;
            best = i;
        }
    }
    best
}

fn inverse_ranges(data: &[Vec<f32>], dim: usize) -> Vec<f32> {
    let mut min = vec![f32::INFINITY; dim];
    let mut max = vec![f32::NEG_INFINITY; dim];
    for x in data {
        for (d, &v) in x.iter().enumerate().take(dim) {
            min[d] = min[d].min(v);
            max[d] = max[d].max(v);
        }
    }
    min.iter()
        .zip(&max)
        .map(|(lo, hi)| {
            let width = hi - lo;
            if width < f32::MIN_POSITIVE {
                1.0
            } else {
                1.0 / width
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    /// 3x3 grid of spacing 0.1 around each center; the cluster means are exact
    fn three_blobs() -> (Vec<Vec<f32>>, Vec<[f32; 2]>) {
        let centers = vec![[0.0, 0.0], [5.0, 5.0], [10.0, 0.0]];
        let mut data = Vec::new();
        for c in &centers {
            for dx in [-0.1f32, 0.0, 0.1] {
                for dy in [-0.1f32, 0.0, 0.1] {
                    data.push(vec![c[0] + dx, c[1] + dy]);
                }
            }
        }
        (data, centers)
    }

    #[test]
    fn test_random_sampling_has_no_duplicates() {
        let data = vec![vec![1.0], vec![1.0], vec![1.00001], vec![2.0], vec![3.0]];
        let mut rng = StdRng::seed_from_u64(0);
        let picked = random_sampling(&data, 3, &mut rng).unwrap();
        let mut values: Vec<f32> = picked.iter().map(|v| v[0]).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!((values[0] - 1.0).abs() < 1e-3);
        assert_eq!(&values[1..], &[2.0, 3.0]);
    }

    #[test]
    fn test_random_sampling_exhausted_by_duplicates() {
        let data = vec![vec![1.0], vec![1.0], vec![2.0]];
        let mut rng = StdRng::seed_from_u64(0);
        let err = random_sampling(&data, 3, &mut rng).unwrap_err();
        assert!(matches!(err, Error::InsufficientData { requested: 3, available: 2 }));
    }

    #[test]
    fn test_too_little_data() {
        let data = vec![vec![1.0]];
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            random_plus_plus(&data, 2, &mut rng),
            Err(Error::InsufficientData { requested: 2, available: 1 })
        ));
    }

    #[test]
    fn test_seeding_is_deterministic() {
        let (data, _) = three_blobs();
        let a = random_plus_plus(&data, 3, &mut StdRng::seed_from_u64(42)).unwrap();
        let b = random_plus_plus(&data, 3, &mut StdRng::seed_from_u64(42)).unwrap();
        assert_eq!(a, b);
        let c = random_sampling(&data, 5, &mut StdRng::seed_from_u64(42)).unwrap();
        let d = random_sampling(&data, 5, &mut StdRng::seed_from_u64(42)).unwrap();
        assert_eq!(c, d);
    }

    #[test]
    fn test_plus_plus_seeds_are_distinct() {
        let data = vec![vec![0.0], vec![0.0], vec![1.0], vec![1.0], vec![2.0]];
        let seeds = random_plus_plus(&data, 3, &mut StdRng::seed_from_u64(5)).unwrap();
        let mut values: Vec<f32> = seeds.iter().map(|v| v[0]).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(values, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_kmeans_recovers_blob_centers() {
        let (data, centers) = three_blobs();
        let seeds = random_plus_plus(&data, 3, &mut StdRng::seed_from_u64(3)).unwrap();
        let outcome = kmeans(&data, seeds, false);
        assert!(outcome.converged);
        assert!(outcome.iterations < MAX_ITERATIONS);
        for c in &centers {
            let hit = outcome
                .centroids
                .iter()
                .any(|k| (k[0] - c[0]).abs() < 1e-3 && (k[1] - c[1]).abs() < 1e-3);
            assert!(hit, "no centroid near {:?}: {:?}", c, outcome.centroids);
        }
    }

    #[test]
    fn test_kmeans_keeps_empty_cluster() {
        let data = vec![vec![0.0], vec![0.2]];
        let init = vec![vec![0.1], vec![100.0]];
        let outcome = kmeans(&data, init, false);
        assert_eq!(outcome.centroids[1], vec![100.0]);
        assert!((outcome.centroids[0][0] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_normalized_distance_changes_assignment() {
        // dimension 1 has a range 1000x larger than dimension 0
        let centroids = vec![vec![0.0, 0.0], vec![1.0, 600.0]];
        let data = vec![vec![0.0, 0.0], vec![1.0, 1000.0]];
        let x = [0.9f32, 350.0];
        assert_eq!(nearest(&x, &centroids, None), 1);
        let w = inverse_ranges(&data, 2);
        assert_eq!(nearest(&x, &centroids, Some(&w)), 1);
        let y = [0.9f32, 250.0];
        assert_eq!(nearest(&y, &centroids, None), 0);
        assert_eq!(nearest(&y, &centroids, Some(&w)), 1);
    }
}
