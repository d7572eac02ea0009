use tracing::info;

use crate::vector::Vector;

/// Merge codewords whose Pearson correlation exceeds `threshold`.
///
/// Walking in index order, every later surviving codeword correlated with
/// codeword `i` above the threshold joins its group and is removed; the group
/// is replaced by its element-wise mean. Survivors are renumbered contiguously.
pub fn reduce_codewords(codewords: Vec<Vector>, threshold: f32) -> Vec<Vector> {
    let n = codewords.len();
    let mut removed = vec![false; n];
    let mut reduced = Vec::with_capacity(n);

    for i in 0..n {
        if removed[i] {
            continue;
        }
        let mut group = vec![&codewords[i]];
        for j in (i + 1)..n {
            if !removed[j] && codewords[i].pearson_correlation(&codewords[j]) > threshold {
                removed[j] = true;
                group.push(&codewords[j]);
            }
        }
        if let Some(mean) = Vector::mean_of(group) {
            reduced.push(mean);
        }
    }

    info!(
        "Codebook reduction merged {} codewords into {}",
        n,
        reduced.len()
    );
    reduced
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlated_codewords_are_merged() {
        let codewords = vec![
            Vector::new(vec![1.0, 2.0, 3.0]),
            Vector::new(vec![3.0, 2.0, 1.0]),
            Vector::new(vec![2.0, 4.0, 6.0]),
        ];
        let reduced = reduce_codewords(codewords, 0.95);
        assert_eq!(reduced.len(), 2);
        assert_eq!(reduced[0].as_slice(), &[1.5, 3.0, 4.5]);
        assert_eq!(reduced[1].as_slice(), &[3.0, 2.0, 1.0]);
    }

    #[test]
    fn test_threshold_one_keeps_everything() {
        let codewords = vec![
            Vector::new(vec![1.0, 2.0]),
            Vector::new(vec![2.0, 4.0]),
        ];
        assert_eq!(reduce_codewords(codewords, 1.0).len(), 2);
    }
}
