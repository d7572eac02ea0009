use crate::error::{Error, Result};

/// Beyond this many features the 2^n codebook is not tractable
pub const MAX_GENERIC_FEATURES: usize = 20;

/// Data-independent codebook: all `2^n` sign patterns scaled by `offset`.
///
/// Codeword `k` has component `m` equal to `(-1)^(floor(k / 2^(n-m-1)) + 1) * offset`,
/// so codeword 0 is all `-offset` and the last codeword all `+offset`.
pub fn generic_codewords(num_features: usize, offset: f32) -> Result<Vec<Vec<f32>>> {
    if num_features == 0 || num_features > MAX_GENERIC_FEATURES {
        return Err(Error::config(format!(
            "generic codebook supports 1..={} features, got {}",
            MAX_GENERIC_FEATURES, num_features
        )));
    }
    let size = 1usize << num_features;
    Ok((0..size)
        .map(|k| {
            (0..num_features)
                .map(|m| {
                    let period = 1usize << (num_features - m - 1);
                    if (k / period) % 2 == 0 {
                        -offset
                    } else {
                        offset
                    }
                })
                .collect()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_features() {
        let cw = generic_codewords(2, 0.5).unwrap();
        assert_eq!(
            cw,
            vec![
                vec![-0.5, -0.5],
                vec![-0.5, 0.5],
                vec![0.5, -0.5],
                vec![0.5, 0.5],
            ]
        );
    }

    #[test]
    fn test_rejects_too_many_features() {
        assert!(generic_codewords(MAX_GENERIC_FEATURES + 1, 1.0).is_err());
    }
}
