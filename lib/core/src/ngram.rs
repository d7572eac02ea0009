//! Numeric n-gram codebooks over sequences of codeword indices.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::info;

use crate::config::NGramConfig;
use crate::frame::{CodewordId, FrameId};
use crate::mapping::InstanceMap;

/// An ordered tuple of codeword indices
pub type Gram = SmallVec<[u32; 3]>;

/// Assignment indices of the contributing frames of one source run
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSequence {
    pub frames: Vec<FrameId>,
    pub indices: Vec<u32>,
}

/// Split per-frame hard assignments into one sequence per source run.
/// Frames that contribute to no instance are left out.
pub fn source_sequences(assignments: &[CodewordId], map: &InstanceMap) -> Vec<SourceSequence> {
    let mut sequences: Vec<SourceSequence> = Vec::new();
    let mut current_source = None;
    for frame in map.contributing_frames() {
        let source = map.source_of(frame);
        if current_source != Some(source) {
            sequences.push(SourceSequence {
                frames: Vec::new(),
                indices: Vec::new(),
            });
            current_source = Some(source);
        }
        if let Some(seq) = sequences.last_mut() {
            seq.frames.push(frame);
            seq.indices.push(assignments[frame.index()].index() as u32);
        }
    }
    sequences
}

/// Vocabulary of unigrams, bigrams and trigrams; a `None` order is disabled
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NGramCodebook {
    orders: [Option<Vec<Gram>>; 3],
}

impl NGramCodebook {
    pub fn new(orders: [Option<Vec<Gram>>; 3]) -> Self {
        Self { orders }
    }

    /// Grams of order `n` (1..=3), if that order is enabled
    pub fn order(&self, n: usize) -> Option<&[Gram]> {
        self.orders.get(n.wrapping_sub(1))?.as_deref()
    }

    /// Total histogram width: unigrams, then bigrams, then trigrams
    pub fn len(&self) -> usize {
        self.orders.iter().flatten().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keep the `max_size` most frequent of all `num_codewords^n` grams of
    /// every enabled order. Equal counts, including grams never observed,
    /// go to the lexicographically smaller gram, and the kept grams are
    /// listed in lexicographic order. The width therefore only depends on
    /// the configuration and the codebook size.
    pub fn build(sequences: &[SourceSequence], num_codewords: usize, config: &NGramConfig) -> Self {
        let mut orders: [Option<Vec<Gram>>; 3] = [None, None, None];
        for (slot, n) in orders.iter_mut().zip(1..=3usize) {
            let Some(max_size) = config.max_size(n) else {
                continue;
            };
            let total = (num_codewords as u64).saturating_pow(n as u32);
            let keep = (max_size as u64).min(total) as usize;

            let mut counts: AHashMap<u64, usize> = AHashMap::new();
            for seq in sequences {
                for window in seq.indices.windows(n) {
                    *counts.entry(gram_index(window, num_codewords)).or_insert(0) += 1;
                }
            }
            let observed = counts.len();

            let mut ranked: Vec<(u64, usize)> = counts.iter().map(|(&i, &c)| (i, c)).collect();
            ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
            let mut kept: Vec<u64> = ranked.into_iter().take(keep).map(|(i, _)| i).collect();

            // fill with unseen grams, smallest first
            let mut candidate = 0u64;
            while kept.len() < keep && candidate < total {
                if !counts.contains_key(&candidate) {
                    kept.push(candidate);
                }
                candidate += 1;
            }
            kept.sort_unstable();

            info!(
                "{}-gram codebook: kept {} grams, {} of {} observed",
                n,
                kept.len(),
                observed.min(kept.len()),
                observed
            );
            *slot = Some(kept.into_iter().map(|i| gram_from_index(i, n, num_codewords)).collect());
        }
        Self { orders }
    }

    /// Count every gram occurrence for each instance containing the gram's
    /// first frame. Grams never span two source runs.
    pub fn encode(&self, sequences: &[SourceSequence], map: &InstanceMap) -> Vec<Vec<f32>> {
        let width = self.len();
        let mut bag = vec![vec![0.0f32; width]; map.num_instances()];

        let mut offset = 0usize;
        for n in 1..=3usize {
            let Some(grams) = self.order(n) else {
                continue;
            };
            let lookup: AHashMap<&[u32], usize> = grams
                .iter()
                .enumerate()
                .map(|(i, g)| (g.as_slice(), offset + i))
                .collect();
            for seq in sequences {
                for (start, window) in seq.indices.windows(n).enumerate() {
                    if let Some(&column) = lookup.get(window) {
                        for instance in map.instances_of(seq.frames[start]) {
                            bag[instance.index()][column] += 1.0;
                        }
                    }
                }
            }
            offset += grams.len();
        }
        bag
    }
}

/// Position of a gram in the lexicographic enumeration of `(0..k)^n`
fn gram_index(gram: &[u32], k: usize) -> u64 {
    gram.iter().fold(0u64, |acc, &c| acc * k as u64 + u64::from(c))
}

fn gram_from_index(mut index: u64, n: usize, k: usize) -> Gram {
    let mut gram: Gram = SmallVec::from_elem(0, n);
    for slot in gram.iter_mut().rev() {
        *slot = (index % k as u64) as u32;
        index /= k as u64;
    }
    gram
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Frame, InstanceId};
    use crate::mapping::InstanceMapper;

    fn gram(ids: &[u32]) -> Gram {
        Gram::from_slice(ids)
    }

    fn setup() -> (InstanceMap, Vec<SourceSequence>) {
        let frames: Vec<Frame> = ["a", "a", "a", "a", "b", "b"]
            .iter()
            .map(|n| Frame::numeric(*n, &[0.0]))
            .collect();
        let map = InstanceMapper::new(None).map(&frames, &[true; 6]).unwrap();
        let assignments: Vec<CodewordId> = [0, 1, 0, 1, 1, 0].iter().map(|&i| CodewordId(i)).collect();
        let sequences = source_sequences(&assignments, &map);
        (map, sequences)
    }

    #[test]
    fn test_sequences_split_at_sources() {
        let (_, sequences) = setup();
        assert_eq!(sequences.len(), 2);
        assert_eq!(sequences[0].indices, vec![0, 1, 0, 1]);
        assert_eq!(sequences[1].indices, vec![1, 0]);
    }

    #[test]
    fn test_bigrams_ranked_by_frequency() {
        let (_, sequences) = setup();
        let config = NGramConfig {
            max_bigrams: 2,
            ..Default::default()
        };
        let book = NGramCodebook::build(&sequences, 2, &config);
        assert!(book.order(1).is_none());
        // both observed bigrams occur twice and outrank the unseen ones
        assert_eq!(book.order(2).unwrap(), &[gram(&[0, 1]), gram(&[1, 0])]);
    }

    #[test]
    fn test_encode_concatenates_orders() {
        let (map, sequences) = setup();
        let config = NGramConfig {
            max_unigrams: 2,
            max_bigrams: 1,
            max_trigrams: 0,
        };
        let book = NGramCodebook::build(&sequences, 2, &config);
        assert_eq!(book.len(), 3);
        let bag = book.encode(&sequences, &map);
        // unigrams [0, 1], then bigram (0,1) which wins the tie against (1,0)
        assert_eq!(bag[InstanceId(0).index()], vec![2.0, 2.0, 2.0]);
        assert_eq!(bag[InstanceId(1).index()], vec![1.0, 1.0, 0.0]);
    }

    fn single_source(indices: &[u32]) -> Vec<SourceSequence> {
        vec![SourceSequence {
            frames: (0..indices.len()).map(FrameId).collect(),
            indices: indices.to_vec(),
        }]
    }

    #[test]
    fn test_ties_go_to_smaller_gram() {
        let config = NGramConfig {
            max_unigrams: 1,
            ..Default::default()
        };
        let book = NGramCodebook::build(&single_source(&[1, 1, 0, 0]), 2, &config);
        assert_eq!(book.order(1).unwrap(), &[gram(&[0])]);
    }

    #[test]
    fn test_unseen_grams_fill_to_max_size() {
        let config = NGramConfig {
            max_unigrams: 2,
            max_bigrams: 3,
            max_trigrams: 0,
        };
        let book = NGramCodebook::build(&single_source(&[0, 0, 0, 1]), 2, &config);
        // (0,0) and (0,1) observed, (1,0) is the smallest unseen bigram
        assert_eq!(
            book.order(2).unwrap(),
            &[gram(&[0, 0]), gram(&[0, 1]), gram(&[1, 0])]
        );
        assert_eq!(book.len(), 2 + 3);

        let other = NGramCodebook::build(&single_source(&[0, 1, 1, 0, 0, 1]), 2, &config);
        assert_eq!(other.len(), book.len());
    }

    #[test]
    fn test_frequent_grams_listed_in_lexicographic_order() {
        let config = NGramConfig {
            max_bigrams: 3,
            ..Default::default()
        };
        // (2,1) three times, (1,2) twice, (1,0) and (0,2) once each
        let book = NGramCodebook::build(&single_source(&[2, 1, 2, 1, 2, 1, 0, 2]), 3, &config);
        assert_eq!(
            book.order(2).unwrap(),
            &[gram(&[0, 2]), gram(&[1, 2]), gram(&[2, 1])]
        );
    }

    #[test]
    fn test_max_size_capped_by_possible_grams() {
        let config = NGramConfig {
            max_unigrams: 10,
            max_bigrams: 10,
            max_trigrams: 0,
        };
        let book = NGramCodebook::build(&single_source(&[0]), 2, &config);
        assert_eq!(book.order(1).unwrap().len(), 2);
        assert_eq!(book.order(2).unwrap().len(), 4);
        assert_eq!(gram_from_index(gram_index(&[1, 0, 1], 2), 3, 2), gram(&[1, 0, 1]));
    }
}
