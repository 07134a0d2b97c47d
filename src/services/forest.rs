//! Small isolation forest for unsupervised outlier scoring.
//!
//! Each tree repeatedly picks a random feature and a random split value
//! inside the sample's range; outliers end up isolated after few splits, so
//! short average path lengths mean anomalous points. Scores follow the usual
//! normalization `2^(-E[h]/c(n))` and land in `(0, 1)`, with values near 1
//! anomalous and values around 0.5 unremarkable.
//!
//! The forest is rebuilt from history on every scoring call. Actor histories
//! are small (one feature vector per trailing window), so fitting is cheap
//! and there is no model state to persist or invalidate.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

const EULER_MASCHERONI: f64 = 0.577_215_664_901_532_9;

enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

pub struct IsolationForest {
    trees: Vec<Node>,
    sample_size: usize,
}

impl IsolationForest {
    /// Fit a forest on `data` (rows are feature vectors of equal length).
    /// Returns `None` for empty data — there is nothing to model.
    pub fn fit(
        data: &[Vec<f64>],
        num_trees: usize,
        sample_size: usize,
        rng: &mut StdRng,
    ) -> Option<Self> {
        if data.is_empty() || data[0].is_empty() {
            return None;
        }

        let sample_size = sample_size.min(data.len()).max(2);
        let max_depth = (sample_size as f64).log2().ceil() as usize;

        let trees = (0..num_trees.max(1))
            .map(|_| {
                let sample: Vec<&[f64]> = data
                    .choose_multiple(rng, sample_size)
                    .map(Vec::as_slice)
                    .collect();
                build_tree(&sample, 0, max_depth, rng)
            })
            .collect();

        Some(IsolationForest { trees, sample_size })
    }

    /// Anomaly score for one point, in `(0, 1)`.
    pub fn score(&self, point: &[f64]) -> f64 {
        let total: f64 = self
            .trees
            .iter()
            .map(|tree| path_length(tree, point, 0.0))
            .sum();
        let mean_path = total / self.trees.len() as f64;
        let norm = average_path_length(self.sample_size);
        if norm <= 0.0 {
            return 0.5;
        }
        2f64.powf(-mean_path / norm)
    }
}

fn build_tree(sample: &[&[f64]], depth: usize, max_depth: usize, rng: &mut StdRng) -> Node {
    if sample.len() <= 1 || depth >= max_depth {
        return Node::Leaf { size: sample.len() };
    }

    let dims = sample[0].len();
    // Only features with spread can split the sample.
    let splittable: Vec<usize> = (0..dims)
        .filter(|&d| {
            let (min, max) = feature_range(sample, d);
            max > min
        })
        .collect();
    let Some(&feature) = splittable.as_slice().choose(rng) else {
        return Node::Leaf { size: sample.len() };
    };

    let (min, max) = feature_range(sample, feature);
    let threshold = rng.gen_range(min..max);

    let (left, right): (Vec<&[f64]>, Vec<&[f64]>) =
        sample.iter().partition(|row| row[feature] < threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(build_tree(&left, depth + 1, max_depth, rng)),
        right: Box::new(build_tree(&right, depth + 1, max_depth, rng)),
    }
}

fn feature_range(sample: &[&[f64]], feature: usize) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for row in sample {
        min = min.min(row[feature]);
        max = max.max(row[feature]);
    }
    (min, max)
}

fn path_length(node: &Node, point: &[f64], depth: f64) -> f64 {
    match node {
        Node::Leaf { size } => depth + average_path_length(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            if point[*feature] < *threshold {
                path_length(left, point, depth + 1.0)
            } else {
                path_length(right, point, depth + 1.0)
            }
        }
    }
}

/// Expected path length of an unsuccessful BST search over `n` points; the
/// standard normalizer from the isolation forest paper.
fn average_path_length(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let n = n as f64;
    2.0 * ((n - 1.0).ln() + EULER_MASCHERONI) - 2.0 * (n - 1.0) / n
}

/// Decision threshold for a fixed contamination expectation: the score value
/// below which `1 - contamination` of the training points fall.
pub fn decision_threshold(mut training_scores: Vec<f64>, contamination: f64) -> f64 {
    if training_scores.is_empty() {
        return 1.0;
    }
    training_scores.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let contamination = contamination.clamp(0.0, 1.0);
    let cut = ((training_scores.len() as f64) * (1.0 - contamination)).ceil() as usize;
    let idx = cut.clamp(1, training_scores.len()) - 1;
    training_scores[idx]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn obvious_outlier_scores_higher_than_the_cluster() {
        let mut data: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![1.0 + (i % 3) as f64 * 0.1, 2.0, 0.0])
            .collect();
        data.push(vec![60.0, 0.0, 9.0]);

        let forest = IsolationForest::fit(&data, 100, 32, &mut rng()).unwrap();
        let cluster_score = forest.score(&data[0]);
        let outlier_score = forest.score(&[60.0, 0.0, 9.0]);
        assert!(
            outlier_score > cluster_score,
            "outlier {outlier_score} vs cluster {cluster_score}"
        );
        assert!(outlier_score > 0.55);
    }

    #[test]
    fn empty_data_yields_no_model() {
        assert!(IsolationForest::fit(&[], 10, 8, &mut rng()).is_none());
    }

    #[test]
    fn threshold_tracks_contamination() {
        let scores = vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0];
        let threshold = decision_threshold(scores, 0.1);
        // 90% of training points fall at or below the threshold.
        assert!((threshold - 0.9).abs() < 1e-9);
    }

    #[test]
    fn identical_points_do_not_panic() {
        let data = vec![vec![1.0, 1.0]; 10];
        let forest = IsolationForest::fit(&data, 20, 8, &mut rng()).unwrap();
        let score = forest.score(&[1.0, 1.0]);
        assert!((0.0..=1.0).contains(&score));
    }
}
