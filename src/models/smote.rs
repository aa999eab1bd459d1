//! Synthetic minority over-sampling.
//!
//! New minority rows are placed at a random point on the segment between a
//! minority sample and one of its `k` nearest minority neighbours, until both
//! classes have the same count. Original rows come first in the output.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::check_training_set;
use crate::error::ModelError;

pub const DEFAULT_NEIGHBOURS: usize = 5;

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(a, b)| (a - b) * (a - b)).sum()
}

/// Indices (into `minority`) of the `k` nearest other minority rows of each row.
fn neighbours(x: &[Vec<f64>], minority: &[usize], k: usize) -> Vec<Vec<usize>> {
    minority
        .iter()
        .enumerate()
        .map(|(pos, &i)| {
            let mut others: Vec<(f64, usize)> = minority
                .iter()
                .enumerate()
                .filter(|&(other, _)| other != pos)
                .map(|(other, &j)| (squared_distance(&x[i], &x[j]), other))
                .collect();
            others.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            others.into_iter().take(k).map(|(_, other)| other).collect()
        })
        .collect()
}

pub fn smote(
    x: &[Vec<f64>],
    y: &[u8],
    k: usize,
    seed: u64,
) -> Result<(Vec<Vec<f64>>, Vec<u8>), ModelError> {
    check_training_set(x, y)?;

    let positives = y.iter().filter(|&&v| v == 1).count();
    let negatives = y.len() - positives;
    let minority_label = u8::from(positives < negatives);
    let deficit = positives.abs_diff(negatives);

    let mut rows = x.to_vec();
    let mut labels = y.to_vec();
    if deficit == 0 {
        return Ok((rows, labels));
    }

    let minority: Vec<usize> = (0..y.len()).filter(|&i| y[i] == minority_label).collect();
    if minority.len() < 2 {
        return Err(ModelError::Fit(format!(
            "SMOTE needs at least two minority samples, found {}",
            minority.len()
        )));
    }

    let neighbours = neighbours(x, &minority, k.max(1));
    let mut rng = StdRng::seed_from_u64(seed);
    rows.reserve(deficit);
    labels.reserve(deficit);
    for _ in 0..deficit {
        let pos = rng.gen_range(0..minority.len());
        let near = &neighbours[pos];
        let other = minority[near[rng.gen_range(0..near.len())]];
        let base = &x[minority[pos]];
        let gap: f64 = rng.gen();
        let synthetic = base
            .iter()
            .zip(&x[other])
            .map(|(a, b)| a + gap * (b - a))
            .collect();
        rows.push(synthetic);
        labels.push(minority_label);
    }

    Ok((rows, labels))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn imbalanced() -> (Vec<Vec<f64>>, Vec<u8>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..40 {
            x.push(vec![i as f64 / 40.0, 0.0]);
            y.push(0);
        }
        for i in 0..6 {
            x.push(vec![2.0 + i as f64, 1.0]);
            y.push(1);
        }
        (x, y)
    }

    #[test]
    fn balances_the_classes_and_keeps_originals_first() {
        let (x, y) = imbalanced();
        let (rows, labels) = smote(&x, &y, DEFAULT_NEIGHBOURS, 10).unwrap();
        assert_eq!(rows.len(), 80);
        assert_eq!(labels.iter().filter(|&&v| v == 1).count(), 40);
        assert_eq!(&rows[..x.len()], &x[..]);
        assert_eq!(&labels[..y.len()], &y[..]);
    }

    #[test]
    fn synthetic_rows_stay_inside_the_minority_hull() {
        let (x, y) = imbalanced();
        let (rows, _) = smote(&x, &y, 2, 3).unwrap();
        for row in &rows[x.len()..] {
            assert!((2.0..=7.0).contains(&row[0]));
            assert_eq!(row[1], 1.0);
        }
    }

    #[test]
    fn balanced_input_is_returned_unchanged() {
        let x = vec![vec![0.0], vec![1.0]];
        let y = vec![0, 1];
        assert_eq!(smote(&x, &y, 5, 1).unwrap(), (x, y));
    }

    #[test]
    fn lone_minority_sample_cannot_be_interpolated() {
        let x = vec![vec![0.0], vec![1.0], vec![2.0]];
        let y = vec![0, 0, 1];
        assert!(matches!(smote(&x, &y, 5, 1), Err(ModelError::Fit(_))));
    }
}
