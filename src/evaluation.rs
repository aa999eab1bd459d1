//! Classification metrics over a held-out partition.
//!
//! Class 0 is "Stays" and class 1 is "Exits" everywhere in this module.
//! Divisions by zero (no predicted positives, an empty class) yield 0.0.

use std::fmt::Write as _;

use serde::Serialize;

use crate::error::{EvaluationError, ModelError};
use crate::models::Classifier;

pub const TARGET_NAMES: [&str; 2] = ["Stays", "Exits"];

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

/// 2×2 confusion matrix, rows are true labels and columns are predictions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    pub counts: [[u64; 2]; 2],
}

/// Row-normalized confusion matrix.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NormalizedMatrix {
    pub values: [[f64; 2]; 2],
    /// Classes with no true samples; their rows are all zero.
    pub absent_classes: Vec<String>,
}

impl ConfusionMatrix {
    pub fn from_labels(y_true: &[u8], y_pred: &[u8]) -> Result<Self, EvaluationError> {
        if y_true.len() != y_pred.len() {
            return Err(EvaluationError::LengthMismatch(y_true.len(), y_pred.len()));
        }
        let mut counts = [[0u64; 2]; 2];
        for (&t, &p) in y_true.iter().zip(y_pred) {
            if let Some(&bad) = [t, p].iter().find(|&&label| label > 1) {
                return Err(EvaluationError::InvalidLabel(bad));
            }
            counts[usize::from(t)][usize::from(p)] += 1;
        }
        Ok(Self { counts })
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }

    pub fn support(&self, class: usize) -> u64 {
        self.counts[class].iter().sum()
    }

    fn predicted(&self, class: usize) -> u64 {
        self.counts[0][class] + self.counts[1][class]
    }

    pub fn accuracy(&self) -> f64 {
        ratio(
            (self.counts[0][0] + self.counts[1][1]) as f64,
            self.total() as f64,
        )
    }

    pub fn normalized(&self) -> NormalizedMatrix {
        let mut values = [[0.0; 2]; 2];
        let mut absent_classes = Vec::new();
        for (class, row) in self.counts.iter().enumerate() {
            let support = self.support(class);
            if support == 0 {
                absent_classes.push(TARGET_NAMES[class].to_string());
                continue;
            }
            for (col, &count) in row.iter().enumerate() {
                values[class][col] = count as f64 / support as f64;
            }
        }
        NormalizedMatrix {
            values,
            absent_classes,
        }
    }

    pub fn class_metrics(&self, class: usize) -> ClassMetrics {
        let hits = self.counts[class][class] as f64;
        let precision = ratio(hits, self.predicted(class) as f64);
        let recall = ratio(hits, self.support(class) as f64);
        ClassMetrics {
            precision,
            recall,
            f1: ratio(2.0 * precision * recall, precision + recall),
            support: self.support(class),
        }
    }

    /// Classes that occur in the true or the predicted labels.
    pub fn present_classes(&self) -> Vec<usize> {
        (0..2)
            .filter(|&class| self.support(class) + self.predicted(class) > 0)
            .collect()
    }

    /// Precision, recall and F1 averaged over the present classes, plus accuracy.
    pub fn metrics(&self) -> ModelMetrics {
        let (precision, recall, f1_macro) = self.report().average(false);
        ModelMetrics {
            precision,
            recall,
            f1_macro,
            accuracy: self.accuracy(),
        }
    }

    pub fn report(&self) -> ClassificationReport {
        ClassificationReport {
            classes: [self.class_metrics(0), self.class_metrics(1)],
            present: self.present_classes(),
            accuracy: self.accuracy(),
            total: self.total(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ModelMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_macro: f64,
    pub accuracy: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClassificationReport {
    pub classes: [ClassMetrics; 2],
    /// Indices into `classes` seen in the true or predicted labels.
    pub present: Vec<usize>,
    pub accuracy: f64,
    pub total: u64,
}

impl ClassificationReport {
    /// Macro or support-weighted average over the present classes.
    pub fn average(&self, weighted: bool) -> (f64, f64, f64) {
        let rows: Vec<&ClassMetrics> = self.present.iter().map(|&class| &self.classes[class]).collect();
        let weight = |c: &ClassMetrics| {
            if weighted {
                ratio(c.support as f64, self.total as f64)
            } else {
                ratio(1.0, rows.len() as f64)
            }
        };
        let sum = |f: fn(&ClassMetrics) -> f64| -> f64 { rows.iter().map(|&c| f(c) * weight(c)).sum() };
        (sum(|c| c.precision), sum(|c| c.recall), sum(|c| c.f1))
    }

    /// Plain-text table with per-class rows, accuracy and the macro and
    /// weighted averages.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:>14} {:>9} {:>9} {:>9} {:>9}\n",
            "", "precision", "recall", "f1-score", "support"
        );
        for &class in &self.present {
            let m = &self.classes[class];
            let _ = writeln!(
                out,
                "{:>14} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                class, m.precision, m.recall, m.f1, m.support
            );
        }
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{:>14} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.total
        );
        for (label, weighted) in [("macro avg", false), ("weighted avg", true)] {
            let (p, r, f) = self.average(weighted);
            let _ = writeln!(
                out,
                "{:>14} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                label, p, r, f, self.total
            );
        }
        out
    }
}

/// Points of a ROC or precision-recall curve.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Curve {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct CurveSummary {
    pub roc_auc: f64,
    pub average_precision: f64,
}

/// Cumulative true and false positive counts after each distinct score,
/// walking the scores from highest to lowest.
fn ranked_counts(y_true: &[u8], scores: &[f64]) -> Result<(Vec<(f64, f64)>, f64, f64), EvaluationError> {
    if y_true.len() != scores.len() {
        return Err(EvaluationError::LengthMismatch(y_true.len(), scores.len()));
    }
    let positives = y_true.iter().filter(|&&v| v == 1).count() as f64;
    let negatives = y_true.len() as f64 - positives;
    if positives == 0.0 || negatives == 0.0 {
        return Err(EvaluationError::SingleClass);
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut counts = Vec::new();
    let (mut tp, mut fp) = (0.0, 0.0);
    for (pos, &i) in order.iter().enumerate() {
        if y_true[i] == 1 {
            tp += 1.0;
        } else {
            fp += 1.0;
        }
        let last_of_group = order
            .get(pos + 1)
            .map_or(true, |&next| scores[next] != scores[i]);
        if last_of_group {
            counts.push((tp, fp));
        }
    }
    Ok((counts, positives, negatives))
}

pub fn roc_curve(y_true: &[u8], scores: &[f64]) -> Result<Curve, EvaluationError> {
    let (counts, positives, negatives) = ranked_counts(y_true, scores)?;
    let mut curve = Curve {
        x: vec![0.0],
        y: vec![0.0],
    };
    for (tp, fp) in counts {
        curve.x.push(fp / negatives);
        curve.y.push(tp / positives);
    }
    Ok(curve)
}

/// Area under a curve by the trapezoidal rule.
pub fn auc(curve: &Curve) -> f64 {
    curve
        .x
        .windows(2)
        .zip(curve.y.windows(2))
        .map(|(x, y)| (x[1] - x[0]) * (y[0] + y[1]) / 2.0)
        .sum()
}

/// Recall on `x`, precision on `y`, starting from `(0, 1)`.
pub fn precision_recall_curve(y_true: &[u8], scores: &[f64]) -> Result<Curve, EvaluationError> {
    let (counts, positives, _) = ranked_counts(y_true, scores)?;
    let mut curve = Curve {
        x: vec![0.0],
        y: vec![1.0],
    };
    for (tp, fp) in counts {
        curve.x.push(tp / positives);
        curve.y.push(tp / (tp + fp));
    }
    Ok(curve)
}

/// `Σ (R_n − R_{n−1}) P_n` over descending score thresholds.
pub fn average_precision(y_true: &[u8], scores: &[f64]) -> Result<f64, EvaluationError> {
    let (counts, positives, _) = ranked_counts(y_true, scores)?;
    let mut previous_recall = 0.0;
    let mut total = 0.0;
    for (tp, fp) in counts {
        let recall = tp / positives;
        total += (recall - previous_recall) * tp / (tp + fp);
        previous_recall = recall;
    }
    Ok(total)
}

/// Everything computed for one model on one partition.
#[derive(Clone, Debug)]
pub struct Evaluation {
    pub predictions: Vec<u8>,
    pub probabilities: Option<Vec<f64>>,
    pub confusion: ConfusionMatrix,
    pub metrics: ModelMetrics,
}

impl Evaluation {
    pub fn roc(&self, y_true: &[u8]) -> Option<Result<Curve, EvaluationError>> {
        self.probabilities.as_ref().map(|p| roc_curve(y_true, p))
    }

    pub fn precision_recall(&self, y_true: &[u8]) -> Option<Result<Curve, EvaluationError>> {
        self.probabilities
            .as_ref()
            .map(|p| precision_recall_curve(y_true, p))
    }

    pub fn curve_summary(&self, y_true: &[u8]) -> Option<Result<CurveSummary, EvaluationError>> {
        let probabilities = self.probabilities.as_ref()?;
        Some(roc_curve(y_true, probabilities).and_then(|roc| {
            Ok(CurveSummary {
                roc_auc: auc(&roc),
                average_precision: average_precision(y_true, probabilities)?,
            })
        }))
    }
}

/// Predict `x` with the model registered as `key` and score the result
/// against `y_true`.
pub fn evaluate(
    key: &str,
    model: &dyn Classifier,
    x: &[Vec<f64>],
    y_true: &[u8],
) -> Result<Evaluation, EvaluationError> {
    let wrap = |source: ModelError| EvaluationError::Model {
        key: key.to_string(),
        source,
    };
    let predictions = model.predict(x).map_err(wrap)?;
    let probabilities = model.predict_proba(x).transpose().map_err(wrap)?;
    let confusion = ConfusionMatrix::from_labels(y_true, &predictions)?;
    Ok(Evaluation {
        metrics: confusion.metrics(),
        predictions,
        probabilities,
        confusion,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn confusion_counts_and_macro_metrics() {
        let y_true = [0, 0, 0, 0, 1, 1];
        let y_pred = [0, 0, 0, 1, 1, 0];
        let cm = ConfusionMatrix::from_labels(&y_true, &y_pred).unwrap();
        assert_eq!(cm.counts, [[3, 1], [1, 1]]);
        assert_eq!(cm.total(), 6);

        let m = cm.metrics();
        // precision: 3/4 and 1/2, recall: 3/4 and 1/2
        assert!(close(m.precision, 0.625));
        assert!(close(m.recall, 0.625));
        assert!(close(m.f1_macro, 0.625));
        assert!(close(m.accuracy, 4.0 / 6.0));
    }

    #[test]
    fn normalized_rows_sum_to_one_unless_absent() {
        let cm = ConfusionMatrix::from_labels(&[0, 0, 0, 0], &[0, 1, 1, 1]).unwrap();
        let norm = cm.normalized();
        assert!(close(norm.values[0][0] + norm.values[0][1], 1.0));
        assert_eq!(norm.values[1], [0.0, 0.0]);
        assert_eq!(norm.absent_classes, vec!["Exits".to_string()]);
    }

    #[test]
    fn zero_division_yields_zero() {
        let cm = ConfusionMatrix::from_labels(&[0, 1], &[0, 0]).unwrap();
        let exits = cm.class_metrics(1);
        assert_eq!((exits.precision, exits.recall, exits.f1), (0.0, 0.0, 0.0));
    }

    #[test]
    fn macro_average_skips_classes_never_seen() {
        let cm = ConfusionMatrix::from_labels(&[0, 0, 0], &[0, 0, 0]).unwrap();
        assert_eq!(cm.present_classes(), vec![0]);
        let m = cm.metrics();
        assert!(close(m.precision, 1.0));
        assert!(close(m.recall, 1.0));
        assert!(close(m.f1_macro, 1.0));

        let text = cm.report().to_text();
        assert!(!text.lines().any(|l| l.trim_start().starts_with("1 ")));
        let macro_line = text.lines().find(|l| l.contains("macro avg")).unwrap();
        assert!(macro_line.contains("1.00"));

        // a class only ever predicted still counts
        let cm = ConfusionMatrix::from_labels(&[0, 0], &[0, 1]).unwrap();
        assert_eq!(cm.present_classes(), vec![0, 1]);
        assert!(close(cm.metrics().precision, 0.5));
    }

    #[test]
    fn labels_outside_the_binary_range_are_rejected() {
        assert!(matches!(
            ConfusionMatrix::from_labels(&[0, 2], &[0, 1]),
            Err(EvaluationError::InvalidLabel(2))
        ));
        assert!(matches!(
            ConfusionMatrix::from_labels(&[0, 1], &[0, 7]),
            Err(EvaluationError::InvalidLabel(7))
        ));
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        assert!(matches!(
            ConfusionMatrix::from_labels(&[0, 1], &[0]),
            Err(EvaluationError::LengthMismatch(2, 1))
        ));
    }

    #[test]
    fn perfect_ranking_has_unit_auc_and_ap() {
        let y = [0, 0, 1, 1];
        let scores = [0.1, 0.2, 0.8, 0.9];
        let roc = roc_curve(&y, &scores).unwrap();
        assert!(close(auc(&roc), 1.0));
        assert!(close(average_precision(&y, &scores).unwrap(), 1.0));
    }

    #[test]
    fn reversed_ranking_has_zero_auc() {
        let y = [1, 1, 0, 0];
        let scores = [0.1, 0.2, 0.8, 0.9];
        assert!(close(auc(&roc_curve(&y, &scores).unwrap()), 0.0));
        // Recall steps of 0.5 at precisions 1/3 and 2/4.
        assert!(close(average_precision(&y, &scores).unwrap(), 5.0 / 12.0));
    }

    #[test]
    fn tied_scores_form_a_single_threshold() {
        let y = [0, 1, 0, 1];
        let scores = [0.5; 4];
        let roc = roc_curve(&y, &scores).unwrap();
        assert_eq!(roc.x, vec![0.0, 1.0]);
        assert!(close(auc(&roc), 0.5));
        let pr = precision_recall_curve(&y, &scores).unwrap();
        assert_eq!(pr.x, vec![0.0, 1.0]);
        assert_eq!(pr.y, vec![1.0, 0.5]);
    }

    #[test]
    fn curves_need_both_classes() {
        assert!(matches!(
            roc_curve(&[1, 1], &[0.2, 0.4]),
            Err(EvaluationError::SingleClass)
        ));
    }

    #[test]
    fn report_text_lists_both_classes_and_averages() {
        let cm = ConfusionMatrix::from_labels(&[0, 0, 1, 1], &[0, 1, 1, 1]).unwrap();
        let text = cm.report().to_text();
        assert!(text.contains("precision"));
        assert!(text.contains("macro avg"));
        assert!(text.contains("weighted avg"));
        assert!(text.lines().any(|l| l.trim_start().starts_with("accuracy")));
        assert_eq!(cm.report().classes[1].support, 2);
    }
}
