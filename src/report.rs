//! Evaluation bundles behind `/run-ml` and `/run-dt`.
//!
//! Both read the dataset fresh, re-create the stratified split and score the
//! registered artifacts on the held-out partition. Nothing is retrained.

use std::collections::BTreeMap;
use std::path::Path;

use log::{info, warn};
use plotters::style::RGBColor;
use serde::Serialize;

use crate::dataset::{load_dataset, Dataset, Partition, SplitConfig};
use crate::error::EvaluationError;
use crate::evaluation::{
    auc, average_precision, evaluate, ClassificationReport, ConfusionMatrix, CurveSummary, Evaluation,
    ModelMetrics, TARGET_NAMES,
};
use crate::memory::memory_mib;
use crate::plots::charts::{ACCENT_PINK, ACCENT_RASPBERRY, EXITS_RED, LIGHT_PINK, STAYS_GREEN};
use crate::plots::{BarChart, BarSeries, Chart, Heatmap, Line, LineChart, Palette, PieChart, PieSlice, Renderer};
use crate::registry::{ModelArtifact, ModelKey, ModelRegistry};

const DIAGONAL_GRAY: RGBColor = RGBColor(150, 150, 150);
const CURVE_BLUE: RGBColor = RGBColor(31, 119, 180);
const METRIC_COLORS: [RGBColor; 4] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(148, 103, 189),
];

fn confusion_heatmap(title: String, values: Vec<Vec<f64>>, range: (f64, f64), palette: Palette, decimals: usize) -> Heatmap {
    let labels: Vec<String> = TARGET_NAMES.iter().map(|s| s.to_string()).collect();
    Heatmap {
        title,
        x_labels: labels.clone(),
        y_labels: labels,
        values,
        range,
        palette,
        decimals,
        x_desc: "Predicted label".into(),
        y_desc: "True label".into(),
    }
}

pub fn confusion_chart(renderer: &Renderer, name: &str, cm: &ConfusionMatrix, palette: Palette) -> Chart {
    let values: Vec<Vec<f64>> = cm
        .counts
        .iter()
        .map(|row| row.iter().map(|&c| c as f64).collect())
        .collect();
    let max = values.iter().flatten().copied().fold(0.0, f64::max);
    let plot = confusion_heatmap(format!("{name} confusion matrix"), values, (0.0, max), palette, 0);
    renderer.heatmap(&plot).into()
}

pub fn normalized_confusion_chart(renderer: &Renderer, name: &str, cm: &ConfusionMatrix, palette: Palette) -> Chart {
    let values = cm.normalized().values.iter().map(|row| row.to_vec()).collect();
    let plot = confusion_heatmap(format!("{name} normalized confusion matrix"), values, (0.0, 1.0), palette, 2);
    renderer.heatmap(&plot).into()
}

/// Horizontal bars of importances in percent, largest on top.
pub fn importance_chart(renderer: &Renderer, name: &str, features: &[String], importances: &[f64], color: RGBColor) -> Chart {
    let mut ranked: Vec<(&String, f64)> = features.iter().zip(importances.iter().map(|v| v * 100.0)).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    let (names, values): (Vec<String>, Vec<f64>) = ranked.into_iter().map(|(n, v)| (n.clone(), v)).unzip();
    let plot = BarChart::horizontal(
        format!("{name} feature importance"),
        names,
        vec![BarSeries::new("Importance (%)", color, values)],
    )
    .axes("Importance (%)", "")
    .annotated();
    renderer.bar_chart(&plot).into()
}

fn points(x: &[f64], y: &[f64]) -> Vec<(f64, f64)> {
    x.iter().copied().zip(y.iter().copied()).collect()
}

/// ROC curve with its AUC, or the reason it cannot be drawn.
pub fn roc_chart(renderer: &Renderer, name: &str, evaluation: &Evaluation, y_true: &[u8], color: RGBColor) -> Option<Chart> {
    let chart = evaluation.roc(y_true)?.map_err(|e| e.to_string()).and_then(|curve| {
        let plot = LineChart {
            title: format!("{name} ROC curve (AUC = {:.2})", auc(&curve)),
            x_desc: "False positive rate".into(),
            y_desc: "True positive rate".into(),
            lines: vec![
                Line::new(name, color, points(&curve.x, &curve.y)),
                Line::new("Random", DIAGONAL_GRAY, vec![(0.0, 0.0), (1.0, 1.0)]),
            ],
            x_range: (0.0, 1.0),
            y_range: (0.0, 1.05),
        };
        renderer.line_chart(&plot).map_err(|e| e.to_string())
    });
    Some(into_chart(chart))
}

pub fn precision_recall_chart(
    renderer: &Renderer,
    name: &str,
    evaluation: &Evaluation,
    y_true: &[u8],
    color: RGBColor,
) -> Option<Chart> {
    let probabilities = evaluation.probabilities.as_ref()?;
    let chart = evaluation
        .precision_recall(y_true)?
        .and_then(|curve| Ok((curve, average_precision(y_true, probabilities)?)))
        .map_err(|e| e.to_string())
        .and_then(|(curve, ap)| {
            let plot = LineChart {
                title: format!("{name} precision-recall curve (AP = {ap:.2})"),
                x_desc: "Recall".into(),
                y_desc: "Precision".into(),
                lines: vec![Line::new(name, color, points(&curve.x, &curve.y))],
                x_range: (0.0, 1.0),
                y_range: (0.0, 1.05),
            };
            renderer.line_chart(&plot).map_err(|e| e.to_string())
        });
    Some(into_chart(chart))
}

fn into_chart(result: Result<String, String>) -> Chart {
    match result {
        Ok(image) => Chart::Image(image),
        Err(error) => {
            warn!("chart not rendered: {error}");
            Chart::Failed { error }
        }
    }
}

/// Per-class precision, recall and F1 as horizontal grouped bars.
pub fn classification_report_chart(
    renderer: &Renderer,
    title: &str,
    report: &ClassificationReport,
    colors: [RGBColor; 2],
) -> Chart {
    let [stays, exits] = report.classes;
    let plot = BarChart::horizontal(
        title,
        vec!["precision".into(), "recall".into(), "f1-score".into()],
        vec![
            BarSeries::new("Customers who did not churn", colors[0], vec![stays.precision, stays.recall, stays.f1]),
            BarSeries::new("Customers who churn", colors[1], vec![exits.precision, exits.recall, exits.f1]),
        ],
    )
    .axes("Score", "")
    .range(0.0, 1.0)
    .annotated();
    renderer.bar_chart(&plot).into()
}

fn comparison_chart(renderer: &Renderer, rows: &[(String, ModelMetrics)]) -> Chart {
    let names = rows.iter().map(|(name, _)| name.clone()).collect();
    let column = |f: fn(&ModelMetrics) -> f64| rows.iter().map(|(_, m)| f(m)).collect::<Vec<f64>>();
    let plot = BarChart::vertical(
        "Model comparison",
        names,
        vec![
            BarSeries::new("Precision", METRIC_COLORS[0], column(|m| m.precision)),
            BarSeries::new("Recall", METRIC_COLORS[1], column(|m| m.recall)),
            BarSeries::new("F1 (macro)", METRIC_COLORS[2], column(|m| m.f1_macro)),
            BarSeries::new("Accuracy", METRIC_COLORS[3], column(|m| m.accuracy)),
        ],
    )
    .axes("Model", "Score")
    .range(0.0, 1.0);
    renderer.bar_chart(&plot).into()
}

fn class_balance_chart(renderer: &Renderer, labels: &[u8]) -> Chart {
    let exits = labels.iter().filter(|&&v| v == 1).count() as f64;
    let stays = labels.len() as f64 - exits;
    let plot = PieChart {
        title: "Class balance".into(),
        slices: vec![
            PieSlice {
                label: TARGET_NAMES[0].into(),
                value: stays,
                color: STAYS_GREEN,
            },
            PieSlice {
                label: TARGET_NAMES[1].into(),
                value: exits,
                color: EXITS_RED,
            },
        ],
    };
    renderer.pie(&plot).into()
}

/// Training against testing accuracy for the two SVM variants.
fn svm_accuracy_chart(renderer: &Renderer, rows: &[(&str, f64, f64)]) -> Chart {
    let plot = BarChart::vertical(
        "SVM accuracy",
        rows.iter().map(|(name, _, _)| name.to_string()).collect(),
        vec![
            BarSeries::new("Training", ACCENT_RASPBERRY, rows.iter().map(|r| r.1).collect()),
            BarSeries::new("Testing", LIGHT_PINK, rows.iter().map(|r| r.2).collect()),
        ],
    )
    .axes("", "Accuracy")
    .range(0.0, 1.0)
    .annotated();
    renderer.bar_chart(&plot).into()
}

fn evaluate_artifact(artifact: &ModelArtifact, test: &Partition) -> Result<Evaluation, EvaluationError> {
    let x = artifact.transform(&test.features).map_err(|source| EvaluationError::Model {
        key: artifact.key.to_string(),
        source,
    })?;
    evaluate(artifact.key.as_str(), &artifact.model, &x, &test.labels)
}

#[derive(Clone, Debug, Serialize)]
pub struct ConfusionCharts {
    pub normal: Chart,
    pub normalized: Chart,
}

#[derive(Clone, Debug, Serialize)]
pub struct ConfusionValues {
    pub normal: [[u64; 2]; 2],
    pub normalized: [[f64; 2]; 2],
    pub absent_classes: Vec<String>,
}

impl From<&ConfusionMatrix> for ConfusionValues {
    fn from(cm: &ConfusionMatrix) -> Self {
        let normalized = cm.normalized();
        Self {
            normal: cm.counts,
            normalized: normalized.values,
            absent_classes: normalized.absent_classes,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct MlReport {
    pub model_metrics: BTreeMap<String, ModelMetrics>,
    pub svm_metrics: BTreeMap<String, ModelMetrics>,
    pub confusion_matrices: BTreeMap<String, ConfusionCharts>,
    pub confusion_matrix_values: BTreeMap<String, ConfusionValues>,
    pub roc_curves: BTreeMap<String, Chart>,
    pub precision_recall_curves: BTreeMap<String, Chart>,
    pub curve_summaries: BTreeMap<String, CurveSummary>,
    pub feature_importances: BTreeMap<String, Chart>,
    pub model_comparison: Chart,
    pub class_balance: Chart,
    pub svm_accuracy: Chart,
    pub svm_classification_report: Chart,
    /// Models that could not be scored, with the reason.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub model_errors: BTreeMap<String, String>,
}

/// Score every registered model on the held-out partition and draw the
/// comparison charts.
pub fn ml_report(
    registry: &ModelRegistry,
    dataset: &Dataset,
    split: &SplitConfig,
    renderer: &Renderer,
) -> Result<MlReport, EvaluationError> {
    let (_, test) = dataset.partitions(split)?;
    let y = &test.labels;

    let mut report = MlReport {
        model_metrics: BTreeMap::new(),
        svm_metrics: BTreeMap::new(),
        confusion_matrices: BTreeMap::new(),
        confusion_matrix_values: BTreeMap::new(),
        roc_curves: BTreeMap::new(),
        precision_recall_curves: BTreeMap::new(),
        curve_summaries: BTreeMap::new(),
        feature_importances: BTreeMap::new(),
        model_comparison: Chart::Failed {
            error: "no models registered".into(),
        },
        class_balance: class_balance_chart(renderer, &dataset.labels()),
        svm_accuracy: Chart::Failed {
            error: "no SVM models registered".into(),
        },
        svm_classification_report: Chart::Failed {
            error: "SVM with SMOTE is not registered".into(),
        },
        model_errors: BTreeMap::new(),
    };
    let mut comparison = Vec::with_capacity(registry.len());
    let mut svm_accuracy = Vec::new();

    for artifact in registry.iter() {
        let key = artifact.key.as_str();
        let name = artifact.name.as_str();
        let evaluation = match evaluate_artifact(artifact, &test) {
            Ok(evaluation) => evaluation,
            Err(err) => {
                warn!("{key} left out of the report: {err}");
                report.model_errors.insert(key.to_string(), err.to_string());
                continue;
            }
        };

        report.model_metrics.insert(key.to_string(), evaluation.metrics);
        comparison.push((name.to_string(), evaluation.metrics));
        if matches!(artifact.key, ModelKey::Svm | ModelKey::SvmSmote) {
            report.svm_metrics.insert(key.to_string(), evaluation.metrics);
            svm_accuracy.push((name, artifact.train_score, evaluation.metrics.accuracy));
        }
        if artifact.key == ModelKey::SvmSmote {
            report.svm_classification_report = classification_report_chart(
                renderer,
                "SVM with SMOTE classification report",
                &evaluation.confusion.report(),
                [ACCENT_RASPBERRY, LIGHT_PINK],
            );
        }

        report.confusion_matrices.insert(
            name.to_string(),
            ConfusionCharts {
                normal: confusion_chart(renderer, name, &evaluation.confusion, Palette::Blues),
                normalized: normalized_confusion_chart(renderer, name, &evaluation.confusion, Palette::Blues),
            },
        );
        report
            .confusion_matrix_values
            .insert(key.to_string(), ConfusionValues::from(&evaluation.confusion));

        if let Some(chart) = roc_chart(renderer, name, &evaluation, y, CURVE_BLUE) {
            report.roc_curves.insert(name.to_string(), chart);
        }
        if let Some(chart) = precision_recall_chart(renderer, name, &evaluation, y, CURVE_BLUE) {
            report.precision_recall_curves.insert(name.to_string(), chart);
        }
        match evaluation.curve_summary(y) {
            Some(Ok(summary)) => {
                report.curve_summaries.insert(key.to_string(), summary);
            }
            Some(Err(err)) => warn!("no curve summary for {key}: {err}"),
            None => {}
        }
        if let Some(importances) = artifact.feature_importances() {
            let features = artifact.preprocessor.feature_names();
            report.feature_importances.insert(
                name.to_string(),
                importance_chart(renderer, name, &features, &importances, CURVE_BLUE),
            );
        }
    }

    if !comparison.is_empty() {
        report.model_comparison = comparison_chart(renderer, &comparison);
    }
    if !svm_accuracy.is_empty() {
        report.svm_accuracy = svm_accuracy_chart(renderer, &svm_accuracy);
    }
    Ok(report)
}

#[derive(Clone, Debug, Serialize)]
pub struct DtReport {
    pub confusion_matrix: Chart,
    pub feature_importance: Chart,
    pub roc_curve: Chart,
    pub precision_recall_curve: Chart,
    pub classification_report: String,
    pub classification_report_chart: Chart,
    pub best_params: serde_json::Value,
    pub train_score: f64,
    pub test_score: f64,
    pub metrics: ModelMetrics,
}

fn not_available(what: &str) -> Chart {
    Chart::Failed {
        error: format!("decision tree has no {what}"),
    }
}

/// Deep dive into the stored decision tree.
pub fn dt_report(
    registry: &ModelRegistry,
    dataset: &Dataset,
    split: &SplitConfig,
    renderer: &Renderer,
) -> Result<DtReport, EvaluationError> {
    let artifact = registry
        .get(ModelKey::Dt)
        .ok_or_else(|| EvaluationError::MissingModel(ModelKey::Dt.to_string()))?;
    let (_, test) = dataset.partitions(split)?;
    let y = &test.labels;
    let evaluation = evaluate_artifact(artifact, &test)?;
    let name = artifact.name.as_str();
    let report = evaluation.confusion.report();

    let feature_importance = match artifact.feature_importances() {
        Some(importances) => importance_chart(
            renderer,
            name,
            &artifact.preprocessor.feature_names(),
            &importances,
            ACCENT_PINK,
        ),
        None => not_available("feature importances"),
    };

    Ok(DtReport {
        confusion_matrix: normalized_confusion_chart(renderer, name, &evaluation.confusion, Palette::Light(ACCENT_PINK)),
        feature_importance,
        roc_curve: roc_chart(renderer, name, &evaluation, y, ACCENT_PINK)
            .unwrap_or_else(|| not_available("probabilities")),
        precision_recall_curve: precision_recall_chart(renderer, name, &evaluation, y, ACCENT_PINK)
            .unwrap_or_else(|| not_available("probabilities")),
        classification_report: report.to_text(),
        classification_report_chart: classification_report_chart(
            renderer,
            "Decision Tree classification report",
            &report,
            [ACCENT_PINK, LIGHT_PINK],
        ),
        best_params: artifact.params.clone(),
        train_score: artifact.train_score,
        test_score: evaluation.metrics.accuracy,
        metrics: evaluation.metrics,
    })
}

/// `/run-ml`: read the dataset at `path` and build the full model report.
pub fn run_ml(
    registry: &ModelRegistry,
    path: &Path,
    split: &SplitConfig,
    renderer: &Renderer,
) -> Result<MlReport, EvaluationError> {
    let dataset = load_dataset(path)?;
    let report = ml_report(registry, &dataset, split, renderer)?;
    info!(
        "evaluated {} models, memory usage {:.1} MiB",
        report.model_metrics.len(),
        memory_mib()
    );
    Ok(report)
}

/// `/run-dt`: read the dataset at `path` and build the decision tree report.
pub fn run_dt(
    registry: &ModelRegistry,
    path: &Path,
    split: &SplitConfig,
    renderer: &Renderer,
) -> Result<DtReport, EvaluationError> {
    let dataset = load_dataset(path)?;
    dt_report(registry, &dataset, split, renderer)
}
