//! Exploratory analysis of the churn dataset.
//!
//! The loaded frame is first flattened into an all-numeric one: Gender becomes
//! `Male = 1, Female = 0` and Geography is expanded into one 0/1 column per
//! country. Every chart and the summary are computed from that frame with
//! polars expressions.

use std::collections::BTreeMap;
use std::path::Path;

use log::info;
use plotters::style::{RGBColor, BLUE, GREEN, RED};
use polars::prelude::{
    col, count, lit, pearson_corr, when, DataFrame, DataType, Expr, IntoLazy, PolarsResult,
    QuantileInterpolOptions, Series, TakeRandom,
};
use serde::Serialize;

use crate::dataset::{load_dataset, Dataset};
use crate::error::DataError;
use crate::memory::memory_mib;
use crate::plots::charts::{EXITS_RED, STAYS_GREEN};
use crate::plots::{BarChart, BarSeries, Chart, Heatmap, Histogram, Palette, Renderer};
use crate::records::{FEATURE_COLUMNS, LABEL_COLUMN};

pub const HISTOGRAM_BINS: usize = 10;

/// 1.0 where `column` equals `value`, else 0.0.
fn indicator(column: &str, value: &str) -> Expr {
    when(col(column).eq(lit(value)))
        .then(lit(1.0))
        .otherwise(lit(0.0))
}

/// Distinct values of a text column, sorted.
fn categories(frame: &DataFrame, column: &str) -> PolarsResult<Vec<String>> {
    let unique = frame.column(column)?.unique()?.sort(false);
    let values = unique.utf8()?.into_iter().flatten().map(String::from).collect();
    Ok(values)
}

/// First value of a one-row frame's column, when finite.
fn scalar(frame: &DataFrame, column: &str) -> PolarsResult<Option<f64>> {
    let value = frame.column(column)?.cast(&DataType::Float64)?.f64()?.get(0);
    Ok(value.filter(|v| v.is_finite()))
}

fn values(series: &Series) -> PolarsResult<Vec<f64>> {
    let floats = series.cast(&DataType::Float64)?;
    let values = floats.f64()?.into_iter().flatten().collect();
    Ok(values)
}

/// The dataset with every column as `Float64`.
#[derive(Clone, Debug)]
pub struct EdaTable {
    pub frame: DataFrame,
}

impl EdaTable {
    pub fn from_dataset(dataset: &Dataset) -> PolarsResult<Self> {
        let countries = categories(&dataset.frame, "Geography")?;

        let mut columns = Vec::with_capacity(FEATURE_COLUMNS.len() + countries.len());
        for name in FEATURE_COLUMNS.iter().chain(std::iter::once(&LABEL_COLUMN)) {
            match *name {
                "Geography" => {}
                "Gender" => columns.push(indicator("Gender", "Male").alias("Gender")),
                other => columns.push(col(other).cast(DataType::Float64)),
            }
        }
        for country in &countries {
            columns.push(indicator("Geography", country).alias(&format!("Geography_{country}")));
        }

        let frame = dataset.frame.clone().lazy().select(columns).collect()?;
        Ok(Self { frame })
    }

    pub fn names(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .into_iter()
            .map(String::from)
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<Vec<f64>> {
        values(self.frame.column(name).ok()?).ok()
    }

    /// Pearson correlation of every column pair. Constant columns correlate 0.
    pub fn correlation(&self) -> PolarsResult<Vec<Vec<f64>>> {
        let names = self.names();
        let pair = |a: &str, b: &str| format!("{a}|{b}");

        let mut exprs = Vec::with_capacity(names.len() * (names.len() + 1) / 2);
        for (i, a) in names.iter().enumerate() {
            for b in &names[i..] {
                exprs.push(pearson_corr(col(a), col(b), 1).alias(&pair(a, b)));
            }
        }
        let pairs = self.frame.clone().lazy().select(exprs).collect()?;

        let n = names.len();
        let mut matrix = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in i..n {
                let r = scalar(&pairs, &pair(&names[i], &names[j]))?
                    .unwrap_or(0.0)
                    .clamp(-1.0, 1.0);
                matrix[i][j] = r;
                matrix[j][i] = r;
            }
        }
        Ok(matrix)
    }

    pub fn summary(&self) -> PolarsResult<BTreeMap<String, ColumnSummary>> {
        self.frame
            .get_columns()
            .iter()
            .map(|series| -> PolarsResult<(String, ColumnSummary)> {
                Ok((series.name().to_string(), ColumnSummary::of(series)?))
            })
            .collect()
    }
}

/// `describe()`-style statistics of one column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub count: usize,
    pub mean: Option<f64>,
    /// Sample standard deviation.
    pub std: Option<f64>,
    pub min: Option<f64>,
    #[serde(rename = "25%")]
    pub q25: Option<f64>,
    #[serde(rename = "50%")]
    pub median: Option<f64>,
    #[serde(rename = "75%")]
    pub q75: Option<f64>,
    pub max: Option<f64>,
}

impl ColumnSummary {
    pub fn of(series: &Series) -> PolarsResult<Self> {
        let present = series.cast(&DataType::Float64)?.drop_nulls();
        let count = present.len();
        if count == 0 {
            return Ok(Self::default());
        }

        let name = present.name().to_string();
        let quantile = |q: f64| col(&name).quantile(lit(q), QuantileInterpolOptions::Linear);
        let stats = DataFrame::new(vec![present])?
            .lazy()
            .select([
                col(&name).mean().alias("mean"),
                col(&name).std(1).alias("std"),
                col(&name).min().alias("min"),
                quantile(0.25).alias("25%"),
                quantile(0.5).alias("50%"),
                quantile(0.75).alias("75%"),
                col(&name).max().alias("max"),
            ])
            .collect()?;

        Ok(Self {
            count,
            mean: scalar(&stats, "mean")?,
            // a single value has no sample deviation
            std: if count > 1 { scalar(&stats, "std")? } else { None },
            min: scalar(&stats, "min")?,
            q25: scalar(&stats, "25%")?,
            median: scalar(&stats, "50%")?,
            q75: scalar(&stats, "75%")?,
            max: scalar(&stats, "max")?,
        })
    }
}

/// Stays/Exits counts per category of a grouping column.
#[derive(Clone, Debug, PartialEq)]
pub struct ChurnRisk {
    pub categories: Vec<String>,
    pub stays: Vec<f64>,
    pub exits: Vec<f64>,
}

impl ChurnRisk {
    pub fn by(dataset: &Dataset, column: &str) -> PolarsResult<Self> {
        let counts = dataset
            .frame
            .clone()
            .lazy()
            .groupby([col(column)])
            .agg([
                count().alias("customers"),
                col(LABEL_COLUMN).sum().alias("exits"),
            ])
            .sort(column, Default::default())
            .collect()?;

        let categories = counts
            .column(column)?
            .utf8()?
            .into_iter()
            .map(|c| c.unwrap_or_default().to_string())
            .collect();
        let customers = values(counts.column("customers")?)?;
        let exits = values(counts.column("exits")?)?;
        let stays = customers.iter().zip(&exits).map(|(n, e)| n - e).collect();
        Ok(ChurnRisk {
            categories,
            stays,
            exits,
        })
    }

    pub fn totals(&self) -> Vec<f64> {
        self.stays.iter().zip(&self.exits).map(|(s, e)| s + e).collect()
    }

    /// Share of each category's customers that stay and exit, in percent.
    pub fn percentages(&self) -> (Vec<f64>, Vec<f64>) {
        self.stays
            .iter()
            .zip(&self.exits)
            .map(|(&s, &e)| {
                let total = s + e;
                if total > 0.0 {
                    (s / total * 100.0, e / total * 100.0)
                } else {
                    (0.0, 0.0)
                }
            })
            .unzip()
    }

    fn panels(&self, column: &str) -> [BarChart; 2] {
        let (stays_pct, exits_pct) = self.percentages();
        [
            BarChart::vertical(
                format!("Churn count by {column}"),
                self.categories.clone(),
                vec![
                    BarSeries::new("Stays", STAYS_GREEN, self.stays.clone()),
                    BarSeries::new("Exits", EXITS_RED, self.exits.clone()),
                ],
            )
            .axes(column, "Customers")
            .annotated(),
            BarChart::vertical(
                format!("Churn rate by {column} (%)"),
                self.categories.clone(),
                vec![
                    BarSeries::new("Stays", STAYS_GREEN, stays_pct),
                    BarSeries::new("Exits", EXITS_RED, exits_pct),
                ],
            )
            .axes(column, "Percent")
            .range(0.0, 100.0)
            .annotated(),
        ]
    }

    fn distribution(&self, column: &str, colors: Vec<RGBColor>) -> BarChart {
        BarChart::vertical(
            format!("{column} distribution"),
            self.categories.clone(),
            vec![BarSeries {
                name: "Customers".into(),
                colors,
                values: self.totals(),
            }],
        )
        .axes(column, "Customers")
        .annotated()
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct EdaBundle {
    pub churn_risk_by_gender: Chart,
    pub churn_risk_by_geography: Chart,
    pub histogram: Chart,
    pub gender_distribution: Chart,
    pub geography_distribution: Chart,
    pub correlation_heatmap: Chart,
    pub summary: BTreeMap<String, ColumnSummary>,
}

pub fn eda_bundle(dataset: &Dataset, renderer: &Renderer) -> PolarsResult<EdaBundle> {
    let table = EdaTable::from_dataset(dataset)?;
    let names = table.names();

    let histograms = table
        .frame
        .get_columns()
        .iter()
        .map(|series| -> PolarsResult<Histogram> {
            Ok(Histogram {
                title: series.name().to_string(),
                values: values(series)?,
                bins: HISTOGRAM_BINS,
            })
        })
        .collect::<PolarsResult<Vec<Histogram>>>()?;

    let correlation = Heatmap {
        title: "Correlation matrix".into(),
        x_labels: names.clone(),
        y_labels: names,
        values: table.correlation()?,
        range: (-1.0, 1.0),
        palette: Palette::RdBu,
        decimals: 2,
        x_desc: String::new(),
        y_desc: String::new(),
    };

    let by_gender = ChurnRisk::by(dataset, "Gender")?;
    let by_geography = ChurnRisk::by(dataset, "Geography")?;
    let gender = by_gender.distribution("Gender", vec![BLUE, GREEN]);
    let geography = by_geography.distribution("Geography", vec![BLUE, GREEN, RED]);

    Ok(EdaBundle {
        churn_risk_by_gender: renderer.bar_panels(&by_gender.panels("Gender")).into(),
        churn_risk_by_geography: renderer.bar_panels(&by_geography.panels("Geography")).into(),
        histogram: renderer.histograms(&histograms).into(),
        gender_distribution: renderer.bar_chart(&gender).into(),
        geography_distribution: renderer.bar_chart(&geography).into(),
        correlation_heatmap: renderer.heatmap(&correlation).into(),
        summary: table.summary()?,
    })
}

/// Read the dataset at `path` and build the EDA bundle.
pub fn run_eda(path: &Path, renderer: &Renderer) -> Result<EdaBundle, DataError> {
    let dataset = load_dataset(path)?;
    let bundle = eda_bundle(&dataset, renderer)?;
    info!(
        "EDA over {} rows done, memory usage {:.1} MiB",
        dataset.len(),
        memory_mib()
    );
    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::fixtures::churn_dataset;
    use polars::prelude::{df, NamedFrom};

    #[test]
    fn table_encodes_gender_and_geography() {
        let dataset = churn_dataset(6);
        let table = EdaTable::from_dataset(&dataset).unwrap();
        assert_eq!(table.get("Gender").unwrap(), vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0]);
        assert_eq!(
            table.get("Geography_Germany").unwrap(),
            vec![0.0, 1.0, 0.0, 0.0, 1.0, 0.0]
        );
        assert_eq!(table.frame.width(), 13);
        assert_eq!(table.names()[0], "CreditScore");
        assert_eq!(table.names()[12], "Geography_Spain");
    }

    #[test]
    fn correlation_is_symmetric_with_unit_diagonal() {
        let table = EdaTable::from_dataset(&churn_dataset(90)).unwrap();
        let corr = table.correlation().unwrap();
        for i in 0..corr.len() {
            assert!((corr[i][i] - 1.0).abs() < 1e-9);
            for j in 0..corr.len() {
                assert!((corr[i][j] - corr[j][i]).abs() < 1e-12);
                assert!(corr[i][j].abs() <= 1.0);
            }
        }
    }

    #[test]
    fn constant_columns_correlate_zero() {
        let table = EdaTable {
            frame: df!("flat" => [1.0, 1.0, 1.0], "rising" => [1.0, 2.0, 3.0]).unwrap(),
        };
        let corr = table.correlation().unwrap();
        assert_eq!(corr[0][1], 0.0);
        assert_eq!(corr[0][0], 0.0);
        assert!((corr[1][1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn summary_matches_describe() {
        let s = ColumnSummary::of(&Series::new("x", &[1.0, 2.0, 3.0, 4.0])).unwrap();
        assert_eq!(s.count, 4);
        assert_eq!(s.mean, Some(2.5));
        assert_eq!(s.q25, Some(1.75));
        assert_eq!(s.median, Some(2.5));
        assert_eq!(s.q75, Some(3.25));
        assert_eq!(s.min, Some(1.0));
        assert!((s.std.unwrap() - 1.290_994_448_735_805_6).abs() < 1e-12);

        let single = ColumnSummary::of(&Series::new("x", &[7.0])).unwrap();
        let json = serde_json::to_value(single).unwrap();
        assert_eq!(json["50%"], 7.0);
        assert!(json["std"].is_null());
    }

    #[test]
    fn churn_risk_groups_by_category() {
        let risk = ChurnRisk::by(&churn_dataset(120), "Gender").unwrap();
        assert_eq!(risk.categories, vec!["Female", "Male"]);
        assert_eq!(risk.totals(), vec![60.0, 60.0]);
        let (stays, exits) = risk.percentages();
        for (s, e) in stays.iter().zip(&exits) {
            assert!((s + e - 100.0).abs() < 1e-9);
        }

        let dataset = churn_dataset(120);
        let by_country = ChurnRisk::by(&dataset, "Geography").unwrap();
        assert_eq!(by_country.categories, vec!["France", "Germany", "Spain"]);
        let exits: f64 = by_country.exits.iter().sum();
        let labelled = dataset.labels().iter().filter(|&&l| l == 1).count();
        assert_eq!(exits, labelled as f64);
    }

    #[test]
    fn bundle_renders_every_chart() {
        let bundle = eda_bundle(&churn_dataset(60), &Renderer::unlabeled()).unwrap();
        let json = serde_json::to_value(&bundle).unwrap();
        for key in [
            "churn_risk_by_gender",
            "churn_risk_by_geography",
            "histogram",
            "gender_distribution",
            "geography_distribution",
            "correlation_heatmap",
        ] {
            assert!(json[key].is_string(), "{key} was not rendered");
        }
        assert_eq!(json["summary"]["Age"]["count"], 60);
        assert_eq!(json["summary"]["Geography_France"]["max"], 1.0);
    }
}
