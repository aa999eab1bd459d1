use polars::prelude::{df, DataFrame, DataType, Field, NamedFrom, PolarsResult, Schema, Series};
use serde::{Deserialize, Serialize};

pub const LABEL_COLUMN: &str = "Exited";

pub const FEATURE_COLUMNS: [&str; 10] = [
    "CreditScore",
    "Geography",
    "Gender",
    "Age",
    "Tenure",
    "Balance",
    "NumOfProducts",
    "HasCrCard",
    "IsActiveMember",
    "EstimatedSalary",
];

/// A single feature cell, borrowed from a customer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FeatureValue<'a> {
    Numeric(f64),
    Categorical(&'a str),
}

/// The ten model inputs describing one bank customer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomerFeatures {
    pub credit_score: f64,
    pub geography: String,
    pub gender: String,
    pub age: f64,
    pub tenure: f64,
    pub balance: f64,
    pub num_of_products: i64,
    pub has_cr_card: i64,
    pub is_active_member: i64,
    pub estimated_salary: f64,
}

impl CustomerFeatures {
    /// Look a feature up by its CSV column name.
    pub fn feature(&self, column: &str) -> Option<FeatureValue<'_>> {
        let value = match column {
            "CreditScore" => FeatureValue::Numeric(self.credit_score),
            "Geography" => FeatureValue::Categorical(&self.geography),
            "Gender" => FeatureValue::Categorical(&self.gender),
            "Age" => FeatureValue::Numeric(self.age),
            "Tenure" => FeatureValue::Numeric(self.tenure),
            "Balance" => FeatureValue::Numeric(self.balance),
            "NumOfProducts" => FeatureValue::Numeric(self.num_of_products as f64),
            "HasCrCard" => FeatureValue::Numeric(self.has_cr_card as f64),
            "IsActiveMember" => FeatureValue::Numeric(self.is_active_member as f64),
            "EstimatedSalary" => FeatureValue::Numeric(self.estimated_salary),
            _ => return None,
        };
        Some(value)
    }
}

/// A labelled row of the churn dataset.
#[derive(Clone, Debug, PartialEq)]
pub struct ChurnRecord {
    pub features: CustomerFeatures,
    /// 1 when the customer left the bank.
    pub exited: u8,
}

impl ChurnRecord {
    /// Declared types of every column the pipeline reads; other CSV columns are ignored.
    pub fn raw_schema() -> Schema {
        Schema::from_iter(vec![
            Field::new("CreditScore", DataType::Float64),
            Field::new("Geography", DataType::Utf8),
            Field::new("Gender", DataType::Utf8),
            Field::new("Age", DataType::Float64),
            Field::new("Tenure", DataType::Float64),
            Field::new("Balance", DataType::Float64),
            Field::new("NumOfProducts", DataType::Int64),
            Field::new("HasCrCard", DataType::Int64),
            Field::new("IsActiveMember", DataType::Int64),
            Field::new("EstimatedSalary", DataType::Float64),
            Field::new(LABEL_COLUMN, DataType::Int64),
        ])
    }
}

/// Lay customers out as a frame with the CSV column names and dtypes.
pub fn features_frame<'a, I>(rows: I) -> PolarsResult<DataFrame>
where
    I: IntoIterator<Item = &'a CustomerFeatures>,
{
    let rows: Vec<&CustomerFeatures> = rows.into_iter().collect();
    df!(
        "CreditScore" => rows.iter().map(|r| r.credit_score).collect::<Vec<f64>>(),
        "Geography" => rows.iter().map(|r| r.geography.clone()).collect::<Vec<String>>(),
        "Gender" => rows.iter().map(|r| r.gender.clone()).collect::<Vec<String>>(),
        "Age" => rows.iter().map(|r| r.age).collect::<Vec<f64>>(),
        "Tenure" => rows.iter().map(|r| r.tenure).collect::<Vec<f64>>(),
        "Balance" => rows.iter().map(|r| r.balance).collect::<Vec<f64>>(),
        "NumOfProducts" => rows.iter().map(|r| r.num_of_products).collect::<Vec<i64>>(),
        "HasCrCard" => rows.iter().map(|r| r.has_cr_card).collect::<Vec<i64>>(),
        "IsActiveMember" => rows.iter().map(|r| r.is_active_member).collect::<Vec<i64>>(),
        "EstimatedSalary" => rows.iter().map(|r| r.estimated_salary).collect::<Vec<f64>>(),
    )
}

/// [`features_frame`] plus the label column.
pub fn records_frame(records: &[ChurnRecord]) -> PolarsResult<DataFrame> {
    let mut frame = features_frame(records.iter().map(|r| &r.features))?;
    let labels: Vec<i64> = records.iter().map(|r| i64::from(r.exited)).collect();
    frame.with_column(Series::new(LABEL_COLUMN, labels))?;
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer() -> CustomerFeatures {
        CustomerFeatures {
            credit_score: 650.0,
            geography: "France".into(),
            gender: "Female".into(),
            age: 40.0,
            tenure: 3.0,
            balance: 0.0,
            num_of_products: 2,
            has_cr_card: 1,
            is_active_member: 0,
            estimated_salary: 50000.0,
        }
    }

    #[test]
    fn every_feature_column_resolves() {
        let c = customer();
        for column in FEATURE_COLUMNS {
            assert!(c.feature(column).is_some(), "{column} did not resolve");
        }
        assert_eq!(c.feature("Exited"), None);
        assert_eq!(c.feature("Geography"), Some(FeatureValue::Categorical("France")));
        assert_eq!(c.feature("NumOfProducts"), Some(FeatureValue::Numeric(2.0)));
    }

    #[test]
    fn schema_covers_features_and_label() {
        let schema = ChurnRecord::raw_schema();
        assert_eq!(schema.len(), FEATURE_COLUMNS.len() + 1);
        assert_eq!(schema.get(LABEL_COLUMN), Some(&DataType::Int64));
        assert_eq!(schema.get("Gender"), Some(&DataType::Utf8));
    }

    #[test]
    fn frame_follows_the_declared_schema() {
        let record = ChurnRecord {
            features: customer(),
            exited: 1,
        };
        let frame = records_frame(&[record.clone(), record]).unwrap();
        assert_eq!(frame.shape(), (2, FEATURE_COLUMNS.len() + 1));
        let schema = ChurnRecord::raw_schema();
        for series in frame.get_columns() {
            assert_eq!(Some(series.dtype()), schema.get(series.name()), "{}", series.name());
        }
    }
}
