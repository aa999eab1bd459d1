//! `/predict` payload validation and per-model scoring.

use log::{debug, warn};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::InputValidationError;
use crate::records::CustomerFeatures;
use crate::registry::ModelRegistry;

/// Body keys, in the order missing ones are reported.
pub const REQUIRED_FIELDS: [&str; 10] = [
    "creditScore",
    "geography",
    "gender",
    "age",
    "tenure",
    "balance",
    "numofproducts",
    "hascrcard",
    "isactivemember",
    "estimatedsalary",
];

pub const EXITS: &str = "Customer Exits";
pub const STAYS: &str = "Customer Stays";

pub fn decode(label: u8) -> &'static str {
    if label == 1 {
        EXITS
    } else {
        STAYS
    }
}

fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

fn invalid(field: &str) -> InputValidationError {
    InputValidationError::InvalidInput {
        field: field.to_string(),
    }
}

fn float(body: &Map<String, Value>, field: &str) -> Result<f64, InputValidationError> {
    let parsed = match &body[field] {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).ok_or_else(|| invalid(field))
}

/// Numbers are truncated toward zero; strings must hold an integer;
/// booleans count as 1 and 0.
fn integer(body: &Map<String, Value>, field: &str) -> Result<i64, InputValidationError> {
    let parsed = match &body[field] {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|v| v.is_finite()).map(|v| v.trunc() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    };
    parsed.ok_or_else(|| invalid(field))
}

fn text(body: &Map<String, Value>, field: &str) -> Result<String, InputValidationError> {
    match &body[field] {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(invalid(field)),
    }
}

fn yes_no(value: &Value) -> &'static str {
    match value {
        Value::String(s) if s == "1" => "Yes",
        _ => "No",
    }
}

/// The submitted customer, echoed back with the raw values.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomerEcho {
    pub credit_score: Value,
    pub geography: Value,
    pub gender: Value,
    pub age: Value,
    pub tenure: Value,
    pub balance: Value,
    pub num_of_products: Value,
    pub has_cr_card: &'static str,
    pub is_active_member: &'static str,
    pub estimated_salary: Value,
}

/// A validated `/predict` body.
#[derive(Clone, Debug, PartialEq)]
pub struct PredictRequest {
    pub features: CustomerFeatures,
    pub echo: CustomerEcho,
}

impl PredictRequest {
    pub fn from_json(body: &Value) -> Result<Self, InputValidationError> {
        let body = body.as_object().ok_or_else(|| invalid("body"))?;

        let missing: Vec<String> = REQUIRED_FIELDS
            .iter()
            .filter(|field| is_missing(body.get(**field)))
            .map(|field| field.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(InputValidationError::MissingFields(missing));
        }

        let features = CustomerFeatures {
            credit_score: float(body, "creditScore")?,
            geography: text(body, "geography")?,
            gender: text(body, "gender")?,
            age: float(body, "age")?,
            tenure: float(body, "tenure")?,
            balance: float(body, "balance")?,
            num_of_products: integer(body, "numofproducts")?,
            has_cr_card: integer(body, "hascrcard")?,
            is_active_member: integer(body, "isactivemember")?,
            estimated_salary: float(body, "estimatedsalary")?,
        };
        let echo = CustomerEcho {
            credit_score: body["creditScore"].clone(),
            geography: body["geography"].clone(),
            gender: body["gender"].clone(),
            age: body["age"].clone(),
            tenure: body["tenure"].clone(),
            balance: body["balance"].clone(),
            num_of_products: body["numofproducts"].clone(),
            has_cr_card: yes_no(&body["hascrcard"]),
            is_active_member: yes_no(&body["isactivemember"]),
            estimated_salary: body["estimatedsalary"].clone(),
        };
        Ok(Self { features, echo })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Prediction {
    pub model: String,
    pub prediction: &'static str,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PredictResponse {
    pub customer: CustomerEcho,
    pub predictions: Vec<Prediction>,
}

/// Ask every registered model about one customer. A model that fails is
/// left out of the result.
pub fn predict_all(registry: &ModelRegistry, features: &CustomerFeatures) -> Vec<Prediction> {
    let mut predictions = Vec::with_capacity(registry.len());
    for artifact in registry.iter() {
        match artifact.predict(std::slice::from_ref(features)) {
            Ok(labels) => match labels.first() {
                Some(&label) => predictions.push(Prediction {
                    model: artifact.key.to_string(),
                    prediction: decode(label),
                }),
                None => warn!("{} returned no prediction", artifact.key),
            },
            Err(err) => warn!("{} skipped: {err}", artifact.key),
        }
    }
    debug!("{} of {} models answered", predictions.len(), registry.len());
    predictions
}

pub fn handle_predict(registry: &ModelRegistry, body: &Value) -> Result<PredictResponse, InputValidationError> {
    let request = PredictRequest::from_json(body)?;
    Ok(PredictResponse {
        predictions: predict_all(registry, &request.features),
        customer: request.echo,
    })
}
