//! Bank customer churn prediction: offline training, an HTTP prediction
//! service, and evaluation and EDA reports rendered as base64 PNG charts.

pub mod config;
pub mod dataset;
pub mod eda;
pub mod error;
pub mod evaluation;
pub mod memory;
pub mod models;
pub mod plots;
pub mod predict;
pub mod preprocess;
pub mod records;
pub mod registry;
pub mod report;
pub mod server;
pub mod training;
