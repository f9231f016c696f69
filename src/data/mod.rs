pub mod loader;
pub mod preprocessing;
pub mod feature_engineering;

use serde::{Deserialize, Serialize};

/// Binary target column
pub const TARGET_COLUMN: &str = "CLASS";

/// Categorical column expanded into one indicator per level
pub const GENDER_COLUMN: &str = "Gender";

/// Prefix of the one-hot gender indicator columns
pub const GENDER_PREFIX: &str = "Gender_";

/// Default training file name
pub const DEFAULT_DATASET: &str = "Cleaned_Diabetes_Dataset.csv";

/// A single encoded patient row
#[derive(Debug, Clone, PartialEq)]
pub struct PatientRecord {
    /// Feature values, ordered as the table's feature names
    pub features: Vec<f32>,
    /// Diabetic (1) or not (0), when the row carries a label
    pub target: Option<u8>,
}

impl PatientRecord {
    /// Create a new record
    pub fn new(features: Vec<f32>, target: Option<u8>) -> Self {
        Self { features, target }
    }
}

/// Encoded table: feature names plus rows in file order
#[derive(Debug, Clone)]
pub struct Table {
    /// Ordered feature names
    pub feature_names: Vec<String>,
    /// Encoded rows
    pub records: Vec<PatientRecord>,
}

impl Table {
    /// Number of feature columns
    pub fn num_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Train/test split configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Held-out test fraction
    pub test_size: f64,
    /// Random seed
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            seed: 42,
        }
    }
}

/// Dataset container
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Ordered feature names shared by both splits
    pub feature_names: Vec<String>,
    /// Training rows
    pub train: Vec<PatientRecord>,
    /// Held-out test rows
    pub test: Vec<PatientRecord>,
}

impl Dataset {
    /// Get total number of samples
    pub fn total_samples(&self) -> usize {
        self.train.len() + self.test.len()
    }

    /// Get positive samples count
    pub fn positive_count(&self) -> usize {
        let count = |data: &[PatientRecord]| {
            data.iter().filter(|v| v.target == Some(1)).count()
        };
        count(&self.train) + count(&self.test)
    }

    /// Number of features per row
    pub fn num_features(&self) -> usize {
        self.feature_names.len()
    }
}
