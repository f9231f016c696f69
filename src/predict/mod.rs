pub mod predictor;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Probability above which a patient is labelled diabetic
pub const DIABETIC_THRESHOLD: f64 = 0.5;
/// Probabilities below this are low risk
pub const LOW_RISK_BELOW: f64 = 0.3;
/// Probabilities below this (and not low) are moderate risk
pub const MODERATE_RISK_BELOW: f64 = 0.7;

/// Predicted class
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DiabetesLabel {
    #[serde(rename = "Non-Diabetic")]
    NonDiabetic,
    #[serde(rename = "Diabetic")]
    Diabetic,
}

impl DiabetesLabel {
    /// `Diabetic` iff `probability > 0.5`
    pub fn from_probability(probability: f64) -> Self {
        if probability > DIABETIC_THRESHOLD {
            Self::Diabetic
        } else {
            Self::NonDiabetic
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NonDiabetic => "Non-Diabetic",
            Self::Diabetic => "Diabetic",
        }
    }

    /// Numeric class, 1 for diabetic
    pub fn as_class(&self) -> u8 {
        match self {
            Self::NonDiabetic => 0,
            Self::Diabetic => 1,
        }
    }
}

impl fmt::Display for DiabetesLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk bucket of a probability
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Moderate,
    High,
}

impl RiskTier {
    pub fn from_probability(probability: f64) -> Self {
        if probability < LOW_RISK_BELOW {
            Self::Low
        } else if probability < MODERATE_RISK_BELOW {
            Self::Moderate
        } else {
            Self::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one prediction; this is the `/predict` response body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prediction {
    pub prediction: DiabetesLabel,
    pub probability: f64,
    pub risk: RiskTier,
}

impl Prediction {
    pub fn from_probability(probability: f64) -> Self {
        Self {
            prediction: DiabetesLabel::from_probability(probability),
            probability,
            risk: RiskTier::from_probability(probability),
        }
    }
}

/// Prediction for one row of a batch file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowPrediction {
    /// 0-based data row index
    pub row: usize,
    #[serde(flatten)]
    pub prediction: Prediction,
    /// Label from the file, when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<u8>,
}

/// Batch prediction results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPredictionResult {
    pub predictions: Vec<RowPrediction>,
    pub summary: PredictionSummary,
}

impl BatchPredictionResult {
    pub fn new(predictions: Vec<RowPrediction>) -> Self {
        let summary = PredictionSummary::from_predictions(&predictions);
        Self {
            predictions,
            summary,
        }
    }

    /// Predicted classes in row order
    pub fn predicted_classes(&self) -> Vec<u8> {
        self.predictions
            .iter()
            .map(|p| p.prediction.prediction.as_class())
            .collect()
    }

    /// Labels from the file, if every row had one
    pub fn actual_classes(&self) -> Option<Vec<u8>> {
        self.predictions.iter().map(|p| p.actual).collect()
    }

    /// Export to CSV format
    pub fn to_csv(&self) -> String {
        let mut csv = String::from("row,prediction,probability,risk\n");
        for p in &self.predictions {
            csv.push_str(&format!(
                "{},{},{:.6},{}\n",
                p.row, p.prediction.prediction, p.prediction.probability, p.prediction.risk
            ));
        }
        csv
    }
}

/// Prediction summary statistics
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PredictionSummary {
    pub total_predictions: usize,
    pub diabetic: usize,
    pub non_diabetic: usize,
    pub low_risk: usize,
    pub moderate_risk: usize,
    pub high_risk: usize,
    pub avg_probability: f64,
}

impl PredictionSummary {
    pub fn from_predictions(predictions: &[RowPrediction]) -> Self {
        let mut summary = Self {
            total_predictions: predictions.len(),
            ..Default::default()
        };
        let mut prob_sum = 0.0;

        for p in predictions.iter().map(|r| &r.prediction) {
            prob_sum += p.probability;
            match p.prediction {
                DiabetesLabel::Diabetic => summary.diabetic += 1,
                DiabetesLabel::NonDiabetic => summary.non_diabetic += 1,
            }
            match p.risk {
                RiskTier::Low => summary.low_risk += 1,
                RiskTier::Moderate => summary.moderate_risk += 1,
                RiskTier::High => summary.high_risk += 1,
            }
        }

        if !predictions.is_empty() {
            summary.avg_probability = prob_sum / predictions.len() as f64;
        }
        summary
    }

    /// Print summary to stdout
    pub fn print(&self) {
        let pct = |n: usize| {
            if self.total_predictions > 0 {
                n as f64 * 100.0 / self.total_predictions as f64
            } else {
                0.0
            }
        };
        println!("\n=== Prediction Summary ===");
        println!("Total predictions: {}", self.total_predictions);
        println!("Diabetic: {} ({:.2}%)", self.diabetic, pct(self.diabetic));
        println!("Non-Diabetic: {}", self.non_diabetic);
        println!(
            "Risk: low {}, moderate {}, high {}",
            self.low_risk, self.moderate_risk, self.high_risk
        );
        println!("Average probability: {:.4}", self.avg_probability);
        println!("==========================\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_threshold_is_strict() {
        assert_eq!(DiabetesLabel::from_probability(0.5), DiabetesLabel::NonDiabetic);
        assert_eq!(DiabetesLabel::from_probability(0.5001), DiabetesLabel::Diabetic);
    }

    #[test]
    fn test_risk_boundaries() {
        assert_eq!(RiskTier::from_probability(0.0), RiskTier::Low);
        assert_eq!(RiskTier::from_probability(0.2999), RiskTier::Low);
        assert_eq!(RiskTier::from_probability(0.3), RiskTier::Moderate);
        assert_eq!(RiskTier::from_probability(0.6999), RiskTier::Moderate);
        assert_eq!(RiskTier::from_probability(0.7), RiskTier::High);
        assert_eq!(RiskTier::from_probability(1.0), RiskTier::High);
    }

    #[test]
    fn test_prediction_json_shape() {
        let json = serde_json::to_value(Prediction::from_probability(0.82)).unwrap();
        assert_eq!(json["prediction"], "Diabetic");
        assert_eq!(json["risk"], "high");
        assert_eq!(json["probability"], 0.82);

        let json = serde_json::to_value(Prediction::from_probability(0.4)).unwrap();
        assert_eq!(json["prediction"], "Non-Diabetic");
        assert_eq!(json["risk"], "moderate");
    }

    #[test]
    fn test_batch_summary() {
        let rows: Vec<RowPrediction> = [0.1, 0.45, 0.9]
            .iter()
            .enumerate()
            .map(|(row, &p)| RowPrediction {
                row,
                prediction: Prediction::from_probability(p),
                actual: Some(u8::from(p > 0.5)),
            })
            .collect();

        let result = BatchPredictionResult::new(rows);
        assert_eq!(result.summary.total_predictions, 3);
        assert_eq!(result.summary.diabetic, 1);
        assert_eq!(result.summary.non_diabetic, 2);
        assert_eq!(
            (result.summary.low_risk, result.summary.moderate_risk, result.summary.high_risk),
            (1, 1, 1)
        );
        assert!((result.summary.avg_probability - 0.4833333).abs() < 1e-6);
        assert_eq!(result.predicted_classes(), vec![0, 0, 1]);
        assert_eq!(result.actual_classes(), Some(vec![0, 0, 1]));

        let csv = result.to_csv();
        assert!(csv.starts_with("row,prediction,probability,risk\n"));
        assert!(csv.contains("2,Diabetic,0.900000,high"));
    }
}
