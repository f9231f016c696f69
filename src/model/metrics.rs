//! Evaluation metrics for the binary classifier

use serde::{Deserialize, Serialize};
use std::fmt;

/// Display names for label 0 and label 1
pub const CLASS_NAMES: [&str; 2] = ["Non-Diabetic", "Diabetic"];

/// 2x2 confusion matrix, rows actual, columns predicted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_negative: usize,
    pub false_positive: usize,
    pub false_negative: usize,
    pub true_positive: usize,
}

impl ConfusionMatrix {
    /// Tally predictions against labels
    pub fn from_labels(predictions: &[u8], targets: &[u8]) -> Self {
        let mut cm = Self::default();
        for (&p, &t) in predictions.iter().zip(targets) {
            match (t, p) {
                (0, 0) => cm.true_negative += 1,
                (0, _) => cm.false_positive += 1,
                (_, 0) => cm.false_negative += 1,
                _ => cm.true_positive += 1,
            }
        }
        cm
    }

    /// `[[tn, fp], [fn, tp]]`
    pub fn as_array(&self) -> [[usize; 2]; 2] {
        [
            [self.true_negative, self.false_positive],
            [self.false_negative, self.true_positive],
        ]
    }

    pub fn total(&self) -> usize {
        self.true_negative + self.false_positive + self.false_negative + self.true_positive
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_negative + self.true_positive, self.total())
    }

    /// Precision, recall, F1 and support for one class
    pub fn class_scores(&self, class: u8) -> ClassScores {
        let (tp, fp, fn_) = if class == 1 {
            (self.true_positive, self.false_positive, self.false_negative)
        } else {
            (self.true_negative, self.false_negative, self.false_positive)
        };
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        ClassScores {
            precision,
            recall,
            f1: harmonic_mean(precision, recall),
            support: tp + fn_,
        }
    }

    /// F1 score of the positive class
    pub fn f1(&self) -> f64 {
        self.class_scores(1).f1
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [[tn, fp], [fn_, tp]] = self.as_array();
        writeln!(f, "[[{:>4} {:>4}]", tn, fp)?;
        write!(f, " [{:>4} {:>4}]]", fn_, tp)
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn harmonic_mean(p: f64, r: f64) -> f64 {
    if p + r > 0.0 {
        2.0 * p * r / (p + r)
    } else {
        0.0
    }
}

/// Per-class scores
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassScores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Per-class, macro and support-weighted scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub negative: ClassScores,
    pub positive: ClassScores,
    pub accuracy: f64,
    pub macro_avg: ClassScores,
    pub weighted_avg: ClassScores,
}

impl ClassificationReport {
    pub fn from_confusion(cm: &ConfusionMatrix) -> Self {
        let negative = cm.class_scores(0);
        let positive = cm.class_scores(1);
        let total = negative.support + positive.support;

        let macro_avg = ClassScores {
            precision: (negative.precision + positive.precision) / 2.0,
            recall: (negative.recall + positive.recall) / 2.0,
            f1: (negative.f1 + positive.f1) / 2.0,
            support: total,
        };

        let weigh = |a: f64, b: f64| {
            if total == 0 {
                0.0
            } else {
                (a * negative.support as f64 + b * positive.support as f64) / total as f64
            }
        };
        let weighted_avg = ClassScores {
            precision: weigh(negative.precision, positive.precision),
            recall: weigh(negative.recall, positive.recall),
            f1: weigh(negative.f1, positive.f1),
            support: total,
        };

        Self {
            negative,
            positive,
            accuracy: cm.accuracy(),
            macro_avg,
            weighted_avg,
        }
    }
}

fn write_row(f: &mut fmt::Formatter<'_>, name: &str, s: &ClassScores) -> fmt::Result {
    writeln!(
        f,
        "{:>14} {:>9.2} {:>9.2} {:>9.2} {:>9}",
        name, s.precision, s.recall, s.f1, s.support
    )
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>14} {:>9} {:>9} {:>9} {:>9}", "", "precision", "recall", "f1-score", "support")?;
        writeln!(f)?;
        write_row(f, CLASS_NAMES[0], &self.negative)?;
        write_row(f, CLASS_NAMES[1], &self.positive)?;
        writeln!(f)?;
        writeln!(
            f,
            "{:>14} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;
        write_row(f, "macro avg", &self.macro_avg)?;
        write_row(f, "weighted avg", &self.weighted_avg)
    }
}

/// Held-out evaluation results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub loss: Option<f64>,
    pub accuracy: f64,
    pub f1: f64,
    pub confusion_matrix: ConfusionMatrix,
    pub classification_report: ClassificationReport,
}

impl EvaluationReport {
    /// Build from thresholded predictions and labels
    pub fn from_labels(predictions: &[u8], targets: &[u8], loss: Option<f64>) -> Self {
        let confusion_matrix = ConfusionMatrix::from_labels(predictions, targets);
        Self {
            loss,
            accuracy: confusion_matrix.accuracy(),
            f1: confusion_matrix.f1(),
            classification_report: ClassificationReport::from_confusion(&confusion_matrix),
            confusion_matrix,
        }
    }

    /// Print in the usual console layout
    pub fn print(&self) {
        println!("\nTest Accuracy: {:.2}%", self.accuracy * 100.0);
        println!("F1 Score: {:.2}", self.f1);
        println!("\nConfusion Matrix:");
        println!("{}", self.confusion_matrix);
        println!("\nClassification Report:");
        println!("{}", self.classification_report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusion_matrix() {
        let predictions = [1, 0, 1, 0, 1];
        let targets = [1, 0, 0, 0, 1];
        let cm = ConfusionMatrix::from_labels(&predictions, &targets);

        assert_eq!(cm.as_array(), [[2, 1], [0, 2]]);
        assert_eq!(cm.accuracy(), 0.8);
    }

    #[test]
    fn test_class_scores() {
        let cm = ConfusionMatrix::from_labels(&[1, 0, 1, 0, 1], &[1, 0, 0, 0, 1]);

        let pos = cm.class_scores(1);
        assert_eq!(pos.precision, 2.0 / 3.0);
        assert_eq!(pos.recall, 1.0);
        assert!((pos.f1 - 0.8).abs() < 1e-12);
        assert_eq!(pos.support, 2);

        let neg = cm.class_scores(0);
        assert_eq!(neg.precision, 1.0);
        assert!((neg.recall - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(neg.support, 3);
    }

    #[test]
    fn test_report_averages() {
        let cm = ConfusionMatrix::from_labels(&[1, 0, 1, 0, 1], &[1, 0, 0, 0, 1]);
        let report = ClassificationReport::from_confusion(&cm);

        assert_eq!(report.macro_avg.support, 5);
        let expected_macro_recall = (1.0 + 2.0 / 3.0) / 2.0;
        assert!((report.macro_avg.recall - expected_macro_recall).abs() < 1e-12);
        // Weighted recall equals accuracy for a binary problem
        assert!((report.weighted_avg.recall - 0.8).abs() < 1e-12);

        let text = report.to_string();
        assert!(text.contains("Non-Diabetic"));
        assert!(text.contains("weighted avg"));
    }

    #[test]
    fn test_empty_positive_class_scores_zero() {
        let cm = ConfusionMatrix::from_labels(&[0, 0], &[0, 0]);
        assert_eq!(cm.f1(), 0.0);
        assert_eq!(cm.accuracy(), 1.0);
    }
}
