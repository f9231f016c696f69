use crate::data::{Dataset, PatientRecord, SplitConfig, Table};
use anyhow::{bail, Context, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Per-feature standardization: `(x - mean) / scale`
///
/// Variance is the population variance. Zero-variance features get a scale
/// of 1 so they pass through centered but unscaled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    /// Mean value for each feature
    pub mean: Vec<f64>,
    /// Population variance for each feature
    pub var: Vec<f64>,
    /// Divisor for each feature
    pub scale: Vec<f64>,
    /// Rows seen during fit
    pub n_samples_seen: usize,
}

impl StandardScaler {
    /// Fit on feature rows
    pub fn fit(records: &[PatientRecord]) -> Result<Self> {
        let first = records.first().context("Cannot fit scaler on empty data")?;
        let n_features = first.features.len();
        let n = records.len() as f64;

        let mut mean = vec![0.0f64; n_features];
        for record in records {
            if record.features.len() != n_features {
                bail!(
                    "Inconsistent row width: expected {}, found {}",
                    n_features,
                    record.features.len()
                );
            }
            for (m, &v) in mean.iter_mut().zip(&record.features) {
                *m += v as f64;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut var = vec![0.0f64; n_features];
        for record in records {
            for (i, &v) in record.features.iter().enumerate() {
                let diff = v as f64 - mean[i];
                var[i] += diff * diff;
            }
        }
        var.iter_mut().for_each(|v| *v /= n);

        let scale = var
            .iter()
            .map(|&v| if v.sqrt() < 1e-12 { 1.0 } else { v.sqrt() })
            .collect();

        info!("Fitted scaler on {} samples, {} features", records.len(), n_features);
        debug!("Scaler means: {:?}", mean);

        Ok(Self {
            mean,
            var,
            scale,
            n_samples_seen: records.len(),
        })
    }

    /// Number of features the scaler was fit on
    pub fn num_features(&self) -> usize {
        self.mean.len()
    }

    /// Standardize a single row
    pub fn transform_row(&self, features: &[f32]) -> Result<Vec<f32>> {
        if features.len() != self.mean.len() {
            bail!(
                "Scaler expects {} features, got {}",
                self.mean.len(),
                features.len()
            );
        }
        Ok(features
            .iter()
            .enumerate()
            .map(|(i, &v)| ((v as f64 - self.mean[i]) / self.scale[i]) as f32)
            .collect())
    }

    /// Standardize rows in place
    pub fn transform(&self, records: &mut [PatientRecord]) -> Result<()> {
        for record in records.iter_mut() {
            record.features = self.transform_row(&record.features)?;
        }
        Ok(())
    }

    /// Fit and transform in one step
    pub fn fit_transform(records: &mut [PatientRecord]) -> Result<Self> {
        let scaler = Self::fit(records)?;
        scaler.transform(records)?;
        Ok(scaler)
    }

    /// Write as JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize scaler")?;
        fs::write(path.as_ref(), json)
            .with_context(|| format!("Failed to write scaler to {:?}", path.as_ref()))
    }

    /// Read from JSON
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read scaler from {:?}", path.as_ref()))?;
        let scaler: Self = serde_json::from_str(&json).context("Failed to parse scaler")?;
        if scaler.var.len() != scaler.mean.len() || scaler.scale.len() != scaler.mean.len() {
            bail!("Corrupt scaler: mismatched mean/var/scale lengths");
        }
        Ok(scaler)
    }
}

/// Stratified shuffle split
///
/// The test size is `ceil(test_size * n)`; it is shared out across classes in
/// proportion to their counts, with leftover rows going to the classes with
/// the largest fractional share. Deterministic for a given seed.
pub fn stratified_split(table: Table, config: &SplitConfig) -> Result<Dataset> {
    info!("Splitting dataset with seed {}", config.seed);

    if !(0.0..1.0).contains(&config.test_size) || config.test_size <= 0.0 {
        bail!("test_size must be in (0, 1), got {}", config.test_size);
    }

    let mut by_class: BTreeMap<u8, Vec<usize>> = BTreeMap::new();
    for (i, record) in table.records.iter().enumerate() {
        let target = record
            .target
            .with_context(|| format!("Row {} has no label", i))?;
        by_class.entry(target).or_default().push(i);
    }

    let n = table.records.len();
    if n < 2 {
        bail!("Need at least 2 rows to split, got {}", n);
    }
    let n_test = ((n as f64) * config.test_size - 1e-9).ceil() as usize;

    // Proportional allocation, remainder by largest fractional part
    let mut alloc: Vec<(u8, usize, f64)> = by_class
        .iter()
        .map(|(&class, idx)| {
            let exact = n_test as f64 * idx.len() as f64 / n as f64;
            (class, exact.floor() as usize, exact - exact.floor())
        })
        .collect();
    let mut remaining = n_test - alloc.iter().map(|(_, k, _)| k).sum::<usize>();
    let mut order: Vec<usize> = (0..alloc.len()).collect();
    order.sort_by(|&a, &b| alloc[b].2.total_cmp(&alloc[a].2).then(a.cmp(&b)));
    for &slot in order.iter().cycle().take(alloc.len() * 2) {
        if remaining == 0 {
            break;
        }
        let class_size = by_class[&alloc[slot].0].len();
        if alloc[slot].1 < class_size {
            alloc[slot].1 += 1;
            remaining -= 1;
        }
    }

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut train_idx = Vec::new();
    let mut test_idx = Vec::new();

    for (class, k, _) in &alloc {
        let mut indices = by_class[class].clone();
        indices.shuffle(&mut rng);
        test_idx.extend_from_slice(&indices[..*k]);
        train_idx.extend_from_slice(&indices[*k..]);
    }

    train_idx.shuffle(&mut rng);
    test_idx.shuffle(&mut rng);

    let Table { feature_names, records } = table;
    let take = |idx: &[usize]| idx.iter().map(|&i| records[i].clone()).collect::<Vec<_>>();

    let dataset = Dataset {
        feature_names,
        train: take(&train_idx),
        test: take(&test_idx),
    };

    info!(
        "Dataset split: train={}, test={}",
        dataset.train.len(),
        dataset.test.len()
    );
    log_distribution("Train", &dataset.train);
    log_distribution("Test", &dataset.test);

    Ok(dataset)
}

/// Log the class balance of a split
pub fn log_distribution(name: &str, data: &[PatientRecord]) {
    let pos = data.iter().filter(|v| v.target == Some(1)).count();
    let neg = data.iter().filter(|v| v.target == Some(0)).count();
    info!("{} distribution: positive={}, negative={}", name, pos, neg);
}

/// Split off the trailing `fraction` of rows for validation, unshuffled
pub fn validation_split(
    records: &[PatientRecord],
    fraction: f64,
) -> (&[PatientRecord], &[PatientRecord]) {
    let split_at = ((records.len() as f64) * (1.0 - fraction)).floor() as usize;
    records.split_at(split_at.min(records.len()))
}

/// Per-class loss weights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassWeights {
    /// Weight for label 0
    pub negative: f64,
    /// Weight for label 1
    pub positive: f64,
}

impl ClassWeights {
    /// Balanced weights: `n_samples / (n_classes * count_c)`
    pub fn balanced(targets: &[u8]) -> Result<Self> {
        let pos = targets.iter().filter(|&&t| t == 1).count();
        let neg = targets.iter().filter(|&&t| t == 0).count();
        if pos == 0 || neg == 0 {
            bail!(
                "Balanced class weights need both classes: positive={}, negative={}",
                pos,
                neg
            );
        }
        let n = (pos + neg) as f64;
        let weights = Self {
            negative: n / (2.0 * neg as f64),
            positive: n / (2.0 * pos as f64),
        };
        info!(
            "Class weights: {{0: {:.4}, 1: {:.4}}}",
            weights.negative, weights.positive
        );
        Ok(weights)
    }

    /// Uniform weights
    pub fn uniform() -> Self {
        Self {
            negative: 1.0,
            positive: 1.0,
        }
    }

    /// Weight for a label
    pub fn weight(&self, target: u8) -> f64 {
        if target == 1 {
            self.positive
        } else {
            self.negative
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(values: &[(f32, f32, u8)]) -> Vec<PatientRecord> {
        values
            .iter()
            .map(|&(a, b, t)| PatientRecord::new(vec![a, b], Some(t)))
            .collect()
    }

    fn labelled_table(n_pos: usize, n_neg: usize) -> Table {
        let mut records = Vec::new();
        for i in 0..n_pos {
            records.push(PatientRecord::new(vec![i as f32, 1.0], Some(1)));
        }
        for i in 0..n_neg {
            records.push(PatientRecord::new(vec![i as f32, 0.0], Some(0)));
        }
        Table {
            feature_names: vec!["x".to_string(), "flag".to_string()],
            records,
        }
    }

    #[test]
    fn test_scaler_population_variance() {
        let data = rows(&[(1.0, 5.0, 0), (3.0, 5.0, 1)]);
        let scaler = StandardScaler::fit(&data).unwrap();

        assert_eq!(scaler.mean, vec![2.0, 5.0]);
        assert_eq!(scaler.var, vec![1.0, 0.0]);
        // Constant feature keeps a unit scale
        assert_eq!(scaler.scale, vec![1.0, 1.0]);

        let out = scaler.transform_row(&[3.0, 5.0]).unwrap();
        assert_eq!(out, vec![1.0, 0.0]);
    }

    #[test]
    fn test_scaler_rejects_wrong_width() {
        let data = rows(&[(1.0, 5.0, 0), (3.0, 5.0, 1)]);
        let scaler = StandardScaler::fit(&data).unwrap();
        assert!(scaler.transform_row(&[1.0]).is_err());
    }

    #[test]
    fn test_scaler_save_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("scaler.json");
        let scaler = StandardScaler::fit(&rows(&[(1.0, 2.0, 0), (2.0, 4.0, 1)])).unwrap();

        scaler.save(&path).unwrap();
        assert_eq!(StandardScaler::load(&path).unwrap(), scaler);
    }

    #[test]
    fn test_stratified_split_keeps_ratio() {
        let dataset = stratified_split(labelled_table(20, 80), &SplitConfig::default()).unwrap();

        assert_eq!(dataset.test.len(), 20);
        assert_eq!(dataset.train.len(), 80);
        let test_pos = dataset.test.iter().filter(|r| r.target == Some(1)).count();
        assert_eq!(test_pos, 4);
    }

    #[test]
    fn test_stratified_split_is_deterministic() {
        let config = SplitConfig { test_size: 0.2, seed: 7 };
        let a = stratified_split(labelled_table(13, 31), &config).unwrap();
        let b = stratified_split(labelled_table(13, 31), &config).unwrap();

        assert_eq!(a.train, b.train);
        assert_eq!(a.test, b.test);
        assert_eq!(a.total_samples(), 44);
    }

    #[test]
    fn test_validation_split_takes_tail() {
        let data = rows(&[(0.0, 0.0, 0), (1.0, 0.0, 0), (2.0, 0.0, 1), (3.0, 0.0, 1), (4.0, 0.0, 1)]);
        let (train, val) = validation_split(&data, 0.2);

        assert_eq!(train.len(), 4);
        assert_eq!(val.len(), 1);
        assert_eq!(val[0].features[0], 4.0);
    }

    #[test]
    fn test_balanced_class_weights() {
        let weights = ClassWeights::balanced(&[0, 0, 0, 1]).unwrap();
        assert!((weights.negative - 4.0 / 6.0).abs() < 1e-12);
        assert!((weights.positive - 2.0).abs() < 1e-12);
        assert!(ClassWeights::balanced(&[1, 1]).is_err());
    }
}
