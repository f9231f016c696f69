//! Encoding of raw table rows into ordered numeric feature vectors

use crate::data::loader::RawTable;
use crate::data::{PatientRecord, Table, GENDER_COLUMN, GENDER_PREFIX, TARGET_COLUMN};
use anyhow::{bail, Context, Result};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Normalize a raw class value: padded `Y`/`N` or an integer 0/1
pub fn parse_target(raw: &str) -> Result<u8> {
    match raw.trim() {
        "Y" => Ok(1),
        "N" => Ok(0),
        other => match other.parse::<i64>() {
            Ok(0) => Ok(0),
            Ok(1) => Ok(1),
            _ => bail!("Unrecognized {} value: {:?}", TARGET_COLUMN, raw),
        },
    }
}

/// Where a feature's value comes from
#[derive(Debug, Clone, PartialEq)]
enum FeatureSource {
    /// Numeric column at this raw index
    Numeric(usize),
    /// Indicator: 1.0 when the gender column equals the level
    GenderLevel(String),
}

/// Ordered feature layout
///
/// Numeric columns keep header order; one indicator per gender level is
/// appended after them, levels sorted, none dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSchema {
    feature_names: Vec<String>,
}

impl FeatureSchema {
    /// Derive the layout from a training table
    pub fn fit(raw: &RawTable) -> Result<Self> {
        raw.column_index(TARGET_COLUMN)
            .with_context(|| format!("Missing target column: {}", TARGET_COLUMN))?;
        let gender_idx = raw
            .column_index(GENDER_COLUMN)
            .with_context(|| format!("Missing column: {}", GENDER_COLUMN))?;

        let mut feature_names: Vec<String> = raw
            .headers
            .iter()
            .filter(|h| h.as_str() != TARGET_COLUMN && h.as_str() != GENDER_COLUMN)
            .cloned()
            .collect();

        let levels: BTreeSet<String> = raw
            .rows
            .iter()
            .map(|row| row[gender_idx].trim().to_string())
            .collect();
        debug!("Gender levels: {:?}", levels);

        feature_names.extend(levels.iter().map(|l| format!("{}{}", GENDER_PREFIX, l)));

        info!("Feature layout: {} features {:?}", feature_names.len(), feature_names);
        Ok(Self { feature_names })
    }

    /// Rebuild the layout from a persisted feature-name list
    pub fn from_feature_names(feature_names: Vec<String>) -> Self {
        Self { feature_names }
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn len(&self) -> usize {
        self.feature_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feature_names.is_empty()
    }

    fn resolve(&self, raw: &RawTable) -> Result<Vec<FeatureSource>> {
        self.feature_names
            .iter()
            .map(|name| {
                if let Some(idx) = raw.column_index(name) {
                    return Ok(FeatureSource::Numeric(idx));
                }
                match name.strip_prefix(GENDER_PREFIX) {
                    Some(level) if raw.column_index(GENDER_COLUMN).is_some() => {
                        Ok(FeatureSource::GenderLevel(level.to_string()))
                    }
                    _ => bail!("Missing feature column: {}", name),
                }
            })
            .collect()
    }

    /// Encode every row; the target column is mandatory when `require_target`
    pub fn encode(&self, raw: &RawTable, require_target: bool) -> Result<Table> {
        let sources = self.resolve(raw)?;
        let target_idx = raw.column_index(TARGET_COLUMN);
        if require_target && target_idx.is_none() {
            bail!("Missing target column: {}", TARGET_COLUMN);
        }
        let gender_idx = raw.column_index(GENDER_COLUMN);

        let mut records = Vec::with_capacity(raw.len());
        for (row_num, row) in raw.rows.iter().enumerate() {
            let line = row_num + 2;
            let mut features = Vec::with_capacity(sources.len());

            for (source, name) in sources.iter().zip(&self.feature_names) {
                let value = match source {
                    FeatureSource::Numeric(idx) => {
                        let cell = row[*idx].trim();
                        let v = cell.parse::<f32>().with_context(|| {
                            format!("Line {}: column {} is not numeric: {:?}", line, name, cell)
                        })?;
                        if !v.is_finite() {
                            bail!("Line {}: column {} is not finite", line, name);
                        }
                        v
                    }
                    FeatureSource::GenderLevel(level) => {
                        let gender = gender_idx.map(|i| row[i].trim()).unwrap_or_default();
                        if gender == level.as_str() { 1.0 } else { 0.0 }
                    }
                };
                features.push(value);
            }

            let target = match target_idx {
                Some(idx) => Some(
                    parse_target(&row[idx]).with_context(|| format!("Line {}", line))?,
                ),
                None => None,
            };

            records.push(PatientRecord::new(features, target));
        }

        Ok(Table {
            feature_names: self.feature_names.clone(),
            records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::{DataLoader, FileFormat};
    use std::io::Cursor;

    fn raw(csv: &str) -> RawTable {
        DataLoader::new()
            .parse_records(Cursor::new(csv.to_string()), FileFormat::Csv)
            .unwrap()
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(parse_target(" Y ").unwrap(), 1);
        assert_eq!(parse_target("N  ").unwrap(), 0);
        assert_eq!(parse_target("1").unwrap(), 1);
        assert!(parse_target("P").is_err());
        assert!(parse_target("2").is_err());
    }

    #[test]
    fn test_fit_orders_gender_last() {
        let table = raw("Gender,Glucose,BMI,CLASS\nM,130,28.5,Y\nF,85,22.0,N\n");
        let schema = FeatureSchema::fit(&table).unwrap();

        assert_eq!(
            schema.feature_names(),
            &["Glucose", "BMI", "Gender_F", "Gender_M"]
        );

        let encoded = schema.encode(&table, true).unwrap();
        assert_eq!(encoded.records[0].features, vec![130.0, 28.5, 0.0, 1.0]);
        assert_eq!(encoded.records[0].target, Some(1));
        assert_eq!(encoded.records[1].features, vec![85.0, 22.0, 1.0, 0.0]);
        assert_eq!(encoded.records[1].target, Some(0));
    }

    #[test]
    fn test_missing_target_column() {
        let table = raw("Gender,Glucose\nM,130\n");
        let err = FeatureSchema::fit(&table).unwrap_err();
        assert!(err.to_string().contains("CLASS"));
    }

    #[test]
    fn test_non_numeric_feature_is_error() {
        let table = raw("Gender,Glucose,CLASS\nM,high,Y\n");
        let schema = FeatureSchema::fit(&table).unwrap();
        assert!(schema.encode(&table, true).is_err());
    }

    #[test]
    fn test_encode_with_persisted_names_without_target() {
        let names = vec![
            "Glucose".to_string(),
            "Gender_F".to_string(),
            "Gender_M".to_string(),
        ];
        let schema = FeatureSchema::from_feature_names(names);
        let table = raw("Glucose,Gender\n140,F\n");

        let encoded = schema.encode(&table, false).unwrap();
        assert_eq!(encoded.records[0].features, vec![140.0, 1.0, 0.0]);
        assert_eq!(encoded.records[0].target, None);
        assert!(schema.encode(&table, true).is_err());
    }
}
