//! CSV datasets: labeled training data and reference data for recalibration.
//!
//! Header names are matched exactly: `topology`, `J`, `gamma`, `sigma`, and
//! the optional target column `QLS`. Extra columns are ignored. Rows with a
//! missing or unparseable required field are dropped and counted.

use std::io::Read;
use std::path::Path;

use crate::error::{QlsError, Result};
use crate::params::ParameterRecord;

pub const TOPOLOGY_COLUMN: &str = "topology";
pub const TARGET_COLUMN: &str = "QLS";
pub const REQUIRED_COLUMNS: [&str; 4] = ["topology", "J", "gamma", "sigma"];

/// One parsed row, with the target when the dataset carries one.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetRow {
    pub record: ParameterRecord,
    pub qls: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub rows: Vec<DatasetRow>,
    /// True when the header contains a `QLS` column.
    pub has_target: bool,
    /// Rows discarded for missing or unparseable fields.
    pub dropped: usize,
}

struct ColumnIndex {
    topology: usize,
    j: usize,
    gamma: usize,
    sigma: usize,
    target: Option<usize>,
}

impl ColumnIndex {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self> {
        let find = |name: &str| headers.iter().position(|h| h == name);
        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|c| find(c).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(QlsError::data_format(format!(
                "CSV is missing required column(s): {}",
                missing.join(", ")
            )));
        }
        // presence checked above
        let at = |name: &str| find(name).unwrap_or_default();
        Ok(Self {
            topology: at("topology"),
            j: at("J"),
            gamma: at("gamma"),
            sigma: at("sigma"),
            target: find(TARGET_COLUMN),
        })
    }
}

fn parse_number(record: &csv::StringRecord, idx: usize) -> Option<f64> {
    let field = record.get(idx)?;
    if field.is_empty() {
        return None;
    }
    field.parse::<f64>().ok().filter(|v| v.is_finite())
}

impl Dataset {
    /// Parse CSV from any reader.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);
        let headers = rdr
            .headers()
            .map_err(|e| QlsError::data_format(format!("cannot read CSV header: {e}")))?
            .clone();
        let cols = ColumnIndex::from_headers(&headers)?;

        let mut rows = Vec::new();
        let mut dropped = 0usize;
        for (line, result) in rdr.records().enumerate() {
            let record = result
                .map_err(|e| QlsError::data_format(format!("CSV row {}: {e}", line + 1)))?;
            let topology = record.get(cols.topology).unwrap_or("");
            let parsed = (
                parse_number(&record, cols.j),
                parse_number(&record, cols.gamma),
                parse_number(&record, cols.sigma),
            );
            let (Some(j), Some(gamma), Some(sigma)) = parsed else {
                dropped += 1;
                continue;
            };
            if topology.is_empty() {
                dropped += 1;
                continue;
            }
            let qls = match cols.target {
                Some(idx) => match parse_number(&record, idx) {
                    Some(v) => Some(v),
                    None => {
                        dropped += 1;
                        continue;
                    }
                },
                None => None,
            };
            rows.push(DatasetRow {
                record: ParameterRecord::new(topology, j, gamma, sigma),
                qls,
            });
        }
        if dropped > 0 {
            log::warn!("dropped {dropped} CSV row(s) with missing or invalid fields");
        }
        Ok(Self {
            rows,
            has_target: cols.target.is_some(),
            dropped,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| QlsError::io(path, e))?;
        Self::from_reader(file).map_err(|e| match e {
            QlsError::DataFormat(msg) => {
                QlsError::data_format(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &ParameterRecord> {
        self.rows.iter().map(|r| &r.record)
    }

    /// Targets, or `None` when the dataset has no `QLS` column.
    pub fn targets(&self) -> Option<Vec<f64>> {
        if !self.has_target {
            return None;
        }
        self.rows.iter().map(|r| r.qls).collect()
    }

    /// Require a target column, as training does.
    pub fn require_targets(&self) -> Result<Vec<f64>> {
        self.targets().ok_or_else(|| {
            QlsError::data_format(format!("CSV has no '{TARGET_COLUMN}' target column"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labeled_csv() {
        let csv = "topology,J,gamma,sigma,QLS\nring,0.2,0.02,0.04,0.61\nline,0.1,0.01,0.0,0.33\n";
        let ds = Dataset::from_reader(csv.as_bytes()).unwrap();
        assert!(ds.has_target);
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.dropped, 0);
        assert_eq!(ds.rows[0].record, ParameterRecord::new("ring", 0.2, 0.02, 0.04));
        assert_eq!(ds.targets().unwrap(), vec![0.61, 0.33]);
    }

    #[test]
    fn test_unlabeled_csv_has_no_targets() {
        let csv = "topology,J,gamma,sigma\nring,0.2,0.02,0.04\n";
        let ds = Dataset::from_reader(csv.as_bytes()).unwrap();
        assert!(!ds.has_target);
        assert!(ds.targets().is_none());
        assert!(ds.require_targets().is_err());
    }

    #[test]
    fn test_rows_with_missing_fields_are_dropped() {
        let csv = "topology,J,gamma,sigma,QLS\n\
                   ring,0.2,0.02,0.04,0.6\n\
                   ,0.2,0.02,0.04,0.6\n\
                   line,,0.02,0.04,0.6\n\
                   line,0.1,abc,0.04,0.6\n\
                   smallworld,0.3,0.03,0.05,\n";
        let ds = Dataset::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(ds.len(), 1);
        assert_eq!(ds.dropped, 4);
    }

    #[test]
    fn test_missing_required_column_is_data_format_error() {
        let csv = "topology,J,sigma\nring,0.2,0.04\n";
        let err = Dataset::from_reader(csv.as_bytes()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::DataFormat);
        assert!(err.to_string().contains("gamma"));
    }

    #[test]
    fn test_column_order_and_extra_columns() {
        let csv = "QLS,note,sigma,gamma,J,topology\n0.5,x,0.01,0.02,0.3, ring \n";
        let ds = Dataset::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(ds.rows[0].record, ParameterRecord::new("ring", 0.3, 0.02, 0.01));
        assert_eq!(ds.rows[0].qls, Some(0.5));
    }

    #[test]
    fn test_header_only_is_empty() {
        let ds = Dataset::from_reader("topology,J,gamma,sigma\n".as_bytes()).unwrap();
        assert!(ds.is_empty());
    }
}
