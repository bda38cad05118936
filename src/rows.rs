use std::fs::File;
use std::io::Read;

use camino::Utf8Path;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::PolymixError;

const MISSING_MARKERS: &[&str] = &["", "nan", "NaN", "NAN", "NA", "N/A", "n/a", "null", "NULL"];

/// One experiment: a polymer/solvent pair and its measured cloud point.
///
/// Text cells that are blank (or a missing-value marker) are `None`; numeric
/// cells that are blank, NaN, infinite or unparsable are `None` as well.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    #[serde(default, deserialize_with = "text")]
    pub reference: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub solvent: Option<String>,
    #[serde(rename = "solvent_CAS", default, deserialize_with = "text")]
    pub solvent_cas: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub polymer: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub polymer_id: Option<String>,
    #[serde(rename = "polymer_CAS", default, deserialize_with = "text")]
    pub polymer_cas: Option<String>,
    #[serde(rename = "polymer_SMILES", default, deserialize_with = "text")]
    pub polymer_smiles: Option<String>,
    #[serde(rename = "polymer_Mw", default, deserialize_with = "number")]
    pub polymer_mw: Option<f64>,
    #[serde(rename = "polymer_PDI", default, deserialize_with = "number")]
    pub polymer_pdi: Option<f64>,
    #[serde(default, deserialize_with = "text")]
    pub mixture_id: Option<String>,
    #[serde(default, deserialize_with = "number")]
    pub polymer_vol_frac: Option<f64>,
    #[serde(default, deserialize_with = "number")]
    pub polymer_wt_frac: Option<f64>,
    #[serde(default, deserialize_with = "number")]
    pub cloud_point_temp: Option<f64>,
    #[serde(default, deserialize_with = "text")]
    pub one_phase_direction: Option<String>,
    #[serde(rename = "pressure_MPa", default, deserialize_with = "number")]
    pub pressure_mpa: Option<f64>,
}

impl Row {
    /// Columns a row cannot be uploaded without.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.solvent_cas.is_none() {
            missing.push("solvent_CAS");
        }
        if self.polymer.is_none() {
            missing.push("polymer");
        }
        missing
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumberedRow {
    /// Line in the source file; the header is line 1.
    pub line: usize,
    pub row: Row,
}

pub struct RowReader;

impl RowReader {
    pub fn read_path(path: &Utf8Path) -> Result<Vec<NumberedRow>, PolymixError> {
        let file = File::open(path.as_std_path()).map_err(|err| PolymixError::CsvRead {
            path: path.to_string(),
            message: err.to_string(),
        })?;
        Self::read_from(file, path.as_str())
    }

    /// Reads every row up front so a run can be replayed or fanned out.
    pub fn read_from<R: Read>(reader: R, source: &str) -> Result<Vec<NumberedRow>, PolymixError> {
        let mut csv = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let headers = csv.headers().map_err(|err| PolymixError::CsvRead {
            path: source.to_string(),
            message: err.to_string(),
        })?;
        if headers.is_empty() {
            return Err(PolymixError::CsvRead {
                path: source.to_string(),
                message: "missing header row".to_string(),
            });
        }

        csv.deserialize::<Row>()
            .enumerate()
            .map(|(index, record)| {
                let line = index + 2;
                record
                    .map(|row| NumberedRow { line, row })
                    .map_err(|err| PolymixError::CsvRow {
                        line,
                        message: err.to_string(),
                    })
            })
            .collect()
    }
}

fn is_missing(raw: &str) -> bool {
    MISSING_MARKERS.contains(&raw)
}

fn text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .map(|value| value.trim().to_string())
        .filter(|value| !is_missing(value)))
}

fn number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| {
        let value = value.trim();
        if is_missing(value) {
            return None;
        }
        value.parse::<f64>().ok().filter(|parsed| parsed.is_finite())
    }))
}
