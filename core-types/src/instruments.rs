// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One entry of the static instrument table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    pub ticker: String,
    pub uic: i32,
    pub asset_type: String,
    pub decimals: i32,
}

#[derive(Debug, Error)]
pub enum InstrumentError {
    #[error("failed to read instruments file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse instruments file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("no instruments found in {path}")]
    Empty { path: String },
}

#[derive(Debug, Deserialize)]
struct InstrumentFile {
    instruments: Vec<Instrument>,
}

/// Loads the instrument table from a JSON document of the form
/// `{"instruments": [{"ticker": ..., "uic": ..., "assetType": ...,
/// "decimals": ...}, ...]}` keyed by ticker.
pub fn load_instruments(
    path: impl AsRef<Path>,
) -> Result<HashMap<String, Instrument>, InstrumentError> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let data = std::fs::read_to_string(path).map_err(|source| InstrumentError::Read {
        path: display.clone(),
        source,
    })?;
    let file: InstrumentFile =
        serde_json::from_str(&data).map_err(|source| InstrumentError::Parse {
            path: display.clone(),
            source,
        })?;
    if file.instruments.is_empty() {
        return Err(InstrumentError::Empty { path: display });
    }
    Ok(file
        .instruments
        .into_iter()
        .map(|inst| (inst.ticker.clone(), inst))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parses_instrument_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("instruments.json");
        std::fs::write(
            &path,
            r#"{"instruments":[
                {"ticker":"EURUSD","uic":21,"assetType":"FxSpot","decimals":4},
                {"ticker":"USDJPY","uic":42,"assetType":"FxSpot","decimals":2}
            ]}"#,
        )
        .unwrap();
        let table = load_instruments(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table["EURUSD"].uic, 21);
        assert_eq!(table["EURUSD"].asset_type, "FxSpot");
        assert_eq!(table["USDJPY"].decimals, 2);
    }

    #[test]
    fn rejects_empty_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("instruments.json");
        std::fs::write(&path, r#"{"instruments":[]}"#).unwrap();
        let err = load_instruments(&path).unwrap_err();
        assert!(matches!(err, InstrumentError::Empty { .. }));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = load_instruments("does/not/exist.json").unwrap_err();
        assert!(matches!(err, InstrumentError::Read { .. }));
    }
}
