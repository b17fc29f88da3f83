//! Aircraft reference parameters keyed by ICAO type code.
//!
//! The table is immutable reference data loaded once from a delimited text
//! file. Field names follow the reference file headers so existing parameter
//! files load unchanged. A missing file or unparseable row is a fatal load
//! error; a missing type code at prediction time is handled by the caller.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::FuelError;

/// Physical and engine parameters for one aircraft type.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AircraftParameters {
    /// ICAO aircraft type designator, e.g. "A320".
    #[serde(rename = "ACFT_ICAO_TYPE")]
    pub icao_type: String,
    /// Engine type as a categorical code (jet = 1, turboprop = 0).
    #[serde(rename = "ENGINE_TYPE")]
    pub engine_type: f64,
    #[serde(rename = "ENGINE_NUM")]
    pub engine_count: f64,
    /// Takeoff fuel-flow scaling factor from model-native units to kg/s.
    #[serde(rename = "FUEL_FLOW_TO")]
    pub fuel_flow_takeoff: f64,
    #[serde(rename = "OPE_EMPTY_WEIGHT")]
    pub empty_weight_kg: f64,
    #[serde(rename = "MAX_TO_WEIGHT")]
    pub max_takeoff_weight_kg: f64,
    #[serde(rename = "MAX_OPE_ALTI")]
    pub max_altitude_ft: f64,
    #[serde(rename = "MAX_OPE_SPEED")]
    pub max_speed_kt: f64,
    /// Wing surface category code.
    #[serde(rename = "SURFACE")]
    pub surface: f64,
    /// Reliability of the generic model for this type, in [0, 1].
    #[serde(rename = "CONF_IND")]
    pub confidence: f64,
}

impl AircraftParameters {
    /// Mass expressed as a fraction of the operating weight range:
    /// `(mass - OEW) / (MTOW - OEW)`.
    pub fn mass_fraction(&self, mass_kg: f64) -> f64 {
        (mass_kg - self.empty_weight_kg)
            / (self.max_takeoff_weight_kg - self.empty_weight_kg)
    }
}

/// Lookup table of [`AircraftParameters`] keyed by ICAO type code.
#[derive(Clone, Debug, Default)]
pub struct AircraftParameterTable {
    by_type: HashMap<String, AircraftParameters>,
}

impl AircraftParameterTable {
    pub fn from_path(path: &Path) -> Result<Self, FuelError> {
        let text = fs::read_to_string(path).map_err(|e| {
            FuelError::ParamsLoad(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_csv_str(&text)
    }

    /// Parse a delimited parameter table. The delimiter is sniffed from the
    /// header line: reference files ship both semicolon- and comma-separated.
    pub fn from_csv_str(text: &str) -> Result<Self, FuelError> {
        let delimiter = sniff_delimiter(text);
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());
        let mut by_type = HashMap::new();
        for row in reader.deserialize::<AircraftParameters>() {
            let record = row.map_err(|e| FuelError::ParamsLoad(e.to_string()))?;
            by_type.insert(record.icao_type.clone(), record);
        }
        Ok(Self { by_type })
    }

    pub fn get(&self, icao_type: &str) -> Option<&AircraftParameters> {
        self.by_type.get(icao_type)
    }

    pub fn insert(&mut self, record: AircraftParameters) {
        self.by_type.insert(record.icao_type.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

fn sniff_delimiter(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or("");
    if header.contains(';') {
        b';'
    } else {
        b','
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEMICOLON_TABLE: &str = "\
ACFT_ICAO_TYPE;ENGINE_TYPE;ENGINE_NUM;FUEL_FLOW_TO;OPE_EMPTY_WEIGHT;MAX_TO_WEIGHT;MAX_OPE_ALTI;MAX_OPE_SPEED;SURFACE;CONF_IND
A320;1.0;2;0.55;42600;78000;39800;350;122.6;0.95
AT76;0.0;2;0.21;13500;23000;25000;250;61.0;0.62
";

    const COMMA_TABLE: &str = "\
ACFT_ICAO_TYPE,ENGINE_TYPE,ENGINE_NUM,FUEL_FLOW_TO,OPE_EMPTY_WEIGHT,MAX_TO_WEIGHT,MAX_OPE_ALTI,MAX_OPE_SPEED,SURFACE,CONF_IND
B738,1.0,2,0.6,41100,79000,41000,340,124.6,0.93
";

    #[test]
    fn loads_semicolon_table() {
        let table = AircraftParameterTable::from_csv_str(SEMICOLON_TABLE).expect("load");
        assert_eq!(table.len(), 2);
        let a320 = table.get("A320").expect("A320 present");
        assert_eq!(a320.engine_count, 2.0);
        assert_eq!(a320.confidence, 0.95);
        assert!(table.get("ZZZZ").is_none());
    }

    #[test]
    fn loads_comma_table() {
        let table = AircraftParameterTable::from_csv_str(COMMA_TABLE).expect("load");
        let b738 = table.get("B738").expect("B738 present");
        assert_eq!(b738.max_altitude_ft, 41000.0);
    }

    #[test]
    fn bad_row_is_a_load_error() {
        let text = "\
ACFT_ICAO_TYPE;ENGINE_TYPE;ENGINE_NUM;FUEL_FLOW_TO;OPE_EMPTY_WEIGHT;MAX_TO_WEIGHT;MAX_OPE_ALTI;MAX_OPE_SPEED;SURFACE;CONF_IND
A320;not-a-number;2;0.55;42600;78000;39800;350;122.6;0.95
";
        let err = AircraftParameterTable::from_csv_str(text).unwrap_err();
        assert!(matches!(err, FuelError::ParamsLoad(_)));
    }

    #[test]
    fn mass_fraction_spans_operating_weight_range() {
        let table = AircraftParameterTable::from_csv_str(SEMICOLON_TABLE).expect("load");
        let a320 = table.get("A320").expect("A320 present");
        assert!((a320.mass_fraction(42600.0)).abs() < 1e-12);
        assert!((a320.mass_fraction(78000.0) - 1.0).abs() < 1e-12);
    }
}
