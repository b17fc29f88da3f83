//! Aircraft fuel-flow estimation from radar-derived trajectory data.
//!
//! A trajectory table of kinematic samples (groundspeed, altitude, vertical
//! rate, optional airspeed and mass) is turned into per-sample fuel-flow and
//! cumulative-consumption columns using a pre-trained regression model and
//! per-aircraft-type reference parameters.
//!
//! Two pipelines are exposed:
//!
//! - [`FuelEstimator::estimate`] consumes an already-regular trajectory with
//!   a numeric timestamp column and always predicts.
//! - [`TrajectoryProcessor::process`] resamples an irregular trajectory onto
//!   a fixed cadence, optionally smooths it, and predicts only when the
//!   aircraft type's confidence index clears a threshold.

pub mod features;
pub mod model;
pub mod params;
pub mod resample;
pub mod table;

use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::features::{DerivativeMode, FeatureInputs};
use crate::model::{FuelModel, ModelCache};
use crate::params::AircraftParameterTable;
use crate::resample::ResampleConfig;
use crate::table::{Column, Table};

pub const HOUR_S: f64 = 3600.0;

#[derive(Error, Debug)]
pub enum FuelError {
    #[error("missing required column: {0}")]
    MissingColumn(String),
    #[error("column '{0}' must be numeric")]
    NumericColumn(String),
    #[error("column '{0}' must contain text values")]
    TextColumn(String),
    #[error("failed to parse timestamp '{0}'")]
    TimestampParse(String),
    #[error("insufficient data: at least two samples spanning one interval are required")]
    InsufficientData,
    #[error("column '{column}' has {found} values, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },
    #[error("failed to load aircraft parameters: {0}")]
    ParamsLoad(String),
    #[error("failed to load model artifact: {0}")]
    ModelLoad(String),
    #[error("model invocation failed: {0}")]
    Model(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Column names consumed by [`FuelEstimator::estimate`].
#[derive(Clone, Debug)]
pub struct EstimateConfig {
    pub typecode: String,
    /// Numeric seconds column; a text or missing column fails fast.
    pub timestamp: String,
    pub groundspeed: String,
    pub altitude: String,
    pub vertical_rate: String,
    /// Used when present; groundspeed substitutes otherwise.
    pub airspeed: String,
    /// Used when present; the unknown-mass sentinel substitutes otherwise.
    pub mass: String,
}

impl Default for EstimateConfig {
    fn default() -> Self {
        Self {
            typecode: "typecode".to_string(),
            timestamp: "timestamp".to_string(),
            groundspeed: "groundspeed".to_string(),
            altitude: "altitude".to_string(),
            vertical_rate: "vertical_rate".to_string(),
            airspeed: "airspeed".to_string(),
            mass: "mass".to_string(),
        }
    }
}

/// Direct pipeline: estimate fuel flow over an already-regular trajectory.
///
/// No resampling, no smoothing, no confidence gate: if the type is in the
/// parameter table the model is always consulted.
pub struct FuelEstimator {
    aircraft: AircraftParameterTable,
    model: Arc<dyn FuelModel>,
}

impl FuelEstimator {
    pub fn new(aircraft: AircraftParameterTable, model: Arc<dyn FuelModel>) -> Self {
        Self { aircraft, model }
    }

    /// Return `flight` with `fuel_flow` (model-native total flow),
    /// `fuel_flow_kgh`, and `fuel_cumsum` (kg) columns appended.
    ///
    /// Preconditions: samples are already in ascending time order, and the
    /// aircraft type is read from the first row of the typecode column (one
    /// type per trajectory). An unknown type warns and yields NaN fuel
    /// columns with every original column intact.
    pub fn estimate(&self, flight: &Table, config: &EstimateConfig) -> Result<Table, FuelError> {
        let n = flight.n_rows();
        if n < 2 {
            return Err(FuelError::InsufficientData);
        }
        let timestamp = flight.float(&config.timestamp)?;
        let typecode = first_value(flight, &config.typecode)?;
        let groundspeed = flight.float(&config.groundspeed)?;
        let altitude = flight.float(&config.altitude)?;
        let vertical_rate = flight.float(&config.vertical_rate)?;
        let airspeed = if flight.contains(&config.airspeed) {
            Some(flight.float(&config.airspeed)?)
        } else {
            None
        };
        let mass = if flight.contains(&config.mass) {
            Some(flight.float(&config.mass)?)
        } else {
            None
        };

        let mut out = flight.clone();
        let aircraft = match self.aircraft.get(&typecode) {
            Some(params) => params.clone(),
            None => {
                warn!(typecode = %typecode, "aircraft type not supported");
                append_missing(&mut out, &["fuel_flow", "fuel_flow_kgh", "fuel_cumsum"], n)?;
                return Ok(out);
            }
        };

        let dt = features::backfill_first(&features::elapsed_from_times(timestamp));
        let inputs = FeatureInputs {
            altitude,
            groundspeed,
            airspeed,
            vertical_rate,
            mass_kg: mass,
            mode: DerivativeMode::Elapsed(&dt),
        };
        let raw = features::build_features(&inputs, &aircraft)?;
        let normalized = features::normalize(&raw)?;
        let single_engine = self.model.predict(normalized.view())?;
        if single_engine.len() != n {
            return Err(FuelError::Model(format!(
                "model returned {} values for {} samples",
                single_engine.len(),
                n
            )));
        }

        let fuel_flow: Vec<f64> = single_engine
            .iter()
            .map(|flow| flow * aircraft.engine_count)
            .collect();
        let fuel_flow_kgh: Vec<f64> = fuel_flow
            .iter()
            .map(|flow| flow * aircraft.fuel_flow_takeoff * HOUR_S)
            .collect();
        let fuel_cumsum = running_consumption(&fuel_flow, &dt);

        out.insert("fuel_flow", Column::Float(fuel_flow))?;
        out.insert("fuel_flow_kgh", Column::Float(fuel_flow_kgh))?;
        out.insert("fuel_cumsum", Column::Float(fuel_cumsum))?;
        Ok(out)
    }
}

/// Column names and tuning for [`TrajectoryProcessor::process`].
#[derive(Clone, Debug)]
pub struct ProcessConfig {
    pub resample: ResampleConfig,
    pub apply_smoothing: bool,
    /// Columns smoothed when `apply_smoothing` is set.
    pub smooth_columns: Vec<String>,
    pub window_width: usize,
    /// The model is consulted only when the type's confidence index is
    /// strictly above this value.
    pub min_confidence: f64,
    pub typecode: String,
    pub groundspeed: String,
    pub altitude: String,
    pub vertical_rate: String,
    pub airspeed: String,
    pub mass: String,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            resample: ResampleConfig::default(),
            apply_smoothing: false,
            smooth_columns: vec![
                "groundspeed".to_string(),
                "altitude".to_string(),
                "vertical_rate".to_string(),
            ],
            window_width: 4,
            min_confidence: 0.8,
            typecode: "typecode".to_string(),
            groundspeed: "groundspeed".to_string(),
            altitude: "altitude".to_string(),
            vertical_rate: "vertical_rate".to_string(),
            airspeed: "airspeed".to_string(),
            mass: "mass".to_string(),
        }
    }
}

/// Resample pipeline: fixed-cadence resampling, optional smoothing, and
/// confidence-gated fuel prediction.
///
/// Holds the model cache; the artifact named at construction is loaded on
/// first use and shared by subsequent calls.
pub struct TrajectoryProcessor {
    aircraft: AircraftParameterTable,
    models: ModelCache,
    model_name: String,
}

impl TrajectoryProcessor {
    pub fn new(
        aircraft: AircraftParameterTable,
        models: ModelCache,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            aircraft,
            models,
            model_name: model_name.into(),
        }
    }

    /// Resample `flight`, optionally smooth it, and append fuel columns:
    /// `fuel_flow` (single-engine, model-native), `fuel_flow_kgh`,
    /// per-point `fuel_kg`, and `fuel_cumsum` (kg).
    ///
    /// An unknown type warns and yields NaN fuel columns; a known type whose
    /// confidence index does not clear the threshold yields NaN silently.
    pub fn process(&self, flight: &Table, config: &ProcessConfig) -> Result<Table, FuelError> {
        let resample_config = self.effective_resample_config(flight, config);
        let mut resampled = resample::resample(flight, &resample_config)?;
        if config.apply_smoothing {
            resample::smooth(&mut resampled, &config.smooth_columns, config.window_width)?;
        }
        self.fuel_prediction(&mut resampled, &resample_config, config)?;
        Ok(resampled)
    }

    /// Airspeed/mass columns ride along through the resampler when the input
    /// carries them.
    fn effective_resample_config(&self, flight: &Table, config: &ProcessConfig) -> ResampleConfig {
        let mut resample_config = config.resample.clone();
        for optional in [&config.airspeed, &config.mass] {
            if flight.contains(optional) && !resample_config.resample.contains(optional) {
                resample_config.resample.push(optional.clone());
            }
        }
        resample_config
    }

    fn fuel_prediction(
        &self,
        resampled: &mut Table,
        resample_config: &ResampleConfig,
        config: &ProcessConfig,
    ) -> Result<(), FuelError> {
        const FUEL_COLUMNS: [&str; 4] = ["fuel_flow", "fuel_flow_kgh", "fuel_kg", "fuel_cumsum"];
        let n = resampled.n_rows();
        let typecode = first_value(resampled, &config.typecode)?;

        let aircraft = match self.aircraft.get(&typecode) {
            Some(params) => params.clone(),
            None => {
                warn!(typecode = %typecode, "aircraft type not supported");
                return append_missing(resampled, &FUEL_COLUMNS, n);
            }
        };
        if aircraft.confidence <= config.min_confidence {
            // Known type, generic model not trusted: null output, no warning.
            return append_missing(resampled, &FUEL_COLUMNS, n);
        }

        let model = self.models.get_or_load(&self.model_name)?;
        let elapsed = resampled.float(&resample_config.elapsed)?.to_vec();
        let airspeed = if resampled.contains(&config.airspeed) {
            Some(resampled.float(&config.airspeed)?)
        } else {
            None
        };
        let mass = if resampled.contains(&config.mass) {
            Some(resampled.float(&config.mass)?)
        } else {
            None
        };
        let inputs = FeatureInputs {
            altitude: resampled.float(&config.altitude)?,
            groundspeed: resampled.float(&config.groundspeed)?,
            airspeed,
            vertical_rate: resampled.float(&config.vertical_rate)?,
            mass_kg: mass,
            mode: DerivativeMode::Elapsed(&elapsed),
        };
        let raw = features::build_features(&inputs, &aircraft)?;
        let normalized = features::normalize(&raw)?;
        let single_engine = model.predict(normalized.view())?;
        if single_engine.len() != n {
            return Err(FuelError::Model(format!(
                "model returned {} values for {} samples",
                single_engine.len(),
                n
            )));
        }

        let fuel_flow: Vec<f64> = single_engine.to_vec();
        let fuel_flow_kgh: Vec<f64> = fuel_flow
            .iter()
            .map(|flow| flow * aircraft.engine_count * aircraft.fuel_flow_takeoff * HOUR_S)
            .collect();
        let fuel_kg: Vec<f64> = fuel_flow_kgh
            .iter()
            .zip(&elapsed)
            .map(|(kgh, dt)| kgh * dt / HOUR_S)
            .collect();
        let mut total = 0.0;
        let fuel_cumsum: Vec<f64> = fuel_kg
            .iter()
            .map(|kg| {
                total += kg;
                total
            })
            .collect();

        resampled.insert("fuel_flow", Column::Float(fuel_flow))?;
        resampled.insert("fuel_flow_kgh", Column::Float(fuel_flow_kgh))?;
        resampled.insert("fuel_kg", Column::Float(fuel_kg))?;
        resampled.insert("fuel_cumsum", Column::Float(fuel_cumsum))?;
        Ok(())
    }
}

/// Running sum of `flow[i] * dt[i]`.
pub fn running_consumption(flow: &[f64], elapsed: &[f64]) -> Vec<f64> {
    let mut total = 0.0;
    flow.iter()
        .zip(elapsed)
        .map(|(flow, dt)| {
            total += flow * dt;
            total
        })
        .collect()
}

/// The authoritative per-trajectory value of a text column: its first row.
fn first_value(table: &Table, name: &str) -> Result<String, FuelError> {
    let values = table.strs(name)?;
    values
        .first()
        .cloned()
        .ok_or(FuelError::InsufficientData)
}

fn append_missing(table: &mut Table, names: &[&str], n: usize) -> Result<(), FuelError> {
    for name in names {
        table.insert(name, Column::Float(vec![f64::NAN; n]))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FuelModel;
    use crate::params::AircraftParameters;
    use ndarray::{Array1, ArrayView2};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ConstantModel {
        value: f64,
        calls: AtomicUsize,
    }

    impl ConstantModel {
        fn new(value: f64) -> Self {
            Self {
                value,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl FuelModel for ConstantModel {
        fn predict(&self, inputs: ArrayView2<'_, f64>) -> Result<Array1<f64>, FuelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Array1::from_elem(inputs.nrows(), self.value))
        }
    }

    fn aircraft_table(confidence: f64) -> AircraftParameterTable {
        let mut table = AircraftParameterTable::default();
        table.insert(AircraftParameters {
            icao_type: "A320".to_string(),
            engine_type: 1.0,
            engine_count: 2.0,
            fuel_flow_takeoff: 0.5,
            empty_weight_kg: 40000.0,
            max_takeoff_weight_kg: 80000.0,
            max_altitude_ft: 39800.0,
            max_speed_kt: 350.0,
            surface: 122.6,
            confidence,
        });
        table
    }

    fn regular_flight(typecode: &str) -> Table {
        let mut flight = Table::new();
        flight
            .insert("typecode", Column::Str(vec![typecode.to_string(); 4]))
            .expect("insert typecode");
        flight
            .insert("timestamp", Column::Float(vec![0.0, 1.0, 2.0, 3.0]))
            .expect("insert timestamp");
        flight
            .insert(
                "groundspeed",
                Column::Float(vec![400.0, 410.0, 420.0, 430.0]),
            )
            .expect("insert groundspeed");
        flight
            .insert(
                "altitude",
                Column::Float(vec![10000.0, 11000.0, 12000.0, 13000.0]),
            )
            .expect("insert altitude");
        flight
            .insert("vertical_rate", Column::Float(vec![1000.0; 4]))
            .expect("insert vertical_rate");
        flight
    }

    fn irregular_flight(typecode: &str) -> Table {
        let mut flight = Table::new();
        flight
            .insert("typecode", Column::Str(vec![typecode.to_string(); 3]))
            .expect("insert typecode");
        flight
            .insert(
                "timestamp",
                Column::Str(vec![
                    "2020-06-27 03:51:30+00:00".into(),
                    "2020-06-27 03:51:24+00:00".into(),
                    "2020-06-27 03:51:36+00:00".into(),
                ]),
            )
            .expect("insert timestamp");
        flight
            .insert("groundspeed", Column::Float(vec![410.0, 400.0, 420.0]))
            .expect("insert groundspeed");
        flight
            .insert(
                "altitude",
                Column::Float(vec![11000.0, 10000.0, 12000.0]),
            )
            .expect("insert altitude");
        flight
            .insert("vertical_rate", Column::Float(vec![1000.0; 3]))
            .expect("insert vertical_rate");
        flight
    }

    #[test]
    fn estimate_appends_scaled_fuel_columns() {
        let estimator = FuelEstimator::new(
            aircraft_table(0.95),
            Arc::new(ConstantModel::new(0.25)),
        );
        let flight = regular_flight("A320");
        let out = estimator
            .estimate(&flight, &EstimateConfig::default())
            .expect("estimate");

        // Two engines at 0.25 native units each.
        assert_eq!(out.float("fuel_flow").unwrap(), vec![0.5; 4]);
        assert_eq!(out.float("fuel_flow_kgh").unwrap(), vec![900.0; 4]);
        // dt backfills to [1, 1, 1, 1], so the running sum starts at one
        // interval's worth.
        assert_eq!(out.float("fuel_cumsum").unwrap(), [0.5, 1.0, 1.5, 2.0]);
        for value in out.float("fuel_flow_kgh").unwrap() {
            assert!(value.is_finite());
        }
    }

    #[test]
    fn estimate_warns_and_nulls_for_unknown_type() {
        let model = Arc::new(ConstantModel::new(0.25));
        let estimator =
            FuelEstimator::new(aircraft_table(0.95), Arc::clone(&model) as Arc<dyn FuelModel>);
        let flight = regular_flight("ZZZZ");
        let out = estimator
            .estimate(&flight, &EstimateConfig::default())
            .expect("estimate");

        assert!(out.float("fuel_flow").unwrap().iter().all(|v| v.is_nan()));
        assert!(out
            .float("fuel_cumsum")
            .unwrap()
            .iter()
            .all(|v| v.is_nan()));
        // Pass-through columns survive untouched and the model is never
        // consulted.
        assert_eq!(
            out.float("altitude").unwrap(),
            flight.float("altitude").unwrap()
        );
        assert_eq!(
            out.strs("typecode").unwrap(),
            flight.strs("typecode").unwrap()
        );
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn estimate_requires_a_numeric_timestamp() {
        let estimator = FuelEstimator::new(
            aircraft_table(0.95),
            Arc::new(ConstantModel::new(0.25)),
        );
        let mut flight = regular_flight("A320");
        flight
            .insert("timestamp", Column::Str(vec!["0".into(); 4]))
            .expect("replace timestamp");
        assert!(matches!(
            estimator.estimate(&flight, &EstimateConfig::default()),
            Err(FuelError::NumericColumn(_))
        ));

        let estimator = FuelEstimator::new(
            aircraft_table(0.95),
            Arc::new(ConstantModel::new(0.25)),
        );
        let mut flight = regular_flight("A320");
        flight
            .insert("timestamp", Column::Float(vec![f64::NAN; 4]))
            .expect("keep numeric");
        // Renaming the configured column away makes it missing.
        let config = EstimateConfig {
            timestamp: "seconds".to_string(),
            ..EstimateConfig::default()
        };
        assert!(matches!(
            estimator.estimate(&flight, &config),
            Err(FuelError::MissingColumn(_))
        ));
    }

    #[test]
    fn estimate_uses_mass_and_airspeed_when_present() {
        let estimator = FuelEstimator::new(
            aircraft_table(0.95),
            Arc::new(ConstantModel::new(0.1)),
        );
        let mut flight = regular_flight("A320");
        flight
            .insert("airspeed", Column::Float(vec![405.0, 415.0, 425.0, 435.0]))
            .expect("insert airspeed");
        flight
            .insert("mass", Column::Float(vec![60000.0; 4]))
            .expect("insert mass");
        let out = estimator
            .estimate(&flight, &EstimateConfig::default())
            .expect("estimate");
        assert!(out
            .float("fuel_flow")
            .unwrap()
            .iter()
            .all(|v| v.is_finite()));
    }

    #[test]
    fn process_predicts_for_trusted_types() {
        let model = Arc::new(ConstantModel::new(0.2));
        let loader_model = Arc::clone(&model);
        let cache = ModelCache::new(Box::new(move |_name| {
            Ok(Arc::clone(&loader_model) as Arc<dyn FuelModel>)
        }));
        let processor = TrajectoryProcessor::new(aircraft_table(0.95), cache, "generic");
        let out = processor
            .process(&irregular_flight("A320"), &ProcessConfig::default())
            .expect("process");

        assert_eq!(out.n_rows(), 3);
        assert_eq!(out.float("fuel_flow").unwrap(), vec![0.2; 3]);
        // 0.2 native x 2 engines x 0.5 takeoff scaling x 3600 s/h.
        assert_eq!(out.float("fuel_flow_kgh").unwrap(), vec![720.0; 3]);
        // First point carries zero elapsed time.
        assert_eq!(out.float("fuel_kg").unwrap(), [0.0, 0.8, 0.8]);
        assert_eq!(out.float("fuel_cumsum").unwrap(), [0.0, 0.8, 1.6]);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn process_nulls_without_warning_below_confidence() {
        let model = Arc::new(ConstantModel::new(0.2));
        let loader_model = Arc::clone(&model);
        let cache = ModelCache::new(Box::new(move |_name| {
            Ok(Arc::clone(&loader_model) as Arc<dyn FuelModel>)
        }));
        let processor = TrajectoryProcessor::new(aircraft_table(0.5), cache, "generic");
        let out = processor
            .process(&irregular_flight("A320"), &ProcessConfig::default())
            .expect("process");

        for name in ["fuel_flow", "fuel_flow_kgh", "fuel_kg", "fuel_cumsum"] {
            assert!(
                out.float(name).unwrap().iter().all(|v| v.is_nan()),
                "{name} should be all-NaN"
            );
        }
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn process_nulls_for_unknown_type() {
        let cache = ModelCache::new(Box::new(|_name| {
            Ok(Arc::new(ConstantModel::new(0.2)) as Arc<dyn FuelModel>)
        }));
        let processor = TrajectoryProcessor::new(aircraft_table(0.95), cache, "generic");
        let out = processor
            .process(&irregular_flight("B748"), &ProcessConfig::default())
            .expect("process");
        assert!(out.float("fuel_flow").unwrap().iter().all(|v| v.is_nan()));
        assert_eq!(out.strs("typecode").unwrap(), vec!["B748".to_string(); 3]);
    }

    #[test]
    fn process_smoothing_is_optional_and_bounded() {
        let cache = ModelCache::new(Box::new(|_name| {
            Ok(Arc::new(ConstantModel::new(0.2)) as Arc<dyn FuelModel>)
        }));
        let processor = TrajectoryProcessor::new(aircraft_table(0.95), cache, "generic");
        let config = ProcessConfig {
            apply_smoothing: true,
            ..ProcessConfig::default()
        };
        let out = processor
            .process(&irregular_flight("A320"), &config)
            .expect("process");
        // Three points with window 4: every index is an edge, so smoothing
        // leaves the interpolated series unchanged.
        let altitude = out.float("altitude").unwrap();
        let expected = [10000.0, 10000.0 + 2000.0 / 3.0, 10000.0 + 4000.0 / 3.0];
        for (got, want) in altitude.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-6, "expected {want}, got {got}");
        }
    }

    #[test]
    fn running_consumption_weights_flow_by_elapsed_time() {
        let cumsum = running_consumption(&[2.0, 3.0, 4.0], &[0.0, 5.0, 5.0]);
        assert_eq!(cumsum, [0.0, 15.0, 35.0]);
    }

    #[test]
    fn model_failure_propagates() {
        struct FailingModel;
        impl FuelModel for FailingModel {
            fn predict(&self, _inputs: ArrayView2<'_, f64>) -> Result<Array1<f64>, FuelError> {
                Err(FuelError::Model("inference backend unavailable".to_string()))
            }
        }
        let estimator = FuelEstimator::new(aircraft_table(0.95), Arc::new(FailingModel));
        assert!(matches!(
            estimator.estimate(&regular_flight("A320"), &EstimateConfig::default()),
            Err(FuelError::Model(_))
        ));
    }
}
