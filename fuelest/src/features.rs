//! Model input assembly: derivatives, mass normalization, fixed-bound scaling.
//!
//! The model consumes a fixed 12-feature vector per sample:
//! `[engine_type, d_altitude, d_groundspeed, d_airspeed, surface,
//! max_op_altitude, max_op_speed, altitude, groundspeed, airspeed,
//! vertical_rate, mass_norm]`. The order must match [`FEATURE_MINIMUMS`] /
//! [`FEATURE_MAXIMUMS`] and the trained model's input layout exactly.

use ndarray::Array2;

use crate::params::AircraftParameters;
use crate::FuelError;

pub const FEATURE_COUNT: usize = 12;

/// Sentinel fed to the model when no mass column is available.
pub const DEFAULT_MASS: f64 = -1.0;

/// Seconds per minute, for vertical-rate ft/min → ft/s conversion.
const MINUTE_S: f64 = 60.0;

pub const FEATURE_MAXIMUMS: [f64; FEATURE_COUNT] = [
    1.0, 5000.0, 50.0, 50.0, 600.0, 50000.0, 800.0, 50000.0, 800.0, 800.0, 5000.0, 1.0,
];
pub const FEATURE_MINIMUMS: [f64; FEATURE_COUNT] = [
    0.0, -5000.0, -50.0, -50.0, 0.0, 0.0, 200.0, 0.0, 200.0, 200.0, -5000.0, 0.0,
];

/// How altitude/speed rates of change are obtained.
///
/// Resolved once per call; exactly one mode applies to a trajectory.
#[derive(Clone, Copy, Debug)]
pub enum DerivativeMode<'a> {
    /// Divide sample-to-sample differences by the per-sample elapsed time.
    /// The first interval is backward-filled from the second before use, so a
    /// leading zero elapsed value never divides.
    Elapsed(&'a [f64]),
    /// No usable time axis: speed rates are zero and the altitude rate comes
    /// from the reported vertical rate (ft/min → ft/s).
    QuasiSteady,
}

/// Per-sample kinematic inputs for one trajectory.
#[derive(Clone, Copy, Debug)]
pub struct FeatureInputs<'a> {
    pub altitude: &'a [f64],
    pub groundspeed: &'a [f64],
    /// Falls back to groundspeed when absent, derivatives included.
    pub airspeed: Option<&'a [f64]>,
    pub vertical_rate: &'a [f64],
    pub mass_kg: Option<&'a [f64]>,
    pub mode: DerivativeMode<'a>,
}

/// Assemble the raw (unnormalized) N x 12 feature matrix.
pub fn build_features(
    inputs: &FeatureInputs<'_>,
    aircraft: &AircraftParameters,
) -> Result<Array2<f64>, FuelError> {
    let n = inputs.altitude.len();
    check_len("groundspeed", inputs.groundspeed, n)?;
    check_len("vertical_rate", inputs.vertical_rate, n)?;
    if let Some(airspeed) = inputs.airspeed {
        check_len("airspeed", airspeed, n)?;
    }
    if let Some(mass) = inputs.mass_kg {
        check_len("mass", mass, n)?;
    }

    let airspeed = inputs.airspeed.unwrap_or(inputs.groundspeed);

    let (d_altitude, d_groundspeed, d_airspeed) = match inputs.mode {
        DerivativeMode::Elapsed(elapsed) => {
            check_len("elapsed", elapsed, n)?;
            let dt = backfill_first(elapsed);
            (
                difference_rate(inputs.altitude, &dt),
                difference_rate(inputs.groundspeed, &dt),
                difference_rate(airspeed, &dt),
            )
        }
        DerivativeMode::QuasiSteady => (
            inputs.vertical_rate.iter().map(|v| v / MINUTE_S).collect(),
            vec![0.0; n],
            vec![0.0; n],
        ),
    };

    let mass_norm: Vec<f64> = match inputs.mass_kg {
        Some(mass) => mass.iter().map(|&m| aircraft.mass_fraction(m)).collect(),
        None => vec![DEFAULT_MASS; n],
    };

    let mut features = Array2::zeros((n, FEATURE_COUNT));
    for i in 0..n {
        let row = [
            aircraft.engine_type,
            d_altitude[i],
            d_groundspeed[i],
            d_airspeed[i],
            aircraft.surface,
            aircraft.max_altitude_ft,
            aircraft.max_speed_kt,
            inputs.altitude[i],
            inputs.groundspeed[i],
            airspeed[i],
            inputs.vertical_rate[i],
            mass_norm[i],
        ];
        for (j, value) in row.iter().enumerate() {
            features[(i, j)] = *value;
        }
    }
    Ok(features)
}

/// Affine scaling against the fixed physical bounds, no clamping: values
/// outside the bounds legally map outside [0, 1].
pub fn normalize(features: &Array2<f64>) -> Result<Array2<f64>, FuelError> {
    transform(features, |value, min, max| (value - min) / (max - min))
}

/// Exact inverse of [`normalize`].
pub fn denormalize(features: &Array2<f64>) -> Result<Array2<f64>, FuelError> {
    transform(features, |value, min, max| value * (max - min) + min)
}

fn transform(
    features: &Array2<f64>,
    apply: impl Fn(f64, f64, f64) -> f64,
) -> Result<Array2<f64>, FuelError> {
    if features.ncols() != FEATURE_COUNT {
        return Err(FuelError::LengthMismatch {
            column: "features".to_string(),
            expected: FEATURE_COUNT,
            found: features.ncols(),
        });
    }
    let mut out = features.clone();
    for mut row in out.rows_mut() {
        for (j, value) in row.iter_mut().enumerate() {
            *value = apply(*value, FEATURE_MINIMUMS[j], FEATURE_MAXIMUMS[j]);
        }
    }
    Ok(out)
}

/// Per-sample elapsed seconds from a monotonic time column; the first entry
/// is zero.
pub fn elapsed_from_times(times: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(times.len());
    for (i, &t) in times.iter().enumerate() {
        if i == 0 {
            out.push(0.0);
        } else {
            out.push(t - times[i - 1]);
        }
    }
    out
}

/// Replace the first entry with the second, leaving the rest untouched.
/// Mirrors a backward fill of the undefined first interval.
pub fn backfill_first(values: &[f64]) -> Vec<f64> {
    let mut out = values.to_vec();
    if out.len() > 1 {
        out[0] = out[1];
    }
    out
}

/// Backward-filled sample-to-sample difference divided by the elapsed time:
/// `d[i] = (x[i] - x[i-1]) / dt[i]`, with `d[0]` using the first defined
/// difference.
pub fn difference_rate(values: &[f64], elapsed: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let diff = if i == 0 {
            if n > 1 {
                values[1] - values[0]
            } else {
                0.0
            }
        } else {
            values[i] - values[i - 1]
        };
        out.push(diff / elapsed[i]);
    }
    out
}

fn check_len(name: &str, values: &[f64], expected: usize) -> Result<(), FuelError> {
    if values.len() != expected {
        return Err(FuelError::LengthMismatch {
            column: name.to_string(),
            expected,
            found: values.len(),
        });
    }
    Ok(())
}
