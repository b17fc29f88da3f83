//! Fixed-cadence resampling and moving-average smoothing.
//!
//! Irregular radar plots become a uniform time series: rows are sorted by
//! their parsed timestamp, a cumulative flight-time axis is built from the
//! inter-plot gaps, and continuous columns are linearly interpolated onto a
//! fixed-step grid over `[start, end)`. Metadata columns are broadcast from
//! the first row.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use tracing::debug;

use crate::table::{Column, Table};
use crate::FuelError;

/// Serialized form of the regenerated absolute timestamps.
const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%:z";

/// Column names and cadence for [`resample`].
#[derive(Clone, Debug)]
pub struct ResampleConfig {
    /// Grid step in seconds.
    pub sample_rate_s: f64,
    /// Input date/time column (text, parseable timestamps).
    pub date: String,
    /// Output 1-based point-id column.
    pub point_id: String,
    /// Output cumulative flight-time column (seconds from the first plot).
    pub flight_time: String,
    /// Output per-point elapsed column: 0 for the first point, the grid step
    /// after.
    pub elapsed: String,
    /// Metadata columns broadcast from the first row.
    pub keep: Vec<String>,
    /// Continuous columns linearly interpolated onto the grid.
    pub resample: Vec<String>,
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self {
            sample_rate_s: 4.0,
            date: "timestamp".to_string(),
            point_id: "point_id".to_string(),
            flight_time: "flight_time".to_string(),
            elapsed: "dt".to_string(),
            keep: vec!["typecode".to_string()],
            resample: vec![
                "groundspeed".to_string(),
                "altitude".to_string(),
                "vertical_rate".to_string(),
            ],
        }
    }
}

/// Resample a trajectory onto a fixed-interval grid via linear interpolation.
///
/// Requires at least two rows and a span of at least one sample interval.
pub fn resample(table: &Table, config: &ResampleConfig) -> Result<Table, FuelError> {
    if config.sample_rate_s <= 0.0 {
        return Err(FuelError::InvalidParameter(format!(
            "sample rate must be positive, got {}",
            config.sample_rate_s
        )));
    }
    let n = table.n_rows();
    if n < 2 {
        return Err(FuelError::InsufficientData);
    }

    let raw_dates = table.strs(&config.date)?;
    let mut times = Vec::with_capacity(n);
    for raw in raw_dates {
        times.push(parse_timestamp(raw)?);
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by_key(|&i| times[i]);
    let sorted = table.permuted(&order);
    let times: Vec<DateTime<Utc>> = order.iter().map(|&i| times[i]).collect();

    let mut flight_time = Vec::with_capacity(n);
    let mut cumulative = 0.0;
    for (i, t) in times.iter().enumerate() {
        if i > 0 {
            cumulative += seconds_between(times[i - 1], *t);
        }
        flight_time.push(cumulative);
    }

    let start = flight_time[0];
    let end = flight_time[n - 1];
    let step = config.sample_rate_s;
    let count = ((end - start) / step).floor() as usize;
    if count == 0 {
        return Err(FuelError::InsufficientData);
    }
    let grid: Vec<f64> = (0..count).map(|i| start + i as f64 * step).collect();
    debug!(
        points = count,
        span_s = end - start,
        step_s = step,
        "resampling trajectory"
    );

    let mut out = Table::new();
    for name in &config.keep {
        let column = sorted
            .column(name)
            .ok_or_else(|| FuelError::MissingColumn(name.to_string()))?;
        let broadcast = match column {
            Column::Float(values) => Column::Float(vec![values[0]; count]),
            Column::Str(values) => Column::Str(vec![values[0].clone(); count]),
        };
        out.insert(name, broadcast)?;
    }

    out.insert(&config.flight_time, Column::Float(grid.clone()))?;
    let mut elapsed = vec![step; count];
    elapsed[0] = 0.0;
    out.insert(&config.elapsed, Column::Float(elapsed))?;
    out.insert(
        &config.point_id,
        Column::Float((1..=count).map(|i| i as f64).collect()),
    )?;

    let dates: Vec<String> = grid
        .iter()
        .map(|&t| {
            let stamp = times[0] + Duration::milliseconds((t * 1000.0).round() as i64);
            stamp.format(DATE_FORMAT).to_string()
        })
        .collect();
    out.insert(&config.date, Column::Str(dates))?;

    for name in &config.resample {
        let values = sorted.float(name)?;
        out.insert(
            name,
            Column::Float(interpolate_series(&flight_time, values, &grid)),
        )?;
    }

    Ok(out)
}

/// Linear interpolation of `(xs, ys)` at each ascending `grid` point.
/// `xs` must be ascending and the grid must stay within `[xs[0], xs[last]]`.
fn interpolate_series(xs: &[f64], ys: &[f64], grid: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(grid.len());
    let mut idx = 0;
    for &target in grid {
        while idx + 1 < xs.len() && xs[idx + 1] < target {
            idx += 1;
        }
        let (x0, y0) = (xs[idx], ys[idx]);
        if idx + 1 < xs.len() {
            let (x1, y1) = (xs[idx + 1], ys[idx + 1]);
            let frac = if (x1 - x0).abs() > f64::EPSILON {
                ((target - x0) / (x1 - x0)).clamp(0.0, 1.0)
            } else {
                0.0
            };
            out.push(y0 + (y1 - y0) * frac);
        } else {
            out.push(y0);
        }
    }
    out
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, FuelError> {
    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }
    const ZONED: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S%.f %z",
        "%Y-%m-%d %H:%M:%S %z",
        "%Y-%m-%d %H:%M:%S%.f%z",
        "%m/%d/%Y %I:%M:%S %p %z",
    ];
    for format in ZONED {
        if let Ok(parsed) = DateTime::parse_from_str(trimmed, format) {
            return Ok(parsed.with_timezone(&Utc));
        }
    }
    const NAIVE: [&str; 3] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
    ];
    for format in NAIVE {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(Utc.from_utc_datetime(&parsed));
        }
    }
    Err(FuelError::TimestampParse(raw.to_string()))
}

fn seconds_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    let delta = later - earlier;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1e6,
        None => delta.num_milliseconds() as f64 / 1e3,
    }
}

/// Centered moving average with window `window_width`.
///
/// The first and last `window_width / 2` values pass through unchanged;
/// interior values average the window `[i - w/2, i + w/2]` clipped to the
/// sequence bounds.
pub fn moving_average(values: &[f64], window_width: usize) -> Vec<f64> {
    let n = values.len();
    let half = window_width / 2;
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        if i < half || i + half + 1 > n {
            out.push(values[i]);
        } else {
            let start = i.saturating_sub(half);
            let end = (i + half + 1).min(n);
            let window = &values[start..end];
            out.push(window.iter().sum::<f64>() / window.len() as f64);
        }
    }
    out
}

/// Smooth the named numeric columns of `table` in place, independently of
/// each other.
pub fn smooth(
    table: &mut Table,
    columns: &[String],
    window_width: usize,
) -> Result<(), FuelError> {
    for name in columns {
        let smoothed = moving_average(table.float(name)?, window_width);
        table.insert(name, Column::Float(smoothed))?;
    }
    Ok(())
}
