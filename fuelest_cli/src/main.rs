use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueHint};
use fuelest::model::{DenseNetwork, FuelModel, ModelCache};
use fuelest::params::AircraftParameterTable;
use fuelest::resample::ResampleConfig;
use fuelest::table::{Column, Table};
use fuelest::{EstimateConfig, FuelEstimator, ProcessConfig, TrajectoryProcessor};
use plotters::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Aircraft fuel-flow estimation CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Estimate fuel flow over an already-regular trajectory CSV
    Estimate(EstimateArgs),
    /// Resample an irregular trajectory, then estimate with a confidence gate
    Process(ProcessArgs),
}

#[derive(Parser, Debug)]
struct CommonArgs {
    /// Trajectory CSV file
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Aircraft parameter table (delimited text)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    params: PathBuf,

    /// Fuel-flow model artifact (JSON dense network)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    model: PathBuf,

    /// Output CSV path (`-` for stdout)
    #[arg(short, long, default_value = "fuel.csv", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Output PNG plot of the estimated fuel-flow profile
    #[arg(long, value_hint = ValueHint::FilePath)]
    png: Option<PathBuf>,

    /// Column holding the ICAO aircraft type code
    #[arg(long, default_value = "typecode")]
    typecode_col: String,

    /// Column holding the timestamp
    #[arg(long, default_value = "timestamp")]
    timestamp_col: String,

    /// Column holding groundspeed (kt)
    #[arg(long, default_value = "groundspeed")]
    groundspeed_col: String,

    /// Column holding pressure altitude (ft)
    #[arg(long, default_value = "altitude")]
    altitude_col: String,

    /// Column holding vertical rate (ft/min)
    #[arg(long, default_value = "vertical_rate")]
    vertical_rate_col: String,

    /// Column holding true airspeed (kt), used when present
    #[arg(long, default_value = "airspeed")]
    airspeed_col: String,

    /// Column holding aircraft mass (kg), used when present
    #[arg(long, default_value = "mass")]
    mass_col: String,

    /// Enable debug logging
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct EstimateArgs {
    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Parser, Debug)]
struct ProcessArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Resampling interval (seconds)
    #[arg(long, default_value_t = 4.0)]
    sample_rate: f64,

    /// Apply moving-average smoothing after resampling
    #[arg(long, action = ArgAction::SetTrue)]
    smooth: bool,

    /// Smoothing window width (samples)
    #[arg(long, default_value_t = 4)]
    window: usize,

    /// Minimum confidence index required to trust the generic model
    #[arg(long, default_value_t = 0.8)]
    min_confidence: f64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Estimate(args) => args.common.verbose,
        Command::Process(args) => args.common.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Estimate(args) => handle_estimate(args),
        Command::Process(args) => handle_process(args),
    }
}

fn handle_estimate(args: EstimateArgs) -> Result<()> {
    let common = &args.common;
    let flight = read_trajectory_csv(&common.input)?;
    let aircraft = AircraftParameterTable::from_path(&common.params)
        .with_context(|| format!("failed to load {}", common.params.display()))?;
    let network = DenseNetwork::from_path(&common.model)
        .with_context(|| format!("failed to load {}", common.model.display()))?;
    let estimator = FuelEstimator::new(aircraft, Arc::new(network) as Arc<dyn FuelModel>);

    let config = EstimateConfig {
        typecode: common.typecode_col.clone(),
        timestamp: common.timestamp_col.clone(),
        groundspeed: common.groundspeed_col.clone(),
        altitude: common.altitude_col.clone(),
        vertical_rate: common.vertical_rate_col.clone(),
        airspeed: common.airspeed_col.clone(),
        mass: common.mass_col.clone(),
    };
    let out = estimator.estimate(&flight, &config)?;
    info!(rows = out.n_rows(), "fuel estimation complete");

    write_table(&out, &common.output)?;
    if let Some(png) = &common.png {
        let times = out.float(&common.timestamp_col)?;
        let flow = out.float("fuel_flow_kgh")?;
        plot_fuel_profile(png, times, flow)?;
    }
    Ok(())
}

fn handle_process(args: ProcessArgs) -> Result<()> {
    let common = &args.common;
    let flight = read_trajectory_csv(&common.input)?;
    let aircraft = AircraftParameterTable::from_path(&common.params)
        .with_context(|| format!("failed to load {}", common.params.display()))?;
    let model_name = common.model.display().to_string();
    let processor =
        TrajectoryProcessor::new(aircraft, ModelCache::with_dense_loader(), model_name);

    let config = ProcessConfig {
        resample: ResampleConfig {
            sample_rate_s: args.sample_rate,
            date: common.timestamp_col.clone(),
            keep: vec![common.typecode_col.clone()],
            resample: vec![
                common.groundspeed_col.clone(),
                common.altitude_col.clone(),
                common.vertical_rate_col.clone(),
            ],
            ..ResampleConfig::default()
        },
        apply_smoothing: args.smooth,
        smooth_columns: vec![
            common.groundspeed_col.clone(),
            common.altitude_col.clone(),
            common.vertical_rate_col.clone(),
        ],
        window_width: args.window,
        min_confidence: args.min_confidence,
        typecode: common.typecode_col.clone(),
        groundspeed: common.groundspeed_col.clone(),
        altitude: common.altitude_col.clone(),
        vertical_rate: common.vertical_rate_col.clone(),
        airspeed: common.airspeed_col.clone(),
        mass: common.mass_col.clone(),
    };
    let out = processor.process(&flight, &config)?;
    info!(rows = out.n_rows(), "trajectory processed");

    write_table(&out, &common.output)?;
    if let Some(png) = &common.png {
        let times = out.float("flight_time")?;
        let flow = out.float("fuel_flow_kgh")?;
        plot_fuel_profile(png, times, flow)?;
    }
    Ok(())
}

/// Read a CSV file into a table. A column becomes numeric when every
/// non-empty cell parses as a float (empty cells are missing values);
/// otherwise it stays textual.
fn read_trajectory_csv(path: &Path) -> Result<Table> {
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut reader = csv::Reader::from_reader(file);
    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("failed to read header of {}", path.display()))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record =
            record.with_context(|| format!("failed to parse {}", path.display()))?;
        if record.len() != headers.len() {
            return Err(anyhow!(
                "{}: row has {} fields, expected {}",
                path.display(),
                record.len(),
                headers.len()
            ));
        }
        for (column, value) in cells.iter_mut().zip(record.iter()) {
            column.push(value.to_string());
        }
    }

    let mut table = Table::new();
    for (name, values) in headers.iter().zip(cells.into_iter()) {
        table.insert(name, build_column(values))?;
    }
    Ok(table)
}

fn build_column(values: Vec<String>) -> Column {
    let mut floats = Vec::with_capacity(values.len());
    for value in &values {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            floats.push(f64::NAN);
        } else if let Ok(parsed) = trimmed.parse::<f64>() {
            floats.push(parsed);
        } else {
            return Column::Str(values);
        }
    }
    Column::Float(floats)
}

fn write_table(table: &Table, path: &Path) -> Result<()> {
    if path.as_os_str() == "-" {
        let stdout = io::stdout();
        let handle = stdout.lock();
        let mut writer = csv::Writer::from_writer(handle);
        write_table_rows(table, &mut writer)
    } else {
        let file =
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        let mut writer = csv::Writer::from_writer(file);
        write_table_rows(table, &mut writer)
    }
}

fn write_table_rows<W: Write>(table: &Table, writer: &mut csv::Writer<W>) -> Result<()> {
    writer.write_record(table.names())?;
    for row in 0..table.n_rows() {
        let mut record = Vec::with_capacity(table.n_cols());
        for name in table.names() {
            let cell = match table.column(name) {
                Some(Column::Float(values)) => format_float(values[row]),
                Some(Column::Str(values)) => values[row].clone(),
                None => String::new(),
            };
            record.push(cell);
        }
        writer.write_record(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Missing values become empty cells; integral values drop the trailing
/// fraction so point ids round-trip cleanly.
fn format_float(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else if value == value.trunc() && value.abs() < 1e12 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

fn plot_fuel_profile(path: &Path, times: &[f64], flow_kgh: &[f64]) -> Result<()> {
    let points: Vec<(f64, f64)> = times
        .iter()
        .zip(flow_kgh.iter())
        .filter(|(t, f)| t.is_finite() && f.is_finite())
        .map(|(&t, &f)| (t, f))
        .collect();
    if points.is_empty() {
        warn!("no finite fuel-flow values to plot");
        return Ok(());
    }

    let x_min = points.iter().map(|(t, _)| *t).fold(f64::INFINITY, f64::min);
    let x_max = points
        .iter()
        .map(|(t, _)| *t)
        .fold(f64::NEG_INFINITY, f64::max);
    let y_max = points
        .iter()
        .map(|(_, f)| *f)
        .fold(f64::NEG_INFINITY, f64::max);
    let y_min = points
        .iter()
        .map(|(_, f)| *f)
        .fold(f64::INFINITY, f64::min)
        .min(0.0);
    let x_pad = ((x_max - x_min) * 0.02).max(1.0);
    let y_pad = ((y_max - y_min) * 0.05).max(1.0);

    let root = BitMapBackend::new(path, (1280, 720)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(25)
        .caption("Estimated fuel flow", ("sans-serif", 24))
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .build_cartesian_2d((x_min - x_pad)..(x_max + x_pad), y_min..(y_max + y_pad))?;

    chart
        .configure_mesh()
        .x_desc("flight time (s)")
        .y_desc("fuel flow (kg/h)")
        .draw()?;

    chart.draw_series(LineSeries::new(points, &RGBColor(200, 0, 100)))?;
    root.present()?;
    info!(path = %path.display(), "fuel-flow profile written");
    Ok(())
}
