//! Command-line interface for training, prediction and table inspection.

use clap::{Args, Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::export::read_envelope;
use crate::features::{CsvTableSource, TimeZoneMode};
use crate::pipeline::{PipelineConfig, PredictPipeline, TrainPipeline};
use crate::utils::{DataLoader, TableInfo};

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn line_box_top()    { println!("  {}", dim("┌─────────────────────────────────────────────────────────┐")); }
fn line_box_bottom() { println!("  {}", dim("└─────────────────────────────────────────────────────────┘")); }

fn line_box(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    println!("  {}  {}{} {}", dim("│"), content, " ".repeat(pad), dim("│"));
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(key), val.white())
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_warn(msg: &str) {
    println!("  {} {}", "!".yellow(), msg);
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn score(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.4}", v))
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "visitor-gender")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Predict visitor gender from ad-request logs")]
#[command(long_about = None)]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by `train` and `predict`
#[derive(Args, Debug, Clone, Default)]
pub struct RunOptions {
    /// Directory holding the input tables
    #[arg(short, long)]
    pub data_dir: Option<PathBuf>,

    /// Model file
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// JSON configuration file; flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Field separator of the tables
    #[arg(long)]
    pub delimiter: Option<char>,

    /// Derive hour and weekday in UTC instead of local time
    #[arg(long)]
    pub utc: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train the classifier on labeled events
    Train {
        #[command(flatten)]
        run: RunOptions,
    },

    /// Predict gender for the target users
    Predict {
        #[command(flatten)]
        run: RunOptions,

        /// Output predictions file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show table or model information
    Info {
        /// Input table
        #[arg(long)]
        data: Option<PathBuf>,

        /// Model file
        #[arg(short, long)]
        model: Option<PathBuf>,

        /// Field separator of the table
        #[arg(long, default_value = ";")]
        delimiter: char,
    },
}

/// Merge the configuration file with command-line overrides
pub fn resolve_config(run: &RunOptions, output: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    let mut config = match &run.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };

    if let Some(dir) = &run.data_dir {
        config = config.with_data_dir(dir);
    }
    if let Some(model) = &run.model {
        config = config.with_model_path(model);
    }
    if let Some(output) = output {
        config = config.with_predictions_path(output);
    }
    if let Some(delimiter) = run.delimiter {
        config = config.with_delimiter(delimiter);
    }
    if run.utc {
        config = config.with_time_zone(TimeZoneMode::Utc);
    }

    config.validate()?;
    Ok(config)
}

fn banner(title: &str) {
    println!();
    line_box_top();
    line_box(&format!("{} {}", title.white().bold(), dim(&format!("v{}", env!("CARGO_PKG_VERSION")))));
    line_box_bottom();
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_train(run: &RunOptions) -> anyhow::Result<()> {
    let config = resolve_config(run, None)?;
    banner("Visitor gender · train");

    section("Inputs");
    println!("  {}", kv("Data   ", &config.data_dir.display().to_string()));
    println!("  {}", kv("Model  ", &config.model_path.display().to_string()));
    println!("  {}", kv("Trees  ", &config.forest.n_estimators.to_string()));
    println!("  {}", kv("Time   ", &format!("{:?}", config.time_zone)));

    section("Train");
    let source = CsvTableSource::new(config.training_tables(), config.loader());
    let pipeline = TrainPipeline::new(config);

    step_run("Building features and fitting the forest");
    let start = Instant::now();
    let report = pipeline.run(&source)?;
    step_done(&format!("{:.2?}", start.elapsed()));

    step_ok(&format!(
        "{} events → {} users, {} labeled",
        report.stages.events, report.stages.users, report.labeled_users
    ));
    if report.dropped_users > 0 {
        step_warn(&format!("{} users dropped without a target", report.dropped_users));
    }
    step_ok(&format!("{} train / {} validation", report.n_train, report.n_validation));

    section("Validation");
    println!("  {:<16} {}", muted("Accuracy"), score(report.metrics.accuracy).white().bold());
    println!("  {:<16} {}", muted("Precision"), score(report.metrics.precision).white());
    println!("  {:<16} {}", muted("Recall"), score(report.metrics.recall).white());
    println!("  {:<16} {}", muted("F1"), score(report.metrics.f1_score).white());
    println!("  {:<16} {}", muted("Fit time"), format!("{:.3}s", report.metrics.training_time_secs).white());

    section("Top features");
    for (name, importance) in report.feature_importances.iter().take(5) {
        println!("  {:<16} {}", muted(name), format!("{:.4}", importance).white());
    }

    if let Some(path) = &report.model_path {
        println!();
        step_ok(&format!("Model saved → {}", path.display()));
    }
    println!();
    Ok(())
}

pub fn cmd_predict(run: &RunOptions, output: Option<&Path>) -> anyhow::Result<()> {
    let config = resolve_config(run, output)?;
    banner("Visitor gender · predict");

    section("Predict");
    let source = CsvTableSource::new(config.inference_tables(), config.loader());
    let pipeline = PredictPipeline::new(config);

    step_run("Scoring target users");
    let start = Instant::now();
    let report = pipeline.run(&source)?;
    step_done(&format!("{:.2?}", start.elapsed()));

    step_ok(&format!(
        "{} of {} target users scored",
        report.predictions.len(),
        report.target_users
    ));
    if report.missing_users > 0 {
        step_warn(&format!("{} target users had no events", report.missing_users));
    }
    if let Some(path) = &report.output_path {
        step_ok(&format!("Predictions saved → {}", path.display()));
    }
    println!();
    Ok(())
}

pub fn cmd_info(data: Option<&Path>, model: Option<&Path>, delimiter: char) -> anyhow::Result<()> {
    if data.is_none() && model.is_none() {
        anyhow::bail!("Nothing to inspect: pass --data and/or --model");
    }

    if let Some(path) = data {
        section("Table");
        let delimiter = u8::try_from(delimiter)
            .map_err(|_| anyhow::anyhow!("Delimiter must be a single ASCII character"))?;
        let df = DataLoader::new().with_delimiter(delimiter).load_csv(path)?;
        let info = TableInfo::from_frame(&df);

        println!("  {:<12} {}", muted("File"), path.display());
        println!("  {:<12} {}", muted("Rows"), info.n_rows);
        println!("  {:<12} {}", muted("Columns"), info.columns.len());
        println!();
        println!("  {:<24} {:>8}", muted("Column"), muted("Nulls"));
        println!("  {}", dim(&"─".repeat(34)));
        for (name, nulls) in &info.columns {
            println!("  {:<24} {:>8}", name, nulls);
        }
    }

    if let Some(path) = model {
        section("Model");
        let envelope = read_envelope(path)?;
        let meta = &envelope.metadata;

        println!("  {:<16} {}", muted("File"), path.display());
        println!("  {:<16} {} ({})", muted("Name"), meta.name, meta.model_type);
        println!("  {:<16} {}", muted("Written by"), meta.version);
        println!("  {:<16} {}", muted("Trained at"), meta.trained_at);
        println!("  {:<16} {}", muted("Samples"), meta.n_training_samples);
        println!("  {:<16} {}", muted("Features"), meta.feature_names.len());
        println!("  {:<16} {} bytes", muted("Payload"), envelope.model_data.len());
        for (key, value) in &meta.hyperparameters {
            println!("  {:<16} {}", muted(key), value);
        }
        for (key, value) in &meta.metrics {
            println!("  {:<16} {:.4}", muted(key), value);
        }
    }

    println!();
    Ok(())
}
