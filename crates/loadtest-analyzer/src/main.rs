mod bootstrap;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Utc;
use loadtest_core::diagnostics::TracingSink;
use loadtest_core::settings::Settings;
use loadtest_core::time_utils::resolve_timezone;
use loadtest_runtime::render::{PlotOptions, ReportOptions};
use loadtest_runtime::{AnalysisPipeline, PipelineOptions, RunPaths};

fn main() -> ExitCode {
    let settings = Settings::load();

    if let Err(e) = bootstrap::setup_logging(&settings.log_level, settings.log_file.as_deref()) {
        eprintln!("Failed to initialise logging: {e:#}");
        return ExitCode::FAILURE;
    }

    tracing::info!("Load test analyzer v{} starting", env!("CARGO_PKG_VERSION"));
    for warning in &settings.config_warnings {
        tracing::warn!("{warning}");
    }

    let results_dir = match settings.results_dir.clone() {
        Some(dir) => dir,
        None => match bootstrap::resolve_run_directory(&settings.results_root, &settings.run_prefix)
        {
            Ok(dir) => {
                tracing::info!("Using latest run directory {}", dir.display());
                dir
            }
            Err(e) => {
                tracing::debug!("{e}");
                eprintln!("No results directory specified and no results found.");
                eprintln!("Usage: loadtest-analyzer [results_directory] [metrics_directory]");
                return ExitCode::FAILURE;
            }
        },
    };

    match analyze(&settings, results_dir) {
        Ok(report) => {
            println!("Analysis complete! Report generated at: {}", report.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Analysis failed: {e:#}");
            eprintln!("Analysis failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn analyze(settings: &Settings, results_dir: PathBuf) -> Result<PathBuf> {
    let metrics_dir = settings.metrics_dir_for(&results_dir);
    let paths = RunPaths::new(results_dir, metrics_dir);

    tracing::info!(
        "Results: {}, metrics: {}, bucket: {}s, timezone: {}",
        paths.results_dir.display(),
        paths.metrics_dir.display(),
        settings.bucket_seconds,
        settings.timezone
    );

    let options = PipelineOptions {
        bucket_seconds: settings.bucket_seconds,
        plots: PlotOptions {
            width: settings.chart_width,
            height: settings.chart_height,
        },
        report: ReportOptions {
            title: settings.title.clone(),
            timezone: resolve_timezone(&settings.timezone),
            generated_at: Utc::now(),
        },
    };

    let outcome = AnalysisPipeline::new(options)
        .run(&paths, &TracingSink)
        .with_context(|| format!("analysing {}", paths.results_dir.display()))?;

    tracing::info!(
        "{} charts written ({} autoscaler, {} failed)",
        outcome.plots.total,
        outcome.plots.scaling,
        outcome.plots.failed
    );
    for stage in &outcome.stages {
        tracing::debug!("{}: {}", stage.label, stage.status);
    }

    Ok(outcome.report_path)
}
