use clap::{CommandFactory, Parser};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "loadtest-analyzer.json";

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Turn the artifacts of one load-test run into charts and an HTML report
#[derive(Parser, Debug, Clone)]
#[command(
    name = "loadtest-analyzer",
    about = "Turn the artifacts of one load-test run into charts and an HTML report",
    version
)]
pub struct Settings {
    /// Run directory holding k6-results.json (latest run when omitted)
    pub results_dir: Option<PathBuf>,

    /// Directory holding the cluster metric CSV files (default: <results_dir>/metrics)
    pub metrics_dir: Option<PathBuf>,

    /// Root searched for run directories when none is given
    #[arg(long, default_value = "results", env = "LOADTEST_RESULTS_ROOT")]
    pub results_root: PathBuf,

    /// Name prefix of run directories under the results root
    #[arg(long, default_value = "load-test-results-")]
    pub run_prefix: String,

    /// Width of resource aggregation buckets in seconds (1-3600)
    #[arg(long, default_value = "30", value_parser = clap::value_parser!(u32).range(1..=3600))]
    pub bucket_seconds: u32,

    /// Timezone of the report header (auto-detected if not specified)
    #[arg(long, default_value = "auto")]
    pub timezone: String,

    /// Report title
    #[arg(long, default_value = "Load Test Report")]
    pub title: String,

    /// Chart width in pixels
    #[arg(long, default_value = "1200", value_parser = clap::value_parser!(u32).range(200..=8000))]
    pub chart_width: u32,

    /// Chart height in pixels
    #[arg(long, default_value = "600", value_parser = clap::value_parser!(u32).range(150..=8000))]
    pub chart_height: u32,

    /// JSON file with default option values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Problems met while reading the config file. Settings load before the
    /// subscriber exists, so the binary logs these once logging is up.
    #[arg(skip)]
    pub config_warnings: Vec<String>,
}

// ── FileConfig ─────────────────────────────────────────────────────────────────

/// Option defaults read from a JSON config file.
///
/// Every field is optional; values only apply to options that were not given
/// on the command line or through the environment.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct FileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results_root: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_seconds: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart_width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart_height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl FileConfig {
    /// Load a config file.
    ///
    /// An absent file is an empty config. An unparsable one is reported as a
    /// warning message for the caller to log.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Ok(Self::default());
        };
        serde_json::from_str(&content)
            .map_err(|e| format!("Ignoring unparsable config file {}: {}", path.display(), e))
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse CLI arguments, merge the config file where no explicit value was
    /// provided and resolve `"auto"` values.
    pub fn load() -> Self {
        Self::load_from_args(std::env::args_os().collect())
    }

    /// Same as [`Settings::load`] but accepts an explicit argument list.
    pub fn load_from_args(args: Vec<std::ffi::OsString>) -> Self {
        Self::load_impl(args, Path::new(DEFAULT_CONFIG_FILE))
    }

    /// Full implementation – accepts args and the fallback config path so
    /// that tests can redirect to a temporary directory.
    pub fn load_impl(args: Vec<std::ffi::OsString>, default_config: &Path) -> Self {
        // Build raw ArgMatches so we can query ValueSource.
        let matches = Settings::command().get_matches_from(args.clone());
        let mut settings = Settings::parse_from(args);

        let config_path = settings
            .config
            .clone()
            .unwrap_or_else(|| default_config.to_path_buf());
        let file = FileConfig::load_from(&config_path).unwrap_or_else(|warning| {
            settings.config_warnings.push(warning);
            FileConfig::default()
        });

        if !is_arg_explicitly_set(&matches, "results_root") {
            if let Some(v) = file.results_root {
                settings.results_root = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "run_prefix") {
            if let Some(v) = file.run_prefix {
                settings.run_prefix = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "bucket_seconds") {
            if let Some(v) = file.bucket_seconds {
                settings.bucket_seconds = v.clamp(1, 3600);
            }
        }
        if !is_arg_explicitly_set(&matches, "timezone") {
            if let Some(v) = file.timezone {
                settings.timezone = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "title") {
            if let Some(v) = file.title {
                settings.title = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "chart_width") {
            if let Some(v) = file.chart_width {
                settings.chart_width = v.clamp(200, 8000);
            }
        }
        if !is_arg_explicitly_set(&matches, "chart_height") {
            if let Some(v) = file.chart_height {
                settings.chart_height = v.clamp(150, 8000);
            }
        }
        if !is_arg_explicitly_set(&matches, "log_level") {
            if let Some(v) = file.log_level {
                settings.log_level = v;
            }
        }

        Self::resolve_auto_values(settings)
    }

    /// Metrics directory for `results_dir`: the explicit positional argument,
    /// or `<results_dir>/metrics`.
    pub fn metrics_dir_for(&self, results_dir: &Path) -> PathBuf {
        self.metrics_dir
            .clone()
            .unwrap_or_else(|| results_dir.join("metrics"))
    }

    /// Resolve `"auto"` sentinel values and apply the `--debug` flag.
    fn resolve_auto_values(mut settings: Settings) -> Settings {
        if settings.timezone == "auto" {
            settings.timezone = crate::time_utils::get_system_timezone();
        }

        // --debug overrides log level.
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }

        settings
    }
}

// ── Helper: check if an arg was explicitly set ─────────────────────────────────

/// Returns `true` when `name` was supplied on the command line or through its
/// environment variable (not via default value).
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches!(
        matches.value_source(name),
        Some(clap::parser::ValueSource::CommandLine) | Some(clap::parser::ValueSource::EnvVariable)
    )
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(tmp: &TempDir, config: &FileConfig) -> PathBuf {
        let path = tmp.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, serde_json::to_string_pretty(config).unwrap()).unwrap();
        path
    }

    fn load(args: &[&str], config_path: &Path) -> Settings {
        let args = args.iter().map(std::ffi::OsString::from).collect();
        Settings::load_impl(args, config_path)
    }

    // ── CLI parsing ──────────────────────────────────────────────────────────

    #[test]
    fn test_settings_default_values() {
        let settings = Settings::parse_from(["loadtest-analyzer"]);

        assert!(settings.results_dir.is_none());
        assert!(settings.metrics_dir.is_none());
        assert_eq!(settings.run_prefix, "load-test-results-");
        assert_eq!(settings.bucket_seconds, 30);
        assert_eq!(settings.timezone, "auto");
        assert_eq!(settings.title, "Load Test Report");
        assert_eq!(settings.chart_width, 1200);
        assert_eq!(settings.chart_height, 600);
        assert_eq!(settings.log_level, "INFO");
        assert!(settings.log_file.is_none());
        assert!(!settings.debug);
    }

    #[test]
    fn test_settings_positional_dirs() {
        let settings = Settings::parse_from(["loadtest-analyzer", "runs/a", "runs/a/m"]);
        assert_eq!(settings.results_dir, Some(PathBuf::from("runs/a")));
        assert_eq!(settings.metrics_dir, Some(PathBuf::from("runs/a/m")));
    }

    #[test]
    fn test_settings_bucket_range_rejected() {
        let result = Settings::try_parse_from(["loadtest-analyzer", "--bucket-seconds", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_metrics_dir_defaults_under_results() {
        let settings = Settings::parse_from(["loadtest-analyzer", "runs/a"]);
        assert_eq!(
            settings.metrics_dir_for(Path::new("runs/a")),
            PathBuf::from("runs/a/metrics")
        );

        let explicit = Settings::parse_from(["loadtest-analyzer", "runs/a", "elsewhere"]);
        assert_eq!(
            explicit.metrics_dir_for(Path::new("runs/a")),
            PathBuf::from("elsewhere")
        );
    }

    // ── FileConfig ───────────────────────────────────────────────────────────

    #[test]
    fn test_file_config_missing_is_default() {
        let tmp = TempDir::new().expect("tempdir");
        let loaded = FileConfig::load_from(&tmp.path().join("nope.json"));
        assert_eq!(loaded, Ok(FileConfig::default()));
    }

    #[test]
    fn test_file_config_garbage_is_reported() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();

        let warning = FileConfig::load_from(&path).unwrap_err();
        assert!(warning.starts_with("Ignoring unparsable config file"));
        assert!(warning.contains("bad.json"));
    }

    #[test]
    fn test_garbage_config_keeps_defaults_and_records_warning() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "[1, 2").unwrap();

        let settings = load(&["loadtest-analyzer", "--timezone", "UTC"], &path);
        assert_eq!(settings.config_warnings.len(), 1);
        assert_eq!(settings.bucket_seconds, 30);
        assert_eq!(settings.title, "Load Test Report");
    }

    #[test]
    fn test_valid_config_records_no_warning() {
        let tmp = TempDir::new().expect("tempdir");
        let path = write_config(&tmp, &FileConfig::default());
        let settings = load(&["loadtest-analyzer", "--timezone", "UTC"], &path);
        assert!(settings.config_warnings.is_empty());
    }

    // ── load_impl ────────────────────────────────────────────────────────────

    #[test]
    fn test_config_file_fills_unset_options() {
        let tmp = TempDir::new().expect("tempdir");
        let path = write_config(
            &tmp,
            &FileConfig {
                title: Some("Checkout Soak Test".to_string()),
                bucket_seconds: Some(60),
                timezone: Some("UTC".to_string()),
                ..Default::default()
            },
        );

        let settings = load(&["loadtest-analyzer"], &path);
        assert_eq!(settings.title, "Checkout Soak Test");
        assert_eq!(settings.bucket_seconds, 60);
        assert_eq!(settings.timezone, "UTC");
    }

    #[test]
    fn test_cli_overrides_config_file() {
        let tmp = TempDir::new().expect("tempdir");
        let path = write_config(
            &tmp,
            &FileConfig {
                title: Some("From File".to_string()),
                timezone: Some("UTC".to_string()),
                ..Default::default()
            },
        );

        let settings = load(&["loadtest-analyzer", "--title", "From CLI"], &path);
        assert_eq!(settings.title, "From CLI");
    }

    #[test]
    fn test_explicit_config_flag_wins_over_default_path() {
        let tmp = TempDir::new().expect("tempdir");
        let explicit = tmp.path().join("custom.json");
        std::fs::write(&explicit, r#"{"run_prefix": "soak-", "timezone": "UTC"}"#).unwrap();

        let settings = load(
            &["loadtest-analyzer", "--config", explicit.to_str().unwrap()],
            &tmp.path().join("absent.json"),
        );
        assert_eq!(settings.run_prefix, "soak-");
    }

    #[test]
    fn test_config_values_are_clamped() {
        let tmp = TempDir::new().expect("tempdir");
        let path = write_config(
            &tmp,
            &FileConfig {
                bucket_seconds: Some(0),
                chart_width: Some(10),
                timezone: Some("UTC".to_string()),
                ..Default::default()
            },
        );

        let settings = load(&["loadtest-analyzer"], &path);
        assert_eq!(settings.bucket_seconds, 1);
        assert_eq!(settings.chart_width, 200);
    }

    #[test]
    fn test_debug_overrides_log_level() {
        let tmp = TempDir::new().expect("tempdir");
        let settings = load(
            &["loadtest-analyzer", "--debug"],
            &tmp.path().join("absent.json"),
        );
        assert_eq!(settings.log_level, "DEBUG");
    }

    #[test]
    fn test_auto_timezone_is_resolved() {
        let tmp = TempDir::new().expect("tempdir");
        let settings = load(&["loadtest-analyzer"], &tmp.path().join("absent.json"));
        assert_ne!(settings.timezone, "auto");
    }
}
