use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use tagwright_core::config::{DebounceConfig, SchedulerConfig, WatchConfig};

use crate::util::{parse_bool_var, parse_duration_var, parse_usize_var};
use crate::validation::SettingsWarnings;

/// Explicit settings file, TOML or JSON.
pub const CONFIG_PATH_VAR: &str = "TAGWRIGHT_CONFIG_PATH";
/// Inline JSON settings payload.
pub const CONFIG_JSON_VAR: &str = "TAGWRIGHT_CONFIG_JSON";
/// Overrides `scheduler.pool_threads`.
pub const POOL_THREADS_VAR: &str = "TAGWRIGHT_POOL_THREADS";
/// Overrides `scheduler.single_threaded`.
pub const SINGLE_THREADED_VAR: &str = "TAGWRIGHT_SINGLE_THREADED";
/// Overrides `search.delay_ms` with a humantime duration.
pub const SEARCH_DELAY_VAR: &str = "TAGWRIGHT_SEARCH_DELAY";
/// Overrides `tree_refresh.delay_ms` with a humantime duration.
pub const REFRESH_DELAY_VAR: &str = "TAGWRIGHT_REFRESH_DELAY";

const FILE_STEM: &str = "tagwright";
/// Probed in this order within each search directory.
const FILE_EXTENSIONS: &[&str] = &["toml", "tml", "json"];

/// Where the settings came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SettingsSource {
    /// Nothing found; built-in defaults.
    #[default]
    Default,
    /// The file named by `$TAGWRIGHT_CONFIG_PATH`.
    EnvPath(PathBuf),
    /// The payload in `$TAGWRIGHT_CONFIG_JSON`.
    EnvInline,
    /// A discovered `tagwright.{toml,tml,json}`.
    File(PathBuf),
}

/// Payload format, picked from a file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SettingsFormat {
    Toml,
    Json,
    /// Unknown extension: TOML first, then JSON.
    Sniff,
}

impl SettingsFormat {
    fn of(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("toml" | "tml") => SettingsFormat::Toml,
            Some("json") => SettingsFormat::Json,
            _ => SettingsFormat::Sniff,
        }
    }
}

/// Runtime settings for the work-scheduling subsystem.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Worker pool sizing, thread naming, exit polling and retirement.
    pub scheduler: SchedulerConfig,
    /// Quiet period between the last keystroke and the library query.
    pub search: DebounceConfig,
    /// Quiet period before the folder tree is rebuilt after refresh requests.
    pub tree_refresh: DebounceConfig,
    /// Directory watch feeding library re-scans.
    pub watch: WatchConfig,
}

/// Outcome of [`Settings::load`].
#[derive(Debug, Clone)]
pub struct SettingsLoad {
    /// Validated settings.
    pub settings: Settings,
    /// Where they were read from.
    pub source: SettingsSource,
    /// Ignored overrides, clamped values and shadowed files.
    pub warnings: SettingsWarnings,
}

impl Settings {
    /// Full startup path: `.env`, file or inline payload, env overrides, then
    /// validation.
    pub fn load() -> anyhow::Result<SettingsLoad> {
        if let Err(err) = dotenvy::dotenv()
            && !err.not_found()
        {
            return Err(err).context("failed to read .env file");
        }

        let (mut settings, source, mut warnings) = Self::resolve(&search_dirs())?;
        warnings.extend(settings.apply_env_overrides());
        warnings.extend(settings.validate());

        Ok(SettingsLoad {
            settings,
            source,
            warnings,
        })
    }

    /// Evaluation order:
    /// 1) `$TAGWRIGHT_CONFIG_PATH` (TOML or JSON file),
    /// 2) `$TAGWRIGHT_CONFIG_JSON` (inline JSON),
    /// 3) the first `tagwright.{toml,tml,json}` in `.`, `config/`, then the
    ///    user config directory,
    /// 4) defaults.
    pub fn load_from_env() -> anyhow::Result<(Self, SettingsSource)> {
        let (settings, source, warnings) = Self::resolve(&search_dirs())?;
        warnings.log();
        Ok((settings, source))
    }

    fn resolve(dirs: &[PathBuf]) -> anyhow::Result<(Self, SettingsSource, SettingsWarnings)> {
        let mut warnings = SettingsWarnings::default();

        if let Ok(path_str) = env::var(CONFIG_PATH_VAR)
            && !path_str.trim().is_empty()
        {
            let path = PathBuf::from(path_str);
            let settings = Self::load_from_file(&path)
                .with_context(|| format!("{CONFIG_PATH_VAR} points at unusable settings"))?;
            return Ok((settings, SettingsSource::EnvPath(path), warnings));
        }

        if let Ok(raw) = env::var(CONFIG_JSON_VAR)
            && !raw.trim().is_empty()
        {
            let parsed = Self::parse_json(&raw)
                .with_context(|| format!("{CONFIG_JSON_VAR} is not a tagwright settings payload"))?;
            return Ok((parsed, SettingsSource::EnvInline, warnings));
        }

        let found = discover_files(dirs);
        let Some((chosen, shadowed)) = found.split_first() else {
            return Ok((Self::default(), SettingsSource::Default, warnings));
        };
        for other in shadowed {
            warnings.push_with_hint(
                format!(
                    "{} is shadowed by {} and was not read",
                    other.display(),
                    chosen.display()
                ),
                format!("Keep a single {FILE_STEM} settings file, or set {CONFIG_PATH_VAR}"),
            );
        }
        let settings = Self::load_from_file(chosen)?;
        Ok((settings, SettingsSource::File(chosen.clone()), warnings))
    }

    /// Reads one settings file. `.toml`/`.tml` parse as TOML, `.json` as
    /// JSON; anything else is sniffed.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("cannot read tagwright settings file {}", path.display()))?;
        let origin = path.display().to_string();

        match SettingsFormat::of(path) {
            SettingsFormat::Toml => toml::from_str(&contents)
                .map_err(|err| anyhow!("invalid tagwright settings in {origin}: {err}")),
            SettingsFormat::Json => Self::parse_json(&contents)
                .with_context(|| format!("invalid tagwright settings in {origin}")),
            SettingsFormat::Sniff => Self::parse_from_str(&contents, &origin),
        }
    }

    /// Tries TOML first, then JSON.
    pub fn parse_from_str(contents: &str, origin: &str) -> anyhow::Result<Self> {
        toml::from_str(contents).or_else(|toml_err| {
            serde_json::from_str(contents).map_err(|json_err| {
                anyhow!(
                    "{origin} is neither TOML nor JSON tagwright settings: \
                     toml error: {toml_err}; json error: {json_err}"
                )
            })
        })
    }

    /// Parses a JSON settings payload.
    pub fn parse_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw).map_err(|err| anyhow!("malformed settings json: {err}"))
    }

    /// Applies single-value overrides from the environment. Values that do
    /// not parse are skipped and reported.
    pub fn apply_env_overrides(&mut self) -> SettingsWarnings {
        let mut warnings = SettingsWarnings::default();

        match parse_usize_var(POOL_THREADS_VAR) {
            Some(Ok(threads)) => self.scheduler.pool_threads = threads,
            Some(Err(raw)) => warnings.push_with_hint(
                format!("{POOL_THREADS_VAR}={raw} is not a thread count; ignored"),
                "Use a non-negative integer; 0 sizes the pool from the CPU count",
            ),
            None => {}
        }

        match parse_bool_var(SINGLE_THREADED_VAR) {
            Some(Ok(single)) => self.scheduler.single_threaded = single,
            Some(Err(raw)) => warnings.push(format!(
                "{SINGLE_THREADED_VAR}={raw} is not a boolean; ignored"
            )),
            None => {}
        }

        for (var, target) in [
            (SEARCH_DELAY_VAR, &mut self.search),
            (REFRESH_DELAY_VAR, &mut self.tree_refresh),
        ] {
            match parse_duration_var(var) {
                Some(Ok(delay)) => *target = DebounceConfig::from_millis(duration_millis(delay)),
                Some(Err(raw)) => warnings.push_with_hint(
                    format!("{var}={raw} is not a duration; ignored"),
                    "Use a humantime value such as 250ms or 1s",
                ),
                None => {}
            }
        }

        warnings
    }

}

/// Working directory, its `config/`, then `$XDG_CONFIG_HOME/tagwright`
/// (falling back to `~/.config/tagwright`).
fn search_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![PathBuf::from("."), PathBuf::from("config")];
    let user = env::var_os("XDG_CONFIG_HOME")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")));
    if let Some(base) = user {
        dirs.push(base.join(FILE_STEM));
    }
    dirs
}

/// Every existing settings file under `dirs`, in precedence order.
fn discover_files(dirs: &[PathBuf]) -> Vec<PathBuf> {
    dirs.iter()
        .flat_map(|dir| {
            FILE_EXTENSIONS
                .iter()
                .map(move |ext| dir.join(format!("{FILE_STEM}.{ext}")))
        })
        .filter(|path| path.is_file())
        .collect()
}

fn duration_millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let settings = Settings::parse_from_str(
            r#"
            [scheduler]
            pool_threads = 2
            retire_policy = "after_teardown"

            [search]
            delay_ms = 300
            "#,
            "inline",
        )
        .unwrap();

        assert_eq!(settings.scheduler.pool_threads, 2);
        assert_eq!(
            settings.scheduler.retire_policy,
            tagwright_core::RetirePolicy::AfterTeardown
        );
        assert_eq!(settings.scheduler.exit_poll_interval_ms, 10);
        assert_eq!(settings.search.delay_ms, 300);
        assert_eq!(settings.tree_refresh.delay_ms, 250);
        assert!(settings.watch.recursive);
    }

    #[test]
    fn json_is_accepted_as_fallback() {
        let settings =
            Settings::parse_from_str(r#"{"watch": {"recursive": false}}"#, "inline").unwrap();
        assert!(!settings.watch.recursive);
    }

    #[test]
    fn garbage_reports_both_parsers() {
        let err = Settings::parse_from_str("[[[", "inline").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("toml error"));
        assert!(message.contains("json error"));
    }

    #[test]
    fn tml_extension_reads_as_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tagwright.tml");
        std::fs::write(&path, "[tree_refresh]\ndelay_ms = 900\n").unwrap();

        let settings = Settings::load_from_file(&path).unwrap();
        assert_eq!(settings.tree_refresh.delay_ms, 900);
    }

    #[test]
    fn uppercase_json_extension_is_not_sniffed_as_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tagwright.JSON");
        std::fs::write(&path, "pool_threads = 2").unwrap();

        let err = Settings::load_from_file(&path).unwrap_err();
        assert!(format!("{err:#}").contains("malformed settings json"));
    }

    #[test]
    fn discovery_follows_directory_then_extension_order() {
        let root = tempfile::tempdir().unwrap();
        let local = root.path().to_path_buf();
        let config = root.path().join("config");
        std::fs::create_dir(&config).unwrap();

        std::fs::write(config.join("tagwright.toml"), "").unwrap();
        std::fs::write(local.join("tagwright.json"), "{}").unwrap();
        std::fs::write(local.join("tagwright.tml"), "").unwrap();

        let found = discover_files(&[local.clone(), config.clone()]);
        assert_eq!(
            found,
            vec![
                local.join("tagwright.tml"),
                local.join("tagwright.json"),
                config.join("tagwright.toml"),
            ]
        );
    }

    #[test]
    fn discovered_file_reports_what_it_shadows() {
        let root = tempfile::tempdir().unwrap();
        let local = root.path().to_path_buf();
        let config = root.path().join("config");
        std::fs::create_dir(&config).unwrap();
        std::fs::write(local.join("tagwright.tml"), "[search]\ndelay_ms = 40\n").unwrap();
        std::fs::write(config.join("tagwright.json"), "{}").unwrap();

        // Explicit env sources win over discovery.
        if env::var_os(CONFIG_PATH_VAR).is_some() || env::var_os(CONFIG_JSON_VAR).is_some() {
            return;
        }
        let (settings, source, warnings) = Settings::resolve(&[local.clone(), config]).unwrap();

        assert_eq!(source, SettingsSource::File(local.join("tagwright.tml")));
        assert_eq!(settings.search.delay_ms, 40);
        assert_eq!(warnings.len(), 1);
        assert!(warnings.items[0].message.contains("shadowed"));
    }
}
