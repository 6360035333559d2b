//! Configuration for mediacat paths, tools and tuning.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (MEDIACAT_HOME, MEDIACAT_LIBRARY, MEDIACAT_INPUT, ...)
//! 2. Config file (.mediacat/config.yaml)
//! 3. Defaults (~/.mediacat)
//!
//! Config file discovery:
//! - Searches the starting directory and its parents for .mediacat/config.yaml
//! - `paths.home` is relative to .mediacat/, other paths to the project root
//!
//! There is no process-wide cache: callers load once and hand the
//! result to [`crate::core::MediaContext`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::media::thumbnail::{ThumbnailFormat, ThumbnailSettings};

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub tools: Option<ToolsConfig>,
    #[serde(default)]
    pub sync: Option<SyncConfig>,
    #[serde(default)]
    pub thumbnails: Option<ThumbnailsConfig>,
    #[serde(default)]
    pub media: Option<MediaConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .mediacat/)
    pub home: Option<String>,
    /// Media tree root (relative to the project root)
    pub library: Option<String>,
    /// Tool input directory (relative to the project root)
    pub input: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolsConfig {
    pub ffprobe: Option<String>,
    pub ffmpeg: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    pub workers: Option<usize>,
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThumbnailsConfig {
    pub width: Option<u32>,
    pub format: Option<String>,
    pub quality: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    /// Assumed frame rate for animated WebP
    pub webp_fps: Option<f64>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// State directory: catalog, lock, thumbnails
    pub home: PathBuf,
    /// Root of the media tree
    pub library: PathBuf,
    /// Root of tool input files, when configured
    pub input: Option<PathBuf>,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub tools: ToolSettings,
    pub sync: SyncSettings,
    pub thumbnails: ThumbnailSettings,
    pub webp_fps: f64,
}

#[derive(Debug, Clone)]
pub struct ToolSettings {
    pub ffprobe: PathBuf,
    pub ffmpeg: PathBuf,
    pub timeout_seconds: u64,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            ffprobe: PathBuf::from("/usr/bin/ffprobe"),
            ffmpeg: PathBuf::from("/usr/bin/ffmpeg"),
            timeout_seconds: 30,
        }
    }
}

impl ToolSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Worker count, already resolved from "all available"
    pub workers: usize,
    pub batch_size: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            workers: resolve_workers(None),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

pub const DEFAULT_BATCH_SIZE: usize = 500;
pub const DEFAULT_THUMBNAIL_WIDTH: u32 = 300;
pub const DEFAULT_WEBP_FPS: f64 = 16.0;

impl ResolvedConfig {
    /// SQLite catalog ($MEDIACAT_HOME/catalog.sqlite)
    pub fn catalog_path(&self) -> PathBuf {
        self.home.join("catalog.sqlite")
    }

    /// Sync pass lock file ($MEDIACAT_HOME/sync.lock)
    pub fn lock_path(&self) -> PathBuf {
        self.home.join("sync.lock")
    }

    /// Thumbnail cache directory ($MEDIACAT_HOME/thumbnails)
    pub fn thumbnail_dir(&self) -> PathBuf {
        self.home.join("thumbnails")
    }

    /// Defaults rooted at an explicit home directory
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        Self {
            library: home.join("library"),
            home,
            input: None,
            config_file: None,
            tools: ToolSettings::default(),
            sync: SyncSettings::default(),
            thumbnails: ThumbnailSettings::default(),
            webp_fps: DEFAULT_WEBP_FPS,
        }
    }
}

/// Zero or absent means every available execution unit
pub fn resolve_workers(requested: Option<usize>) -> usize {
    match requested {
        Some(n) if n > 0 => n,
        _ => std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1),
    }
}

/// Find config file by searching a directory and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(".mediacat").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to a base directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

fn parse_env<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    match env(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("Invalid value for {}: {}", key, raw)),
        None => Ok(None),
    }
}

/// Load configuration from the process environment and current directory
pub fn load() -> Result<ResolvedConfig> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    load_from(&cwd, |key| std::env::var(key).ok())
}

/// Load configuration starting the file search at `start`, reading
/// variables through `env`
pub fn load_from(start: &Path, env: impl Fn(&str) -> Option<String>) -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".mediacat");

    let config_file = find_config_file(start);
    let file = match config_file {
        Some(ref path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    // .mediacat/ and the project root above it
    let state_dir = config_file.as_deref().and_then(Path::parent);
    let base_dir = state_dir.and_then(Path::parent);

    let home = if let Some(env_home) = env("MEDIACAT_HOME") {
        PathBuf::from(env_home)
    } else if let (Some(home_path), Some(dir)) = (&file.paths.home, state_dir) {
        resolve_path(dir, home_path)
    } else {
        default_home
    };

    let library = if let Some(env_lib) = env("MEDIACAT_LIBRARY") {
        PathBuf::from(env_lib)
    } else if let (Some(lib_path), Some(dir)) = (&file.paths.library, base_dir) {
        resolve_path(dir, lib_path)
    } else {
        home.join("library")
    };

    let input = if let Some(env_input) = env("MEDIACAT_INPUT") {
        Some(PathBuf::from(env_input))
    } else {
        match (&file.paths.input, base_dir) {
            (Some(input_path), Some(dir)) => Some(resolve_path(dir, input_path)),
            _ => None,
        }
    };

    let defaults = ToolSettings::default();
    let tools_file = file.tools.as_ref();
    let tools = ToolSettings {
        ffprobe: env("MEDIACAT_FFPROBE")
            .or_else(|| tools_file.and_then(|t| t.ffprobe.clone()))
            .map(PathBuf::from)
            .unwrap_or(defaults.ffprobe),
        ffmpeg: env("MEDIACAT_FFMPEG")
            .or_else(|| tools_file.and_then(|t| t.ffmpeg.clone()))
            .map(PathBuf::from)
            .unwrap_or(defaults.ffmpeg),
        timeout_seconds: tools_file
            .and_then(|t| t.timeout_seconds)
            .unwrap_or(defaults.timeout_seconds),
    };

    let sync_file = file.sync.as_ref();
    let workers = parse_env::<usize>(&env, "MEDIACAT_WORKERS")?
        .or_else(|| sync_file.and_then(|s| s.workers));
    let batch_size = parse_env::<usize>(&env, "MEDIACAT_BATCH_SIZE")?
        .or_else(|| sync_file.and_then(|s| s.batch_size))
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_BATCH_SIZE);
    let sync = SyncSettings {
        workers: resolve_workers(workers),
        batch_size,
    };

    let thumbs_file = file.thumbnails.as_ref();
    let format = env("MEDIACAT_THUMBNAIL_FORMAT")
        .or_else(|| thumbs_file.and_then(|t| t.format.clone()))
        .map(|raw| ThumbnailFormat::parse_lossy(&raw))
        .unwrap_or(ThumbnailFormat::Webp);
    let thumbnails = ThumbnailSettings {
        width: parse_env::<u32>(&env, "MEDIACAT_THUMBNAIL_WIDTH")?
            .or_else(|| thumbs_file.and_then(|t| t.width))
            .filter(|w| *w > 0)
            .unwrap_or(DEFAULT_THUMBNAIL_WIDTH),
        format,
        quality: parse_env::<u8>(&env, "MEDIACAT_THUMBNAIL_QUALITY")?
            .or_else(|| thumbs_file.and_then(|t| t.quality))
            .map(|q| q.clamp(1, 100))
            .unwrap_or(format.default_quality()),
    };

    let webp_fps = file
        .media
        .as_ref()
        .and_then(|m| m.webp_fps)
        .filter(|fps| *fps > 0.0)
        .unwrap_or(DEFAULT_WEBP_FPS);

    Ok(ResolvedConfig {
        home,
        library,
        input,
        config_file,
        tools,
        sync,
        thumbnails,
        webp_fps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_default_config_without_file() {
        let temp = TempDir::new().unwrap();
        let config = load_from(temp.path(), no_env).unwrap();

        let expected_home = dirs::home_dir().unwrap().join(".mediacat");
        assert_eq!(config.home, expected_home);
        assert_eq!(config.library, expected_home.join("library"));
        assert!(config.config_file.is_none());
        assert!(config.input.is_none());
        assert_eq!(config.sync.batch_size, 500);
        assert!(config.sync.workers >= 1);
        assert_eq!(config.thumbnails.width, 300);
        assert_eq!(config.thumbnails.format, ThumbnailFormat::Webp);
        assert_eq!(config.thumbnails.quality, 70);
        assert_eq!(config.tools.timeout_seconds, 30);
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let state_dir = temp.path().join(".mediacat");
        std::fs::create_dir_all(&state_dir).unwrap();

        let config_path = state_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
paths:
  home: ./
  library: output
  input: input
tools:
  ffprobe: /opt/ffmpeg/bin/ffprobe
sync:
  workers: 1
  batch_size: 50
thumbnails:
  format: jpeg
"#
        )
        .unwrap();

        let parsed = load_config_file(&config_path).unwrap();
        assert_eq!(parsed.version.as_deref(), Some("1.0"));
        assert_eq!(parsed.paths.library.as_deref(), Some("output"));

        let nested = temp.path().join("output").join("2024");
        std::fs::create_dir_all(&nested).unwrap();
        let config = load_from(&nested, no_env).unwrap();

        assert_eq!(config.config_file.as_deref(), Some(config_path.as_path()));
        assert!(config.library.ends_with("output"));
        assert!(config.input.as_ref().unwrap().ends_with("input"));
        assert_eq!(config.tools.ffprobe, PathBuf::from("/opt/ffmpeg/bin/ffprobe"));
        assert_eq!(config.sync.workers, 1);
        assert_eq!(config.sync.batch_size, 50);
        assert_eq!(config.thumbnails.format, ThumbnailFormat::Jpeg);
        assert_eq!(config.thumbnails.quality, 80);
    }

    #[test]
    fn test_env_overrides_file() {
        let temp = TempDir::new().unwrap();
        let vars: HashMap<&str, &str> = [
            ("MEDIACAT_HOME", "/srv/mediacat"),
            ("MEDIACAT_WORKERS", "3"),
            ("MEDIACAT_THUMBNAIL_FORMAT", "gif"),
            ("MEDIACAT_THUMBNAIL_QUALITY", "90"),
        ]
        .into_iter()
        .collect();

        let config = load_from(temp.path(), |k| vars.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.home, PathBuf::from("/srv/mediacat"));
        assert_eq!(config.library, PathBuf::from("/srv/mediacat/library"));
        assert_eq!(config.catalog_path(), PathBuf::from("/srv/mediacat/catalog.sqlite"));
        assert_eq!(config.sync.workers, 3);
        // Unsupported formats fall back to webp
        assert_eq!(config.thumbnails.format, ThumbnailFormat::Webp);
        assert_eq!(config.thumbnails.quality, 90);
    }

    #[test]
    fn test_invalid_env_value() {
        let temp = TempDir::new().unwrap();
        let result = load_from(temp.path(), |k| {
            (k == "MEDIACAT_BATCH_SIZE").then(|| "lots".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_workers() {
        assert_eq!(resolve_workers(Some(1)), 1);
        assert_eq!(resolve_workers(Some(8)), 8);
        assert!(resolve_workers(Some(0)) >= 1);
        assert!(resolve_workers(None) >= 1);
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
