//! Shared, read-only state for one process.

use std::path::PathBuf;
use std::sync::Arc;

use crate::adapters::{FfmpegToolkit, MediaProbe};
use crate::config::ResolvedConfig;
use crate::media::{MediaSettings, ThumbnailCache};

/// Built once at startup and handed to every worker task
#[derive(Clone)]
pub struct MediaContext {
    pub media: MediaSettings,
    pub thumbnails: ThumbnailCache,
    /// Root that workflow input files are resolved against
    pub input_root: Option<PathBuf>,
    pub probe: Arc<dyn MediaProbe>,
}

impl MediaContext {
    /// Discover the media tools and build the context
    pub async fn from_config(config: &ResolvedConfig) -> Self {
        let toolkit = FfmpegToolkit::discover(
            &config.tools.ffprobe,
            &config.tools.ffmpeg,
            config.tools.timeout(),
        )
        .await;
        Self::with_probe(config, Arc::new(toolkit))
    }

    /// Context around an explicit probe
    pub fn with_probe(config: &ResolvedConfig, probe: Arc<dyn MediaProbe>) -> Self {
        Self {
            media: MediaSettings {
                webp_fps: config.webp_fps,
            },
            thumbnails: ThumbnailCache::new(config.thumbnail_dir(), config.thumbnails),
            input_root: config.input.clone(),
            probe,
        }
    }
}

impl std::fmt::Debug for MediaContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaContext")
            .field("media", &self.media)
            .field("thumbnails", &self.thumbnails)
            .field("input_root", &self.input_root)
            .field("probe", &self.probe.name())
            .finish()
    }
}
