//! Media classification and scan filtering.

use std::collections::HashSet;

use crate::config::settings::ScanConfig;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp", "gif", "svg"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "ogg", "mov", "mkv", "flv", "avi"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "flac", "m4a"];

/// Every extension accepted by default (`ogg` appears once).
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "bmp", "gif", "svg", "mp4", "webm", "ogg", "mov", "mkv", "flv",
    "avi", "mp3", "wav", "flac", "m4a",
];

/// Broad media category of a file, derived from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

impl MediaKind {
    /// Classifies a file name. `ogg` is treated as video, as browsers
    /// play it in a video element.
    pub fn from_name(name: &str) -> Option<Self> {
        let ext = extension_lower(name)?;
        let ext = ext.as_str();
        if IMAGE_EXTENSIONS.contains(&ext) {
            Some(Self::Image)
        } else if VIDEO_EXTENSIONS.contains(&ext) {
            Some(Self::Video)
        } else if AUDIO_EXTENSIONS.contains(&ext) {
            Some(Self::Audio)
        } else {
            None
        }
    }
}

/// Decides which listed entries the scanner mirrors.
#[derive(Debug, Clone)]
pub struct MediaFilter {
    extensions: HashSet<String>,
    hidden_prefix: String,
}

impl MediaFilter {
    pub fn new<I, S>(extensions: I, hidden_prefix: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
                .collect(),
            hidden_prefix: hidden_prefix.into(),
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(&config.media_extensions, config.hidden_prefix.clone())
    }

    /// Returns `true` if a file with this name is mirrored.
    pub fn accepts_file(&self, name: &str) -> bool {
        extension_lower(name).is_some_and(|ext| self.extensions.contains(&ext))
    }

    /// Returns `true` unless the directory carries the hidden prefix.
    pub fn accepts_dir(&self, name: &str) -> bool {
        self.hidden_prefix.is_empty() || !name.starts_with(&self.hidden_prefix)
    }
}

impl Default for MediaFilter {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSIONS, ".")
    }
}

/// Lower-cased text after the last `.`, or `None` when there is no extension.
fn extension_lower(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}
