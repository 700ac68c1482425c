//! Source descriptors and viewport-dependent source selection.
//!
//! Each descriptor carries a primary URL and an optional alternate (usually a
//! smaller rendition for phones). Selection is a pure function of the
//! descriptors, the viewport width and the alternate threshold.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Container formats a source may use.
pub const VALID_TYPES: &[&str] = &["mp4", "webm", "ogg"];

/// Default viewport width (px) at or below which alternates are preferred.
pub const DEFAULT_ALTERNATE_MAX_WIDTH: u32 = 667;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("source has an empty primary URL")]
    EmptyPrimary,

    #[error("unsupported file type '{0}', supported types: mp4, webm, ogg")]
    UnsupportedType(String),

    #[error("primary and alternate must be the same type of video file ({primary} vs {alternate})")]
    MismatchedTypes { primary: String, alternate: String },
}

/// One candidate source.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub primary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate: Option<String>,
    /// MIME type; derived from the primary URL when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

impl SourceDescriptor {
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            alternate: None,
            media_type: None,
        }
    }

    pub fn with_alternate(mut self, alternate: impl Into<String>) -> Self {
        self.alternate = Some(alternate.into());
        self
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    /// Declared MIME type, or `video/<ext>` of the primary URL.
    pub fn media_type(&self) -> Option<String> {
        self.media_type.clone().or_else(|| media_type_for(&self.primary))
    }

    /// Alternate URL if present and non-empty.
    pub fn alternate(&self) -> Option<&str> {
        self.alternate.as_deref().filter(|s| !s.is_empty())
    }

    /// Check URL presence, supported types, and that primary and alternate
    /// share a type.
    pub fn validate(&self) -> Result<(), SourceError> {
        if self.primary.trim().is_empty() {
            return Err(SourceError::EmptyPrimary);
        }
        let primary = checked_type(&self.primary)?;
        if let Some(alternate) = self.alternate() {
            let alt = checked_type(alternate)?;
            if alt != primary {
                return Err(SourceError::MismatchedTypes { primary, alternate: alt });
            }
        }
        Ok(())
    }
}

/// Source chosen for the current viewport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectedSource {
    pub url: String,
    pub media_type: Option<String>,
    /// The alternate URL was chosen.
    pub is_alternate: bool,
}

/// Pick, per descriptor, the alternate when `viewport_width <= threshold` and
/// the alternate is non-empty, else the primary.
pub fn select_sources(
    descriptors: &[SourceDescriptor],
    viewport_width: u32,
    threshold: u32,
) -> Vec<SelectedSource> {
    let narrow = viewport_width <= threshold;
    descriptors
        .iter()
        .map(|d| match d.alternate().filter(|_| narrow) {
            Some(alt) => SelectedSource {
                url: alt.to_string(),
                media_type: d.media_type(),
                is_alternate: true,
            },
            None => SelectedSource {
                url: d.primary.clone(),
                media_type: d.media_type(),
                is_alternate: false,
            },
        })
        .collect()
}

/// Lowercased file extension of a URL, ignoring query and fragment.
pub fn file_type(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    Path::new(path)
        .extension()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
}

/// `video/<ext>` for a URL with an extension.
pub fn media_type_for(url: &str) -> Option<String> {
    file_type(url).map(|ext| format!("video/{}", ext))
}

fn checked_type(url: &str) -> Result<String, SourceError> {
    let ext = file_type(url).unwrap_or_default();
    if VALID_TYPES.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(SourceError::UnsupportedType(ext))
    }
}
