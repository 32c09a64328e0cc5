//! Rendering style exposed by the engine's video views.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Style keys a renderer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleKey {
    VideoScale,
}

/// Values for [`StyleKey::VideoScale`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleValue {
    /// Crop to fill the view.
    Fill,
    /// Letterbox to fit the view.
    Fit,
}

impl fmt::Display for StyleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StyleValue::Fill => f.write_str("fill"),
            StyleValue::Fit => f.write_str("fit"),
        }
    }
}

/// Query and mutate how a video view renders frames.
pub trait RenderStyle {
    fn set_style(&self, key: StyleKey, value: StyleValue);
    fn style(&self, key: StyleKey) -> StyleValue;
}

/// In-memory style table. Unset keys fall back to their defaults.
#[derive(Debug, Default)]
pub struct StyleSettings {
    values: RwLock<HashMap<StyleKey, StyleValue>>,
}

impl StyleSettings {
    pub fn new() -> Self {
        Self::default()
    }

    fn default_for(key: StyleKey) -> StyleValue {
        match key {
            StyleKey::VideoScale => StyleValue::Fit,
        }
    }
}

impl RenderStyle for StyleSettings {
    fn set_style(&self, key: StyleKey, value: StyleValue) {
        tracing::debug!(?key, %value, "Render style updated");
        self.values.write().insert(key, value);
    }

    fn style(&self, key: StyleKey) -> StyleValue {
        self.values
            .read()
            .get(&key)
            .copied()
            .unwrap_or_else(|| Self::default_for(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_scale_defaults_to_fit() {
        let styles = StyleSettings::new();
        assert_eq!(styles.style(StyleKey::VideoScale), StyleValue::Fit);
    }

    #[test]
    fn test_set_style_overrides_default() {
        let styles = StyleSettings::new();
        styles.set_style(StyleKey::VideoScale, StyleValue::Fill);
        assert_eq!(styles.style(StyleKey::VideoScale), StyleValue::Fill);
    }
}
