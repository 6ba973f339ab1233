use core_types::Preferences;

/// Base icon edge length in density-independent pixels.
pub const ICON_DP: u32 = 24;

/// Placeholder glyphs shown instead of an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Icon {
    BrokenImage,
    /// Embedded or inline image the user has not chosen to show.
    HiddenEmbedded,
    HiddenRemote,
    /// Attachment exists but has not been downloaded.
    Unavailable,
    Loading,
    Offline,
}

impl Icon {
    /// Themed glyph name for the host toolkit.
    pub fn glyph(self) -> &'static str {
        match self {
            Icon::BrokenImage => "broken_image",
            Icon::HiddenEmbedded => "photo",
            Icon::HiddenRemote => "image",
            Icon::Unavailable => "photo_library",
            Icon::Loading => "hourglass_empty",
            Icon::Offline => "cloud_off",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayMetrics {
    /// Physical pixels per density-independent pixel.
    pub density: f32,
    pub width_px: u32,
}

impl Default for DisplayMetrics {
    fn default() -> Self {
        Self {
            density: 1.0,
            width_px: 1080,
        }
    }
}

impl DisplayMetrics {
    pub fn dp(&self, dp: u32) -> u32 {
        (dp as f32 * self.density).round().max(1.0) as u32
    }
}

pub fn icon_size_px(metrics: &DisplayMetrics, prefs: &dyn Preferences) -> u32 {
    let zoom = core_types::zoom(prefs).clamp(0, 8) as u32;
    metrics.dp((zoom + 1) * ICON_DP)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{MemoryPreferences, keys};

    #[test]
    fn size_follows_zoom_and_density() {
        let mut prefs = MemoryPreferences::new();
        let metrics = DisplayMetrics {
            density: 2.0,
            width_px: 720,
        };
        assert_eq!(icon_size_px(&metrics, &prefs), 96);
        prefs.set_bool(keys::COMPACT, true);
        assert_eq!(icon_size_px(&metrics, &prefs), 48);
        prefs.set_int(keys::ZOOM, 2);
        assert_eq!(icon_size_px(&metrics, &prefs), 144);
    }

    #[test]
    fn negative_zoom_is_clamped() {
        let mut prefs = MemoryPreferences::new();
        prefs.set_int(keys::ZOOM, -3);
        assert_eq!(icon_size_px(&DisplayMetrics::default(), &prefs), ICON_DP);
    }
}
