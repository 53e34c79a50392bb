//! Viewport classification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Widest viewport, in CSS pixels, treated as mobile.
pub const MOBILE_MAX_WIDTH: u32 = 640;

/// Widest viewport treated as tablet.
pub const TABLET_MAX_WIDTH: u32 = 768;

/// Widest viewport treated as small desktop.
pub const SMALL_DESKTOP_MAX_WIDTH: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewportClass {
    Mobile,
    Tablet,
    SmallDesktop,
    LargeDesktop,
}

impl ViewportClass {
    /// Classify a viewport width. Boundaries are inclusive.
    #[must_use]
    pub const fn from_width(width: u32) -> Self {
        if width <= MOBILE_MAX_WIDTH {
            ViewportClass::Mobile
        } else if width <= TABLET_MAX_WIDTH {
            ViewportClass::Tablet
        } else if width <= SMALL_DESKTOP_MAX_WIDTH {
            ViewportClass::SmallDesktop
        } else {
            ViewportClass::LargeDesktop
        }
    }

    /// Cards per page outside pinned mode.
    #[must_use]
    pub const fn page_capacity(&self) -> usize {
        match self {
            ViewportClass::Mobile => 6,
            ViewportClass::Tablet | ViewportClass::SmallDesktop | ViewportClass::LargeDesktop => 12,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ViewportClass::Mobile => "mobile",
            ViewportClass::Tablet => "tablet",
            ViewportClass::SmallDesktop => "small-desktop",
            ViewportClass::LargeDesktop => "large-desktop",
        }
    }
}

impl fmt::Display for ViewportClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
