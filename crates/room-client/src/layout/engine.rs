//! Pure layout computation.
//!
//! [`compute_layout`] maps a participant count, the pin flag, a viewport
//! class and a requested page to a [`LayoutDescriptor`]. It holds no state;
//! the page index lives in [`super::Pager`].

use super::viewport::ViewportClass;
use std::ops::Range;

/// Grid classes for large desktops, indexed by participant count - 1.
const EXACT_GRID_CLASSES: [&str; 16] = [
    "layout-1",
    "layout-2",
    "layout-3",
    "layout-4",
    "layout-5",
    "layout-6",
    "layout-7",
    "layout-8",
    "layout-9",
    "layout-10",
    "layout-11",
    "layout-12",
    "layout-13",
    "layout-14",
    "layout-15",
    "layout-16",
];

/// Grid arrangement outside pinned mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GridLayout {
    /// One cell per participant, `1..=16`.
    Exact(u8),
    /// Fixed grid plus scrolling overflow (mobile, tablet, small desktop).
    FivePlus,
    /// Dense grid for more than 16 on large desktops.
    SeventeenPlus,
}

impl GridLayout {
    #[must_use]
    pub fn class_name(&self) -> &'static str {
        match self {
            GridLayout::Exact(n) => EXACT_GRID_CLASSES
                .get(usize::from(*n).saturating_sub(1))
                .copied()
                .unwrap_or("layout-17plus"),
            GridLayout::FivePlus => "layout-5plus",
            GridLayout::SeventeenPlus => "layout-17plus",
        }
    }
}

/// Arrangement when one card is pinned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinnedLayout {
    /// Large pinned card with a side strip.
    Pinned,
    /// Pinned card stacked above a horizontal strip.
    PinnedMobile,
}

impl PinnedLayout {
    #[must_use]
    pub const fn class_name(&self) -> &'static str {
        match self {
            PinnedLayout::Pinned => "layout-pinned",
            PinnedLayout::PinnedMobile => "layout-pinned-mobile",
        }
    }
}

/// Pagination controls state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page_index: usize,
    pub total_pages: usize,
    pub page_capacity: usize,
    pub has_previous: bool,
    pub has_next: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutDescriptor {
    pub viewport: ViewportClass,
    /// `None` in pinned mode and for an empty room.
    pub grid: Option<GridLayout>,
    pub pinned: Option<PinnedLayout>,
    /// Cards laid out in the grid or strip (excludes the pinned card).
    pub effective_count: usize,
    /// Indices into the non-pinned cards that are shown.
    pub visible: Range<usize>,
    /// Present only when `effective_count` exceeds the page capacity.
    pub pagination: Option<Pagination>,
    /// Mobile overflow strip instead of a fixed grid.
    pub scroll_strip: bool,
}

impl LayoutDescriptor {
    /// The container class to apply, if any.
    #[must_use]
    pub fn class_name(&self) -> Option<&'static str> {
        match (self.pinned, self.grid) {
            (Some(pinned), _) => Some(pinned.class_name()),
            (None, Some(grid)) => Some(grid.class_name()),
            (None, None) => None,
        }
    }
}

/// Cards laid out outside the pinned slot.
#[must_use]
pub const fn effective_count(participant_count: usize, pinned: bool) -> usize {
    if pinned {
        participant_count.saturating_sub(1)
    } else {
        participant_count
    }
}

/// Pages needed for `count` cards; 0 for an empty grid.
#[must_use]
pub const fn total_pages(count: usize, capacity: usize) -> usize {
    if count == 0 || capacity == 0 {
        0
    } else {
        count.div_ceil(capacity)
    }
}

/// Grid class for `count` unpinned cards.
#[must_use]
pub fn grid_bucket(count: usize, viewport: ViewportClass) -> Option<GridLayout> {
    if count == 0 {
        return None;
    }
    let exact = |n: usize| GridLayout::Exact(u8::try_from(n).unwrap_or(u8::MAX));
    let layout = match viewport {
        ViewportClass::Mobile | ViewportClass::Tablet => match count {
            1 | 2 => exact(count),
            3 | 4 => GridLayout::Exact(4),
            _ => GridLayout::FivePlus,
        },
        ViewportClass::SmallDesktop => match count {
            1..=4 => exact(count),
            _ => GridLayout::FivePlus,
        },
        ViewportClass::LargeDesktop => match count {
            1..=16 => exact(count),
            _ => GridLayout::SeventeenPlus,
        },
    };
    Some(layout)
}

/// Compute the presentation layout.
///
/// `requested_page` is clamped to the last page.
#[must_use]
pub fn compute_layout(
    participant_count: usize,
    pinned: bool,
    viewport: ViewportClass,
    requested_page: usize,
) -> LayoutDescriptor {
    let effective = effective_count(participant_count, pinned);
    let capacity = viewport.page_capacity();

    let (pagination, visible) = if effective > capacity {
        let pages = total_pages(effective, capacity);
        let page_index = requested_page.min(pages.saturating_sub(1));
        let start = page_index * capacity;
        let end = (start + capacity).min(effective);
        (
            Some(Pagination {
                page_index,
                total_pages: pages,
                page_capacity: capacity,
                has_previous: page_index > 0,
                has_next: page_index + 1 < pages,
            }),
            start..end,
        )
    } else {
        (None, 0..effective)
    };

    let pinned_layout = pinned.then_some(if viewport == ViewportClass::Mobile {
        PinnedLayout::PinnedMobile
    } else {
        PinnedLayout::Pinned
    });

    LayoutDescriptor {
        viewport,
        grid: if pinned {
            None
        } else {
            grid_bucket(effective, viewport)
        },
        pinned: pinned_layout,
        effective_count: effective,
        visible,
        pagination,
        scroll_strip: !pinned && viewport == ViewportClass::Mobile && effective > 4,
    }
}
