//! Page index tracking across relayouts.

use super::engine::{compute_layout, effective_count, total_pages, LayoutDescriptor};
use super::viewport::ViewportClass;

/// Holds the current page and resets it when the roster shape changes.
///
/// The page index goes back to 0 whenever the viewport class or the total
/// number of pages differs from the previous layout.
#[derive(Debug, Clone, Default)]
pub struct Pager {
    page_index: usize,
    last_shape: Option<(ViewportClass, usize)>,
}

impl Pager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn page_index(&self) -> usize {
        self.page_index
    }

    /// Lay out the current page.
    pub fn layout(
        &mut self,
        participant_count: usize,
        pinned: bool,
        viewport: ViewportClass,
    ) -> LayoutDescriptor {
        let pages = Self::pages(participant_count, pinned, viewport);
        if self
            .last_shape
            .is_some_and(|(last_viewport, last_pages)| last_viewport != viewport || last_pages != pages)
        {
            self.page_index = 0;
        }
        self.last_shape = Some((viewport, pages));

        let descriptor = compute_layout(participant_count, pinned, viewport, self.page_index);
        self.page_index = descriptor.pagination.map_or(0, |p| p.page_index);
        descriptor
    }

    /// Advance one page, stopping at the last.
    pub fn next(
        &mut self,
        participant_count: usize,
        pinned: bool,
        viewport: ViewportClass,
    ) -> LayoutDescriptor {
        let pages = Self::pages(participant_count, pinned, viewport);
        if self.page_index + 1 < pages {
            self.page_index += 1;
        }
        self.layout(participant_count, pinned, viewport)
    }

    /// Go back one page, stopping at the first.
    pub fn previous(
        &mut self,
        participant_count: usize,
        pinned: bool,
        viewport: ViewportClass,
    ) -> LayoutDescriptor {
        self.page_index = self.page_index.saturating_sub(1);
        self.layout(participant_count, pinned, viewport)
    }

    fn pages(participant_count: usize, pinned: bool, viewport: ViewportClass) -> usize {
        total_pages(
            effective_count(participant_count, pinned),
            viewport.page_capacity(),
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_next_and_previous_saturate() {
        let mut pager = Pager::new();
        let vp = ViewportClass::LargeDesktop;

        pager.layout(30, false, vp);
        assert_eq!(pager.next(30, false, vp).visible, 12..24);
        assert_eq!(pager.next(30, false, vp).visible, 24..30);
        assert_eq!(pager.next(30, false, vp).visible, 24..30);
        assert_eq!(pager.page_index(), 2);

        pager.previous(30, false, vp);
        pager.previous(30, false, vp);
        let first = pager.previous(30, false, vp);
        assert_eq!(pager.page_index(), 0);
        assert!(!first.pagination.unwrap().has_previous);
    }

    #[test]
    fn test_viewport_change_resets_page() {
        let mut pager = Pager::new();
        pager.layout(15, false, ViewportClass::Mobile);
        pager.next(15, false, ViewportClass::Mobile);
        pager.next(15, false, ViewportClass::Mobile);
        assert_eq!(pager.page_index(), 2);

        let layout = pager.layout(15, false, ViewportClass::LargeDesktop);
        assert_eq!(pager.page_index(), 0);
        assert_eq!(layout.visible, 0..12);
    }

    #[test]
    fn test_total_pages_change_resets_page() {
        let mut pager = Pager::new();
        let vp = ViewportClass::LargeDesktop;
        pager.layout(26, false, vp);
        pager.next(26, false, vp);
        assert_eq!(pager.page_index(), 1);

        // Same page count, page kept.
        pager.layout(25, false, vp);
        assert_eq!(pager.page_index(), 1);

        // Fewer pages, page reset.
        let layout = pager.layout(20, false, vp);
        assert_eq!(pager.page_index(), 0);
        assert_eq!(layout.visible, 0..12);
    }

    #[test]
    fn test_no_pagination_keeps_index_zero() {
        let mut pager = Pager::new();
        let layout = pager.next(4, false, ViewportClass::Tablet);
        assert_eq!(layout.pagination, None);
        assert_eq!(pager.page_index(), 0);
    }
}
