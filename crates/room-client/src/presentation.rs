//! Card ordering, pinning and paging state.
//!
//! Owned by the session actor. Every mutation is followed by
//! [`Presentation::relayout`], whose [`LayoutUpdate`] goes to the UI.

use crate::errors::ClientError;
use crate::layout::{LayoutDescriptor, Pager, ViewportClass};
use common::types::CardId;
use tracing::debug;

/// Cards shown on mobile before the first card is pinned automatically.
pub const AUTO_PIN_THRESHOLD: usize = 4;

/// Layout plus the card ids it applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutUpdate {
    pub descriptor: LayoutDescriptor,
    pub pinned: Option<CardId>,
    /// Non-pinned cards on the current page, in display order.
    pub visible_cards: Vec<CardId>,
}

/// Result of a pin toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinChange {
    Pinned(CardId),
    Unpinned(CardId),
}

#[derive(Debug)]
pub struct Presentation {
    cards: Vec<CardId>,
    pinned: Option<CardId>,
    viewport: ViewportClass,
    pager: Pager,
    auto_pin_mobile: bool,
}

impl Presentation {
    #[must_use]
    pub fn new(viewport: ViewportClass, auto_pin_mobile: bool) -> Self {
        Self {
            cards: Vec::new(),
            pinned: None,
            viewport,
            pager: Pager::new(),
            auto_pin_mobile,
        }
    }

    #[must_use]
    pub fn viewport(&self) -> ViewportClass {
        self.viewport
    }

    #[must_use]
    pub fn pinned(&self) -> Option<CardId> {
        self.pinned
    }

    #[must_use]
    pub fn card_count(&self) -> usize {
        self.cards.len()
    }

    #[must_use]
    pub fn contains(&self, card: CardId) -> bool {
        self.cards.contains(&card)
    }

    /// Append a card. Returns false if it was already present.
    pub fn add_card(&mut self, card: CardId) -> bool {
        if self.contains(card) {
            return false;
        }
        self.cards.push(card);
        true
    }

    /// Remove a card, clearing the pin if it pointed at it.
    pub fn remove_card(&mut self, card: CardId) -> bool {
        let before = self.cards.len();
        self.cards.retain(|c| *c != card);
        if self.pinned == Some(card) {
            self.pinned = None;
        }
        self.cards.len() != before
    }

    /// Pin `card`, or unpin it if it is already pinned.
    ///
    /// # Errors
    ///
    /// `CardNotFound` if the card is not shown.
    pub fn toggle_pin(&mut self, card: CardId) -> Result<PinChange, ClientError> {
        if !self.contains(card) {
            return Err(ClientError::CardNotFound(card));
        }
        if self.pinned == Some(card) {
            self.pinned = None;
            Ok(PinChange::Unpinned(card))
        } else {
            self.pinned = Some(card);
            Ok(PinChange::Pinned(card))
        }
    }

    /// Clear the pin. Returns the card that was pinned.
    pub fn unpin(&mut self) -> Option<CardId> {
        self.pinned.take()
    }

    /// Drop every card and return to the first page. Returns the cards in
    /// presentation order.
    pub fn clear(&mut self) -> Vec<CardId> {
        self.pinned = None;
        self.pager = Pager::new();
        std::mem::take(&mut self.cards)
    }

    /// Returns true if the class changed.
    pub fn set_viewport(&mut self, viewport: ViewportClass) -> bool {
        if self.viewport == viewport {
            return false;
        }
        debug!(
            target: "rc.presentation",
            from = %self.viewport,
            to = %viewport,
            "Viewport class changed"
        );
        self.viewport = viewport;
        true
    }

    /// Recompute the layout for the current page.
    pub fn relayout(&mut self) -> LayoutUpdate {
        self.apply_auto_pin();
        let descriptor = self
            .pager
            .layout(self.cards.len(), self.pinned.is_some(), self.viewport);
        self.update(descriptor)
    }

    pub fn next_page(&mut self) -> LayoutUpdate {
        self.apply_auto_pin();
        let descriptor = self
            .pager
            .next(self.cards.len(), self.pinned.is_some(), self.viewport);
        self.update(descriptor)
    }

    pub fn previous_page(&mut self) -> LayoutUpdate {
        self.apply_auto_pin();
        let descriptor = self
            .pager
            .previous(self.cards.len(), self.pinned.is_some(), self.viewport);
        self.update(descriptor)
    }

    fn apply_auto_pin(&mut self) {
        if !self.auto_pin_mobile
            || self.viewport != ViewportClass::Mobile
            || self.pinned.is_some()
            || self.cards.len() <= AUTO_PIN_THRESHOLD
        {
            return;
        }
        if let Some(first) = self.cards.first().copied() {
            debug!(target: "rc.presentation", card = %first, "Auto-pinning first card");
            self.pinned = Some(first);
        }
    }

    fn update(&self, descriptor: LayoutDescriptor) -> LayoutUpdate {
        let visible_cards = self
            .cards
            .iter()
            .filter(|c| Some(**c) != self.pinned)
            .skip(descriptor.visible.start)
            .take(descriptor.visible.len())
            .copied()
            .collect();
        LayoutUpdate {
            descriptor,
            pinned: self.pinned,
            visible_cards,
        }
    }
}
