//! UI adapter that records every command.

use common::types::{CardId, MediaKind};
use room_client::presentation::LayoutUpdate;
use room_client::ui::{CardSpec, MediaSource, MediaTarget, UiAdapter, UiCommand};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct RecordingUi {
    commands: Mutex<Vec<UiCommand>>,
}

impl RecordingUi {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn commands(&self) -> Vec<UiCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.commands.lock().unwrap().clear();
    }

    pub fn created_cards(&self) -> Vec<CardSpec> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                UiCommand::CreateCard(spec) => Some(spec),
                _ => None,
            })
            .collect()
    }

    /// Card created for `peer_id`, if any.
    pub fn card_for(&self, peer_id: &str) -> Option<CardSpec> {
        self.created_cards()
            .into_iter()
            .find(|spec| spec.peer_id.as_ref().is_some_and(|p| p.as_str() == peer_id))
    }

    pub fn local_card(&self) -> Option<CardSpec> {
        self.created_cards().into_iter().find(|spec| spec.is_local)
    }

    pub fn removed_cards(&self) -> Vec<CardId> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                UiCommand::RemoveCard(card) => Some(card),
                _ => None,
            })
            .collect()
    }

    pub fn attachments(&self) -> Vec<(MediaTarget, MediaSource, MediaKind)> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                UiCommand::AttachMedia {
                    target,
                    source,
                    kind,
                } => Some((target, source, kind)),
                _ => None,
            })
            .collect()
    }

    pub fn detachments(&self) -> Vec<MediaSource> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                UiCommand::DetachMedia { source } => Some(source),
                _ => None,
            })
            .collect()
    }

    pub fn notifications(&self) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                UiCommand::Notify(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn last_layout(&self) -> Option<LayoutUpdate> {
        self.commands().into_iter().rev().find_map(|c| match c {
            UiCommand::ApplyLayout(update) => Some(update),
            _ => None,
        })
    }
}

impl UiAdapter for RecordingUi {
    fn apply(&self, command: UiCommand) {
        self.commands.lock().unwrap().push(command);
    }
}
