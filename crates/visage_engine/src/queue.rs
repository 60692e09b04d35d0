//! Event Queue: in-memory store of submitted events, in push order.

use visage_core::{Channel, Event, Id, Stage};

#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    events: Vec<Event>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn get(&self, id: Id) -> Option<&Event> {
        self.events.iter().find(|e| e.id == id)
    }

    pub(crate) fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Event> {
        self.events.iter_mut()
    }

    pub(crate) fn retain(&mut self, keep: impl FnMut(&Event) -> bool) {
        self.events.retain(keep);
    }

    /// Remove every event, returning them.
    pub(crate) fn drain(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn stage_mut(&mut self, event: Id, channel: Channel, stage: Id) -> Option<&mut Stage> {
        self.events
            .iter_mut()
            .find(|e| e.id == event)?
            .channels
            .get_mut(&channel)?
            .iter_mut()
            .find(|s| s.id == stage)
    }
}
