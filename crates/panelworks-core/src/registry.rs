//! Dual-indexed panel registry.
//!
//! Entries live in an arena addressed by generational [`EntryKey`]s. Two
//! lookup tables, by message id and by panel id, point into the arena.
//! Every mutation keeps them in lockstep: an entry is reachable from both
//! tables or from neither.

use std::collections::HashMap;

use thiserror::Error;

use crate::timing::RenderTiming;
use crate::types::{Document, MessageHandle, MessageId, PanelId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("panel {0} is already registered")]
    DuplicatePanel(PanelId),
    #[error("message {0} already backs a panel")]
    DuplicateMessage(MessageId),
}

/// Returned by [`Registry::attach`] when the entry cannot be inserted.
/// Hands the panel back so the caller can finalize it.
#[derive(Debug)]
pub struct Rejected<P> {
    pub error: RegistryError,
    pub panel: P,
}

/// Stable handle to an arena slot. Stale keys (entry detached, slot
/// reused) resolve to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryKey {
    index: u32,
    generation: u32,
}

/// Registry record: a panel bundled with its message and render state.
#[derive(Debug)]
pub struct Entry<P> {
    pub panel_id: PanelId,
    pub panel: P,
    pub message: MessageHandle,
    pub last_rendered: Option<Document>,
    pub timing: RenderTiming,
}

#[derive(Debug)]
struct Slot<P> {
    generation: u32,
    entry: Option<Entry<P>>,
}

#[derive(Debug)]
pub struct Registry<P> {
    slots: Vec<Slot<P>>,
    free: Vec<u32>,
    by_message: HashMap<MessageId, EntryKey>,
    by_panel: HashMap<PanelId, EntryKey>,
}

impl<P> Registry<P> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            by_message: HashMap::new(),
            by_panel: HashMap::new(),
        }
    }

    /// Insert a panel whose `initial` document was committed at `now_ms`.
    ///
    /// The panel must already carry its assigned identity. Duplicate panel
    /// or message ids are rejected and nothing is inserted.
    pub fn attach(
        &mut self,
        panel_id: PanelId,
        panel: P,
        message: MessageHandle,
        initial: Document,
        now_ms: u64,
    ) -> Result<EntryKey, Rejected<P>> {
        if self.by_panel.contains_key(&panel_id) {
            return Err(Rejected {
                error: RegistryError::DuplicatePanel(panel_id),
                panel,
            });
        }
        if self.by_message.contains_key(message.id()) {
            return Err(Rejected {
                error: RegistryError::DuplicateMessage(message.id().clone()),
                panel,
            });
        }

        let message_id = message.id().clone();
        let entry = Entry {
            panel_id,
            panel,
            message,
            last_rendered: Some(initial),
            timing: RenderTiming::committed_at(now_ms),
        };

        let key = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entry = Some(entry);
                EntryKey {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                EntryKey {
                    index,
                    generation: 0,
                }
            }
        };

        self.by_message.insert(message_id, key);
        self.by_panel.insert(panel_id, key);
        Ok(key)
    }

    pub fn key_by_message(&self, id: &MessageId) -> Option<EntryKey> {
        self.by_message.get(id).copied()
    }

    pub fn key_by_panel(&self, id: PanelId) -> Option<EntryKey> {
        self.by_panel.get(&id).copied()
    }

    pub fn get(&self, key: EntryKey) -> Option<&Entry<P>> {
        self.slots
            .get(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    pub fn get_mut(&mut self, key: EntryKey) -> Option<&mut Entry<P>> {
        self.slots
            .get_mut(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.entry.as_mut())
    }

    pub fn lookup_by_message(&self, id: &MessageId) -> Option<&Entry<P>> {
        self.key_by_message(id).and_then(|key| self.get(key))
    }

    pub fn lookup_by_panel(&self, id: PanelId) -> Option<&Entry<P>> {
        self.key_by_panel(id).and_then(|key| self.get(key))
    }

    pub fn lookup_by_panel_mut(&mut self, id: PanelId) -> Option<&mut Entry<P>> {
        let key = self.key_by_panel(id)?;
        self.get_mut(key)
    }

    /// Remove the entry from both indices and return it. Idempotent:
    /// detaching an absent or stale key returns `None`.
    pub fn detach(&mut self, key: EntryKey) -> Option<Entry<P>> {
        let slot = self
            .slots
            .get_mut(key.index as usize)
            .filter(|slot| slot.generation == key.generation)?;
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index);

        self.by_message.remove(entry.message.id());
        self.by_panel.remove(&entry.panel_id);
        Some(entry)
    }

    pub fn detach_panel(&mut self, id: PanelId) -> Option<Entry<P>> {
        let key = self.key_by_panel(id)?;
        self.detach(key)
    }

    pub fn detach_message(&mut self, id: &MessageId) -> Option<Entry<P>> {
        let key = self.key_by_message(id)?;
        self.detach(key)
    }

    /// Registered panel ids in ascending order.
    pub fn panel_ids(&self) -> Vec<PanelId> {
        let mut ids: Vec<PanelId> = self.by_panel.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.by_panel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_panel.is_empty()
    }

    /// Detach every entry, in panel id order.
    pub fn drain(&mut self) -> Vec<Entry<P>> {
        self.panel_ids()
            .into_iter()
            .filter_map(|id| self.detach_panel(id))
            .collect()
    }

    /// Both indices agree with each other and with the arena.
    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        let live = self.slots.iter().filter(|s| s.entry.is_some()).count();
        live == self.by_panel.len()
            && live == self.by_message.len()
            && self.by_panel.iter().all(|(panel_id, key)| {
                self.get(*key).is_some_and(|entry| {
                    entry.panel_id == *panel_id
                        && self.by_message.get(entry.message.id()) == Some(key)
                })
            })
    }
}

impl<P> Default for Registry<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(n: u32) -> MessageHandle {
        MessageHandle::new("general", format!("m{n}"))
    }

    fn doc(title: &str) -> Document {
        Document::new().title(title)
    }

    #[test]
    fn attach_indexes_both_ways() {
        let mut reg = Registry::new();
        let key = reg
            .attach(PanelId(1), "poll", handle(10), doc("a"), 0)
            .unwrap();

        let by_msg = reg.lookup_by_message(&MessageId::from("m10")).unwrap();
        let by_panel = reg.lookup_by_panel(PanelId(1)).unwrap();
        assert_eq!(by_msg.panel_id, PanelId(1));
        assert_eq!(by_panel.message, handle(10));
        assert_eq!(reg.key_by_message(&MessageId::from("m10")), Some(key));
        assert_eq!(reg.key_by_panel(PanelId(1)), Some(key));
        assert_eq!(by_panel.timing, RenderTiming::committed_at(0));
        assert!(reg.is_consistent());
    }

    #[test]
    fn detach_removes_from_both_indices() {
        let mut reg = Registry::new();
        let key = reg.attach(PanelId(1), (), handle(10), doc("a"), 0).unwrap();

        let entry = reg.detach(key).expect("entry should be detached");
        assert_eq!(entry.panel_id, PanelId(1));
        assert!(reg.lookup_by_message(&MessageId::from("m10")).is_none());
        assert!(reg.lookup_by_panel(PanelId(1)).is_none());
        assert!(reg.is_empty());
        assert!(reg.is_consistent());
    }

    #[test]
    fn detach_is_idempotent() {
        let mut reg = Registry::new();
        let key = reg.attach(PanelId(1), (), handle(10), doc("a"), 0).unwrap();
        assert!(reg.detach(key).is_some());
        assert!(reg.detach(key).is_none());
        assert!(reg.detach_panel(PanelId(1)).is_none());
        assert!(reg.detach_message(&MessageId::from("m10")).is_none());
    }

    #[test]
    fn stale_key_does_not_resolve_reused_slot() {
        let mut reg = Registry::new();
        let old = reg.attach(PanelId(1), "old", handle(1), doc("a"), 0).unwrap();
        reg.detach(old);
        let new = reg.attach(PanelId(2), "new", handle(2), doc("b"), 0).unwrap();

        assert_ne!(old, new);
        assert!(reg.get(old).is_none());
        assert!(reg.detach(old).is_none());
        assert_eq!(reg.get(new).map(|e| e.panel), Some("new"));
    }

    #[test]
    fn duplicate_panel_rejected_and_returned() {
        let mut reg = Registry::new();
        reg.attach(PanelId(1), "first", handle(1), doc("a"), 0).unwrap();
        let rejected = reg
            .attach(PanelId(1), "second", handle(2), doc("b"), 0)
            .unwrap_err();
        assert_eq!(rejected.error, RegistryError::DuplicatePanel(PanelId(1)));
        assert_eq!(rejected.panel, "second");
        assert_eq!(reg.len(), 1);
        assert!(reg.is_consistent());
    }

    #[test]
    fn duplicate_message_rejected() {
        let mut reg = Registry::new();
        reg.attach(PanelId(1), (), handle(1), doc("a"), 0).unwrap();
        let rejected = reg.attach(PanelId(2), (), handle(1), doc("b"), 0).unwrap_err();
        assert_eq!(
            rejected.error,
            RegistryError::DuplicateMessage(MessageId::from("m1"))
        );
        assert!(reg.lookup_by_panel(PanelId(2)).is_none());
    }

    #[test]
    fn mutations_visible_through_either_index() {
        let mut reg = Registry::new();
        reg.attach(PanelId(1), (), handle(1), doc("a"), 0).unwrap();
        reg.lookup_by_panel_mut(PanelId(1)).unwrap().timing.awaiting_render = true;
        assert!(
            reg.lookup_by_message(&MessageId::from("m1"))
                .unwrap()
                .timing
                .awaiting_render
        );
    }

    #[test]
    fn drain_empties_in_id_order() {
        let mut reg = Registry::new();
        reg.attach(PanelId(3), (), handle(3), doc("c"), 0).unwrap();
        reg.attach(PanelId(1), (), handle(1), doc("a"), 0).unwrap();
        let drained: Vec<PanelId> = reg.drain().into_iter().map(|e| e.panel_id).collect();
        assert_eq!(drained, vec![PanelId(1), PanelId(3)]);
        assert!(reg.is_empty());
        assert!(reg.is_consistent());
    }
}
