//! Face table and identifier allocator.
//!
//! A fixed-size slot array indexed directly by Face-ID, plus two secondary
//! indices: handle to id (reverse lookup for poll events) and
//! (peer address, protocol) to id (dedupe of outbound faces).

use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::os::fd::RawFd;

use super::slot::{Face, FaceSlot};
use crate::core::constants::RESERVED_FACE_IDS;
use crate::core::{FaceError, FaceId, FaceResult, Protocol};

/// Authoritative mapping from Face-ID to face.
#[derive(Debug)]
pub struct FaceTable {
    slots: Vec<FaceSlot>,
    by_handle: HashMap<RawFd, FaceId>,
    by_peer: HashMap<(SocketAddr, Protocol), FaceId>,
    free: BTreeSet<u16>,
}

impl FaceTable {
    /// Create a table with `capacity` slots.
    ///
    /// The capacity is raised to leave at least one dynamic identifier.
    pub fn new(capacity: u16) -> Self {
        let capacity = capacity.max(RESERVED_FACE_IDS + 1);
        let mut slots = Vec::with_capacity(usize::from(capacity));
        slots.resize_with(usize::from(capacity), FaceSlot::default);
        Self {
            slots,
            by_handle: HashMap::new(),
            by_peer: HashMap::new(),
            free: (RESERVED_FACE_IDS..capacity).collect(),
        }
    }

    /// Number of slots, reserved included.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of active entries.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_active()).count()
    }

    /// Check if no entry is active.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of indexed handles.
    pub fn handle_count(&self) -> usize {
        self.by_handle.len()
    }

    /// Check if a dynamic identifier can be allocated.
    pub fn has_free_id(&self) -> bool {
        !self.free.is_empty()
    }

    /// Slot of an identifier, `None` when out of range.
    pub fn slot(&self, id: FaceId) -> Option<&FaceSlot> {
        self.slots.get(id.index())
    }

    /// Frame-carrying face of an identifier.
    pub fn face(&self, id: FaceId) -> Option<&Face> {
        self.slot(id).and_then(FaceSlot::face)
    }

    /// Frame-carrying face of an identifier, with the reason when absent.
    pub(crate) fn face_checked(&mut self, id: FaceId) -> FaceResult<&mut Face> {
        match self.slots.get_mut(id.index()) {
            None => Err(FaceError::UnknownFace(id)),
            Some(FaceSlot::Unallocated) => Err(FaceError::Inactive(id)),
            Some(FaceSlot::Listening(_)) => Err(FaceError::NotConnected(id)),
            Some(FaceSlot::Local(face)) | Some(FaceSlot::Peer(face)) => Ok(face),
        }
    }

    /// Active entries in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = (FaceId, &FaceSlot)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_active())
            .map(|(i, slot)| (face_id_at(i), slot))
    }

    /// Frame-carrying faces in identifier order.
    pub fn faces(&self) -> impl Iterator<Item = &Face> {
        self.slots.iter().filter_map(FaceSlot::face)
    }

    /// Identifiers of every active entry.
    pub fn active_ids(&self) -> Vec<FaceId> {
        self.iter().map(|(id, _)| id).collect()
    }

    /// Identifier owning a handle, by index.
    pub fn lookup_handle(&self, fd: RawFd) -> Option<FaceId> {
        self.by_handle.get(&fd).copied()
    }

    /// Identifier of the face for a peer endpoint.
    pub fn lookup_peer(&self, addr: &SocketAddr, protocol: Protocol) -> Option<FaceId> {
        self.by_peer.get(&(*addr, protocol)).copied()
    }

    /// Record a peer endpoint unless another face already owns it.
    pub(crate) fn index_peer(&mut self, addr: SocketAddr, protocol: Protocol, id: FaceId) {
        self.by_peer.entry((addr, protocol)).or_insert(id);
    }

    /// Install an open reserved role.
    pub(crate) fn install_reserved(&mut self, id: FaceId, slot: FaceSlot) {
        debug_assert!(id.is_reserved());
        if let Some(fd) = slot.fd() {
            self.by_handle.insert(fd, id);
        }
        if let Some(entry) = self.slots.get_mut(id.index()) {
            *entry = slot;
        }
    }

    /// Allocate the lowest free dynamic identifier and install the face built
    /// for it. Both indices are updated.
    pub(crate) fn insert_dynamic(
        &mut self,
        build: impl FnOnce(FaceId) -> Face,
    ) -> FaceResult<FaceId> {
        let raw = self.free.pop_first().ok_or(FaceError::IdSpaceExhausted)?;
        let id = FaceId::new(raw);
        let face = build(id);

        self.by_handle.insert(face.fd(), id);
        if let Some(remote) = face.remote() {
            self.index_peer(remote, face.protocol(), id);
        }
        self.slots[id.index()] = FaceSlot::Peer(face);
        Ok(id)
    }

    /// Take an entry out of the table.
    ///
    /// Index entries pointing at it are removed. Dynamic identifiers return
    /// to the free set; reserved ones stay reserved for their role.
    pub(crate) fn remove(&mut self, id: FaceId) -> Option<FaceSlot> {
        let slot = std::mem::take(self.slots.get_mut(id.index())?);
        if !slot.is_active() {
            return None;
        }

        if let Some(fd) = slot.fd() {
            if self.by_handle.get(&fd) == Some(&id) {
                self.by_handle.remove(&fd);
            }
        }
        if let Some(face) = slot.face() {
            if let Some(remote) = face.remote() {
                let key = (remote, face.protocol());
                if self.by_peer.get(&key) == Some(&id) {
                    self.by_peer.remove(&key);
                }
            }
        }
        if id.is_dynamic() {
            self.free.insert(id.as_u16());
        }
        Some(slot)
    }
}

fn face_id_at(index: usize) -> FaceId {
    FaceId::new(u16::try_from(index).unwrap_or(u16::MAX))
}
