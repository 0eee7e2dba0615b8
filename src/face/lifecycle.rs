//! Face teardown.

use super::manager::FaceManager;
use super::slot::FaceSlot;
use crate::core::constants::FACE_CLOSE_NOTIFICATION;
use crate::core::{FaceError, FaceId, FaceResult};

impl FaceManager {
    /// Close a face or listener.
    ///
    /// A local application is sent the close notification first. The handle
    /// is released and both index entries are removed; a dynamic identifier
    /// becomes free again, a reserved one returns to inactive. Unflushed
    /// stream bytes are discarded.
    pub fn close(&mut self, id: FaceId) -> FaceResult<()> {
        let notify = match self.table.slot(id) {
            None => return Err(FaceError::UnknownFace(id)),
            Some(FaceSlot::Unallocated) => return Err(FaceError::Inactive(id)),
            Some(slot) => slot.face().is_some_and(|f| f.is_local()),
        };
        if notify {
            self.send_forced(id, FACE_CLOSE_NOTIFICATION);
        }

        let slot = self.table.remove(id).ok_or(FaceError::Inactive(id))?;
        if id == FaceId::LOCAL {
            self.local_path_guard = None;
        }
        tracing::info!(face = %id, protocol = %slot.protocol(), "face closed");
        Ok(())
    }

    /// Close every active face and listener, in identifier order.
    ///
    /// Safe to call repeatedly.
    pub fn close_all(&mut self) {
        let ids = self.table.active_ids();
        let count = ids.len();
        for id in ids {
            if let Err(e) = self.close(id) {
                tracing::warn!(face = %id, error = %e, "close failed");
            }
        }
        if count > 0 {
            tracing::info!(count, "all faces closed");
        }
    }
}
