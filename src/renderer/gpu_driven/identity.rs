/// Stable Object Identities
///
/// Every renderable object owns one identity for its whole lifetime. The
/// identity indexes the indirection table and is the `first_instance` of the
/// object's draw commands.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{capacity_error, PoolKind, SyncError, SyncResult};
use crate::memory::SlotFreeList;

/// Index into the indirection table
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub u32);

impl ObjectId {
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Fixed pool of object identities
pub struct IdentityAllocator {
    free: Mutex<SlotFreeList>,
    capacity: u32,
}

impl IdentityAllocator {
    pub fn new(capacity: u32) -> Self {
        Self {
            free: Mutex::new(SlotFreeList::new(capacity)),
            capacity,
        }
    }

    /// Take an unused identity. Running out means the pool is configured too
    /// small for the scene.
    pub fn allocate(&self) -> SyncResult<ObjectId> {
        let slot = self.free.lock().acquire();
        match slot {
            Some(slot) => {
                log::trace!("[IdentityAllocator::allocate] {}", slot);
                Ok(ObjectId(slot))
            }
            None => {
                log::error!(
                    "[IdentityAllocator::allocate] All {} object identities in use",
                    self.capacity
                );
                Err(capacity_error(PoolKind::Identity, self.capacity))
            }
        }
    }

    /// Allocate an identity that is released when the handle drops
    pub fn allocate_handle(self: &Arc<Self>) -> SyncResult<ObjectHandle> {
        let id = self.allocate()?;
        Ok(ObjectHandle {
            id,
            allocator: Arc::clone(self),
        })
    }

    pub fn release(&self, id: ObjectId) -> SyncResult<()> {
        if self.free.lock().release(id.0) {
            log::trace!("[IdentityAllocator::release] {}", id.0);
            Ok(())
        } else {
            Err(SyncError::UnknownIdentity(id.0))
        }
    }

    pub fn is_live(&self, id: ObjectId) -> bool {
        id.0 < self.capacity && !self.free.lock().is_free(id.0)
    }

    pub fn live_count(&self) -> u32 {
        self.free.lock().in_use()
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

/// Owned object identity
pub struct ObjectHandle {
    id: ObjectId,
    allocator: Arc<IdentityAllocator>,
}

impl ObjectHandle {
    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHandle").field("id", &self.id).finish()
    }
}

impl Drop for ObjectHandle {
    fn drop(&mut self) {
        if let Err(e) = self.allocator.release(self.id) {
            log::error!("[ObjectHandle::drop] {}", e);
        }
    }
}
