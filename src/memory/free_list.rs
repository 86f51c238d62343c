/// Fixed-capacity slot free-list
///
/// Arena-style index pool: a bitset marks free slots and a cursor remembers
/// the lowest index that may be free, so slots are handed out densely from
/// the front of the buffer.

use bit_vec::BitVec;

#[derive(Debug, Clone)]
pub struct SlotFreeList {
    /// Bit set = slot is free
    free: BitVec,
    free_count: u32,
    /// No free slot exists below this index
    cursor: usize,
}

impl SlotFreeList {
    pub fn new(capacity: u32) -> Self {
        Self {
            free: BitVec::from_elem(capacity as usize, true),
            free_count: capacity,
            cursor: 0,
        }
    }

    /// Take the lowest free slot
    pub fn acquire(&mut self) -> Option<u32> {
        if self.free_count == 0 {
            return None;
        }
        let index = (self.cursor..self.free.len()).find(|&i| self.free[i])?;
        self.free.set(index, false);
        self.free_count -= 1;
        self.cursor = index + 1;
        Some(index as u32)
    }

    /// Return a slot. Returns false if it was not in use.
    pub fn release(&mut self, slot: u32) -> bool {
        let index = slot as usize;
        match self.free.get(index) {
            Some(false) => {
                self.free.set(index, true);
                self.free_count += 1;
                self.cursor = self.cursor.min(index);
                true
            }
            _ => false,
        }
    }

    /// Mark every slot free
    pub fn reset(&mut self) {
        self.free.set_all();
        self.free_count = self.capacity();
        self.cursor = 0;
    }

    #[inline]
    pub fn is_free(&self, slot: u32) -> bool {
        self.free.get(slot as usize).unwrap_or(false)
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.free.len() as u32
    }

    #[inline]
    pub fn free_count(&self) -> u32 {
        self.free_count
    }

    #[inline]
    pub fn in_use(&self) -> u32 {
        self.capacity() - self.free_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hands_out_lowest_slot_first() {
        let mut list = SlotFreeList::new(4);
        assert_eq!(list.acquire(), Some(0));
        assert_eq!(list.acquire(), Some(1));
        assert_eq!(list.acquire(), Some(2));

        assert!(list.release(1));
        assert_eq!(list.acquire(), Some(1));
        assert_eq!(list.acquire(), Some(3));
        assert_eq!(list.acquire(), None);
    }

    #[test]
    fn double_release_is_rejected() {
        let mut list = SlotFreeList::new(2);
        let slot = list.acquire().unwrap();
        assert!(list.release(slot));
        assert!(!list.release(slot));
        assert!(!list.release(99));
        assert_eq!(list.free_count(), 2);
    }

    #[test]
    fn reset_refills_everything() {
        let mut list = SlotFreeList::new(3);
        while list.acquire().is_some() {}
        assert_eq!(list.in_use(), 3);

        list.reset();
        assert_eq!(list.free_count(), 3);
        assert_eq!(list.acquire(), Some(0));
    }

    #[test]
    fn zero_capacity_never_allocates() {
        let mut list = SlotFreeList::new(0);
        assert_eq!(list.acquire(), None);
        assert!(!list.is_free(0));
    }
}
