use std::sync::{Mutex, MutexGuard, PoisonError};

/// Mailbox between any number of producer threads and one consumer.
///
/// Producers call [`DoubleBufferedList::add`] from any thread; items land on
/// the back list unless an equal item is already waiting there. Once per cycle
/// the consumer swaps the back list out with
/// [`DoubleBufferedList::switch_and_get`] and processes the batch without
/// holding the lock.
pub struct DoubleBufferedList<T> {
    back: Mutex<Vec<T>>,
}

impl<T: PartialEq> DoubleBufferedList<T> {
    pub fn new() -> Self {
        Self {
            back: Mutex::new(Vec::new()),
        }
    }

    /// Queue `item` unless an equal item is already queued.
    ///
    /// Returns `true` when the item was added.
    pub fn add(&self, item: T) -> bool {
        let mut back = self.lock();
        if back.contains(&item) {
            return false;
        }
        back.push(item);
        true
    }

    /// Withdraw a queued item. Returns `true` if it was waiting.
    pub fn remove(&self, item: &T) -> bool {
        let mut back = self.lock();
        match back.iter().position(|queued| queued == item) {
            Some(index) => {
                back.remove(index);
                true
            }
            None => false,
        }
    }

    /// Take every item queued since the previous switch.
    pub fn switch_and_get(&self) -> Vec<T> {
        let mut front = Vec::new();
        self.switch_into(&mut front);
        front
    }

    /// Swap `front` with the back list, reusing the consumer's buffer.
    ///
    /// `front` is cleared first, so after the call it holds exactly the items
    /// queued since the previous switch and the back list is empty.
    pub fn switch_into(&self, front: &mut Vec<T>) {
        front.clear();
        let mut back = self.lock();
        std::mem::swap(&mut *back, front);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<T>> {
        // A producer that panicked mid-push leaves the Vec intact.
        self.back.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: PartialEq> Default for DoubleBufferedList<T> {
    fn default() -> Self {
        Self::new()
    }
}
