//! Bookkeeping of the open sessions of a server

/// Identifies a slot of a [`Registry`]
///
/// The generation is increased every time a slot is freed, so an id of a
/// finished session never matches a later session in the same slot.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct SessionId {
    index: usize,
    generation: u64,
}

#[derive(Debug)]
struct Slot<T> {
    generation: u64,
    value: Option<T>,
}

/// Arena of the close handles of the open sessions
///
/// Registration is refused after [`complete`](Registry::complete). Callers
/// hold the registry behind a mutex and close removed handles after releasing
/// the lock.
#[derive(Debug)]
pub(crate) struct Registry<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    len: usize,
    completed: bool,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
            completed: false,
        }
    }
}

impl<T> Registry<T> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Adds `value`, gives it back if the registry is completed
    pub(crate) fn register(&mut self, value: T) -> Result<SessionId, T> {
        if self.completed {
            return Err(value);
        }

        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.value = Some(value);
            Ok(SessionId {
                index,
                generation: slot.generation,
            })
        } else {
            self.slots.push(Slot {
                generation: 0,
                value: Some(value),
            });
            Ok(SessionId {
                index: self.slots.len() - 1,
                generation: 0,
            })
        }
    }

    /// Removes the value of `id`, `None` if already removed
    pub(crate) fn unregister(&mut self, id: SessionId) -> Option<T> {
        let slot = self.slots.get_mut(id.index)?;
        if slot.generation != id.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation += 1;
        self.free.push(id.index);
        self.len -= 1;
        Some(value)
    }

    /// Removes all values and refuses further registrations
    pub(crate) fn complete(&mut self) -> Vec<T> {
        self.completed = true;
        self.free.clear();
        self.len = 0;
        self.slots
            .drain(..)
            .filter_map(|slot| slot.value)
            .collect()
    }

    /// Number of registered values
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_completed(&self) -> bool {
        self.completed
    }
}
