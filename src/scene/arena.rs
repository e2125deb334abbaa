/// Generational slot arena backing the scene. Handles are cheap copies;
/// removing a slot bumps its generation, so a stale handle reads as dead
/// instead of aliasing whatever moves into the slot next.
#[derive(Debug)]
pub struct GenArena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ArenaHandle {
    pub index: u32,
    pub generation: u32,
}

impl<T> GenArena<T> {
    pub fn new() -> Self {
        GenArena {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    pub fn insert(&mut self, value: T) -> ArenaHandle {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(slot.value.is_none());
            slot.value = Some(value);
            return ArenaHandle {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        ArenaHandle { index, generation: 0 }
    }

    pub fn get(&self, handle: ArenaHandle) -> Option<&T> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, handle: ArenaHandle) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    pub fn contains(&self, handle: ArenaHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Frees the slot and bumps its generation. Returns the value when the
    /// handle was still live.
    pub fn remove(&mut self, handle: ArenaHandle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.live -= 1;
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (ArenaHandle, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    ArenaHandle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }
}

impl<T> Default for GenArena<T> {
    fn default() -> Self {
        GenArena::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn stale_handles_read_as_dead() {
        let mut arena = GenArena::new();
        let first = arena.insert("a");
        assert_eq!(arena.get(first), Some(&"a"));

        assert_eq!(arena.remove(first), Some("a"));
        assert!(!arena.contains(first));
        assert_eq!(arena.remove(first), None);

        // The slot is recycled under a new generation; the old handle stays dead.
        let second = arena.insert("b");
        assert_eq!(second.index, first.index);
        assert_ne!(second.generation, first.generation);
        assert!(!arena.contains(first));
        assert_eq!(arena.get(second), Some(&"b"));
    }

    #[test]
    pub fn len_tracks_live_slots() {
        let mut arena = GenArena::new();
        let a = arena.insert(1);
        let b = arena.insert(2);
        assert_eq!(arena.len(), 2);

        arena.remove(a);
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.iter().map(|(_, v)| *v).collect::<Vec<_>>(), vec![2]);

        arena.remove(b);
        assert!(arena.is_empty());
    }
}
