use crate::address::NodeId;

/// One arena position.
/// `Reserved` marks ids handed out to an in-flight render pass whose nodes
/// are not committed yet; they are invisible to `get` until filled.
enum Entry<T> {
    Vacant,
    Reserved,
    Occupied(T),
}

struct Slot<T> {
    generation: u32,
    entry: Entry<T>,
}

/// Generational arena for committed nodes.
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free_list: Vec<u32>,
    occupied: usize,
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            occupied: 0,
        }
    }

    /// Hand out a fresh id without storing a value yet.
    pub fn reserve(&mut self) -> NodeId {
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Entry::Reserved;
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                entry: Entry::Reserved,
            });
            NodeId {
                index,
                generation: 0,
            }
        }
    }

    /// Store the value of a reserved id. Returns the value back if the id is
    /// stale or not reserved.
    pub fn fill(&mut self, id: NodeId, value: T) -> Result<(), T> {
        match self.slot_mut(id) {
            Some(slot) if matches!(slot.entry, Entry::Reserved) => {
                slot.entry = Entry::Occupied(value);
                self.occupied += 1;
                Ok(())
            }
            _ => Err(value),
        }
    }

    /// Swap the value of an occupied id.
    pub fn replace(&mut self, id: NodeId, value: T) -> Result<T, T> {
        match self.slot_mut(id) {
            Some(Slot {
                entry: Entry::Occupied(current),
                ..
            }) => Ok(std::mem::replace(current, value)),
            _ => Err(value),
        }
    }

    /// Free a reserved or occupied id. The generation is bumped immediately,
    /// invalidating every copy of `id`.
    pub fn release(&mut self, id: NodeId) -> Option<T> {
        let slot = self.slot_mut(id)?;
        let previous = std::mem::replace(&mut slot.entry, Entry::Vacant);
        if matches!(previous, Entry::Vacant) {
            return None;
        }
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(id.index);
        match previous {
            Entry::Occupied(value) => {
                self.occupied -= 1;
                Some(value)
            }
            _ => None,
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&T> {
        match self.slot(id)? {
            Slot {
                entry: Entry::Occupied(value),
                ..
            } => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        match self.slot_mut(id)? {
            Slot {
                entry: Entry::Occupied(value),
                ..
            } => Some(value),
            _ => None,
        }
    }

    pub fn is_reserved(&self, id: NodeId) -> bool {
        matches!(
            self.slot(id),
            Some(Slot {
                entry: Entry::Reserved,
                ..
            })
        )
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Number of committed values.
    pub fn len(&self) -> usize {
        self.occupied
    }

    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    fn slot(&self, id: NodeId) -> Option<&Slot<T>> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
    }

    fn slot_mut(&mut self, id: NodeId) -> Option<&mut Slot<T>> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}
