use super::flatten::EmitError;

/* Loop variables in allocation order; `z` is never handed out */
pub const ITERATOR_ALPHABET: [char; 25] = [
    'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'a', 'b',
    'c', 'd', 'e', 'f', 'g', 'h',
];

/// Fresh loop and container names for one generation pass.
///
/// Both counters follow the call stack: `with_iterator` and `with_slot` hand a
/// name to the closure and put the previous state back when it returns. Only
/// the slot high-water mark survives, so the declaration block can cover every
/// container the pass ever used.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NamingContext {
    open_loops: usize,
    slot: Option<u32>,
    high_water: Option<u32>,
}

impl NamingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot currently in use by the innermost open container, if any.
    pub fn current_slot(&self) -> Option<u32> {
        self.slot
    }

    pub fn high_water(&self) -> Option<u32> {
        self.high_water
    }

    pub fn open_loops(&self) -> usize {
        self.open_loops
    }

    /// Allocate the next slot (increment-then-use) for the duration of `f`.
    pub fn with_slot<T>(&mut self, f: impl FnOnce(&mut Self, u32) -> T) -> T {
        let saved = self.slot;
        let slot = saved.map_or(0, |index| index + 1);
        self.slot = Some(slot);
        self.high_water = Some(self.high_water.map_or(slot, |mark| mark.max(slot)));

        let result = f(self, slot);
        self.slot = saved;
        result
    }

    /// Open a loop; its iterator is not handed out again until `f` returns.
    pub fn with_iterator<T>(
        &mut self,
        f: impl FnOnce(&mut Self, char) -> Result<T, EmitError>,
    ) -> Result<T, EmitError> {
        let iterator = *ITERATOR_ALPHABET
            .get(self.open_loops)
            .ok_or(EmitError::LoopNestingTooDeep { limit: ITERATOR_ALPHABET.len() })?;

        self.open_loops += 1;
        let result = f(self, iterator);
        self.open_loops -= 1;
        result
    }
}
