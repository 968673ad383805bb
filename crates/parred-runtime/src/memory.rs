use core::sync::atomic::{AtomicU32, Ordering};

/// A device allocation made of 32-bit slots interpreted as `f32`.
///
/// Every lane of a launch accesses the same allocation concurrently, so slots are atomics.
/// Plain loads and stores are relaxed: visibility across lanes is only guaranteed by a group
/// barrier or by the end of the launch, like on a GPU.
///
/// Accesses follow robust buffer access rules: out-of-range loads return `0.0` and
/// out-of-range stores are dropped.
#[derive(Debug)]
pub struct Memory {
    words: Box<[AtomicU32]>,
    size: usize,
}

impl Memory {
    /// Allocate `len` zeroed slots.
    pub fn zeroed(len: usize) -> Self {
        Self {
            words: (0..len).map(|_| AtomicU32::new(0)).collect(),
            size: len * size_of::<u32>(),
        }
    }

    /// Allocate enough slots to hold `size` bytes, zeroed.
    pub fn with_byte_size(size: usize) -> Self {
        let mut memory = Self::zeroed(size.div_ceil(size_of::<u32>()));
        memory.size = size;
        memory
    }

    /// Allocate a copy of the given bytes. A trailing partial slot is zero padded.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let words = bytes
            .chunks(size_of::<u32>())
            .map(|chunk| {
                let mut word = [0u8; 4];
                word[..chunk.len()].copy_from_slice(chunk);
                AtomicU32::new(u32::from_ne_bytes(word))
            })
            .collect();

        Self {
            words,
            size: bytes.len(),
        }
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// If the allocation has no slot.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Size of the allocation in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Read the slot at `index`.
    pub fn load(&self, index: u32) -> f32 {
        match self.words.get(index as usize) {
            Some(word) => f32::from_bits(word.load(Ordering::Relaxed)),
            None => 0.0,
        }
    }

    /// Write the slot at `index`.
    pub fn store(&self, index: u32, value: f32) {
        if let Some(word) = self.words.get(index as usize) {
            word.store(value.to_bits(), Ordering::Relaxed);
        }
    }

    /// Atomically add `value` to the slot at `index`, returning the previous value.
    pub fn atomic_add(&self, index: u32, value: f32) -> f32 {
        let Some(word) = self.words.get(index as usize) else {
            return 0.0;
        };

        let previous = word
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                Some((f32::from_bits(bits) + value).to_bits())
            })
            .unwrap_or_else(|bits| bits);

        f32::from_bits(previous)
    }

    /// Copy the allocation back to host bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let words: Vec<u32> = self
            .words
            .iter()
            .map(|word| word.load(Ordering::Acquire))
            .collect();
        let mut bytes = bytemuck::cast_slice::<u32, u8>(&words).to_vec();
        bytes.truncate(self.size);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_host_bytes() {
        let values = [1.5f32, -2.0, 3.25];
        let memory = Memory::from_bytes(bytemuck::cast_slice(&values));

        assert_eq!(memory.len(), 3);
        assert_eq!(memory.load(1), -2.0);
        assert_eq!(memory.to_bytes(), bytemuck::cast_slice::<f32, u8>(&values));
    }

    #[test]
    fn out_of_range_accesses_are_robust() {
        let memory = Memory::zeroed(2);

        memory.store(7, 4.0);
        assert_eq!(memory.load(7), 0.0);
        assert_eq!(memory.atomic_add(9, 1.0), 0.0);
        assert_eq!(memory.to_bytes(), vec![0u8; 8]);
    }

    #[test]
    fn partial_slot_keeps_the_byte_size() {
        let memory = Memory::from_bytes(&[1, 2, 3, 4, 5, 6]);

        assert_eq!(memory.len(), 2);
        assert_eq!(memory.size(), 6);
        assert_eq!(memory.to_bytes(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn atomic_add_accumulates_across_threads() {
        let memory = Memory::zeroed(1);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..100 {
                        memory.atomic_add(0, 1.0);
                    }
                });
            }
        });

        assert_eq!(memory.load(0), 800.0);
    }
}
