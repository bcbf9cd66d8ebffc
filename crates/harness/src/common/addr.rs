//! Byte and word address types.
//!
//! The memory-image text format counts in 32-bit words while the core's
//! buses and ELF symbols count in bytes. These strong types keep the two
//! apart:
//! 1. **Type Safety:** A `WordAddr` cannot be handed to an API expecting a byte address.
//! 2. **Conversion:** Byte addresses map to the word that contains them.
//! 3. **Alignment:** A check for 4-byte alignment.

/// Width of one memory word in bytes.
pub const WORD_BYTES: u32 = 4;

/// A byte address on the 32-bit bus of the core under test.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteAddr(pub u32);

/// A word address (byte address divided by four), as used by `@` directives
/// in the hex memory-image format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WordAddr(pub u32);

impl ByteAddr {
    /// Returns `true` when the address sits on a word boundary.
    #[inline]
    pub const fn is_word_aligned(self) -> bool {
        self.0 % WORD_BYTES == 0
    }

    /// Converts to the word address containing this byte.
    ///
    /// Sub-word offsets are discarded.
    #[inline]
    pub const fn word(self) -> WordAddr {
        WordAddr(self.0 / WORD_BYTES)
    }
}

impl WordAddr {
    /// Returns the raw word index.
    #[inline]
    pub const fn val(self) -> u32 {
        self.0
    }
}
