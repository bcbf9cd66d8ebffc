//! Sparse word-addressable memory image.
//!
//! The image backs both ports of the core under test during a native run and
//! is the unit the hex loader fills. It provides:
//! 1. **Storage:** Words keyed by [`WordAddr`]; untouched words inside the range read as zero.
//! 2. **Bounds:** Every access is checked against `[base, base + size)`; strays are [`MemoryError`]s.
//! 3. **Loading:** The `objcopy -O verilog --verilog-data-width=4` text format.
//! 4. **Signature:** The designated `[start, end)` region and its serialization.

use std::collections::BTreeMap;
use std::path::Path;

use crate::common::{
    AccessType, ByteAddr, DataRequest, HarnessError, ImageError, MemoryError, WORD_BYTES,
    WordAddr,
};
use crate::signature::SignatureRecord;

/// Word-aligned, non-empty byte range holding a test's signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SignatureRegion {
    start: u32,
    end: u32,
}

impl SignatureRegion {
    /// Creates a region; `None` unless `start < end` and both are word-aligned.
    pub const fn new(start: u32, end: u32) -> Option<Self> {
        if start < end && ByteAddr(start).is_word_aligned() && ByteAddr(end).is_word_aligned() {
            Some(Self { start, end })
        } else {
            None
        }
    }

    /// First byte of the region.
    pub const fn start(&self) -> u32 {
        self.start
    }

    /// One past the last byte of the region.
    pub const fn end(&self) -> u32 {
        self.end
    }

    /// Number of words in the region.
    pub const fn len_words(&self) -> u32 {
        (self.end - self.start) / WORD_BYTES
    }

    /// Word addresses covered by the region, ascending.
    pub fn words(&self) -> impl Iterator<Item = WordAddr> {
        let first = ByteAddr(self.start).word().val();
        (first..first + self.len_words()).map(WordAddr)
    }
}

/// Sparse memory image with a designated signature region.
#[derive(Clone, Debug)]
pub struct MemoryImage {
    base: u32,
    size: u32,
    words: BTreeMap<WordAddr, u32>,
    signature: SignatureRegion,
}

impl MemoryImage {
    /// Creates an empty image covering `[base, base + size)`.
    pub const fn new(base: u32, size: u32, signature: SignatureRegion) -> Self {
        Self {
            base,
            size,
            words: BTreeMap::new(),
            signature,
        }
    }

    /// First byte of the image.
    pub const fn base(&self) -> u32 {
        self.base
    }

    /// One past the last byte of the image.
    pub const fn end(&self) -> u64 {
        self.base as u64 + self.size as u64
    }

    /// Returns the signature region.
    pub const fn signature(&self) -> SignatureRegion {
        self.signature
    }

    /// Replaces the signature region (e.g. from ELF symbols).
    pub const fn set_signature(&mut self, region: SignatureRegion) {
        self.signature = region;
    }

    /// Returns `true` if the word containing `addr` is backed by the image.
    pub fn contains(&self, addr: u32) -> bool {
        let word_start = u64::from(addr & !(WORD_BYTES - 1));
        word_start >= u64::from(self.base) && word_start + u64::from(WORD_BYTES) <= self.end()
    }

    fn check(&self, kind: AccessType, addr: u32) -> Result<WordAddr, MemoryError> {
        if self.contains(addr) {
            Ok(ByteAddr(addr).word())
        } else {
            Err(MemoryError::OutOfRange {
                kind,
                addr,
                base: self.base,
                end: self.end(),
            })
        }
    }

    /// Reads the word containing `addr`.
    pub fn read_word(&self, kind: AccessType, addr: u32) -> Result<u32, MemoryError> {
        let w = self.check(kind, addr)?;
        Ok(self.words.get(&w).copied().unwrap_or(0))
    }

    /// Writes the enabled byte lanes of `data` into the word containing `addr`.
    pub fn write_masked(&mut self, addr: u32, data: u32, strobe: u8) -> Result<(), MemoryError> {
        let w = self.check(AccessType::Write, addr)?;
        let mask = (0..WORD_BYTES)
            .filter(|lane| strobe & (1 << lane) != 0)
            .fold(0u32, |m, lane| m | (0xff << (lane * 8)));
        let cell = self.words.entry(w).or_insert(0);
        *cell = (*cell & !mask) | (data & mask);
        Ok(())
    }

    /// Applies a data-port write request.
    pub fn apply(&mut self, req: &DataRequest) -> Result<(), MemoryError> {
        self.write_masked(req.addr, req.wdata, req.strobe)
    }

    /// Reads the word at a word address, for inspection.
    pub fn word_at(&self, addr: WordAddr) -> u32 {
        self.words.get(&addr).copied().unwrap_or(0)
    }

    /// Loads hex image text into the image and returns the number of words stored.
    ///
    /// `@<hex>` sets the current *word* address; every other token is one
    /// 32-bit hex word stored at the current address, which then advances by
    /// one word. Loading starts at the image base.
    pub fn load_hex(&mut self, text: &str) -> Result<usize, ImageError> {
        let mut cursor = u64::from(self.base);
        let mut stored = 0;
        for (idx, line) in text.lines().enumerate() {
            let line_no = idx + 1;
            for token in line.split_whitespace() {
                if let Some(dir) = token.strip_prefix('@') {
                    let word = u32::from_str_radix(dir, 16).map_err(|_| ImageError::BadDirective {
                        line: line_no,
                        text: token.to_string(),
                    })?;
                    cursor = u64::from(word) * u64::from(WORD_BYTES);
                    continue;
                }
                let value = u32::from_str_radix(token, 16).map_err(|_| ImageError::BadWord {
                    line: line_no,
                    text: token.to_string(),
                })?;
                let addr = u32::try_from(cursor)
                    .ok()
                    .filter(|a| self.contains(*a))
                    .ok_or(ImageError::OutOfRange {
                        line: line_no,
                        addr: cursor,
                    })?;
                let _ = self.words.insert(ByteAddr(addr).word(), value);
                stored += 1;
                cursor += u64::from(WORD_BYTES);
            }
        }
        Ok(stored)
    }

    /// Reads and loads a hex image file.
    pub fn load_hex_file(&mut self, path: &Path) -> Result<usize, HarnessError> {
        let text = std::fs::read_to_string(path).map_err(|e| HarnessError::io(path, e))?;
        Ok(self.load_hex(&text)?)
    }

    /// Serializes the signature region, ascending, one word per entry.
    ///
    /// Words never written read as zero.
    pub fn dump_signature(&self) -> SignatureRecord {
        SignatureRecord::from_values(self.signature.words().map(|w| self.word_at(w)))
    }
}
