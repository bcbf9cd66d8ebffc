//! Well-known symbols of a compiled test.

use std::path::Path;

use object::{Object, ObjectSymbol};

use super::image::SignatureRegion;
use crate::common::{HarnessError, Result};

/// Addresses of the HTIF and signature symbols, when the test defines them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ElfSymbols {
    /// Completion cell written by the test.
    pub tohost: Option<u32>,
    /// Host-to-target cell.
    pub fromhost: Option<u32>,
    /// First byte of the signature region.
    pub begin_signature: Option<u32>,
    /// One past the last byte of the signature region.
    pub end_signature: Option<u32>,
}

impl ElfSymbols {
    /// Reads the symbol table of an ELF file.
    pub fn read(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(|e| HarnessError::io(path, e))?;
        Self::parse(&data).map_err(|reason| HarnessError::Elf {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Extracts the symbols from raw ELF bytes.
    pub fn parse(data: &[u8]) -> std::result::Result<Self, String> {
        let file = object::File::parse(data).map_err(|e| e.to_string())?;
        let mut syms = Self::default();
        for sym in file.symbols() {
            let Ok(name) = sym.name() else { continue };
            let slot = match name {
                "tohost" => &mut syms.tohost,
                "fromhost" => &mut syms.fromhost,
                "begin_signature" => &mut syms.begin_signature,
                "end_signature" => &mut syms.end_signature,
                _ => continue,
            };
            *slot = u32::try_from(sym.address()).ok();
        }
        Ok(syms)
    }

    /// Returns the signature region named by the symbols, if both are present and valid.
    pub fn signature_region(&self) -> Option<SignatureRegion> {
        SignatureRegion::new(self.begin_signature?, self.end_signature?)
    }
}
