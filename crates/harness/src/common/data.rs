//! Memory access types.
//!
//! This module classifies the accesses the testbench services on behalf of
//! the core under test. The classification is used for:
//! 1. **Fault Reporting:** Naming the port that strayed outside the memory image.
//! 2. **Logging:** Tagging per-cycle bus activity in the simulation log.

use std::fmt;

/// Type of memory access serviced by the testbench.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessType {
    /// Instruction fetch on the instruction port.
    Fetch,

    /// Data read on the data port.
    Read,

    /// Data write on the data port (write-enable asserted).
    Write,
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Fetch => "fetch",
            Self::Read => "read",
            Self::Write => "write",
        };
        f.write_str(s)
    }
}

/// A request presented on the data port of the core for one cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataRequest {
    /// Byte address driven on the data address bus.
    pub addr: u32,
    /// Write data (ignored for reads).
    pub wdata: u32,
    /// Write-enable.
    pub write: bool,
    /// Byte-lane strobe for writes; bit `n` enables byte `n` of the word.
    pub strobe: u8,
}

impl DataRequest {
    /// Full-word strobe.
    pub const FULL_WORD: u8 = 0b1111;

    /// Creates a read request at `addr`.
    pub const fn read(addr: u32) -> Self {
        Self {
            addr,
            wdata: 0,
            write: false,
            strobe: 0,
        }
    }

    /// Creates a full-word write request.
    pub const fn write(addr: u32, wdata: u32) -> Self {
        Self {
            addr,
            wdata,
            write: true,
            strobe: Self::FULL_WORD,
        }
    }

    /// Creates a write request with an explicit byte-lane strobe.
    pub const fn write_masked(addr: u32, wdata: u32, strobe: u8) -> Self {
        Self {
            addr,
            wdata,
            write: true,
            strobe,
        }
    }

    /// Returns the access type of this request.
    pub const fn access_type(&self) -> AccessType {
        if self.write {
            AccessType::Write
        } else {
            AccessType::Read
        }
    }
}
