use std::fmt;

use super::endian::{Endian, byte_size};
use super::StackGrowth;
use crate::backend::Process;
use crate::error::{Error, Result};

/// Storage location of a value within the inferior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Machine register.
    Register {
        /// Register name.
        name: String,

        /// Register size, in bits.
        bits: u32,
    },

    /// Memory at a register plus a signed offset.
    RegisterOffset {
        /// Base register name.
        name: String,

        /// Offset added to the register value.
        offset: i64,

        /// Value size, in bits.
        bits: u32,
    },

    /// Memory relative to the stack pointer.
    StackOffset {
        /// Distance from the stack pointer, towards older frames.
        offset: u64,

        /// Value size, in bits.
        bits: u32,

        /// Stack growth direction.
        growth: StackGrowth,
    },

    /// Memory at a fixed address.
    Absolute {
        /// Memory address.
        addr: u64,

        /// Value size, in bits.
        bits: u32,
    },
}

impl Location {
    /// Creates a register location.
    pub fn register(name: impl Into<String>, bits: u32) -> Self {
        Self::Register {
            name: name.into(),
            bits,
        }
    }

    /// Creates a register-relative memory location.
    pub fn register_offset(name: impl Into<String>, offset: i64, bits: u32) -> Self {
        Self::RegisterOffset {
            name: name.into(),
            offset,
            bits,
        }
    }

    /// Creates a stack-relative memory location.
    pub const fn stack(offset: u64, bits: u32, growth: StackGrowth) -> Self {
        Self::StackOffset {
            offset,
            bits,
            growth,
        }
    }

    /// Creates a fixed memory location.
    pub const fn absolute(addr: u64, bits: u32) -> Self {
        Self::Absolute { addr, bits }
    }

    /// Size of the location, in bits.
    pub const fn bits(&self) -> u32 {
        match self {
            Self::Register { bits, .. }
            | Self::RegisterOffset { bits, .. }
            | Self::StackOffset { bits, .. }
            | Self::Absolute { bits, .. } => *bits,
        }
    }

    /// Reads the bytes stored at this location.
    ///
    /// Register values are encoded with the given byte order, memory is
    /// returned as is.
    pub fn value<P: Process + ?Sized>(&self, process: &P, endian: Endian) -> Result<Vec<u8>> {
        let size = byte_size(self.bits())?;

        match self.target(process)? {
            Target::Register(name) => endian.encode(process.read_register(name)?, self.bits()),
            Target::Memory(addr) => {
                let mut buf = vec![0; size];
                process.read_memory(addr, &mut buf)?;
                Ok(buf)
            }
        }
    }

    /// Stores bytes at this location.
    ///
    /// `data` must be exactly as large as the location.
    pub fn set<P: Process + ?Sized>(&self, process: &mut P, endian: Endian, data: &[u8]) -> Result<()> {
        let size = byte_size(self.bits())?;

        if data.len() != size {
            return Err(Error::SizeMismatch {
                expected: size,
                actual: data.len(),
            });
        }

        match self.target(process)? {
            Target::Register(name) => process.write_register(name, endian.decode(data)?)?,
            Target::Memory(addr) => process.write_memory(addr, data)?,
        }

        Ok(())
    }

    fn target<P: Process + ?Sized>(&self, process: &P) -> Result<Target<'_>> {
        let addr = match self {
            Self::Register { name, .. } => return Ok(Target::Register(name)),
            Self::RegisterOffset { name, offset, .. } => {
                process.read_register(name)?.wrapping_add_signed(*offset)
            }
            Self::StackOffset { offset, growth, .. } => {
                let sp = process.stack_addr()?;
                match growth {
                    StackGrowth::Down => sp.wrapping_add(*offset),
                    StackGrowth::Up => sp.wrapping_sub(*offset),
                }
            }
            Self::Absolute { addr, .. } => *addr,
        };

        Ok(Target::Memory(addr))
    }
}

enum Target<'a> {
    Register(&'a str),
    Memory(u64),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Register { name, .. } => write!(f, "%{name}"),
            Self::RegisterOffset { name, offset: 0, .. } => write!(f, "(%{name})"),
            Self::RegisterOffset { name, offset, .. } if *offset < 0 => {
                write!(f, "-{:#x}(%{name})", offset.unsigned_abs())
            }
            Self::RegisterOffset { name, offset, .. } => write!(f, "{offset:#x}(%{name})"),
            Self::StackOffset { offset: 0, .. } => f.write_str("(%sp)"),
            Self::StackOffset {
                offset,
                growth: StackGrowth::Down,
                ..
            } => write!(f, "{offset:#x}(%sp)"),
            Self::StackOffset { offset, .. } => write!(f, "-{offset:#x}(%sp)"),
            Self::Absolute { addr, .. } => write!(f, "*{addr:#x}"),
        }
    }
}
