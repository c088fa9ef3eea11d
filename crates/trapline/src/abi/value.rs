use super::convention::ArgCategory;
use super::endian::{Endian, byte_size, mask};
use super::location::Location;
use crate::backend::Process;
use crate::error::{Error, Result};
use crate::session::Host;

/// Type of a function argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgType {
    /// Two's complement integer.
    Int {
        /// Size, in bits.
        bits: u32,

        /// Whether the integer is signed.
        signed: bool,
    },

    /// Pointer into the inferior's address space.
    Pointer {
        /// Size, in bits.
        bits: u32,
    },
}

impl ArgType {
    /// Signed 8-bit integer.
    pub const I8: Self = Self::Int { bits: 8, signed: true };
    /// Signed 16-bit integer.
    pub const I16: Self = Self::Int { bits: 16, signed: true };
    /// Signed 32-bit integer.
    pub const I32: Self = Self::Int { bits: 32, signed: true };
    /// Signed 64-bit integer.
    pub const I64: Self = Self::Int { bits: 64, signed: true };
    /// Unsigned 8-bit integer.
    pub const U8: Self = Self::Int { bits: 8, signed: false };
    /// Unsigned 16-bit integer.
    pub const U16: Self = Self::Int { bits: 16, signed: false };
    /// Unsigned 32-bit integer.
    pub const U32: Self = Self::Int { bits: 32, signed: false };
    /// Unsigned 64-bit integer.
    pub const U64: Self = Self::Int { bits: 64, signed: false };
    /// 8-bit pointer.
    pub const PTR8: Self = Self::Pointer { bits: 8 };
    /// 16-bit pointer.
    pub const PTR16: Self = Self::Pointer { bits: 16 };
    /// 32-bit pointer.
    pub const PTR32: Self = Self::Pointer { bits: 32 };
    /// 64-bit pointer.
    pub const PTR64: Self = Self::Pointer { bits: 64 };

    /// Size of the type, in bits.
    pub const fn bits(self) -> u32 {
        match self {
            Self::Int { bits, .. } | Self::Pointer { bits } => bits,
        }
    }

    /// Calling-convention category of the type.
    pub const fn category(self) -> ArgCategory {
        ArgCategory::Integer
    }
}

/// Typed value read from a [Location] of the inferior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    ty: ArgType,
    endian: Endian,
    data: Vec<u8>,
    location: Location,
}

impl Value {
    /// Reads a value of type `ty` from `location`.
    ///
    /// A location larger than the type is truncated to the type's size.
    pub fn read<P: Process + ?Sized>(
        process: &P,
        ty: ArgType,
        location: Location,
        endian: Endian,
    ) -> Result<Self> {
        if ty.bits() > location.bits() {
            return Err(Error::SizeMismatch {
                expected: byte_size(location.bits())?,
                actual: byte_size(ty.bits())?,
            });
        }

        let raw = location.value(process, endian)?;
        let data = endian.truncate(ty.bits(), &raw)?;

        Ok(Self {
            ty,
            endian,
            data,
            location,
        })
    }

    /// Type of the value.
    pub const fn ty(&self) -> ArgType {
        self.ty
    }

    /// Raw bytes of the value, in the inferior's byte order.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Location the value was read from.
    pub const fn location(&self) -> &Location {
        &self.location
    }

    /// Interprets the value as an unsigned integer.
    pub fn as_u64(&self) -> u64 {
        self.endian.decode(&self.data).unwrap_or_default()
    }

    /// Interprets the value as a signed integer.
    pub fn as_i64(&self) -> i64 {
        let bits = self.ty.bits();
        let raw = self.as_u64();

        if bits >= 64 {
            return raw as i64;
        }

        let shift = 64 - bits;
        ((raw << shift) as i64) >> shift
    }

    /// Whether the value is zero.
    pub fn is_null(&self) -> bool {
        self.as_u64() == 0
    }

    /// Writes `value` back to the value's location, right away.
    ///
    /// This is meant for [deferred procedures](Host::with_inferior), prefer
    /// [set_u64](Self::set_u64) from handlers.
    pub fn write<P: Process + ?Sized>(&self, process: &mut P, value: u64) -> Result<()> {
        let value = value & mask(self.ty.bits());
        let data = self.endian.encode(value, self.location.bits())?;
        self.location.set(process, self.endian, &data)
    }

    /// Schedules writing `value` to the value's location.
    pub fn set_u64(&self, host: &mut Host<'_>, value: u64) -> Result<()> {
        let this = self.clone();
        host.with_inferior(move |host| this.write(host.process_mut()?, value))
    }

    /// Schedules writing raw bytes, as large as the type, to the value's
    /// location.
    pub fn set(&self, host: &mut Host<'_>, data: &[u8]) -> Result<()> {
        let size = byte_size(self.ty.bits())?;

        if data.len() != size {
            return Err(Error::SizeMismatch {
                expected: size,
                actual: data.len(),
            });
        }

        let value = self.endian.decode(data)?;
        self.set_u64(host, value)
    }

    /// Reads a value of type `ty` at the address held by this pointer.
    pub fn deref<P: Process + ?Sized>(&self, process: &P, ty: ArgType) -> Result<Self> {
        let location = Location::absolute(self.pointee()?, ty.bits());
        Self::read(process, ty, location, self.endian)
    }

    /// Reads the NUL-terminated byte string this pointer points to.
    ///
    /// At most `max_len` bytes are read, the terminator excluded.
    pub fn read_c_string<P: Process + ?Sized>(&self, process: &P, max_len: usize) -> Result<Vec<u8>> {
        const CHUNK: usize = 64;
        const PAGE_SIZE: u64 = 0x1000;

        let mut addr = self.pointee()?;
        let mut string = Vec::new();
        let mut chunk = [0; CHUNK];

        while string.len() < max_len {
            // a chunk never crosses a page, which may be the last mapped one
            let to_page_end = (PAGE_SIZE - (addr & (PAGE_SIZE - 1))) as usize;
            let len = CHUNK.min(to_page_end).min(max_len - string.len());
            process.read_memory(addr, &mut chunk[..len])?;

            match chunk[..len].iter().position(|b| *b == 0) {
                Some(nul) => {
                    string.extend_from_slice(&chunk[..nul]);
                    break;
                }
                None => string.extend_from_slice(&chunk[..len]),
            }

            addr = addr.wrapping_add(len as u64);
        }

        Ok(string)
    }

    fn pointee(&self) -> Result<u64> {
        match self.ty {
            ArgType::Pointer { .. } => Ok(self.as_u64()),
            ArgType::Int { .. } => Err(Error::Configuration(format!(
                "cannot dereference non-pointer value {}",
                self.location
            ))),
        }
    }
}
