use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{Error, Result};

/// Byte order of the inferior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, knus::DecodeScalar)]
pub enum Endian {
    /// Least significant byte first.
    #[default]
    Little,

    /// Most significant byte first.
    Big,
}

impl Endian {
    /// Native byte order of the host.
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            Self::Big
        } else {
            Self::Little
        }
    }

    /// Encodes the low `bits` of `value`.
    pub fn encode(self, value: u64, bits: u32) -> Result<Vec<u8>> {
        let size = byte_size(bits)?;
        let value = value & mask(bits);

        let mut buf = vec![0; size];

        match self {
            Self::Little => LittleEndian::write_uint(&mut buf, value, size),
            Self::Big => BigEndian::write_uint(&mut buf, value, size),
        }

        Ok(buf)
    }

    /// Decodes a 1, 2, 4 or 8-byte unsigned integer.
    pub fn decode(self, bytes: &[u8]) -> Result<u64> {
        let bits = u32::try_from(bytes.len() * 8).map_err(|_| Error::UnsupportedSize(u32::MAX))?;
        let size = byte_size(bits)?;

        Ok(match self {
            Self::Little => LittleEndian::read_uint(bytes, size),
            Self::Big => BigEndian::read_uint(bytes, size),
        })
    }

    /// Keeps the `bits` least significant bits of an encoded integer.
    ///
    /// For little endian this is the leading bytes, for big endian the
    /// trailing ones.
    pub fn truncate(self, bits: u32, bytes: &[u8]) -> Result<Vec<u8>> {
        let size = byte_size(bits)?;

        if size > bytes.len() {
            return Err(Error::SizeMismatch {
                expected: size,
                actual: bytes.len(),
            });
        }

        Ok(match self {
            Self::Little => bytes[..size].to_vec(),
            Self::Big => bytes[bytes.len() - size..].to_vec(),
        })
    }
}

/// Returns the number of bytes of a 8, 16, 32 or 64-bit integer.
pub(crate) fn byte_size(bits: u32) -> Result<usize> {
    match bits {
        8 | 16 | 32 | 64 => Ok(bits as usize / 8),
        _ => Err(Error::UnsupportedSize(bits)),
    }
}

pub(crate) const fn mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1 << bits) - 1
    }
}
