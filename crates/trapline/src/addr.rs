use std::fmt;
use std::str::FromStr;

use crate::backend::Process;
use crate::error::{Error, Result};

/// Address within the inferior's address space.
///
/// Symbol-relative addresses are resolved against the live process every
/// time [value](Self::value) is called, since symbols may not be loaded when
/// the address is declared and relocation changes from one launch to the
/// other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Addr {
    /// Absolute address.
    Absolute(u64),

    /// Address relative to a symbol.
    SymbolOffset {
        /// Symbol name.
        name: String,

        /// Signed offset added to the symbol address.
        offset: i64,
    },
}

impl Addr {
    /// Creates an address relative to the given symbol.
    pub fn symbol(name: impl Into<String>, offset: i64) -> Self {
        Self::SymbolOffset {
            name: name.into(),
            offset,
        }
    }

    /// Resolves the address against the given process.
    pub fn value<P: Process + ?Sized>(&self, process: &P) -> Result<u64> {
        match self {
            Self::Absolute(addr) => Ok(*addr),
            Self::SymbolOffset { name, offset } => {
                let base = process
                    .symbol_address(name)?
                    .ok_or_else(|| Error::SymbolNotFound(name.clone()))?;

                Ok(base.wrapping_add_signed(*offset))
            }
        }
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absolute(addr) => write!(f, "{addr:#x}"),
            Self::SymbolOffset { name, offset: 0 } => f.write_str(name),
            Self::SymbolOffset { name, offset } if *offset < 0 => {
                write!(f, "{name}-{:#x}", offset.unsigned_abs())
            }
            Self::SymbolOffset { name, offset } => write!(f, "{name}+{offset:#x}"),
        }
    }
}

impl FromStr for Addr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();

        let invalid = || Error::Configuration(format!("invalid address {s:?}"));

        let first = s.chars().next().ok_or_else(invalid)?;

        if first.is_ascii_digit() {
            return parse_int(s).map(Self::Absolute).ok_or_else(invalid);
        }

        let (name, offset) = match s.find(['+', '-']) {
            Some(pos) => {
                let magnitude = parse_int(s[pos + 1..].trim()).ok_or_else(invalid)?;
                let magnitude = i64::try_from(magnitude).map_err(|_| invalid())?;

                let offset = if s[pos..].starts_with('-') {
                    -magnitude
                } else {
                    magnitude
                };

                (s[..pos].trim_end(), offset)
            }
            None => (s, 0),
        };

        let valid_name = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '@' | '$'));

        if !valid_name {
            return Err(invalid());
        }

        Ok(Self::symbol(name, offset))
    }
}

fn parse_int(s: &str) -> Option<u64> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

/// Conversion into an [Addr].
///
/// Every registration method of a [Session](crate::session::Session)
/// accepts any implementor, and reports invalid inputs synchronously.
pub trait IntoAddr {
    /// Converts `self` into an address.
    fn into_addr(self) -> Result<Addr>;
}

impl IntoAddr for Addr {
    fn into_addr(self) -> Result<Addr> {
        Ok(self)
    }
}

impl IntoAddr for &Addr {
    fn into_addr(self) -> Result<Addr> {
        Ok(self.clone())
    }
}

impl IntoAddr for u64 {
    fn into_addr(self) -> Result<Addr> {
        Ok(Addr::Absolute(self))
    }
}

impl IntoAddr for u32 {
    fn into_addr(self) -> Result<Addr> {
        Ok(Addr::Absolute(self.into()))
    }
}

impl IntoAddr for usize {
    fn into_addr(self) -> Result<Addr> {
        Ok(Addr::Absolute(self as u64))
    }
}

impl IntoAddr for i64 {
    fn into_addr(self) -> Result<Addr> {
        u64::try_from(self)
            .map(Addr::Absolute)
            .map_err(|_| Error::Configuration(format!("negative address {self}")))
    }
}

impl IntoAddr for i32 {
    fn into_addr(self) -> Result<Addr> {
        i64::from(self).into_addr()
    }
}

impl IntoAddr for &str {
    fn into_addr(self) -> Result<Addr> {
        self.parse()
    }
}

impl IntoAddr for String {
    fn into_addr(self) -> Result<Addr> {
        self.parse()
    }
}

impl IntoAddr for (&str, i64) {
    fn into_addr(self) -> Result<Addr> {
        (self.0.to_owned(), self.1).into_addr()
    }
}

impl IntoAddr for (String, i64) {
    fn into_addr(self) -> Result<Addr> {
        match self.0.parse::<Addr>()? {
            Addr::SymbolOffset { name, offset: 0 } => Ok(Addr::symbol(name, self.1)),
            _ => Err(Error::Configuration(format!(
                "invalid symbol name {:?}",
                self.0
            ))),
        }
    }
}
