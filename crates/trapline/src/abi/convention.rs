use std::collections::HashMap;

use super::endian::byte_size;
use super::location::Location;
use super::value::{ArgType, Value};
use super::{DataLayout, StackGrowth};
use crate::backend::Process;
use crate::error::{Error, Result};

/// Category of arguments sharing the same location rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgCategory {
    /// Integers and pointers.
    Integer,
}

/// Selection of a calling convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, knus::DecodeScalar)]
pub enum ConventionKind {
    /// Convention of the host architecture.
    #[default]
    Native,

    /// System V x86-64.
    Amd64,

    /// System V i386.
    I386,
}

/// Highest argument ordinal described by the built-in conventions.
const MAX_ORDINAL: usize = 31;

/// Calling convention of an architecture.
///
/// Maps an argument category and an ordinal to a [Location], ordinal 0
/// being the return value.
#[derive(Debug, Clone)]
pub struct Convention {
    name: String,
    word_bits: u32,
    layout: DataLayout,
    table: HashMap<(ArgCategory, usize), Location>,
}

impl Convention {
    /// Creates an empty calling convention.
    pub fn new(name: impl Into<String>, word_bits: u32, layout: DataLayout) -> Self {
        Self {
            name: name.into(),
            word_bits,
            layout,
            table: HashMap::new(),
        }
    }

    /// Switches the convention to another data layout, moving its stack
    /// locations to the new growth direction.
    pub fn set_layout(&mut self, layout: DataLayout) {
        self.layout = layout;

        for location in self.table.values_mut() {
            if let Location::StackOffset { growth, .. } = location {
                *growth = layout.stack;
            }
        }
    }

    /// Adds (or replaces) the location of an argument.
    pub fn with_location(mut self, category: ArgCategory, ordinal: usize, location: Location) -> Self {
        self.table.insert((category, ordinal), location);
        self
    }

    /// System V x86-64 convention (integer arguments only).
    pub fn amd64(layout: DataLayout) -> Self {
        const REGS: [&str; 7] = ["rax", "rdi", "rsi", "rdx", "rcx", "r8", "r9"];

        let conv = REGS
            .iter()
            .enumerate()
            .fold(Self::new("amd64", 64, layout), |conv, (i, reg)| {
                conv.with_location(ArgCategory::Integer, i, Location::register(*reg, 64))
            });

        // first stack slot sits above the return address
        (REGS.len()..=MAX_ORDINAL).fold(conv, |conv, i| {
            let offset = (i - REGS.len()) as u64 * 8 + 8;
            conv.with_location(
                ArgCategory::Integer,
                i,
                Location::stack(offset, 64, layout.stack),
            )
        })
    }

    /// System V i386 convention (integer arguments only).
    pub fn i386(layout: DataLayout) -> Self {
        let conv = Self::new("i386", 32, layout).with_location(
            ArgCategory::Integer,
            0,
            Location::register("eax", 32),
        );

        // SP holds the return address, first argument comes right above
        (1..=MAX_ORDINAL).fold(conv, |conv, i| {
            let offset = i as u64 * 4;
            conv.with_location(
                ArgCategory::Integer,
                i,
                Location::stack(offset, 32, layout.stack),
            )
        })
    }

    /// Convention of the given architecture (as named by
    /// [std::env::consts::ARCH]).
    pub fn for_arch(arch: &str, layout: DataLayout) -> Result<Self> {
        match arch {
            "x86_64" | "amd64" => Ok(Self::amd64(layout)),
            "x86" | "i386" | "i686" => Ok(Self::i386(layout)),
            _ => Err(Error::Configuration(format!(
                "no calling convention known for architecture {arch}"
            ))),
        }
    }

    /// Convention of the host architecture.
    pub fn native(layout: DataLayout) -> Result<Self> {
        Self::for_arch(std::env::consts::ARCH, layout)
    }

    /// Convention selected by `kind`.
    pub fn from_kind(kind: ConventionKind, layout: DataLayout) -> Result<Self> {
        match kind {
            ConventionKind::Native => Self::native(layout),
            ConventionKind::Amd64 => Ok(Self::amd64(layout)),
            ConventionKind::I386 => Ok(Self::i386(layout)),
        }
    }

    /// Name of the convention.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Data layout the convention was built for.
    pub const fn layout(&self) -> DataLayout {
        self.layout
    }

    /// Size of a machine word, in bits.
    pub const fn word_bits(&self) -> u32 {
        self.word_bits
    }

    /// Location of an argument.
    pub fn location(&self, category: ArgCategory, ordinal: usize) -> Result<&Location> {
        self.table
            .get(&(category, ordinal))
            .ok_or(Error::UnknownArgument { category, ordinal })
    }

    /// Binds argument `ordinal` of type `ty` to its location.
    pub fn arg<P: Process + ?Sized>(&self, process: &P, ty: ArgType, ordinal: usize) -> Result<ArgSlot> {
        let location = self.location(ty.category(), ordinal)?.clone();

        Ok(ArgSlot {
            value: Value::read(process, ty, location, self.layout.endian)?,
        })
    }

    /// Number of bits the return value can hold.
    pub fn return_value_bits(&self) -> Result<u32> {
        self.location(ArgCategory::Integer, 0).map(Location::bits)
    }

    /// Sets the return value of the current function call.
    pub fn set_return_value<P: Process + ?Sized>(&self, process: &mut P, value: u64) -> Result<()> {
        let location = self.location(ArgCategory::Integer, 0)?;
        let data = self.layout.endian.encode(value, location.bits())?;

        location.set(process, self.layout.endian, &data)
    }

    /// Returns from the current function call, assuming the stack pointer
    /// points to the saved return address.
    ///
    /// On success, the return address is returned.
    pub fn do_return<P: Process + ?Sized>(&self, process: &mut P) -> Result<u64> {
        let word = byte_size(self.word_bits)? as u64;

        let sp = process.stack_addr()?;

        let mut buf = vec![0; word as usize];
        process.read_memory(sp, &mut buf)?;

        let ret_addr = self.layout.endian.decode(&buf)?;

        if ret_addr == 0 {
            return Err(Error::InvalidReturnAddress(ret_addr));
        }

        process.set_instr_addr(ret_addr)?;

        let new_sp = match self.layout.stack {
            StackGrowth::Down => sp.wrapping_add(word),
            StackGrowth::Up => sp.wrapping_sub(word),
        };

        process.set_stack_addr(new_sp)?;

        Ok(ret_addr)
    }
}

/// Argument bound to its location.
#[derive(Debug, Clone)]
pub struct ArgSlot {
    value: Value,
}

impl ArgSlot {
    /// Value of the argument when it was bound.
    pub const fn get(&self) -> &Value {
        &self.value
    }

    /// Writes the argument right away.
    pub fn set<P: Process + ?Sized>(&self, process: &mut P, value: u64) -> Result<()> {
        self.value.write(process, value)
    }

    /// Unwraps the bound value.
    pub fn into_value(self) -> Value {
        self.value
    }
}
