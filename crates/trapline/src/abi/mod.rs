mod convention;
mod endian;
mod location;
mod value;

pub use self::convention::{ArgCategory, ArgSlot, Convention, ConventionKind};
pub use self::endian::Endian;
pub use self::location::Location;
pub use self::value::{ArgType, Value};

/// Direction in which the inferior's stack grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, knus::DecodeScalar)]
pub enum StackGrowth {
    /// Pushing decrements the stack pointer.
    #[default]
    Down,

    /// Pushing increments the stack pointer.
    Up,
}

/// Data layout of the inferior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataLayout {
    /// Byte order.
    pub endian: Endian,

    /// Stack growth direction.
    pub stack: StackGrowth,
}

impl DataLayout {
    /// Creates a data layout.
    pub const fn new(endian: Endian, stack: StackGrowth) -> Self {
        Self { endian, stack }
    }
}
