/// Options of an address hook.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookOptions {
    /// Registers whose values are passed to the handler, in order.
    pub regset: Vec<String>,

    /// Registers set right after a mockup or skip redirect, in order.
    pub regstate: Vec<(String, u64)>,
}

impl HookOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Passes the value of the given registers to the handler.
    pub fn regset<I, S>(mut self, regs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.regset.extend(regs.into_iter().map(Into::into));
        self
    }

    /// Sets register `reg` to `value` after redirecting.
    pub fn regstate(mut self, reg: impl Into<String>, value: u64) -> Self {
        self.regstate.push((reg.into(), value));
        self
    }
}
