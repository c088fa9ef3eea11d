use std::collections::HashMap;

use super::{BreakpointToken, Instruction, Process, ProcessEvent, ResumeMode};
use crate::error::BackendError;

/// Stopped in-memory process, for unit tests that only need registers,
/// memory and symbols.
#[derive(Default)]
pub(crate) struct FakeProcess {
    pub regs: HashMap<String, u64>,
    pub mem: HashMap<u64, u8>,
    pub symbols: HashMap<String, u64>,
    pub pc: u64,
    pub sp: u64,
    /// End of the mapped memory, reads beyond it fail.
    pub mapped_end: Option<u64>,
}

impl FakeProcess {
    pub fn with_symbol(mut self, name: &str, addr: u64) -> Self {
        self.symbols.insert(name.to_owned(), addr);
        self
    }

    pub fn with_sp(mut self, sp: u64) -> Self {
        self.sp = sp;
        self
    }

    pub fn with_mapped_end(mut self, end: u64) -> Self {
        self.mapped_end = Some(end);
        self
    }

    pub fn with_reg(mut self, name: &str, value: u64) -> Self {
        self.regs.insert(name.to_owned(), value);
        self
    }
}

impl Process for FakeProcess {
    fn pid(&self) -> u64 {
        1
    }

    fn is_alive(&self) -> bool {
        true
    }

    fn entry_point(&self) -> Result<u64, BackendError> {
        Ok(0x1000)
    }

    fn symbol_address(&self, name: &str) -> Result<Option<u64>, BackendError> {
        Ok(self.symbols.get(name).copied())
    }

    fn add_breakpoint(&mut self, addr: u64) -> Result<BreakpointToken, BackendError> {
        Ok(BreakpointToken(addr))
    }

    fn remove_breakpoint(&mut self, _token: BreakpointToken) -> Result<(), BackendError> {
        Ok(())
    }

    fn read_register(&self, name: &str) -> Result<u64, BackendError> {
        self.regs
            .get(name)
            .copied()
            .ok_or_else(|| BackendError::new(format!("no register {name}")))
    }

    fn write_register(&mut self, name: &str, value: u64) -> Result<(), BackendError> {
        self.regs.insert(name.to_owned(), value);
        Ok(())
    }

    fn instr_addr(&self) -> Result<u64, BackendError> {
        Ok(self.pc)
    }

    fn set_instr_addr(&mut self, addr: u64) -> Result<(), BackendError> {
        self.pc = addr;
        Ok(())
    }

    fn stack_addr(&self) -> Result<u64, BackendError> {
        Ok(self.sp)
    }

    fn set_stack_addr(&mut self, addr: u64) -> Result<(), BackendError> {
        self.sp = addr;
        Ok(())
    }

    fn read_memory(&self, addr: u64, buf: &mut [u8]) -> Result<(), BackendError> {
        if let Some(end) = self.mapped_end {
            if addr + buf.len() as u64 > end {
                return Err(BackendError::new(format!("bad address {addr:#x}")));
            }
        }

        for (i, b) in buf.iter_mut().enumerate() {
            *b = self.mem.get(&(addr + i as u64)).copied().unwrap_or(0);
        }
        Ok(())
    }

    fn write_memory(&mut self, addr: u64, buf: &[u8]) -> Result<(), BackendError> {
        for (i, b) in buf.iter().enumerate() {
            self.mem.insert(addr + i as u64, *b);
        }
        Ok(())
    }

    fn resume(&mut self, _mode: ResumeMode) -> Result<(), BackendError> {
        Ok(())
    }

    fn wait_event(&mut self) -> Result<ProcessEvent, BackendError> {
        Ok(ProcessEvent::Exited { exit_code: 0 })
    }

    fn kill(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    fn disassemble(&self, _addr: u64, _count: usize) -> Result<Vec<Instruction>, BackendError> {
        Ok(Vec::new())
    }
}
