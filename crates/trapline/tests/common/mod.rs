#![allow(dead_code)]


use std::sync::{Arc, Mutex};

pub use self::mock::{INSN, MockBackend, Op, Program, Stats};

/// Records shared between a test and its handlers.
pub type Log<T> = Arc<Mutex<Vec<T>>>;

pub fn log<T>() -> Log<T> {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn take<T: Clone>(log: &Log<T>) -> Vec<T> {
    log.lock().unwrap().clone()
}

/// Program jumping from its entry point to a function at `0x1000`, whose
/// body exits with code 1. The instruction at `0x1010` exits with code 0.
pub fn redirect_program() -> Program {
    Program::new(0x100)
        .at(0x100, [Op::Jump(0x1000)])
        .at(
            0x1000,
            [Op::Set("rax", 1), Op::Nop, Op::Nop, Op::Exit(1), Op::Exit(0)],
        )
        .reg("rax", 7)
}

/// Program calling `target_fn` (at `0x2000`) once, with arguments 1, 2
/// and 3, then exiting with code 0. The body of `target_fn` exits with
/// code 9.
pub fn call_program() -> Program {
    Program::new(0x100)
        .at(0x100, [Op::Call(0x2000), Op::Exit(0)])
        .at(0x2000, [Op::Exit(9)])
        .symbol("target_fn", 0x2000)
        .reg("rdi", 1)
        .reg("rsi", 2)
        .reg("rdx", 3)
}
