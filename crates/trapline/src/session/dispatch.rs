use std::sync::Arc;

use super::Event;
use super::host::Host;
use super::options::HookOptions;
use super::registry::lock;
use crate::abi::{ArgType, Convention, Value};
use crate::addr::Addr;
use crate::backend::Process;
use crate::error::{Error, Result};

/// Context of an intercepted function call.
#[derive(Debug, Clone)]
pub struct CallContext {
    addr: u64,
    convention: Arc<Convention>,
    ret: Value,
}

impl CallContext {
    fn marshal<P: Process + ?Sized>(
        process: &P,
        addr: u64,
        convention: Arc<Convention>,
        types: &[ArgType],
    ) -> Result<(Self, Vec<Value>)> {
        let ret_ty = ArgType::Int {
            bits: convention.return_value_bits()?,
            signed: false,
        };
        let ret = convention.arg(process, ret_ty, 0)?.into_value();

        let args = types
            .iter()
            .enumerate()
            .map(|(i, ty)| Ok(convention.arg(process, *ty, i + 1)?.into_value()))
            .collect::<Result<Vec<_>>>()?;

        Ok((
            Self {
                addr,
                convention,
                ret,
            },
            args,
        ))
    }

    /// Address of the intercepted function.
    pub const fn addr(&self) -> u64 {
        self.addr
    }

    /// Calling convention the arguments were marshaled with.
    pub fn convention(&self) -> &Convention {
        &self.convention
    }

    /// Return-value slot, as it was when the function was entered.
    pub const fn return_slot(&self) -> &Value {
        &self.ret
    }

    /// Schedules setting the function's return value.
    pub fn set_return_value(&self, host: &mut Host<'_>, value: u64) -> Result<()> {
        let convention = self.convention.clone();
        host.with_inferior(move |host| convention.set_return_value(host.process_mut()?, value))
    }

    /// Schedules returning from the function to its caller, without
    /// executing it.
    pub fn do_return(&self, host: &mut Host<'_>) -> Result<()> {
        let convention = self.convention.clone();
        host.with_inferior(move |host| {
            let ret_addr = convention.do_return(host.process_mut()?)?;
            tracing::debug!(ret_addr = format_args!("{ret_addr:#x}"), "simulated return");
            Ok(())
        })
    }
}

impl Host<'_> {
    /// Dispatches a lifecycle event, returning whether any handler fired.
    pub(crate) fn notify_event(&mut self, event: &Event) -> Result<bool> {
        match event {
            Event::InferiorPre => self.session.iteration += 1,
            Event::InferiorPost => {
                let limit = self.session.limit();
                if limit > 0 && self.session.iteration >= limit {
                    tracing::info!(iteration = self.session.iteration, "session finished");
                    self.session.finished = true;
                }
            }
            _ => (),
        }

        self.invoke_event_handlers(event, event)
    }

    /// Dispatches a signal stop, returning whether any handler fired.
    ///
    /// Signals unknown to the platform are dispatched as
    /// [Event::SignalUnknown], and unhandled signals fall back to
    /// [Event::SignalDefault].
    pub(crate) fn notify_signal(&mut self, name: &str) -> Result<bool> {
        let event = if crate::signal::is_known(name) {
            Event::signal(name)
        } else {
            Event::SignalUnknown
        };

        if self.invoke_event_handlers(&event, &event)? {
            return Ok(true);
        }

        self.invoke_event_handlers(&Event::SignalDefault, &Event::signal(name))
    }

    fn invoke_event_handlers(&mut self, key: &Event, event: &Event) -> Result<bool> {
        let handlers = self.session.registry.event_handlers(key);

        tracing::debug!(event = %key, handlers = handlers.len(), "dispatch event");

        for handler in &handlers {
            (*lock(handler))(self, event)?;
        }

        Ok(!handlers.is_empty())
    }

    /// Dispatches a stop at `pc`, returning whether any hook fired.
    ///
    /// Address hooks fire first, then function hooks, then either the
    /// mockup or the skip registered at `pc`.
    pub(crate) fn notify_addr(&mut self, pc: u64) -> Result<bool> {
        let matches = self.session.registry.matching(self.process()?, pc)?;

        let mut handled = false;

        for hook in &matches.addrs {
            let regs = self.regset(&hook.options)?;
            (*lock(&hook.handler))(self, &regs)?;
            handled = true;
        }

        if !matches.functions.is_empty() {
            let convention = self.session.convention().cloned().ok_or_else(|| {
                Error::Configuration("a calling convention is needed by function hooks".into())
            })?;

            let hits = self.session.registry.hit_count(pc);

            for hook in &matches.functions {
                let (ctx, args) =
                    CallContext::marshal(self.process()?, pc, convention.clone(), &hook.args)?;

                (*lock(&hook.handler))(self, &ctx, hits, &args)?;
                handled = true;
            }
        }

        if let Some(mockup) = &matches.mockup {
            let regs = self.regset(&mockup.options)?;
            (*lock(&mockup.handler))(self, &regs)?;

            self.jump(mockup.jump.clone(), &mockup.options)?;
            handled = true;
        } else if let Some(skip) = &matches.skip {
            self.jump(skip.jump.clone(), &skip.options)?;
            handled = true;
        }

        self.session.registry.record_hit(pc);

        tracing::debug!(pc = format_args!("{pc:#x}"), handled, "dispatch address");

        Ok(handled)
    }

    fn regset(&self, options: &HookOptions) -> Result<Vec<u64>> {
        options.regset.iter().map(|reg| self.reg(reg)).collect()
    }

    fn jump(&mut self, target: Addr, options: &HookOptions) -> Result<()> {
        let regstate = options.regstate.clone();

        self.with_inferior(move |host| {
            let process = host.process_mut()?;

            let addr = target.value(&*process)?;
            tracing::debug!(addr = format_args!("{addr:#x}"), "redirect");

            process.set_instr_addr(addr)?;

            for (reg, value) in &regstate {
                process.write_register(reg, *value)?;
            }

            Ok(())
        })
    }
}
