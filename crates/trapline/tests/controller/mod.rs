use std::sync::{Arc, Mutex};

use test_log::test;
use trapline::abi::{ArgType, ConventionKind};
use trapline::controller::{ExecutionController, ProcessState, RunStatus, StepMode};
use trapline::session::{Event, Handle, HookOptions, Session};
use trapline::{Addr, Error};

use crate::common::{self, MockBackend, Op, Program};

#[test]
fn mockup_redirects() {
    let backend = MockBackend::new(common::redirect_program());
    let stats = backend.stats();
    let mut controller = ExecutionController::new(backend);

    let mut session = Session::new("mock");

    let regsets = common::log();
    let r12 = common::log();

    let rs = regsets.clone();
    session
        .mockup(
            0x1000u64,
            0x1010u64,
            HookOptions::new().regset(["rax"]).regstate("r12", 0xdead),
            move |_, regs| {
                rs.lock().unwrap().push(regs.to_vec());
                Ok(())
            },
        )
        .unwrap();

    let r = r12.clone();
    session.on(Event::Exit, move |host, _| {
        r.lock().unwrap().push(host.reg("r12")?);
        Ok(())
    });

    let status = controller.run(&mut session).unwrap();

    assert_eq!(status, RunStatus::Terminated { exit_code: Some(0) });
    assert_eq!(common::take(&regsets), [vec![7]]);
    assert_eq!(common::take(&r12), [0xdead]);

    // body of the mocked function never ran
    let stats = stats.lock().unwrap();
    assert!(!stats.executed.contains(&0x1000));
    assert_eq!(controller.process_state(), ProcessState::NoProcess);
    assert_eq!(session.hit_count(0x1000), 1);
}

#[test]
fn mockup_beats_skip() {
    let mut controller = ExecutionController::new(MockBackend::new(common::redirect_program()));
    let mut session = Session::new("mock");

    let calls = common::log();

    session
        .skip(0x1000u64, 0x100cu64, HookOptions::new())
        .unwrap();

    let c = calls.clone();
    session
        .mockup(0x1000u64, 0x1010u64, HookOptions::new(), move |_, _| {
            c.lock().unwrap().push("mockup");
            Ok(())
        })
        .unwrap();

    let status = controller.run(&mut session).unwrap();

    assert_eq!(status, RunStatus::Terminated { exit_code: Some(0) });
    assert_eq!(common::take(&calls), ["mockup"]);
}

#[test]
fn skip_sets_registers() {
    let mut controller = ExecutionController::new(MockBackend::new(common::redirect_program()));
    let mut session = Session::new("mock");

    session
        .skip(0x1000u64, 0x100cu64, HookOptions::new().regstate("rbx", 5))
        .unwrap();

    let rbx = common::log();
    let r = rbx.clone();
    session.on(Event::Exit, move |host, _| {
        r.lock().unwrap().push(host.reg("rbx")?);
        Ok(())
    });

    let status = controller.run(&mut session).unwrap();

    assert_eq!(status, RunStatus::Terminated { exit_code: Some(1) });
    assert_eq!(common::take(&rbx), [5]);
}

#[test]
fn dispatch_order() {
    let program = common::redirect_program().symbol("mocked", 0x1000);
    let mut controller = ExecutionController::new(MockBackend::new(program));

    let mut session = Session::new("mock");
    session.use_convention(ConventionKind::Amd64).unwrap();

    let order = common::log();

    let o = order.clone();
    session
        .mockup("mocked", "mocked+0x10", HookOptions::new(), move |_, _| {
            o.lock().unwrap().push("mockup");
            Ok(())
        })
        .unwrap();

    let o = order.clone();
    session
        .at_function(0x1000u64, &[], HookOptions::new(), move |_, _, _, _| {
            o.lock().unwrap().push("function");
            Ok(())
        })
        .unwrap();

    for name in ["addr-1", "addr-2"] {
        let o = order.clone();
        session
            .at(Addr::symbol("mocked", 0), HookOptions::new(), move |_, _| {
                o.lock().unwrap().push(name);
                Ok(())
            })
            .unwrap();
    }

    let o = order.clone();
    session.on(Event::Entry, move |_, _| {
        o.lock().unwrap().push("entry");
        Ok(())
    });

    controller.run(&mut session).unwrap();

    assert_eq!(
        common::take(&order),
        ["entry", "addr-1", "addr-2", "function", "mockup"]
    );
}

#[test]
fn function_marshaling() {
    let mut controller = ExecutionController::new(MockBackend::new(common::call_program()));

    let mut session = Session::new("mock");
    session.use_convention(ConventionKind::Amd64).unwrap();

    let calls = common::log();

    let c = calls.clone();
    session
        .at_function(
            "target_fn",
            &[ArgType::U64, ArgType::U32, ArgType::I8],
            HookOptions::new(),
            move |host, ctx, hits, args| {
                let args = args.iter().map(|a| a.as_u64()).collect::<Vec<_>>();
                c.lock().unwrap().push((ctx.addr(), hits, args));

                ctx.set_return_value(host, 42)?;
                ctx.do_return(host)
            },
        )
        .unwrap();

    let rax = common::log();
    let r = rax.clone();
    session.on(Event::Exit, move |host, _| {
        r.lock().unwrap().push(host.reg("rax")?);
        Ok(())
    });

    let status = controller.run(&mut session).unwrap();

    // simulated return skipped the function's body
    assert_eq!(status, RunStatus::Terminated { exit_code: Some(0) });
    assert_eq!(common::take(&calls), [(0x2000, 0, vec![1, 2, 3])]);
    assert_eq!(common::take(&rax), [42]);
}

#[test]
fn function_needs_convention() {
    let mut controller = ExecutionController::new(MockBackend::new(common::call_program()));

    let mut session = Session::new("mock");
    session
        .at_function("target_fn", &[], HookOptions::new(), |_, _, _, _| Ok(()))
        .unwrap();

    assert!(matches!(
        controller.run(&mut session),
        Err(Error::Configuration(_))
    ));
}

#[test]
fn deferred_fifo() {
    let program = Program::new(0x100).at(0x100, [Op::Nop, Op::Exit(0)]);
    let mut controller = ExecutionController::new(MockBackend::new(program));

    let mut session = Session::new("mock");
    let order = common::log();

    let o = order.clone();
    session.on(Event::Entry, move |host, _| {
        for i in 1..=3 {
            let o = o.clone();
            host.with_inferior(move |host| {
                o.lock().unwrap().push(format!("deferred-{i}"));

                let process = host.process_mut()?;
                let rax = process.read_register("rax")?;
                process.write_register("rax", rax * 10 + i)?;
                Ok(())
            })?;
        }

        o.lock().unwrap().push("handler".to_owned());
        Ok(())
    });

    let rax = common::log();
    let r = rax.clone();
    session.on(Event::Exit, move |host, _| {
        r.lock().unwrap().push(host.reg("rax")?);
        Ok(())
    });

    controller.run(&mut session).unwrap();

    assert_eq!(
        common::take(&order),
        ["handler", "deferred-1", "deferred-2", "deferred-3"]
    );
    assert_eq!(common::take(&rax), [123]);
}

#[test]
fn mutation_outside_stop_context() {
    let program = Program::new(0x100).at(0x100, [Op::Nop, Op::Exit(0)]);
    let mut controller = ExecutionController::new(MockBackend::new(program));

    let mut session = Session::new("mock");
    let errors = common::log();

    let e = errors.clone();
    session.on(Event::Entry, move |host, _| {
        let unsafe_mutation = matches!(host.process_mut(), Err(Error::UnsafeMutation));
        e.lock().unwrap().push(unsafe_mutation);
        Ok(())
    });

    controller.run(&mut session).unwrap();

    assert_eq!(common::take(&errors), [true]);
}

#[test]
fn inferior_without_process() {
    let program = Program::new(0x100).at(0x100, [Op::Exit(0)]);
    let mut controller = ExecutionController::new(MockBackend::new(program));

    assert!(matches!(
        controller.with_inferior(|_| Ok(())),
        Err(Error::NoProcess)
    ));

    let mut session = Session::new("mock");
    let errors = common::log();

    let e = errors.clone();
    session.on(Event::Run, move |host, _| {
        assert!(!host.has_process());

        let no_process = matches!(host.with_inferior(|_| Ok(())), Err(Error::NoProcess));
        e.lock().unwrap().push(no_process);
        Ok(())
    });

    controller.run(&mut session).unwrap();

    assert_eq!(common::take(&errors), [true]);
}

#[test]
fn signal_dispatch() {
    let program = Program::new(0x100).at(
        0x100,
        [
            Op::Raise("SIGUSR1"),
            Op::Raise("SIGNOPE"),
            Op::Raise("SIGTERM"),
            Op::Exit(0),
        ],
    );
    let mut controller = ExecutionController::new(MockBackend::new(program));

    let mut session = Session::new("mock");
    let signals = common::log();

    for event in [
        Event::signal("SIGUSR1"),
        Event::SignalUnknown,
        Event::SignalDefault,
    ] {
        let s = signals.clone();
        let key = event.to_string();

        session.on(event, move |_, event| {
            s.lock().unwrap().push(format!("{key}: {event}"));
            Ok(())
        });
    }

    let status = controller.run(&mut session).unwrap();

    assert_eq!(status, RunStatus::Terminated { exit_code: Some(0) });
    assert_eq!(
        common::take(&signals),
        [
            "SIGUSR1: SIGUSR1",
            "signal-unknown: signal-unknown",
            "signal-default: SIGTERM",
        ]
    );
}

#[test]
fn unhandled_signal_suspends() {
    let program = Program::new(0x100).at(0x100, [Op::Raise("SIGUSR2"), Op::Exit(3)]);
    let mut controller = ExecutionController::new(MockBackend::new(program));

    let mut session = Session::new("mock");

    assert_eq!(controller.run(&mut session).unwrap(), RunStatus::Suspended);
    assert_eq!(controller.process_state(), ProcessState::Stopped);

    assert_eq!(
        controller.continue_loop(&mut session).unwrap(),
        RunStatus::Terminated { exit_code: Some(3) }
    );
    assert_eq!(controller.exit_code(), Some(3));
}

#[test]
fn handler_self_removal() {
    let program = Program::new(0x100).at(0x100, [Op::Nop, Op::Nop, Op::Exit(0)]);
    let mut controller = ExecutionController::new(MockBackend::new(program));

    let mut session = Session::new("mock");

    let starts = common::log();
    let handle = Arc::new(Mutex::new(None::<Handle>));

    let (s, h) = (starts.clone(), handle.clone());
    let own = session.on(Event::Start, move |host, _| {
        s.lock().unwrap().push("once");

        if let Some(handle) = h.lock().unwrap().take() {
            assert!(host.session_mut().remove(&handle));
            assert!(!host.session_mut().remove(&handle));
        }
        Ok(())
    });
    *handle.lock().unwrap() = Some(own.clone());

    let s = starts.clone();
    session.on(Event::Start, move |_, _| {
        s.lock().unwrap().push("always");
        Ok(())
    });

    session
        .at(0x104u64, HookOptions::new(), |_, _| Ok(()))
        .unwrap();

    controller.run(&mut session).unwrap();

    // one start per resume: entry, 0x104, exit
    assert_eq!(
        common::take(&starts),
        ["once", "always", "always", "always"]
    );
    assert!(!session.remove(&own));
}

#[test]
fn step_events() {
    let program = Program::new(0x100).at(
        0x100,
        [Op::Nop, Op::Jump(0x108), Op::Jump(0x108), Op::Exit(0)],
    );
    let mut controller = ExecutionController::new(MockBackend::new(program));

    let mut session = Session::new("mock");

    session.on(Event::Entry, |host, _| {
        assert_eq!(host.step_mode(), StepMode::Off);
        host.enter_step_into_mode();
        Ok(())
    });

    let steps = common::log();
    let s = steps.clone();
    session.on(Event::Step, move |host, _| {
        s.lock().unwrap().push(host.pc()?);
        Ok(())
    });

    // the inferior spins at 0x108, move it forward on the second pass
    let spins = Arc::new(Mutex::new(0));
    session.on(Event::Start, move |host, _| {
        if host.pc()? == 0x108 {
            let mut spins = spins.lock().unwrap();
            *spins += 1;

            if *spins == 2 {
                host.with_inferior(|host| Ok(host.process_mut()?.set_instr_addr(0x10c)?))?;
            }
        }
        Ok(())
    });

    controller.run(&mut session).unwrap();

    assert_eq!(common::take(&steps), [0x104, 0x108]);
}

#[test]
fn step_over_calls() {
    let program = Program::new(0x100)
        .at(0x100, [Op::Call(0x200), Op::Exit(0)])
        .at(0x200, [Op::Nop, Op::Ret]);
    let mut controller = ExecutionController::new(MockBackend::new(program));

    let mut session = Session::new("mock");

    let listing = common::log();
    let l = listing.clone();
    session.on(Event::Entry, move |host, _| {
        let insns = host.disassemble(0x100, 2)?;
        l.lock()
            .unwrap()
            .extend(insns.into_iter().map(|insn| insn.addr));

        host.enter_step_over_mode();
        Ok(())
    });

    let steps = common::log();
    let s = steps.clone();
    session.on(Event::Step, move |host, _| {
        s.lock().unwrap().push(host.pc()?);
        Ok(())
    });

    let status = controller.run(&mut session).unwrap();

    assert_eq!(status, RunStatus::Terminated { exit_code: Some(0) });
    assert_eq!(common::take(&listing), [0x100, 0x104]);
    assert_eq!(common::take(&steps), [0x104]);
}

#[test]
fn stop_flag_aborts() {
    let program = Program::new(0x100).at(0x100, [Op::Nop, Op::Nop, Op::Exit(0)]);
    let backend = MockBackend::new(program);
    let stats = backend.stats();
    let mut controller = ExecutionController::new(backend);

    let mut session = Session::new("mock");

    let hook = session
        .at(0x104u64, HookOptions::new(), |host, _| {
            host.set_flag("seen");
            host.set_flag_stop();
            Ok(())
        })
        .unwrap();

    let post = common::log();
    let p = post.clone();
    session.on(Event::InferiorPost, move |host, _| {
        p.lock().unwrap().push(host.flag("seen"));
        Ok(())
    });

    let status = controller.run(&mut session).unwrap();

    assert_eq!(status, RunStatus::Terminated { exit_code: None });
    assert_eq!(common::take(&post), [true]);
    assert_eq!(stats.lock().unwrap().kills, 1);
    assert!(stats.lock().unwrap().breakpoints.is_empty());

    // flags are cleared by the next run
    assert!(session.flags().stop());
    assert!(session.remove(&hook));

    assert_eq!(
        controller.run(&mut session).unwrap(),
        RunStatus::Terminated { exit_code: Some(0) }
    );
    assert!(!session.flags().stop());
    assert_eq!(common::take(&post), [true, false]);
}

#[test]
fn handler_failure_aborts() {
    let program = Program::new(0x100).at(0x100, [Op::Nop, Op::Exit(0)]);
    let backend = MockBackend::new(program);
    let stats = backend.stats();
    let mut controller = ExecutionController::new(backend);

    let mut session = Session::new("mock");

    let events = common::log();

    let e = events.clone();
    session.on(Event::Entry, move |host, _| {
        let e = e.clone();
        host.with_inferior(move |_| {
            e.lock().unwrap().push("deferred");
            Ok(())
        })?;

        Err(Error::script("boom"))
    });

    let e = events.clone();
    session.on(Event::InferiorPost, move |_, _| {
        e.lock().unwrap().push("post");
        Ok(())
    });

    assert!(matches!(controller.run(&mut session), Err(Error::Script(_))));

    assert!(common::take(&events).is_empty());
    assert_eq!(stats.lock().unwrap().kills, 1);
    assert_eq!(controller.process_state(), ProcessState::NoProcess);
}

#[test]
fn unresolved_symbol_is_fatal() {
    let backend = MockBackend::new(common::call_program());
    let stats = backend.stats();
    let mut controller = ExecutionController::new(backend);

    let mut session = Session::new("mock");
    session
        .at("missing_fn+0x4", HookOptions::new(), |_, _| Ok(()))
        .unwrap();

    assert!(matches!(
        controller.run(&mut session),
        Err(Error::SymbolNotFound(name)) if name == "missing_fn"
    ));
    assert_eq!(stats.lock().unwrap().kills, 1);
    assert_eq!(controller.process_state(), ProcessState::NoProcess);

    // the controller is reusable
    let mut session = Session::new("mock");
    session.use_convention(ConventionKind::Amd64).unwrap();
    session
        .at_function("target_fn", &[], HookOptions::new(), |host, ctx, _, _| {
            ctx.do_return(host)
        })
        .unwrap();

    assert_eq!(
        controller.run(&mut session).unwrap(),
        RunStatus::Terminated { exit_code: Some(0) }
    );
}

#[test]
fn abort_despite_breakpoint_removal_failure() {
    let program = Program::new(0x100).at(0x100, [Op::Nop, Op::Exit(0)]);
    let backend = MockBackend::new(program).sticky_breakpoints();
    let stats = backend.stats();
    let mut controller = ExecutionController::new(backend);

    let mut session = Session::new("mock");
    let failing = session.on(Event::Entry, |_, _| Err(Error::script("boom")));

    assert!(matches!(controller.run(&mut session), Err(Error::Script(_))));
    assert_eq!(stats.lock().unwrap().kills, 1);
    assert_eq!(controller.process_state(), ProcessState::NoProcess);

    // the next run starts from a clean breakpoint map
    session.remove(&failing);
    assert_eq!(
        controller.run(&mut session).unwrap(),
        RunStatus::Terminated { exit_code: Some(0) }
    );
    assert_eq!(stats.lock().unwrap().launches, 2);
}

#[test]
fn symbol_unresolved_at_dispatch() {
    let program = Program::new(0x100).at(0x100, [Op::Nop, Op::Exit(3)]);
    let mut controller = ExecutionController::new(MockBackend::new(program));

    let hits = common::log();

    let mut session = Session::new("mock");

    // hooks a library function that is never loaded
    session.on(Event::Entry, |host, _| {
        host.session_mut()
            .at("late_lib_fn", HookOptions::new(), |_, _| Ok(()))?;
        Ok(())
    });

    let h = hits.clone();
    session
        .at(0x104, HookOptions::new(), move |host, _| {
            h.lock().unwrap().push(host.pc()?);
            Ok(())
        })
        .unwrap();

    assert_eq!(
        controller.run(&mut session).unwrap(),
        RunStatus::Terminated { exit_code: Some(3) }
    );
    assert_eq!(common::take(&hits), [0x104]);
}

#[test]
fn launch_failure() {
    let backend = MockBackend::new(common::call_program()).failing();
    let mut controller = ExecutionController::new(backend);

    let mut session = Session::new("/no/such/target");

    assert!(matches!(
        controller.run(&mut session),
        Err(Error::Launch(path, _)) if path.to_str() == Some("/no/such/target")
    ));
    assert_eq!(controller.process_state(), ProcessState::NoProcess);
}

#[test]
fn invalid_address_rejected() {
    let mut session = Session::new("mock");

    assert!(matches!(
        session.at("not a symbol", HookOptions::new(), |_, _| Ok(())),
        Err(Error::Configuration(_))
    ));
    assert!(matches!(
        session.skip(-4i64, 0u64, HookOptions::new()),
        Err(Error::Configuration(_))
    ));
}
