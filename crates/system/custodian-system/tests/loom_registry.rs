//! Model-checks handler registration against a concurrent dispatch.
//!
//! Run with `RUSTFLAGS="--cfg loom" cargo test --test loom_registry`.

#![cfg(loom)]

use std::sync::Arc;

use custodian_system::regs::CiaUnit;
use custodian_system::{ChipSource, CiaSource, Context, Handler, HandlerRegistry, InterruptId};

fn handler_a(_: Context) {}
fn handler_b(_: Context) {}

fn ctx(n: usize) -> Context {
    Context::from_ptr(n as *mut u8)
}

/// A dispatch racing the first registration of a slot sees nothing or the
/// complete handler, never the callback without its context.
#[test]
fn fresh_registration_is_all_or_nothing() {
    loom::model(|| {
        let reg = Arc::new(HandlerRegistry::new());
        let id = InterruptId::Chip(ChipSource::Vertb);

        let writer = {
            let reg = Arc::clone(&reg);
            loom::thread::spawn(move || {
                reg.set_handler(id, Some(Handler::new(handler_a, ctx(0xA0))));
            })
        };

        if let Some(h) = reg.handler(id) {
            assert_eq!(h.func() as usize, handler_a as usize);
            assert_eq!(h.context(), ctx(0xA0));
        }

        writer.join().unwrap();
        assert!(reg.is_registered(id));
    });
}

/// Registrations of different sources never leak into each other.
#[test]
fn distinct_ids_are_independent() {
    loom::model(|| {
        let reg = Arc::new(HandlerRegistry::new());
        let a = InterruptId::Cia(CiaUnit::A, CiaSource::Serial);
        let b = InterruptId::Cia(CiaUnit::B, CiaSource::TimerA);

        let writer = {
            let reg = Arc::clone(&reg);
            loom::thread::spawn(move || {
                reg.set_handler(a, Some(Handler::new(handler_a, ctx(1))));
            })
        };
        reg.set_handler(b, Some(Handler::new(handler_b, ctx(2))));

        if let Some(h) = reg.handler(a) {
            assert_eq!(h.context(), ctx(1));
        }
        writer.join().unwrap();

        let (ha, hb) = (reg.handler(a).unwrap(), reg.handler(b).unwrap());
        assert_eq!(ha.func() as usize, handler_a as usize);
        assert_eq!(hb.func() as usize, handler_b as usize);
        assert_eq!((ha.context(), hb.context()), (ctx(1), ctx(2)));
    });
}
