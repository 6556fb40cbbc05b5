//! The runtime call boundary. Helpers take and return values representable
//! in the slot ABI; a call stages each argument through its kind's slot
//! member, runs the helper against a set of [`ResultBuffers`], then installs
//! the result into the destination slot.
//!
//! Traps raised by helpers go through a process-global dispatch table so
//! embedders and tests can intercept them.

use std::sync::RwLock;

use hashbrown::HashMap;
use once_cell::sync::Lazy;
use strum::{EnumCount, IntoStaticStr};
use thiserror::Error;
use tracing::{error, trace};

use crate::middle::il::{Extern, TypeKind};

use super::slot::{ResultBuffers, Slot, assign_from_buffer, copy_member, field_of};

pub type RuntimeHandler = fn(&[Slot], &mut ResultBuffers);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSignature {
    pub params: Vec<TypeKind>,
    pub ret: TypeKind,
}

impl RuntimeSignature {
    pub fn new(params: &[TypeKind], ret: TypeKind) -> Self {
        Self {
            params: params.to_vec(),
            ret,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeHelper {
    pub signature: RuntimeSignature,
    pub handler: RuntimeHandler,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("unknown runtime helper `{0}`")]
    UnknownHelper(String),
    #[error("`{name}` expects {expected} argument(s), got {got}")]
    ArityMismatch {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("parameter {index} of `{name}` has type {kind}, which has no slot representation")]
    UnrepresentableParam {
        name: String,
        index: usize,
        kind: TypeKind,
    },
}

#[derive(Debug, Default, Clone)]
pub struct RuntimeRegistry {
    helpers: HashMap<String, RuntimeHelper>,
}

impl RuntimeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the numeric helpers every program may call.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let i64_to_i64 = RuntimeSignature::new(&[TypeKind::I64], TypeKind::I64);
        let f64_to_f64 = RuntimeSignature::new(&[TypeKind::F64], TypeKind::F64);

        registry.register("rt_abs_i64", i64_to_i64, rt_abs_i64);
        registry.register("rt_abs_f64", f64_to_f64.clone(), rt_abs_f64);
        registry.register("rt_sqrt", f64_to_f64, rt_sqrt);
        registry.register(
            "rt_int_to_f64",
            RuntimeSignature::new(&[TypeKind::I64], TypeKind::F64),
            rt_int_to_f64,
        );
        registry
    }

    pub fn register(&mut self, name: &str, signature: RuntimeSignature, handler: RuntimeHandler) {
        self.helpers
            .insert(name.to_owned(), RuntimeHelper { signature, handler });
    }

    pub fn get(&self, name: &str) -> Option<&RuntimeHelper> {
        self.helpers.get(name)
    }

    /// The IL declaration matching a registered helper.
    pub fn extern_decl(&self, name: &str) -> Option<Extern> {
        self.get(name).map(|helper| Extern {
            name: name.to_owned(),
            params: helper.signature.params.clone(),
            ret: helper.signature.ret,
        })
    }

    /// Calls helper `name` with `args`, writing its result into `dest`. A
    /// void helper leaves `dest` untouched.
    pub fn call(&self, name: &str, args: &[Slot], dest: &mut Slot) -> Result<(), RuntimeError> {
        let helper = self
            .get(name)
            .ok_or_else(|| RuntimeError::UnknownHelper(name.to_owned()))?;
        let params = &helper.signature.params;

        if params.len() != args.len() {
            return Err(RuntimeError::ArityMismatch {
                name: name.to_owned(),
                expected: params.len(),
                got: args.len(),
            });
        }

        let mut staged = Vec::with_capacity(args.len());
        for (index, (&kind, arg)) in params.iter().zip(args).enumerate() {
            if field_of(kind).is_none() {
                return Err(RuntimeError::UnrepresentableParam {
                    name: name.to_owned(),
                    index,
                    kind,
                });
            }

            let mut slot = Slot::zeroed();
            copy_member(&mut slot, arg, kind);
            staged.push(slot);
        }

        trace!(helper = name, args = staged.len(), "runtime call");

        let mut buffers = ResultBuffers::default();
        (helper.handler)(&staged, &mut buffers);
        assign_from_buffer(dest, helper.signature.ret, &buffers);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumCount, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum TrapKind {
    DomainError,
    Overflow,
    DivideByZero,
    InvalidOperation,
    Unreachable,
}

impl core::fmt::Display for TrapKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).into())
    }
}

pub type TrapHandler = fn(TrapKind, &str);

static TRAP_HANDLERS: Lazy<RwLock<[TrapHandler; TrapKind::COUNT]>> =
    Lazy::new(|| RwLock::new([default_trap_handler as TrapHandler; TrapKind::COUNT]));

/// Logs the trap and unwinds.
pub fn default_trap_handler(kind: TrapKind, message: &str) {
    error!(%kind, detail = message, "runtime trap");
    panic!("trap ({kind}): {message}");
}

/// Routes every trap kind to `handler`.
pub fn install_trap_handler(handler: TrapHandler) {
    let mut handlers = TRAP_HANDLERS.write().unwrap_or_else(|e| e.into_inner());
    *handlers = [handler; TrapKind::COUNT];
}

/// Routes traps of one kind to `handler`, returning the handler it replaces.
pub fn install_trap_handler_for(kind: TrapKind, handler: TrapHandler) -> TrapHandler {
    let mut handlers = TRAP_HANDLERS.write().unwrap_or_else(|e| e.into_inner());
    std::mem::replace(&mut handlers[kind as usize], handler)
}

/// Dispatches a trap. Returns only if the installed handler does.
pub fn raise_trap(kind: TrapKind, message: &str) {
    let handler = {
        let handlers = TRAP_HANDLERS.read().unwrap_or_else(|e| e.into_inner());
        handlers[kind as usize]
    };
    handler(kind, message);
}

fn arg(args: &[Slot], index: usize) -> Slot {
    args.get(index).copied().unwrap_or_default()
}

fn rt_abs_i64(args: &[Slot], out: &mut ResultBuffers) {
    let value = arg(args, 0).i64();
    out.i64 = match value.checked_abs() {
        Some(abs) => abs,
        None => {
            raise_trap(TrapKind::Overflow, "abs of the most negative integer");
            value
        }
    };
}

fn rt_abs_f64(args: &[Slot], out: &mut ResultBuffers) {
    out.f64 = arg(args, 0).f64().abs();
}

fn rt_sqrt(args: &[Slot], out: &mut ResultBuffers) {
    let value = arg(args, 0).f64();
    if value < 0.0 {
        raise_trap(TrapKind::DomainError, "square root of a negative number");
        out.f64 = f64::NAN;
        return;
    }
    out.f64 = value.sqrt();
}

fn rt_int_to_f64(args: &[Slot], out: &mut ResultBuffers) {
    out.f64 = arg(args, 0).i64() as f64;
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn builtin_calls_marshal_through_slots() {
        let registry = RuntimeRegistry::with_builtins();
        let mut dest = Slot::zeroed();

        registry
            .call("rt_abs_i64", &[Slot::from_i64(-12)], &mut dest)
            .unwrap();
        assert_eq!(dest.i64(), 12);

        registry
            .call("rt_int_to_f64", &[Slot::from_i64(3)], &mut dest)
            .unwrap();
        assert_eq!(dest.f64(), 3.0);

        registry
            .call("rt_sqrt", &[Slot::from_f64(16.0)], &mut dest)
            .unwrap();
        assert_eq!(dest.f64(), 4.0);
    }

    #[test]
    fn call_checks_the_signature() {
        let registry = RuntimeRegistry::with_builtins();
        let mut dest = Slot::zeroed();

        assert_eq!(
            registry.call("rt_missing", &[], &mut dest),
            Err(RuntimeError::UnknownHelper("rt_missing".into()))
        );
        assert!(matches!(
            registry.call("rt_abs_f64", &[], &mut dest),
            Err(RuntimeError::ArityMismatch { expected: 1, got: 0, .. })
        ));

        let mut registry = RuntimeRegistry::new();
        registry.register(
            "rt_bad",
            RuntimeSignature::new(&[TypeKind::Void], TypeKind::Void),
            |_, _| {},
        );
        assert!(matches!(
            registry.call("rt_bad", &[Slot::zeroed()], &mut dest),
            Err(RuntimeError::UnrepresentableParam { index: 0, .. })
        ));
    }

    #[test]
    fn void_helpers_leave_the_destination_alone() {
        let mut registry = RuntimeRegistry::new();
        registry.register("rt_noop", RuntimeSignature::new(&[], TypeKind::Void), |_, out| {
            out.i64 = 55;
        });

        let mut dest = Slot::from_i64(9);
        registry.call("rt_noop", &[], &mut dest).unwrap();
        assert_eq!(dest.i64(), 9);
    }

    #[test]
    fn extern_declarations_follow_signatures() {
        let registry = RuntimeRegistry::with_builtins();
        let decl = registry.extern_decl("rt_sqrt").unwrap();

        assert_eq!(decl.to_string(), "extern @rt_sqrt(f64) -> f64");
    }

    static DOMAIN_TRAPS: AtomicUsize = AtomicUsize::new(0);

    fn count_domain_trap(kind: TrapKind, _message: &str) {
        assert_eq!(kind, TrapKind::DomainError);
        DOMAIN_TRAPS.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn installed_handler_intercepts_traps() {
        let previous = install_trap_handler_for(TrapKind::DomainError, count_domain_trap);

        let registry = RuntimeRegistry::with_builtins();
        let mut dest = Slot::zeroed();
        registry
            .call("rt_sqrt", &[Slot::from_f64(-1.0)], &mut dest)
            .unwrap();

        install_trap_handler_for(TrapKind::DomainError, previous);
        assert_eq!(DOMAIN_TRAPS.load(Ordering::SeqCst), 1);
        assert!(dest.f64().is_nan());
    }

    #[test]
    fn default_handler_panics_with_the_message() {
        let result = std::panic::catch_unwind(|| {
            let registry = RuntimeRegistry::with_builtins();
            let mut dest = Slot::zeroed();
            let _ = registry.call("rt_abs_i64", &[Slot::from_i64(i64::MIN)], &mut dest);
        });

        let payload = result.unwrap_err();
        let message = payload.downcast_ref::<String>().cloned().unwrap_or_default();
        assert!(message.contains("trap (overflow)"), "{message}");
    }
}
