//! The VM side of the IL: how values are laid out in interpreter slots and
//! how calls into native runtime helpers are marshalled.

pub mod runtime;
pub mod slot;
