//! Fatal internal errors.
//!
//! The core trusts the upstream type checker: on a program that passed name
//! resolution and type checking, lowering cannot fail. Everything that would
//! contradict that assumption (an unresolved layout entry, a use of a struct
//! whose shape has not been computed, an operand of an impossible type) is an
//! internal compiler error and aborts immediately. Generated-program runtime
//! failures are never errors inside the compiler; they are compiled into
//! branch-and-halt sequences.

/// Aborts compilation with an internal-compiler-error diagnostic.
///
/// Takes `format!`-style arguments describing the offending entity.
#[macro_export]
macro_rules! ice {
    ($($arg:tt)*) => {
        panic!("internal compiler error: {}", format_args!($($arg)*))
    };
}
