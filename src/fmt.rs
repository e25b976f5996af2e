#![allow(unused_macros)]
#![allow(unused_imports)]

// Forwards to `defmt` when enabled; otherwise only borrows the arguments so that
// call sites compile identically with and without logging.
macro_rules! emit {
    ($level:ident, $s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "defmt")]
            ::defmt::$level!($s $(, $x)*);
            #[cfg(not(feature = "defmt"))]
            let _ = ($( & $x ),*);
        }
    };
}

macro_rules! trace {
    ($($arg:tt)*) => { $crate::fmt::emit!(trace, $($arg)*) };
}

macro_rules! debug {
    ($($arg:tt)*) => { $crate::fmt::emit!(debug, $($arg)*) };
}

macro_rules! info {
    ($($arg:tt)*) => { $crate::fmt::emit!(info, $($arg)*) };
}

// `warn` itself would clash with the built-in attribute
macro_rules! warn_ {
    ($($arg:tt)*) => { $crate::fmt::emit!(warn, $($arg)*) };
}

macro_rules! error {
    ($($arg:tt)*) => { $crate::fmt::emit!(error, $($arg)*) };
}

pub(crate) use debug;
pub(crate) use emit;
pub(crate) use error;
pub(crate) use info;
pub(crate) use trace;
pub(crate) use warn_ as warn;
