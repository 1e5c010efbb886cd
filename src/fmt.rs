//! Internal logging that follows the active profile: `tracing` on hosts,
//! `defmt` on embedded targets, compiled out when neither is enabled.

#![allow(unused_macros, unused_imports)]

macro_rules! trace {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(feature = "std")]
        ::tracing::trace!($s $(, $x)*);
        #[cfg(all(feature = "defmt", not(feature = "std")))]
        ::defmt::trace!($s $(, $x)*);
        #[cfg(not(any(feature = "std", feature = "defmt")))]
        let _ = ($( & $x ),*);
    }};
}

macro_rules! debug {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(feature = "std")]
        ::tracing::debug!($s $(, $x)*);
        #[cfg(all(feature = "defmt", not(feature = "std")))]
        ::defmt::debug!($s $(, $x)*);
        #[cfg(not(any(feature = "std", feature = "defmt")))]
        let _ = ($( & $x ),*);
    }};
}

macro_rules! warning {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(feature = "std")]
        ::tracing::warn!($s $(, $x)*);
        #[cfg(all(feature = "defmt", not(feature = "std")))]
        ::defmt::warn!($s $(, $x)*);
        #[cfg(not(any(feature = "std", feature = "defmt")))]
        let _ = ($( & $x ),*);
    }};
}

pub(crate) use {debug, trace, warning};
