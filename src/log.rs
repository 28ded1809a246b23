//! Logging shim: `defmt` on target, the `log` facade on the host.

#[cfg(feature = "defmt")]
#[allow(unused_imports)]
pub(crate) use defmt::{debug, info, warn};

#[cfg(not(feature = "defmt"))]
#[allow(unused_imports)]
pub(crate) use ::log::{debug, info, warn};
