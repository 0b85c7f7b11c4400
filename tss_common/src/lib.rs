mod helpers;
mod minor_units;

pub mod op;
mod secret;

pub use helpers::{mask_sensitive, parse_boolean_flag};
pub use minor_units::{MinorUnits, MinorUnitsConversionError, GBP_CURRENCY_CODE, GBP_CURRENCY_CODE_LOWER};
pub use secret::Secret;
