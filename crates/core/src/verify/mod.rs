pub mod cross_field;
pub mod field;

pub use cross_field::{CrossFieldError, CrossFieldInput, CrossFieldRule, CrossFieldVerifier};
pub use field::{parse_request_date, FieldVerifier, VerificationRule, VerifierSet};
