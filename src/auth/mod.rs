mod claims;
pub mod services;

pub use claims::{Capability, Claims};
pub use services::{JwtKeys, Patient};
