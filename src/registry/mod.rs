//! Backend registry: policy plus the live registration set.

pub mod policy;
pub mod registration;
pub mod set;

pub use policy::{BackendPolicy, STATIC_BACKEND};
pub use registration::{Registration, RegistrationOrigin};
pub use set::RegistrationSet;
