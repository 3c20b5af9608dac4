pub mod auth;

pub use auth::{JwtKeys, LinkedClient, Principal, StaffCapability, StaffUser};
