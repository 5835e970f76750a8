//! Credentials and sessions: bcrypt password hashes, JWT bearer tokens and
//! time-based one-time passwords.

pub mod jwt;
pub mod password;
pub mod totp;

pub use jwt::{Claims, JwtManager};
