//! Authentication facade over the OIDC session client

pub mod service;

pub use service::AuthService;
