pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod hostname;
pub mod store;
pub mod types;

pub mod certificate;
pub mod codec;
pub mod overrides;
pub mod pinning;
pub mod validator;
