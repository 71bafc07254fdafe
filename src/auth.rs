//! Client identity, assertion signing, and the shared bearer-token cache.

pub mod assertion;
pub mod credential;
pub mod id;
pub mod provider;
pub mod token;

pub use assertion::*;
pub use credential::*;
pub use id::*;
pub use provider::*;
pub use token::*;
