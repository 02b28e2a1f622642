pub mod claims;
pub mod config;
pub mod denylist;
pub mod error;
pub mod extractors;
pub mod issuer;
pub mod keys;
pub mod roles;
pub mod verifier;

pub use claims::{Claims, TokenSubject};
pub use config::JwtConfig;
pub use denylist::TokenDenylist;
pub use error::{AuthError, AuthResult};
pub use extractors::bearer_token;
pub use issuer::{IssuedToken, TokenIssuer};
pub use keys::SigningKey;
pub use roles::{Role, UnknownRole};
pub use verifier::TokenValidator;
