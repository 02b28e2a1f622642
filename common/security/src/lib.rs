pub mod context;
pub mod policy;
pub mod routes;

pub use context::{
    AuthenticatedIdentity, CurrentIdentity, IdentityContext, MaybeIdentity, RequireAdmin,
};
pub use policy::{ensure_role, AccessPolicy, AccessRule, Requirement};
pub use routes::{path_matches, RouteTable};
