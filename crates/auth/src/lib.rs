//! `gatehouse-auth`: token-based authentication and authorization core.
//!
//! Transport-agnostic: HTTP adapters implement [`RequestCarrier`], cache
//! backends implement [`KeyValueCache`].

pub mod bitmask;
pub mod cache;
pub mod carrier;
pub mod catalog;
pub mod claims;
pub mod error;
pub mod guard;
pub mod keys;
pub mod lockout;
pub mod memory_cache;
pub mod principal;
pub mod revocation;
pub mod roles;
pub mod token;

#[cfg(test)]
mod test_support;

pub use bitmask::{BITS_PER_GROUP, PermissionBitmask, PermissionId, decode, encode, has_permission};
pub use cache::{CacheError, CacheResult, KeyValueCache, MIN_TTL};
pub use carrier::{DenialBody, RequestCarrier, StaticCarrier, bearer_token};
pub use catalog::{CatalogError, MAX_PERMISSIONS, Permission, PermissionCatalog};
pub use claims::{IdentityClaims, validate_claims};
pub use error::{AuthError, AuthResult};
pub use guard::{AuthorizationGuard, Denial};
pub use keys::{KeyAlgorithm, KeyError, SigningKeys};
pub use lockout::{LockoutError, LockoutPolicy, LoginAttemptCounter};
pub use memory_cache::InMemoryCache;
pub use principal::SubjectId;
pub use revocation::{RevocationFailurePolicy, RevocationStore};
pub use roles::Role;
pub use token::TokenService;
