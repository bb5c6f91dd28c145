//! Authentication collaborators, narrowed to the pure contracts the
//! realtime core consumes: an API-key validator gating the handshake and
//! a token validator turning a JWT into a [`Claims`] snapshot. The real
//! authentication service (user/session management, token issuance)
//! lives outside this subsystem.

mod api_key;
mod token;

pub use api_key::{ApiKeyValidator, StaticApiKeyValidator};
pub use token::{AuthnError, JwtTokenValidator, TokenValidator};
