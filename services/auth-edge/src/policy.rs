//! Route access policy.
//!
//! Every route resolves to exactly one [`RouteAccess`] through an explicit
//! prefix table with an auditable default. Nothing is implicitly public.

use crate::error::AuthEdgeError;
use crate::jwt::RemoteTokenVerifier;
use async_trait::async_trait;
use auth_common::AccessClaims;
use tracing::{debug, instrument};

/// Access requirement of a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteAccess {
    /// No token required; any presented token is ignored
    Public,
    /// A valid access token is required
    Authenticated,
    /// A valid access token with this exact role is required
    Role(String),
}

/// Something that turns a bearer token into verified claims.
#[async_trait]
pub trait BearerVerifier: Send + Sync {
    /// Verify `token`.
    async fn verify_bearer(&self, token: &str) -> Result<AccessClaims, AuthEdgeError>;
}

#[async_trait]
impl BearerVerifier for RemoteTokenVerifier {
    async fn verify_bearer(&self, token: &str) -> Result<AccessClaims, AuthEdgeError> {
        self.verify(token).await
    }
}

/// Extract the token from an `Authorization` header value.
///
/// The scheme is matched case-insensitively.
///
/// # Errors
///
/// [`AuthEdgeError::TokenMissing`] for an empty token, and
/// [`AuthEdgeError::Unauthorized`] for any scheme other than `Bearer`.
pub fn bearer_token(header: &str) -> Result<&str, AuthEdgeError> {
    let header = header.trim();
    let (scheme, token) = header.split_once(' ').unwrap_or((header, ""));
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthEdgeError::unauthorized("unsupported authorization scheme"));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthEdgeError::TokenMissing);
    }
    Ok(token)
}

/// Route table mapping path prefixes to access requirements.
#[derive(Debug, Clone)]
pub struct RoutePolicy {
    routes: Vec<(String, RouteAccess)>,
    default: RouteAccess,
}

impl Default for RoutePolicy {
    fn default() -> Self {
        Self::new(RouteAccess::Authenticated)
    }
}

impl RoutePolicy {
    /// Create a policy whose unmatched routes get `default`.
    #[must_use]
    pub const fn new(default: RouteAccess) -> Self {
        Self {
            routes: Vec::new(),
            default,
        }
    }

    /// Add or replace the rule for `prefix`.
    #[must_use]
    pub fn route(mut self, prefix: impl Into<String>, access: RouteAccess) -> Self {
        let prefix = prefix.into();
        self.routes.retain(|(existing, _)| *existing != prefix);
        self.routes.push((prefix, access));
        self
    }

    /// Requirement for `path`: the longest matching prefix, else the default.
    ///
    /// Prefixes match whole path segments, so `/api` covers `/api` and
    /// `/api/users` but not `/apis`.
    #[must_use]
    pub fn access_for(&self, path: &str) -> &RouteAccess {
        self.routes
            .iter()
            .filter(|(prefix, _)| segment_prefix(prefix, path))
            .max_by_key(|(prefix, _)| prefix.len())
            .map_or(&self.default, |(_, access)| access)
    }

    /// Decide a request to `path` carrying `authorization`.
    ///
    /// Returns the verified claims, or `None` for public routes.
    ///
    /// # Errors
    ///
    /// [`AuthEdgeError::TokenMissing`] without a header on a protected
    /// route, [`AuthEdgeError::Forbidden`] on a role mismatch, and any
    /// verification error otherwise.
    #[instrument(skip(self, authorization, verifier))]
    pub async fn authorize(
        &self,
        path: &str,
        authorization: Option<&str>,
        verifier: &dyn BearerVerifier,
    ) -> Result<Option<AccessClaims>, AuthEdgeError> {
        let access = self.access_for(path);
        if *access == RouteAccess::Public {
            return Ok(None);
        }

        let token = bearer_token(authorization.ok_or(AuthEdgeError::TokenMissing)?)?;
        let claims = verifier.verify_bearer(token).await?;

        if let RouteAccess::Role(required) = access {
            if claims.role() != required {
                debug!(subject_id = claims.subject_id(), "Role check failed");
                return Err(AuthEdgeError::Forbidden {
                    required: required.clone(),
                });
            }
        }
        Ok(Some(claims))
    }
}

fn segment_prefix(prefix: &str, path: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || prefix.ends_with('/') || rest.starts_with('/'),
        None => false,
    }
}
