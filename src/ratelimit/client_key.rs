//! Client key resolution.
//!
//! Derives the string identity under which request counts are tracked,
//! scoped to one caller and one policy.

/// Request metadata consumed from the surrounding request-handling layer.
///
/// Floodgate does not depend on any HTTP framework; callers extract these
/// three fields from whatever request type they hold.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Direct remote address of the connection
    pub remote_addr: Option<String>,
    /// Raw value of the forwarded-for header, if present
    pub forwarded_for: Option<String>,
    /// Identifier of the authenticated principal, if known
    pub user_id: Option<String>,
}

/// Resolve the client key for a request under the given policy.
///
/// Keys take the form `rate_limit:<policy>:<scope>:<identifier>`, where
/// scope is `user` for authenticated principals and `ip` otherwise. For the
/// `ip` scope the first comma-separated element of the forwarded-for header
/// wins over the direct remote address. Callers with neither are pooled into
/// a single shared `unknown` bucket rather than rejected; resolution always
/// succeeds.
pub fn resolve_client_key(policy_name: &str, ctx: &RequestContext) -> String {
    if let Some(ref user_id) = ctx.user_id {
        return format!("rate_limit:{}:user:{}", policy_name, user_id);
    }

    let ip = ctx
        .forwarded_for
        .as_deref()
        .and_then(|header| header.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .or(ctx.remote_addr.as_deref())
        .unwrap_or("unknown");

    format!("rate_limit:{}:ip:{}", policy_name, ip)
}
