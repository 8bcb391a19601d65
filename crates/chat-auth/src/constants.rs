//! Remote endpoints used for identity

/// Exchange a private key (sent as `X-Private-Key`) for a session token
pub const SIGNIN_PATH: &str = "/auth/signin";

/// Profile of the current session; doubles as the liveness probe
pub const PROFILE_PATH: &str = "/me";

/// Field in the sign-in response carrying the new session token
pub const SESSION_TOKEN_FIELD: &str = "session_token";
