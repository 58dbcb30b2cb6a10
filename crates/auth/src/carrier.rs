//! Transport capability used by the token service and the guard.

use serde::Serialize;

pub const AUTHORIZATION: &str = "authorization";

/// Minimal view of an in-flight request.
///
/// Adapters exist per transport; the core only ever reads a header and, on
/// denial, hands back a status and a JSON body.
pub trait RequestCarrier {
    /// Value of header `name` (case-insensitive), if present and valid UTF-8.
    fn header(&self, name: &str) -> Option<&str>;

    /// Record the response to send instead of running the protected handler.
    fn deny(&mut self, status: u16, body: DenialBody);
}

/// JSON body written on denial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DenialBody {
    pub error: &'static str,
    pub message: &'static str,
}

/// Token from `Authorization: Bearer <token>`.
///
/// The scheme is matched case-insensitively. A missing header, another
/// scheme, or an empty token yields `None`.
pub fn bearer_token<C: RequestCarrier + ?Sized>(carrier: &C) -> Option<&str> {
    let value = carrier.header(AUTHORIZATION)?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Header-map carrier for tests and non-HTTP callers.
#[derive(Debug, Default)]
pub struct StaticCarrier {
    headers: Vec<(String, String)>,
    denial: Option<(u16, DenialBody)>,
}

impl StaticCarrier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    pub fn bearer(token: &str) -> Self {
        Self::new().with_header(AUTHORIZATION, format!("Bearer {token}"))
    }

    pub fn denial(&self) -> Option<&(u16, DenialBody)> {
        self.denial.as_ref()
    }
}

impl RequestCarrier for StaticCarrier {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn deny(&mut self, status: u16, body: DenialBody) {
        self.denial = Some((status, body));
    }
}
