//! axum adapter for [`RequestCarrier`].

use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;

use gatehouse_auth::{DenialBody, RequestCarrier};

use crate::app::errors::json_error;

pub struct HttpCarrier<'a> {
    headers: &'a HeaderMap,
    denial: Option<(u16, DenialBody)>,
}

impl<'a> HttpCarrier<'a> {
    pub fn new(headers: &'a HeaderMap) -> Self {
        Self {
            headers,
            denial: None,
        }
    }

    /// Response for the recorded denial; a bare 401 if none was recorded.
    pub fn into_response(self) -> Response {
        match self.denial {
            Some((status, body)) => json_error(
                StatusCode::from_u16(status).unwrap_or(StatusCode::UNAUTHORIZED),
                body.error,
                body.message,
            ),
            None => json_error(StatusCode::UNAUTHORIZED, "unauthorized", "authentication required"),
        }
    }
}

impl RequestCarrier for HttpCarrier<'_> {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    fn deny(&mut self, status: u16, body: DenialBody) {
        self.denial = Some((status, body));
    }
}
