use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{web, FromRequest, HttpRequest};
use shadowvec_core::AccessContext;
use std::future::{ready, Ready};

use crate::rest::ApiState;

/// Header carrying the authenticated record id of a regular caller.
pub const AUTH_ID_HEADER: &str = "X-Auth-Id";

/// The caller of a request: administrator when the bearer token matches the
/// configured admin token, an authenticated user when `X-Auth-Id` is set,
/// otherwise a guest.
#[derive(Debug, Clone)]
pub struct Caller(pub AccessContext);

impl Caller {
    pub fn from_request_parts(req: &HttpRequest) -> Self {
        let admin_token = req
            .app_data::<web::Data<ApiState>>()
            .and_then(|state| state.admin_token.clone());

        let bearer = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim);

        if let (Some(token), Some(expected)) = (bearer, admin_token.as_deref()) {
            if !expected.is_empty() && token == expected {
                return Caller(AccessContext::admin());
            }
        }

        match req
            .headers()
            .get(AUTH_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            Some(id) => Caller(AccessContext::user(id)),
            None => Caller(AccessContext::guest()),
        }
    }
}

impl FromRequest for Caller {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Ok(Caller::from_request_parts(req)))
    }
}
