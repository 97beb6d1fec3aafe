//! Request extractors.

use analytics_core::error::AuthErrorCode;
use analytics_core::{Error, RequestContext};
use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::{header, request::Parts, HeaderMap},
};
use serde::de::DeserializeOwned;

use crate::response::ApiError;

/// Header set by the external session layer for dashboard requests.
pub const SESSION_USER_HEADER: &str = "X-User-Id";

/// Tenant of an authenticated dashboard session.
#[derive(Debug, Clone)]
pub struct SessionUser(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for SessionUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        header_value(&parts.headers, SESSION_USER_HEADER)
            .map(SessionUser)
            .ok_or_else(|| {
                Error::unauthorized(AuthErrorCode::SessionRequired, "Authentication required").into()
            })
    }
}

/// Client IP address.
#[derive(Debug, Clone)]
pub struct ClientIp(pub Option<String>);

impl ClientIp {
    fn from_headers(headers: &HeaderMap) -> Self {
        // Take the first hop of a proxied request
        if let Some(xff) = header_value(headers, "X-Forwarded-For") {
            if let Some(ip) = xff.split(',').next().map(str::trim).filter(|ip| !ip.is_empty()) {
                return ClientIp(Some(ip.to_string()));
            }
        }

        ClientIp(header_value(headers, "X-Real-IP"))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

/// Request context captured for ingested events.
#[derive(Debug, Clone)]
pub struct TrackContext(pub RequestContext);

#[async_trait]
impl<S> FromRequestParts<S> for TrackContext
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;
        let ClientIp(ip) = ClientIp::from_headers(headers);
        Ok(TrackContext(RequestContext::new(
            header_value(headers, header::USER_AGENT.as_str()),
            ip,
            header_value(headers, header::REFERER.as_str()),
        )))
    }
}

/// Query string parameters; malformed ones are `QUERY_001`.
#[derive(Debug, Clone)]
pub struct QueryParams<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(params) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::from(Error::query(e.body_text())))?;
        Ok(QueryParams(params))
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
