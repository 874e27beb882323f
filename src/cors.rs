//! Cross-origin access control for the counter endpoints.
//!
//! Allowed origins get credentialed access with any method and any header.
//! Requests from other origins are still served, just without the CORS
//! headers a browser would need to expose the response.

use dropshot::HttpError;
use http::header;
use http::HeaderMap;
use http::HeaderValue;

const ALLOW_METHODS: &str = "DELETE, GET, HEAD, OPTIONS, PATCH, POST, PUT";
const PREFLIGHT_MAX_AGE_SECS: &str = "600";

#[derive(Clone, Debug, PartialEq, Eq)]
enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

#[derive(Clone, Debug)]
pub struct CorsPolicy {
    origins: AllowedOrigins,
}

impl CorsPolicy {
    /// A `"*"` entry allows every origin.
    pub fn new<I, S>(origins: I) -> CorsPolicy
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let origins: Vec<String> = origins.into_iter().map(Into::into).collect();
        let origins = if origins.iter().any(|o| o == "*") {
            AllowedOrigins::Any
        } else {
            AllowedOrigins::List(origins)
        };
        CorsPolicy { origins }
    }

    pub fn allows(&self, origin: &str) -> bool {
        match &self.origins {
            AllowedOrigins::Any => true,
            AllowedOrigins::List(list) => list.iter().any(|o| o == origin),
        }
    }

    fn allowed_origin<'a>(
        &self,
        request: &'a HeaderMap,
    ) -> Option<&'a HeaderValue> {
        request
            .get(header::ORIGIN)
            .filter(|value| value.to_str().map_or(false, |o| self.allows(o)))
    }

    /// Adds CORS headers to a regular (non-preflight) response.
    pub fn decorate(&self, request: &HeaderMap, response: &mut HeaderMap) {
        if let Some(origin) = self.allowed_origin(request) {
            insert_common(response, origin.clone());
        }
    }

    /// Builds the headers answering a preflight request.
    pub fn preflight(&self, request: &HeaderMap) -> Result<HeaderMap, HttpError> {
        let mut response = HeaderMap::new();
        let is_preflight = request.contains_key(header::ORIGIN)
            && request.contains_key(header::ACCESS_CONTROL_REQUEST_METHOD);
        if !is_preflight {
            return Ok(response);
        }

        let origin = self.allowed_origin(request).ok_or_else(|| {
            HttpError::for_bad_request(
                None,
                String::from("Disallowed CORS origin"),
            )
        })?;
        insert_common(&mut response, origin.clone());
        response.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        );
        response.insert(
            header::ACCESS_CONTROL_MAX_AGE,
            HeaderValue::from_static(PREFLIGHT_MAX_AGE_SECS),
        );
        if let Some(requested) =
            request.get(header::ACCESS_CONTROL_REQUEST_HEADERS)
        {
            response
                .insert(header::ACCESS_CONTROL_ALLOW_HEADERS, requested.clone());
        }
        Ok(response)
    }
}

fn insert_common(response: &mut HeaderMap, origin: HeaderValue) {
    response.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    response.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    response.append(header::VARY, HeaderValue::from_static("Origin"));
}
