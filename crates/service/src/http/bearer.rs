use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::{Authorization, HeaderMapExt};
use http::request::Parts;

const TOKEN_QUERY_PARAM: &str = "token";

/// The bearer credential of a request.
///
/// Read from `Authorization: Bearer <token>`, falling back to a `token`
/// query parameter for clients that can't set headers.
pub fn bearer_token(parts: &Parts) -> Option<String> {
    if let Some(Authorization(bearer)) = parts.headers.typed_get::<Authorization<Bearer>>() {
        let token = bearer.token().trim();
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }

    let query = parts.uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == TOKEN_QUERY_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(uri: &str, authorization: Option<&str>) -> Parts {
        let mut builder = http::Request::builder().uri(uri);
        if let Some(value) = authorization {
            builder = builder.header(http::header::AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_header_takes_precedence() {
        let parts = parts("/api/whoami?token=query", Some("Bearer header"));
        assert_eq!(bearer_token(&parts).as_deref(), Some("header"));
    }

    #[test]
    fn test_query_fallback() {
        let parts = parts("/api/whoami?x=1&token=ecloud_abc%2Edef", None);
        assert_eq!(bearer_token(&parts).as_deref(), Some("ecloud_abc.def"));
    }

    #[test]
    fn test_missing_or_wrong_scheme() {
        assert_eq!(bearer_token(&parts("/api/whoami", None)), None);
        assert_eq!(
            bearer_token(&parts("/api/whoami", Some("Basic dXNlcjpwYXNz"))),
            None
        );
        assert_eq!(bearer_token(&parts("/api/whoami?token=", None)), None);
    }
}
