use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    Json,
};

use super::AppState;

/// Bearer token from the `Authorization` header, else `?token=`.
fn provided_token(req: &Request<Body>) -> Option<String> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string());

    header.or_else(|| {
        req.uri().query().and_then(|q| {
            q.split('&')
                .find_map(|pair| pair.strip_prefix("token="))
                .map(str::to_string)
        })
    })
}

pub(crate) async fn auth_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: middleware::Next,
) -> Response {
    let Some(expected) = state.api_token.as_deref() else {
        return next.run(req).await;
    };

    let error = match provided_token(&req) {
        Some(token) if token == expected => return next.run(req).await,
        Some(_) => "invalid token",
        None => "missing or invalid Authorization header",
    };
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": error })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_wins_over_query() {
        let req = Request::builder()
            .uri("/api/sessions?token=from-query")
            .header(AUTHORIZATION, "Bearer from-header")
            .body(Body::empty())
            .unwrap();
        assert_eq!(provided_token(&req).as_deref(), Some("from-header"));

        let req = Request::builder()
            .uri("/api/sessions?x=1&token=from-query")
            .body(Body::empty())
            .unwrap();
        assert_eq!(provided_token(&req).as_deref(), Some("from-query"));

        let req = Request::builder().uri("/api/sessions").body(Body::empty()).unwrap();
        assert_eq!(provided_token(&req), None);
    }
}
