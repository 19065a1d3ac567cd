use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    Json,
};

/// Header carrying the id of the already-authenticated user.
///
/// Authentication happens in front of this service; by the time a request
/// arrives here the header is trusted.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The user a request acts on behalf of.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedUser(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<String>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .unwrap_or_default();

        // Validate that a user was supplied!
        if user_id.is_empty() {
            return Err((
                StatusCode::UNAUTHORIZED,
                Json("Unauthorized access".to_string()),
            ));
        }
        Ok(AuthenticatedUser(user_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(header: Option<&str>) -> Result<AuthenticatedUser, StatusCode> {
        let mut builder = Request::builder().uri("/account");
        if let Some(value) = header {
            builder = builder.header(USER_ID_HEADER, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        AuthenticatedUser::from_request_parts(&mut parts, &())
            .await
            .map_err(|(status, _)| status)
    }

    #[tokio::test]
    async fn header_value_is_the_user() {
        assert_eq!(
            extract(Some(" alice ")).await.unwrap(),
            AuthenticatedUser("alice".to_string())
        );
    }

    #[tokio::test]
    async fn missing_or_blank_header_is_unauthorized() {
        assert_eq!(extract(None).await.unwrap_err(), StatusCode::UNAUTHORIZED);
        assert_eq!(extract(Some("   ")).await.unwrap_err(), StatusCode::UNAUTHORIZED);
    }
}
