use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::user::UserRole;
use crate::services::access_guard::Principal;

const USER_ID_HEADER: &str = "x-user-id";
const USER_ROLE_HEADER: &str = "x-user-role";

/// Extracts the authenticated principal from the identity headers set by the
/// upstream auth gateway. The service trusts these claims as given; anything
/// missing or malformed is rejected as unauthenticated.
#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok())
            .ok_or(AppError::Unauthorized)?;

        let role = match parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            Some("ADMIN") => UserRole::Admin,
            Some("USER") => UserRole::User,
            _ => return Err(AppError::Unauthorized),
        };

        Ok(Principal { user_id, role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::FromRequestParts;
    use axum::http::Request;

    async fn extract(headers: &[(&str, &str)]) -> Result<Principal, AppError> {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();

        Principal::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn valid_headers_yield_principal() {
        let id = Uuid::new_v4();
        let principal = extract(&[
            (USER_ID_HEADER, &id.to_string()),
            (USER_ROLE_HEADER, "ADMIN"),
        ])
        .await
        .unwrap();

        assert_eq!(principal.user_id, id);
        assert_eq!(principal.role, UserRole::Admin);
    }

    #[tokio::test]
    async fn missing_or_malformed_headers_are_unauthorized() {
        assert!(matches!(extract(&[]).await, Err(AppError::Unauthorized)));

        let id = Uuid::new_v4().to_string();
        assert!(matches!(
            extract(&[(USER_ID_HEADER, &id)]).await,
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            extract(&[(USER_ID_HEADER, "not-a-uuid"), (USER_ROLE_HEADER, "USER")]).await,
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            extract(&[(USER_ID_HEADER, &id), (USER_ROLE_HEADER, "ROOT")]).await,
            Err(AppError::Unauthorized)
        ));
    }
}
