use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::{AppError, db::UserId};

use super::AuthProvider;

/// The authenticated user behind a request.
#[derive(Debug, Clone)]
pub struct Caller(pub UserId);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
    Arc<dyn AuthProvider>: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Some(credential) = bearer(parts) else {
            return Err(AppError::Unauthorized);
        };

        let auth = Arc::<dyn AuthProvider>::from_ref(state);
        match auth.authenticate(credential).await? {
            Some(user_id) => Ok(Caller(user_id)),
            None => {
                tracing::debug!("rejected unknown credential");
                Err(AppError::Unauthorized)
            }
        }
    }
}

fn bearer(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, credential) = value.split_once(' ')?;
    let credential = credential.trim();

    (scheme.eq_ignore_ascii_case("bearer") && !credential.is_empty()).then_some(credential)
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn parts(authorization: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/rooms");
        if let Some(value) = authorization {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn parses_bearer_credential() {
        assert_eq!(bearer(&parts(Some("Bearer 1"))), Some("1"));
        assert_eq!(bearer(&parts(Some("bearer  42 "))), Some("42"));
    }

    #[test]
    fn rejects_missing_or_malformed_headers() {
        assert_eq!(bearer(&parts(None)), None);
        assert_eq!(bearer(&parts(Some("Bearer"))), None);
        assert_eq!(bearer(&parts(Some("Bearer   "))), None);
        assert_eq!(bearer(&parts(Some("Basic dXNlcg=="))), None);
    }
}
