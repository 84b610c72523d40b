mod extract;

use async_trait::async_trait;

use crate::{
    AppResult,
    db::{Store, UserId},
};

pub use extract::Caller;

/// Resolves the credential carried by `Authorization: Bearer <credential>`
/// into a user identity.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(&self, credential: &str) -> AppResult<Option<UserId>>;
}

/// Treats the bearer value as a user id and accepts it when that user exists.
/// Nothing is verified beyond existence.
#[derive(Clone)]
pub struct RegisteredUserAuth {
    store: Store,
}

impl RegisteredUserAuth {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AuthProvider for RegisteredUserAuth {
    async fn authenticate(&self, credential: &str) -> AppResult<Option<UserId>> {
        let user_id = UserId::from(credential);
        Ok(self.store.find_user(&user_id).await?.map(|user| user.id))
    }
}
