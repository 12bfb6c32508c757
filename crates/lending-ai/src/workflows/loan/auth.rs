use super::domain::UserId;

/// Contract for the external authentication collaborator: resolve a bearer
/// token to a caller identity. The core never owns sessions or tokens.
pub trait CallerAuthenticator: Send + Sync {
    fn authenticate(&self, bearer_token: &str) -> Result<UserId, AuthError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("caller could not be authenticated")]
    Unauthorized,
}
