//! Authorization hook for callers joining a room.
//!
//! Rallypoint doesn't issue identities. The whitelist/admin layer owns
//! that, and hands the relay an [`Authorizer`]: a single async predicate
//! that says whether a member identity (plus whatever credential the
//! client presented) may use the relay at all.
//!
//! Room-level permissions (who may dispatch, who may kick) are a separate
//! matter and are always checked against the room store.

use std::future::Future;

use rallypoint_protocol::MemberId;

use crate::SessionError;

/// Decides whether a caller identity is allowed to use the relay.
///
/// `Send + Sync + 'static` because one instance lives as long as the
/// server and is consulted from every connection task. The returned
/// future must be `Send` for the same reason; a plain `async fn` in the
/// impl satisfies that as long as it holds nothing `!Send` across an
/// `.await`.
///
/// # Example
///
/// ```rust
/// use rallypoint_protocol::MemberId;
/// use rallypoint_session::{Authorizer, SessionError};
///
/// /// Only identities on a fixed list may connect.
/// struct Whitelist(Vec<String>);
///
/// impl Authorizer for Whitelist {
///     async fn authorize(
///         &self,
///         member: &MemberId,
///         _token: Option<&str>,
///     ) -> Result<(), SessionError> {
///         if self.0.iter().any(|m| m == member.as_str()) {
///             Ok(())
///         } else {
///             Err(SessionError::Unauthorized(format!("{member} is not whitelisted")))
///         }
///     }
/// }
/// ```
pub trait Authorizer: Send + Sync + 'static {
    /// Returns `Ok(())` if `member` may join rooms through the relay.
    ///
    /// # Errors
    /// Returns [`SessionError::Unauthorized`] to reject the caller.
    fn authorize(
        &self,
        member: &MemberId,
        token: Option<&str>,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;
}

/// Accepts every non-blank identity. For development and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    async fn authorize(
        &self,
        member: &MemberId,
        _token: Option<&str>,
    ) -> Result<(), SessionError> {
        if member.is_blank() {
            return Err(SessionError::Unauthorized("blank member id".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allow_all_accepts_any_identity() {
        let result = AllowAll.authorize(&MemberId::new("Alpha@Tonberry"), None).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_allow_all_rejects_blank_identity() {
        let result = AllowAll.authorize(&MemberId::new("   "), Some("token")).await;
        assert!(matches!(result, Err(SessionError::Unauthorized(_))));
    }
}
