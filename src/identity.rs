//! The authenticated caller. Authentication itself happens elsewhere; this
//! crate only consumes the principal it produces and authorizes against it.
use crate::error::{MarketError, MarketResult};
use crate::types::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    #[default]
    User,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: UserId,
    pub role: Role,
}

impl Principal {
    pub fn user(id: UserId) -> Self {
        Self {
            id,
            role: Role::User,
        }
    }
    pub fn admin(id: UserId) -> Self {
        Self {
            id,
            role: Role::Admin,
        }
    }
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Supplies the principal behind the current request, if any.
pub trait IdentityProvider {
    fn current_user(&self) -> Option<Principal>;
}

impl IdentityProvider for Option<Principal> {
    fn current_user(&self) -> Option<Principal> {
        self.clone()
    }
}

pub fn authenticate(provider: &dyn IdentityProvider) -> MarketResult<Principal> {
    provider.current_user().ok_or(MarketError::Unauthenticated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_principal_is_unauthenticated() {
        let anonymous: Option<Principal> = None;
        assert!(matches!(
            authenticate(&anonymous),
            Err(MarketError::Unauthenticated)
        ));
    }

    #[test]
    fn present_principal_passes_through() {
        let admin = Principal::admin(UserId::generate().unwrap());
        let provider = Some(admin.clone());

        let principal = authenticate(&provider).unwrap();
        assert!(principal.is_admin());
        assert_eq!(principal, admin);
    }
}
