use crate::db::queries;
use crate::db::store::RecordStore;
use crate::errors::AppError;
use crate::models::{Booking, Role, User};

/// The authenticated caller of an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Actor {
    pub user: User,
    pub role: Role,
    /// Set for provider accounts that have a provider profile.
    pub provider_id: Option<String>,
}

impl Actor {
    pub async fn resolve(store: &dyn RecordStore, user: User) -> Result<Self, AppError> {
        let provider_id = match user.role {
            Role::Provider => queries::provider_for_user(store, &user.id)
                .await?
                .map(|p| p.id),
            _ => None,
        };
        Ok(Self {
            role: user.role,
            user,
            provider_id,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user.id
    }

    pub fn require(&self, role: Role) -> Result<(), AppError> {
        if self.role != role {
            return Err(AppError::Forbidden(format!("requires the {role} role")));
        }
        Ok(())
    }

    /// The provider profile id of a provider caller.
    pub fn require_provider(&self) -> Result<&str, AppError> {
        self.require(Role::Provider)?;
        self.provider_id
            .as_deref()
            .ok_or_else(|| AppError::Forbidden("no provider profile for this account".to_string()))
    }

    /// Customers see their own bookings, providers the ones assigned to them,
    /// admins all of them.
    pub fn can_see(&self, booking: &Booking) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Customer => booking.customer_id == self.user.id,
            Role::Provider => self.provider_id.as_deref() == Some(booking.provider_id.as_str()),
        }
    }

    pub fn ensure_party(&self, booking: &Booking) -> Result<(), AppError> {
        if !self.can_see(booking) {
            return Err(AppError::Forbidden(format!(
                "booking {} belongs to someone else",
                booking.id
            )));
        }
        Ok(())
    }
}
