use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::card::{Card, CardStatus};
use crate::models::user::UserRole;

/// The authenticated caller, as asserted by the upstream auth layer. Threaded
/// explicitly through every core call; the services never consult any global
/// context for "the current user".
#[derive(Debug, Clone, Copy)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: UserRole,
}

#[derive(thiserror::Error, Debug)]
pub enum GuardError {
    #[error("Current user is not owner of the card")]
    NotOwner,

    #[error("Card is not available")]
    CardUnavailable,

    #[error("Admin role required")]
    NotAdmin,
}

impl From<GuardError> for AppError {
    fn from(err: GuardError) -> Self {
        AppError::AccessDenied(err.to_string())
    }
}

pub fn require_owner(principal: &Principal, card: &Card) -> Result<(), GuardError> {
    if card.owner_id != principal.user_id {
        return Err(GuardError::NotOwner);
    }

    Ok(())
}

/// ACTIVE and not past its validity date. A card past its date is treated as
/// unavailable even before the sweep has flipped its status.
pub fn is_available(card: &Card, today: NaiveDate) -> bool {
    card.status == CardStatus::Active && card.validity_period >= today
}

/// Distinguishes "exists but unusable" from "not found": blocked or expired
/// cards reject usage with access-denied, never not-found.
pub fn require_available(card: &Card, today: NaiveDate) -> Result<(), GuardError> {
    if !is_available(card, today) {
        return Err(GuardError::CardUnavailable);
    }

    Ok(())
}

pub fn require_admin(principal: &Principal) -> Result<(), GuardError> {
    if principal.role != UserRole::Admin {
        return Err(GuardError::NotAdmin);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn card(owner_id: Uuid, status: CardStatus, validity: NaiveDate) -> Card {
        Card {
            id: Uuid::new_v4(),
            owner_id,
            encrypted_number: vec![0u8; 44],
            validity_period: validity,
            status,
            balance: Decimal::ZERO,
            created_at: Utc::now(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn owner_check_compares_ids() {
        let owner = Uuid::new_v4();
        let card = card(owner, CardStatus::Active, date(2030, 1, 31));

        let principal = Principal {
            user_id: owner,
            role: UserRole::User,
        };
        assert!(require_owner(&principal, &card).is_ok());

        let stranger = Principal {
            user_id: Uuid::new_v4(),
            role: UserRole::User,
        };
        assert!(matches!(
            require_owner(&stranger, &card),
            Err(GuardError::NotOwner)
        ));
    }

    #[test]
    fn admin_role_does_not_bypass_ownership() {
        let card = card(Uuid::new_v4(), CardStatus::Active, date(2030, 1, 31));
        let admin = Principal {
            user_id: Uuid::new_v4(),
            role: UserRole::Admin,
        };

        assert!(matches!(
            require_owner(&admin, &card),
            Err(GuardError::NotOwner)
        ));
    }

    #[test]
    fn active_unexpired_card_is_available() {
        let card = card(Uuid::new_v4(), CardStatus::Active, date(2026, 3, 31));

        assert!(require_available(&card, date(2026, 3, 31)).is_ok());
        assert!(require_available(&card, date(2026, 1, 1)).is_ok());
    }

    #[test]
    fn blocked_or_expired_card_is_unavailable() {
        let today = date(2026, 1, 1);

        let blocked = card(Uuid::new_v4(), CardStatus::Blocked, date(2030, 1, 31));
        assert!(matches!(
            require_available(&blocked, today),
            Err(GuardError::CardUnavailable)
        ));

        let expired = card(Uuid::new_v4(), CardStatus::Expired, date(2030, 1, 31));
        assert!(require_available(&expired, today).is_err());
    }

    #[test]
    fn past_validity_active_card_is_unavailable() {
        let card = card(Uuid::new_v4(), CardStatus::Active, date(2025, 12, 31));

        assert!(matches!(
            require_available(&card, date(2026, 1, 1)),
            Err(GuardError::CardUnavailable)
        ));
    }

    #[test]
    fn admin_check() {
        let user_id = Uuid::new_v4();

        assert!(require_admin(&Principal {
            user_id,
            role: UserRole::Admin
        })
        .is_ok());
        assert!(matches!(
            require_admin(&Principal {
                user_id,
                role: UserRole::User
            }),
            Err(GuardError::NotAdmin)
        ));
    }
}
