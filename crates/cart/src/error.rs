//! Cart engine errors.
//!
//! Every mutation returns `Result<T, CartError>`. Store failures are wrapped
//! as [`CartError::Read`] or [`CartError::Write`] depending on which side of
//! the operation failed, so callers can offer a retry without inspecting the
//! backend error.

use shopez_core::{PendingOperation, ProductId};
use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced to callers of the cart engine.
#[derive(Debug, Error)]
pub enum CartError {
    /// No signed-in user, or the session's user has changed.
    #[error("not signed in")]
    Unauthenticated,

    /// Another mutation is already in flight for this line item.
    #[error("{product_id} is busy ({pending})")]
    Conflict {
        /// Line item the request targeted.
        product_id: ProductId,
        /// Operation currently in flight.
        pending: PendingOperation,
    },

    /// Reading the current line item failed.
    #[error("read failed: {0}")]
    Read(#[source] StoreError),

    /// Writing or deleting the line item failed.
    #[error("write failed: {0}")]
    Write(#[source] StoreError),

    /// Quantity is outside the accepted range.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(i64),

    /// The line item is not in the locally reconciled cart.
    #[error("{0} is not in the cart")]
    NotInCart(ProductId),

    /// A mutation task ended without reporting a result.
    #[error("mutation interrupted: {0}")]
    Interrupted(String),
}

impl CartError {
    /// Whether retrying the same request later can succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Conflict { .. } | Self::Read(_) | Self::Write(_) | Self::Interrupted(_)
        )
    }
}

/// Result type alias for `CartError`.
pub type Result<T> = std::result::Result<T, CartError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cart_error_display() {
        let err = CartError::Conflict {
            product_id: ProductId::new("A"),
            pending: PendingOperation::Adding,
        };
        assert_eq!(err.to_string(), "A is busy (adding)");

        let err = CartError::Write(StoreError::AuthRevoked);
        assert_eq!(err.to_string(), "write failed: auth token revoked");
    }

    #[test]
    fn test_retryable() {
        assert!(
            CartError::Conflict {
                product_id: ProductId::new("A"),
                pending: PendingOperation::Removing,
            }
            .is_retryable()
        );
        assert!(CartError::Read(StoreError::Connection("reset".into())).is_retryable());
        assert!(!CartError::Unauthenticated.is_retryable());
        assert!(!CartError::InvalidQuantity(0).is_retryable());
    }
}
