//! Order history and the admin status lifecycle.

use thiserror::Error;
use tracing::instrument;

use tee_studio_core::{InvalidTransition, OrderId, OrderStatus, UserId};

use crate::db::{OrderStore, RepositoryError, UserStore};
use crate::models::Order;
use crate::services::notifications::{Notification, NotificationService};

/// Longest accepted tracking number.
const MAX_TRACKING_NUMBER_LENGTH: usize = 100;

/// Errors that can occur reading or updating orders.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("order not found")]
    NotFound,

    /// The order exists but belongs to another user.
    #[error("order belongs to another user")]
    Forbidden,

    #[error("{0}")]
    InvalidTransition(#[from] InvalidTransition),

    /// Another update moved the order first.
    #[error("order status changed concurrently, reload and retry")]
    StatusChanged,

    #[error("tracking number is too long")]
    TrackingNumberTooLong,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Order service.
pub struct OrderService<'a> {
    orders: &'a dyn OrderStore,
    users: &'a dyn UserStore,
    notifications: NotificationService<'a>,
}

impl<'a> OrderService<'a> {
    /// Create a new order service.
    #[must_use]
    pub const fn new(
        orders: &'a dyn OrderStore,
        users: &'a dyn UserStore,
        notifications: NotificationService<'a>,
    ) -> Self {
        Self {
            orders,
            users,
            notifications,
        }
    }

    /// The user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the query fails.
    pub async fn list(&self, user_id: UserId) -> Result<Vec<Order>, OrderError> {
        Ok(self.orders.list_for_user(user_id).await?)
    }

    /// One order, if the user owns it.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` or `OrderError::Forbidden`.
    pub async fn get(&self, user_id: UserId, id: OrderId) -> Result<Order, OrderError> {
        let order = self.orders.get(id).await?.ok_or(OrderError::NotFound)?;
        if order.user_id != user_id {
            return Err(OrderError::Forbidden);
        }
        Ok(order)
    }

    /// Move an order along its lifecycle and notify the operator.
    ///
    /// The write is conditional on the status read here, so two admins
    /// racing on the same order cannot both succeed.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound`, `InvalidTransition`, `StatusChanged`,
    /// or `TrackingNumberTooLong`.
    #[instrument(skip(self, tracking_number), fields(%order_id, to = %new_status))]
    pub async fn update_status(
        &self,
        order_id: OrderId,
        new_status: OrderStatus,
        tracking_number: Option<&str>,
    ) -> Result<Order, OrderError> {
        let tracking_number = tracking_number.map(str::trim).filter(|t| !t.is_empty());
        if tracking_number.is_some_and(|t| t.chars().count() > MAX_TRACKING_NUMBER_LENGTH) {
            return Err(OrderError::TrackingNumberTooLong);
        }

        let current = self.orders.get(order_id).await?.ok_or(OrderError::NotFound)?;
        let old_status = current.status;
        old_status.transition_to(new_status)?;

        let order = self
            .orders
            .update_status(order_id, old_status, new_status)
            .await?
            .ok_or(OrderError::StatusChanged)?;

        tracing::info!(from = %old_status, "Order status updated");
        self.notify(&order, old_status, tracking_number).await;

        Ok(order)
    }

    async fn notify(&self, order: &Order, old_status: OrderStatus, tracking_number: Option<&str>) {
        let customer = match self.users.get_by_id(order.user_id).await {
            Ok(Some(user)) => user.email,
            Ok(None) => {
                tracing::warn!(order_id = %order.id, "Order owner missing, skipping notification");
                return;
            }
            Err(e) => {
                tracing::warn!(order_id = %order.id, error = %e, "Failed to load order owner");
                return;
            }
        };

        self.notifications
            .send(
                &Notification::StatusUpdate {
                    order_id: order.id,
                    old_status: old_status.label(),
                    new_status: order.status.label(),
                },
                &customer,
            )
            .await;

        if order.status == OrderStatus::Shipped {
            self.notifications
                .send(
                    &Notification::Shipped {
                        order_id: order.id,
                        tracking_number,
                    },
                    &customer,
                )
                .await;
        }
    }
}
