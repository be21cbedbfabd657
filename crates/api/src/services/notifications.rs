//! Admin-forwarding notifications.
//!
//! The sending domain is not verified for arbitrary recipients, so every
//! message goes to the operator's address and names the customer it should
//! be forwarded to.

use askama::Template;
use chrono::Utc;

use tee_studio_core::pricing::{BASE_UNIT_PRICE, CATALOG_CURRENCY};
use tee_studio_core::{
    Currency, DesignId, Email, OrderId, OrderItemId, OrderStatus, ShippingAddress, UserId,
};

use crate::clients::{EmailError, Mailer, OutgoingEmail};
use crate::models::{Order, OrderItem};

// =============================================================================
// Templates
// =============================================================================

/// One rendered order line.
struct ItemLine {
    design_id: DesignId,
    size: String,
    color: String,
    quantity: u32,
    unit_price: String,
    subtotal: String,
}

#[derive(Template)]
#[template(path = "email/order_confirmation.html")]
struct OrderConfirmationHtml<'a> {
    customer: &'a str,
    order_id: OrderId,
    items: &'a [ItemLine],
    total: &'a str,
    address: &'a ShippingAddress,
}

#[derive(Template)]
#[template(path = "email/order_confirmation.txt")]
struct OrderConfirmationText<'a> {
    customer: &'a str,
    order_id: OrderId,
    items: &'a [ItemLine],
    total: &'a str,
    address: &'a ShippingAddress,
}

#[derive(Template)]
#[template(path = "email/status_update.html")]
struct StatusUpdateHtml<'a> {
    customer: &'a str,
    order_id: OrderId,
    old_status: &'a str,
    new_status: &'a str,
}

#[derive(Template)]
#[template(path = "email/status_update.txt")]
struct StatusUpdateText<'a> {
    customer: &'a str,
    order_id: OrderId,
    old_status: &'a str,
    new_status: &'a str,
}

#[derive(Template)]
#[template(path = "email/shipping.html")]
struct ShippingHtml<'a> {
    customer: &'a str,
    order_id: OrderId,
    tracking_number: Option<&'a str>,
}

#[derive(Template)]
#[template(path = "email/shipping.txt")]
struct ShippingText<'a> {
    customer: &'a str,
    order_id: OrderId,
    tracking_number: Option<&'a str>,
}

// =============================================================================
// Service
// =============================================================================

/// A notification to render and forward.
#[derive(Debug, Clone, Copy)]
pub enum Notification<'a> {
    /// A new order was placed.
    OrderConfirmation { order: &'a Order },
    /// An order moved between statuses. Labels are display strings.
    StatusUpdate {
        order_id: OrderId,
        old_status: &'a str,
        new_status: &'a str,
    },
    /// An order shipped.
    Shipped {
        order_id: OrderId,
        tracking_number: Option<&'a str>,
    },
}

impl Notification<'_> {
    /// Short name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::OrderConfirmation { .. } => "order_confirmation",
            Self::StatusUpdate { .. } => "status_update",
            Self::Shipped { .. } => "shipping",
        }
    }

    /// Order the notification is about.
    #[must_use]
    pub const fn order_id(&self) -> OrderId {
        match self {
            Self::OrderConfirmation { order } => order.id,
            Self::StatusUpdate { order_id, .. } | Self::Shipped { order_id, .. } => *order_id,
        }
    }
}

/// Renders notifications and sends them to the operator.
pub struct NotificationService<'a> {
    mailer: &'a dyn Mailer,
    admin_email: &'a Email,
}

impl<'a> NotificationService<'a> {
    #[must_use]
    pub const fn new(mailer: &'a dyn Mailer, admin_email: &'a Email) -> Self {
        Self {
            mailer,
            admin_email,
        }
    }

    /// Render and send a notification about `customer`'s order.
    ///
    /// Returns whether the message was handed to the mail relay. Failures
    /// are logged here and never propagated.
    pub async fn send(&self, notification: &Notification<'_>, customer: &Email) -> bool {
        let result = match self.render(notification, customer) {
            Ok(email) => self.mailer.send(&email).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    order_id = %notification.order_id(),
                    kind = notification.kind(),
                    retryable = e.is_retryable(),
                    error = %e,
                    "Failed to send notification"
                );
                false
            }
        }
    }

    /// Operator address every notification is sent to.
    #[must_use]
    pub const fn admin_email(&self) -> &Email {
        self.admin_email
    }

    /// Send a confirmation for [`sample_order`] to the operator.
    ///
    /// Unlike [`Self::send`], failures are returned so a delivery check can
    /// report them.
    ///
    /// # Errors
    ///
    /// Returns `EmailError` if rendering or delivery fails.
    pub async fn send_test(&self) -> Result<(), EmailError> {
        let order = sample_order();
        let email = self.render(
            &Notification::OrderConfirmation { order: &order },
            self.admin_email,
        )?;
        self.mailer.send(&email).await?;

        tracing::info!(to = %email.to, "Test email sent");
        Ok(())
    }

    /// Render a notification into a multipart message addressed to the operator.
    ///
    /// # Errors
    ///
    /// Returns `EmailError::Template` if rendering fails.
    pub fn render(
        &self,
        notification: &Notification<'_>,
        customer: &Email,
    ) -> Result<OutgoingEmail, EmailError> {
        let customer = customer.as_str();
        let (subject, text_body, html_body) = match *notification {
            Notification::OrderConfirmation { order } => {
                let items = item_lines(order);
                let total = order.total_amount.display(order.currency);
                let html = OrderConfirmationHtml {
                    customer,
                    order_id: order.id,
                    items: &items,
                    total: &total,
                    address: &order.shipping_address,
                }
                .render()?;
                let text = OrderConfirmationText {
                    customer,
                    order_id: order.id,
                    items: &items,
                    total: &total,
                    address: &order.shipping_address,
                }
                .render()?;
                (format!("[Forward] New order #{}", order.id), text, html)
            }
            Notification::StatusUpdate {
                order_id,
                old_status,
                new_status,
            } => {
                let html = StatusUpdateHtml {
                    customer,
                    order_id,
                    old_status,
                    new_status,
                }
                .render()?;
                let text = StatusUpdateText {
                    customer,
                    order_id,
                    old_status,
                    new_status,
                }
                .render()?;
                (format!("[Forward] Order #{order_id} status update"), text, html)
            }
            Notification::Shipped {
                order_id,
                tracking_number,
            } => {
                let html = ShippingHtml {
                    customer,
                    order_id,
                    tracking_number,
                }
                .render()?;
                let text = ShippingText {
                    customer,
                    order_id,
                    tracking_number,
                }
                .render()?;
                (format!("[Forward] Order #{order_id} shipped"), text, html)
            }
        };

        Ok(OutgoingEmail {
            to: self.admin_email.as_str().to_owned(),
            subject,
            text_body,
            html_body,
        })
    }
}

/// A one-shirt order that exists only to exercise the templates.
#[must_use]
pub fn sample_order() -> Order {
    let now = Utc::now();
    Order {
        id: OrderId::new(0),
        user_id: UserId::new(0),
        status: OrderStatus::Processing,
        total_amount: BASE_UNIT_PRICE,
        currency: CATALOG_CURRENCY,
        payment_intent_id: "pi_sample".to_owned(),
        shipping_address: ShippingAddress {
            name: "Sample Customer".to_owned(),
            address: "1-1-1 Sample".to_owned(),
            city: "Sample City".to_owned(),
            postal_code: "123-4567".to_owned(),
            country: "Japan".to_owned(),
        },
        items: vec![OrderItem {
            id: OrderItemId::new(0),
            design_id: DesignId::new(1),
            quantity: 1,
            size: "M".to_owned(),
            color: "White".to_owned(),
            unit_price: BASE_UNIT_PRICE,
        }],
        created_at: now,
        updated_at: now,
    }
}

fn item_lines(order: &Order) -> Vec<ItemLine> {
    let currency: Currency = order.currency;
    order
        .items
        .iter()
        .map(|item| ItemLine {
            design_id: item.design_id,
            size: item.size.clone(),
            color: item.color.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price.display(currency),
            subtotal: item
                .subtotal()
                .map_or_else(|| "-".to_owned(), |amount| amount.display(currency)),
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tee_studio_core::Amount;

    use super::*;
    use crate::testing::RecordingMailer;

    fn order() -> Order {
        Order {
            id: OrderId::new(17),
            user_id: UserId::new(1),
            status: OrderStatus::Processing,
            total_amount: Amount::from_minor(6000),
            currency: Currency::Jpy,
            payment_intent_id: "pi_123".to_string(),
            shipping_address: ShippingAddress {
                name: "Taro Yamada".to_string(),
                address: "1-1-1 Chiyoda".to_string(),
                city: "Tokyo".to_string(),
                postal_code: "100-0001".to_string(),
                country: "Japan".to_string(),
            },
            items: vec![OrderItem {
                id: OrderItemId::new(1),
                design_id: DesignId::new(7),
                quantity: 2,
                size: "M".to_string(),
                color: "White".to_string(),
                unit_price: Amount::from_minor(3000),
            }],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_order_confirmation_goes_to_admin_and_names_customer() {
        let mailer = RecordingMailer::new();
        let admin = Email::parse("ops@teestudio.example").unwrap();
        let customer = Email::parse("taro@example.jp").unwrap();
        let service = NotificationService::new(&mailer, &admin);
        let order = order();

        let email = service
            .render(&Notification::OrderConfirmation { order: &order }, &customer)
            .unwrap();

        assert_eq!(email.to, "ops@teestudio.example");
        assert_eq!(email.subject, "[Forward] New order #17");
        assert!(email.text_body.contains("taro@example.jp"));
        assert!(email.text_body.contains("¥6,000"));
        assert!(email.html_body.contains("Taro Yamada"));
        assert!(email.html_body.contains("Design #7"));
    }

    #[test]
    fn test_shipping_without_tracking_number() {
        let mailer = RecordingMailer::new();
        let admin = Email::parse("ops@teestudio.example").unwrap();
        let customer = Email::parse("taro@example.jp").unwrap();
        let service = NotificationService::new(&mailer, &admin);

        let with = service
            .render(
                &Notification::Shipped {
                    order_id: OrderId::new(3),
                    tracking_number: Some("JP123456789"),
                },
                &customer,
            )
            .unwrap();
        assert!(with.text_body.contains("JP123456789"));

        let without = service
            .render(
                &Notification::Shipped {
                    order_id: OrderId::new(3),
                    tracking_number: None,
                },
                &customer,
            )
            .unwrap();
        assert_eq!(without.subject, "[Forward] Order #3 shipped");
        assert!(!without.text_body.contains("Tracking number"));
    }

    #[tokio::test]
    async fn test_send_reports_failure_without_error() {
        let mailer = RecordingMailer::new();
        let admin = Email::parse("ops@teestudio.example").unwrap();
        let customer = Email::parse("taro@example.jp").unwrap();
        let service = NotificationService::new(&mailer, &admin);
        let notification = Notification::StatusUpdate {
            order_id: OrderId::new(5),
            old_status: "Processing",
            new_status: "Payment complete",
        };

        assert!(service.send(&notification, &customer).await);
        assert_eq!(mailer.sent().len(), 1);
        assert!(mailer.sent()[0].text_body.contains("Processing -> Payment complete"));

        mailer.fail();
        assert!(!service.send(&notification, &customer).await);
        assert_eq!(mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_send_test_reaches_operator_and_reports_failure() {
        let mailer = RecordingMailer::new();
        let admin = Email::parse("ops@teestudio.example").unwrap();
        let service = NotificationService::new(&mailer, &admin);

        service.send_test().await.unwrap();
        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ops@teestudio.example");
        assert_eq!(sent[0].subject, "[Forward] New order #0");
        assert!(sent[0].text_body.contains("¥3,000"));

        mailer.fail();
        assert!(matches!(
            service.send_test().await,
            Err(EmailError::Rejected(_))
        ));
    }
}
