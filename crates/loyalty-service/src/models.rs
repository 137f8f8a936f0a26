//! Data models for the loyalty service

use chrono::{DateTime, Utc};
use loyalty_common::{Amount, CustomerId, Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Display format for purchase timestamps on the dashboard
pub const PURCHASE_DATE_FORMAT: &str = "%d-%m-%Y %H:%M";

/// Customer record
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Customer {
    /// Surrogate key, never leaves the service
    pub id: i64,

    #[sqlx(try_from = "String")]
    pub customer_id: CustomerId,

    pub name: String,
    pub phone: String,
    pub email: String,

    /// Current point balance
    pub points: i64,
}

/// Purchase record
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Purchase {
    pub id: i64,

    #[sqlx(try_from = "String")]
    pub customer_id: CustomerId,

    #[sqlx(rename = "amount_minor", try_from = "i64")]
    pub amount: Amount,

    pub points_earned: i64,

    pub created_at: DateTime<Utc>,
}

/// Validated registration input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCustomer {
    pub name: String,
    pub phone: String,
    pub email: String,
}

impl NewCustomer {
    /// Trim all fields and reject empty ones
    pub fn new(name: &str, phone: &str, email: &str) -> Result<Self> {
        let field = |label: &str, value: &str| -> Result<String> {
            let value = value.trim();
            if value.is_empty() {
                return Err(Error::InvalidInput(format!("{label} is required")));
            }
            Ok(value.to_string())
        };

        Ok(Self {
            name: field("name", name)?,
            phone: field("phone", phone)?,
            email: field("email", email)?,
        })
    }
}

/// Outcome of recording a purchase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PurchaseReceipt {
    pub points_added: i64,
    pub total_points: i64,
}

/// Customer profile with the full purchase history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dashboard {
    pub customer: Customer,
    pub purchases: Vec<Purchase>,
}

/// Admin login form
#[derive(Debug, Deserialize)]
pub struct AdminLoginForm {
    pub username: String,
    pub password: String,
}

/// Customer login form
#[derive(Debug, Deserialize)]
pub struct CustomerLoginForm {
    pub customer_id: String,
}

/// Registration form, shared by the admin and self-service entry points
#[derive(Debug, Deserialize)]
pub struct RegisterCustomerForm {
    pub name: String,
    pub phone: String,
    pub email: String,
}

/// Purchase form; the amount stays text until parsed into minor units
#[derive(Debug, Deserialize)]
pub struct AddPurchaseForm {
    pub customer_id: String,
    pub amount: String,
}

/// Response from registration
#[derive(Debug, Serialize)]
pub struct RegisterCustomerResponse {
    pub message: String,
    pub customer_id: CustomerId,
}

/// Response from recording a purchase
#[derive(Debug, Serialize)]
pub struct AddPurchaseResponse {
    pub message: String,
    #[serde(flatten)]
    pub receipt: PurchaseReceipt,
}

/// Dashboard payload
#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub customer: CustomerProfile,
    pub purchases: Vec<PurchaseEntry>,
}

#[derive(Debug, Serialize)]
pub struct CustomerProfile {
    pub customer_id: CustomerId,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub total_points: i64,
}

#[derive(Debug, Serialize)]
pub struct PurchaseEntry {
    pub amount: Amount,
    pub points_earned: i64,
    pub date: String,
}

impl From<Dashboard> for DashboardResponse {
    fn from(dashboard: Dashboard) -> Self {
        let Dashboard {
            customer,
            purchases,
        } = dashboard;

        Self {
            customer: CustomerProfile {
                customer_id: customer.customer_id,
                name: customer.name,
                phone: customer.phone,
                email: customer.email,
                total_points: customer.points,
            },
            purchases: purchases
                .into_iter()
                .map(|p| PurchaseEntry {
                    amount: p.amount,
                    points_earned: p.points_earned,
                    date: p.created_at.format(PURCHASE_DATE_FORMAT).to_string(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_customer_trims_and_requires_fields() {
        let c = NewCustomer::new(" Alice ", "555-0001", " alice@example.com").unwrap();
        assert_eq!(c.name, "Alice");
        assert_eq!(c.email, "alice@example.com");

        let err = NewCustomer::new("Alice", "   ", "alice@example.com").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(msg) if msg.contains("phone")));
    }

    #[test]
    fn test_dashboard_response_formats_purchases() {
        let customer_id = CustomerId::from_sequence(1).unwrap();
        let dashboard = Dashboard {
            customer: Customer {
                id: 1,
                customer_id: customer_id.clone(),
                name: "Alice".to_string(),
                phone: "555-0001".to_string(),
                email: "alice@example.com".to_string(),
                points: 19,
            },
            purchases: vec![Purchase {
                id: 1,
                customer_id,
                amount: "19.99".parse().unwrap(),
                points_earned: 19,
                created_at: Utc.with_ymd_and_hms(2026, 3, 4, 9, 5, 0).unwrap(),
            }],
        };

        let json = serde_json::to_value(DashboardResponse::from(dashboard)).unwrap();
        assert_eq!(json["customer"]["customer_id"], "TNM00001");
        assert_eq!(json["customer"]["total_points"], 19);
        assert_eq!(json["purchases"][0]["amount"], "19.99");
        assert_eq!(json["purchases"][0]["points_earned"], 19);
        assert_eq!(json["purchases"][0]["date"], "04-03-2026 09:05");
    }

    #[test]
    fn test_purchase_response_is_flat() {
        let response = AddPurchaseResponse {
            message: "Purchase added".to_string(),
            receipt: PurchaseReceipt {
                points_added: 5,
                total_points: 24,
            },
        };
        let json = serde_json::to_value(response).unwrap();
        assert_eq!(json["points_added"], 5);
        assert_eq!(json["total_points"], 24);
    }
}
