//! Client models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::ClientId;

/// A registered bank client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    /// National identity document number, unique per client
    pub national_id: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub birth_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// Client data before registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewClient {
    pub national_id: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub birth_date: NaiveDate,
}

impl NewClient {
    /// Attach the id assigned by storage
    pub fn assign_id(self, id: ClientId) -> Client {
        Client {
            id,
            national_id: self.national_id,
            first_name: self.first_name,
            last_name: self.last_name,
            phone: self.phone,
            birth_date: self.birth_date,
            created_at: Utc::now(),
        }
    }
}
