use chrono::{DateTime, Utc};
use mongodb::bson::DateTime as BsonDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    candidate::validate_id,
    password::{hash_password, verify_password},
};

/// Role granted to every administrator.
pub const ELECTION_OFFICER_ROLE: &str = "election-officer";

/// An administrator account as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Admin {
    pub admin_id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub last_login_at: Option<BsonDateTime>,
}

impl Admin {
    pub fn verify_password(&self, password: &str) -> bool {
        verify_password(&self.password_hash, password)
    }

    pub fn profile(&self) -> AdminProfile {
        AdminProfile {
            admin_id: self.admin_id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            roles: self.roles.clone(),
            last_login_at: self.last_login_at.map(BsonDateTime::to_chrono),
        }
    }
}

/// Plaintext details of an admin to be created. Never stored directly.
#[derive(Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAdmin {
    pub admin_id: String,
    pub name: String,
    pub email: String,
    pub password: String,
}

impl NewAdmin {
    fn new(admin_id: &str, name: &str, email: &str, password: &str) -> Self {
        Self {
            admin_id: admin_id.to_string(),
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        }
    }
}

impl TryFrom<NewAdmin> for Admin {
    type Error = Error;

    /// Hash the password and normalise the email address.
    fn try_from(new: NewAdmin) -> Result<Self> {
        let admin_id = validate_id("adminId", &new.admin_id)?.to_string();
        let email = new.email.trim().to_lowercase();
        if !email.contains('@') {
            return Err(Error::Validation(format!("Invalid email address {email:?}")));
        }
        Ok(Self {
            admin_id,
            name: new.name.trim().to_string(),
            email,
            password_hash: hash_password(&new.password)?,
            roles: vec![ELECTION_OFFICER_ROLE.to_string()],
            last_login_at: None,
        })
    }
}

/// Admin login request: either the admin id or the email identifies the account.
#[derive(Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminLogin {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub password: String,
}

/// What an admin may see about themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminProfile {
    pub admin_id: String,
    pub name: String,
    pub email: String,
    pub roles: Vec<String>,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Accounts created on a fresh deployment.
pub fn default_admins() -> Vec<NewAdmin> {
    vec![
        NewAdmin::new(
            "admin-001",
            "Election Officer Alpha",
            "alpha@evote.local",
            "AlphaSecure#2025",
        ),
        NewAdmin::new(
            "admin-002",
            "Election Officer Bravo",
            "bravo@evote.local",
            "BravoSecure#2025",
        ),
        NewAdmin::new(
            "admin-003",
            "Election Officer Charlie",
            "charlie@evote.local",
            "CharlieSecure#2025",
        ),
    ]
}
