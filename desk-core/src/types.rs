use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    Agent,
    Customer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Agent => "AGENT",
            Role::Customer => "CUSTOMER",
        }
    }

    pub fn parse(raw: &str) -> Option<Role> {
        match raw.to_uppercase().as_str() {
            "ADMIN" => Some(Role::Admin),
            "AGENT" => Some(Role::Agent),
            "CUSTOMER" => Some(Role::Customer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub role: String,
    pub store_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: Uuid,
    pub store_id: Option<Uuid>,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub data: Option<serde_json::Value>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub store_id: Uuid,
    pub customer_id: Uuid,
    pub subject: String,
    pub status: String,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallLog {
    pub id: i64,
    pub store_id: Uuid,
    pub caller_number: String,
    pub outcome: String,
    pub created_at: DateTime<Utc>,
}

/// The `(user, optional store)` pair every notification query is filtered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scope {
    pub user_id: Uuid,
    pub store_id: Option<Uuid>,
}

impl Scope {
    pub fn new(user_id: Uuid, store_id: Option<Uuid>) -> Self {
        Scope { user_id, store_id }
    }

    /// Redis key holding the user's total unread counter.
    pub fn total_unread_key(&self) -> String {
        format!("UNREAD:{}", self.user_id)
    }

    /// Redis key holding the per-store unread counter, when the scope
    /// carries a store.
    pub fn store_unread_key(&self) -> Option<String> {
        self.store_id
            .map(|store_id| format!("UNREAD:{}:{}", self.user_id, store_id))
    }

    /// The key the scope's unread count is read from: the store counter
    /// when scoped to a store, the total otherwise.
    pub fn counter_key(&self) -> String {
        self.store_unread_key()
            .unwrap_or_else(|| self.total_unread_key())
    }

    /// Redis set tracking which per-store counter keys exist for the user,
    /// so a user-wide invalidation can find and remove all of them. Cannot
    /// collide with `store_unread_key` values since store ids are UUIDs.
    pub fn store_index_key(&self) -> String {
        format!("UNREAD:{}:stores", self.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parse_is_case_insensitive() {
        assert_eq!(Role::parse("admin"), Some(Role::Admin));
        assert_eq!(Role::parse("AGENT"), Some(Role::Agent));
        assert_eq!(Role::parse("Customer"), Some(Role::Customer));
        assert_eq!(Role::parse("superuser"), None);
    }

    #[test]
    fn scope_counter_keys() {
        let user = Uuid::new_v4();
        let store = Uuid::new_v4();

        let total = Scope::new(user, None);
        assert_eq!(total.total_unread_key(), format!("UNREAD:{}", user));
        assert_eq!(total.store_unread_key(), None);
        assert_eq!(total.counter_key(), total.total_unread_key());

        let scoped = Scope::new(user, Some(store));
        assert_eq!(
            scoped.store_unread_key(),
            Some(format!("UNREAD:{}:{}", user, store))
        );
        assert_eq!(scoped.counter_key(), scoped.store_unread_key().unwrap());
    }

    #[test]
    fn store_index_key_is_distinct_from_counter_keys() {
        let user = Uuid::new_v4();
        let store = Uuid::new_v4();
        let scope = Scope::new(user, Some(store));

        assert_eq!(scope.store_index_key(), format!("UNREAD:{}:stores", user));
        assert_ne!(scope.store_index_key(), scope.total_unread_key());
        assert_ne!(Some(scope.store_index_key()), scope.store_unread_key());
    }
}
