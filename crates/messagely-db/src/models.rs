use chrono::{DateTime, Utc};

/// Full `users` row, password hash included. Never serialized; the API layer
/// works with the projections in `messagely_types::models`.
#[derive(Debug, Clone)]
pub struct UserRow {
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub join_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Registration input. `password` is plaintext and is hashed before insert.
#[derive(Debug, Clone, Copy)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub phone: &'a str,
}
