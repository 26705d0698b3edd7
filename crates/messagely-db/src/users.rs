use chrono::Utc;
use rusqlite::{OptionalExtension, Row, ffi, params};
use tracing::debug;

use messagely_types::models::{ReceivedMessage, SentMessage, UserDetail, UserSummary};

use crate::error::constraint_code;
use crate::models::{NewUser, UserRow};
use crate::{Database, DbError, Hasher};

impl Database {
    /// Hash the password, insert the user and return the stored row. The
    /// returned row still carries the hash; callers must not echo it.
    pub fn register_user(&self, hasher: &Hasher, new_user: &NewUser<'_>) -> Result<UserRow, DbError> {
        let password_hash = hasher.hash(new_user.password)?;
        let now = Utc::now();

        self.with_conn(|conn| {
            conn.query_row(
                "INSERT INTO users (username, password, first_name, last_name, phone, join_at, last_login_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 RETURNING username, password, first_name, last_name, phone, join_at, last_login_at",
                params![
                    new_user.username,
                    password_hash,
                    new_user.first_name,
                    new_user.last_name,
                    new_user.phone,
                    now,
                ],
                |row| {
                    Ok(UserRow {
                        username: row.get(0)?,
                        password: row.get(1)?,
                        first_name: row.get(2)?,
                        last_name: row.get(3)?,
                        phone: row.get(4)?,
                        join_at: row.get(5)?,
                        last_login_at: row.get(6)?,
                    })
                },
            )
            .map_err(|e| match constraint_code(&e) {
                Some(ffi::SQLITE_CONSTRAINT_PRIMARYKEY | ffi::SQLITE_CONSTRAINT_UNIQUE) => {
                    DbError::Conflict(format!("Username already taken: {}", new_user.username))
                }
                _ => e.into(),
            })
        })
    }

    /// True only when the user exists and the password matches its hash.
    /// An unknown username is reported the same way as a wrong password.
    pub fn authenticate(&self, hasher: &Hasher, username: &str, password: &str) -> Result<bool, DbError> {
        let stored: Option<String> = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT password FROM users WHERE username = ?1",
                    [username],
                    |row| row.get(0),
                )
                .optional()?)
        })?;

        match stored {
            Some(hash) => hasher.verify(password, &hash),
            None => {
                debug!("authenticate: unknown user {}", username);
                Ok(false)
            }
        }
    }

    /// Stamp `last_login_at`. Unknown usernames are silently ignored.
    pub fn update_login_timestamp(&self, username: &str) -> Result<(), DbError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET last_login_at = ?2 WHERE username = ?1",
                params![username, Utc::now()],
            )?;
            Ok(())
        })
    }

    pub fn all_users(&self) -> Result<Vec<UserSummary>, DbError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT username, first_name, last_name, phone FROM users ORDER BY username",
            )?;

            let users = stmt
                .query_map([], |row| user_summary(row, 0))?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(users)
        })
    }

    pub fn get_user(&self, username: &str) -> Result<UserDetail, DbError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT username, first_name, last_name, phone, join_at, last_login_at
                 FROM users WHERE username = ?1",
                [username],
                |row| {
                    Ok(UserDetail {
                        username: row.get(0)?,
                        first_name: row.get(1)?,
                        last_name: row.get(2)?,
                        phone: row.get(3)?,
                        join_at: row.get(4)?,
                        last_login_at: row.get(5)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| DbError::NotFound(format!("No such user: {}", username)))
        })
    }

    /// Messages sent by `username`, oldest first, each with its recipient.
    pub fn messages_from(&self, username: &str) -> Result<Vec<SentMessage>, DbError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.body, m.sent_at, m.read_at,
                        u.username, u.first_name, u.last_name, u.phone
                 FROM messages m
                 JOIN users u ON m.to_username = u.username
                 WHERE m.from_username = ?1
                 ORDER BY m.sent_at, m.id",
            )?;

            let rows = stmt
                .query_map([username], |row| {
                    Ok(SentMessage {
                        id: row.get(0)?,
                        body: row.get(1)?,
                        sent_at: row.get(2)?,
                        read_at: row.get(3)?,
                        to_user: user_summary(row, 4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Messages received by `username`, oldest first, each with its sender.
    pub fn messages_to(&self, username: &str) -> Result<Vec<ReceivedMessage>, DbError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.body, m.sent_at, m.read_at,
                        u.username, u.first_name, u.last_name, u.phone
                 FROM messages m
                 JOIN users u ON m.from_username = u.username
                 WHERE m.to_username = ?1
                 ORDER BY m.sent_at, m.id",
            )?;

            let rows = stmt
                .query_map([username], |row| {
                    Ok(ReceivedMessage {
                        id: row.get(0)?,
                        body: row.get(1)?,
                        sent_at: row.get(2)?,
                        read_at: row.get(3)?,
                        from_user: user_summary(row, 4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

/// Read `username, first_name, last_name, phone` starting at column `at`.
pub(crate) fn user_summary(row: &Row<'_>, at: usize) -> rusqlite::Result<UserSummary> {
    Ok(UserSummary {
        username: row.get(at)?,
        first_name: row.get(at + 1)?,
        last_name: row.get(at + 2)?,
        phone: row.get(at + 3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{cheap_hasher, seed_user};

    fn alice() -> NewUser<'static> {
        NewUser {
            username: "alice",
            password: "secret",
            first_name: "Alice",
            last_name: "Liddell",
            phone: "+15550101",
        }
    }

    #[test]
    fn register_stores_a_hash_and_stamps_times() {
        let db = Database::open_in_memory().unwrap();
        let hasher = cheap_hasher();

        let row = db.register_user(&hasher, &alice()).unwrap();
        assert_eq!(row.username, "alice");
        assert_eq!(row.first_name, "Alice");
        assert_ne!(row.password, "secret");
        assert_eq!(row.last_login_at, Some(row.join_at));
    }

    #[test]
    fn duplicate_username_is_a_conflict() {
        let db = Database::open_in_memory().unwrap();
        let hasher = cheap_hasher();

        db.register_user(&hasher, &alice()).unwrap();
        let err = db.register_user(&hasher, &alice()).unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
    }

    #[test]
    fn authenticate_checks_the_password() {
        let db = Database::open_in_memory().unwrap();
        let hasher = cheap_hasher();
        db.register_user(&hasher, &alice()).unwrap();

        assert!(db.authenticate(&hasher, "alice", "secret").unwrap());
        assert!(!db.authenticate(&hasher, "alice", "wrong").unwrap());
    }

    #[test]
    fn authenticate_unknown_user_is_false() {
        let db = Database::open_in_memory().unwrap();
        let hasher = cheap_hasher();

        assert!(!db.authenticate(&hasher, "nonexistent", "anything").unwrap());
    }

    #[test]
    fn login_timestamp_moves_forward() {
        let db = Database::open_in_memory().unwrap();
        let hasher = cheap_hasher();
        let row = db.register_user(&hasher, &alice()).unwrap();

        db.update_login_timestamp("alice").unwrap();
        let user = db.get_user("alice").unwrap();
        assert!(user.last_login_at.unwrap() >= row.join_at);
        assert_eq!(user.join_at, row.join_at);
    }

    #[test]
    fn login_timestamp_for_unknown_user_is_ignored() {
        let db = Database::open_in_memory().unwrap();
        db.update_login_timestamp("ghost").unwrap();
    }

    #[test]
    fn get_missing_user_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let err = db.get_user("ghost").unwrap_err();
        assert!(matches!(err, DbError::NotFound(msg) if msg.contains("ghost")));
    }

    #[test]
    fn all_lists_every_user() {
        let db = Database::open_in_memory().unwrap();
        let hasher = cheap_hasher();
        seed_user(&db, &hasher, "carol");
        seed_user(&db, &hasher, "bob");

        let users = db.all_users().unwrap();
        let names: Vec<_> = users.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, ["bob", "carol"]);
        assert_eq!(users[0].last_name, "bob");
    }

    #[test]
    fn inbox_and_outbox_expand_the_other_party() {
        let db = Database::open_in_memory().unwrap();
        let hasher = cheap_hasher();
        seed_user(&db, &hasher, "alice");
        seed_user(&db, &hasher, "bob");

        db.create_message("alice", "bob", "first").unwrap();
        db.create_message("alice", "bob", "second").unwrap();
        db.create_message("bob", "alice", "reply").unwrap();

        let sent = db.messages_from("alice").unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].body, "first");
        assert_eq!(sent[1].body, "second");
        assert_eq!(sent[0].to_user.username, "bob");
        assert!(sent[0].read_at.is_none());

        let received = db.messages_to("alice").unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].body, "reply");
        assert_eq!(received[0].from_user.username, "bob");
    }

    #[test]
    fn inbox_of_unknown_user_is_empty() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.messages_to("ghost").unwrap().is_empty());
        assert!(db.messages_from("ghost").unwrap().is_empty());
    }
}
