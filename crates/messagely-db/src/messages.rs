use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, ffi, params};

use messagely_types::models::{MessageDetail, NewMessage, ReadReceipt};

use crate::error::constraint_code;
use crate::users::user_summary;
use crate::{Database, DbError};

impl Database {
    /// One message with both participants expanded.
    pub fn get_message(&self, id: i64) -> Result<MessageDetail, DbError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT m.id, m.body, m.sent_at, m.read_at,
                        f.username, f.first_name, f.last_name, f.phone,
                        t.username, t.first_name, t.last_name, t.phone
                 FROM messages m
                 JOIN users f ON m.from_username = f.username
                 JOIN users t ON m.to_username = t.username
                 WHERE m.id = ?1",
                [id],
                |row| {
                    Ok(MessageDetail {
                        id: row.get(0)?,
                        body: row.get(1)?,
                        sent_at: row.get(2)?,
                        read_at: row.get(3)?,
                        from_user: user_summary(row, 4)?,
                        to_user: user_summary(row, 8)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| DbError::NotFound(format!("No such message: {}", id)))
        })
    }

    pub fn create_message(
        &self,
        from_username: &str,
        to_username: &str,
        body: &str,
    ) -> Result<NewMessage, DbError> {
        self.with_conn(|conn| {
            conn.query_row(
                "INSERT INTO messages (from_username, to_username, body, sent_at)
                 VALUES (?1, ?2, ?3, ?4)
                 RETURNING id, from_username, to_username, body, sent_at",
                params![from_username, to_username, body, Utc::now()],
                |row| {
                    Ok(NewMessage {
                        id: row.get(0)?,
                        from_username: row.get(1)?,
                        to_username: row.get(2)?,
                        body: row.get(3)?,
                        sent_at: row.get(4)?,
                    })
                },
            )
            .or_else(|e| match constraint_code(&e) {
                Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => {
                    let missing = if user_exists(conn, from_username)? {
                        to_username
                    } else {
                        from_username
                    };
                    Err(DbError::NotFound(format!("No such user: {}", missing)))
                }
                _ => Err(e.into()),
            })
        })
    }

    /// Stamp `read_at`. Only the first call sets it; later calls return the
    /// original stamp unchanged.
    pub fn mark_read(&self, id: i64) -> Result<ReadReceipt, DbError> {
        self.with_conn(|conn| {
            conn.query_row(
                "UPDATE messages SET read_at = COALESCE(read_at, ?2)
                 WHERE id = ?1
                 RETURNING id, read_at",
                params![id, Utc::now()],
                |row| {
                    Ok(ReadReceipt {
                        id: row.get(0)?,
                        read_at: row.get(1)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| DbError::NotFound(format!("No such message: {}", id)))
        })
    }
}

fn user_exists(conn: &Connection, username: &str) -> Result<bool, DbError> {
    Ok(conn
        .query_row("SELECT 1 FROM users WHERE username = ?1", [username], |_| Ok(()))
        .optional()?
        .is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{cheap_hasher, seed_user};

    fn db_with_pair() -> Database {
        let db = Database::open_in_memory().unwrap();
        let hasher = cheap_hasher();
        seed_user(&db, &hasher, "alice");
        seed_user(&db, &hasher, "bob");
        db
    }

    #[test]
    fn create_then_get_expands_both_users() {
        let db = db_with_pair();

        let created = db.create_message("alice", "bob", "hello").unwrap();
        assert_eq!(created.from_username, "alice");
        assert_eq!(created.to_username, "bob");

        let msg = db.get_message(created.id).unwrap();
        assert_eq!(msg.body, "hello");
        assert_eq!(msg.sent_at, created.sent_at);
        assert_eq!(msg.from_user.username, "alice");
        assert_eq!(msg.to_user.username, "bob");
        assert!(msg.read_at.is_none());
    }

    #[test]
    fn ids_are_assigned_in_order() {
        let db = db_with_pair();
        let a = db.create_message("alice", "bob", "a").unwrap();
        let b = db.create_message("bob", "alice", "b").unwrap();
        assert!(b.id > a.id);
    }

    #[test]
    fn unknown_recipient_is_not_found() {
        let db = db_with_pair();
        let err = db.create_message("alice", "ghost", "boo").unwrap_err();
        assert!(matches!(err, DbError::NotFound(msg) if msg.contains("ghost")));
    }

    #[test]
    fn unknown_sender_is_named_in_the_error() {
        let db = db_with_pair();
        let err = db.create_message("ghost", "bob", "boo").unwrap_err();
        assert!(matches!(err, DbError::NotFound(msg) if msg == "No such user: ghost"));
    }

    #[test]
    fn get_missing_message_is_not_found() {
        let db = db_with_pair();
        assert!(matches!(db.get_message(42), Err(DbError::NotFound(_))));
    }

    #[test]
    fn mark_read_sets_read_at_once() {
        let db = db_with_pair();
        let created = db.create_message("alice", "bob", "hello").unwrap();

        let first = db.mark_read(created.id).unwrap();
        assert_eq!(first.id, created.id);
        assert_eq!(db.get_message(created.id).unwrap().read_at, Some(first.read_at));

        let second = db.mark_read(created.id).unwrap();
        assert_eq!(second.read_at, first.read_at);
    }

    #[test]
    fn mark_read_missing_message_is_not_found() {
        let db = db_with_pair();
        assert!(matches!(db.mark_read(7), Err(DbError::NotFound(_))));
    }
}
