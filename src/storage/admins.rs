use anyhow::{Context, Result};

use super::Store;

/// A user who has talked to the admin bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub tg_id: i64,
    pub username: Option<String>,
}

impl Store {
    /// Record a user, keeping the first username seen
    pub async fn add_user(&self, tg_id: i64, username: Option<&str>) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR IGNORE INTO users (tg_id, username) VALUES (?1, ?2)",
            rusqlite::params![tg_id, username],
        )
        .context("Failed to add user")?;
        Ok(())
    }

    pub async fn get_user(&self, tg_id: i64) -> Result<Option<User>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT tg_id, username FROM users WHERE tg_id = ?1")
            .context("Failed to prepare get_user query")?;
        let mut rows = stmt
            .query_map(rusqlite::params![tg_id], |row| {
                Ok(User {
                    tg_id: row.get(0)?,
                    username: row.get(1)?,
                })
            })
            .context("Failed to query user")?;
        match rows.next() {
            Some(Ok(user)) => Ok(Some(user)),
            Some(Err(e)) => Err(e).context("Failed to read user row"),
            None => Ok(None),
        }
    }

    /// Add an admin. Returns false if they were already one.
    pub async fn add_admin(&self, tg_id: i64) -> Result<bool> {
        let conn = self.conn.lock().await;
        let rows = conn
            .execute(
                "INSERT OR IGNORE INTO admins (tg_id) VALUES (?1)",
                rusqlite::params![tg_id],
            )
            .context("Failed to add admin")?;
        Ok(rows > 0)
    }

    pub async fn is_admin(&self, tg_id: i64) -> Result<bool> {
        let conn = self.conn.lock().await;
        let found: bool = conn
            .query_row(
                "SELECT count(*) > 0 FROM admins WHERE tg_id = ?1",
                rusqlite::params![tg_id],
                |row| row.get(0),
            )
            .context("Failed to check admin status")?;
        Ok(found)
    }

    pub async fn get_all_admins(&self) -> Result<Vec<i64>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT tg_id FROM admins ORDER BY id")?;
        let admins = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()
            .context("Failed to load admins")?;
        Ok(admins)
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::Store;

    #[tokio::test]
    async fn test_add_admin_once() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.add_admin(42).await.unwrap());
        assert!(!store.add_admin(42).await.unwrap());
        assert!(store.is_admin(42).await.unwrap());
        assert!(!store.is_admin(7).await.unwrap());
        assert_eq!(store.get_all_admins().await.unwrap(), vec![42]);
    }

    #[tokio::test]
    async fn test_add_and_get_user() {
        let store = Store::open_in_memory().unwrap();
        store.add_user(5, Some("alice")).await.unwrap();
        store.add_user(5, Some("renamed")).await.unwrap();

        let user = store.get_user(5).await.unwrap().unwrap();
        assert_eq!(user.username.as_deref(), Some("alice"));
        assert!(store.get_user(6).await.unwrap().is_none());
    }
}
