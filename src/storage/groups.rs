use anyhow::{Context, Result};

use super::Store;

impl Store {
    /// Add a group link. Returns false if it was already monitored.
    pub async fn add_group(&self, group_link: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let rows = conn
            .execute(
                "INSERT OR IGNORE INTO groups (group_link) VALUES (?1)",
                rusqlite::params![group_link],
            )
            .context("Failed to add group")?;
        Ok(rows > 0)
    }

    pub async fn delete_group(&self, group_link: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let rows = conn
            .execute(
                "DELETE FROM groups WHERE group_link = ?1",
                rusqlite::params![group_link],
            )
            .context("Failed to delete group")?;
        Ok(rows > 0)
    }

    /// All group links, in insertion order
    pub async fn get_all_groups(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT group_link FROM groups ORDER BY id")?;
        let groups = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()
            .context("Failed to load groups")?;
        Ok(groups)
    }
}
