use anyhow::{Context, Result};

use super::Store;

impl Store {
    /// Add a keyword phrase. Returns false if it already existed.
    pub async fn add_keyword(&self, key_text: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let rows = conn
            .execute(
                "INSERT OR IGNORE INTO keywords (key_text) VALUES (?1)",
                rusqlite::params![key_text],
            )
            .context("Failed to add keyword")?;
        Ok(rows > 0)
    }

    pub async fn delete_keyword(&self, key_text: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let rows = conn
            .execute(
                "DELETE FROM keywords WHERE key_text = ?1",
                rusqlite::params![key_text],
            )
            .context("Failed to delete keyword")?;
        Ok(rows > 0)
    }

    pub async fn get_all_keywords(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT key_text FROM keywords ORDER BY id")?;
        let keywords = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()
            .context("Failed to load keywords")?;
        Ok(keywords)
    }
}
