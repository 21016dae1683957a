use std::collections::BTreeSet;

use anyhow::Result;
use tracing::{info, warn};

use super::matcher::KeywordSet;
use crate::storage::Store;

/// Working set for one monitor cycle, loaded explicitly from storage.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub keywords: KeywordSet,
    pub groups: Vec<String>,
    /// Alert recipients: stored admins merged with statically configured ids
    pub admins: Vec<i64>,
}

impl Session {
    pub async fn load(store: &Store, static_admins: &[i64]) -> Result<Self> {
        let mut session = Self::default();
        session.reload(store, static_admins).await?;
        Ok(session)
    }

    /// Replace the working set with what storage holds now
    pub async fn reload(&mut self, store: &Store, static_admins: &[i64]) -> Result<()> {
        let keywords = KeywordSet::new(store.get_all_keywords().await?);

        let mut seen = BTreeSet::new();
        let groups: Vec<String> = store
            .get_all_groups()
            .await?
            .into_iter()
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty() && seen.insert(g.clone()))
            .collect();

        let admins: BTreeSet<i64> = static_admins
            .iter()
            .copied()
            .chain(store.get_all_admins().await?)
            .collect();

        if keywords.is_empty() {
            warn!("No keywords configured, no message will match");
        }
        if admins.is_empty() {
            warn!("No admins configured, alerts will only be logged");
        }
        info!(
            "Session loaded: {} group(s), {} keyword(s), {} admin(s)",
            groups.len(),
            keywords.len(),
            admins.len()
        );

        self.keywords = keywords;
        self.groups = groups;
        self.admins = admins.into_iter().collect();
        Ok(())
    }
}
