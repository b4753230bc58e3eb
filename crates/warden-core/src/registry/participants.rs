//! Participant lifecycle.

use std::time::Duration;

use chrono::Utc;
use tracing::info;

use super::{
    types::{Participant, ParticipantStatus, Registry},
    ParticipantRegistry,
};
use crate::{Error, Result};

fn participant_mut<'a>(
    registry: &'a mut Registry,
    domain: &str,
    id: &str,
) -> Result<&'a mut Participant> {
    registry
        .participants
        .get_mut(id)
        .ok_or_else(|| Error::NotFound(format!("participant '{id}' in domain '{domain}'")))
}

impl ParticipantRegistry {
    /// Register a new participant, creating the domain if needed.
    pub async fn register(&self, domain: &str, work_stream: Option<&str>) -> Result<String> {
        self.ensure(domain)?;
        let id = self.ids.next_id();
        let label = work_stream.map(str::to_string);

        self.mutate(domain, |registry| {
            registry.participants.insert(
                id.clone(),
                Participant::new(id.clone(), label.clone(), Utc::now()),
            );
            Ok(())
        })
        .await?;

        info!(domain, participant = %id, "Participant registered");
        Ok(id)
    }

    /// Record a heartbeat, reactivating a stale participant.
    pub async fn heartbeat(&self, domain: &str, id: &str) -> Result<()> {
        self.mutate(domain, |registry| {
            let participant = participant_mut(registry, domain, id)?;
            participant.last_heartbeat = Utc::now();
            participant.status = ParticipantStatus::Active;
            Ok(())
        })
        .await
    }

    /// Remove a participant. Unknown ids and domains are not an error.
    pub async fn unregister(&self, domain: &str, id: &str) -> Result<bool> {
        if !self.document_path(domain)?.exists() {
            return Ok(false);
        }
        let removed = self
            .mutate(domain, |registry| Ok(registry.participants.remove(id).is_some()))
            .await?;
        if removed {
            info!(domain, participant = id, "Participant unregistered");
        }
        Ok(removed)
    }

    /// Participants currently marked active.
    pub fn list_active(&self, domain: &str) -> Result<Vec<Participant>> {
        Ok(self
            .list_all(domain)?
            .into_iter()
            .filter(|p| p.status == ParticipantStatus::Active)
            .collect())
    }

    /// Every participant, active or stale.
    pub fn list_all(&self, domain: &str) -> Result<Vec<Participant>> {
        Ok(self
            .snapshot(domain)?
            .map(|registry| registry.participants.into_values().collect())
            .unwrap_or_default())
    }

    pub fn get(&self, domain: &str, id: &str) -> Result<Participant> {
        self.snapshot(domain)?
            .and_then(|mut registry| registry.participants.remove(id))
            .ok_or_else(|| Error::NotFound(format!("participant '{id}' in domain '{domain}'")))
    }

    /// Mark participants silent for longer than `threshold` as stale.
    ///
    /// Returns the ids that changed state. Nobody is removed.
    pub async fn sweep_stale(&self, domain: &str, threshold: Duration) -> Result<Vec<String>> {
        if !self.document_path(domain)?.exists() {
            return Ok(Vec::new());
        }
        let threshold = chrono::Duration::from_std(threshold).unwrap_or(chrono::Duration::MAX);

        let marked = self
            .mutate(domain, |registry| {
                let now = Utc::now();
                Ok(registry
                    .participants
                    .values_mut()
                    .filter(|p| p.status == ParticipantStatus::Active)
                    .filter(|p| now.signed_duration_since(p.last_heartbeat) > threshold)
                    .map(|p| {
                        p.status = ParticipantStatus::Stale;
                        p.id.clone()
                    })
                    .collect::<Vec<_>>())
            })
            .await?;

        if !marked.is_empty() {
            info!(domain, stale = ?marked, "Marked silent participants stale");
        }
        Ok(marked)
    }

    /// [`Self::sweep_stale`] with the configured threshold.
    pub async fn sweep_stale_default(&self, domain: &str) -> Result<Vec<String>> {
        self.sweep_stale(domain, self.config.stale_threshold()).await
    }

    /// Bump the commit counter, returning the new count.
    pub async fn increment_commits(&self, domain: &str, id: &str) -> Result<u64> {
        self.mutate(domain, |registry| {
            let participant = participant_mut(registry, domain, id)?;
            participant.commits = participant.commits.saturating_add(1);
            Ok(participant.commits)
        })
        .await
    }

    /// Returns `false` if the file was already listed.
    pub async fn add_locked_file(&self, domain: &str, id: &str, file: &str) -> Result<bool> {
        self.mutate(domain, |registry| {
            Ok(participant_mut(registry, domain, id)?
                .locked_files
                .insert(file.to_string()))
        })
        .await
    }

    /// Returns `false` if the file was not listed.
    pub async fn remove_locked_file(&self, domain: &str, id: &str, file: &str) -> Result<bool> {
        self.mutate(domain, |registry| {
            Ok(participant_mut(registry, domain, id)?.locked_files.remove(file))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::{registry::test_support::registry, version::VersionStore};

    #[tokio::test]
    async fn test_register_creates_active_participant() -> Result<()> {
        let dir = TempDir::new().map_err(|e| Error::io("tempdir", e))?;
        let reg = registry(&dir);

        let id = reg.register("epic-x", Some("backend")).await?;

        assert_eq!(id, "p1");
        let participant = reg.get("epic-x", &id)?;
        assert_eq!(participant.status, ParticipantStatus::Active);
        assert_eq!(participant.work_stream.as_deref(), Some("backend"));
        assert_eq!(reg.list_active("epic-x")?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_every_mutation_bumps_document_version() -> Result<()> {
        let dir = TempDir::new().map_err(|e| Error::io("tempdir", e))?;
        let reg = registry(&dir);
        let versions = VersionStore::default();

        let id = reg.register("epic-x", None).await?;
        let path = reg.document_path("epic-x")?;
        assert_eq!(versions.get_version(&path)?, 2);

        reg.heartbeat("epic-x", &id).await?;
        reg.increment_commits("epic-x", &id).await?;
        assert_eq!(versions.get_version(&path)?, 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_heartbeat_after_unregister_is_not_found() -> Result<()> {
        let dir = TempDir::new().map_err(|e| Error::io("tempdir", e))?;
        let reg = registry(&dir);
        let id = reg.register("epic-x", None).await?;

        assert!(reg.unregister("epic-x", &id).await?);
        assert!(!reg.unregister("epic-x", &id).await?);
        assert!(!reg.unregister("other-domain", &id).await?);

        let result = reg.heartbeat("epic-x", &id).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_sweep_marks_stale_and_heartbeat_revives() -> Result<()> {
        let dir = TempDir::new().map_err(|e| Error::io("tempdir", e))?;
        let reg = registry(&dir);
        let quiet = reg.register("epic-x", None).await?;

        tokio::time::sleep(Duration::from_millis(300)).await;
        let chatty = reg.register("epic-x", None).await?;

        let marked = reg.sweep_stale("epic-x", Duration::from_millis(150)).await?;
        assert_eq!(marked, vec![quiet.clone()]);

        let active: Vec<String> = reg.list_active("epic-x")?.into_iter().map(|p| p.id).collect();
        assert_eq!(active, vec![chatty]);
        assert_eq!(reg.list_all("epic-x")?.len(), 2);

        reg.heartbeat("epic-x", &quiet).await?;
        assert_eq!(reg.get("epic-x", &quiet)?.status, ParticipantStatus::Active);
        Ok(())
    }

    #[tokio::test]
    async fn test_locked_files_are_a_set() -> Result<()> {
        let dir = TempDir::new().map_err(|e| Error::io("tempdir", e))?;
        let reg = registry(&dir);
        let id = reg.register("epic-x", None).await?;

        assert!(reg.add_locked_file("epic-x", &id, "src/lib.rs").await?);
        assert!(!reg.add_locked_file("epic-x", &id, "src/lib.rs").await?);
        assert_eq!(reg.get("epic-x", &id)?.locked_files.len(), 1);

        assert!(reg.remove_locked_file("epic-x", &id, "src/lib.rs").await?);
        assert!(!reg.remove_locked_file("epic-x", &id, "src/lib.rs").await?);

        assert_eq!(reg.increment_commits("epic-x", &id).await?, 1);
        assert_eq!(reg.increment_commits("epic-x", &id).await?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_reads_of_unknown_domain_are_empty() -> Result<()> {
        let dir = TempDir::new().map_err(|e| Error::io("tempdir", e))?;
        let reg = registry(&dir);

        assert!(reg.list_all("nobody")?.is_empty());
        assert!(reg.sweep_stale("nobody", Duration::from_secs(1)).await?.is_empty());
        assert!(matches!(reg.get("nobody", "p1"), Err(Error::NotFound(_))));
        assert!(matches!(
            reg.heartbeat("nobody", "p1").await,
            Err(Error::NotFound(_))
        ));
        Ok(())
    }
}
