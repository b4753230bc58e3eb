//! Work-stream ownership.

use chrono::Utc;
use tracing::info;

use super::{
    patterns::{self, first_overlap},
    types::{Conflict, StreamStatus, WorkStream},
    ParticipantRegistry,
};
use crate::{Error, Result};

impl ParticipantRegistry {
    /// Claim (or re-claim) stream `name` for participant `id`.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyClaimed`] if another participant owns `name`
    /// - [`Error::FileConflict`] if a pattern overlaps one held by a different
    ///   in-progress stream
    /// - [`Error::NotFound`] if `id` is not registered in `domain`
    /// - [`Error::InvalidInput`] for an empty pattern
    pub async fn claim_stream(
        &self,
        domain: &str,
        id: &str,
        name: &str,
        file_patterns: &[String],
    ) -> Result<WorkStream> {
        if let Some(blank) = file_patterns.iter().find(|p| p.trim().is_empty()) {
            return Err(Error::InvalidInput(format!(
                "empty file pattern '{blank}' for stream '{name}'"
            )));
        }

        let claimed = self
            .mutate(domain, |registry| {
                let participant = registry.participants.get_mut(id).ok_or_else(|| {
                    Error::NotFound(format!("participant '{id}' in domain '{domain}'"))
                })?;

                if let Some(existing) = registry.streams.get(name) {
                    if existing.owner != id {
                        return Err(Error::AlreadyClaimed {
                            stream: name.to_string(),
                            owner: existing.owner.clone(),
                        });
                    }
                }

                let others = registry.streams.values().filter(|stream| {
                    stream.name != name && stream.status == StreamStatus::InProgress
                });
                for other in others {
                    let hit = file_patterns
                        .iter()
                        .find_map(|p| first_overlap(p, &other.file_patterns).map(|e| (p, e)));
                    if let Some((pattern, existing)) = hit {
                        return Err(Error::FileConflict {
                            pattern: pattern.clone(),
                            existing: existing.to_string(),
                            stream: other.name.clone(),
                            owner: other.owner.clone(),
                        });
                    }
                }

                participant.work_stream = Some(name.to_string());
                let stream = WorkStream {
                    name: name.to_string(),
                    owner: id.to_string(),
                    status: StreamStatus::InProgress,
                    file_patterns: file_patterns.iter().cloned().collect(),
                    started: Utc::now(),
                };
                registry.streams.insert(name.to_string(), stream.clone());
                Ok(stream)
            })
            .await?;

        info!(domain, stream = name, owner = id, "Work stream claimed");
        Ok(claimed)
    }

    /// Drop stream `name`. Only its owner may do this; an absent stream is
    /// not an error.
    pub async fn release_stream(&self, domain: &str, id: &str, name: &str) -> Result<bool> {
        let released = self
            .mutate(domain, |registry| {
                let Some(stream) = registry.streams.get(name) else {
                    return Ok(false);
                };
                check_owner(stream, id)?;
                registry.streams.remove(name);
                if let Some(participant) = registry.participants.get_mut(id) {
                    if participant.work_stream.as_deref() == Some(name) {
                        participant.work_stream = None;
                    }
                }
                Ok(true)
            })
            .await?;

        if released {
            info!(domain, stream = name, owner = id, "Work stream released");
        }
        Ok(released)
    }

    /// Mark stream `name` completed.
    ///
    /// Ownership and file patterns stay on record; release the stream
    /// separately to drop them.
    pub async fn complete_stream(&self, domain: &str, id: &str, name: &str) -> Result<()> {
        self.mutate(domain, |registry| {
            let stream = registry.streams.get_mut(name).ok_or_else(|| {
                Error::NotFound(format!("work stream '{name}' in domain '{domain}'"))
            })?;
            check_owner(stream, id)?;
            stream.status = StreamStatus::Completed;
            Ok(())
        })
        .await?;

        info!(domain, stream = name, owner = id, "Work stream completed");
        Ok(())
    }

    pub fn list_streams(&self, domain: &str) -> Result<Vec<WorkStream>> {
        Ok(self
            .snapshot(domain)?
            .map(|registry| registry.streams.into_values().collect())
            .unwrap_or_default())
    }

    pub fn owner_of(&self, domain: &str, name: &str) -> Result<Option<String>> {
        Ok(self
            .snapshot(domain)?
            .and_then(|mut registry| registry.streams.remove(name))
            .map(|stream| stream.owner))
    }

    /// Pairwise overlap check across all streams, whatever their status.
    pub fn find_conflicts(&self, domain: &str) -> Result<Vec<Conflict>> {
        Ok(self
            .snapshot(domain)?
            .map(|registry| patterns::find_conflicts(registry.streams.values()))
            .unwrap_or_default())
    }
}

fn check_owner(stream: &WorkStream, requester: &str) -> Result<()> {
    if stream.owner == requester {
        Ok(())
    } else {
        Err(Error::NotOwner {
            subject: format!("work stream '{}'", stream.name),
            owner: stream.owner.clone(),
            requester: requester.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::registry::test_support::registry;

    fn patterns(list: &[&str]) -> Vec<String> {
        list.iter().map(|p| (*p).to_string()).collect()
    }

    #[tokio::test]
    async fn test_disjoint_claims_then_substring_conflict() -> Result<()> {
        let dir = TempDir::new().map_err(|e| Error::io("tempdir", e))?;
        let reg = registry(&dir);
        let a = reg.register("epic-x", None).await?;
        let b = reg.register("epic-x", None).await?;

        reg.claim_stream("epic-x", &a, "backend", &patterns(&["server/"]))
            .await?;
        reg.claim_stream("epic-x", &b, "frontend", &patterns(&["ui/"]))
            .await?;

        let result = reg
            .claim_stream("epic-x", &b, "backend2", &patterns(&["server/app.go"]))
            .await;

        match result {
            Err(Error::FileConflict {
                pattern,
                existing,
                stream,
                owner,
            }) => {
                assert_eq!(pattern, "server/app.go");
                assert_eq!(existing, "server/");
                assert_eq!(stream, "backend");
                assert_eq!(owner, a);
            }
            other => panic!("expected FileConflict, got {other:?}"),
        }
        assert_eq!(reg.owner_of("epic-x", "backend2")?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_stream_owned_by_other_is_already_claimed() -> Result<()> {
        let dir = TempDir::new().map_err(|e| Error::io("tempdir", e))?;
        let reg = registry(&dir);
        let a = reg.register("epic-x", None).await?;
        let b = reg.register("epic-x", None).await?;

        reg.claim_stream("epic-x", &a, "backend", &patterns(&["server/"]))
            .await?;
        let result = reg
            .claim_stream("epic-x", &b, "backend", &patterns(&["other/"]))
            .await;

        assert!(matches!(result, Err(Error::AlreadyClaimed { ref owner, .. }) if *owner == a));

        // The owner may rewrite its own claim
        let rewritten = reg
            .claim_stream("epic-x", &a, "backend", &patterns(&["server/", "db/"]))
            .await?;
        assert_eq!(rewritten.file_patterns.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_release_is_owner_only() -> Result<()> {
        let dir = TempDir::new().map_err(|e| Error::io("tempdir", e))?;
        let reg = registry(&dir);
        let a = reg.register("epic-x", None).await?;
        let b = reg.register("epic-x", None).await?;
        reg.claim_stream("epic-x", &a, "backend", &patterns(&["server/"]))
            .await?;

        let refused = reg.release_stream("epic-x", &b, "backend").await;
        assert!(matches!(refused, Err(Error::NotOwner { .. })));

        assert!(reg.release_stream("epic-x", &a, "backend").await?);
        assert!(!reg.release_stream("epic-x", &a, "backend").await?);
        assert_eq!(reg.get("epic-x", &a)?.work_stream, None);

        // Freed patterns are claimable again
        reg.claim_stream("epic-x", &b, "backend2", &patterns(&["server/app.go"]))
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_keeps_ownership_and_patterns() -> Result<()> {
        let dir = TempDir::new().map_err(|e| Error::io("tempdir", e))?;
        let reg = registry(&dir);
        let a = reg.register("epic-x", None).await?;
        let b = reg.register("epic-x", None).await?;
        reg.claim_stream("epic-x", &a, "backend", &patterns(&["server/"]))
            .await?;

        reg.complete_stream("epic-x", &a, "backend").await?;

        let streams = reg.list_streams("epic-x")?;
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].status, StreamStatus::Completed);
        assert_eq!(streams[0].owner, a);
        assert!(streams[0].file_patterns.contains("server/"));

        // Claim-time checks only consider in-progress streams
        reg.claim_stream("epic-x", &b, "backend2", &patterns(&["server/app.go"]))
            .await?;

        // The diagnostic sweep still sees the overlap
        let conflicts = reg.find_conflicts("epic-x")?;
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].first_stream, "backend");
        assert_eq!(conflicts[0].second_stream, "backend2");

        let refused = reg.complete_stream("epic-x", &b, "backend").await;
        assert!(matches!(refused, Err(Error::NotOwner { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_claim_requires_registration_and_patterns() -> Result<()> {
        let dir = TempDir::new().map_err(|e| Error::io("tempdir", e))?;
        let reg = registry(&dir);
        reg.register("epic-x", None).await?;

        let ghost = reg
            .claim_stream("epic-x", "ghost", "s", &patterns(&["a/"]))
            .await;
        assert!(matches!(ghost, Err(Error::NotFound(_))));

        let blank = reg.claim_stream("epic-x", "p1", "s", &patterns(&[" "])).await;
        assert!(matches!(blank, Err(Error::InvalidInput(_))));
        Ok(())
    }
}
