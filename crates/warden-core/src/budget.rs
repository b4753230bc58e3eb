//! Advisory rate budget shared by cooperating processes.
//!
//! The budget document is read-then-written without locking, so concurrent
//! refreshes or reservations can lose updates. The number is a throttle
//! hint, not an accounting record.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{atomic, config::BudgetConfig, paths, Error, Result};

/// Length of the window assumed when a source reports no reset time.
fn default_window() -> chrono::Duration {
    chrono::Duration::hours(1)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateBudget {
    pub remaining: u64,
    pub limit: u64,
    pub reset_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl RateBudget {
    fn fallback(limit: u64) -> Self {
        let now = Utc::now();
        Self {
            remaining: limit,
            limit,
            reset_at: now + default_window(),
            last_updated: now,
        }
    }
}

/// A fresh reading from whatever counts calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetReading {
    pub remaining: u64,
    pub limit: u64,
    pub reset_at: DateTime<Utc>,
}

#[async_trait]
pub trait BudgetSource: Send + Sync + std::fmt::Debug {
    async fn fetch(&self) -> Result<BudgetReading>;
}

/// Runs a shell command that prints the budget as JSON.
///
/// Accepts `{"remaining": .., "limit": .., "reset": <epoch secs>}` or the
/// GitHub `rate_limit` shape with the same fields under `resources.core`.
#[derive(Debug, Clone)]
pub struct CommandBudgetSource {
    command: String,
}

impl CommandBudgetSource {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Payload {
    Nested { resources: Resources },
    Flat(RawReading),
}

#[derive(Deserialize)]
struct Resources {
    core: RawReading,
}

#[derive(Deserialize)]
struct RawReading {
    remaining: u64,
    limit: u64,
    #[serde(default)]
    reset: Option<i64>,
}

/// Decode a source's JSON output.
pub fn parse_reading(raw: &[u8]) -> Result<BudgetReading> {
    let payload: Payload =
        serde_json::from_slice(raw).map_err(|e| Error::parse("budget source output", e))?;
    let reading = match payload {
        Payload::Nested { resources } => resources.core,
        Payload::Flat(reading) => reading,
    };
    let reset_at = reading
        .reset
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or_else(|| Utc::now() + default_window());

    Ok(BudgetReading {
        remaining: reading.remaining.min(reading.limit),
        limit: reading.limit,
        reset_at,
    })
}

#[async_trait]
impl BudgetSource for CommandBudgetSource {
    async fn fetch(&self) -> Result<BudgetReading> {
        let shell = which::which("sh")
            .map_err(|e| Error::MissingDependency(format!("budget source needs 'sh': {e}")))?;

        let output = tokio::process::Command::new(&shell)
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::io(&shell, e))?;

        if !output.status.success() {
            return Err(Error::parse(
                "budget source",
                format!(
                    "'{}' exited with {}: {}",
                    self.command,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }
        parse_reading(&output.stdout)
    }
}

#[derive(Debug, Clone)]
pub struct BudgetCoordinator {
    path: PathBuf,
    config: BudgetConfig,
    source: Option<Arc<dyn BudgetSource>>,
}

impl BudgetCoordinator {
    pub fn new(
        root: impl AsRef<Path>,
        config: BudgetConfig,
        source: Option<Arc<dyn BudgetSource>>,
    ) -> Self {
        Self {
            path: paths::budget_path(root.as_ref()),
            config,
            source,
        }
    }

    /// Coordinator whose source is `budget.source_command`, if configured.
    pub fn from_config(root: impl AsRef<Path>, config: &BudgetConfig) -> Self {
        let source = config
            .source_command
            .as_deref()
            .map(|command| Arc::new(CommandBudgetSource::new(command)) as Arc<dyn BudgetSource>);
        Self::new(root, config.clone(), source)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the budget document with the configured default if missing.
    pub fn init(&self) -> Result<RateBudget> {
        let fresh = RateBudget::fallback(self.config.default_limit);
        if atomic::create_new(&self.path, &encode(&fresh)?)? {
            info!(limit = fresh.limit, "Rate budget initialised");
            return Ok(fresh);
        }
        self.load()
    }

    /// Current budget, initialising it on first use.
    pub fn current(&self) -> Result<RateBudget> {
        if self.path.exists() {
            self.load()
        } else {
            self.init()
        }
    }

    /// Overwrite the budget from the source, or the default if there is no
    /// source or its fetch or parse fails. Returns the new remaining count.
    ///
    /// # Errors
    ///
    /// A source that cannot run at all, such as one with no shell on `PATH`,
    /// fails with [`Error::MissingDependency`] instead of falling back.
    pub async fn refresh(&self) -> Result<u64> {
        let reading = match &self.source {
            Some(source) => match source.fetch().await {
                Ok(reading) => Some(reading),
                Err(e @ Error::MissingDependency(_)) => return Err(e),
                Err(e) => {
                    warn!(error = %e, "Budget source unavailable, using default limit");
                    None
                }
            },
            None => None,
        };

        let budget = reading.map_or_else(
            || RateBudget::fallback(self.config.default_limit),
            |r| RateBudget {
                remaining: r.remaining,
                limit: r.limit,
                reset_at: r.reset_at,
                last_updated: Utc::now(),
            },
        );
        self.store(&budget)?;

        info!(remaining = budget.remaining, limit = budget.limit, "Rate budget refreshed");
        Ok(budget.remaining)
    }

    /// Take `n` calls off the budget, stopping at zero.
    pub fn reserve(&self, n: u64) -> Result<u64> {
        let mut budget = self.current()?;
        budget.remaining = budget.remaining.saturating_sub(n);
        budget.last_updated = Utc::now();
        self.store(&budget)?;

        debug!(reserved = n, remaining = budget.remaining, "Rate budget reserved");
        Ok(budget.remaining)
    }

    /// Sleep `budget.low_wait_secs` if fewer than `required` calls remain.
    ///
    /// Returns whether it waited. Nothing is re-checked afterwards.
    pub async fn wait_if_low(&self, required: u64) -> Result<bool> {
        let budget = self.current()?;
        if budget.remaining >= required {
            return Ok(false);
        }

        let pause = self.config.low_wait();
        warn!(
            remaining = budget.remaining,
            required,
            pause_secs = pause.as_secs(),
            "Rate budget low, pausing"
        );
        tokio::time::sleep(pause).await;
        Ok(true)
    }

    fn load(&self) -> Result<RateBudget> {
        let bytes = atomic::read(&self.path)?
            .ok_or_else(|| Error::NotFound(format!("budget {}", self.path.display())))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::parse(format!("budget {}", self.path.display()), e))
    }

    fn store(&self, budget: &RateBudget) -> Result<()> {
        atomic::write(&self.path, &encode(budget)?)
    }
}

fn encode(budget: &RateBudget) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(budget).map_err(|e| Error::parse("budget", e))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[derive(Debug)]
    struct Fixed(Option<BudgetReading>);

    #[async_trait]
    impl BudgetSource for Fixed {
        async fn fetch(&self) -> Result<BudgetReading> {
            self.0
                .clone()
                .ok_or_else(|| Error::parse("budget reading", "offline"))
        }
    }

    #[derive(Debug)]
    struct Uninstalled;

    #[async_trait]
    impl BudgetSource for Uninstalled {
        async fn fetch(&self) -> Result<BudgetReading> {
            Err(Error::MissingDependency("no 'sh' on PATH".into()))
        }
    }

    fn config() -> BudgetConfig {
        BudgetConfig {
            default_limit: 100,
            low_wait_secs: 0,
            source_command: None,
        }
    }

    #[test]
    fn test_parse_flat_and_nested_shapes() -> Result<()> {
        let flat = parse_reading(br#"{"remaining": 10, "limit": 60, "reset": 1700000000}"#)?;
        assert_eq!(flat.remaining, 10);
        assert_eq!(flat.reset_at.timestamp(), 1_700_000_000);

        let nested = parse_reading(
            br#"{"resources": {"core": {"remaining": 4999, "limit": 5000, "reset": 1}}, "rate": {}}"#,
        )?;
        assert_eq!(nested.limit, 5000);
        assert_eq!(nested.remaining, 4999);

        assert!(matches!(
            parse_reading(b"{\"limit\": 1}"),
            Err(Error::Parse { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_init_is_create_once() -> Result<()> {
        let dir = TempDir::new().map_err(|e| Error::io("tempdir", e))?;
        let budget = BudgetCoordinator::new(dir.path(), config(), None);

        assert_eq!(budget.init()?.remaining, 100);
        budget.reserve(30)?;
        assert_eq!(budget.init()?.remaining, 70);
        Ok(())
    }

    #[test]
    fn test_reserve_saturates_at_zero() -> Result<()> {
        let dir = TempDir::new().map_err(|e| Error::io("tempdir", e))?;
        let budget = BudgetCoordinator::new(dir.path(), config(), None);

        assert_eq!(budget.reserve(60)?, 40);
        assert_eq!(budget.reserve(60)?, 0);
        assert_eq!(budget.current()?.remaining, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_refresh_uses_source_then_falls_back() -> Result<()> {
        let dir = TempDir::new().map_err(|e| Error::io("tempdir", e))?;
        let reading = BudgetReading {
            remaining: 12,
            limit: 5000,
            reset_at: Utc::now(),
        };

        let online_source: Arc<dyn BudgetSource> = Arc::new(Fixed(Some(reading)));
        let online = BudgetCoordinator::new(dir.path(), config(), Some(online_source));
        assert_eq!(online.refresh().await?, 12);
        assert_eq!(online.current()?.limit, 5000);

        let offline_source: Arc<dyn BudgetSource> = Arc::new(Fixed(None));
        let offline = BudgetCoordinator::new(dir.path(), config(), Some(offline_source));
        assert_eq!(offline.refresh().await?, 100);
        Ok(())
    }

    #[tokio::test]
    async fn test_refresh_fails_when_source_cannot_run() -> Result<()> {
        let dir = TempDir::new().map_err(|e| Error::io("tempdir", e))?;
        let source: Arc<dyn BudgetSource> = Arc::new(Uninstalled);
        let budget = BudgetCoordinator::new(dir.path(), config(), Some(source));

        let result = budget.refresh().await;

        assert!(matches!(result, Err(Error::MissingDependency(_))));
        assert!(!budget.path().exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_wait_if_low_only_when_short() -> Result<()> {
        let dir = TempDir::new().map_err(|e| Error::io("tempdir", e))?;
        let budget = BudgetCoordinator::new(dir.path(), config(), None);
        budget.reserve(95)?;

        assert!(!budget.wait_if_low(5).await?);
        assert!(budget.wait_if_low(6).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_command_source_reads_stdout() -> Result<()> {
        let source = CommandBudgetSource::new(r#"echo '{"remaining": 3, "limit": 9}'"#);
        let reading = source.fetch().await?;
        assert_eq!((reading.remaining, reading.limit), (3, 9));

        let failing = CommandBudgetSource::new("exit 3");
        assert!(matches!(failing.fetch().await, Err(Error::Parse { .. })));
        Ok(())
    }
}
