//! Directory-based mutual exclusion across processes
//!
//! Creating a directory is an atomic test-and-set on every filesystem this
//! tool targets, which makes it a portable, dependency-free lock primitive
//! for independent processes racing to refresh the same cache file.
//! Acquisition polls with a jittered interval to desynchronize contending
//! processes, and offers a force-acquire escape hatch so no caller ever
//! blocks forever: past the timeout the lock degrades to advisory. That
//! trade of strict exclusion for guaranteed forward progress is a
//! documented limitation, not a bug.
//!
//! # Example
//!
//! ```no_run
//! use confcache::lock::DirectoryLock;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), confcache::LockError> {
//! let mut lock = DirectoryLock::new("/var/cache/machine.conf_");
//! lock.acquire(true, Duration::from_secs(30)).await?;
//! // ... critical section ...
//! lock.release(true)?;
//! # Ok(())
//! # }
//! ```

use crate::error::LockError;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default base retry interval, in seconds
pub const STEP_BASE_SECS: f64 = 1.0;

/// Default jitter coefficient: the interval varies within ±20% of the base
pub const STEP_JITTER_COEFF: f64 = 0.2;

/// How an acquisition attempt concluded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    /// The lock directory was created; exclusion holds
    Acquired,
    /// The timeout elapsed and the caller proceeds as holder anyway;
    /// exclusion is not guaranteed past this point
    Forced,
}

/// Filesystem directory lock with jittered polling
///
/// The directory's existence is the held state visible to other processes.
/// The retry interval is chosen once at construction as
/// `base * (1 + coeff * (1 - 2*rand()))` with `rand()` uniform in [0,1),
/// so it stays within ±`coeff`·`base` around the base for the lifetime of
/// the lock object.
#[derive(Debug)]
pub struct DirectoryLock {
    dir: PathBuf,
    step: Duration,
    held: bool,
}

impl DirectoryLock {
    /// Create a lock on `dir` with the default interval and jitter
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_step(dir, STEP_BASE_SECS, STEP_JITTER_COEFF)
    }

    /// Create a lock with an explicit interval base and jitter coefficient
    ///
    /// A coefficient of 0.0 disables jitter entirely.
    pub fn with_step(dir: impl Into<PathBuf>, base_secs: f64, jitter_coeff: f64) -> Self {
        let dir = dir.into();
        let coefficient: f64 = rand::thread_rng().gen_range(0.0..1.0);
        let step_secs = base_secs * (1.0 + jitter_coeff * (1.0 - 2.0 * coefficient));
        let step = Duration::from_secs_f64(step_secs);
        tracing::debug!(
            dir = %dir.display(),
            step_ms = step.as_millis() as u64,
            "Created directory lock"
        );
        Self {
            dir,
            step,
            held: false,
        }
    }

    /// The lock directory path
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The jittered retry interval chosen at construction
    #[must_use]
    pub fn step(&self) -> Duration {
        self.step
    }

    /// Whether this instance currently considers itself the holder
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Attempt to acquire the lock within `timeout`
    ///
    /// Repeatedly tries to create the lock directory, sleeping the jittered
    /// interval between attempts. Returns [`Acquisition::Acquired`] on
    /// success. Once the timeout elapses, returns [`Acquisition::Forced`]
    /// when `force` is set (logged as a forced acquisition) or
    /// [`LockError::Timeout`] otherwise.
    ///
    /// # Errors
    ///
    /// [`LockError::InvalidTimeout`] for a zero timeout,
    /// [`LockError::AlreadyHeld`] when this instance already holds the
    /// lock, and [`LockError::Io`] for directory-creation failures other
    /// than contention.
    pub async fn acquire(
        &mut self,
        force: bool,
        timeout: Duration,
    ) -> Result<Acquisition, LockError> {
        if timeout.is_zero() {
            return Err(LockError::InvalidTimeout {
                dir: self.dir.clone(),
                timeout,
            });
        }
        if self.held {
            return Err(LockError::AlreadyHeld {
                dir: self.dir.clone(),
            });
        }

        tracing::info!(dir = %self.dir.display(), "Acquiring lock");
        let mut waited = Duration::ZERO;
        while waited < timeout {
            waited += self.step;
            match std::fs::create_dir(&self.dir) {
                Ok(()) => {
                    tracing::info!(dir = %self.dir.display(), "Acquired the lock");
                    self.held = true;
                    return Ok(Acquisition::Acquired);
                }
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    tracing::debug!(
                        dir = %self.dir.display(),
                        "Lock directory exists, sleeping"
                    );
                    tokio::time::sleep(self.step).await;
                }
                Err(err) => {
                    return Err(LockError::Io {
                        dir: self.dir.clone(),
                        source: err,
                    });
                }
            }
        }

        if force {
            tracing::warn!(
                dir = %self.dir.display(),
                timeout_secs = timeout.as_secs(),
                "Acquiring lock by force after timeout"
            );
            self.held = true;
            Ok(Acquisition::Forced)
        } else {
            Err(LockError::Timeout {
                dir: self.dir.clone(),
                timeout,
            })
        }
    }

    /// Release the lock by removing its directory
    ///
    /// With `tolerate_missing` set, a removal failure (for example the
    /// directory was already removed by a process that force-acquired past
    /// us) is ignored. Exactly one release is valid per acquire.
    ///
    /// # Errors
    ///
    /// [`LockError::NotHeld`] without a matching acquire, and
    /// [`LockError::Release`] when removal fails and `tolerate_missing`
    /// is off.
    pub fn release(&mut self, tolerate_missing: bool) -> Result<(), LockError> {
        if !self.held {
            return Err(LockError::NotHeld {
                dir: self.dir.clone(),
            });
        }
        self.held = false;
        match std::fs::remove_dir(&self.dir) {
            Ok(()) => Ok(()),
            Err(err) if tolerate_missing => {
                tracing::debug!(
                    dir = %self.dir.display(),
                    error = %err,
                    "Lock directory removal failed, tolerated"
                );
                Ok(())
            }
            Err(source) => Err(LockError::Release {
                dir: self.dir.clone(),
                source,
            }),
        }
    }
}

impl Drop for DirectoryLock {
    /// Backstop release on every exit path, including panics
    fn drop(&mut self) {
        if self.held {
            self.held = false;
            if let Err(err) = std::fs::remove_dir(&self.dir) {
                tracing::warn!(
                    dir = %self.dir.display(),
                    error = %err,
                    "Failed to remove lock directory on drop"
                );
            }
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn lock_path(dir: &TempDir) -> PathBuf {
        dir.path().join("machine.conf_")
    }

    #[tokio::test]
    async fn acquire_creates_the_lock_directory() {
        let temp = TempDir::new().unwrap();
        let mut lock = DirectoryLock::with_step(lock_path(&temp), 0.01, 0.0);

        let outcome = lock.acquire(false, Duration::from_secs(1)).await.unwrap();

        assert_eq!(outcome, Acquisition::Acquired);
        assert!(lock.is_held());
        assert!(lock_path(&temp).is_dir());
    }

    #[tokio::test]
    async fn reacquiring_a_held_lock_is_an_error() {
        let temp = TempDir::new().unwrap();
        let mut lock = DirectoryLock::with_step(lock_path(&temp), 0.01, 0.0);
        lock.acquire(false, Duration::from_secs(1)).await.unwrap();

        let second = lock.acquire(true, Duration::from_secs(1)).await;

        assert!(matches!(second, Err(LockError::AlreadyHeld { .. })));
    }

    #[tokio::test]
    async fn zero_timeout_is_rejected() {
        let temp = TempDir::new().unwrap();
        let mut lock = DirectoryLock::with_step(lock_path(&temp), 0.01, 0.0);

        let result = lock.acquire(true, Duration::ZERO).await;

        assert!(matches!(result, Err(LockError::InvalidTimeout { .. })));
        assert!(!lock.is_held());
    }

    #[tokio::test]
    async fn contended_acquire_without_force_times_out() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(lock_path(&temp)).unwrap();
        let mut lock = DirectoryLock::with_step(lock_path(&temp), 0.01, 0.0);

        let result = lock.acquire(false, Duration::from_millis(50)).await;

        assert!(matches!(result, Err(LockError::Timeout { .. })));
        assert!(!lock.is_held());
    }

    #[tokio::test]
    async fn contended_acquire_with_force_returns_within_bounded_time() {
        let temp = TempDir::new().unwrap();
        // Another "process" holds the lock and never lets go.
        std::fs::create_dir(lock_path(&temp)).unwrap();
        let mut lock = DirectoryLock::with_step(lock_path(&temp), 0.01, 0.0);

        let start = std::time::Instant::now();
        let outcome = lock.acquire(true, Duration::from_millis(50)).await.unwrap();
        let elapsed = start.elapsed();

        assert_eq!(outcome, Acquisition::Forced);
        assert!(lock.is_held());
        assert!(
            elapsed >= Duration::from_millis(40),
            "should have polled for roughly the timeout, returned after {elapsed:?}"
        );
        // Timeout plus at most one retry interval, with scheduling slack.
        assert!(
            elapsed < Duration::from_secs(2),
            "forced acquisition must not block indefinitely, took {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn missing_parent_directory_fails_immediately() {
        let temp = TempDir::new().unwrap();
        let orphan = temp.path().join("no/such/parent/machine.conf_");
        let mut lock = DirectoryLock::with_step(orphan, 0.01, 0.0);

        let start = std::time::Instant::now();
        let result = lock.acquire(true, Duration::from_secs(30)).await;

        assert!(matches!(result, Err(LockError::Io { .. })));
        assert!(
            start.elapsed() < Duration::from_secs(1),
            "unexpected I/O errors must not poll until the timeout"
        );
    }

    #[tokio::test]
    async fn release_removes_the_directory() {
        let temp = TempDir::new().unwrap();
        let mut lock = DirectoryLock::with_step(lock_path(&temp), 0.01, 0.0);
        lock.acquire(false, Duration::from_secs(1)).await.unwrap();

        lock.release(false).unwrap();

        assert!(!lock.is_held());
        assert!(!lock_path(&temp).exists());
    }

    #[test]
    fn releasing_an_unheld_lock_is_an_error() {
        let temp = TempDir::new().unwrap();
        let mut lock = DirectoryLock::with_step(lock_path(&temp), 0.01, 0.0);

        assert!(matches!(lock.release(false), Err(LockError::NotHeld { .. })));
    }

    #[tokio::test]
    async fn release_tolerates_a_directory_removed_by_someone_else() {
        let temp = TempDir::new().unwrap();
        let mut lock = DirectoryLock::with_step(lock_path(&temp), 0.01, 0.0);
        lock.acquire(false, Duration::from_secs(1)).await.unwrap();

        // A force-acquiring process on the other side removed our directory.
        std::fs::remove_dir(lock_path(&temp)).unwrap();

        assert!(lock.release(true).is_ok());
        assert!(matches!(lock.release(true), Err(LockError::NotHeld { .. })));
    }

    #[tokio::test]
    async fn release_without_tolerance_surfaces_the_removal_failure() {
        let temp = TempDir::new().unwrap();
        let mut lock = DirectoryLock::with_step(lock_path(&temp), 0.01, 0.0);
        lock.acquire(false, Duration::from_secs(1)).await.unwrap();
        std::fs::remove_dir(lock_path(&temp)).unwrap();

        assert!(matches!(
            lock.release(false),
            Err(LockError::Release { .. })
        ));
    }

    #[tokio::test]
    async fn drop_releases_a_held_lock() {
        let temp = TempDir::new().unwrap();
        {
            let mut lock = DirectoryLock::with_step(lock_path(&temp), 0.01, 0.0);
            lock.acquire(false, Duration::from_secs(1)).await.unwrap();
            assert!(lock_path(&temp).is_dir());
        }
        assert!(
            !lock_path(&temp).exists(),
            "drop should remove the lock directory"
        );
    }

    #[test]
    fn jittered_step_stays_within_bounds_over_many_instances() {
        let temp = TempDir::new().unwrap();
        let base = 1.0;
        let coeff = 0.2;
        for i in 0..200 {
            let lock = DirectoryLock::with_step(lock_path(&temp), base, coeff);
            let secs = lock.step().as_secs_f64();
            assert!(
                (base * (1.0 - coeff) - 1e-9..=base * (1.0 + coeff) + 1e-9).contains(&secs),
                "instance {i}: step {secs}s outside ±{coeff} of base {base}s"
            );
        }
    }

    #[test]
    fn zero_jitter_coefficient_yields_the_base_interval() {
        let temp = TempDir::new().unwrap();
        let lock = DirectoryLock::with_step(lock_path(&temp), 0.5, 0.0);
        assert!((lock.step().as_secs_f64() - 0.5).abs() < 1e-9);
    }
}
