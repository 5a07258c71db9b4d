use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use metrics::counter;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::cleanup::Cleaner;

/// A directory under the data root and the depth at which its entries age out.
///
/// Directories above that depth are containers. They are never aged themselves:
/// first-level containers (event categories) always stay, deeper ones are
/// removed once a sweep leaves them empty.
pub struct SweptRoot {
    pub name: &'static str,
    pub partition_depth: usize,
}

/// `events/<category>/<YYYY>/<MM>/<DD>` ages per day, channels and exports whole.
pub const SWEPT_ROOTS: [SweptRoot; 3] = [
    SweptRoot {
        name: "events",
        partition_depth: 4,
    },
    SweptRoot {
        name: "hls",
        partition_depth: 1,
    },
    SweptRoot {
        name: "exports",
        partition_depth: 1,
    },
];

#[derive(Error, Debug)]
pub enum SweepError {
    #[error("failed to list {path}: {error}")]
    List { path: PathBuf, error: std::io::Error },
    #[error("failed to stat {path}: {error}")]
    Stat { path: PathBuf, error: std::io::Error },
    #[error("failed to remove {path}: {error}")]
    Remove { path: PathBuf, error: std::io::Error },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub removed: usize,
    pub failed: usize,
}

/// Removes every partition of the swept roots whose newest entry is older than
/// the retention period. A partition's age is the newest modification time
/// found anywhere inside it, so one fresh file keeps the whole partition.
pub struct RetentionSweeper {
    data_root: PathBuf,
    retention: Duration,
}

impl RetentionSweeper {
    pub fn new(data_root: &Path, retention_days: u64) -> Self {
        Self {
            data_root: data_root.to_path_buf(),
            retention: Duration::from_secs(retention_days * 24 * 60 * 60),
        }
    }

    pub async fn sweep_at(&self, now: SystemTime) -> SweepStats {
        let mut stats = SweepStats::default();
        let Some(cutoff) = now.checked_sub(self.retention) else {
            return stats;
        };

        for root in &SWEPT_ROOTS {
            let path = self.data_root.join(root.name);
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                debug!("skipping missing directory {}", path.display());
                continue;
            }

            let partitions = match find_partitions(&path, root.partition_depth).await {
                Ok(partitions) => partitions,
                Err(e) => {
                    error!("{}", e);
                    stats.failed += 1;
                    continue;
                }
            };

            for (partition, depth) in partitions {
                match remove_if_older(&partition, cutoff).await {
                    Ok(true) => {
                        stats.removed += 1;
                        prune_empty_parents(&partition, depth).await;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("{}", e);
                        stats.failed += 1;
                    }
                }
            }
        }

        counter!("retention_entries_removed_total").increment(stats.removed as u64);
        counter!("retention_entries_failed_total").increment(stats.failed as u64);
        stats
    }
}

async fn list_dir(path: &Path) -> Result<Vec<(PathBuf, bool)>, SweepError> {
    let list = |error: std::io::Error| SweepError::List {
        path: path.to_path_buf(),
        error,
    };
    let mut entries = tokio::fs::read_dir(path).await.map_err(list)?;
    let mut children = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(list)? {
        let is_dir = entry.file_type().await.map_err(list)?.is_dir();
        children.push((entry.path(), is_dir));
    }
    Ok(children)
}

/// Entries at `partition_depth` below `root`, with their depth. Files found
/// higher up are partitions of their own.
async fn find_partitions(
    root: &Path,
    partition_depth: usize,
) -> Result<Vec<(PathBuf, usize)>, SweepError> {
    let mut partitions = Vec::new();
    let mut stack = vec![(root.to_path_buf(), 0)];

    while let Some((dir, depth)) = stack.pop() {
        for (child, is_dir) in list_dir(&dir).await? {
            if is_dir && depth + 1 < partition_depth {
                stack.push((child, depth + 1));
            } else {
                partitions.push((child, depth + 1));
            }
        }
    }

    Ok(partitions)
}

/// Newest modification time of `path` and everything below it. Symlinks are
/// not followed.
async fn newest_modified(path: &Path) -> Result<SystemTime, SweepError> {
    let stat = |path: &Path, error: std::io::Error| SweepError::Stat {
        path: path.to_path_buf(),
        error,
    };

    let mut newest = SystemTime::UNIX_EPOCH;
    let mut stack = vec![path.to_path_buf()];
    while let Some(current) = stack.pop() {
        let metadata = tokio::fs::symlink_metadata(&current)
            .await
            .map_err(|e| stat(&current, e))?;
        newest = newest.max(metadata.modified().map_err(|e| stat(&current, e))?);
        if metadata.is_dir() {
            stack.extend(list_dir(&current).await?.into_iter().map(|(child, _)| child));
        }
    }

    Ok(newest)
}

async fn remove_if_older(path: &Path, cutoff: SystemTime) -> Result<bool, SweepError> {
    if newest_modified(path).await? >= cutoff {
        return Ok(false);
    }

    let metadata = tokio::fs::symlink_metadata(path)
        .await
        .map_err(|error| SweepError::Stat {
            path: path.to_path_buf(),
            error,
        })?;
    let removed = if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    removed.map_err(|error| SweepError::Remove {
        path: path.to_path_buf(),
        error,
    })?;

    debug!("removed {}", path.display());
    Ok(true)
}

/// Removes the emptied containers above a removed partition, stopping at the
/// first non-empty one and never touching first-level containers.
async fn prune_empty_parents(partition: &Path, depth: usize) {
    let mut current = partition.parent();
    let mut depth = depth.saturating_sub(1);

    while let Some(dir) = current {
        if depth < 2 {
            return;
        }
        match list_dir(dir).await {
            Ok(children) if children.is_empty() => {}
            Ok(_) => return,
            Err(e) => {
                warn!("{}", e);
                return;
            }
        }
        if let Err(e) = tokio::fs::remove_dir(dir).await {
            warn!("failed to remove empty directory {}: {}", dir.display(), e);
            return;
        }
        debug!("removed empty directory {}", dir.display());

        current = dir.parent();
        depth -= 1;
    }
}

#[async_trait]
impl Cleaner for RetentionSweeper {
    async fn cleanup(&self) {
        let stats = self.sweep_at(SystemTime::now()).await;
        info!(
            removed = stats.removed,
            failed = stats.failed,
            "retention sweep finished"
        );
    }
}
