//! Crate-wide constants.

/// Length of the truncated SHA-256 used for [`crate::util::hash::ObjectHash`].
pub const OBJ_HASH_PREFIX_LEN: usize = 20;

/// Maximum length of resource names handed to the engine.
pub const MAX_NAME_LEN: usize = 63;

/// Number of fingerprint characters embedded in remote compose paths.
pub const COMPOSE_PATH_HASH_LEN: usize = 12;

/// Suffix appended to a file's path when it is backed up before overwrite.
pub const DEFAULT_BACKUP_SUFFIX: &str = "bak";

/// Pinned docker compose release installed as a CLI plugin.
pub const DEFAULT_COMPOSE_VERSION: &str = "v2.29.7";

/// Bound on compose bring-up and tear-down, enforced by the remote process.
pub const DEFAULT_COMPOSE_TIMEOUT_SECS: u64 = 300;

/// Blocks until first-boot initialization has finished.
pub const CLOUD_INIT_WAIT: &str = "cloud-init status --wait";

/// Snapshot format version written by this crate.
pub const SNAPSHOT_VERSION: u32 = 1;
