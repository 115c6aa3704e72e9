// Shared constants

/// Canonical certificate file name inside a certificate directory
pub const CRT_FILE: &str = "cert.crt";

/// Canonical private key file name inside a certificate directory
pub const KEY_FILE: &str = "cert.key";

/// Per-certificate metadata file name
pub const META_FILE: &str = "meta.json";

/// Archive subtree name inside a certificate directory
pub const ARCHIVE_DIR: &str = "archive";

/// Backup snapshot subtree name inside a certificate directory
pub const BACKUP_DIR: &str = "backups";

/// Vault file name under the storage root
pub const VAULT_FILE: &str = "vault.json";

/// Global deployment settings file name under the storage root
pub const DEPLOY_SETTINGS_FILE: &str = "deployment.json";

/// Environment variable holding the vault master key
pub const MASTER_KEY_ENV: &str = "CERTMILL_MASTER_KEY";

/// Default certificate validity in days
pub const DEFAULT_VALIDITY_DAYS: u32 = 365;

/// Default lead time before expiry at which renewal becomes due
pub const DEFAULT_RENEW_BEFORE_DAYS: u32 = 30;

/// Default RSA key size in bits
pub const DEFAULT_KEY_SIZE: u32 = 2048;

/// Default renewal worker pool size
pub const DEFAULT_RENEWAL_WORKERS: usize = 4;

/// Default concurrent dispatch limit
pub const DEFAULT_DISPATCH_WORKERS: usize = 4;

/// Default number of archived versions kept per certificate
pub const DEFAULT_HISTORY_RETENTION: usize = 10;

/// Default five-field cron expression for the renewal sweep (daily, 03:30)
pub const DEFAULT_SWEEP_SCHEDULE: &str = "30 3 * * *";

/// Default per-action deadline in seconds
pub const DEFAULT_ACTION_TIMEOUT_SECS: u64 = 60;
