use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Top-level config (keeper.toml + KEEPER_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeeperConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Messaging channel, optional; without it alerts go to the log and the
    /// `bot` mode refuses to start.
    pub telegram: Option<TelegramConfig>,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            telegram: None,
            backup: BackupConfig::default(),
            ranking: RankingConfig::default(),
            security: SecurityConfig::default(),
            health: HealthConfig::default(),
            maintenance: MaintenanceConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Chat IDs that receive alerts and may issue privileged commands.
    #[serde(default)]
    pub admin_chat_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Directory holding finished artifacts and dump working directories.
    #[serde(default = "default_backup_dir")]
    pub dir: String,
    /// Artifacts older than this are removed by the cleanup job.
    #[serde(default = "default_backup_age_days")]
    pub max_age_days: u32,
    /// Dump/restore tool binary.
    #[serde(default = "default_sqlite_bin")]
    pub sqlite_bin: String,
    /// Archive tool binary.
    #[serde(default = "default_tar_bin")]
    pub tar_bin: String,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: default_backup_dir(),
            max_age_days: default_backup_age_days(),
            sqlite_bin: default_sqlite_bin(),
            tar_bin: default_tar_bin(),
        }
    }
}

/// Third-party ranking service probed by the comprehensive health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    #[serde(default = "default_ranking_base_url")]
    pub base_url: String,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            base_url: default_ranking_base_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// HMAC key for signed payload verification.
    #[serde(default = "default_security_secret")]
    pub secret: String,
    /// Messages admitted per user per window.
    #[serde(default = "default_message_limit")]
    pub message_limit: u32,
    /// Callback queries admitted per user per window.
    #[serde(default = "default_callback_limit")]
    pub callback_limit: u32,
    /// Rate-limit window size in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u32,
    /// Suspicion strikes within the rolling window that trigger an
    /// automatic temporary block.
    #[serde(default = "default_strike_threshold")]
    pub strike_threshold: u32,
    #[serde(default = "default_strike_window_hours")]
    pub strike_window_hours: u32,
    /// Duration of an automatic block, in days.
    #[serde(default = "default_auto_block_days")]
    pub auto_block_days: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            secret: default_security_secret(),
            message_limit: default_message_limit(),
            callback_limit: default_callback_limit(),
            window_secs: default_window_secs(),
            strike_threshold: default_strike_threshold(),
            strike_window_hours: default_strike_window_hours(),
            auto_block_days: default_auto_block_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Hard deadline for each individual check.
    #[serde(default = "default_check_timeout_secs")]
    pub check_timeout_secs: u64,
    /// A check that succeeds slower than this is reported degraded.
    #[serde(default = "default_degraded_latency_ms")]
    pub degraded_latency_ms: u64,
    /// Members without activity for this many days count as inactive.
    #[serde(default = "default_inactive_days")]
    pub inactive_days: u32,
    /// Consecutive ranking-API failures before the breaker opens.
    #[serde(default = "default_breaker_threshold")]
    pub breaker_threshold: u32,
    /// How long an open breaker short-circuits the ranking check.
    #[serde(default = "default_breaker_cooldown_secs")]
    pub breaker_cooldown_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_timeout_secs: default_check_timeout_secs(),
            degraded_latency_ms: default_degraded_latency_ms(),
            inactive_days: default_inactive_days(),
            breaker_threshold: default_breaker_threshold(),
            breaker_cooldown_secs: default_breaker_cooldown_secs(),
        }
    }
}

/// Cadence policy for the maintenance jobs. Hours/minutes are UTC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    #[serde(default = "default_backup_hour")]
    pub backup_hour: u8,
    #[serde(default)]
    pub backup_minute: u8,
    #[serde(default = "default_expiry_hour")]
    pub expiry_hour: u8,
    /// Weekday for event archiving, 0 = Monday … 6 = Sunday.
    #[serde(default = "default_archive_weekday")]
    pub archive_weekday: u8,
    #[serde(default = "default_archive_hour")]
    pub archive_hour: u8,
    /// Events older than this many days are moved to the archive.
    #[serde(default = "default_archive_age_days")]
    pub archive_age_days: u32,
    #[serde(default = "default_full_health_hour")]
    pub full_health_hour: u8,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            backup_hour: default_backup_hour(),
            backup_minute: 0,
            expiry_hour: default_expiry_hour(),
            archive_weekday: default_archive_weekday(),
            archive_hour: default_archive_hour(),
            archive_age_days: default_archive_age_days(),
            full_health_hour: default_full_health_hour(),
        }
    }
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.keeper/keeper.db", home)
}
fn default_backup_dir() -> String {
    "./backups".to_string()
}
fn default_backup_age_days() -> u32 {
    30
}
fn default_sqlite_bin() -> String {
    "sqlite3".to_string()
}
fn default_tar_bin() -> String {
    "tar".to_string()
}
fn default_ranking_base_url() -> String {
    "https://online-go.com/api/v1".to_string()
}
fn default_security_secret() -> String {
    "change-me".to_string()
}
fn default_message_limit() -> u32 {
    30
}
fn default_callback_limit() -> u32 {
    20
}
fn default_window_secs() -> u32 {
    60
}
fn default_strike_threshold() -> u32 {
    3
}
fn default_strike_window_hours() -> u32 {
    24
}
fn default_auto_block_days() -> u32 {
    1
}
fn default_check_timeout_secs() -> u64 {
    10
}
fn default_degraded_latency_ms() -> u64 {
    2000
}
fn default_inactive_days() -> u32 {
    30
}
fn default_breaker_threshold() -> u32 {
    3
}
fn default_breaker_cooldown_secs() -> u64 {
    300
}
fn default_backup_hour() -> u8 {
    3
}
fn default_expiry_hour() -> u8 {
    6
}
fn default_archive_weekday() -> u8 {
    6
}
fn default_archive_hour() -> u8 {
    4
}
fn default_archive_age_days() -> u32 {
    90
}
fn default_full_health_hour() -> u8 {
    5
}

impl KeeperConfig {
    /// Load config from a TOML file with KEEPER_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. KEEPER_CONFIG env var
    ///   3. ~/.keeper/keeper.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("KEEPER_CONFIG").ok())
            .unwrap_or_else(default_config_path);

        let config: KeeperConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("KEEPER_").split("_"))
            .extract()
            .map_err(|e| crate::error::KeeperError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Administrator chat IDs, or empty when no messaging channel is set.
    pub fn admin_ids(&self) -> Vec<i64> {
        self.telegram
            .as_ref()
            .map(|t| t.admin_chat_ids.clone())
            .unwrap_or_default()
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.keeper/keeper.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_policy() {
        let cfg = KeeperConfig::default();
        assert_eq!(cfg.security.message_limit, 30);
        assert_eq!(cfg.security.callback_limit, 20);
        assert_eq!(cfg.security.window_secs, 60);
        assert_eq!(cfg.maintenance.backup_hour, 3);
        assert_eq!(cfg.maintenance.expiry_hour, 6);
        assert_eq!(cfg.backup.max_age_days, 30);
    }

    #[test]
    fn admin_ids_empty_without_telegram() {
        assert!(KeeperConfig::default().admin_ids().is_empty());
    }

    #[test]
    fn serde_round_trip_preserves_sections() {
        let cfg = KeeperConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: KeeperConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.security.strike_threshold, cfg.security.strike_threshold);
        assert_eq!(back.database.path, cfg.database.path);
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let cfg: KeeperConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.security.window_secs, 60);
        assert!(cfg.telegram.is_none());
    }
}
