//! Pool configuration.
//!
//! The configuration file is JSON. [`PoolConfig::resolve`] checks it and turns
//! addresses into scripts, producing the options the job manager and vardiff
//! run with.

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use thiserror::Error;

use crate::address::{self, AddressError, NetworkParams};
use crate::algorithm::{Algorithm, HashFamily};
use crate::pool::coinbase::{Recipient, RewardType};
use crate::pool::manager::JobManagerOptions;
use crate::pool::vardiff::VarDiffConfig;

/// Errors from validating a configuration.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("recipient {address:?} has percent {percent}, expected 0 to 100")]
    InvalidRecipientPercent { address: String, percent: f64 },

    #[error("recipients take {0}% of the reward")]
    RecipientsExceedReward(f64),

    #[error("pool address: {0}")]
    PoolAddress(AddressError),

    #[error("recipient address: {0}")]
    RecipientAddress(AddressError),

    #[error("invalid vardiff settings: {0}")]
    VarDiff(&'static str),
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    pub coin: CoinConfig,

    /// Pool payout address, or a hex public key on proof-of-stake chains.
    pub address: String,

    /// Hex hash160 paid instead of `address` when set.
    #[serde(default)]
    pub mining_key: Option<String>,

    /// Address encoding of the chain. Without it, addresses are read as bare
    /// base58 pay-to-pubkey-hash.
    #[serde(default)]
    pub network: Option<NetworkParams>,

    #[serde(default)]
    pub instance_id: Option<u32>,

    #[serde(default)]
    pub recipients: Vec<RecipientConfig>,

    #[serde(default = "default_coinbase_string")]
    pub coinbase_string: String,

    #[serde(default)]
    pub tx_comment: String,

    #[serde(default)]
    pub emit_invalid_block_hashes: bool,

    #[serde(default)]
    pub vardiff: VarDiffConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoinConfig {
    pub name: String,
    pub algorithm: Algorithm,

    #[serde(default)]
    pub reward: RewardType,

    #[serde(default)]
    pub tx_messages: bool,

    #[serde(default)]
    pub normal_hashing: bool,
}

/// A fee or donation taken from every block.
#[derive(Debug, Clone, Deserialize)]
pub struct RecipientConfig {
    pub address: String,
    pub percent: f64,
}

/// Runtime options resolved from a [`PoolConfig`].
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub job_manager: JobManagerOptions,
    pub vardiff: VarDiffConfig,
}

fn default_coinbase_string() -> String {
    "/mujina/".into()
}

impl PoolConfig {
    /// Read a configuration file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// Validate and resolve into runtime options.
    pub fn resolve(&self) -> Result<ResolvedConfig, ConfigError> {
        self.check_vardiff()?;

        let network = self.network.as_ref();
        let pool_script = if self.coin.reward == RewardType::Pos {
            address::pubkey_to_script(&self.address)
        } else if let Some(key) = &self.mining_key {
            address::mining_key_to_script(key)
        } else {
            address::address_to_script(network, &self.address)
        }
        .map_err(ConfigError::PoolAddress)?;

        let mut total_percent = 0.0;
        let mut recipients = Vec::with_capacity(self.recipients.len());
        for recipient in &self.recipients {
            if !(0.0..=100.0).contains(&recipient.percent) {
                return Err(ConfigError::InvalidRecipientPercent {
                    address: recipient.address.clone(),
                    percent: recipient.percent,
                });
            }
            total_percent += recipient.percent;
            recipients.push(Recipient {
                fraction: recipient.percent / 100.0,
                script: address::address_to_script(network, &recipient.address)
                    .map_err(ConfigError::RecipientAddress)?,
            });
        }
        if total_percent > 100.0 {
            return Err(ConfigError::RecipientsExceedReward(total_percent));
        }

        Ok(ResolvedConfig {
            job_manager: JobManagerOptions {
                hash_family: HashFamily::new(
                    self.coin.algorithm,
                    self.coin.normal_hashing,
                    self.coin.reward,
                ),
                pool_script,
                reward_type: self.coin.reward,
                tx_messages: self.coin.tx_messages,
                tx_comment: self.tx_comment.clone(),
                recipients,
                network: self.network.clone(),
                coinbase_string: self.coinbase_string.clone(),
                instance_id: self.instance_id,
                emit_invalid_block_hashes: self.emit_invalid_block_hashes,
            },
            vardiff: self.vardiff.clone(),
        })
    }

    fn check_vardiff(&self) -> Result<(), ConfigError> {
        let v = &self.vardiff;
        if v.min_diff <= 0.0 {
            return Err(ConfigError::VarDiff("min_diff must be positive"));
        }
        if v.max_diff < v.min_diff {
            return Err(ConfigError::VarDiff("max_diff is below min_diff"));
        }
        if v.target_time <= 0.0 || v.retarget_time <= 0.0 {
            return Err(ConfigError::VarDiff("times must be positive"));
        }
        if !(0.0..=100.0).contains(&v.variance_percent) {
            return Err(ConfigError::VarDiff("variance_percent must be 0 to 100"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::base58;

    fn testnet_address(fill: u8) -> String {
        let mut payload = vec![0x6f];
        payload.extend_from_slice(&[fill; 20]);
        base58::encode_check(&payload)
    }

    fn config_json(recipients: &str) -> String {
        format!(
            r#"{{
                "coin": {{"name": "Testcoin", "algorithm": "sha256"}},
                "address": "{}",
                "network": {{"pub_key_hash": 111, "script_hash": 196, "bech32": "tb"}},
                "instance_id": 3,
                "recipients": {recipients},
                "vardiff": {{
                    "min_diff": 8,
                    "max_diff": 512,
                    "target_time": 15,
                    "retarget_time": 90,
                    "variance_percent": 30
                }}
            }}"#,
            testnet_address(0x11)
        )
    }

    fn parse(json: &str) -> PoolConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_resolve_full_config() {
        let recipients = format!(r#"[{{"address": "{}", "percent": 1.5}}]"#, testnet_address(0x22));
        let config = parse(&config_json(&recipients));
        let resolved = config.resolve().unwrap();
        let options = &resolved.job_manager;

        assert_eq!(options.hash_family.algorithm(), Algorithm::Sha256);
        assert_eq!(options.reward_type, RewardType::Pow);
        assert_eq!(options.coinbase_string, "/mujina/");
        assert_eq!(options.instance_id, Some(3));
        assert_eq!(&options.pool_script[3..23], &[0x11; 20]);
        assert_eq!(options.recipients.len(), 1);
        assert_eq!(options.recipients[0].fraction, 0.015);
        assert_eq!(resolved.vardiff.max_diff, 512.0);
        assert!(!resolved.vardiff.x2_mode);
    }

    #[test]
    fn test_defaults() {
        let json = format!(
            r#"{{"coin": {{"name": "Testcoin", "algorithm": "blake3"}}, "address": "{}"}}"#,
            testnet_address(0x11)
        );
        let config = parse(&json);
        assert!(config.network.is_none());
        assert!(config.recipients.is_empty());
        assert!(!config.emit_invalid_block_hashes);
        assert_eq!(config.vardiff, VarDiffConfig::default());

        let resolved = config.resolve().unwrap();
        assert_eq!(resolved.job_manager.hash_family.algorithm(), Algorithm::Blake3);
        assert_eq!(resolved.job_manager.instance_id, None);
    }

    #[test]
    fn test_scrypt_coin() {
        let json = format!(
            r#"{{"coin": {{"name": "Testlite", "algorithm": "scrypt"}}, "address": "{}"}}"#,
            testnet_address(0x11)
        );
        let family = parse(&json).resolve().unwrap().job_manager.hash_family;
        assert_eq!(family.algorithm(), Algorithm::Scrypt);
        assert_eq!(family.share_multiplier(), 65536.0);
    }

    #[test]
    fn test_recipients_over_100_percent_rejected() {
        let recipients = format!(
            r#"[{{"address": "{a}", "percent": 60}}, {{"address": "{a}", "percent": 50}}]"#,
            a = testnet_address(0x22)
        );
        let config = parse(&config_json(&recipients));
        assert_eq!(
            config.resolve().unwrap_err(),
            ConfigError::RecipientsExceedReward(110.0)
        );
    }

    #[test]
    fn test_negative_percent_rejected() {
        let recipients = format!(r#"[{{"address": "{}", "percent": -1}}]"#, testnet_address(0x22));
        let config = parse(&config_json(&recipients));
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::InvalidRecipientPercent { .. })
        ));
    }

    #[test]
    fn test_bad_recipient_address_rejected() {
        let config = parse(&config_json(r#"[{"address": "nope", "percent": 1}]"#));
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::RecipientAddress(_))
        ));
    }

    #[test]
    fn test_vardiff_bounds_checked() {
        let mut config = parse(&config_json("[]"));
        config.vardiff.max_diff = 4.0;
        assert!(matches!(config.resolve(), Err(ConfigError::VarDiff(_))));

        let mut config = parse(&config_json("[]"));
        config.vardiff.target_time = 0.0;
        assert!(matches!(config.resolve(), Err(ConfigError::VarDiff(_))));
    }

    #[test]
    fn test_pos_pays_public_key() {
        let mut config = parse(&config_json("[]"));
        config.coin.reward = RewardType::Pos;
        config.address = format!("02{}", "ab".repeat(32));

        let script = config.resolve().unwrap().job_manager.pool_script;
        assert_eq!(script.len(), 35);
        assert_eq!(script[0], 0x21);
        assert_eq!(script[34], 0xac);
    }

    #[test]
    fn test_mining_key_overrides_address() {
        let mut config = parse(&config_json("[]"));
        config.mining_key = Some("33".repeat(20));

        let script = config.resolve().unwrap().job_manager.pool_script;
        assert_eq!(&script[3..23], &[0x33; 20]);
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("mujina-pool-{}.json", std::process::id()));
        fs::write(&path, config_json("[]")).unwrap();
        let config = PoolConfig::load(&path);
        fs::remove_file(&path).unwrap();

        assert_eq!(config.unwrap().coin.name, "Testcoin");
        assert!(PoolConfig::load(Path::new("/nonexistent/pool.json")).is_err());
    }
}
