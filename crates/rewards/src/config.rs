// Copyright 2026 Boundless Foundation, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration of a weighted usage reward program.

use std::path::{Path, PathBuf};

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::RewardError;

/// Parameters of one weighted usage reward program
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WeightedUsageConfig {
    /// Reward program the payments belong to
    pub reward_program_id: String,
    /// Address of the token paid out
    pub token: String,
    /// Reward of the lowest ranked payee, in token units
    pub base_reward: f64,
    /// Weight of the transaction count ranking
    pub transaction_factor: f64,
    /// Weight of the total spend ranking
    pub spend_factor: f64,
    /// Number of blocks a payment stays claimable
    pub valid_duration: u64,
    /// Number of blocks in a payment cycle
    pub payment_cycle_length: u64,
    /// Directory holding the partitioned transaction tables
    pub data_location: PathBuf,
}

impl WeightedUsageConfig {
    /// Load and validate the config from disk
    pub async fn load(path: &Path) -> Result<Self, RewardError> {
        let data = fs::read_to_string(path).await?;
        Self::from_toml(&data)
    }

    pub fn from_toml(data: &str) -> Result<Self, RewardError> {
        let config: Self = toml::from_str(data).map_err(|e| RewardError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RewardError> {
        if self.payment_cycle_length == 0 {
            return Err(RewardError::Config("payment_cycle_length must be positive".into()));
        }
        for (name, value) in [
            ("base_reward", self.base_reward),
            ("transaction_factor", self.transaction_factor),
            ("spend_factor", self.spend_factor),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(RewardError::Config(format!(
                    "{name} must be finite and non-negative, got {value}"
                )));
            }
        }
        self.token_address()?;
        Ok(())
    }

    pub fn token_address(&self) -> Result<Address, RewardError> {
        self.token
            .parse()
            .map_err(|e| RewardError::Config(format!("invalid token address {}: {e}", self.token)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
reward_program_id = "0x0885ce31D73b63b0Fcb1158bf37eCeaD8Ff0fC72"
token = "0x999999cf1046e68e36E1aA2E0E07105eDDD1f08E"
base_reward = 10
transaction_factor = 2.0
spend_factor = 2.0
valid_duration = 43200
payment_cycle_length = 1024
data_location = "/data/staging_rewards"
"#;

    #[test]
    fn parses_program_config() {
        let config = WeightedUsageConfig::from_toml(CONFIG).unwrap();
        assert_eq!(config.base_reward, 10.0);
        assert_eq!(config.payment_cycle_length, 1024);
        assert_eq!(config.data_location, PathBuf::from("/data/staging_rewards"));
        assert_eq!(
            config.token_address().unwrap(),
            "0x999999cf1046e68e36E1aA2E0E07105eDDD1f08E".parse::<Address>().unwrap()
        );
    }

    #[test]
    fn rejects_zero_cycle_length() {
        let data = CONFIG.replace("payment_cycle_length = 1024", "payment_cycle_length = 0");
        assert!(matches!(WeightedUsageConfig::from_toml(&data), Err(RewardError::Config(_))));
    }

    #[test]
    fn rejects_negative_factor() {
        let data = CONFIG.replace("spend_factor = 2.0", "spend_factor = -1.0");
        let err = WeightedUsageConfig::from_toml(&data).unwrap_err();
        assert!(err.to_string().contains("spend_factor"));
    }

    #[test]
    fn rejects_unknown_option() {
        let data = format!("{CONFIG}\nrollover = true\n");
        assert!(WeightedUsageConfig::from_toml(&data).is_err());
    }

    #[test]
    fn rejects_bad_token() {
        let data = CONFIG.replace("0x999999cf1046e68e36E1aA2E0E07105eDDD1f08E", "card");
        assert!(WeightedUsageConfig::from_toml(&data).is_err());
    }

    #[tokio::test]
    async fn loads_from_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), CONFIG).unwrap();

        let config = WeightedUsageConfig::load(file.path()).await.unwrap();
        assert_eq!(config.valid_duration, 43200);
    }

    #[tokio::test]
    async fn load_reports_config_error_once() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let data = CONFIG.replace("payment_cycle_length = 1024", "payment_cycle_length = 0");
        std::fs::write(file.path(), data).unwrap();

        let err = WeightedUsageConfig::load(file.path()).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid configuration: payment_cycle_length must be positive"
        );
    }
}
