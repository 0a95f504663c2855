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

//! Runs the reward rule over one payment cycle.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    artifact::write_payments,
    config::WeightedUsageConfig,
    transactions::{ParquetTransactionSource, TransactionSource},
    weighted_usage::{summary, PaymentTable, Summary, WeightedUsage},
    RewardError,
};

/// Payments computed for a payment cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardOutput {
    /// Cycle the payments belong to
    pub payment_cycle: u64,
    /// Block window `[min, max)` the rule was run over
    pub window: (u64, u64),
    /// Payments, one per payee
    pub table: PaymentTable,
    /// Totals over the payments
    pub summary: Summary,
}

pub struct RewardRunner {
    rule: WeightedUsage,
    source: Arc<dyn TransactionSource>,
}

impl RewardRunner {
    pub fn new(config: WeightedUsageConfig, source: Arc<dyn TransactionSource>) -> Self {
        Self { rule: WeightedUsage::new(config), source }
    }

    /// Runner reading the partitioned transactions under the configured data location.
    pub fn from_config(config: WeightedUsageConfig) -> Self {
        let source = Arc::new(ParquetTransactionSource::new(&config.data_location));
        Self::new(config, source)
    }

    pub fn config(&self) -> &WeightedUsageConfig {
        self.rule.config()
    }

    /// Block window covered by `payment_cycle`.
    ///
    /// Consecutive cycles `payment_cycle_length` apart cover adjacent windows. Cycles shorter
    /// than one cycle length start at block 0.
    pub fn window(&self, payment_cycle: u64) -> (u64, u64) {
        let min_block = payment_cycle.saturating_sub(self.config().payment_cycle_length);
        (min_block, payment_cycle)
    }

    pub async fn run(&self, payment_cycle: u64) -> Result<RewardOutput, RewardError> {
        let (min_block, max_block) = self.window(payment_cycle);
        tracing::info!(
            "Computing rewards of program {} for cycle {} over blocks [{}, {})",
            self.config().reward_program_id,
            payment_cycle,
            min_block,
            max_block
        );

        let transactions = self.source.transactions(min_block, max_block).await?;
        let table = self.rule.run(&transactions, min_block, max_block);
        let summary = summary(table.payment_list());
        tracing::info!(
            "Cycle {}: {} transactions, {} payees, total reward {}",
            payment_cycle,
            transactions.len(),
            summary.unique_payee,
            summary.total_reward
        );

        Ok(RewardOutput { payment_cycle, window: (min_block, max_block), table, summary })
    }

    /// Write the payments artifact of `output` below `location`.
    pub async fn write(
        &self,
        output: &RewardOutput,
        location: &Path,
    ) -> Result<PathBuf, RewardError> {
        let path = write_payments(
            location,
            &self.config().reward_program_id,
            output.payment_cycle,
            output.table.payment_list(),
        )
        .await?;
        tracing::info!("Wrote {} payments to {}", output.table.len(), path.display());
        Ok(path)
    }
}
