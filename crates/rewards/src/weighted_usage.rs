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

//! Weighted usage reward rule.
//!
//! Every card owner active in the window is ranked twice, by total spend and by number of
//! transactions. The reward is
//!
//! ```text
//! floor(base_reward * (1 + (1 - spend_rank) * spend_factor)
//!                   * (1 + (1 - txn_rank) * transaction_factor))
//! ```
//!
//! where a rank is the percent rank `(rank - 1) / (n - 1)` in descending order, 0 for the
//! leader and 1 for the last. Equal values share the rank of the first of them.

use std::collections::{BTreeMap, HashSet};

use crate::{config::WeightedUsageConfig, transactions::Transaction};

/// Reward owed to one payee for a payment cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRow {
    /// Card owner receiving the reward
    pub payee: String,
    /// Reward amount in token units
    pub amount: u64,
    /// Number of transactions in the window
    pub transactions: u64,
    /// Total spend in the window
    pub total_spent: u128,
    /// Reward program paying the reward
    pub reward_program_id: String,
    /// Cycle the payment belongs to
    pub payment_cycle: u64,
    /// Token paid out
    pub token: String,
    /// First block the payment can be claimed in
    pub valid_from: u64,
    /// Block after which the payment can no longer be claimed
    pub valid_to: u64,
}

/// Result table of the rule, ordered by transaction count descending then payee
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentTable {
    rows: Vec<PaymentRow>,
}

impl PaymentTable {
    pub fn new(rows: Vec<PaymentRow>) -> Self {
        Self { rows }
    }

    /// Rows of the table, one per payee.
    pub fn payment_list(&self) -> &[PaymentRow] {
        &self.rows
    }

    pub fn into_payment_list(self) -> Vec<PaymentRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Totals over a list of payments
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    /// Sum of all amounts
    pub total_reward: u128,
    /// Number of distinct payees
    pub unique_payee: usize,
}

pub fn summary(payments: &[PaymentRow]) -> Summary {
    let total_reward = payments.iter().map(|p| u128::from(p.amount)).sum();
    let unique_payee = payments.iter().map(|p| p.payee.as_str()).collect::<HashSet<_>>().len();
    Summary { total_reward, unique_payee }
}

/// The weighted usage rule for one reward program
#[derive(Debug, Clone)]
pub struct WeightedUsage {
    config: WeightedUsageConfig,
}

impl WeightedUsage {
    pub fn new(config: WeightedUsageConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WeightedUsageConfig {
        &self.config
    }

    /// Compute the payments for the transactions within `[min_block, max_block)`.
    ///
    /// Transactions outside the window are ignored. The payments are valid from `max_block`
    /// and belong to payment cycle `max_block`.
    pub fn run(
        &self,
        transactions: &[Transaction],
        min_block: u64,
        max_block: u64,
    ) -> PaymentTable {
        // BTreeMap keeps the per-payee aggregation independent of input order.
        let mut usage: BTreeMap<&str, (u64, u128)> = BTreeMap::new();
        for tx in transactions {
            if tx.block_number < min_block || tx.block_number >= max_block {
                continue;
            }
            let entry = usage.entry(tx.payee.as_str()).or_default();
            entry.0 += 1;
            entry.1 += u128::from(tx.spend);
        }

        let payees: Vec<(&str, u64, u128)> =
            usage.into_iter().map(|(payee, (count, spent))| (payee, count, spent)).collect();
        let spend_ranks = percent_ranks(&payees.iter().map(|p| p.2).collect::<Vec<_>>());
        let txn_ranks =
            percent_ranks(&payees.iter().map(|p| u128::from(p.1)).collect::<Vec<_>>());

        let valid_from = max_block;
        let valid_to = max_block.saturating_add(self.config.valid_duration);

        let mut rows: Vec<PaymentRow> = payees
            .iter()
            .zip(spend_ranks.iter().zip(&txn_ranks))
            .map(|(&(payee, transactions, total_spent), (&spend_rank, &txn_rank))| PaymentRow {
                payee: payee.to_string(),
                amount: self.amount(spend_rank, txn_rank),
                transactions,
                total_spent,
                reward_program_id: self.config.reward_program_id.clone(),
                payment_cycle: max_block,
                token: self.config.token.clone(),
                valid_from,
                valid_to,
            })
            .collect();

        rows.sort_by(|a, b| {
            b.transactions.cmp(&a.transactions).then_with(|| a.payee.cmp(&b.payee))
        });
        PaymentTable::new(rows)
    }

    fn amount(&self, spend_rank: f64, txn_rank: f64) -> u64 {
        let amount = self.config.base_reward
            * (1.0 + (1.0 - spend_rank) * self.config.spend_factor)
            * (1.0 + (1.0 - txn_rank) * self.config.transaction_factor);
        // saturating float to int conversion
        amount.floor() as u64
    }
}

/// Percent rank of every value when ordered descending.
pub fn percent_ranks(values: &[u128]) -> Vec<f64> {
    let n = values.len();
    if n <= 1 {
        return vec![0.0; n];
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[b].cmp(&values[a]));

    let mut ranks = vec![0.0; n];
    let mut rank = 0;
    for (position, &index) in order.iter().enumerate() {
        if position > 0 && values[index] != values[order[position - 1]] {
            rank = position;
        }
        ranks[index] = rank as f64 / (n - 1) as f64;
    }
    ranks
}
