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

//! Prepaid card payments stored as block-partitioned parquet files.
//!
//! The layout below the data location is
//! `prepaid_card_payment/partition_size={size}/start_partition={start}/data.parquet`,
//! where a partition covers the blocks `[start, start + size)`.

use std::path::{Path, PathBuf};

use arrow::{
    array::{Array, ArrayRef, AsArray},
    compute::cast,
    datatypes::{DataType, UInt64Type},
    record_batch::RecordBatch,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::try_join_all;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tokio::fs;

use crate::RewardError;

/// Table holding prepaid card payments
pub const PAYMENT_TABLE: &str = "prepaid_card_payment";

const PARTITION_FILE: &str = "data.parquet";

/// A single prepaid card payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Owner of the prepaid card, the payee of any reward
    pub payee: String,
    /// Amount spent
    pub spend: u64,
    /// Block the payment was made in
    pub block_number: u64,
}

/// Source of the transactions made within a block window
#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// All transactions with a block number in `[min_block, max_block)`.
    async fn transactions(
        &self,
        min_block: u64,
        max_block: u64,
    ) -> Result<Vec<Transaction>, RewardError>;
}

/// One `data.parquet` file and the blocks it covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub size: u64,
    pub start: u64,
    pub path: PathBuf,
}

impl Partition {
    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.size)
    }

    fn overlaps(&self, start: u64, end: u64) -> bool {
        start < end && self.start < end && start < self.end()
    }
}

/// Choose the partitions to read for `[min_block, max_block)`.
///
/// Larger partitions win; a partition is dropped if it overlaps one already chosen so no
/// block is read twice.
pub fn select_partitions(
    mut partitions: Vec<Partition>,
    min_block: u64,
    max_block: u64,
) -> Vec<Partition> {
    partitions.sort_by(|a, b| b.size.cmp(&a.size).then(a.start.cmp(&b.start)));

    let mut selected: Vec<Partition> = Vec::new();
    for partition in partitions {
        if !partition.overlaps(min_block, max_block) {
            continue;
        }
        if selected.iter().any(|s| s.overlaps(partition.start, partition.end())) {
            continue;
        }
        selected.push(partition);
    }
    selected.sort_by_key(|p| p.start);
    selected
}

/// Transactions read from the local partitioned payment table
#[derive(Debug, Clone)]
pub struct ParquetTransactionSource {
    table: PathBuf,
}

impl ParquetTransactionSource {
    pub fn new(data_location: impl AsRef<Path>) -> Self {
        Self { table: data_location.as_ref().join(PAYMENT_TABLE) }
    }

    /// Every partition file present in the table.
    pub async fn partitions(&self) -> Result<Vec<Partition>, RewardError> {
        let mut partitions = Vec::new();

        let mut sizes = fs::read_dir(&self.table).await?;
        while let Some(size_dir) = sizes.next_entry().await? {
            let Some(size) = partition_value(&size_dir.path(), "partition_size")? else {
                continue;
            };
            if size == 0 {
                return Err(RewardError::InvalidPartition(size_dir.path().display().to_string()));
            }

            let mut starts = fs::read_dir(size_dir.path()).await?;
            while let Some(start_dir) = starts.next_entry().await? {
                let Some(start) = partition_value(&start_dir.path(), "start_partition")? else {
                    continue;
                };
                let path = start_dir.path().join(PARTITION_FILE);
                if !fs::try_exists(&path).await? {
                    return Err(RewardError::InvalidPartition(format!(
                        "{} has no {PARTITION_FILE}",
                        start_dir.path().display()
                    )));
                }
                partitions.push(Partition { size, start, path });
            }
        }

        Ok(partitions)
    }
}

/// Parse `{key}={value}` directory names; other entries are ignored.
fn partition_value(path: &Path, key: &str) -> Result<Option<u64>, RewardError> {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return Ok(None);
    };
    let Some(value) = name.strip_prefix(key).and_then(|rest| rest.strip_prefix('=')) else {
        tracing::debug!("Ignoring {} in partitioned table", path.display());
        return Ok(None);
    };
    value
        .parse()
        .map(Some)
        .map_err(|_| RewardError::InvalidPartition(path.display().to_string()))
}

#[async_trait]
impl TransactionSource for ParquetTransactionSource {
    async fn transactions(
        &self,
        min_block: u64,
        max_block: u64,
    ) -> Result<Vec<Transaction>, RewardError> {
        let partitions = select_partitions(self.partitions().await?, min_block, max_block);
        tracing::debug!(
            "Reading {} partitions of {} for blocks [{}, {})",
            partitions.len(),
            self.table.display(),
            min_block,
            max_block
        );

        let reads = partitions.iter().map(|partition| read_partition(&partition.path));
        let transactions = try_join_all(reads)
            .await?
            .into_iter()
            .flatten()
            .filter(|tx| tx.block_number >= min_block && tx.block_number < max_block)
            .collect();
        Ok(transactions)
    }
}

async fn read_partition(path: &Path) -> Result<Vec<Transaction>, RewardError> {
    let data = Bytes::from(fs::read(path).await?);
    parse_transactions(data)
}

/// Decode the payment rows of one partition file.
pub fn parse_transactions(data: Bytes) -> Result<Vec<Transaction>, RewardError> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(data)?.build()?;

    let mut transactions = Vec::new();
    for batch in reader {
        let batch = batch?;
        let payees = cast(column(&batch, "prepaid_card_owner")?, &DataType::Utf8)?;
        let payees = payees.as_string::<i32>();
        let spends = cast(column(&batch, "spend_amount_uint64")?, &DataType::UInt64)?;
        let spends = spends.as_primitive::<UInt64Type>();
        let blocks = cast(column(&batch, "block_number_uint64")?, &DataType::UInt64)?;
        let blocks = blocks.as_primitive::<UInt64Type>();

        for row in 0..batch.num_rows() {
            // Rows without an owner, amount or block cannot be attributed.
            if payees.is_null(row) || spends.is_null(row) || blocks.is_null(row) {
                continue;
            }
            transactions.push(Transaction {
                payee: payees.value(row).to_string(),
                spend: spends.value(row),
                block_number: blocks.value(row),
            });
        }
    }
    Ok(transactions)
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef, RewardError> {
    batch.column_by_name(name).ok_or_else(|| RewardError::MissingColumn(name.to_string()))
}
