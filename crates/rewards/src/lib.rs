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

//! Reward computation for card payment programs.
//!
//! Prepaid card payments are read from partitioned parquet files, aggregated per card
//! owner over one payment cycle and turned into reward payments by the weighted usage rule.

use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use thiserror::Error;

pub mod artifact;
pub mod config;
pub mod runner;
pub mod transactions;
pub mod weighted_usage;

pub use config::WeightedUsageConfig;
pub use runner::{RewardOutput, RewardRunner};
pub use transactions::{ParquetTransactionSource, Transaction, TransactionSource};
pub use weighted_usage::{summary, PaymentRow, PaymentTable, Summary, WeightedUsage};

/// Errors raised while computing or writing rewards
#[derive(Error, Debug)]
pub enum RewardError {
    /// Reading transaction data or writing results failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed parquet file
    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    /// Column could not be converted to the expected type
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    /// Rejected reward program configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Transaction data lacks a required column
    #[error("Missing column: {0}")]
    MissingColumn(String),

    /// Partition directory that does not follow the data layout
    #[error("Invalid partition: {0}")]
    InvalidPartition(String),
}
