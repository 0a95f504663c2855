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

//! Read access to the payment artifacts committed to by merkle roots.

use std::sync::Arc;

use arrow::{
    array::{Array, ArrayRef, AsArray},
    compute::cast,
    datatypes::{DataType, Field, UInt64Type},
    error::ArrowError,
    record_batch::RecordBatch,
};
use async_trait::async_trait;
use bytes::Bytes;
use parquet::{arrow::arrow_reader::ParquetRecordBatchReaderBuilder, errors::ParquetError};

mod file;
mod s3;

pub use file::FileArtifactStore;
pub use s3::{S3ArtifactStore, S3ArtifactStoreError};

#[derive(thiserror::Error, Debug)]
pub enum ArtifactError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("S3 artifact error: {0}")]
    S3(#[from] S3ArtifactStoreError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Invalid value in column {column} at row {row}: {reason}")]
    BadValue { column: String, row: usize, reason: String },

    #[error("Invalid artifact URI: {0}")]
    InvalidUri(String),

    #[error("Unsupported artifact URI scheme: {0}")]
    UnsupportedScheme(String),
}

/// One row of a `results.parquet` payment artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRecord {
    pub root: String,
    pub payment_cycle: u64,
    pub payee: String,
    pub proof: Vec<String>,
    pub reward_program_id: String,
    pub leaf: Vec<u8>,
    pub valid_from: u64,
    pub valid_to: u64,
}

/// Key of the artifact for a program's payment cycle, relative to the store root.
pub fn artifact_key(reward_program_id: &str, payment_cycle: u64) -> String {
    format!("rewardProgramID={reward_program_id}/paymentCycle={payment_cycle}/results.parquet")
}

/// Path-addressable, read-only store of payment artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Full location of `key`, for logging.
    fn location(&self, key: &str) -> String;

    async fn exists(&self, key: &str) -> Result<bool, ArtifactError>;

    /// Raw parquet bytes stored at `key`.
    async fn read(&self, key: &str) -> Result<Bytes, ArtifactError>;

    async fn read_payments(&self, key: &str) -> Result<Vec<PaymentRecord>, ArtifactError> {
        let data = self.read(key).await?;
        parse_payments(data)
    }
}

/// Create an artifact store from a storage location.
///
/// Supported locations:
/// - `file:///path/to/results` or a bare path - local file system
/// - `s3://bucket-name/prefix` - S3 bucket
pub async fn artifact_store_from_uri(
    uri: &str,
) -> Result<Arc<dyn ArtifactStore>, ArtifactError> {
    if !uri.contains("://") {
        return Ok(Arc::new(FileArtifactStore::new(uri)));
    }

    let url = uri.parse::<url::Url>().map_err(|e| {
        ArtifactError::InvalidUri(format!("Failed to parse URI '{}': {}", uri, e))
    })?;

    match url.scheme() {
        "file" => Ok(Arc::new(FileArtifactStore::new(url.path()))),
        "s3" => {
            let bucket = url
                .host_str()
                .ok_or_else(|| {
                    ArtifactError::InvalidUri(format!("S3 URI missing bucket name: {}", uri))
                })?
                .to_string();
            let prefix = url.path().trim_matches('/').to_string();
            let storage = S3ArtifactStore::from_env(bucket, prefix).await?;
            Ok(Arc::new(storage))
        }
        scheme => Err(ArtifactError::UnsupportedScheme(scheme.to_string())),
    }
}

/// Decode every payment row of a parquet artifact.
pub fn parse_payments(data: Bytes) -> Result<Vec<PaymentRecord>, ArtifactError> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(data)?.build()?;

    let mut payments = Vec::new();
    for batch in reader {
        let batch = batch?;
        append_batch(&batch, &mut payments)?;
    }
    Ok(payments)
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef, ArtifactError> {
    batch.column_by_name(name).ok_or_else(|| ArtifactError::MissingColumn(name.to_string()))
}

fn null_value(column: &str, row: usize) -> ArtifactError {
    ArtifactError::BadValue { column: column.to_string(), row, reason: "null".to_string() }
}

fn strings(batch: &RecordBatch, name: &str) -> Result<Vec<String>, ArtifactError> {
    let array = cast(column(batch, name)?, &DataType::Utf8)?;
    let array = array.as_string::<i32>();
    (0..array.len())
        .map(|row| {
            if array.is_null(row) {
                return Err(null_value(name, row));
            }
            Ok(array.value(row).to_string())
        })
        .collect()
}

fn integers(batch: &RecordBatch, name: &str) -> Result<Vec<u64>, ArtifactError> {
    // Negative values become nulls under the default safe cast.
    let array = cast(column(batch, name)?, &DataType::UInt64)?;
    let array = array.as_primitive::<UInt64Type>();
    (0..array.len())
        .map(|row| {
            if array.is_null(row) {
                return Err(null_value(name, row));
            }
            Ok(array.value(row))
        })
        .collect()
}

/// Leaves are written either as raw binary or as 0x-prefixed hex strings.
fn leaves(batch: &RecordBatch, name: &str) -> Result<Vec<Vec<u8>>, ArtifactError> {
    let raw = column(batch, name)?;
    match raw.data_type() {
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => strings(batch, name)?
            .into_iter()
            .enumerate()
            .map(|(row, value)| {
                hex::decode(value.trim_start_matches("0x")).map_err(|e| ArtifactError::BadValue {
                    column: name.to_string(),
                    row,
                    reason: e.to_string(),
                })
            })
            .collect(),
        _ => {
            let array = cast(raw, &DataType::Binary)?;
            let array = array.as_binary::<i32>();
            (0..array.len())
                .map(|row| {
                    if array.is_null(row) {
                        return Err(null_value(name, row));
                    }
                    Ok(array.value(row).to_vec())
                })
                .collect()
        }
    }
}

fn proofs(batch: &RecordBatch, name: &str) -> Result<Vec<Vec<String>>, ArtifactError> {
    let list_type = DataType::List(Arc::new(Field::new("item", DataType::Utf8, true)));
    let array = cast(column(batch, name)?, &list_type)?;
    let array = array.as_list::<i32>();
    (0..array.len())
        .map(|row| {
            if array.is_null(row) {
                return Err(null_value(name, row));
            }
            let hashes = array.value(row);
            let hashes = hashes.as_string::<i32>();
            (0..hashes.len())
                .map(|i| {
                    if hashes.is_null(i) {
                        return Err(null_value(name, row));
                    }
                    Ok(hashes.value(i).to_string())
                })
                .collect()
        })
        .collect()
}

fn append_batch(batch: &RecordBatch, out: &mut Vec<PaymentRecord>) -> Result<(), ArtifactError> {
    let roots = strings(batch, "root")?;
    let cycles = integers(batch, "paymentCycle")?;
    let payees = strings(batch, "payee")?;
    let proofs = proofs(batch, "proof")?;
    let programs = strings(batch, "rewardProgramID")?;
    let leaves = leaves(batch, "leaf")?;
    let valid_from = integers(batch, "validFrom")?;
    let valid_to = integers(batch, "validTo")?;

    for (row, root) in roots.into_iter().enumerate() {
        out.push(PaymentRecord {
            root,
            payment_cycle: cycles[row],
            payee: payees[row].clone(),
            proof: proofs[row].clone(),
            reward_program_id: programs[row].clone(),
            leaf: leaves[row].clone(),
            valid_from: valid_from[row],
            valid_to: valid_to[row],
        });
    }
    Ok(())
}
