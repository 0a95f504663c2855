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

//! Parquet artifact holding the payments of one reward program and cycle.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use arrow::{
    array::{ArrayRef, AsArray, Decimal128Array, StringArray, UInt64Array},
    datatypes::{DataType, Decimal128Type, Field, Schema, SchemaRef, UInt64Type},
    error::ArrowError,
    record_batch::RecordBatch,
};
use bytes::Bytes;
use parquet::arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter};
use tokio::fs;

use crate::{weighted_usage::PaymentRow, RewardError};

/// File name of the payments artifact
pub const PAYMENTS_FILE: &str = "payments.parquet";

/// Key of the payments artifact relative to the output location.
pub fn payments_key(reward_program_id: &str, payment_cycle: u64) -> String {
    format!("rewardProgramID={reward_program_id}/paymentCycle={payment_cycle}/{PAYMENTS_FILE}")
}

fn schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("payee", DataType::Utf8, false),
        Field::new("amount", DataType::UInt64, false),
        Field::new("transactions", DataType::UInt64, false),
        Field::new("total_spent", DataType::Decimal128(38, 0), false),
        Field::new("rewardProgramID", DataType::Utf8, false),
        Field::new("paymentCycle", DataType::UInt64, false),
        Field::new("token", DataType::Utf8, false),
        Field::new("validFrom", DataType::UInt64, false),
        Field::new("validTo", DataType::UInt64, false),
    ]))
}

/// Columnar form of a payment list.
pub fn to_record_batch(payments: &[PaymentRow]) -> Result<RecordBatch, RewardError> {
    let total_spent = payments
        .iter()
        .map(|p| {
            i128::try_from(p.total_spent).map_err(|_| {
                ArrowError::InvalidArgumentError(format!(
                    "total spent of {} does not fit a decimal",
                    p.payee
                ))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(payments.iter().map(|p| &p.payee))),
        Arc::new(UInt64Array::from_iter_values(payments.iter().map(|p| p.amount))),
        Arc::new(UInt64Array::from_iter_values(payments.iter().map(|p| p.transactions))),
        Arc::new(
            Decimal128Array::from_iter_values(total_spent).with_precision_and_scale(38, 0)?,
        ),
        Arc::new(StringArray::from_iter_values(payments.iter().map(|p| &p.reward_program_id))),
        Arc::new(UInt64Array::from_iter_values(payments.iter().map(|p| p.payment_cycle))),
        Arc::new(StringArray::from_iter_values(payments.iter().map(|p| &p.token))),
        Arc::new(UInt64Array::from_iter_values(payments.iter().map(|p| p.valid_from))),
        Arc::new(UInt64Array::from_iter_values(payments.iter().map(|p| p.valid_to))),
    ];
    Ok(RecordBatch::try_new(schema(), columns)?)
}

pub fn encode_payments(payments: &[PaymentRow]) -> Result<Vec<u8>, RewardError> {
    let batch = to_record_batch(payments)?;
    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, schema(), None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(buf)
}

/// Write the payments below `location`, returning the path of the artifact.
pub async fn write_payments(
    location: &Path,
    reward_program_id: &str,
    payment_cycle: u64,
    payments: &[PaymentRow],
) -> Result<PathBuf, RewardError> {
    let path = location.join(payments_key(reward_program_id, payment_cycle));
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(&path, encode_payments(payments)?).await?;
    Ok(path)
}

/// Read back a payments artifact.
pub fn read_payments(data: Bytes) -> Result<Vec<PaymentRow>, RewardError> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(data)?.build()?;

    let mut payments = Vec::new();
    for batch in reader {
        let batch = batch?;
        let payees = strings(&batch, "payee")?;
        let amounts = integers(&batch, "amount")?;
        let transactions = integers(&batch, "transactions")?;
        let total_spent = column(&batch, "total_spent")?
            .as_primitive_opt::<Decimal128Type>()
            .ok_or_else(|| mistyped("total_spent"))?;
        let programs = strings(&batch, "rewardProgramID")?;
        let cycles = integers(&batch, "paymentCycle")?;
        let tokens = strings(&batch, "token")?;
        let valid_from = integers(&batch, "validFrom")?;
        let valid_to = integers(&batch, "validTo")?;

        for row in 0..batch.num_rows() {
            payments.push(PaymentRow {
                payee: payees.value(row).to_string(),
                amount: amounts.value(row),
                transactions: transactions.value(row),
                total_spent: u128::try_from(total_spent.value(row)).map_err(|_| {
                    ArrowError::InvalidArgumentError(format!("negative total spent at row {row}"))
                })?,
                reward_program_id: programs.value(row).to_string(),
                payment_cycle: cycles.value(row),
                token: tokens.value(row).to_string(),
                valid_from: valid_from.value(row),
                valid_to: valid_to.value(row),
            });
        }
    }
    Ok(payments)
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef, RewardError> {
    batch.column_by_name(name).ok_or_else(|| RewardError::MissingColumn(name.to_string()))
}

fn mistyped(name: &str) -> RewardError {
    ArrowError::SchemaError(format!("unexpected type of column {name}")).into()
}

fn strings<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, RewardError> {
    column(batch, name)?.as_string_opt::<i32>().ok_or_else(|| mistyped(name))
}

fn integers<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt64Array, RewardError> {
    column(batch, name)?.as_primitive_opt::<UInt64Type>().ok_or_else(|| mistyped(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(payee: &str, amount: u64) -> PaymentRow {
        PaymentRow {
            payee: payee.to_string(),
            amount,
            transactions: 3,
            total_spent: u128::from(u64::MAX) * 4,
            reward_program_id: "0xprogram".to_string(),
            payment_cycle: 1024,
            token: "0xtoken".to_string(),
            valid_from: 1024,
            valid_to: 44224,
        }
    }

    #[test]
    fn key_layout() {
        assert_eq!(
            payments_key("0xprogram", 1024),
            "rewardProgramID=0xprogram/paymentCycle=1024/payments.parquet"
        );
    }

    #[tokio::test]
    async fn writes_below_location() {
        let dir = tempfile::tempdir().unwrap();
        let payments = vec![row("0xa", 90), row("0xb", 10)];

        let path = write_payments(dir.path(), "0xprogram", 1024, &payments).await.unwrap();

        assert_eq!(path, dir.path().join(payments_key("0xprogram", 1024)));
        let data = Bytes::from(std::fs::read(&path).unwrap());
        assert_eq!(read_payments(data).unwrap(), payments);
    }

    #[test]
    fn empty_payment_list_has_schema() {
        let batch = to_record_batch(&[]).unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.num_columns(), 9);
    }
}
