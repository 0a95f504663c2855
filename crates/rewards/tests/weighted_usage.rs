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

use std::{path::Path, sync::Arc};

use arrow::{
    array::{ArrayRef, StringArray, UInt64Array},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use bytes::Bytes;
use cardpay_rewards::{
    artifact::{payments_key, read_payments},
    transactions::PAYMENT_TABLE,
    ParquetTransactionSource, RewardError, RewardRunner, Summary, TransactionSource,
    WeightedUsageConfig,
};
use parquet::arrow::ArrowWriter;
use tempfile::TempDir;

const START_BLOCK: u64 = 24_000_000;
const END_BLOCK: u64 = 26_000_000;

fn write_partition(root: &Path, size: u64, start: u64, rows: &[(&str, u64, u64)]) {
    let dir = root
        .join(PAYMENT_TABLE)
        .join(format!("partition_size={size}"))
        .join(format!("start_partition={start}"));
    std::fs::create_dir_all(&dir).unwrap();

    let schema = Arc::new(Schema::new(vec![
        Field::new("prepaid_card_owner", DataType::Utf8, false),
        Field::new("spend_amount_uint64", DataType::UInt64, false),
        Field::new("block_number_uint64", DataType::UInt64, false),
    ]));
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.0))),
        Arc::new(UInt64Array::from_iter_values(rows.iter().map(|r| r.1))),
        Arc::new(UInt64Array::from_iter_values(rows.iter().map(|r| r.2))),
    ];
    let batch = RecordBatch::try_new(schema.clone(), columns).unwrap();

    let file = std::fs::File::create(dir.join("data.parquet")).unwrap();
    let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
}

/// Five card owners active in [24000000, 26000000), ranked
///
/// | payee | txns | spent | spend rank | txn rank | amount |
/// |-------|------|-------|------------|----------|--------|
/// | 0x01  | 4    | 400   | 1/2        | 0        | 60     |
/// | 0x02  | 3    | 900   | 1/4        | 1/4      | 62     |
/// | 0x03  | 3    | 400   | 1/2        | 1/4      | 50     |
/// | 0x05  | 2    | 1500  | 0          | 3/4      | 45     |
/// | 0x04  | 1    | 100   | 1          | 1        | 10     |
///
/// plus an overlapping smaller partition and activity just outside the window.
fn fixture() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    write_partition(
        root,
        1_000_000,
        24_000_000,
        &[
            ("0x01", 100, 24_000_000),
            ("0x01", 100, 24_100_000),
            ("0x02", 300, 24_200_000),
            ("0x02", 300, 24_300_000),
            ("0x03", 200, 24_400_000),
            ("0x05", 500, 24_500_000),
        ],
    );
    write_partition(
        root,
        1_000_000,
        25_000_000,
        &[
            ("0x01", 100, 25_000_000),
            ("0x01", 100, 25_999_999),
            ("0x02", 300, 25_100_000),
            ("0x03", 100, 25_200_000),
            ("0x03", 100, 25_300_000),
            ("0x04", 100, 25_400_000),
            ("0x05", 1000, 25_500_000),
        ],
    );
    // Covered by the larger partition above, must not be counted twice.
    write_partition(
        root,
        500_000,
        24_000_000,
        &[("0x01", 100, 24_000_000), ("0x03", 200, 24_400_000)],
    );
    write_partition(root, 1_000_000, 23_000_000, &[("0x07", 999, 23_999_999)]);
    write_partition(root, 1_000_000, 26_000_000, &[("0x06", 999, 26_000_000)]);

    dir
}

fn config(data_location: &Path, payment_cycle_length: u64) -> WeightedUsageConfig {
    WeightedUsageConfig {
        reward_program_id: "0x0885ce31D73b63b0Fcb1158bf37eCeaD8Ff0fC72".to_string(),
        token: "0x999999cf1046e68e36E1aA2E0E07105eDDD1f08E".to_string(),
        base_reward: 10.0,
        transaction_factor: 2.0,
        spend_factor: 2.0,
        valid_duration: 43200,
        payment_cycle_length,
        data_location: data_location.to_path_buf(),
    }
}

#[tokio::test]
async fn test_cycle_matches_fixture() {
    let data = fixture();
    let runner = RewardRunner::from_config(config(data.path(), END_BLOCK - START_BLOCK));

    let output = runner.run(END_BLOCK).await.unwrap();

    assert_eq!(output.window, (START_BLOCK, END_BLOCK));
    assert_eq!(output.summary, Summary { total_reward: 227, unique_payee: 5 });

    let rows: Vec<_> = output
        .table
        .payment_list()
        .iter()
        .map(|r| (r.payee.as_str(), r.transactions, r.total_spent, r.amount))
        .collect();
    assert_eq!(
        rows,
        vec![
            ("0x01", 4, 400, 60),
            ("0x02", 3, 900, 62),
            ("0x03", 3, 400, 50),
            ("0x05", 2, 1500, 45),
            ("0x04", 1, 100, 10),
        ]
    );

    for row in output.table.payment_list() {
        assert_eq!(row.payment_cycle, END_BLOCK);
        assert_eq!(row.valid_from, END_BLOCK);
        assert_eq!(row.valid_to, END_BLOCK + 43200);
        assert_eq!(row.token, "0x999999cf1046e68e36E1aA2E0E07105eDDD1f08E");
    }
}

#[tokio::test]
async fn test_repeated_runs_are_identical() {
    let data = fixture();
    let runner = RewardRunner::from_config(config(data.path(), END_BLOCK - START_BLOCK));

    let first = runner.run(END_BLOCK).await.unwrap();
    let second = runner.run(END_BLOCK).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_consecutive_cycles_cover_every_transaction_once() {
    let data = fixture();
    let length = 250_000;
    let runner = RewardRunner::from_config(config(data.path(), length));

    let mut previous_end = START_BLOCK;
    let mut transactions = 0;
    let mut spent = 0;
    for cycle in (START_BLOCK + length..=END_BLOCK).step_by(length as usize) {
        let output = runner.run(cycle).await.unwrap();
        assert_eq!(output.window.0, previous_end);
        previous_end = output.window.1;

        for row in output.table.payment_list() {
            transactions += row.transactions;
            spent += row.total_spent;
        }
    }

    assert_eq!(previous_end, END_BLOCK);
    assert_eq!(transactions, 13);
    assert_eq!(spent, 3300);
}

#[tokio::test]
async fn test_idle_payees_are_absent() {
    let data = fixture();
    let runner = RewardRunner::from_config(config(data.path(), END_BLOCK - START_BLOCK));

    let output = runner.run(END_BLOCK).await.unwrap();

    let payees: Vec<_> = output.table.payment_list().iter().map(|r| r.payee.clone()).collect();
    assert!(!payees.contains(&"0x06".to_string()));
    assert!(!payees.contains(&"0x07".to_string()));
}

#[tokio::test]
async fn test_lone_payee_gets_full_weight() {
    let data = fixture();
    let runner = RewardRunner::from_config(config(data.path(), 100_000));

    // only 0x04 is active in [25300001, 25400001)
    let output = runner.run(25_400_001).await.unwrap();

    assert_eq!(output.summary, Summary { total_reward: 90, unique_payee: 1 });
    assert_eq!(output.table.payment_list()[0].payee, "0x04");
}

#[tokio::test]
async fn test_window_without_partitions_is_empty() {
    let data = fixture();
    let runner = RewardRunner::from_config(config(data.path(), 1_000_000));

    let output = runner.run(30_000_000).await.unwrap();

    assert!(output.table.is_empty());
    assert_eq!(output.summary, Summary::default());
}

#[tokio::test]
async fn test_writes_payments_artifact() {
    let data = fixture();
    let out = TempDir::new().unwrap();
    let config = config(data.path(), END_BLOCK - START_BLOCK);
    let program = config.reward_program_id.clone();
    let runner = RewardRunner::from_config(config);

    let output = runner.run(END_BLOCK).await.unwrap();
    let path = runner.write(&output, out.path()).await.unwrap();

    assert_eq!(path, out.path().join(payments_key(&program, END_BLOCK)));
    let written = read_payments(Bytes::from(std::fs::read(path).unwrap())).unwrap();
    assert_eq!(written, output.table.payment_list());
}

#[tokio::test]
async fn test_missing_data_location_fails() {
    let dir = TempDir::new().unwrap();
    let source = ParquetTransactionSource::new(dir.path().join("absent"));

    let err = source.transactions(0, 1024).await.unwrap_err();
    assert!(matches!(err, RewardError::Io(_)));
}

#[tokio::test]
async fn test_missing_column_fails() {
    let dir = TempDir::new().unwrap();
    let partition = dir
        .path()
        .join(PAYMENT_TABLE)
        .join("partition_size=1024")
        .join("start_partition=0");
    std::fs::create_dir_all(&partition).unwrap();

    let schema = Arc::new(Schema::new(vec![Field::new("owner", DataType::Utf8, false)]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![Arc::new(StringArray::from_iter_values(["0x01"])) as ArrayRef],
    )
    .unwrap();
    let file = std::fs::File::create(partition.join("data.parquet")).unwrap();
    let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();

    let err = ParquetTransactionSource::new(dir.path()).transactions(0, 1024).await.unwrap_err();
    assert!(matches!(err, RewardError::MissingColumn(ref c) if c == "prepaid_card_owner"));
}
