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

use std::{
    collections::{HashMap, HashSet},
    path::Path,
    sync::{Arc, Mutex},
};

use arrow::{
    array::{ArrayRef, BinaryArray, Int64Array, ListBuilder, StringArray, StringBuilder},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use async_trait::async_trait;
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use sqlx::{any::install_default_drivers, AnyPool};
use tempfile::NamedTempFile;

use crate::{
    artifacts::{artifact_key, ArtifactError, ArtifactStore, PaymentRecord},
    db::{DbError, RewardsDb},
    subgraph::{MerkleRootSubmission, RewardProgram, RewardSubgraph, SubgraphError},
};

pub struct TestDb {
    pub db: Arc<RewardsDb>,
    pub db_url: String,
    pub pool: AnyPool,
    pub _temp_file: Option<NamedTempFile>,
}

impl TestDb {
    pub async fn new() -> Result<Self, DbError> {
        install_default_drivers();

        // Lets you run the DB tests against PostgreSQL, via setting INDEXER_DATABASE_URL
        // This is only supported for testing with --test-threads=1
        if let Ok(db_url) = std::env::var("INDEXER_DATABASE_URL") {
            if db_url.starts_with("postgres") {
                let pool = AnyPool::connect(&db_url).await?;
                let db = Arc::new(RewardsDb::new(&db_url).await?);
                let test_db = Self { db, db_url, pool, _temp_file: None };
                test_db.cleanup().await?;
                tracing::info!("Testing with Postgres. Must only run with --test-threads=1");
                return Ok(test_db);
            }
        }

        // Default: SQLite with temp file
        let temp_file = NamedTempFile::new().unwrap();
        let db_url = format!("sqlite:{}", temp_file.path().display());
        let pool = AnyPool::connect(&db_url).await?;
        let db = Arc::new(RewardsDb::new(&db_url).await?);

        Ok(Self { db, db_url, pool, _temp_file: Some(temp_file) })
    }

    pub fn get_db(&self) -> Arc<RewardsDb> {
        self.db.clone()
    }

    pub async fn cleanup(&self) -> Result<(), DbError> {
        // Only needed for PostgreSQL (SQLite uses temp files that are auto-cleaned)
        if self.db_url.starts_with("postgres") {
            for table in ["proofs", "roots"] {
                sqlx::query(&format!("DELETE FROM {}", table)).execute(&self.pool).await?;
            }
        }
        Ok(())
    }

    pub async fn count_roots(&self) -> Result<i64, DbError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM roots").fetch_one(&self.pool).await?)
    }

    pub async fn count_proofs(&self) -> Result<i64, DbError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM proofs").fetch_one(&self.pool).await?)
    }
}

/// Encode payment rows with the column layout of a `results.parquet` artifact.
pub fn encode_payments(records: &[PaymentRecord]) -> Result<Vec<u8>, ArtifactError> {
    let proof_type = DataType::List(Arc::new(Field::new("item", DataType::Utf8, true)));
    let schema = Arc::new(Schema::new(vec![
        Field::new("root", DataType::Utf8, false),
        Field::new("paymentCycle", DataType::Int64, false),
        Field::new("payee", DataType::Utf8, false),
        Field::new("proof", proof_type, false),
        Field::new("rewardProgramID", DataType::Utf8, false),
        Field::new("leaf", DataType::Binary, false),
        Field::new("validFrom", DataType::Int64, false),
        Field::new("validTo", DataType::Int64, false),
    ]));

    let mut proof = ListBuilder::new(StringBuilder::new());
    for record in records {
        for hash in &record.proof {
            proof.values().append_value(hash);
        }
        proof.append(true);
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(records.iter().map(|r| &r.root))),
        Arc::new(Int64Array::from_iter_values(records.iter().map(|r| r.payment_cycle as i64))),
        Arc::new(StringArray::from_iter_values(records.iter().map(|r| &r.payee))),
        Arc::new(proof.finish()),
        Arc::new(StringArray::from_iter_values(records.iter().map(|r| &r.reward_program_id))),
        Arc::new(BinaryArray::from_iter_values(records.iter().map(|r| &r.leaf))),
        Arc::new(Int64Array::from_iter_values(records.iter().map(|r| r.valid_from as i64))),
        Arc::new(Int64Array::from_iter_values(records.iter().map(|r| r.valid_to as i64))),
    ];
    let batch = RecordBatch::try_new(schema.clone(), columns)?;

    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(buf)
}

/// Write a `results.parquet` artifact below `root` at the conventional key.
pub fn write_payment_artifact(
    root: &Path,
    reward_program_id: &str,
    payment_cycle: u64,
    records: &[PaymentRecord],
) -> Result<(), ArtifactError> {
    let path = root.join(artifact_key(reward_program_id, payment_cycle));
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, encode_payments(records)?)?;
    Ok(())
}

/// Subgraph double serving canned programs and root submissions.
#[derive(Default)]
pub struct FakeSubgraph {
    programs: Mutex<Vec<RewardProgram>>,
    roots: Mutex<HashMap<String, Vec<MerkleRootSubmission>>>,
    failing: Mutex<HashSet<String>>,
    unreachable: Mutex<HashSet<String>>,
}

impl FakeSubgraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_program(&self, id: &str) {
        self.programs.lock().unwrap().push(RewardProgram { id: id.to_string() });
    }

    /// Publish a root submission; returned in whatever order it was published.
    pub fn publish_root(&self, reward_program_id: &str, root_hash: &str, block: u64, cycle: u64) {
        self.roots.lock().unwrap().entry(reward_program_id.to_string()).or_default().push(
            MerkleRootSubmission {
                id: root_hash.to_string(),
                block_number: block,
                payment_cycle: cycle,
                reward_program: RewardProgram { id: reward_program_id.to_string() },
                timestamp: 1_650_000_000 + block,
            },
        );
    }

    /// Make root queries for the program fail with a query error.
    pub fn fail_program(&self, reward_program_id: &str) {
        self.failing.lock().unwrap().insert(reward_program_id.to_string());
    }

    /// Make root queries for the program fail as if the subgraph could not be reached.
    pub fn disconnect_program(&self, reward_program_id: &str) {
        self.unreachable.lock().unwrap().insert(reward_program_id.to_string());
    }
}

#[async_trait]
impl RewardSubgraph for FakeSubgraph {
    async fn list_reward_programs(&self) -> Result<Vec<RewardProgram>, SubgraphError> {
        let mut programs = self.programs.lock().unwrap().clone();
        programs.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(programs)
    }

    async fn list_root_submissions(
        &self,
        reward_program_id: &str,
        block_number_gt: u64,
    ) -> Result<Vec<MerkleRootSubmission>, SubgraphError> {
        if self.failing.lock().unwrap().contains(reward_program_id) {
            return Err(SubgraphError::Query(format!("no such program {reward_program_id}")));
        }
        let unreachable = self.unreachable.lock().unwrap().contains(reward_program_id);
        if unreachable {
            // nothing listens on port 1
            let err = reqwest::get("http://127.0.0.1:1/").await.unwrap_err();
            return Err(SubgraphError::from_request(err));
        }
        let roots = self.roots.lock().unwrap();
        Ok(roots
            .get(reward_program_id)
            .map(|roots| {
                roots.iter().filter(|r| r.block_number > block_number_gt).cloned().collect()
            })
            .unwrap_or_default())
    }
}

/// Artifact store held in memory, keyed like the real stores.
#[derive(Default)]
pub struct MemoryArtifactStore {
    objects: Mutex<HashMap<String, Bytes>>,
    reads: Mutex<Vec<String>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &self,
        reward_program_id: &str,
        payment_cycle: u64,
        records: &[PaymentRecord],
    ) -> Result<(), ArtifactError> {
        let data = encode_payments(records)?;
        self.objects
            .lock()
            .unwrap()
            .insert(artifact_key(reward_program_id, payment_cycle), Bytes::from(data));
        Ok(())
    }

    pub fn insert_raw(&self, key: &str, data: Vec<u8>) {
        self.objects.lock().unwrap().insert(key.to_string(), Bytes::from(data));
    }

    /// Keys read so far, in the order they were read.
    pub fn reads(&self) -> Vec<String> {
        self.reads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    fn location(&self, key: &str) -> String {
        format!("memory://{key}")
    }

    async fn exists(&self, key: &str) -> Result<bool, ArtifactError> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn read(&self, key: &str) -> Result<Bytes, ArtifactError> {
        self.reads.lock().unwrap().push(key.to_string());
        self.objects.lock().unwrap().get(key).cloned().ok_or_else(|| {
            ArtifactError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, key.to_string()))
        })
    }
}
