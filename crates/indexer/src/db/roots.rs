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

use std::{str::FromStr, sync::Arc};

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use sqlx::{
    any::{install_default_drivers, AnyConnectOptions, AnyPoolOptions, AnyRow},
    AnyPool, Row,
};

use super::DbError;

// Setting too high may result in hitting parameter limits for the db engine.
const PROOF_BATCH_SIZE: usize = 200;
const PROOF_COLUMNS: usize = 11;

/// Convert a U256 to a zero-padded string for proper database sorting
/// U256 max value has 78 decimal digits (2^256 ≈ 1.15 * 10^77)
fn pad_u256(value: U256) -> String {
    format!("{:0>78}", value)
}

/// Convert a zero-padded string back to U256
fn unpad_u256(s: &str) -> Result<U256, DbError> {
    let trimmed = s.trim_start_matches('0');
    if trimmed.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str(trimmed).map_err(|e| DbError::BadValue(format!("Invalid U256 string {s}: {e}")))
}

/// A merkle root submission that has been indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootRecord {
    pub root_hash: String,
    pub reward_program_id: String,
    pub payment_cycle: u64,
    pub block_number: u64,
    /// Unix seconds of the submitting block.
    pub timestamp: u64,
}

/// One payee's claimable entitlement under a root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofRecord {
    pub root_hash: String,
    pub reward_program_id: String,
    pub payment_cycle: u64,
    pub payee: String,
    pub token_address: Address,
    pub amount: U256,
    pub proof_array: Vec<String>,
    pub leaf: Vec<u8>,
    pub valid_from: u64,
    pub valid_to: u64,
}

/// A root together with all of its proofs, waiting to be committed.
#[derive(Debug, Clone)]
pub struct StagedRoot {
    pub root: RootRecord,
    pub proofs: Vec<ProofRecord>,
}

#[async_trait]
pub trait RootStore {
    /// Highest block number of any persisted root for the program, if any.
    async fn last_indexed_block(&self, reward_program_id: &str) -> Result<Option<u64>, DbError>;

    /// Persist every staged root and its proofs in a single transaction.
    ///
    /// Either the whole batch is visible afterwards or none of it is.
    async fn commit_roots(&self, batch: &[StagedRoot]) -> Result<(), DbError>;

    async fn get_root(&self, root_hash: &str) -> Result<Option<RootRecord>, DbError>;

    /// Proofs owed to `payee`, newest payment cycle first.
    async fn proofs_for_payee(
        &self,
        payee: &str,
        reward_program_id: Option<&str>,
    ) -> Result<Vec<ProofRecord>, DbError>;
}

pub type RootStoreObj = Arc<dyn RootStore + Send + Sync>;

#[derive(Debug, Clone)]
pub struct RewardsDb {
    pool: AnyPool,
}

impl RewardsDb {
    /// For SQLite use a `sqlite:file_path` URL; for Postgres `postgres://`.
    pub async fn new(conn_str: &str) -> Result<Self, DbError> {
        install_default_drivers();
        let opts = AnyConnectOptions::from_str(conn_str)?;

        let pool = AnyPoolOptions::new().max_connections(5).connect_with(opts).await?;

        // apply any migrations
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }
}

fn row_to_root(row: &AnyRow) -> Result<RootRecord, DbError> {
    Ok(RootRecord {
        root_hash: row.try_get("root_hash")?,
        reward_program_id: row.try_get("reward_program_id")?,
        payment_cycle: row.try_get::<i64, _>("payment_cycle")? as u64,
        block_number: row.try_get::<i64, _>("block_number")? as u64,
        timestamp: row.try_get::<i64, _>("timestamp")? as u64,
    })
}

fn row_to_proof(row: &AnyRow) -> Result<ProofRecord, DbError> {
    let token: String = row.try_get("token_address")?;
    let proof_array: String = row.try_get("proof_array")?;
    let leaf: String = row.try_get("leaf")?;

    Ok(ProofRecord {
        root_hash: row.try_get("root_hash")?,
        reward_program_id: row.try_get("reward_program_id")?,
        payment_cycle: row.try_get::<i64, _>("payment_cycle")? as u64,
        payee: row.try_get("payee")?,
        token_address: Address::from_str(&token)
            .map_err(|e| DbError::BadValue(format!("token address {token}: {e}")))?,
        amount: unpad_u256(&row.try_get::<String, _>("amount")?)?,
        proof_array: serde_json::from_str(&proof_array)
            .map_err(|e| DbError::BadValue(format!("proof array: {e}")))?,
        leaf: hex::decode(leaf.trim_start_matches("0x"))
            .map_err(|e| DbError::BadValue(format!("leaf: {e}")))?,
        valid_from: row.try_get::<i64, _>("valid_from")? as u64,
        valid_to: row.try_get::<i64, _>("valid_to")? as u64,
    })
}

#[async_trait]
impl RootStore for RewardsDb {
    async fn last_indexed_block(&self, reward_program_id: &str) -> Result<Option<u64>, DbError> {
        let row = sqlx::query(
            "SELECT MAX(block_number) AS max_block FROM roots WHERE reward_program_id = $1",
        )
        .bind(reward_program_id)
        .fetch_one(&self.pool)
        .await?;

        let max_block: Option<i64> = row.try_get("max_block")?;
        Ok(max_block.map(|block| block as u64))
    }

    async fn commit_roots(&self, batch: &[StagedRoot]) -> Result<(), DbError> {
        // Dropping the transaction on any early return rolls it back.
        let mut tx = self.pool.begin().await?;

        for staged in batch {
            let root = &staged.root;
            sqlx::query(
                "INSERT INTO roots (root_hash, reward_program_id, payment_cycle, block_number, timestamp)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(&root.root_hash)
            .bind(&root.reward_program_id)
            .bind(root.payment_cycle as i64)
            .bind(root.block_number as i64)
            .bind(root.timestamp as i64)
            .execute(&mut *tx)
            .await?;

            for (chunk_idx, chunk) in staged.proofs.chunks(PROOF_BATCH_SIZE).enumerate() {
                let values_clauses: Vec<String> = (0..chunk.len())
                    .map(|row| {
                        let params: Vec<String> = (1..=PROOF_COLUMNS)
                            .map(|col| format!("${}", row * PROOF_COLUMNS + col))
                            .collect();
                        format!("({})", params.join(","))
                    })
                    .collect();

                let query = format!(
                    "INSERT INTO proofs (
                        id, root_hash, reward_program_id, payment_cycle, payee, token_address,
                        amount, proof_array, leaf, valid_from, valid_to
                    ) VALUES {}",
                    values_clauses.join(",")
                );

                let mut q = sqlx::query(&query);
                for (offset, proof) in chunk.iter().enumerate() {
                    let proof_array = serde_json::to_string(&proof.proof_array)
                        .map_err(|e| DbError::BadValue(format!("proof array: {e}")))?;
                    q = q
                        .bind((chunk_idx * PROOF_BATCH_SIZE + offset) as i64)
                        .bind(proof.root_hash.clone())
                        .bind(proof.reward_program_id.clone())
                        .bind(proof.payment_cycle as i64)
                        .bind(proof.payee.clone())
                        .bind(proof.token_address.to_checksum(None))
                        .bind(pad_u256(proof.amount))
                        .bind(proof_array)
                        .bind(format!("0x{}", hex::encode(&proof.leaf)))
                        .bind(proof.valid_from as i64)
                        .bind(proof.valid_to as i64);
                }
                q.execute(&mut *tx).await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_root(&self, root_hash: &str) -> Result<Option<RootRecord>, DbError> {
        let row = sqlx::query(
            "SELECT root_hash, reward_program_id, payment_cycle, block_number, timestamp
             FROM roots WHERE root_hash = $1",
        )
        .bind(root_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_root).transpose()
    }

    async fn proofs_for_payee(
        &self,
        payee: &str,
        reward_program_id: Option<&str>,
    ) -> Result<Vec<ProofRecord>, DbError> {
        let base = "SELECT root_hash, reward_program_id, payment_cycle, payee, token_address, amount,
                    proof_array, leaf, valid_from, valid_to
             FROM proofs WHERE payee = $1";

        let rows = match reward_program_id {
            Some(program) => {
                let query =
                    format!("{base} AND reward_program_id = $2 ORDER BY payment_cycle DESC, id ASC");
                sqlx::query(&query).bind(payee).bind(program).fetch_all(&self.pool).await?
            }
            None => {
                let query = format!("{base} ORDER BY payment_cycle DESC, id ASC");
                sqlx::query(&query).bind(payee).fetch_all(&self.pool).await?
            }
        };

        rows.iter().map(row_to_proof).collect()
    }
}
