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

//! Incremental indexing of merkle roots and their payment proofs.

use std::{collections::HashSet, sync::Arc};

use thiserror::Error;
use tokio::time::Duration;

use crate::{
    artifacts::{artifact_key, ArtifactError, ArtifactStore, PaymentRecord},
    db::{DbError, ProofRecord, RootRecord, RootStoreObj, StagedRoot},
    leaf::{decode_leaf, LeafDecodeError},
    subgraph::{MerkleRootSubmission, RewardSubgraph, SubgraphError},
};

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Subgraph error: {0}")]
    Source(#[from] SubgraphError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("Failed to decode leaf of payee {payee} under root {root}: {source}")]
    Decode {
        root: String,
        payee: String,
        #[source]
        source: LeafDecodeError,
    },

    #[error("Artifact for root {expected} contains a payment for root {found}")]
    RootMismatch { expected: String, found: String },

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Maximum retries reached")]
    MaxRetries,
}

impl IndexerError {
    /// Connectivity failures leave nothing to fix; the next run may simply succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, IndexerError::Source(err) if err.is_transient())
    }
}

#[derive(Clone, Debug, Default)]
pub struct IndexerServiceConfig {
    /// Programs that are never indexed.
    pub archived_reward_programs: HashSet<String>,
    /// Number of consecutive failed passes tolerated by [`IndexerService::run`].
    pub retries: u32,
}

/// Result of reconciling a single reward program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramOutcome {
    /// New roots were found. `deferred` roots had no artifact yet and wait for a later run.
    Indexed { roots: usize, proofs: usize, deferred: usize, watermark: u64 },
    UpToDate { watermark: u64 },
    Archived,
    Failed { error: String, transient: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramReport {
    pub reward_program_id: String,
    pub outcome: ProgramOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub programs: Vec<ProgramReport>,
}

impl RunReport {
    pub fn outcome(&self, reward_program_id: &str) -> Option<&ProgramOutcome> {
        self.programs
            .iter()
            .find(|p| p.reward_program_id == reward_program_id)
            .map(|p| &p.outcome)
    }

    pub fn failures(&self) -> usize {
        self.programs.iter().filter(|p| matches!(p.outcome, ProgramOutcome::Failed { .. })).count()
    }
}

#[derive(Clone)]
pub struct IndexerService {
    subgraph: Arc<dyn RewardSubgraph>,
    artifacts: Arc<dyn ArtifactStore>,
    db: RootStoreObj,
    config: IndexerServiceConfig,
}

impl IndexerService {
    pub fn new(
        subgraph: Arc<dyn RewardSubgraph>,
        artifacts: Arc<dyn ArtifactStore>,
        db: RootStoreObj,
        config: IndexerServiceConfig,
    ) -> Self {
        Self { subgraph, artifacts, db, config }
    }

    /// Reconcile every non-archived program once.
    ///
    /// Programs are isolated from each other: a failure is recorded in the report and the
    /// remaining programs are still processed. Only failing to list the programs fails the run.
    pub async fn run_once(&self) -> Result<RunReport, IndexerError> {
        let programs = self.subgraph.list_reward_programs().await?;
        let mut report = RunReport::default();

        for program in programs {
            let outcome = if self.config.archived_reward_programs.contains(&program.id) {
                tracing::debug!("Skipping archived reward program {}", program.id);
                ProgramOutcome::Archived
            } else {
                match self.index_program(&program.id).await {
                    Ok(outcome) => outcome,
                    Err(err) if err.is_transient() => {
                        tracing::warn!(
                            "Transient failure indexing reward program {}: {:?}",
                            program.id,
                            err
                        );
                        ProgramOutcome::Failed { error: err.to_string(), transient: true }
                    }
                    Err(err) => {
                        tracing::error!("Failed to index reward program {}: {:?}", program.id, err);
                        ProgramOutcome::Failed { error: err.to_string(), transient: false }
                    }
                }
            };
            report.programs.push(ProgramReport { reward_program_id: program.id, outcome });
        }

        Ok(report)
    }

    /// Index all roots of one program above its watermark in a single transaction.
    pub async fn index_program(
        &self,
        reward_program_id: &str,
    ) -> Result<ProgramOutcome, IndexerError> {
        let watermark = self.db.last_indexed_block(reward_program_id).await?.unwrap_or(0);
        tracing::info!(
            "Indexing reward program {} since block {}",
            reward_program_id,
            watermark
        );

        let mut new_roots =
            self.subgraph.list_root_submissions(reward_program_id, watermark).await?;
        new_roots.retain(|root| root.block_number > watermark);
        if new_roots.is_empty() {
            tracing::info!("Skipping indexing of {}: no new roots", reward_program_id);
            return Ok(ProgramOutcome::UpToDate { watermark });
        }
        // Stable sort keeps source order among roots of the same block.
        new_roots.sort_by_key(|root| root.block_number);

        let mut staged: Vec<StagedRoot> = Vec::with_capacity(new_roots.len());
        for root in &new_roots {
            match self.stage_root(root).await? {
                Some(root) => staged.push(root),
                // Later roots wait too, so the watermark never passes a root without proofs.
                // Roots sharing its block wait as well, or the watermark would reach it.
                None => {
                    staged.retain(|s| s.root.block_number < root.block_number);
                    break;
                }
            }
        }
        let deferred = new_roots.len() - staged.len();

        if !staged.is_empty() {
            self.db.commit_roots(&staged).await?;
        }

        let proofs = staged.iter().map(|s| s.proofs.len()).sum();
        let new_watermark = staged.last().map(|s| s.root.block_number).unwrap_or(watermark);
        tracing::info!(
            "Indexed {} roots ({} proofs) for reward program {}, watermark {} -> {}, {} deferred",
            staged.len(),
            proofs,
            reward_program_id,
            watermark,
            new_watermark,
            deferred
        );

        Ok(ProgramOutcome::Indexed {
            roots: staged.len(),
            proofs,
            deferred,
            watermark: new_watermark,
        })
    }

    /// Load and decode the artifact of `root`; `None` if it has not been produced yet.
    async fn stage_root(
        &self,
        root: &MerkleRootSubmission,
    ) -> Result<Option<StagedRoot>, IndexerError> {
        let key = artifact_key(&root.reward_program.id, root.payment_cycle);
        if !self.artifacts.exists(&key).await? {
            tracing::info!(
                "{} does not exist, deferring root {}",
                self.artifacts.location(&key),
                root.id
            );
            return Ok(None);
        }

        let payments = self.artifacts.read_payments(&key).await?;
        tracing::info!("Indexing {} proofs for root {}", payments.len(), root.id);

        let proofs = payments
            .into_iter()
            .map(|payment| build_proof(root, payment))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(StagedRoot {
            root: RootRecord {
                root_hash: root.id.clone(),
                reward_program_id: root.reward_program.id.clone(),
                payment_cycle: root.payment_cycle,
                block_number: root.block_number,
                timestamp: root.timestamp,
            },
            proofs,
        }))
    }

    /// Reconcile on a fixed interval until `once` is set or too many passes fail in a row.
    pub async fn run(&self, interval: Duration, once: bool) -> Result<(), IndexerError> {
        let mut ticker = tokio::time::interval(interval);
        let mut attempt = 0;
        loop {
            ticker.tick().await;

            match self.run_once().await {
                Ok(report) => {
                    attempt = 0;
                    tracing::info!(
                        "Reconciled {} reward programs, {} failed",
                        report.programs.len(),
                        report.failures()
                    );
                }
                Err(err) => {
                    attempt += 1;
                    tracing::warn!(
                        "Failed to list reward programs: {:?}, attempt number {}",
                        err,
                        attempt
                    );
                    if once {
                        return Err(err);
                    }
                }
            }

            if once {
                return Ok(());
            }
            if attempt > self.config.retries {
                tracing::error!("Aborting after {} consecutive attempts", attempt);
                return Err(IndexerError::MaxRetries);
            }
        }
    }
}

fn build_proof(
    root: &MerkleRootSubmission,
    payment: PaymentRecord,
) -> Result<ProofRecord, IndexerError> {
    if payment.root != root.id {
        return Err(IndexerError::RootMismatch { expected: root.id.clone(), found: payment.root });
    }

    let transfer = decode_leaf(&payment.leaf).map_err(|source| IndexerError::Decode {
        root: payment.root.clone(),
        payee: payment.payee.clone(),
        source,
    })?;

    Ok(ProofRecord {
        root_hash: payment.root,
        reward_program_id: payment.reward_program_id,
        payment_cycle: payment.payment_cycle,
        payee: payment.payee,
        token_address: transfer.token,
        amount: transfer.amount,
        proof_array: payment.proof,
        leaf: payment.leaf,
        valid_from: payment.valid_from,
        valid_to: payment.valid_to,
    })
}
