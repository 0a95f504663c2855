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

//! Indexer of reward merkle roots and the payment proofs behind them.
//!
//! Root submissions are discovered through a subgraph, the matching `results.parquet`
//! artifacts are loaded from object storage, and every leaf is decoded and persisted
//! together with its root.

pub mod artifacts;
pub mod db;
pub mod leaf;
pub mod reconciler;
pub mod subgraph;

pub mod test_utils;

pub use reconciler::{
    IndexerError, IndexerService, IndexerServiceConfig, ProgramOutcome, ProgramReport, RunReport,
};
