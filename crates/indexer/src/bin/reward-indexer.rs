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

use std::{sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use cardpay_indexer::{
    artifacts::artifact_store_from_uri, db::RewardsDb, subgraph::SubgraphClient, IndexerService,
    IndexerServiceConfig,
};
use clap::Parser;
use url::Url;

/// Arguments of the reward indexer.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct MainArgs {
    /// URL of the subgraph GraphQL endpoint.
    #[clap(long, env)]
    subgraph_url: Url,
    /// DB connection string.
    #[clap(long, env = "DATABASE_URL")]
    db: String,
    /// Location of the reward results (a path, file:///path or s3://bucket/prefix).
    #[clap(long, env)]
    storage_location: String,
    /// Comma separated reward program ids that are never indexed.
    #[clap(long, env, value_delimiter = ',')]
    archived_reward_programs: Vec<String>,
    /// Interval in seconds between indexing passes.
    #[clap(long, default_value = "60")]
    interval: u64,
    /// Number of consecutive failed passes before quitting.
    #[clap(long, default_value = "10")]
    retries: u32,
    /// Timeout in seconds of a single subgraph request.
    #[clap(long, default_value = "30")]
    request_timeout: u64,
    /// Run a single indexing pass and exit.
    #[clap(long, default_value_t = false)]
    once: bool,
    /// Whether to log in JSON format.
    #[clap(long, env, default_value_t = false)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = MainArgs::parse();

    if args.log_json {
        tracing_subscriber::fmt()
            .with_ansi(false)
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .init();
    }

    let subgraph = SubgraphClient::new(
        args.subgraph_url.clone(),
        Duration::from_secs(args.request_timeout),
    )
    .context("Failed to build subgraph client")?;
    let artifacts = artifact_store_from_uri(&args.storage_location)
        .await
        .with_context(|| format!("Failed to open storage location {}", args.storage_location))?;
    let db = RewardsDb::new(&args.db).await.context("Failed to connect to the database")?;

    let config = IndexerServiceConfig {
        archived_reward_programs: args
            .archived_reward_programs
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect(),
        retries: args.retries,
    };

    tracing::info!(
        "Indexing roots from {} with results at {}",
        args.subgraph_url,
        args.storage_location
    );
    let service = IndexerService::new(Arc::new(subgraph), artifacts, Arc::new(db), config);

    if let Err(err) = service.run(Duration::from_secs(args.interval), args.once).await {
        bail!("FATAL: Error running the indexer: {err}");
    }

    Ok(())
}
