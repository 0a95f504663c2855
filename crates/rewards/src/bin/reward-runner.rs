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

use std::path::PathBuf;

use anyhow::{Context, Result};
use cardpay_rewards::{RewardRunner, WeightedUsageConfig};
use clap::Parser;

/// Arguments of the reward runner.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct MainArgs {
    /// Path of the reward program TOML config.
    #[clap(long, env)]
    config: PathBuf,
    /// Payment cycle to compute, the exclusive end block of its window.
    #[clap(long)]
    payment_cycle: u64,
    /// Directory the payments artifact is written below.
    #[clap(long, env)]
    output_location: PathBuf,
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

    let config = WeightedUsageConfig::load(&args.config)
        .await
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    let runner = RewardRunner::from_config(config);

    let output = runner
        .run(args.payment_cycle)
        .await
        .with_context(|| format!("Failed to compute rewards for cycle {}", args.payment_cycle))?;
    runner.write(&output, &args.output_location).await.context("Failed to write payments")?;

    Ok(())
}
