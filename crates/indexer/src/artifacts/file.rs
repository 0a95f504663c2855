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

//! File-based artifact storage.

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;

use super::{ArtifactError, ArtifactStore};

/// Artifact store rooted at a local directory.
#[derive(Clone, Debug)]
pub struct FileArtifactStore {
    base_path: PathBuf,
}

impl FileArtifactStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { base_path: path.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.base_path.join(key)
    }
}

#[async_trait]
impl ArtifactStore for FileArtifactStore {
    fn location(&self, key: &str) -> String {
        self.path(key).display().to_string()
    }

    async fn exists(&self, key: &str) -> Result<bool, ArtifactError> {
        Ok(tokio::fs::try_exists(self.path(key)).await?)
    }

    async fn read(&self, key: &str) -> Result<Bytes, ArtifactError> {
        let path = self.path(key);
        let data = tokio::fs::read(&path).await?;
        tracing::debug!("Read {} bytes from {}", data.len(), path.display());
        Ok(Bytes::from(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        artifacts::{artifact_key, PaymentRecord},
        test_utils::write_payment_artifact,
    };

    #[tokio::test]
    async fn reads_written_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileArtifactStore::new(dir.path());
        let key = artifact_key("0xprogram", 2048);
        assert!(!store.exists(&key).await.unwrap());

        let records = vec![PaymentRecord {
            root: "0xroot".to_string(),
            payment_cycle: 2048,
            payee: "0xpayee".to_string(),
            proof: vec![],
            reward_program_id: "0xprogram".to_string(),
            leaf: vec![0; 64],
            valid_from: 2048,
            valid_to: 4096,
        }];
        write_payment_artifact(dir.path(), "0xprogram", 2048, &records).unwrap();

        assert!(store.exists(&key).await.unwrap());
        assert_eq!(store.read_payments(&key).await.unwrap(), records);
        assert!(store.location(&key).ends_with("paymentCycle=2048/results.parquet"));
    }
}
