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

//! S3-based artifact storage.

use std::env;

use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_sdk_s3::{
    config::{ProvideCredentials, SharedCredentialsProvider},
    Error as S3Error,
};
use bytes::Bytes;

use super::{ArtifactError, ArtifactStore};

#[derive(thiserror::Error, Debug)]
pub enum S3ArtifactStoreError {
    #[error("AWS S3 error: {0:?}")]
    S3Error(#[from] Box<S3Error>),

    #[error("Missing config parameter: {0:?}")]
    Config(String),

    #[error("AWS ByteStream error: {0:?}")]
    ByteStreamError(String),
}

/// Artifact store reading objects below a prefix of an S3 bucket.
#[derive(Clone, Debug)]
pub struct S3ArtifactStore {
    bucket: String,
    prefix: String,
    client: aws_sdk_s3::Client,
}

const ENV_VAR_ROLE_ARN: &str = "AWS_ROLE_ARN";

impl S3ArtifactStore {
    /// Connect using the standard AWS provider chain, assuming `AWS_ROLE_ARN` if it is set.
    pub async fn from_env(bucket: String, prefix: String) -> Result<Self, S3ArtifactStoreError> {
        let mut config = aws_config::from_env().retry_config(RetryConfig::standard()).load().await;

        let provider = config.credentials_provider().ok_or_else(|| {
            S3ArtifactStoreError::Config("no AWS credentials provider".to_string())
        })?;
        provider.provide_credentials().await.map_err(|e| {
            S3ArtifactStoreError::Config(format!("failed to load AWS credentials: {e}"))
        })?;

        if let Ok(role_arn) = env::var(ENV_VAR_ROLE_ARN) {
            let role_provider = aws_config::sts::AssumeRoleProvider::builder(role_arn)
                .configure(&config)
                .build()
                .await;
            config = config
                .into_builder()
                .credentials_provider(SharedCredentialsProvider::new(role_provider))
                .build();
        }

        let client = aws_sdk_s3::Client::new(&config);

        Ok(Self { bucket, prefix, client })
    }

    fn object_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.prefix, key)
        }
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    fn location(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, self.object_key(key))
    }

    async fn exists(&self, key: &str) -> Result<bool, ArtifactError> {
        let result =
            self.client.head_object().bucket(&self.bucket).key(self.object_key(key)).send().await;

        match result {
            Ok(_) => Ok(true),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(S3ArtifactStoreError::from(Box::new(S3Error::from(service_err))).into())
                }
            }
        }
    }

    async fn read(&self, key: &str) -> Result<Bytes, ArtifactError> {
        let object_key = self.object_key(key);
        tracing::debug!("Reading artifact from S3 bucket: {} key: {}", self.bucket, object_key);

        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .send()
            .await
            .map_err(|e| {
                S3ArtifactStoreError::from(Box::new(S3Error::from(e.into_service_error())))
            })?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| S3ArtifactStoreError::ByteStreamError(e.to_string()))?
            .into_bytes();
        Ok(data)
    }
}
