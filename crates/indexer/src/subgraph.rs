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

//! Client for the reward program subgraph.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use serde_json::{json, Value};
use thiserror::Error;
use url::Url;

/// Maximum number of entities requested per page.
pub const PAGE_SIZE: u64 = 1000;

const REWARD_PROGRAMS_QUERY: &str = r#"
    query RewardPrograms($first: Int!, $skip: Int!) {
        rewardPrograms(first: $first, skip: $skip, orderBy: id, orderDirection: desc) {
            id
        }
    }
"#;

const ROOT_SUBMISSIONS_QUERY: &str = r#"
    query RootSubmissions($rewardProgram: String!, $blockNumberGt: BigInt!, $first: Int!, $skip: Int!) {
        merkleRootSubmissions(
            where: { rewardProgram: $rewardProgram, blockNumber_gt: $blockNumberGt }
            orderBy: blockNumber
            orderDirection: asc
            first: $first
            skip: $skip
        ) {
            id
            blockNumber
            paymentCycle
            rewardProgram {
                id
            }
            timestamp
        }
    }
"#;

#[derive(Error, Debug)]
pub enum SubgraphError {
    /// The subgraph could not be reached.
    #[error("Connection to subgraph failed: {0}")]
    Connection(#[source] reqwest::Error),

    #[error("Subgraph request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("Subgraph responded with status {0}")]
    Status(u16),

    #[error("Subgraph query failed: {0}")]
    Query(String),

    #[error("Malformed subgraph response: {0}")]
    Decode(#[source] reqwest::Error),
}

impl SubgraphError {
    pub(crate) fn from_request(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            SubgraphError::Connection(err)
        } else {
            SubgraphError::Request(err)
        }
    }

    /// Whether retrying later could succeed without any change on our side.
    pub fn is_transient(&self) -> bool {
        matches!(self, SubgraphError::Connection(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RewardProgram {
    pub id: String,
}

/// A merkle root commitment published on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleRootSubmission {
    /// The root hash.
    pub id: String,
    #[serde(deserialize_with = "u64_from_str_or_num")]
    pub block_number: u64,
    #[serde(deserialize_with = "u64_from_str_or_num")]
    pub payment_cycle: u64,
    pub reward_program: RewardProgram,
    #[serde(deserialize_with = "u64_from_str_or_num")]
    pub timestamp: u64,
}

/// Subgraph BigInt fields arrive as strings, plain ints are numbers.
fn u64_from_str_or_num<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StrOrNum {
        Str(String),
        Num(u64),
    }

    match StrOrNum::deserialize(deserializer)? {
        StrOrNum::Str(s) => s.parse().map_err(serde::de::Error::custom),
        StrOrNum::Num(n) => Ok(n),
    }
}

#[async_trait]
pub trait RewardSubgraph: Send + Sync {
    /// All reward programs, ordered by id descending.
    async fn list_reward_programs(&self) -> Result<Vec<RewardProgram>, SubgraphError>;

    /// Root submissions of a program above `block_number_gt`, ordered by block number ascending.
    async fn list_root_submissions(
        &self,
        reward_program_id: &str,
        block_number_gt: u64,
    ) -> Result<Vec<MerkleRootSubmission>, SubgraphError>;
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RewardProgramsData {
    reward_programs: Vec<RewardProgram>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RootSubmissionsData {
    merkle_root_submissions: Vec<MerkleRootSubmission>,
}

#[derive(Clone, Debug)]
/// HTTP client for a graph-node GraphQL endpoint
pub struct SubgraphClient {
    client: Client,
    url: Url,
}

impl SubgraphClient {
    pub fn new(url: Url, timeout: Duration) -> Result<Self, SubgraphError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("cardpay-reward-indexer/1.0")
            .build()
            .map_err(SubgraphError::Request)?;

        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn query<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
    ) -> Result<T, SubgraphError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(SubgraphError::from_request)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SubgraphError::Status(status.as_u16()));
        }

        let body: GraphQlResponse<T> = response.json().await.map_err(SubgraphError::Decode)?;
        if !body.errors.is_empty() {
            let messages: Vec<String> = body.errors.into_iter().map(|e| e.message).collect();
            return Err(SubgraphError::Query(messages.join("; ")));
        }

        body.data.ok_or_else(|| SubgraphError::Query("response contained no data".to_string()))
    }

    /// Run a paged query until a short page is returned.
    async fn query_all<T, D, F>(
        &self,
        query: &str,
        variables: Value,
        extract: F,
    ) -> Result<Vec<T>, SubgraphError>
    where
        D: DeserializeOwned,
        F: Fn(D) -> Vec<T>,
    {
        let mut results = Vec::new();
        let mut skip = 0u64;
        loop {
            let mut page_vars = variables.clone();
            page_vars["first"] = json!(PAGE_SIZE);
            page_vars["skip"] = json!(skip);

            let page = extract(self.query::<D>(query, page_vars).await?);
            let len = page.len() as u64;
            results.extend(page);

            if len < PAGE_SIZE {
                return Ok(results);
            }
            skip += PAGE_SIZE;
        }
    }
}

#[async_trait]
impl RewardSubgraph for SubgraphClient {
    async fn list_reward_programs(&self) -> Result<Vec<RewardProgram>, SubgraphError> {
        self.query_all(REWARD_PROGRAMS_QUERY, json!({}), |data: RewardProgramsData| {
            data.reward_programs
        })
        .await
    }

    async fn list_root_submissions(
        &self,
        reward_program_id: &str,
        block_number_gt: u64,
    ) -> Result<Vec<MerkleRootSubmission>, SubgraphError> {
        let variables = json!({
            "rewardProgram": reward_program_id,
            "blockNumberGt": block_number_gt.to_string(),
        });
        self.query_all(ROOT_SUBMISSIONS_QUERY, variables, |data: RootSubmissionsData| {
            data.merkle_root_submissions
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn client(server: &MockServer) -> SubgraphClient {
        let url = server.url("/subgraphs/name/cardpay").parse().unwrap();
        SubgraphClient::new(url, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn lists_reward_programs() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/subgraphs/name/cardpay")
                .body_contains("rewardPrograms")
                .json_body_partial(r#"{"variables": {"first": 1000, "skip": 0}}"#);
            then.status(200).json_body(json!({
                "data": { "rewardPrograms": [{ "id": "0xb" }, { "id": "0xa" }] }
            }));
        });

        let programs = client(&server).list_reward_programs().await.unwrap();
        mock.assert();
        assert_eq!(
            programs,
            vec![RewardProgram { id: "0xb".to_string() }, RewardProgram { id: "0xa".to_string() }]
        );
    }

    #[tokio::test]
    async fn root_submissions_are_parameterized() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/subgraphs/name/cardpay").json_body_partial(
                r#"{"variables": {"rewardProgram": "0xprogram\" } }", "blockNumberGt": "41"}}"#,
            );
            then.status(200).json_body(json!({
                "data": { "merkleRootSubmissions": [{
                    "id": "0xroot",
                    "blockNumber": "42",
                    "paymentCycle": "1024",
                    "rewardProgram": { "id": "0xprogram\" } }" },
                    "timestamp": 1650000000
                }] }
            }));
        });

        let roots = client(&server).list_root_submissions("0xprogram\" } }", 41).await.unwrap();
        mock.assert();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].id, "0xroot");
        assert_eq!(roots[0].block_number, 42);
        assert_eq!(roots[0].payment_cycle, 1024);
        assert_eq!(roots[0].timestamp, 1_650_000_000);
    }

    #[tokio::test]
    async fn follows_pages() {
        let server = MockServer::start();
        let programs: Vec<Value> =
            (0..PAGE_SIZE).map(|i| json!({ "id": format!("0x{i:x}") })).collect();
        let first = server.mock(|when, then| {
            when.method(POST).json_body_partial(r#"{"variables": {"skip": 0}}"#);
            then.status(200).json_body(json!({ "data": { "rewardPrograms": programs } }));
        });
        let second = server.mock(|when, then| {
            when.method(POST).json_body_partial(r#"{"variables": {"skip": 1000}}"#);
            then.status(200)
                .json_body(json!({ "data": { "rewardPrograms": [{ "id": "0xlast" }] } }));
        });

        let all = client(&server).list_reward_programs().await.unwrap();
        first.assert();
        second.assert();
        assert_eq!(all.len() as u64, PAGE_SIZE + 1);
        assert_eq!(all.last().unwrap().id, "0xlast");
    }

    #[tokio::test]
    async fn non_success_status_is_query_failure() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST);
            then.status(502);
        });

        let err = client(&server).list_reward_programs().await.unwrap_err();
        assert!(matches!(err, SubgraphError::Status(502)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn graphql_errors_are_surfaced() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST);
            then.status(200).json_body(json!({ "errors": [{ "message": "indexing_error" }] }));
        });

        let err = client(&server).list_root_submissions("0xprogram", 0).await.unwrap_err();
        match err {
            SubgraphError::Query(msg) => assert_eq!(msg, "indexing_error"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_decode_failure() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST);
            then.status(200).body("not json");
        });

        let err = client(&server).list_reward_programs().await.unwrap_err();
        assert!(matches!(err, SubgraphError::Decode(_)));
    }

    #[tokio::test]
    async fn unreachable_subgraph_is_transient() {
        // Nothing listens on port 1.
        let url = "http://127.0.0.1:1/".parse().unwrap();
        let client = SubgraphClient::new(url, Duration::from_secs(2)).unwrap();

        let err = client.list_reward_programs().await.unwrap_err();
        assert!(err.is_transient(), "unexpected error: {err:?}");
    }
}
