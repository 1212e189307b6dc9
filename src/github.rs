use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use reqwest::Client;
use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Mutex;

const GITHUB_GRAPHQL_URL: &str = "https://api.github.com/graphql";
const PAGE_SIZE: u32 = 100;

/// Which repository relationships to count.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Affiliation {
    Owner,
    Collaborator,
    OrganizationMember,
}

/// What `repos_and_stars` should aggregate from a repository page.
#[derive(Debug, Clone, Copy)]
pub enum CountMode {
    Repos,
    Stars,
}

/// Per-collector GraphQL query tally, kept for diagnostics only.
/// It rides along in transport error messages and a debug log at
/// the end of the run; nothing throttles or retries based on it.
#[derive(Debug, Default, Clone)]
pub struct QueryCounters(BTreeMap<&'static str, u32>);

impl QueryCounters {
    fn bump(&mut self, name: &'static str) {
        *self.0.entry(name).or_default() += 1;
    }

    pub fn total(&self) -> u32 {
        self.0.values().sum()
    }
}

#[cfg(test)]
impl QueryCounters {
    fn get(&self, name: &str) -> u32 {
        self.0.get(name).copied().unwrap_or(0)
    }
}

#[derive(Debug)]
pub struct UserIdentity {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

pub struct GithubClient {
    endpoint: String,
    token: String,
    http: Client,
    counters: Mutex<QueryCounters>,
}

impl GithubClient {
    /// Create a GitHub GraphQL client using the ACCESS_TOKEN env variable.
    pub fn new() -> Result<Self> {
        let token =
            std::env::var("ACCESS_TOKEN").context("ACCESS_TOKEN environment variable not set")?;
        Ok(Self::with_endpoint(token, GITHUB_GRAPHQL_URL.to_string()))
    }

    /// Client against an explicit endpoint (mock servers in tests).
    pub fn with_endpoint(token: String, endpoint: String) -> Self {
        Self {
            endpoint,
            token,
            http: Client::new(),
            counters: Mutex::new(QueryCounters::default()),
        }
    }

    /// Snapshot of the per-collector query tally.
    pub fn counters(&self) -> QueryCounters {
        self.counters
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// Low-level GraphQL request: one POST, no retries. A non-200 status is a
    /// terminal error carrying the operation name, status, body, and the query
    /// tally so far; callers decide whether to recover.
    async fn graphql(&self, name: &'static str, query: &str, variables: Value) -> Result<Value> {
        if let Ok(mut counters) = self.counters.lock() {
            counters.bump(name);
        }

        let resp = self
            .http
            .post(&self.endpoint)
            .header(AUTHORIZATION, format!("token {}", self.token))
            .header("User-Agent", "github-stats")
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .with_context(|| format!("network error sending {name} request"))?;

        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "{name} failed with HTTP {status}: {body} (queries so far: {:?})",
                self.counters()
            );
        }

        resp.json()
            .await
            .with_context(|| format!("failed to parse JSON from {name} response"))
    }

    /// Resolve a username to its node id and account creation date.
    pub async fn user_identity(&self, username: &str) -> Result<UserIdentity> {
        let query = r#"
        query($login: String!) {
            user(login: $login) {
                id
                createdAt
            }
        }"#;

        #[derive(Deserialize)]
        struct Response {
            data: Data,
        }
        #[derive(Deserialize)]
        struct Data {
            user: User,
        }
        #[derive(Deserialize)]
        struct User {
            id: String,
            #[serde(rename = "createdAt")]
            created_at: DateTime<Utc>,
        }

        let json = self
            .graphql("user_identity", query, json!({ "login": username }))
            .await?;
        let parsed: Response = serde_json::from_value(json)
            .context("failed to deserialize user_identity response")?;

        Ok(UserIdentity {
            id: parsed.data.user.id,
            created_at: parsed.data.user.created_at,
        })
    }

    /// Follower count.
    pub async fn follower_count(&self, username: &str) -> Result<u64> {
        let query = r#"
        query($login: String!) {
            user(login: $login) {
                followers {
                    totalCount
                }
            }
        }"#;

        #[derive(Deserialize)]
        struct Response {
            data: Data,
        }
        #[derive(Deserialize)]
        struct Data {
            user: User,
        }
        #[derive(Deserialize)]
        struct User {
            followers: TotalCount,
        }

        let json = self
            .graphql("follower_count", query, json!({ "login": username }))
            .await?;
        let parsed: Response = serde_json::from_value(json)
            .context("failed to deserialize follower_count response")?;

        Ok(parsed.data.user.followers.total_count)
    }

    /// Total commit contributions in [from, to]. Contribution-calendar queries
    /// are flakier than the rest of the API, so any failure here is downgraded
    /// to a warning and a zero value instead of aborting the run.
    pub async fn commit_count(
        &self,
        username: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> u64 {
        match self.try_commit_count(username, from, to).await {
            Ok(count) => count,
            Err(err) => {
                log::warn!("commit count query failed, substituting 0: {err:#}");
                0
            }
        }
    }

    async fn try_commit_count(
        &self,
        username: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64> {
        let query = r#"
        query($start_date: DateTime!, $end_date: DateTime!, $login: String!) {
            user(login: $login) {
                contributionsCollection(from: $start_date, to: $end_date) {
                    contributionCalendar {
                        totalContributions
                    }
                }
            }
        }"#;

        #[derive(Deserialize)]
        struct Response {
            data: Data,
        }
        #[derive(Deserialize)]
        struct Data {
            user: User,
        }
        #[derive(Deserialize)]
        struct User {
            #[serde(rename = "contributionsCollection")]
            contributions_collection: ContributionsCollection,
        }
        #[derive(Deserialize)]
        struct ContributionsCollection {
            #[serde(rename = "contributionCalendar")]
            contribution_calendar: ContributionCalendar,
        }
        #[derive(Deserialize)]
        struct ContributionCalendar {
            #[serde(rename = "totalContributions")]
            total_contributions: u64,
        }

        let variables = json!({
            "start_date": from.to_rfc3339(),
            "end_date": to.to_rfc3339(),
            "login": username,
        });
        let json = self.graphql("commit_count", query, variables).await?;
        let parsed: Response =
            serde_json::from_value(json).context("failed to deserialize commit_count response")?;

        Ok(parsed
            .data
            .user
            .contributions_collection
            .contribution_calendar
            .total_contributions)
    }

    /// One page of the user's repositories, aggregated per `mode`: the
    /// server-reported repository total, or the client-side sum of each
    /// edge's stargazer count (the API has no pre-aggregated star total).
    ///
    /// The cursor and pageInfo plumbing is threaded through, but callers only
    /// ever fetch the first page; accounts with more than `PAGE_SIZE` owned
    /// repositories undercount stars.
    pub async fn repos_and_stars(
        &self,
        username: &str,
        mode: CountMode,
        affiliations: &[Affiliation],
        cursor: Option<&str>,
    ) -> Result<u64> {
        let query = r#"
        query($owner_affiliation: [RepositoryAffiliation], $login: String!, $cursor: String) {
            user(login: $login) {
                repositories(first: 100, after: $cursor, ownerAffiliations: $owner_affiliation) {
                    totalCount
                    edges {
                        node {
                            ... on Repository {
                                stargazers {
                                    totalCount
                                }
                            }
                        }
                    }
                    pageInfo {
                        endCursor
                        hasNextPage
                    }
                }
            }
        }"#;

        #[derive(Deserialize)]
        struct Response {
            data: Data,
        }
        #[derive(Deserialize)]
        struct Data {
            user: User,
        }
        #[derive(Deserialize)]
        struct User {
            repositories: RepositoryPage,
        }
        #[derive(Deserialize)]
        struct RepositoryPage {
            #[serde(rename = "totalCount")]
            total_count: u64,
            edges: Vec<Edge>,
            #[serde(rename = "pageInfo")]
            page_info: PageInfo,
        }
        #[derive(Deserialize)]
        struct Edge {
            node: Node,
        }
        #[derive(Deserialize)]
        struct Node {
            stargazers: TotalCount,
        }
        #[derive(Deserialize)]
        struct PageInfo {
            #[serde(rename = "endCursor")]
            end_cursor: Option<String>,
            #[serde(rename = "hasNextPage")]
            has_next_page: bool,
        }

        let variables = json!({
            "owner_affiliation": affiliations,
            "login": username,
            "cursor": cursor,
        });
        let json = self.graphql("repos_and_stars", query, variables).await?;
        let parsed: Response = serde_json::from_value(json)
            .context("failed to deserialize repos_and_stars response")?;

        let page = parsed.data.user.repositories;
        if page.page_info.has_next_page {
            log::debug!(
                "repository listing has more pages after cursor {:?}; only the first {PAGE_SIZE} are counted",
                page.page_info.end_cursor
            );
        }

        Ok(match mode {
            CountMode::Repos => page.total_count,
            CountMode::Stars => page
                .edges
                .iter()
                .map(|e| e.node.stargazers.total_count)
                .sum(),
        })
    }
}

#[derive(Deserialize)]
struct TotalCount {
    #[serde(rename = "totalCount")]
    total_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> GithubClient {
        GithubClient::with_endpoint("test-token".to_string(), server.uri())
    }

    #[tokio::test]
    async fn follower_count_extracts_total() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "token test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "user": { "followers": { "totalCount": 42 } } }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let count = client.follower_count("octocat").await.unwrap();
        assert_eq!(count, 42);
        assert_eq!(client.counters().get("follower_count"), 1);
    }

    #[tokio::test]
    async fn non_200_is_terminal_and_names_the_operation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.follower_count("octocat").await.unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("follower_count"), "got: {msg}");
        assert!(msg.contains("403"), "got: {msg}");
        assert!(msg.contains("rate limited"), "got: {msg}");
    }

    #[tokio::test]
    async fn missing_field_is_a_hard_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "user": {} }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(client.follower_count("octocat").await.is_err());
    }

    #[tokio::test]
    async fn star_mode_sums_edges_client_side() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "user": { "repositories": {
                    "totalCount": 3,
                    "edges": [
                        { "node": { "stargazers": { "totalCount": 3 } } },
                        { "node": { "stargazers": { "totalCount": 0 } } },
                        { "node": { "stargazers": { "totalCount": 5 } } }
                    ],
                    "pageInfo": { "endCursor": null, "hasNextPage": false }
                } } }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let stars = client
            .repos_and_stars("octocat", CountMode::Stars, &[Affiliation::Owner], None)
            .await
            .unwrap();
        assert_eq!(stars, 8);
    }

    #[tokio::test]
    async fn repo_mode_uses_server_total() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "variables": {
                    "owner_affiliation": ["OWNER", "COLLABORATOR", "ORGANIZATION_MEMBER"]
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "user": { "repositories": {
                    "totalCount": 127,
                    "edges": [],
                    "pageInfo": { "endCursor": null, "hasNextPage": false }
                } } }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let repos = client
            .repos_and_stars(
                "octocat",
                CountMode::Repos,
                &[
                    Affiliation::Owner,
                    Affiliation::Collaborator,
                    Affiliation::OrganizationMember,
                ],
                None,
            )
            .await
            .unwrap();
        assert_eq!(repos, 127);
    }

    #[tokio::test]
    async fn commit_count_falls_back_to_zero_on_api_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let count = client.commit_count("octocat", Utc::now(), Utc::now()).await;
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn counters_accumulate_per_collector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "user": { "followers": { "totalCount": 1 } } }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.follower_count("octocat").await.unwrap();
        client.follower_count("octocat").await.unwrap();

        let counters = client.counters();
        assert_eq!(counters.get("follower_count"), 2);
        assert_eq!(counters.total(), 2);
    }
}
