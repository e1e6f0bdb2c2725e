//! Source retrieval from GitHub repositories.

use crate::config::RepoRef;
use crate::{VerificationError, VerificationResult};
use async_trait::async_trait;
use indexmap::IndexMap;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info};

const GITHUB_API: &str = "https://api.github.com";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw+json";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";

/// Where source files are read from.
#[async_trait]
pub trait SourceHost: Send + Sync {
    /// Fetches `path` from `repo`; `Ok(None)` when the file does not exist.
    ///
    /// With `recursive` set, a missing file is searched for by name across the repository.
    async fn fetch(
        &self,
        repo: &RepoRef,
        path: &str,
        recursive: bool,
    ) -> VerificationResult<Option<String>>;
}

/// Extracts `owner/repo` from a repository URL, ignoring any `/tree/...` suffix.
pub fn parse_repo_link(url: &str) -> VerificationResult<String> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| VerificationError::Configuration(format!("invalid repo url {url}: {e}")))?;
    let path = parsed.path().trim_matches('/');
    let path = path.split("/tree").next().unwrap_or(path);
    let mut parts = path.split('/').filter(|p| !p.is_empty());
    match (parts.next(), parts.next()) {
        (Some(owner), Some(repo)) => Ok(format!("{owner}/{}", repo.trim_end_matches(".git"))),
        _ => Err(VerificationError::Configuration(format!(
            "repo url {url} does not name owner/repo"
        ))),
    }
}

/// Contents API URL for `path` under `relative_root`, pinned to `commit` when given.
pub fn api_url(repo: &str, relative_root: &str, path: &str, commit: &str) -> String {
    let mut url = format!("{GITHUB_API}/repos/{repo}/contents");
    for segment in [relative_root, path] {
        let segment = segment.trim_matches('/');
        if !segment.is_empty() {
            url.push('/');
            url.push_str(segment);
        }
    }
    if !commit.is_empty() {
        url.push_str("?ref=");
        url.push_str(commit);
    }
    url
}

/// The dependency whose prefix matches `path`; the longest prefix wins.
pub fn resolve_dep<'a>(
    path: &str,
    dependencies: &'a IndexMap<String, RepoRef>,
) -> Option<(&'a str, &'a RepoRef)> {
    dependencies
        .iter()
        .filter(|(name, _)| path.starts_with(name.as_str()))
        .max_by_key(|(name, _)| name.len())
        .map(|(name, repo)| (name.as_str(), repo))
}

/// Strips the `dep_name/` prefix from `path`.
pub fn path_without_dependency<'a>(path: &'a str, dep_name: &str) -> &'a str {
    path.strip_prefix(dep_name)
        .map(|rest| rest.trim_start_matches('/'))
        .unwrap_or(path)
}

#[derive(Debug, Deserialize)]
struct DirEntry {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

/// GitHub contents API client.
#[derive(Debug, Clone)]
pub struct GithubClient {
    client: reqwest::Client,
}

impl GithubClient {
    pub fn new(token: Option<&str>) -> VerificationResult<Self> {
        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("token {token}")).map_err(|_| {
                VerificationError::Configuration("GitHub token is not a valid header".into())
            })?;
            headers.insert(AUTHORIZATION, value);
        }
        let client = reqwest::Client::builder()
            .user_agent(concat!("veriscan/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;
        Ok(Self { client })
    }

    async fn get(&self, url: &str, accept: &'static str) -> VerificationResult<Option<reqwest::Response>> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, accept)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(response.error_for_status()?))
    }

    /// Raw file at `path`, relative to the repository's `relative_root`.
    pub async fn fetch_file(&self, repo: &RepoRef, path: &str) -> VerificationResult<Option<String>> {
        self.fetch_at(repo, &repo.relative_root, path).await
    }

    async fn fetch_at(
        &self,
        repo: &RepoRef,
        root: &str,
        path: &str,
    ) -> VerificationResult<Option<String>> {
        let slug = parse_repo_link(&repo.url)?;
        let url = api_url(&slug, root, path, &repo.commit);
        match self.get(&url, RAW_MEDIA_TYPE).await? {
            Some(response) => Ok(Some(response.text().await?)),
            None => Ok(None),
        }
    }

    async fn list_dir(&self, repo: &RepoRef, dir: &str) -> VerificationResult<Vec<DirEntry>> {
        let slug = parse_repo_link(&repo.url)?;
        let url = api_url(&slug, "", dir, &repo.commit);
        match self.get(&url, JSON_MEDIA_TYPE).await? {
            Some(response) => {
                let body: serde_json::Value = response.json().await?;
                // a file path yields an object rather than a listing
                Ok(serde_json::from_value(body).unwrap_or_default())
            }
            None => Ok(Vec::new()),
        }
    }

    /// Searches the repository for `path`, for sources whose import paths were flattened.
    pub async fn fetch_file_recursive(
        &self,
        repo: &RepoRef,
        path: &str,
    ) -> VerificationResult<Option<String>> {
        let tree = RepoView { client: self, repo };
        search_tree(&tree, &repo.relative_root, path).await
    }
}

/// Directory access used by the recursive search. Paths are relative to the repository root.
#[async_trait]
trait RepoTree: Send + Sync {
    async fn file_at(&self, dir: &str, path: &str) -> VerificationResult<Option<String>>;
    async fn entries(&self, dir: &str) -> VerificationResult<Vec<DirEntry>>;
}

struct RepoView<'a> {
    client: &'a GithubClient,
    repo: &'a RepoRef,
}

#[async_trait]
impl RepoTree for RepoView<'_> {
    async fn file_at(&self, dir: &str, path: &str) -> VerificationResult<Option<String>> {
        self.client.fetch_at(self.repo, dir, path).await
    }

    async fn entries(&self, dir: &str) -> VerificationResult<Vec<DirEntry>> {
        self.client.list_dir(self.repo, dir).await
    }
}

/// Breadth-first search for `path` from `relative_root`, then from the repository root.
///
/// Every directory is tried with the full relative `path` first. A file that only shares the
/// last segment is used when no directory holds the full path.
async fn search_tree(
    tree: &dyn RepoTree,
    relative_root: &str,
    path: &str,
) -> VerificationResult<Option<String>> {
    let path = path.trim_matches('/');
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let mut checked: HashSet<String> = HashSet::new();
    let mut by_name: Option<String> = None;

    let root = relative_root.trim_matches('/').to_string();
    let mut starts = vec![root.clone()];
    if !root.is_empty() {
        starts.push(String::new());
    }

    for start in starts {
        let mut queue = VecDeque::from([start]);
        while let Some(dir) = queue.pop_front() {
            if !checked.insert(dir.clone()) {
                continue;
            }
            debug!(dir = %dir, path, "searching directory");
            if let Some(content) = tree.file_at(&dir, path).await? {
                if dir != root {
                    info!(requested = path, dir = %dir, "resolved flattened source path");
                }
                return Ok(Some(content));
            }
            let entries = tree.entries(&dir).await?;
            if by_name.is_none() {
                by_name = entries
                    .iter()
                    .find(|e| e.kind == "file" && e.name == file_name)
                    .map(|e| e.path.clone());
            }
            queue.extend(
                entries
                    .into_iter()
                    .filter(|e| e.kind == "dir" && !checked.contains(&e.path))
                    .map(|e| e.path),
            );
        }
    }

    match by_name {
        Some(found) => {
            info!(requested = path, found = %found, "resolved flattened source path by file name");
            tree.file_at("", &found).await
        }
        None => Ok(None),
    }
}

#[async_trait]
impl SourceHost for GithubClient {
    async fn fetch(
        &self,
        repo: &RepoRef,
        path: &str,
        recursive: bool,
    ) -> VerificationResult<Option<String>> {
        if recursive {
            self.fetch_file_recursive(repo, path).await
        } else {
            self.fetch_file(repo, path).await
        }
    }
}
