//! Pure web-service client.
//!
//! Blocking reqwest client (no Tokio runtime required). Implements the
//! registry boundary of `purelink-recon` on top of the `/ws/api` endpoints:
//! project search, research-output search, project fetch and project update.

use std::time::Duration;

use purelink_recon::registry::{
    IdentifierType, ProjectIdentifier, ProjectRecord, PublicationRecord, RecordId, Registry,
    RegistryError,
};
use serde_json::{json, Value};
use tracing::debug;

use crate::auth::PureCredentials;

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Upper bound on pages fetched for one search.
const MAX_SEARCH_PAGES: u32 = 200;
const USER_AGENT: &str = concat!("purelink/", env!("CARGO_PKG_VERSION"));
const DOI_VERSION: &str = "DoiElectronicVersion";

/// Pure API client (blocking).
#[derive(Clone)]
pub struct PureClient {
    http: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    page_size: u32,
}

impl std::fmt::Debug for PureClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PureClient")
            .field("base_url", &self.base_url)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl PureClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, RegistryError> {
        Self::with_options(
            base_url,
            api_key,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            DEFAULT_PAGE_SIZE,
        )
    }

    pub fn with_options(
        base_url: &str,
        api_key: &str,
        timeout: Duration,
        page_size: u32,
    ) -> Result<Self, RegistryError> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| RegistryError::Network(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: sanitize_api_key(api_key),
            page_size: page_size.max(1),
        })
    }

    pub fn from_credentials(creds: &PureCredentials) -> Result<Self, RegistryError> {
        Self::new(&creds.base_url, &creds.api_key)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch one project as raw JSON. `None` on 404.
    pub fn get_project(&self, uuid: &str) -> Result<Option<Value>, RegistryError> {
        let url = format!("{}/ws/api/projects/{}", self.base_url, uuid);
        match self.send(self.http.get(&url)) {
            Ok(body) => Ok(Some(body)),
            Err(RegistryError::Http { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Free-text project search, all pages.
    pub fn search_projects(&self, query: &str) -> Result<Vec<ProjectRecord>, RegistryError> {
        let items = self.search("projects", query)?;
        items.iter().map(parse_project).collect()
    }

    /// Free-text research-output search, all pages.
    pub fn search_research_outputs(&self, query: &str) -> Result<Vec<PublicationRecord>, RegistryError> {
        let items = self.search("research-outputs", query)?;
        items.iter().map(parse_research_output).collect()
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn search(&self, family: &str, query: &str) -> Result<Vec<Value>, RegistryError> {
        let url = format!("{}/ws/api/{}/search", self.base_url, family);
        let mut items = Vec::new();

        let mut exhausted = false;

        for page in 0..MAX_SEARCH_PAGES {
            let offset = page * self.page_size;
            let body = json!({
                "searchString": query,
                "size": self.page_size,
                "offset": offset,
            });
            let resp = self.send(self.http.post(&url).json(&body))?;

            let page_items = resp["items"].as_array().cloned().unwrap_or_default();
            let received = page_items.len();
            items.extend(page_items);

            let total = resp["count"].as_u64();
            debug!(family, query, offset, received, ?total, "search page");

            exhausted = received < self.page_size as usize
                || total.is_some_and(|t| items.len() as u64 >= t);
            if exhausted {
                break;
            }
        }

        // A truncated hit list could hide a duplicate record.
        if !exhausted {
            return Err(RegistryError::Parse(format!(
                "search for '{query}' in {family} exceeded {MAX_SEARCH_PAGES} pages of {}",
                self.page_size
            )));
        }
        Ok(items)
    }

    fn send(&self, req: reqwest::blocking::RequestBuilder) -> Result<Value, RegistryError> {
        let response = req
            .header("api-key", &self.api_key)
            .header("Accept", "application/json")
            .send()
            .map_err(|e| RegistryError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let text = response.text().map_err(|e| RegistryError::Network(e.to_string()))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| RegistryError::Parse(e.to_string()))
    }
}

impl Registry for PureClient {
    fn find_project_by_key(&self, key: &str) -> Result<Option<ProjectRecord>, RegistryError> {
        self.get_project(key)?.as_ref().map(parse_project).transpose()
    }

    fn find_projects(&self, value: &str) -> Result<Vec<ProjectRecord>, RegistryError> {
        self.search_projects(value)
    }

    fn find_publications(&self, doi: &str) -> Result<Vec<PublicationRecord>, RegistryError> {
        self.search_research_outputs(doi)
    }

    fn fetch_relations(&self, project: &RecordId) -> Result<Vec<RecordId>, RegistryError> {
        let body = self.require_project(project)?;
        Ok(related_outputs(&body))
    }

    fn append_relation(&self, project: &RecordId, publication: &RecordId) -> Result<(), RegistryError> {
        let current = self.require_project(project)?;
        let mut related = related_outputs(&current);
        if related.contains(publication) {
            debug!(%project, %publication, "relation already present, no update sent");
            return Ok(());
        }
        related.push(publication.clone());

        let mut body = json!({
            "researchOutputs": related
                .iter()
                .map(|uuid| json!({
                    "researchOutput": { "systemName": "ResearchOutput", "uuid": uuid.as_str() }
                }))
                .collect::<Vec<_>>(),
        });
        // Optimistic locking: Pure rejects the update if the project changed since our read.
        if let Some(version) = current.get("version").filter(|v| !v.is_null()) {
            body["version"] = version.clone();
        }

        let url = format!("{}/ws/api/projects/{}", self.base_url, project);
        self.send(self.http.put(&url).json(&body))?;
        debug!(%project, %publication, relations = related.len(), "project updated");
        Ok(())
    }

    fn probe(&self) -> Result<(), RegistryError> {
        self.allowed_identifier_types().map(|_| ())
    }

    fn allowed_identifier_types(&self) -> Result<Vec<IdentifierType>, RegistryError> {
        let url = format!("{}/ws/api/projects/allowed-classified-identifier-types", self.base_url);
        let body = self.send(self.http.get(&url))?;
        Ok(body["classifications"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        let uri = item["uri"].as_str()?.to_string();
                        let label = item["term"]["en_GB"].as_str().unwrap_or(&uri).to_string();
                        Some(IdentifierType { uri, label })
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

impl PureClient {
    fn require_project(&self, project: &RecordId) -> Result<Value, RegistryError> {
        self.get_project(project.as_str())?.ok_or_else(|| RegistryError::Http {
            status: 404,
            message: format!("project {project} not found"),
        })
    }
}

// ── Free functions ──────────────────────────────────────────────────

/// Header values must be visible ASCII; anything else is dropped.
pub fn sanitize_api_key(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_graphic()).collect()
}

fn classify_status(status: u16, body: &str) -> RegistryError {
    let message = error_message(body);
    match status {
        401 | 403 => RegistryError::Permission { status, message },
        400 | 409 | 422 => RegistryError::Validation { status, message },
        _ => RegistryError::Http { status, message },
    }
}

/// Pure error bodies carry `description` or `title`; fall back to the raw text.
fn error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let from_json = parsed.as_ref().and_then(|v| {
        ["description", "title", "message"]
            .iter()
            .find_map(|k| v[*k].as_str().map(String::from))
    });
    from_json.unwrap_or_else(|| {
        let trimmed = body.trim();
        if trimmed.chars().count() > 200 {
            format!("{}…", trimmed.chars().take(200).collect::<String>())
        } else {
            trimmed.to_string()
        }
    })
}

fn localized_title(v: &Value) -> String {
    v["title"]["en_GB"]
        .as_str()
        .or_else(|| v["title"]["value"].as_str())
        .or_else(|| v["title"].as_str())
        .unwrap_or_default()
        .to_string()
}

fn record_uuid(v: &Value) -> Result<RecordId, RegistryError> {
    v["uuid"]
        .as_str()
        .map(RecordId::from)
        .ok_or_else(|| RegistryError::Parse("missing uuid in registry record".into()))
}

fn parse_project(v: &Value) -> Result<ProjectRecord, RegistryError> {
    let identifiers = v["identifiers"]
        .as_array()
        .map(|ids| {
            ids.iter()
                .filter_map(|id| {
                    Some(ProjectIdentifier {
                        type_uri: id["type"]["uri"].as_str()?.to_string(),
                        value: id["id"].as_str()?.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(ProjectRecord {
        id: record_uuid(v)?,
        title: localized_title(v),
        identifiers,
    })
}

fn parse_research_output(v: &Value) -> Result<PublicationRecord, RegistryError> {
    let dois = v["electronicVersions"]
        .as_array()
        .map(|versions| {
            versions
                .iter()
                .filter(|ev| ev["typeDiscriminator"].as_str() == Some(DOI_VERSION))
                .filter_map(|ev| ev["doi"].as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();

    Ok(PublicationRecord {
        id: record_uuid(v)?,
        title: localized_title(v),
        dois,
    })
}

fn related_outputs(project: &Value) -> Vec<RecordId> {
    project["researchOutputs"]
        .as_array()
        .map(|list| {
            list.iter()
                .filter_map(|ro| ro["researchOutput"]["uuid"].as_str().map(RecordId::from))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    const PROJECT: &str = "0c5cbb52-7d1e-4f63-9a2f-3b0cfa1a8f11";
    const PAPER: &str = "c1a0b9e8-1111-4222-8333-944455566677";
    const OTHER: &str = "c2b1cae9-2222-4333-8444-a55566677788";
    const EXT: &str = "/dk/atira/pure/upm/classifiedidentifier/externalprojectid";

    fn client(server: &MockServer) -> PureClient {
        PureClient::with_options(&server.base_url(), "key-123", Duration::from_secs(5), 2).unwrap()
    }

    fn project_json(related: &[&str]) -> Value {
        json!({
            "uuid": PROJECT,
            "version": "a1b2c3",
            "title": { "en_GB": "Music in motion" },
            "identifiers": [
                { "typeDiscriminator": "ClassifiedId", "id": "101137074", "type": { "uri": EXT } }
            ],
            "researchOutputs": related
                .iter()
                .map(|u| json!({ "researchOutput": { "systemName": "ResearchOutput", "uuid": u } }))
                .collect::<Vec<_>>(),
        })
    }

    #[test]
    fn test_sanitize_api_key() {
        assert_eq!(sanitize_api_key(" abc\u{200b}-12é3\n"), "abc-123");
    }

    #[test]
    fn test_error_message_prefers_description() {
        assert_eq!(error_message(r#"{"code":403,"description":"API key has no write access"}"#), "API key has no write access");
        assert_eq!(error_message("plain failure"), "plain failure");
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(classify_status(401, ""), RegistryError::Permission { status: 401, .. }));
        assert!(matches!(classify_status(409, ""), RegistryError::Validation { status: 409, .. }));
        assert!(matches!(classify_status(500, ""), RegistryError::Http { status: 500, .. }));
    }

    #[test]
    fn test_parse_research_output_keeps_only_doi_versions() {
        let v = json!({
            "uuid": PAPER,
            "title": { "value": "Tuning systems" },
            "electronicVersions": [
                { "typeDiscriminator": "FileElectronicVersion", "file": {} },
                { "typeDiscriminator": "DoiElectronicVersion", "doi": "https://doi.org/10.1080/17459737.2017.1406012" },
                { "typeDiscriminator": "LinkElectronicVersion", "link": "https://example.org" }
            ]
        });
        let record = parse_research_output(&v).unwrap();
        assert_eq!(record.title, "Tuning systems");
        assert_eq!(record.dois, vec!["https://doi.org/10.1080/17459737.2017.1406012"]);
    }

    #[test]
    fn test_parse_record_without_uuid_fails() {
        assert!(matches!(parse_project(&json!({ "title": "x" })), Err(RegistryError::Parse(_))));
    }

    #[test]
    fn test_allowed_identifier_types() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/ws/api/projects/allowed-classified-identifier-types")
                .header("api-key", "key-123");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "classifications": [
                        { "uri": EXT, "term": { "en_GB": "External Project ID" } },
                        { "uri": "/dk/atira/pure/upm/classifiedidentifier/untitled" }
                    ]
                }));
        });

        let types = client(&server).allowed_identifier_types().unwrap();
        mock.assert();
        assert_eq!(types.len(), 2);
        assert_eq!(types[0].label, "External Project ID");
        assert_eq!(types[1].label, "/dk/atira/pure/upm/classifiedidentifier/untitled");
    }

    #[test]
    fn test_project_search_pages_until_short_page() {
        let server = MockServer::start();
        let page1 = server.mock(|when, then| {
            when.method(POST)
                .path("/ws/api/projects/search")
                .json_body(json!({ "searchString": "101137074", "size": 2, "offset": 0 }));
            then.status(200).json_body(json!({
                "count": 3,
                "items": [
                    { "uuid": "p1", "title": { "en_GB": "One" }, "identifiers": [] },
                    { "uuid": "p2", "title": { "en_GB": "Two" }, "identifiers": [] }
                ]
            }));
        });
        let page2 = server.mock(|when, then| {
            when.method(POST)
                .path("/ws/api/projects/search")
                .json_body(json!({ "searchString": "101137074", "size": 2, "offset": 2 }));
            then.status(200).json_body(json!({
                "count": 3,
                "items": [ project_json(&[]) ]
            }));
        });

        let projects = client(&server).search_projects("101137074").unwrap();
        page1.assert();
        page2.assert();
        assert_eq!(projects.len(), 3);
        assert_eq!(projects[2].id.as_str(), PROJECT);
        assert_eq!(projects[2].identifiers[0].value, "101137074");
        assert_eq!(projects[2].identifiers[0].type_uri, EXT);
    }

    #[test]
    fn test_search_past_page_cap_is_an_error() {
        let server = MockServer::start();
        let search = server.mock(|when, then| {
            when.method(POST).path("/ws/api/projects/search");
            then.status(200).json_body(json!({
                "count": 1000,
                "items": [
                    { "uuid": "p1", "title": { "en_GB": "One" }, "identifiers": [] },
                    { "uuid": "p2", "title": { "en_GB": "Two" }, "identifiers": [] }
                ]
            }));
        });

        let err = client(&server).find_projects("101137074").unwrap_err();
        search.assert_hits(MAX_SEARCH_PAGES as usize);
        match err {
            RegistryError::Parse(message) => {
                assert!(message.contains("101137074"));
                assert!(message.contains("exceeded 200 pages"));
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_search_ending_on_count_at_page_boundary_is_complete() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/ws/api/projects/search");
            then.status(200).json_body(json!({
                "count": 2,
                "items": [
                    { "uuid": "p1", "title": { "en_GB": "One" }, "identifiers": [] },
                    { "uuid": "p2", "title": { "en_GB": "Two" }, "identifiers": [] }
                ]
            }));
        });

        assert_eq!(client(&server).find_projects("42").unwrap().len(), 2);
    }

    #[test]
    fn test_native_key_lookup_404_is_no_match() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path(format!("/ws/api/projects/{PROJECT}"));
            then.status(404).json_body(json!({ "code": 404, "description": "not found" }));
        });

        let found = client(&server).find_project_by_key(PROJECT).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_fetch_relations() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path(format!("/ws/api/projects/{PROJECT}"));
            then.status(200).json_body(project_json(&[OTHER, PAPER]));
        });

        let related = client(&server).fetch_relations(&RecordId::from(PROJECT)).unwrap();
        assert_eq!(related, vec![RecordId::from(OTHER), RecordId::from(PAPER)]);
    }

    #[test]
    fn test_append_relation_puts_union_with_version() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path(format!("/ws/api/projects/{PROJECT}"));
            then.status(200).json_body(project_json(&[OTHER]));
        });
        let put = server.mock(|when, then| {
            when.method(PUT)
                .path(format!("/ws/api/projects/{PROJECT}"))
                .header("api-key", "key-123")
                .json_body(json!({
                    "researchOutputs": [
                        { "researchOutput": { "systemName": "ResearchOutput", "uuid": OTHER } },
                        { "researchOutput": { "systemName": "ResearchOutput", "uuid": PAPER } }
                    ],
                    "version": "a1b2c3"
                }));
            then.status(200).json_body(project_json(&[OTHER, PAPER]));
        });

        client(&server)
            .append_relation(&RecordId::from(PROJECT), &RecordId::from(PAPER))
            .unwrap();
        put.assert();
    }

    #[test]
    fn test_append_relation_skips_put_when_present() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path(format!("/ws/api/projects/{PROJECT}"));
            then.status(200).json_body(project_json(&[PAPER]));
        });
        let put = server.mock(|when, then| {
            when.method(PUT).path(format!("/ws/api/projects/{PROJECT}"));
            then.status(200);
        });

        client(&server)
            .append_relation(&RecordId::from(PROJECT), &RecordId::from(PAPER))
            .unwrap();
        put.assert_hits(0);
    }

    #[test]
    fn test_rejected_update_is_permission_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path(format!("/ws/api/projects/{PROJECT}"));
            then.status(200).json_body(project_json(&[]));
        });
        server.mock(|when, then| {
            when.method(PUT).path(format!("/ws/api/projects/{PROJECT}"));
            then.status(403).json_body(json!({ "code": 403, "description": "read-only API key" }));
        });

        let err = client(&server)
            .append_relation(&RecordId::from(PROJECT), &RecordId::from(PAPER))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::Permission { status: 403, message: "read-only API key".into() }
        );
    }

    #[test]
    fn test_unreachable_server_is_network_error() {
        let client = PureClient::with_options("http://127.0.0.1:9", "k", Duration::from_secs(2), 10).unwrap();
        assert!(client.probe().unwrap_err().is_transport());
    }
}
