//! Grading API client.
//!
//! Thin HTTP wrapper over the site's GraphQL endpoint. One query, fixed
//! selection set; pure parsing in `parse_details` for testability.

use async_trait::async_trait;

use crate::config::SiteConfig;
use crate::message::{Credentials, ErrorCode};

/// Selection set sent with every grading lookup. The API omits most fields
/// (or the whole `submissionDetails` object) until grading completes.
const SUBMISSION_DETAILS_QUERY: &str = r"
query submissionDetails($submissionId: Int!) {
  submissionDetails(submissionId: $submissionId) {
    runtime
    runtimeDisplay
    runtimePercentile
    runtimeDistribution
    memory
    memoryDisplay
    memoryPercentile
    memoryDistribution
    code
    timestamp
    statusCode
    user {
      username
      profile {
        realName
        userAvatar
      }
    }
    lang {
      name
      verboseName
    }
    question {
      questionId
      titleSlug
      hasFrontendPreview
    }
    notes
    flagType
    topicTags {
      tagId
      slug
      name
    }
    runtimeError
    compileError
    lastTestcase
    codeOutput
    expectedOutput
    totalCorrect
    totalTestcases
    fullCodeOutput
    testDescriptions
    testBodies
    testInfo
    stdOutput
  }
}
";

const OPERATION_NAME: &str = "submissionDetails";

// =============================================================================
// STATUS CODES
// =============================================================================

/// Status code reported while a submission is still in the judge queue.
/// Terminal codes start at 10.
pub const STATUS_GRADING: i64 = 1;

/// Human name for a terminal status code.
#[must_use]
pub fn status_name(code: i64) -> Option<&'static str> {
    match code {
        10 => Some("Accepted"),
        11 => Some("Wrong Answer"),
        12 => Some("Memory Limit Exceeded"),
        13 => Some("Output Limit Exceeded"),
        14 => Some("Time Limit Exceeded"),
        15 => Some("Runtime Error"),
        16 => Some("Internal Error"),
        20 => Some("Compile Error"),
        21 => Some("Unknown Error"),
        30 => Some("Timeout"),
        _ => None,
    }
}

// =============================================================================
// TYPES
// =============================================================================

/// Grading detail subset the panel renders. Every field is optional because
/// the API returns nothing useful until the verdict lands.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmissionDetails {
    pub status_code: Option<i64>,
    pub runtime_display: Option<String>,
    pub runtime_percentile: Option<f64>,
    pub memory_display: Option<String>,
    pub memory_percentile: Option<f64>,
    pub total_correct: Option<i64>,
    pub total_testcases: Option<i64>,
    pub lang_name: Option<String>,
}

impl SubmissionDetails {
    /// The final verdict, if grading has finished. `None` while the status
    /// is absent or still the in-queue sentinel.
    #[must_use]
    pub fn terminal_status(&self) -> Option<i64> {
        self.status_code.filter(|&code| code != STATUS_GRADING)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SiteError {
    #[error("graphql request failed: {0}")]
    Request(String),
    #[error("graphql returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("graphql response parse: {0}")]
    Parse(String),
    #[error("http client build: {0}")]
    HttpClientBuild(String),
}

impl ErrorCode for SiteError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Request(_) => "E_SITE_REQUEST",
            Self::Status { .. } => "E_SITE_STATUS",
            Self::Parse(_) => "E_SITE_PARSE",
            Self::HttpClientBuild(_) => "E_SITE_CLIENT_BUILD",
        }
    }

    /// Only HTTP-status failures are worth another tick; send and parse
    /// failures end the poll session.
    fn retryable(&self) -> bool {
        matches!(self, Self::Status { .. })
    }
}

/// Grading lookup seam. Implemented by [`SiteClient`]; mocked in poller
/// tests.
#[async_trait]
pub trait StatusProbe: Send + Sync {
    /// Fetches the current grading details for one submission.
    ///
    /// # Errors
    ///
    /// Returns a [`SiteError`] when the request cannot be sent, the site
    /// answers with a non-success status, or the body does not parse.
    async fn probe(
        &self,
        submission_id: u64,
        credentials: &Credentials,
    ) -> Result<SubmissionDetails, SiteError>;
}

// =============================================================================
// CLIENT
// =============================================================================

pub struct SiteClient {
    http: reqwest::Client,
    config: SiteConfig,
}

impl SiteClient {
    /// # Errors
    /// `HttpClientBuild` when the connection pool cannot be constructed.
    pub fn new(config: SiteConfig) -> Result<Self, SiteError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| SiteError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, config })
    }

    fn cookie_header(&self, credentials: &Credentials) -> String {
        format!(
            "{}={}; {}={};",
            self.config.csrf_cookie, credentials.csrf, self.config.session_cookie, credentials.session
        )
    }
}

#[async_trait]
impl StatusProbe for SiteClient {
    async fn probe(
        &self,
        submission_id: u64,
        credentials: &Credentials,
    ) -> Result<SubmissionDetails, SiteError> {
        let body = ApiRequest {
            query: SUBMISSION_DETAILS_QUERY,
            variables: Variables { submission_id },
            operation_name: OPERATION_NAME,
        };

        let response = self
            .http
            .post(self.config.graphql_url())
            .header("X-Csrftoken", &credentials.csrf)
            .header("Cookie", self.cookie_header(credentials))
            .json(&body)
            .send()
            .await
            .map_err(|e| SiteError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| SiteError::Request(e.to_string()))?;

        if !(200..300).contains(&status) {
            return Err(SiteError::Status { status, body: text });
        }

        parse_details(&text)
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(serde::Serialize)]
struct ApiRequest<'a> {
    query: &'a str,
    variables: Variables,
    #[serde(rename = "operationName")]
    operation_name: &'a str,
}

#[derive(serde::Serialize)]
struct Variables {
    #[serde(rename = "submissionId")]
    submission_id: u64,
}

#[derive(serde::Deserialize)]
struct ApiResponse {
    data: Option<ApiData>,
}

#[derive(serde::Deserialize)]
struct ApiData {
    #[serde(rename = "submissionDetails")]
    submission_details: Option<WireDetails>,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDetails {
    status_code: Option<i64>,
    runtime_display: Option<String>,
    runtime_percentile: Option<f64>,
    memory_display: Option<String>,
    memory_percentile: Option<f64>,
    total_correct: Option<i64>,
    total_testcases: Option<i64>,
    lang: Option<WireLang>,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireLang {
    name: Option<String>,
    verbose_name: Option<String>,
}

// =============================================================================
// PARSING
// =============================================================================

fn parse_details(json: &str) -> Result<SubmissionDetails, SiteError> {
    let api: ApiResponse = serde_json::from_str(json).map_err(|e| SiteError::Parse(e.to_string()))?;

    let Some(wire) = api.data.and_then(|d| d.submission_details) else {
        return Ok(SubmissionDetails::default());
    };

    let lang_name = wire.lang.and_then(|lang| lang.verbose_name.or(lang.name));
    Ok(SubmissionDetails {
        status_code: wire.status_code,
        runtime_display: wire.runtime_display,
        runtime_percentile: wire.runtime_percentile,
        memory_display: wire.memory_display,
        memory_percentile: wire.memory_percentile,
        total_correct: wire.total_correct,
        total_testcases: wire.total_testcases,
        lang_name,
    })
}

// =============================================================================
// TESTS
// =============================================================================
