//! Minimal AWS client with Signature Version 4 signing.
//!
//! Every AWS call in this crate (S3, DynamoDB, Lambda, Bedrock) goes through
//! [`AwsClient::send`], which signs the request with
//! [SigV4](https://docs.aws.amazon.com/IAM/latest/UserGuide/reference_aws-signing.html)
//! using `hmac` + `sha2`, with no SDK or C dependencies.
//!
//! # Environment Variables
//!
//! - `AWS_ACCESS_KEY_ID`: required
//! - `AWS_SECRET_ACCESS_KEY`: required
//! - `AWS_SESSION_TOKEN`: optional (temporary credentials, Lambda execution roles)
//!
//! # Endpoints
//!
//! Requests go to `https://<service host>` by default. When
//! `[aws].endpoint_url` is set (LocalStack, MinIO), all services share that
//! endpoint and its scheme.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use std::time::Duration;
use thiserror::Error;

use crate::config::AwsConfig;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum AwsError {
    #[error("{0} environment variable not set")]
    MissingCredentials(&'static str),
    #[error("{service} request failed (HTTP {status}): {body}")]
    Status {
        service: String,
        status: StatusCode,
        body: String,
    },
    #[error("{service} request failed: {source}")]
    Transport {
        service: String,
        #[source]
        source: reqwest::Error,
    },
}

/// AWS credentials loaded from environment variables.
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

impl AwsCredentials {
    pub fn from_env() -> Result<Self, AwsError> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .map_err(|_| AwsError::MissingCredentials("AWS_ACCESS_KEY_ID"))?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .map_err(|_| AwsError::MissingCredentials("AWS_SECRET_ACCESS_KEY"))?;
        let session_token = std::env::var("AWS_SESSION_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

/// A request to be signed and sent.
#[derive(Debug, Clone)]
pub struct AwsRequest<'a> {
    /// Signing name (`s3`, `dynamodb`, `lambda`, `bedrock`).
    pub service: &'a str,
    /// Default host, used when no custom endpoint is configured.
    pub host: String,
    pub method: reqwest::Method,
    /// URL path, already percent-encoded.
    pub path: String,
    /// Extra headers to send and sign (names lowercase).
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Signs and sends AWS requests for one region.
#[derive(Clone)]
pub struct AwsClient {
    creds: AwsCredentials,
    region: String,
    endpoint_url: Option<String>,
    http: reqwest::Client,
}

impl AwsClient {
    pub fn new(creds: AwsCredentials, aws_config: &AwsConfig, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            creds,
            region: aws_config.region.clone(),
            endpoint_url: aws_config.endpoint_url.clone(),
            http,
        })
    }

    /// Build a client from environment credentials.
    pub fn from_env(aws_config: &AwsConfig, timeout: Duration) -> anyhow::Result<Self> {
        Self::new(AwsCredentials::from_env()?, aws_config, timeout)
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Whether requests go to a custom endpoint (path-style S3 addressing).
    pub fn has_custom_endpoint(&self) -> bool {
        self.endpoint_url.is_some()
    }

    /// Scheme and host to contact for a request whose default host is `host`.
    fn resolve_host(&self, host: &str) -> (&'static str, String) {
        match self.endpoint_url {
            Some(ref endpoint) => {
                let scheme = if endpoint.starts_with("http://") {
                    "http"
                } else {
                    "https"
                };
                let host = endpoint
                    .trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .trim_end_matches('/')
                    .to_string();
                (scheme, host)
            }
            None => ("https", host.to_string()),
        }
    }

    /// Sign and send a request. Non-2xx responses become [`AwsError::Status`].
    pub async fn send(&self, request: AwsRequest<'_>) -> Result<reqwest::Response, AwsError> {
        let (scheme, host) = self.resolve_host(&request.host);
        let url = format!("{}://{}{}", scheme, host, request.path);

        let signed = sign_request(
            &self.creds,
            &self.region,
            request.service,
            request.method.as_str(),
            &host,
            &request.path,
            &request.headers,
            &request.body,
            Utc::now(),
        );

        let mut builder = self.http.request(request.method.clone(), &url);
        for (name, value) in &signed {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let resp = builder
            .body(request.body)
            .send()
            .await
            .map_err(|e| AwsError::Transport {
                service: request.service.to_string(),
                source: e,
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AwsError::Status {
                service: request.service.to_string(),
                status,
                body: body.chars().take(500).collect(),
            });
        }

        Ok(resp)
    }
}

/// Compute SigV4 headers for a request.
///
/// Returns every header that must be sent: the caller's extra headers plus
/// `x-amz-date`, `x-amz-content-sha256`, the optional security token, and
/// `authorization`. `host` is signed but left for the HTTP client to send.
#[allow(clippy::too_many_arguments)]
pub fn sign_request(
    creds: &AwsCredentials,
    region: &str,
    service: &str,
    method: &str,
    host: &str,
    path: &str,
    extra_headers: &[(String, String)],
    payload: &[u8],
    now: DateTime<Utc>,
) -> Vec<(String, String)> {
    let date_stamp = now.format("%Y%m%d").to_string();
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let payload_hash = hex_sha256(payload);

    let mut headers: Vec<(String, String)> = extra_headers
        .iter()
        .map(|(k, v)| (k.to_lowercase(), v.trim().to_string()))
        .collect();
    headers.push(("x-amz-content-sha256".to_string(), payload_hash.clone()));
    headers.push(("x-amz-date".to_string(), amz_date.clone()));
    if let Some(ref token) = creds.session_token {
        headers.push(("x-amz-security-token".to_string(), token.clone()));
    }

    let mut signed_set = headers.clone();
    signed_set.push(("host".to_string(), host.to_string()));
    signed_set.sort_by(|a, b| a.0.cmp(&b.0));

    let signed_headers: String = signed_set
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical_headers: String = signed_set
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v))
        .collect();

    let canonical_request = format!(
        "{}\n{}\n\n{}\n{}\n{}",
        method,
        canonical_uri(service, path),
        canonical_headers,
        signed_headers,
        payload_hash
    );

    let credential_scope = format!("{}/{}/{}/aws4_request", date_stamp, region, service);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        credential_scope,
        hex_sha256(canonical_request.as_bytes())
    );

    let signing_key = derive_signing_key(&creds.secret_access_key, &date_stamp, region, service);
    let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

    headers.push((
        "authorization".to_string(),
        format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            creds.access_key_id, credential_scope, signed_headers, signature
        ),
    ));
    headers
}

/// S3 signs the path as sent; every other service signs it encoded once more.
fn canonical_uri(service: &str, path: &str) -> String {
    let path = if path.is_empty() { "/" } else { path };
    if service == "s3" {
        path.to_string()
    } else {
        path.split('/').map(uri_encode).collect::<Vec<_>>().join("/")
    }
}

/// Compute the hex-encoded SHA-256 hash of data.
pub fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute HMAC-SHA256 of data with the given key.
fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Compute hex-encoded HMAC-SHA256.
fn hex_hmac_sha256(key: &[u8], data: &[u8]) -> String {
    hex::encode(hmac_sha256(key, data))
}

/// Derive the SigV4 signing key for a given date, region, and service.
///
/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// URI-encode a string per RFC 3986.
///
/// Encodes all characters except `A-Z a-z 0-9 - _ . ~`.
pub fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

/// Percent-encode each segment of a `/`-separated key.
pub fn encode_path(key: &str) -> String {
    key.split('/').map(uri_encode).collect::<Vec<_>>().join("/")
}
