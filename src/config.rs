//! TOML configuration with environment overrides.
//!
//! Every section has defaults, so an empty file (or no file at all) yields a
//! working local setup. The deployment surface of the serverless build is a
//! handful of environment variables, applied on top of the parsed file:
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `BUCKET_NAME` | `storage.bucket` |
//! | `WORKER_LAMBDA_NAME` | `worker.function_name` |
//! | `TABLE_NAME` | `records.backend = "dynamodb"`, `records.table_name` |
//! | `CHROMA_PATH` | `db.path = $CHROMA_PATH/chroma.sqlite3` |
//! | `DATA_SOURCE_PATH` | `source.dir` |
//! | `AWS_REGION` / `AWS_DEFAULT_REGION` | `aws.region` |

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// File name of the vector store inside a `CHROMA_PATH` directory.
pub const SNAPSHOT_FILE_NAME: &str = "chroma.sqlite3";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub aws: AwsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub records: RecordsConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

/// Location of the embedded vector store file.
#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/chroma").join(SNAPSHOT_FILE_NAME)
}

/// Directory of PDFs fed to ingestion.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_source_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            dir: default_source_dir(),
            include_globs: default_include_globs(),
        }
    }
}

fn default_source_dir() -> PathBuf {
    PathBuf::from("data/source")
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.pdf".to_string()]
}

/// Sliding-window sizes, measured in characters.
#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    600
}
fn default_chunk_overlap() -> usize {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: Option<String>,
    /// Base URL for the `openai` and `ollama` providers.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            url: None,
            batch_size: default_batch_size(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

fn default_embedding_provider() -> String {
    "bedrock".to_string()
}
fn default_embedding_model() -> Option<String> {
    Some("amazon.titan-embed-text-v1".to_string())
}
fn default_batch_size() -> usize {
    16
}
fn default_embedding_timeout() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

/// Hosted chat model used to answer questions.
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            url: None,
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_llm_provider() -> String {
    "bedrock".to_string()
}
fn default_llm_model() -> String {
    "anthropic.claude-3-haiku-20240307-v1:0".to_string()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_llm_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}
fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct AwsConfig {
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for every AWS service (LocalStack, MinIO).
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint_url: None,
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Object storage target for the vector store snapshot. Disabled without a bucket.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default = "default_object_name")]
    pub object_name: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            object_name: default_object_name(),
        }
    }
}

fn default_object_name() -> String {
    SNAPSHOT_FILE_NAME.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RecordsConfig {
    #[serde(default = "default_records_backend")]
    pub backend: String,
    #[serde(default = "default_records_path")]
    pub path: PathBuf,
    #[serde(default)]
    pub table_name: Option<String>,
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self {
            backend: default_records_backend(),
            path: default_records_path(),
            table_name: None,
        }
    }
}

fn default_records_backend() -> String {
    "sqlite".to_string()
}
fn default_records_path() -> PathBuf {
    PathBuf::from("data/queries.sqlite")
}

/// Second-stage invocation target. Queries run inline when unset.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct WorkerConfig {
    #[serde(default)]
    pub function_name: Option<String>,
}

impl Config {
    /// Defaults plus environment overrides; used when no config file exists.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        apply_overrides(&mut config, |key| std::env::var(key).ok());
        validate(&config)?;
        Ok(config)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    apply_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;

    Ok(config)
}

/// Apply deployment overrides. `lookup` returns the value of a variable, if set.
pub fn apply_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(bucket) = lookup("BUCKET_NAME") {
        config.storage.bucket = Some(bucket);
    }
    if let Some(name) = lookup("WORKER_LAMBDA_NAME") {
        config.worker.function_name = Some(name);
    }
    if let Some(table) = lookup("TABLE_NAME") {
        config.records.backend = "dynamodb".to_string();
        config.records.table_name = Some(table);
    }
    if let Some(dir) = lookup("CHROMA_PATH") {
        config.db.path = PathBuf::from(dir).join(SNAPSHOT_FILE_NAME);
    }
    if let Some(dir) = lookup("DATA_SOURCE_PATH") {
        config.source.dir = PathBuf::from(dir);
    }
    if let Some(region) = lookup("AWS_REGION").or_else(|| lookup("AWS_DEFAULT_REGION")) {
        config.aws.region = region;
    }
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!(
            "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.chunk_overlap,
            config.chunking.chunk_size
        );
    }

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "bedrock" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be bedrock, openai, ollama, or disabled.",
            other
        ),
    }
    if config.embedding.is_enabled() && config.embedding.model.is_none() {
        bail!(
            "embedding.model must be specified when provider is '{}'",
            config.embedding.provider
        );
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    // Validate llm
    match config.llm.provider.as_str() {
        "bedrock" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown llm provider: '{}'. Must be bedrock, openai, or ollama.",
            other
        ),
    }
    if config.llm.model.trim().is_empty() {
        bail!("llm.model must not be empty");
    }

    // Validate records
    match config.records.backend.as_str() {
        "sqlite" => {}
        "dynamodb" => {
            if config.records.table_name.is_none() {
                bail!("records.table_name must be set when backend is 'dynamodb'");
            }
        }
        other => bail!(
            "Unknown records backend: '{}'. Must be sqlite or dynamodb.",
            other
        ),
    }

    Ok(())
}
