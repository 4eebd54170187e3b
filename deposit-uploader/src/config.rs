use std::{path::PathBuf, time::Duration};

use domain_upload::model::vo::{Quota, TransferKind, TransferPolicy};
use serde::*;
use service_upload::RetryPolicy;

use crate::infrastructure::TelemetryConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DepositConfig {
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Limits and tuning of the upload sessions of one draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "UploadConfig::default_max_files")]
    pub max_files: usize,
    /// Bytes.
    #[serde(default = "UploadConfig::default_max_storage")]
    pub max_storage: u64,
    #[serde(default)]
    pub allow_empty_files: bool,
    #[serde(default = "UploadConfig::default_supported_transfer_kinds")]
    pub supported_transfer_kinds: Vec<TransferKind>,
    #[serde(default = "UploadConfig::default_transfer_kind")]
    pub default_transfer_kind: TransferKind,
    #[serde(default = "UploadConfig::default_part_upload_concurrency")]
    pub part_upload_concurrency: usize,
    /// Attempts per part, the first one included.
    #[serde(default = "UploadConfig::default_part_retry_limit")]
    pub part_retry_limit: u32,
    #[serde(default = "UploadConfig::default_part_size")]
    pub part_size: u64,
    #[serde(default = "UploadConfig::default_multipart_threshold")]
    pub multipart_threshold: u64,
    #[serde(default = "UploadConfig::default_max_concurrent_uploads")]
    pub max_concurrent_uploads: usize,
    /// Seconds.
    #[serde(default = "UploadConfig::default_request_timeout")]
    pub request_timeout: u64,
    /// Milliseconds.
    #[serde(default = "UploadConfig::default_retry_backoff")]
    pub retry_backoff: u64,
    #[serde(default)]
    pub verify_part_integrity: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_files: Self::default_max_files(),
            max_storage: Self::default_max_storage(),
            allow_empty_files: false,
            supported_transfer_kinds: Self::default_supported_transfer_kinds(),
            default_transfer_kind: Self::default_transfer_kind(),
            part_upload_concurrency: Self::default_part_upload_concurrency(),
            part_retry_limit: Self::default_part_retry_limit(),
            part_size: Self::default_part_size(),
            multipart_threshold: Self::default_multipart_threshold(),
            max_concurrent_uploads: Self::default_max_concurrent_uploads(),
            request_timeout: Self::default_request_timeout(),
            retry_backoff: Self::default_retry_backoff(),
            verify_part_integrity: false,
        }
    }
}

impl UploadConfig {
    fn default_max_files() -> usize {
        100
    }
    fn default_max_storage() -> u64 {
        10_u64.pow(10)
    }
    fn default_supported_transfer_kinds() -> Vec<TransferKind> {
        vec![TransferKind::Local, TransferKind::Multipart]
    }
    fn default_transfer_kind() -> TransferKind {
        TransferKind::Local
    }
    fn default_part_upload_concurrency() -> usize {
        4
    }
    fn default_part_retry_limit() -> u32 {
        3
    }
    fn default_part_size() -> u64 {
        64 * 1024 * 1024
    }
    fn default_multipart_threshold() -> u64 {
        100 * 1024 * 1024
    }
    fn default_max_concurrent_uploads() -> usize {
        3
    }
    fn default_request_timeout() -> u64 {
        300
    }
    fn default_retry_backoff() -> u64 {
        1000
    }

    pub fn quota(&self) -> Quota {
        Quota {
            max_files: self.max_files,
            max_storage: self.max_storage,
        }
    }

    pub fn transfer_policy(&self) -> TransferPolicy {
        TransferPolicy {
            supported_transfer_kinds: self.supported_transfer_kinds.to_owned(),
            default_transfer_kind: self.default_transfer_kind.to_owned(),
            part_size: self.part_size,
            multipart_threshold: self.multipart_threshold,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff)
    }

    /// Retries of initialize, content, finalize, delete and import requests.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            limit: self.part_retry_limit.max(1),
            backoff: self.retry_backoff(),
            timeout: self.request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Which repository API to talk to.
    #[serde(default = "GatewayConfig::default_kind")]
    pub kind: String,
    /// Personal access token sent as a bearer token.
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            kind: Self::default_kind(),
            token: None,
        }
    }
}

impl GatewayConfig {
    fn default_kind() -> String {
        "invenio".to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Seconds.
    #[serde(default = "HttpConfig::default_connect_timeout")]
    pub connect_timeout: u64,
    #[serde(default = "HttpConfig::default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Self::default_connect_timeout(),
            user_agent: Self::default_user_agent(),
        }
    }
}

impl HttpConfig {
    fn default_connect_timeout() -> u64 {
        10
    }
    fn default_user_agent() -> String {
        concat!("deposit-uploader/", env!("CARGO_PKG_VERSION")).to_string()
    }
}

/// `config.yaml` of the working directory, then `files` in order, then `DEPOSIT__*` variables.
pub fn build_config(files: &[PathBuf]) -> anyhow::Result<DepositConfig> {
    let mut config = config::Config::builder().add_source(
        config::File::with_name("config")
            .required(false)
            .format(config::FileFormat::Yaml),
    );
    for file in files {
        config = config.add_source(
            config::File::from(file.as_path())
                .format(config::FileFormat::Yaml)
                .required(true),
        );
    }
    config = config.add_source(
        config::Environment::with_prefix("DEPOSIT")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("upload.supported_transfer_kinds"),
    );
    Ok(config.build()?.try_deserialize()?)
}
