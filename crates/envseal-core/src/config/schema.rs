//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::paths;

/// Main envseal configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Location of the envelope, salt and plaintext files.
    #[serde(default)]
    pub artifacts: ArtifactsConfig,

    /// How the environment identity is obtained.
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Service-startup materialization.
    #[serde(default)]
    pub materialize: MaterializeConfig,

    /// Disk-residue audit.
    #[serde(default)]
    pub audit: AuditConfig,

    /// Credential rotation.
    #[serde(default)]
    pub rotation: RotationConfig,
}

/// On-disk artifact layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    /// Directory the file names below are resolved against.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    #[serde(default = "default_envelope_file")]
    pub envelope_file: PathBuf,

    #[serde(default = "default_salt_file")]
    pub salt_file: PathBuf,

    /// Unencrypted bundle, consulted only in degraded mode.
    #[serde(default = "default_plaintext_file")]
    pub plaintext_file: PathBuf,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_envelope_file() -> PathBuf {
    PathBuf::from(paths::ENVELOPE_FILE)
}

fn default_salt_file() -> PathBuf {
    PathBuf::from(paths::SALT_FILE)
}

fn default_plaintext_file() -> PathBuf {
    PathBuf::from(paths::PLAINTEXT_FILE)
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            envelope_file: default_envelope_file(),
            salt_file: default_salt_file(),
            plaintext_file: default_plaintext_file(),
        }
    }
}

impl ArtifactsConfig {
    pub fn envelope_path(&self) -> PathBuf {
        paths::resolve(&self.root, &self.envelope_file)
    }

    pub fn salt_path(&self) -> PathBuf {
        paths::resolve(&self.root, &self.salt_file)
    }

    pub fn plaintext_path(&self) -> PathBuf {
        paths::resolve(&self.root, &self.plaintext_file)
    }
}

/// Identity source kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentitySourceKind {
    /// Cloud instance metadata endpoint (production/staging hosts).
    #[default]
    Metadata,
    /// Authenticated developer tooling session (local/dev hosts).
    Tooling,
    /// Explicit value from config or `ENVSEAL_IDENTITY`.
    Static,
}

impl FromStr for IdentitySourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "metadata" => Ok(Self::Metadata),
            "tooling" => Ok(Self::Tooling),
            "static" => Ok(Self::Static),
            other => Err(format!(
                "unknown identity source '{other}' (expected metadata, tooling or static)"
            )),
        }
    }
}

/// Environment identity configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default)]
    pub source: IdentitySourceKind,

    #[serde(default = "default_metadata_url")]
    pub metadata_url: String,

    /// Headers the metadata endpoint requires (e.g. `Metadata-Flavor: Google`).
    #[serde(default = "default_metadata_headers")]
    pub metadata_headers: BTreeMap<String, String>,

    /// Command printing the developer identity on stdout.
    #[serde(default = "default_tooling_command")]
    pub tooling_command: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_value: Option<String>,

    #[serde(default = "default_identity_timeout")]
    pub timeout_secs: u64,
}

fn default_metadata_url() -> String {
    "http://metadata.google.internal/computeMetadata/v1/instance/id".to_string()
}

fn default_metadata_headers() -> BTreeMap<String, String> {
    BTreeMap::from([("Metadata-Flavor".to_string(), "Google".to_string())])
}

fn default_tooling_command() -> Vec<String> {
    ["gcloud", "config", "get-value", "account"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_identity_timeout() -> u64 {
    5
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            source: IdentitySourceKind::default(),
            metadata_url: default_metadata_url(),
            metadata_headers: default_metadata_headers(),
            tooling_command: default_tooling_command(),
            static_value: None,
            timeout_secs: default_identity_timeout(),
        }
    }
}

/// Materializer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterializeConfig {
    /// Keys that must be present in every decrypted bundle.
    #[serde(default)]
    pub required_keys: Vec<String>,

    /// Permit reading the plaintext bundle when no envelope exists.
    #[serde(default)]
    pub allow_plaintext_fallback: bool,

    /// Directory for the volatile env file; defaults to a tmpfs location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volatile_dir: Option<PathBuf>,

    /// Refuse to write the volatile file outside tmpfs/ramfs.
    #[serde(default = "default_true")]
    pub require_memory_backed: bool,

    /// Seconds after launch before the volatile file is removed.
    #[serde(default = "default_env_file_grace")]
    pub env_file_grace_secs: u64,

    /// Keep the volatile file until the child exits instead.
    #[serde(default)]
    pub keep_env_file_until_exit: bool,
}

fn default_true() -> bool {
    true
}

fn default_env_file_grace() -> u64 {
    5
}

/// Upper bound on `env_file_grace_secs`.
pub const MAX_ENV_FILE_GRACE_SECS: u64 = 300;

impl Default for MaterializeConfig {
    fn default() -> Self {
        Self {
            required_keys: Vec::new(),
            allow_plaintext_fallback: false,
            volatile_dir: None,
            require_memory_backed: true,
            env_file_grace_secs: default_env_file_grace(),
            keep_env_file_until_exit: false,
        }
    }
}

impl MaterializeConfig {
    pub fn volatile_dir(&self) -> PathBuf {
        self.volatile_dir
            .clone()
            .unwrap_or_else(paths::default_volatile_dir)
    }
}

/// Disk-residue auditor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Filesystem roots scanned when none are given on the command line.
    #[serde(default = "default_audit_roots")]
    pub roots: Vec<PathBuf>,

    /// Directory names never descended into.
    #[serde(default = "default_exclude_dirs")]
    pub exclude_dirs: Vec<String>,

    /// Additional file-name regexes treated as plaintext secret files.
    #[serde(default)]
    pub extra_filename_patterns: Vec<String>,

    /// Additional variable names whose assignments count as leaked secrets.
    #[serde(default)]
    pub extra_secret_names: Vec<String>,

    /// Variable names every running container must carry.
    #[serde(default)]
    pub expected_container_vars: Vec<String>,

    /// Containers to inspect; empty means every running container.
    #[serde(default)]
    pub containers: Vec<String>,

    /// Container runtime CLI (`docker`, `podman`).
    #[serde(default = "default_container_runtime")]
    pub container_runtime: String,

    /// Files larger than this are skipped.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

fn default_audit_roots() -> Vec<PathBuf> {
    vec![PathBuf::from(".")]
}

fn default_exclude_dirs() -> Vec<String> {
    [
        ".git",
        "node_modules",
        "target",
        ".venv",
        "vendor",
        "__pycache__",
        ".terraform",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_container_runtime() -> String {
    "docker".to_string()
}

fn default_max_file_bytes() -> u64 {
    1024 * 1024
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            roots: default_audit_roots(),
            exclude_dirs: default_exclude_dirs(),
            extra_filename_patterns: Vec::new(),
            extra_secret_names: Vec::new(),
            expected_container_vars: Vec::new(),
            containers: Vec::new(),
            container_runtime: default_container_runtime(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

/// Deployment environment a rotation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Stage,
    Prod,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Dev => "dev",
            Self::Stage => "stage",
            Self::Prod => "prod",
        })
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Self::Dev),
            "stage" | "staging" => Ok(Self::Stage),
            "prod" | "production" => Ok(Self::Prod),
            other => Err(format!(
                "unknown environment '{other}' (expected dev, stage or prod)"
            )),
        }
    }
}

/// Credential rotation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationConfig {
    /// Maximum credentials rotated at once in bulk mode.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-call timeout for every external API request.
    #[serde(default = "default_rotation_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryConfig,

    /// Keyed by environment name (`dev`, `stage`, `prod`).
    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentConfig>,

    #[serde(default)]
    pub credentials: Vec<CredentialConfig>,
}

fn default_concurrency() -> usize {
    4
}

fn default_rotation_timeout() -> u64 {
    30
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            timeout_secs: default_rotation_timeout(),
            retry: RetryConfig::default(),
            environments: BTreeMap::new(),
            credentials: Vec::new(),
        }
    }
}

/// Exponential backoff for transient external API failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    8_000
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

/// External systems for one deployment environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub keycloak: KeycloakConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<GitHubConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcp: Option<GcpConfig>,
}

/// Identity provider (authoritative store) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeycloakConfig {
    /// Base URL including any context path, e.g. `https://sso.example.com/auth`.
    pub url: String,

    /// Realm holding the rotated clients.
    pub realm: String,

    /// Realm the admin authenticates against.
    #[serde(default = "default_admin_realm")]
    pub admin_realm: String,

    #[serde(default = "default_admin_user")]
    pub admin_user: String,

    #[serde(default = "default_admin_client_id")]
    pub admin_client_id: String,

    /// Variable holding the admin password (password grant).
    #[serde(default = "default_admin_password_env")]
    pub admin_password_env: String,

    /// Variable holding a service-account client secret; when set, the
    /// client-credentials grant is used instead of the password grant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret_env: Option<String>,
}

fn default_admin_realm() -> String {
    "master".to_string()
}

fn default_admin_user() -> String {
    "admin".to_string()
}

fn default_admin_client_id() -> String {
    "admin-cli".to_string()
}

fn default_admin_password_env() -> String {
    "KEYCLOAK_ADMIN_PASSWORD".to_string()
}

/// Git-hosting repository secrets store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    #[serde(default = "default_github_api")]
    pub api_url: String,

    /// `owner/name`.
    pub repo: String,

    #[serde(default = "default_github_token_env")]
    pub token_env: String,
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}

fn default_github_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

/// Cloud secret manager store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcpConfig {
    #[serde(default = "default_gcp_api")]
    pub api_url: String,

    pub project: String,

    /// Variable holding an OAuth access token. When unset the token is
    /// fetched from the instance metadata server.
    #[serde(default = "default_gcp_token_env")]
    pub token_env: String,

    #[serde(default = "default_gcp_metadata_token_url")]
    pub metadata_token_url: String,
}

fn default_gcp_api() -> String {
    "https://secretmanager.googleapis.com".to_string()
}

fn default_gcp_token_env() -> String {
    "GCP_ACCESS_TOKEN".to_string()
}

fn default_gcp_metadata_token_url() -> String {
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token"
        .to_string()
}

/// When the previous value stops working after regeneration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Invalidation {
    /// The old value is rejected as soon as the new one is issued.
    #[default]
    Immediate,
    /// The old value keeps working for a provider-defined grace period.
    Eventual,
}

impl fmt::Display for Invalidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Immediate => "immediate",
            Self::Eventual => "eventual",
        })
    }
}

/// A named logical credential and where its representations live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialConfig {
    pub name: String,

    /// OAuth `clientId` at the identity provider.
    pub client_id: String,

    /// Repository secret name mirroring the value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_secret: Option<String>,

    /// Cloud secret-manager secret id mirroring the value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcp_secret: Option<String>,

    #[serde(default)]
    pub invalidation: Invalidation,
}
