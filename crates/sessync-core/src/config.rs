//! Configuration management for sessync.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`SESSYNC__` prefix, `__` separator)
//! 2. Config file (`sessync.toml`, `sessync.yaml`, ...) found in the current
//!    directory or the nearest parent
//! 3. Defaults
//!
//! The directory holding the config file is the project root; relative
//! paths in the file resolve against it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, SessyncError};
use crate::extract::{default_patterns, ExtractionPatterns, PatternSpec};
use crate::types::IntegrationKind;

const CONFIG_EXTENSIONS: [&str; 4] = ["toml", "yaml", "yml", "json"];

/// Top-level sessync configuration. Read-only for the duration of an invocation.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SessyncConfig {
    pub project: ProjectConfig,
    pub context: ContextConfig,
    pub journal: JournalConfig,
    pub workflow: WorkflowConfig,
    pub sync: SyncConfig,
    pub vault: VaultConfig,
    pub extraction: ExtractionConfig,
    pub integrations: BTreeMap<String, IntegrationConfig>,

    /// Project root that relative paths resolve against.
    #[serde(skip)]
    pub root: PathBuf,
    /// The config file that was loaded, if any.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub name: String,
    pub description: String,
    #[serde(alias = "type")]
    pub kind: String,
    pub version: String,
    pub tags: Vec<String>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "My Project".to_string(),
            description: String::new(),
            kind: "software-development".to_string(),
            version: "1.0.0".to_string(),
            tags: Vec::new(),
        }
    }
}

/// Where and how large the generated context artifacts are.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub directory: String,
    pub quick_file: String,
    pub full_file: String,
    /// Upper bound, in characters, of the full artifact.
    pub max_length: usize,
    /// Upper bound, in characters, of the quick artifact.
    pub quick_max_length: usize,
    /// Regenerate artifacts as part of every `update`.
    pub auto_refresh: bool,
    pub recent_sessions: usize,
    pub recent_work_items: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            directory: "ai-context".to_string(),
            quick_file: "QUICK_CONTEXT.txt".to_string(),
            full_file: "PROJECT_CONTEXT.md".to_string(),
            max_length: 10_000,
            quick_max_length: 1_500,
            auto_refresh: true,
            recent_sessions: 5,
            recent_work_items: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    pub directory: String,
    /// Entries older than this are reported as past retention. The journal
    /// never deletes them itself.
    pub retention_days: u32,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            directory: "session-logs".to_string(),
            retention_days: 90,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub mandatory_session_updates: bool,
    pub require_work_item_references: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            mandatory_session_updates: true,
            require_work_item_references: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Default per-adapter timeout.
    pub adapter_timeout_secs: u64,
    /// Maximum adapters publishing at once.
    pub max_concurrent_publishes: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            adapter_timeout_secs: 10,
            max_concurrent_publishes: 4,
        }
    }
}

/// Which credential backend to open at process start.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VaultBackendChoice {
    /// OS keystore when reachable, encrypted file otherwise.
    #[default]
    Auto,
    Keystore,
    File,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub backend: VaultBackendChoice,
    /// Location of the encrypted-file store. Defaults to the user config dir.
    pub file_path: Option<String>,
    /// Permit falling back to the encrypted file when the keystore is unreachable.
    pub allow_degraded: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            backend: VaultBackendChoice::Auto,
            file_path: None,
            allow_degraded: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub patterns: Vec<PatternSpec>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            patterns: default_patterns(),
        }
    }
}

/// One external integration. Secrets never live here, only in the vault.
#[derive(Debug, Clone, Deserialize)]
pub struct IntegrationConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Overrides `sync.adapter_timeout_secs` for this integration.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(flatten)]
    pub settings: IntegrationSettings,
}

/// Non-secret settings, tagged by integration kind.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrationSettings {
    IssueTracker {
        base_url: String,
        #[serde(default)]
        project_key: Option<String>,
    },
    Wiki {
        base_url: String,
        space_key: String,
        #[serde(default)]
        parent_page_id: Option<String>,
        #[serde(default = "default_wiki_title")]
        title_prefix: String,
    },
    SourceHost {
        repository: String,
        #[serde(default = "default_source_host_api")]
        api_url: String,
    },
    ChatNotifier {
        channel: String,
        #[serde(default = "default_chat_api")]
        api_url: String,
    },
    NoteDatabase {
        database_id: String,
        /// Name of the database's title property.
        #[serde(default = "default_title_property")]
        title_property: String,
        #[serde(default = "default_notes_api")]
        api_url: String,
    },
}

impl IntegrationSettings {
    pub fn kind(&self) -> IntegrationKind {
        match self {
            Self::IssueTracker { .. } => IntegrationKind::IssueTracker,
            Self::Wiki { .. } => IntegrationKind::Wiki,
            Self::SourceHost { .. } => IntegrationKind::SourceHost,
            Self::ChatNotifier { .. } => IntegrationKind::ChatNotifier,
            Self::NoteDatabase { .. } => IntegrationKind::NoteDatabase,
        }
    }
}

fn default_wiki_title() -> String {
    "Session Update".to_string()
}

fn default_source_host_api() -> String {
    "https://api.github.com".to_string()
}

fn default_chat_api() -> String {
    "https://slack.com/api".to_string()
}

fn default_title_property() -> String {
    "Name".to_string()
}

fn default_notes_api() -> String {
    "https://api.notion.com/v1".to_string()
}

impl SessyncConfig {
    /// Load configuration by searching upward from the current directory.
    pub fn load(file_prefix: &str) -> Result<Self> {
        let cwd = std::env::current_dir()?;
        Self::load_from(&cwd, file_prefix)
    }

    /// Load configuration by searching upward from `start`.
    pub fn load_from(start: &Path, file_prefix: &str) -> Result<Self> {
        let located = locate_config_file(start, file_prefix);

        let mut builder = config::Config::builder();
        if let Some(path) = &located {
            builder = builder.add_source(config::File::from(path.as_path()));
        }
        let cfg = builder
            .add_source(
                config::Environment::with_prefix("SESSYNC")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut parsed: SessyncConfig = cfg.try_deserialize()?;
        parsed.root = located
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| start.to_path_buf());
        parsed.source = located;

        parsed.validate()?;

        tracing::debug!(
            root = %parsed.root.display(),
            source = ?parsed.source,
            integrations = parsed.integrations.len(),
            "Configuration loaded"
        );

        Ok(parsed)
    }

    /// Reject configurations that must never reach a session run.
    pub fn validate(&self) -> Result<()> {
        self.extraction_patterns()?;

        if self.context.max_length == 0 || self.context.quick_max_length == 0 {
            return Err(SessyncError::Config(
                "context.max_length and context.quick_max_length must be positive".to_string(),
            ));
        }
        if self.sync.max_concurrent_publishes == 0 {
            return Err(SessyncError::Config(
                "sync.max_concurrent_publishes must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Compile the configured extraction patterns.
    pub fn extraction_patterns(&self) -> Result<ExtractionPatterns> {
        ExtractionPatterns::compile(&self.extraction.patterns)
    }

    pub fn context_dir(&self) -> PathBuf {
        self.resolve(&self.context.directory)
    }

    pub fn quick_context_path(&self) -> PathBuf {
        self.context_dir().join(&self.context.quick_file)
    }

    pub fn full_context_path(&self) -> PathBuf {
        self.context_dir().join(&self.context.full_file)
    }

    pub fn journal_dir(&self) -> PathBuf {
        self.resolve(&self.journal.directory)
    }

    /// Enabled integrations in ID order.
    pub fn enabled_integrations(&self) -> impl Iterator<Item = (&String, &IntegrationConfig)> {
        self.integrations.iter().filter(|(_, c)| c.enabled)
    }

    /// Effective timeout for one integration.
    pub fn adapter_timeout(&self, integration: &IntegrationConfig) -> Duration {
        Duration::from_secs(
            integration
                .timeout_secs
                .unwrap_or(self.sync.adapter_timeout_secs),
        )
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.root.join(p)
        }
    }
}

/// Find `<prefix>.<ext>` (or the hidden `.<prefix>.<ext>`) in `start` or
/// the nearest ancestor. A prefix naming an existing file is used as-is.
pub fn locate_config_file(start: &Path, file_prefix: &str) -> Option<PathBuf> {
    let direct = Path::new(file_prefix);
    if direct.is_file() {
        return Some(direct.to_path_buf());
    }

    start.ancestors().find_map(|dir| {
        CONFIG_EXTENSIONS.iter().find_map(|ext| {
            [
                dir.join(format!("{file_prefix}.{ext}")),
                dir.join(format!(".{file_prefix}.{ext}")),
            ]
            .into_iter()
            .find(|candidate| candidate.is_file())
        })
    })
}
