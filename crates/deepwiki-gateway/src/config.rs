use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use deepwiki_ai::ProviderSettings;
use deepwiki_ai::providers::{
    BUILTIN_PROVIDER_IDS, DEFAULT_TRANSPORT_RETRY_COUNT, GOOGLE_API_KEY_ENVS, GOOGLE_PROVIDER_ID,
    OLLAMA_PROVIDER_ID, OPENAI_API_KEY_ENVS, OPENAI_PROVIDER_ID, default_settings,
};
use serde::Deserialize;

use crate::gateway::DEFAULT_EVENT_BUFFER;

pub const CONFIG_FILE_NAME: &str = "deepwiki.toml";
const DEFAULT_CONF_DIR_NAME: &str = ".deepwiki";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8001";
const DEFAULT_RETRIEVER_TIMEOUT_MS: u64 = 60_000;
const OLLAMA_HOST_ENV: &str = "OLLAMA_HOST";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_LOG_ROTATE_SIZE_MB: u64 = 100;

static CONF_DIR: OnceLock<PathBuf> = OnceLock::new();

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub bind_addr: String,
    pub event_buffer: usize,
    pub cache_dir: PathBuf,
    pub retriever: Option<RetrieverConfig>,
    pub transport_retry_count: u32,
    pub providers: BTreeMap<String, ProviderSettings>,
    pub log: LogConfig,
}

/// Where and how verbosely the binary writes its log file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub dir: PathBuf,
    pub level: String,
    pub rotate_size_bytes: u64,
    pub stdout: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrieverConfig {
    pub endpoint: String,
    pub timeout: Duration,
}

#[derive(Debug, Deserialize, Default)]
struct DeepwikiTomlFile {
    #[serde(default)]
    server: DeepwikiTomlServer,
    #[serde(default)]
    cache: DeepwikiTomlCache,
    #[serde(default)]
    retriever: DeepwikiTomlRetriever,
    #[serde(default)]
    providers: HashMap<String, DeepwikiTomlProvider>,
    #[serde(default)]
    transport_retry_count: Option<u32>,
    #[serde(default)]
    log: DeepwikiTomlLog,
    #[serde(default)]
    env: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Default)]
struct DeepwikiTomlLog {
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    rotate_size_mb: Option<u64>,
    #[serde(default)]
    stdout: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct DeepwikiTomlServer {
    #[serde(default)]
    bind: Option<String>,
    #[serde(default)]
    event_buffer: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct DeepwikiTomlCache {
    #[serde(default)]
    dir: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct DeepwikiTomlRetriever {
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DeepwikiTomlProvider {
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    temperature: Option<f64>,
    #[serde(default)]
    top_p: Option<f64>,
    #[serde(default)]
    top_k: Option<u32>,
    #[serde(default)]
    num_ctx: Option<u32>,
}

pub fn init_conf_dir(conf_dir: Option<PathBuf>) {
    let resolved = conf_dir
        .as_deref()
        .map(resolve_conf_dir_arg)
        .unwrap_or_else(default_conf_dir);
    let _ = CONF_DIR.set(resolved);
}

pub fn current_conf_dir() -> PathBuf {
    CONF_DIR.get().cloned().unwrap_or_else(default_conf_dir)
}

fn default_conf_dir() -> PathBuf {
    home_dir().join(DEFAULT_CONF_DIR_NAME)
}

fn resolve_conf_dir_arg(path: &Path) -> PathBuf {
    let expanded = expand_home_path(&path.to_string_lossy());
    if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(expanded)
    }
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn expand_home_path(path: &str) -> PathBuf {
    let trimmed = path.trim();
    if trimmed == "~" {
        return home_dir();
    }
    if let Some(suffix) = trimmed.strip_prefix("~/") {
        return home_dir().join(suffix);
    }
    PathBuf::from(trimmed)
}

/// Resolves `$NAME` references against the `[env]` table first, then the
/// process environment. Blank values read as unset.
fn resolve_config_value(value: &str, env_map: &HashMap<String, String>) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(env_key) = trimmed.strip_prefix('$') {
        return env_map
            .get(env_key)
            .cloned()
            .or_else(|| std::env::var(env_key).ok())
            .map(|resolved| resolved.trim().to_string())
            .filter(|resolved| !resolved.is_empty());
    }
    Some(trimmed.to_string())
}

pub fn default_config_path() -> PathBuf {
    current_conf_dir().join(CONFIG_FILE_NAME)
}

pub fn default_cache_dir() -> PathBuf {
    home_dir().join(".adalflow").join("wikicache")
}

/// Loads the gateway configuration; a missing file means all defaults.
pub fn load_gateway_config(path: &Path) -> Result<GatewayConfig, String> {
    let content = if path.exists() {
        std::fs::read_to_string(path)
            .map_err(|error| format!("read {} failed: {error}", path.display()))?
    } else {
        tracing::info!(path = %path.display(), "config file not found, using defaults");
        String::new()
    };
    parse_gateway_config(&content)
}

pub fn parse_gateway_config(content: &str) -> Result<GatewayConfig, String> {
    let parsed: DeepwikiTomlFile = toml::from_str(content)
        .map_err(|error| format!("parse {CONFIG_FILE_NAME} failed: {error}"))?;
    let env_map = &parsed.env;

    let bind_addr = parsed
        .server
        .bind
        .as_deref()
        .and_then(|value| resolve_config_value(value, env_map))
        .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
    let event_buffer = parsed.server.event_buffer.unwrap_or(DEFAULT_EVENT_BUFFER);
    if event_buffer == 0 {
        return Err("server.event_buffer must be greater than 0".to_string());
    }

    let cache_dir = parsed
        .cache
        .dir
        .as_deref()
        .and_then(|value| resolve_config_value(value, env_map))
        .map(|value| expand_home_path(&value))
        .unwrap_or_else(default_cache_dir);

    let retriever = parsed
        .retriever
        .endpoint
        .as_deref()
        .and_then(|value| resolve_config_value(value, env_map))
        .map(|endpoint| RetrieverConfig {
            endpoint,
            timeout: Duration::from_millis(
                parsed
                    .retriever
                    .timeout_ms
                    .unwrap_or(DEFAULT_RETRIEVER_TIMEOUT_MS),
            ),
        });

    let providers = resolve_providers(&parsed.providers, env_map)?;
    let log = resolve_log(&parsed.log, env_map);

    Ok(GatewayConfig {
        bind_addr,
        event_buffer,
        cache_dir,
        retriever,
        transport_retry_count: parsed
            .transport_retry_count
            .unwrap_or(DEFAULT_TRANSPORT_RETRY_COUNT),
        providers,
        log,
    })
}

fn resolve_log(log: &DeepwikiTomlLog, env_map: &HashMap<String, String>) -> LogConfig {
    let dir = log
        .path
        .as_deref()
        .and_then(|value| resolve_config_value(value, env_map))
        .map(|value| expand_home_path(&value))
        .unwrap_or_else(|| current_conf_dir().join("logs"));
    let level = log
        .level
        .as_deref()
        .and_then(|value| resolve_config_value(value, env_map))
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
    let rotate_size_mb = log
        .rotate_size_mb
        .unwrap_or(DEFAULT_LOG_ROTATE_SIZE_MB)
        .max(1);
    LogConfig {
        dir,
        level,
        rotate_size_bytes: rotate_size_mb * 1024 * 1024,
        stdout: log.stdout.unwrap_or(false),
    }
}

fn resolve_providers(
    providers: &HashMap<String, DeepwikiTomlProvider>,
    env_map: &HashMap<String, String>,
) -> Result<BTreeMap<String, ProviderSettings>, String> {
    for id in providers.keys() {
        if !BUILTIN_PROVIDER_IDS.contains(&id.as_str()) {
            return Err(format!(
                "provider '{id}' is not supported (expected one of: {})",
                BUILTIN_PROVIDER_IDS.join(", ")
            ));
        }
    }

    let mut resolved = BTreeMap::new();
    for id in BUILTIN_PROVIDER_IDS {
        let overrides = providers.get(*id);
        if overrides.and_then(|provider| provider.enabled) == Some(false) {
            continue;
        }
        let Some(mut settings) = default_settings(id) else {
            continue;
        };
        settings.api_key = default_api_key(id, env_map);
        if *id == OLLAMA_PROVIDER_ID
            && let Some(host) = resolve_config_value(&format!("${OLLAMA_HOST_ENV}"), env_map)
        {
            settings.base_url = host;
        }

        if let Some(overrides) = overrides {
            let resolve = |value: &Option<String>| {
                value
                    .as_deref()
                    .and_then(|value| resolve_config_value(value, env_map))
            };
            if let Some(base_url) = resolve(&overrides.base_url) {
                settings.base_url = base_url;
            }
            if let Some(api_key) = resolve(&overrides.api_key) {
                settings.api_key = Some(api_key);
            }
            if let Some(model) = resolve(&overrides.model) {
                settings.model = model;
            }
            if overrides.temperature.is_some() {
                settings.temperature = overrides.temperature;
            }
            if overrides.top_p.is_some() {
                settings.top_p = overrides.top_p;
            }
            if overrides.top_k.is_some() {
                settings.top_k = overrides.top_k;
            }
            if overrides.num_ctx.is_some() {
                settings.num_ctx = overrides.num_ctx;
            }
        }
        resolved.insert(id.to_string(), settings);
    }
    Ok(resolved)
}

fn default_api_key(provider_id: &str, env_map: &HashMap<String, String>) -> Option<String> {
    let envs: &[&str] = match provider_id {
        GOOGLE_PROVIDER_ID => GOOGLE_API_KEY_ENVS,
        OPENAI_PROVIDER_ID => OPENAI_API_KEY_ENVS,
        _ => &[],
    };
    envs.iter()
        .find_map(|env_key| resolve_config_value(&format!("${env_key}"), env_map))
}
