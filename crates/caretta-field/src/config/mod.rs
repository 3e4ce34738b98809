use std::collections::HashSet;
use std::fs;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde::de::DeserializeOwned;
use toml::Value;

use crate::catalog::Beach;
use crate::error::{Error, Result};

pub const DEFAULT_CONFIG_FILE: &str = "caretta.toml";
pub const DEFAULT_API_URL_ENV: &str = "CARETTA_API_URL";
pub const PASSWORD_ENV: &str = "CARETTA_PASSWORD";
const DEFAULT_API_URL: &str = "http://localhost:5000/api";

/// Raw merged TOML document plus the file it came from.
#[derive(Debug, Clone)]
pub struct ConfigDoc {
    pub path: PathBuf,
    pub value: Value,
}

impl ConfigDoc {
    pub fn empty() -> Self {
        Self {
            path: PathBuf::from("<defaults>"),
            value: Value::Table(Default::default()),
        }
    }

    pub fn value_path(&self, path: &str) -> Option<&Value> {
        let path = path.trim();
        if path.is_empty() {
            return Some(&self.value);
        }

        let mut cur = &self.value;
        for seg in path.split('.') {
            let tbl = cur.as_table()?;
            cur = tbl.get(seg)?;
        }
        Some(cur)
    }

    pub fn deserialize_path<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let Some(v) = self.value_path(path) else {
            return Ok(None);
        };
        let parsed = v.clone().try_into().map_err(|e| {
            Error::config(format!("failed to deserialize config at '{}': {e}", path))
        })?;
        Ok(Some(parsed))
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_api_url_env() -> Option<String> {
    Some(DEFAULT_API_URL_ENV.to_string())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_api_url_env")]
    pub base_url_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.into(),
            base_url_env: default_api_url_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TagConfig {
    pub prefix: String,
}

impl Default for TagConfig {
    fn default() -> Self {
        Self {
            prefix: "KF".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl std::str::FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(Error::config(format!(
                "unknown export format '{other}' (expected json or csv)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ExportConfig {
    pub default_format: ExportFormat,
}

/// Typed application settings resolved from a [`ConfigDoc`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub beaches: Vec<Beach>,
    pub tags: TagConfig,
    pub logging: LoggingConfig,
    pub export: ExportConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            beaches: crate::catalog::default_beaches(),
            tags: TagConfig::default(),
            logging: LoggingConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_doc(doc: &ConfigDoc) -> Result<Self> {
        let cfg: AppConfig = doc.deserialize_path("")?.unwrap_or_default();
        cfg.check()?;
        Ok(cfg)
    }

    fn check(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for b in &self.beaches {
            let abbrev = b.abbrev.trim();
            if abbrev.is_empty() || !abbrev.chars().all(|c| c.is_ascii_uppercase()) {
                return Err(Error::config(format!(
                    "beach '{}' needs an upper-case letter abbreviation, got '{}'",
                    b.name, b.abbrev
                )));
            }
            if !seen.insert(abbrev.to_string()) {
                return Err(Error::config(format!(
                    "beach abbreviation '{}' is used more than once",
                    abbrev
                )));
            }
        }
        if self.tags.prefix.trim().is_empty() {
            return Err(Error::config("tags.prefix is empty"));
        }
        Ok(())
    }

    /// Base URL with precedence: explicit override, env var, config file.
    pub fn resolve_base_url(&self, cli_override: Option<&str>) -> Result<String> {
        let from_env = self
            .api
            .base_url_env
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .and_then(|k| std::env::var(k).ok());
        let picked = cli_override
            .map(ToOwned::to_owned)
            .or(from_env)
            .unwrap_or_else(|| self.api.base_url.clone());
        let picked = picked.trim().trim_end_matches('/').to_string();
        if picked.is_empty() {
            return Err(Error::config("api.base_url is empty"));
        }
        if !(picked.starts_with("http://") || picked.starts_with("https://")) {
            return Err(Error::config(format!(
                "api.base_url must start with http:// or https://, got '{picked}'"
            )));
        }
        Ok(picked)
    }

    pub fn beach_by_name(&self, name: &str) -> Option<&Beach> {
        crate::catalog::find_beach(&self.beaches, name)
    }
}

/// Account password for register/login: the [`PASSWORD_ENV`] value when set,
/// else the first line of `input`. Never taken from argv.
pub fn resolve_password(from_env: Option<String>, input: &mut dyn BufRead) -> Result<String> {
    let password = match from_env.filter(|p| !p.is_empty()) {
        Some(p) => p,
        None => {
            let mut line = String::new();
            input.read_line(&mut line)?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };
    if password.is_empty() {
        return Err(Error::config(format!(
            "no password given (set {PASSWORD_ENV} or pipe it on stdin)"
        )));
    }
    Ok(password)
}

fn merge_values(base: &mut Value, child: Value) {
    match (base, child) {
        (Value::Table(base_tbl), Value::Table(child_tbl)) => {
            for (k, v) in child_tbl {
                match base_tbl.get_mut(&k) {
                    Some(existing) => merge_values(existing, v),
                    None => {
                        base_tbl.insert(k, v);
                    }
                }
            }
        }
        (base_slot, child_val) => {
            *base_slot = child_val;
        }
    }
}

fn resolve_ref_path(from_file: &Path, reference: &str) -> PathBuf {
    let p = PathBuf::from(reference);
    if p.is_absolute() {
        p
    } else {
        from_file.parent().unwrap_or_else(|| Path::new(".")).join(p)
    }
}

fn parse_imports(path: &Path, table: &toml::value::Table) -> Result<Vec<String>> {
    let Some(arr) = table.get("imports").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    for v in arr {
        let Some(s) = v.as_str() else {
            return Err(Error::config(format!(
                "invalid imports entry in {} (expected string)",
                path.display()
            )));
        };
        let s = s.trim();
        if !s.is_empty() {
            out.push(s.to_string());
        }
    }
    Ok(out)
}

fn inline_imports(file_path: &Path, value: &mut Value, stack: &mut HashSet<PathBuf>) -> Result<()> {
    let Value::Table(tbl) = value else {
        return Ok(());
    };

    let imports = parse_imports(file_path, tbl)?;
    tbl.remove("imports");
    if !imports.is_empty() {
        let mut acc = Value::Table(Default::default());
        for imp in imports {
            let loaded = load_value_inner(&resolve_ref_path(file_path, &imp), stack)?;
            merge_values(&mut acc, loaded);
        }
        merge_values(&mut acc, Value::Table(std::mem::take(tbl)));
        if let Value::Table(merged) = acc {
            *tbl = merged;
        }
    }

    for (_, v) in tbl.iter_mut() {
        inline_imports(file_path, v, stack)?;
    }
    Ok(())
}

fn load_value_inner(path: &Path, stack: &mut HashSet<PathBuf>) -> Result<Value> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !stack.insert(canonical.clone()) {
        return Err(Error::config(format!(
            "config import cycle detected at {}",
            canonical.display()
        )));
    }

    let data = fs::read_to_string(path)
        .map_err(|e| Error::config(format!("failed to read config {}: {e}", path.display())))?;
    let mut value: Value = toml::from_str(&data)
        .map_err(|e| Error::config(format!("TOML parse error in {}: {e}", path.display())))?;

    // Single-parent extends, then imports layered on top.
    let mut out = Value::Table(Default::default());
    if let Some(ext) = value.get("extends").and_then(Value::as_str) {
        out = load_value_inner(&resolve_ref_path(path, ext), stack)?;
    }
    if let Some(tbl) = value.as_table_mut() {
        tbl.remove("extends");
    }
    inline_imports(path, &mut value, stack)?;
    merge_values(&mut out, value);

    stack.remove(&canonical);
    Ok(out)
}

pub fn load(path: &Path) -> Result<ConfigDoc> {
    let mut stack = HashSet::<PathBuf>::new();
    let value = load_value_inner(path, &mut stack)?;
    Ok(ConfigDoc {
        path: path.to_path_buf(),
        value,
    })
}

/// Loads `.env`, then the given config file, or `caretta.toml` when it exists,
/// or built-in defaults.
pub fn load_app_config(explicit: Option<&Path>) -> Result<AppConfig> {
    dotenv::dotenv().ok();
    let doc = match explicit {
        Some(p) => load(p)?,
        None => {
            let p = Path::new(DEFAULT_CONFIG_FILE);
            if p.exists() {
                load(p)?
            } else {
                ConfigDoc::empty()
            }
        }
    };
    tracing::debug!(path = %doc.path.display(), "config loaded");
    AppConfig::from_doc(&doc)
}
