//! Rendering profiles into the engine's option file
//!
//! Rendering is an explicit field-to-line mapping rather than a template
//! language so the output is byte-exact and can be diffed between runs.

use super::ConfigProfile;
use crate::{Error, Result};
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::Path;
use tracing::{debug, info};

/// Turns a [`ConfigProfile`] into the file the engine reads.
///
/// Implementations must be deterministic: the same profile always renders
/// to the same bytes.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, profile: &ConfigProfile) -> String;
}

/// Default renderer producing a `[mysqld]` section with wsrep settings
#[derive(Debug, Clone)]
pub struct WsrepTemplate {
    /// Path of the Galera provider library
    pub provider_path: String,
}

impl WsrepTemplate {
    pub const DEFAULT_PROVIDER_PATH: &'static str = "/usr/lib/galera/libgalera_smm.so";

    pub fn new(provider_path: impl Into<String>) -> Self {
        Self {
            provider_path: provider_path.into(),
        }
    }
}

impl Default for WsrepTemplate {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PROVIDER_PATH)
    }
}

impl TemplateRenderer for WsrepTemplate {
    fn render(&self, profile: &ConfigProfile) -> String {
        let lines: [(&str, String); 13] = [
            ("binlog_format", "ROW".to_string()),
            ("default_storage_engine", "InnoDB".to_string()),
            ("innodb_autoinc_lock_mode", "2".to_string()),
            ("bind-address", "0.0.0.0".to_string()),
            ("wsrep_on", "ON".to_string()),
            ("wsrep_provider", self.provider_path.clone()),
            (
                "wsrep_provider_options",
                quote(&format!("gcache.size={}M", profile.cache_size_mb)),
            ),
            ("wsrep_sst_method", profile.sst_method.as_str().to_string()),
            ("wsrep_sst_auth", quote(profile.auth_secret.expose())),
            (
                "wsrep_cluster_address",
                quote(&format!("gcomm://{}", profile.membership_address)),
            ),
            ("wsrep_cluster_name", profile.cluster_name.clone()),
            ("wsrep_node_name", profile.node_name.clone()),
            ("wsrep_node_address", profile.node_address.clone()),
        ];

        let mut out = String::from("[mysqld]\n");
        for (key, value) in lines {
            // Writing to a String cannot fail.
            let _ = writeln!(out, "{}={}", key, value);
        }
        out
    }
}

/// Double-quote a value, escaping backslashes, quotes and line breaks
fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for ch in value.chars() {
        match ch {
            '"' | '\\' => {
                quoted.push('\\');
                quoted.push(ch);
            }
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            _ => quoted.push(ch),
        }
    }
    quoted.push('"');
    quoted
}

fn unquote(raw: &str) -> Option<String> {
    let inner = raw.strip_prefix('"')?.strip_suffix('"')?;
    let mut value = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next()? {
                'n' => value.push('\n'),
                'r' => value.push('\r'),
                escaped @ ('"' | '\\') => value.push(escaped),
                _ => return None,
            },
            '"' => return None,
            _ => value.push(ch),
        }
    }
    Some(value)
}

/// Parse a rendered `[mysqld]` file back into its settings, in file order.
///
/// Quoted values are unescaped. Blank lines and `#`/`;` comments are
/// skipped. Any other section, a line without `=`, or a repeated key is an
/// error.
pub fn parse_rendered(contents: &str) -> Result<Vec<(String, String)>> {
    let malformed = |line_no: usize, what: &str| {
        Error::Serialization(format!("rendered config line {}: {}", line_no, what))
    };

    let mut settings: Vec<(String, String)> = Vec::new();
    let mut in_section = false;
    for (idx, line) in contents.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') {
            if in_section || line != "[mysqld]" {
                return Err(malformed(line_no, "expected a single [mysqld] section"));
            }
            in_section = true;
            continue;
        }
        if !in_section {
            return Err(malformed(line_no, "setting outside [mysqld]"));
        }

        let (key, raw) = line
            .split_once('=')
            .ok_or_else(|| malformed(line_no, "expected key=value"))?;
        let key = key.trim();
        let raw = raw.trim();
        let value = if raw.starts_with('"') {
            unquote(raw).ok_or_else(|| malformed(line_no, "bad quoted value"))?
        } else {
            raw.to_string()
        };
        if settings.iter().any(|(k, _)| k == key) {
            return Err(malformed(line_no, &format!("duplicate key {}", key)));
        }
        settings.push((key.to_string(), value));
    }
    Ok(settings)
}

/// Read back a file written by [`write_rendered`]
pub fn read_rendered(path: &Path) -> Result<Vec<(String, String)>> {
    let contents = std::fs::read_to_string(path)?;
    parse_rendered(&contents)
}

/// Atomically write rendered contents to `path`.
///
/// Returns `false` without touching the file when it already holds exactly
/// `contents`. The file carries the replication secret, so on unix it is
/// created readable by the owner only.
pub fn write_rendered(path: &Path, contents: &str) -> Result<bool> {
    match std::fs::read(path) {
        Ok(existing) if existing == contents.as_bytes() => {
            debug!(path = %path.display(), "Rendered config unchanged");
            return Ok(false);
        }
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    tmp.persist(path).map_err(|e| e.error)?;
    info!(path = %path.display(), bytes = contents.len(), "Wrote rendered config");
    Ok(true)
}
