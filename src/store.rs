use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use base64::Engine;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::{Attachment, Category, Difficulty, Writeup, default_writeups};

pub const DATA_DIR: &str = ".knull-writeups";
pub const WRITEUPS_FILE: &str = "writeups.json";
pub const CONFIG_FILE: &str = "config.json";
pub const DEFAULT_LOGIN_URL: &str = "http://127.0.0.1:8787/api/login";

pub fn default_base_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow!("Could not determine home directory"))?;
    Ok(home.join(DATA_DIR))
}

pub fn writeups_path(base: &Path) -> PathBuf {
    base.join(WRITEUPS_FILE)
}

pub fn config_path(base: &Path) -> PathBuf {
    base.join(CONFIG_FILE)
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub login_url: String,
}

pub fn load_config(base: &Path) -> Result<Option<Config>> {
    let path = config_path(base);
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)?;
    let cfg: Config = serde_json::from_str(&raw)?;
    Ok(Some(cfg))
}

/// Resolves the login endpoint URL: environment override, then config
/// file, then the built-in default.
pub fn login_url(base: &Path) -> String {
    if let Ok(url) = std::env::var("KNULL_LOGIN_URL") {
        if !url.trim().is_empty() {
            return url;
        }
    }
    match load_config(base) {
        Ok(Some(cfg)) => cfg.login_url,
        Ok(None) => DEFAULT_LOGIN_URL.to_string(),
        Err(err) => {
            warn!("config unreadable, using default login URL: {err}");
            DEFAULT_LOGIN_URL.to_string()
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("stored data is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("stored data is not a list")]
    NotAList,
    #[error("entry {index} is not an object")]
    NotAnObject { index: usize },
    #[error("entry {index}: missing field `{field}`")]
    MissingField { index: usize, field: &'static str },
    #[error("entry {index}: field `{field}` has the wrong type")]
    InvalidField { index: usize, field: &'static str },
    #[error("entry {index}: `{value}` is not a valid {field}")]
    InvalidEnum {
        index: usize,
        field: &'static str,
        value: String,
    },
    #[error("duplicate writeup id {id}")]
    DuplicateId { id: u64 },
}

/// Strict decoder for the persisted list. Every entry must carry the
/// full field set, with category and difficulty drawn from their fixed
/// enumerations and ids unique across the list.
pub fn decode_writeups(raw: &str) -> Result<Vec<Writeup>, DecodeError> {
    let value: Value = serde_json::from_str(raw)?;
    let items = value.as_array().ok_or(DecodeError::NotAList)?;
    let mut writeups = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let writeup = decode_writeup(index, item)?;
        if writeups.iter().any(|w: &Writeup| w.id == writeup.id) {
            return Err(DecodeError::DuplicateId { id: writeup.id });
        }
        writeups.push(writeup);
    }
    Ok(writeups)
}

fn decode_writeup(index: usize, item: &Value) -> Result<Writeup, DecodeError> {
    let obj = item.as_object().ok_or(DecodeError::NotAnObject { index })?;

    let id = match obj.get("id") {
        None => return Err(DecodeError::MissingField { index, field: "id" }),
        Some(v) => v
            .as_u64()
            .ok_or(DecodeError::InvalidField { index, field: "id" })?,
    };
    let category_label = require_str(obj, index, "category")?;
    let category =
        Category::from_label(category_label).ok_or_else(|| DecodeError::InvalidEnum {
            index,
            field: "category",
            value: category_label.to_string(),
        })?;
    let difficulty_label = require_str(obj, index, "difficulty")?;
    let difficulty =
        Difficulty::from_label(difficulty_label).ok_or_else(|| DecodeError::InvalidEnum {
            index,
            field: "difficulty",
            value: difficulty_label.to_string(),
        })?;

    Ok(Writeup {
        id,
        title: require_str(obj, index, "title")?.to_string(),
        category,
        difficulty,
        description: require_str(obj, index, "description")?.to_string(),
        solution: require_str(obj, index, "solution")?.to_string(),
        flag: require_str(obj, index, "flag")?.to_string(),
        author: require_str(obj, index, "author")?.to_string(),
        attachment: decode_attachment(index, obj.get("attachment"))?,
    })
}

fn decode_attachment(
    index: usize,
    value: Option<&Value>,
) -> Result<Option<Attachment>, DecodeError> {
    let value = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(v) => v,
    };
    let obj = value
        .as_object()
        .ok_or(DecodeError::InvalidField { index, field: "attachment" })?;
    Ok(Some(Attachment {
        data: require_str(obj, index, "data")?.to_string(),
        mime_type: require_str(obj, index, "mimeType")?.to_string(),
        name: require_str(obj, index, "name")?.to_string(),
    }))
}

fn require_str<'a>(
    obj: &'a serde_json::Map<String, Value>,
    index: usize,
    field: &'static str,
) -> Result<&'a str, DecodeError> {
    match obj.get(field) {
        None => Err(DecodeError::MissingField { index, field }),
        Some(v) => v
            .as_str()
            .ok_or(DecodeError::InvalidField { index, field }),
    }
}

/// Reads the stored list. Absent file means first run; any parse or
/// validation failure discards the stored blob and falls back to the
/// built-in defaults. Never raises to the caller.
pub fn load(path: &Path) -> Vec<Writeup> {
    if !path.exists() {
        return default_writeups();
    }
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            warn!("stored writeups unreadable, using defaults: {err}");
            return default_writeups();
        }
    };
    match decode_writeups(&raw) {
        Ok(writeups) => writeups,
        Err(err) => {
            warn!("stored writeups are malformed, using defaults: {err}");
            if let Err(err) = fs::remove_file(path) {
                warn!("could not clear the corrupted store: {err}");
            }
            default_writeups()
        }
    }
}

/// Mirrors the full list to disk. Write failures are logged and
/// swallowed; the in-memory list stays the source of truth.
pub fn save(path: &Path, writeups: &[Writeup]) {
    if let Err(err) = try_save(path, writeups) {
        warn!("failed to persist writeups: {err}");
    }
}

pub fn try_save(path: &Path, writeups: &[Writeup]) -> Result<()> {
    let serialized = serde_json::to_string_pretty(writeups)?;
    atomic_write(path, serialized.as_bytes())?;
    restrict_file(path)?;
    Ok(())
}

/// Reads a file fully into memory as an inline attachment.
pub fn read_attachment(path: &Path) -> Result<Attachment> {
    let bytes =
        fs::read(path).map_err(|e| anyhow!("Failed to read {}: {e}", path.display()))?;
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("attachment.bin")
        .to_string();
    let mime_type = guess_mime(path).to_string();
    Ok(Attachment {
        data: base64::engine::general_purpose::STANDARD.encode(bytes),
        mime_type,
        name,
    })
}

/// Writes an attachment payload back out, the terminal counterpart of
/// the original's download link. Returns the path written.
pub fn export_attachment(attachment: &Attachment, dir: &Path) -> Result<PathBuf> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(base64_payload(&attachment.data))
        .map_err(|e| anyhow!("Attachment payload is not valid base64: {e}"))?;
    // Keep only the final component in case the stored name carries a path.
    let name = Path::new(&attachment.name)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("attachment.bin");
    let dest = dir.join(name);
    atomic_write(&dest, &bytes)?;
    Ok(dest)
}

/// Decoded size in bytes of an attachment payload, for display.
pub fn attachment_size(attachment: &Attachment) -> usize {
    base64::engine::general_purpose::STANDARD
        .decode(base64_payload(&attachment.data))
        .map(|b| b.len())
        .unwrap_or(0)
}

// Stored payloads may be bare base64 or a browser-style data URL.
fn base64_payload(data: &str) -> &str {
    if data.starts_with("data:") {
        match data.find(',') {
            Some(pos) => &data[pos + 1..],
            None => data,
        }
    } else {
        data
    }
}

fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("webp") => "image/webp",
        Some("txt") | Some("md") => "text/plain",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        Some("json") => "application/json",
        Some("pcap") | Some("pcapng") => "application/vnd.tcpdump.pcap",
        _ => "application/octet-stream",
    }
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
            restrict_dir(parent)?;
        }
        Ok(())
    } else {
        Err(anyhow!("Invalid store path"))
    }
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().ok_or_else(|| anyhow!("Invalid target path"))?;
    if !parent.exists() {
        fs::create_dir_all(parent)?;
        restrict_dir(parent)?;
    }

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(bytes)?;
    temp.flush()?;
    temp.as_file().sync_all()?;
    temp.persist(path)
        .map_err(|e| anyhow!("Atomic write failed: {}", e.error))?;
    Ok(())
}

fn restrict_file(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if path.exists() {
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(path, perms)?;
        }
    }
    Ok(())
}

fn restrict_dir(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if path.exists() {
            let perms = fs::Permissions::from_mode(0o700);
            fs::set_permissions(path, perms)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::default_writeups;

    fn temp_store() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(WRITEUPS_FILE);
        (dir, path)
    }

    #[test]
    fn absent_file_yields_defaults() {
        let (_dir, path) = temp_store();
        assert_eq!(load(&path), default_writeups());
    }

    #[test]
    fn corrupted_blob_yields_defaults_and_clears_the_file() {
        let (_dir, path) = temp_store();
        fs::write(&path, "not json").expect("write");
        assert_eq!(load(&path), default_writeups());
        assert!(!path.exists());
    }

    #[test]
    fn invalid_shape_yields_defaults_and_clears_the_file() {
        let (_dir, path) = temp_store();
        fs::write(&path, r#"[{"id": 1, "title": "orphan"}]"#).expect("write");
        assert_eq!(load(&path), default_writeups());
        assert!(!path.exists());
    }

    #[test]
    fn save_then_load_round_trips_every_field() {
        let (_dir, path) = temp_store();
        let mut writeups = default_writeups();
        writeups[1].attachment = Some(Attachment {
            data: "cGF5bG9hZA==".to_string(),
            mime_type: "application/zip".to_string(),
            name: "challenge.zip".to_string(),
        });
        save(&path, &writeups);
        assert_eq!(load(&path), writeups);
    }

    #[test]
    fn decode_rejects_non_list() {
        assert!(matches!(
            decode_writeups(r#"{"id": 1}"#),
            Err(DecodeError::NotAList)
        ));
    }

    #[test]
    fn decode_reports_missing_field() {
        let raw = r#"[{"id": 7, "title": "x", "category": "Web", "difficulty": "Easy",
                       "description": "d", "solution": "s", "flag": "f"}]"#;
        match decode_writeups(raw) {
            Err(DecodeError::MissingField { index: 0, field: "author" }) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn decode_reports_invalid_enum() {
        let raw = r#"[{"id": 7, "title": "x", "category": "Hardware", "difficulty": "Easy",
                       "description": "d", "solution": "s", "flag": "f", "author": "a"}]"#;
        match decode_writeups(raw) {
            Err(DecodeError::InvalidEnum { field: "category", value, .. }) => {
                assert_eq!(value, "Hardware");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn decode_reports_duplicate_ids() {
        let one = r#"{"id": 7, "title": "x", "category": "Web", "difficulty": "Easy",
                      "description": "d", "solution": "s", "flag": "f", "author": "a"}"#;
        let raw = format!("[{one}, {one}]");
        assert!(matches!(
            decode_writeups(&raw),
            Err(DecodeError::DuplicateId { id: 7 })
        ));
    }

    #[test]
    fn decode_accepts_null_attachment() {
        let raw = r#"[{"id": 7, "title": "x", "category": "Web", "difficulty": "Easy",
                       "description": "d", "solution": "s", "flag": "f", "author": "a",
                       "attachment": null}]"#;
        let writeups = decode_writeups(raw).expect("decode");
        assert_eq!(writeups[0].attachment, None);
    }

    #[test]
    fn attachment_reads_and_exports_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let src = dir.path().join("dump.pcap");
        fs::write(&src, b"\xd4\xc3\xb2\xa1capture").expect("write");

        let att = read_attachment(&src).expect("read");
        assert_eq!(att.name, "dump.pcap");
        assert_eq!(att.mime_type, "application/vnd.tcpdump.pcap");
        assert_eq!(attachment_size(&att), 11);

        let out_dir = dir.path().join("out");
        fs::create_dir_all(&out_dir).expect("mkdir");
        let dest = export_attachment(&att, &out_dir).expect("export");
        assert_eq!(fs::read(dest).expect("read back"), b"\xd4\xc3\xb2\xa1capture");
    }

    #[test]
    fn export_strips_data_url_prefix_and_path_components() {
        let dir = tempfile::tempdir().expect("tempdir");
        let att = Attachment {
            data: "data:text/plain;base64,aGVsbG8=".to_string(),
            mime_type: "text/plain".to_string(),
            name: "../escape.txt".to_string(),
        };
        let dest = export_attachment(&att, dir.path()).expect("export");
        assert_eq!(dest, dir.path().join("escape.txt"));
        assert_eq!(fs::read_to_string(dest).expect("read"), "hello");
    }

    #[test]
    fn login_url_prefers_config_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            config_path(dir.path()),
            r#"{"login_url": "http://10.0.0.5:9000/api/login"}"#,
        )
        .expect("write");
        assert_eq!(login_url(dir.path()), "http://10.0.0.5:9000/api/login");
    }

    #[test]
    fn login_url_defaults_without_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(login_url(dir.path()), DEFAULT_LOGIN_URL);
    }
}
