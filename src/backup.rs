//! Workspace bundles.
//!
//! A bundle is a zip holding the workspace database, a manifest with the
//! database's SHA-256, and a summary of the timetable it contains. Imports are
//! staged next to the live database and only renamed over it by
//! [`StagedImport::commit`], so a rejected file never touches the workspace.

use anyhow::{anyhow, bail, Context};
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const WORKSPACE_DB: &str = "timetable.sqlite3";
const STAGED_DB: &str = "timetable.sqlite3.importing";
const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/timetable.sqlite3";
const SUMMARY_ENTRY: &str = "meta/workspace.json";
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";
pub const BUNDLE_FORMAT_V1: &str = "timetable-workspace-v1";
pub const LEGACY_SQLITE_FORMAT: &str = "legacy-sqlite3";

/// What a workspace database holds, read without opening it for writing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSummary {
    pub curriculum: String,
    pub entry_count: u64,
    pub teacher_count: u64,
}

impl WorkspaceSummary {
    /// Fails unless `db_path` is a SQLite file carrying the timetable tables.
    pub fn read(db_path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .with_context(|| format!("cannot open {}", db_path.to_string_lossy()))?;
        conn.query_row("PRAGMA schema_version", [], |r| r.get::<_, i64>(0))
            .context("not a SQLite database")?;

        let tables: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type = 'table' AND name IN ('settings', 'teachers', 'timetable_entries')",
            [],
            |r| r.get(0),
        )?;
        if tables != 3 {
            bail!("database is not a timetable workspace");
        }

        let entry_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM timetable_entries", [], |r| r.get(0))?;
        let teacher_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM teachers", [], |r| r.get(0))?;
        let setup: Option<String> = conn
            .query_row(
                "SELECT value_json FROM settings WHERE key = 'setup.timetable'",
                [],
                |r| r.get(0),
            )
            .optional()?;
        let curriculum = setup
            .and_then(|s| serde_json::from_str::<serde_json::Value>(&s).ok())
            .and_then(|v| v.get("curriculum").and_then(|c| c.as_str()).map(str::to_string))
            .unwrap_or_else(|| "cambridge".to_string());

        Ok(Self {
            curriculum,
            entry_count: u64::try_from(entry_count).unwrap_or(0),
            teacher_count: u64::try_from(teacher_count).unwrap_or(0),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub file_count: usize,
    pub db_sha256: String,
    pub workspace: WorkspaceSummary,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
    pub workspace: WorkspaceSummary,
}

pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join(WORKSPACE_DB);
    if !db_path.is_file() {
        bail!("workspace database not found: {}", db_path.to_string_lossy());
    }
    let workspace = WorkspaceSummary::read(&db_path)?;
    let db_bytes = std::fs::read(&db_path)
        .with_context(|| format!("failed to read database {}", db_path.to_string_lossy()))?;
    let db_sha256 = sha256_hex(&db_bytes);

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let out_file = File::create(out_path)
        .with_context(|| format!("failed to create {}", out_path.to_string_lossy()))?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = json!({
        "format": BUNDLE_FORMAT_V1,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": chrono::Utc::now().to_rfc3339(),
        "dbSha256": db_sha256,
    });
    write_entry(&mut zip, MANIFEST_ENTRY, opts, &serde_json::to_vec_pretty(&manifest)?)?;
    write_entry(&mut zip, DB_ENTRY, opts, &db_bytes)?;
    let mut summary = serde_json::to_value(&workspace)?;
    summary["sourceWorkspace"] = json!(workspace_path.to_string_lossy());
    write_entry(&mut zip, SUMMARY_ENTRY, opts, &serde_json::to_vec_pretty(&summary)?)?;
    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        file_count: 3,
        db_sha256,
        workspace,
    })
}

fn write_entry(
    zip: &mut ZipWriter<File>,
    name: &str,
    opts: FileOptions,
    bytes: &[u8],
) -> anyhow::Result<()> {
    zip.start_file(name, opts)
        .with_context(|| format!("failed to start {}", name))?;
    zip.write_all(bytes)
        .with_context(|| format!("failed to write {}", name))
}

/// A verified database waiting beside the live one. Dropping it without
/// committing deletes the staged file.
#[derive(Debug)]
pub struct StagedImport {
    staged: PathBuf,
    target: PathBuf,
    bundle_format_detected: String,
    workspace: WorkspaceSummary,
    committed: bool,
}

impl StagedImport {
    pub fn bundle_format_detected(&self) -> &str {
        &self.bundle_format_detected
    }

    pub fn workspace(&self) -> &WorkspaceSummary {
        &self.workspace
    }

    /// Replaces the workspace database. Close every connection to it first.
    pub fn commit(mut self) -> anyhow::Result<ImportSummary> {
        std::fs::rename(&self.staged, &self.target).with_context(|| {
            format!(
                "failed to move imported database to {}",
                self.target.to_string_lossy()
            )
        })?;
        self.committed = true;
        Ok(ImportSummary {
            bundle_format_detected: self.bundle_format_detected.clone(),
            workspace: self.workspace.clone(),
        })
    }
}

impl Drop for StagedImport {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.staged);
        }
    }
}

/// Accepts a timetable bundle or a bare workspace database; anything else is
/// refused before the workspace is touched.
pub fn stage_import(in_path: &Path, workspace_path: &Path) -> anyhow::Result<StagedImport> {
    let head = read_head(in_path)?;
    let (db_bytes, format) = if head.starts_with(&ZIP_MAGIC) {
        (extract_bundle_db(in_path)?, BUNDLE_FORMAT_V1)
    } else if head == SQLITE_MAGIC[..] {
        let bytes = std::fs::read(in_path)
            .with_context(|| format!("failed to read {}", in_path.to_string_lossy()))?;
        (bytes, LEGACY_SQLITE_FORMAT)
    } else {
        bail!(
            "{} is neither a workspace bundle nor a SQLite database",
            in_path.to_string_lossy()
        );
    };
    if !db_bytes.starts_with(SQLITE_MAGIC) {
        bail!("bundled database is not a SQLite file");
    }

    std::fs::create_dir_all(workspace_path).with_context(|| {
        format!("failed to create workspace {}", workspace_path.to_string_lossy())
    })?;
    let staged = workspace_path.join(STAGED_DB);
    std::fs::write(&staged, &db_bytes)
        .with_context(|| format!("failed to stage {}", staged.to_string_lossy()))?;

    let mut import = StagedImport {
        staged,
        target: workspace_path.join(WORKSPACE_DB),
        bundle_format_detected: format.to_string(),
        workspace: WorkspaceSummary {
            curriculum: String::new(),
            entry_count: 0,
            teacher_count: 0,
        },
        committed: false,
    };
    import.workspace = WorkspaceSummary::read(&import.staged)?;
    Ok(import)
}

fn extract_bundle_db(in_path: &Path) -> anyhow::Result<Vec<u8>> {
    let file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest.get("format").and_then(|v| v.as_str()).unwrap_or("");
    if format != BUNDLE_FORMAT_V1 {
        bail!("unsupported bundle format: {}", format);
    }
    let expected = manifest
        .get("dbSha256")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("manifest.json missing dbSha256"))?
        .to_string();

    let mut db_bytes = Vec::new();
    archive
        .by_name(DB_ENTRY)
        .with_context(|| format!("bundle missing {}", DB_ENTRY))?
        .read_to_end(&mut db_bytes)
        .context("failed to extract database entry")?;
    let actual = sha256_hex(&db_bytes);
    if actual != expected {
        bail!(
            "database checksum mismatch: manifest {}, bundle {}",
            expected,
            actual
        );
    }
    Ok(db_bytes)
}

fn read_head(path: &Path) -> anyhow::Result<Vec<u8>> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut head = Vec::with_capacity(SQLITE_MAGIC.len());
    std::io::Read::by_ref(&mut f)
        .take(SQLITE_MAGIC.len() as u64)
        .read_to_end(&mut head)
        .context("failed to read file signature")?;
    Ok(head)
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
