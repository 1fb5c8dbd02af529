use std::{
    fs,
    io::{BufWriter, Write},
    path::Path,
};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

use crate::{
    error::{Origin, PipelineError, Result},
    process::NormalizedRecord,
};

/// Write `records` as an indented JSON array (one object per record, keys in
/// header order, trailing newline) to `destination`.
///
/// The document is written to a temporary file next to the destination and
/// renamed over it once fully flushed, so a failed run never leaves a
/// truncated file under the destination name. Returns the bytes written.
#[instrument(
    level = "info",
    skip(records, destination, origin),
    fields(records = records.len(), path = %destination.display())
)]
pub fn write_document(
    records: &[NormalizedRecord],
    destination: &Path,
    origin: Origin<'_>,
) -> Result<u64> {
    let sink_err = |message: String| PipelineError::SinkWrite {
        source_path: origin.source.to_path_buf(),
        table: origin.table.to_string(),
        destination: destination.to_path_buf(),
        message,
    };

    let dir = match destination.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| sink_err(format!("creating temp file in {}: {}", dir.display(), e)))?;
    debug!(tmp = %tmp.path().display(), "writing to temp file");

    {
        let mut w = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer_pretty(&mut w, records)
            .map_err(|e| sink_err(format!("serializing JSON: {}", e)))?;
        w.write_all(b"\n")
            .and_then(|_| w.flush())
            .map_err(|e| sink_err(e.to_string()))?;
    }
    tmp.as_file()
        .sync_all()
        .map_err(|e| sink_err(format!("syncing temp file: {}", e)))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o644))
            .map_err(|e| sink_err(format!("setting permissions: {}", e)))?;
    }

    tmp.persist(destination)
        .map_err(|e| sink_err(format!("renaming into place: {}", e.error)))?;

    let bytes = fs::metadata(destination)
        .map_err(|e| sink_err(format!("reading file metadata: {}", e)))?
        .len();
    info!(bytes, "document written");
    Ok(bytes)
}
