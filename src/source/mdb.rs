use async_trait::async_trait;
use std::{ffi::OsString, path::Path, process::Stdio};
use tokio::process::Command;
use tracing::{debug, instrument};

use super::Extractor;
use crate::config::ToolsConfig;

/// `Extractor` backed by the mdb-tools command line programs.
#[derive(Debug, Clone, Default)]
pub struct MdbTools {
    config: ToolsConfig,
}

impl MdbTools {
    pub fn new(config: ToolsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ToolsConfig {
        &self.config
    }
}

#[async_trait]
impl Extractor for MdbTools {
    async fn export_table(&self, source: &Path, table: &str) -> Result<Vec<u8>, String> {
        let mut args: Vec<OsString> = Vec::with_capacity(4);
        if let Some(fmt) = &self.config.date_format {
            args.push("-D".into());
            args.push(fmt.into());
        }
        args.push(source.into());
        args.push(table.into());
        run_tool(&self.config.export_bin, &args).await
    }

    async fn dump_schema(&self, source: &Path) -> Result<String, String> {
        let args: [OsString; 2] = [source.into(), (&self.config.schema_backend).into()];
        let out = run_tool(&self.config.schema_bin, &args).await?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    async fn list_tables(&self, source: &Path) -> Result<String, String> {
        let args: [OsString; 2] = ["-1".into(), source.into()];
        let out = run_tool(&self.config.tables_bin, &args).await?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

/// Run `bin` to completion and return its stdout. A spawn failure or a
/// non-zero exit yields the diagnostic text: stderr verbatim, or the exit
/// status when stderr is empty.
#[instrument(level = "debug", skip(bin, args), fields(bin = %bin.display()))]
pub(crate) async fn run_tool(bin: &Path, args: &[OsString]) -> Result<Vec<u8>, String> {
    let output = Command::new(bin)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| format!("failed to run {}: {}", bin.display(), e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        debug!(status = %output.status, "tool failed");
        return Err(if stderr.trim().is_empty() {
            format!("{} exited with {}", bin.display(), output.status)
        } else {
            stderr
        });
    }

    debug!(stdout_bytes = output.stdout.len(), "tool finished");
    Ok(output.stdout)
}
