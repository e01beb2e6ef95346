//! Built-in operation catalog.
//!
//! Translates operation identifiers into concrete platform commands. The
//! command sequences differ per OS; identifiers are stable across
//! platforms so front ends never branch on the target.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use sysmend_core::{
    CommandOperation, Operation, OperationCatalog, OperationContext, Result, TaskSummary,
};
use sysmend_types::OperationParams;

/// Assemble the default catalog for the current platform.
pub fn build_catalog() -> OperationCatalog {
    OperationCatalog::new()
        .with("flush_dns", Arc::new(flush_dns()))
        .with("check_health", Arc::new(check_health()))
        .with("check_disk", Arc::new(check_disk()))
        .with("quick_scan", Arc::new(QuickScanOperation::default()))
}

fn flush_dns() -> CommandOperation {
    let op = CommandOperation::new("network_reset", "DNS cache flushed");
    if cfg!(target_os = "windows") {
        op.step("ipconfig", ["/flushdns"])
    } else if cfg!(target_os = "macos") {
        op.step("dscacheutil", ["-flushcache"])
            .step("killall", ["-HUP", "mDNSResponder"])
    } else {
        op.step("resolvectl", ["flush-caches"])
    }
}

fn check_health() -> CommandOperation {
    let op = CommandOperation::new("system_repair", "System health check finished");
    if cfg!(target_os = "windows") {
        op.step("DISM", ["/Online", "/Cleanup-Image", "/CheckHealth"])
    } else {
        op.step("systemctl", ["is-system-running"])
    }
}

fn check_disk() -> CommandOperation {
    let op = CommandOperation::new("disk_check", "Disk check finished");
    if cfg!(target_os = "windows") {
        op.step("chkdsk", Vec::<String>::new())
    } else {
        op.step("df", ["-h"])
    }
}

/// A quick scan over a directory tree.
///
/// Walks the target directory file by file, checking cancellation per
/// file. No detection heuristics are applied; the scan reports file
/// counts only, and a real detector would plug into the same reporting
/// contract.
#[derive(Debug)]
pub struct QuickScanOperation {
    default_target: PathBuf,
}

impl Default for QuickScanOperation {
    fn default() -> Self {
        Self {
            default_target: std::env::temp_dir(),
        }
    }
}

impl QuickScanOperation {
    fn collect_files(root: &PathBuf) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let mut pending = vec![root.clone()];
        while let Some(dir) = pending.pop() {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    pending.push(path);
                } else {
                    files.push(path);
                }
            }
        }
        files
    }
}

#[async_trait]
impl Operation for QuickScanOperation {
    fn surface(&self) -> &str {
        "virus_scan"
    }

    async fn execute(
        &self,
        params: &OperationParams,
        ctx: &OperationContext,
    ) -> Result<TaskSummary> {
        let target = params
            .get_str("target")
            .map(PathBuf::from)
            .unwrap_or_else(|| self.default_target.clone());
        ctx.report_log(format!("Scanning {}", target.display()));

        let files = Self::collect_files(&target);
        let total = files.len();
        for (index, file) in files.iter().enumerate() {
            ctx.ensure_active()?;
            if index % 100 == 0 {
                ctx.report_log(format!("Scanning {}", file.display()));
            }
            ctx.report_progress(((index + 1) * 100 / total.max(1)) as u8);
            // Yield so a scan over a large tree stays cancellable mid-burst.
            tokio::task::yield_now().await;
        }

        ctx.report_progress(100);
        Ok(TaskSummary::new(format!("Scanned {} files", total))
            .with_count("files", total as u64)
            .with_count("threats", 0))
    }
}
