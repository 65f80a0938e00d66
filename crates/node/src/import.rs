//! Startup import of hex-encoded blocks.

use std::fs;
use std::path::Path;

use btmd_chainstate::{ChainError, ChainHandle};
use btmd_consensus::{bytes_from_hex, hash256_to_hex};
use btmd_primitives::encoding::decode;
use btmd_primitives::Block;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub accepted: usize,
    pub orphaned: usize,
    pub rejected: usize,
}

/// Returns `None` for blank lines and `#` comments.
pub fn parse_block_line(line: &str) -> Result<Option<Block>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let bytes = bytes_from_hex(line).map_err(|err| err.to_string())?;
    decode::<Block>(&bytes)
        .map(Some)
        .map_err(|err| format!("invalid block encoding: {err}"))
}

pub async fn import_file(chain: &ChainHandle, path: &Path) -> Result<ImportSummary, String> {
    let contents = fs::read_to_string(path)
        .map_err(|err| format!("failed to read {}: {err}", path.display()))?;
    let mut summary = ImportSummary::default();
    for (index, line) in contents.lines().enumerate() {
        let block = match parse_block_line(line) {
            Ok(Some(block)) => block,
            Ok(None) => continue,
            Err(err) => {
                log_warn!("import {}:{}: {err}", path.display(), index + 1);
                summary.rejected += 1;
                continue;
            }
        };
        let hash = block.hash();
        match chain.process_block(block).await {
            Ok(true) => summary.orphaned += 1,
            Ok(false) => summary.accepted += 1,
            Err(ChainError::Shutdown) => return Err("chain stopped during import".to_string()),
            Err(err) => {
                log_warn!(
                    "import {}:{}: block {} rejected: {err}",
                    path.display(),
                    index + 1,
                    hash256_to_hex(&hash)
                );
                summary.rejected += 1;
            }
        }
        log_debug!("import {}:{} processed", path.display(), index + 1);
    }
    Ok(summary)
}
