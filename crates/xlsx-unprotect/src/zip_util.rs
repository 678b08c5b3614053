use std::io::Read;

use crate::ArchiveOpenError;

/// Default maximum uncompressed size permitted for any single ZIP part inflated into memory.
///
/// Guardrail against ZIP bombs (tiny compressed size, huge uncompressed size) and forged ZIP
/// metadata (e.g. an incorrect `uncompressed_size` field).
pub const DEFAULT_MAX_ZIP_PART_BYTES: u64 = 256 * 1024 * 1024; // 256MiB

/// Default maximum total uncompressed bytes permitted across all parts of one package.
pub const DEFAULT_MAX_ZIP_TOTAL_BYTES: u64 = 512 * 1024 * 1024; // 512MiB

/// Inflation limits applied while reading a package into memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_part_bytes: u64,
    pub max_total_bytes: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_part_bytes: DEFAULT_MAX_ZIP_PART_BYTES,
            max_total_bytes: DEFAULT_MAX_ZIP_TOTAL_BYTES,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ZipInflateBudget {
    max_total_bytes: u64,
    used_bytes: u64,
}

impl ZipInflateBudget {
    pub(crate) fn new(max_total_bytes: u64) -> Self {
        Self {
            max_total_bytes,
            used_bytes: 0,
        }
    }

    fn remaining_bytes(&self) -> u64 {
        self.max_total_bytes.saturating_sub(self.used_bytes)
    }

    fn consume(&mut self, bytes: u64) -> Result<(), ArchiveOpenError> {
        self.used_bytes = self.used_bytes.saturating_add(bytes);
        if self.used_bytes > self.max_total_bytes {
            return Err(ArchiveOpenError::PackageTooLarge {
                total: self.used_bytes,
                max: self.max_total_bytes,
            });
        }
        Ok(())
    }
}

/// Inflate one ZIP entry into memory, charging it against `budget`.
///
/// `declared_size` (the entry's `uncompressed_size`) is only used as a fast-path rejection. The
/// read itself is capped at `limit + 1` bytes so forged metadata cannot force a larger
/// allocation.
pub(crate) fn read_entry_with_budget<R: Read>(
    entry: R,
    declared_size: u64,
    part: &str,
    max_part_bytes: u64,
    budget: &mut ZipInflateBudget,
) -> Result<Vec<u8>, ArchiveOpenError> {
    if declared_size > max_part_bytes {
        return Err(ArchiveOpenError::PartTooLarge {
            part: part.to_string(),
            size: declared_size,
            max: max_part_bytes,
        });
    }

    let remaining_total = budget.remaining_bytes();
    let effective_max = max_part_bytes.min(remaining_total);
    let limit_is_total = effective_max < max_part_bytes;
    if limit_is_total && declared_size > effective_max {
        return Err(ArchiveOpenError::PackageTooLarge {
            total: budget.used_bytes.saturating_add(declared_size),
            max: budget.max_total_bytes,
        });
    }

    let mut buf = Vec::new();
    entry
        .take(effective_max.saturating_add(1))
        .read_to_end(&mut buf)?;

    let observed = buf.len() as u64;
    if observed > effective_max {
        if limit_is_total {
            return Err(ArchiveOpenError::PackageTooLarge {
                total: budget.used_bytes.saturating_add(observed),
                max: budget.max_total_bytes,
            });
        }
        return Err(ArchiveOpenError::PartTooLarge {
            part: part.to_string(),
            size: observed,
            max: max_part_bytes,
        });
    }

    budget.consume(observed)?;
    Ok(buf)
}

/// Normalize a ZIP entry name to an OPC-style part path with forward-slash separators.
pub(crate) fn normalize_part_name(name: &str) -> String {
    name.replace('\\', "/")
}
