//! On-disk layout of the partitioned dataset.
//!
//! Layout: `{root}/ticker={SYMBOL}/part-{NNNNN}.parquet` plus a `meta.json`
//! sidecar per partition. Symbols are percent-encoded outside
//! `[A-Za-z0-9._^-]` so every symbol maps to exactly one directory name and
//! back.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub const PARTITION_PREFIX: &str = "ticker=";
pub const META_FILE: &str = "meta.json";
pub const PARQUET_EXT: &str = "parquet";

/// Metadata sidecar for one partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionMeta {
    pub symbol: String,
    pub ticker_id: i64,
    pub row_count: usize,
    pub file_count: usize,
    pub first_timestamp: NaiveDateTime,
    pub last_timestamp: NaiveDateTime,
    pub data_hash: String,
    pub written_at: NaiveDateTime,
}

/// Size report for one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionInfo {
    pub ticker: String,
    pub file_count: usize,
    pub size_bytes: u64,
}

impl PartitionInfo {
    pub fn size_kb(&self) -> f64 {
        self.size_bytes as f64 / 1024.0
    }
}

fn is_plain(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-' | b'^')
}

pub fn encode_symbol(symbol: &str) -> String {
    let mut out = String::with_capacity(symbol.len());
    for b in symbol.bytes() {
        if is_plain(b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

pub fn decode_symbol(encoded: &str) -> Option<String> {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = encoded.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// `ticker=ENCODED`
pub fn partition_dir_name(symbol: &str) -> String {
    format!("{PARTITION_PREFIX}{}", encode_symbol(symbol))
}

/// `part-00000.parquet`
pub fn part_file_name(index: usize) -> String {
    format!("part-{index:05}.{PARQUET_EXT}")
}

/// Partition directories under `root`, as `(symbol, path)` sorted by symbol.
pub fn list_partitions(root: &Path) -> Result<Vec<(String, PathBuf)>, StoreError> {
    let mut partitions = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(encoded) = name.strip_prefix(PARTITION_PREFIX) else {
            continue;
        };
        match decode_symbol(encoded) {
            Some(symbol) => partitions.push((symbol, entry.path())),
            None => tracing::warn!(dir = %name, "skipping partition with undecodable name"),
        }
    }
    partitions.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(partitions)
}

/// Parquet files in a partition directory, sorted by file name.
pub fn list_part_files(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some(PARQUET_EXT) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
