//! C12: ingestion adapters. Parses the CSV/text input formats of spec.md
//! §4.12 into the core's types.
//!
//! Grounded on `original_source/data/fileinfo.go` (`NewFileInfos`,
//! `LoadFromLBHistory`) and `lb/storage.go`'s deliver/purge CSV readers.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::Deserialize;

use cdnsim_core::catalogue::{FileCatalogue, FileInfo};
use cdnsim_core::{DeliverEvent, PurgeEvent};

#[derive(Debug, Deserialize)]
struct FileInfoRow {
    id: i64,
    filename: String,
    bitrate: i64,
    size: i64,
    #[serde(rename = "registerTime")]
    register_time: String,
}

fn parse_naive(s: &str, fmt: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, fmt).with_context(|| format!("bad timestamp {s:?} (expected {fmt})"))
}

/// Loads the file catalogue CSV (`id,filename,bitrate,size,registerTime`)
/// fully before the run starts. Fatal on any malformed row.
pub fn load_catalogue(path: &Path) -> Result<FileCatalogue> {
    let mut cat = FileCatalogue::new();
    let mut rdr = csv::Reader::from_path(path).with_context(|| format!("opening catalogue csv {path:?}"))?;
    for row in rdr.deserialize() {
        let row: FileInfoRow = row.with_context(|| format!("parsing catalogue csv {path:?}"))?;
        let register_time = parse_naive(&row.register_time, "%Y-%m-%dT%H:%M:%S")?;
        cat.register(FileInfo {
            id: row.id,
            filename: row.filename,
            size: row.size,
            bitrate: row.bitrate,
            register_time,
        });
    }
    Ok(cat)
}

/// Loads the "hitcount history" initial resident-content listing: one
/// filename per line, first line is a header and is skipped.
pub fn load_resident_list(path: &Path) -> Result<Vec<String>> {
    let f = File::open(path).with_context(|| format!("opening resident content file {path:?}"))?;
    let reader = BufReader::new(f);
    let mut out = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("reading resident content file {path:?}"))?;
        if i == 0 {
            continue;
        }
        let name = line.trim();
        if !name.is_empty() {
            out.push(name.to_string());
        }
    }
    Ok(out)
}

#[derive(Debug, Deserialize)]
struct DeliverRow {
    #[serde(rename = "endTime")]
    end_time: String,
    filename: String,
    filesize: i64,
}

/// Loads the deliver-events CSV (`endTime,filename,filesize`).
pub fn load_deliver(path: &Path) -> Result<Vec<DeliverEvent>> {
    let mut rdr = csv::Reader::from_path(path).with_context(|| format!("opening deliver csv {path:?}"))?;
    let mut out = Vec::new();
    for row in rdr.deserialize() {
        let row: DeliverRow = row.with_context(|| format!("parsing deliver csv {path:?}"))?;
        let time = parse_naive(&row.end_time, "%Y-%m-%dT%H:%M:%S")?;
        out.push(DeliverEvent {
            time,
            filename: row.filename,
            filesize: row.filesize,
        });
    }
    Ok(out)
}

#[derive(Debug, Deserialize)]
struct PurgeRow {
    date: String,
    time: String,
    filename: String,
}

/// Loads the purge-events CSV (`date,time,filename`), joining `date` and
/// `time` into one timestamp.
pub fn load_purge(path: &Path) -> Result<Vec<PurgeEvent>> {
    let mut rdr = csv::Reader::from_path(path).with_context(|| format!("opening purge csv {path:?}"))?;
    let mut out = Vec::new();
    for row in rdr.deserialize() {
        let row: PurgeRow = row.with_context(|| format!("parsing purge csv {path:?}"))?;
        let joined = format!("{} {}", row.date, row.time);
        let time = parse_naive(&joined, "%Y-%m-%d %H:%M:%S")?;
        out.push(PurgeEvent {
            time,
            filename: row.filename,
        });
    }
    Ok(out)
}

/// Loads the bypass list: plain text, one filename per line.
pub fn load_bypass_list(path: &Path) -> Result<std::collections::HashSet<String>> {
    let f = File::open(path).with_context(|| format!("opening bypass list {path:?}"))?;
    let reader = BufReader::new(f);
    let mut out = std::collections::HashSet::new();
    for line in reader.lines() {
        let line = line.with_context(|| format!("reading bypass list {path:?}"))?;
        let name = line.trim();
        if !name.is_empty() {
            out.insert(name.to_string());
        }
    }
    Ok(out)
}
