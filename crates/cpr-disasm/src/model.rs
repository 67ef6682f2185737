use anyhow::Result;
use std::collections::HashMap;
use std::path::Path;

use bitvec::prelude::*;
use cpr_rs::ByteSource;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct Segment {
    pub name: String,
    pub base: u32,
    pub bytes: Vec<u8>,
    pub perms: &'static str, // e.g., "r-x"
    pub kind: &'static str,  // e.g., "raw"
}

impl Segment {
    pub fn end(&self) -> u32 {
        self.base.wrapping_add(self.bytes.len() as u32)
    }

    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.base && addr < self.end()
    }
}

#[derive(Debug, Clone)]
pub struct Image {
    pub segments: Vec<Segment>,
}

impl Image {
    pub fn single(base: u32, bytes: Vec<u8>) -> Self {
        let seg = Segment { name: "segment0".into(), base, bytes, perms: "r-x", kind: "raw" };
        Image { segments: vec![seg] }
    }

    pub fn segment_of(&self, addr: u32) -> Option<&Segment> {
        self.segments.iter().find(|s| s.contains(addr))
    }
}

impl ByteSource for Image {
    fn read_u8(&self, addr: u32) -> Option<u8> {
        let s = self.segment_of(addr)?;
        Some(s.bytes[(addr - s.base) as usize])
    }
}

pub fn load_raw_bin(path: &Path, base: u32, skip: usize, len: Option<usize>) -> Result<Image> {
    let file = std::fs::read(path)?;
    anyhow::ensure!(skip <= file.len(), "--skip exceeds file size");
    let mut payload = &file[skip..];
    if let Some(lim) = len {
        anyhow::ensure!(lim <= payload.len(), "--len exceeds remaining file size after skip");
        payload = &payload[..lim];
    }
    anyhow::ensure!(
        base.checked_add(payload.len() as u32).is_some(),
        "image does not fit in the 32-bit address space at {base:#010x}"
    );
    Ok(Image::single(base, payload.to_vec()))
}

pub fn is_mapped(img: &Image, addr: u32) -> bool {
    img.segment_of(addr).is_some()
}

/// Which bytes of a segment belong to a decoded instruction.
pub struct Coverage {
    base: u32,
    bits: BitVec,
}

impl Coverage {
    pub fn new(seg: &Segment) -> Self {
        Self { base: seg.base, bits: bitvec![0; seg.bytes.len()] }
    }

    pub fn mark(&mut self, addr: u32, len: u32) {
        let Some(start) = addr.checked_sub(self.base) else { return };
        let start = start as usize;
        let end = (start + len as usize).min(self.bits.len());
        if start < end {
            self.bits[start..end].fill(true);
        }
    }

    pub fn is_covered(&self, addr: u32) -> bool {
        addr.checked_sub(self.base)
            .and_then(|off| self.bits.get(off as usize).map(|b| *b))
            .unwrap_or(false)
    }

    pub fn count(&self) -> usize {
        self.bits.count_ones()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelKV { pub addr: u32, pub name: String }

pub type Labels = HashMap<u32, String>;

pub fn read_labels(path: &Path) -> Result<Labels> {
    let txt = std::fs::read_to_string(path)?;
    let v: Vec<LabelKV> = serde_json::from_str(&txt)?;
    Ok(v.into_iter().map(|kv| (kv.addr, kv.name)).collect())
}

pub fn sorted_labels(labels: &Labels) -> Vec<LabelKV> {
    let mut v: Vec<LabelKV> = labels.iter().map(|(k, n)| LabelKV { addr: *k, name: n.clone() }).collect();
    v.sort_by_key(|kv| kv.addr);
    v
}

pub fn write_labels(path: &Path, labels: &Labels) -> Result<()> {
    std::fs::write(path, serde_json::to_string_pretty(&sorted_labels(labels))?)?;
    Ok(())
}
