use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use serde::Serialize;
use tracing::debug;

use cpr_rs::{Decoded, Processor, Xref, XrefKind};

use crate::model::{Image, Labels, is_mapped};

/// Result of exploring code from a set of entry points.
#[derive(Debug, Default)]
pub struct Analysis {
    pub insns: BTreeMap<u32, Decoded>,
    pub edges: Vec<Xref>,
    /// Reached addresses that did not decode.
    pub data: BTreeSet<u32>,
    /// Mapped targets of call instructions.
    pub call_targets: BTreeSet<u32>,
    jump_sources: HashSet<u32>,
    flow_sources: HashSet<u32>,
}

impl Analysis {
    fn record(&mut self, x: Xref) {
        match x.kind {
            XrefKind::Jump => self.jump_sources.insert(x.from),
            XrefKind::Flow => self.flow_sources.insert(x.from),
        };
        self.edges.push(x);
    }

    pub fn is_jump_source(&self, pc: u32) -> bool {
        self.jump_sources.contains(&pc)
    }

    pub fn falls_through(&self, pc: u32) -> bool {
        self.flow_sources.contains(&pc)
    }

    /// Seeds first, then every decoded call target not already a seed.
    pub fn function_roots(&self, seeds: &[u32]) -> Vec<u32> {
        let mut seen: HashSet<u32> = seeds.iter().copied().collect();
        let mut roots = seeds.to_vec();
        for &t in &self.call_targets {
            if self.insns.contains_key(&t) && seen.insert(t) { roots.push(t); }
        }
        roots
    }
}

/// Worklist exploration: decode, follow every emitted edge into mapped memory.
pub fn analyze_entries(cpu: &Processor, img: &Image, entries: &[u32], max_instr: usize) -> Analysis {
    let mut out = Analysis::default();
    let mut queue: VecDeque<u32> = VecDeque::new();
    let mut visited: HashSet<u32> = HashSet::new();
    for &e in entries { if is_mapped(img, e) { queue.push_back(e); } }
    while let Some(pc) = queue.pop_front() {
        if out.insns.len() >= max_instr { break; }
        if !visited.insert(pc) { continue; }
        let d = match cpu.analyze(img, pc) {
            Ok(d) => d,
            Err(err) => {
                debug!(%err, "stopping path");
                out.data.insert(pc);
                continue;
            }
        };
        let is_call = cpu.desc(d.itype).is_some_and(|desc| desc.is_call());
        for x in cpu.emulate(&d) {
            let mapped = is_mapped(img, x.to);
            if mapped && is_call && x.kind == XrefKind::Jump { out.call_targets.insert(x.to); }
            if mapped && !visited.contains(&x.to) { queue.push_back(x.to); }
            out.record(x);
        }
        out.insns.insert(pc, d);
    }
    out
}

#[derive(Debug, Clone, Serialize)]
pub struct Block { pub start: u32, pub end: u32 }

#[derive(Debug, Clone, Serialize)]
pub struct EdgeOut { pub from: u32, pub to: u32, pub kind: String }

#[derive(Debug, Clone, Serialize)]
pub struct FunctionOut { pub entry: u32, pub blocks: Vec<u32> }

/// Block starts are the seeds plus every edge target that begins a
/// fallthrough break: jump targets and the instruction after a jump.
pub fn block_starts(a: &Analysis, seeds: &[u32]) -> BTreeSet<u32> {
    let mut starts: BTreeSet<u32> = seeds.iter().copied().collect();
    for e in &a.edges {
        if e.kind == XrefKind::Jump || a.is_jump_source(e.from) { starts.insert(e.to); }
    }
    starts.retain(|s| a.insns.contains_key(s));
    starts
}

/// Linear sweep from each start until the next start, a jump, a stop or a gap.
pub fn build_blocks(a: &Analysis, starts: &BTreeSet<u32>) -> (Vec<Block>, HashMap<u32, u32>) {
    let mut blocks: Vec<Block> = Vec::new();
    let mut addr_to_block: HashMap<u32, u32> = HashMap::new(); // pc -> block start
    for &start in starts {
        if addr_to_block.contains_key(&start) { continue; }
        let mut cur = start;
        loop {
            let Some(d) = a.insns.get(&cur) else { break };
            addr_to_block.insert(cur, start);
            let next = d.next();
            let should_end = !a.falls_through(cur)
                || a.is_jump_source(cur)
                || !a.insns.contains_key(&next)
                || starts.contains(&next)
                || next <= cur;
            if should_end {
                blocks.push(Block { start, end: next });
                break;
            }
            cur = next;
        }
    }
    (blocks, addr_to_block)
}

pub fn block_edges(a: &Analysis, addr_to_block: &HashMap<u32, u32>) -> Vec<EdgeOut> {
    let mut out: Vec<EdgeOut> = Vec::new();
    for e in &a.edges {
        let from = *addr_to_block.get(&e.from).unwrap_or(&e.from);
        let (to, inner) = match addr_to_block.get(&e.to) {
            Some(&b) => (b, b == from && e.kind == XrefKind::Flow),
            None => (e.to, false),
        };
        if inner { continue; }
        let kind = match e.kind { XrefKind::Flow => "ft", XrefKind::Jump => "br" }.to_string();
        out.push(EdgeOut { from, to, kind });
    }
    out
}

/// Each seed is a function root; its body is every block reachable from it.
pub fn functions(seeds: &[u32], edges: &[EdgeOut]) -> Vec<FunctionOut> {
    let mut adj: HashMap<u32, Vec<u32>> = HashMap::new();
    for e in edges { adj.entry(e.from).or_default().push(e.to); }
    let mut out = Vec::new();
    for &entry in seeds {
        let mut seen: HashSet<u32> = HashSet::new();
        let mut q = VecDeque::new();
        q.push_back(entry);
        while let Some(b) = q.pop_front() {
            if !seen.insert(b) { continue; }
            if let Some(nexts) = adj.get(&b) {
                for &n in nexts { q.push_back(n); }
            }
        }
        let mut blks: Vec<u32> = seen.into_iter().collect();
        blks.sort_unstable();
        out.push(FunctionOut { entry, blocks: blks });
    }
    out
}

/// Fill in `sub_`/`loc_` names without overriding imported ones. `roots`
/// are the function entries (see [`Analysis::function_roots`]).
pub fn auto_labels(labels: &mut Labels, roots: &[u32], blocks: &[Block], a: &Analysis) {
    for &e in roots { labels.entry(e).or_insert_with(|| format!("sub_{e:08x}")); }
    for b in blocks { labels.entry(b.start).or_insert_with(|| format!("loc_{:08x}", b.start)); }
    for e in &a.edges {
        if e.kind == XrefKind::Jump && a.insns.contains_key(&e.to) {
            labels.entry(e.to).or_insert_with(|| format!("loc_{:08x}", e.to));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpr_rs::ProcConfig;

    fn cpu() -> Processor { Processor::new(ProcConfig::default()).unwrap() }

    // 0x00: mov r0, 3        (11 00 03 00 00 00)
    // 0x06: dec r0           (29 00)
    // 0x08: jnz 0x0006       (42 06 00)
    // 0x0b: halt             (01)
    // 0x0c: <garbage>        (ff)
    fn loop_image() -> Image {
        Image::single(0, vec![0x11, 0x00, 0x03, 0x00, 0x00, 0x00, 0x29, 0x00, 0x42, 0x06, 0x00, 0x01, 0xff])
    }

    #[test]
    fn loop_edges_and_blocking() {
        let img = loop_image();
        let cpu = cpu();
        let a = analyze_entries(&cpu, &img, &[0], 100);
        assert_eq!(a.insns.keys().copied().collect::<Vec<_>>(), vec![0x0, 0x6, 0x8, 0xb]);
        assert!(a.edges.contains(&Xref { from: 0x8, to: 0x6, kind: XrefKind::Jump }));
        assert!(a.edges.contains(&Xref { from: 0x8, to: 0xb, kind: XrefKind::Flow }));
        // halt ends the path, so the trailing byte is never reached
        assert!(a.data.is_empty());

        let starts = block_starts(&a, &[0]);
        assert_eq!(starts.iter().copied().collect::<Vec<_>>(), vec![0x0, 0x6, 0xb]);
        let (blocks, map) = build_blocks(&a, &starts);
        let spans: Vec<(u32, u32)> = blocks.iter().map(|b| (b.start, b.end)).collect();
        assert_eq!(spans, vec![(0x0, 0x6), (0x6, 0xb), (0xb, 0xc)]);
        assert_eq!(map[&0x8], 0x6);

        let edges = block_edges(&a, &map);
        assert!(edges.iter().any(|e| e.from == 0x6 && e.to == 0x6 && e.kind == "br"));
        assert!(edges.iter().any(|e| e.from == 0x0 && e.to == 0x6 && e.kind == "ft"));
        let funcs = functions(&[0], &edges);
        assert_eq!(funcs[0].blocks, vec![0x0, 0x6, 0xb]);
    }

    #[test]
    fn undecodable_target_is_recorded_as_data() {
        // jmp 0x0004 ; <1 byte gap> ; 0xee is not an opcode
        let img = Image::single(0, vec![0x40, 0x04, 0x00, 0x00, 0xee]);
        let a = analyze_entries(&cpu(), &img, &[0], 100);
        assert_eq!(a.insns.len(), 1);
        assert!(a.data.contains(&4));
    }

    #[test]
    fn max_instr_caps_exploration() {
        let img = Image::single(0, vec![0x00; 32]);
        let a = analyze_entries(&cpu(), &img, &[0], 5);
        assert_eq!(a.insns.len(), 5);
    }

    #[test]
    fn imported_labels_win() {
        let img = loop_image();
        let a = analyze_entries(&cpu(), &img, &[0], 100);
        let starts = block_starts(&a, &[0]);
        let (blocks, _) = build_blocks(&a, &starts);
        let mut labels = Labels::new();
        labels.insert(0x6, "again".into());
        auto_labels(&mut labels, &[0], &blocks, &a);
        assert_eq!(labels[&0x0], "sub_00000000");
        assert_eq!(labels[&0x6], "again");
        assert_eq!(labels[&0xb], "loc_0000000b");
    }

    #[test]
    fn call_targets_become_functions() {
        // 0x0: call 0x0005 ; 0x3: halt ; 0x4: nop ; 0x5: inc r0 ; 0x7: ret
        let img = Image::single(0, vec![0x45, 0x05, 0x00, 0x01, 0x00, 0x28, 0x00, 0x02]);
        let cpu = cpu();
        let a = analyze_entries(&cpu, &img, &[0], 100);
        assert_eq!(a.call_targets.iter().copied().collect::<Vec<_>>(), vec![0x5]);

        let roots = a.function_roots(&[0]);
        assert_eq!(roots, vec![0x0, 0x5]);
        let starts = block_starts(&a, &roots);
        let (blocks, map) = build_blocks(&a, &starts);
        let funcs = functions(&roots, &block_edges(&a, &map));
        assert_eq!(funcs.len(), 2);
        assert_eq!(funcs[1].entry, 0x5);
        assert_eq!(funcs[1].blocks, vec![0x5]);

        let mut labels = Labels::new();
        auto_labels(&mut labels, &roots, &blocks, &a);
        assert_eq!(labels[&0x5], "sub_00000005");
        assert_eq!(labels[&0x3], "loc_00000003");
    }

    #[test]
    fn unmapped_call_target_is_not_a_root() {
        // vm_call 0x00001000 ; halt
        let img = Image::single(0, vec![0x47, 0x00, 0x10, 0x00, 0x00, 0x01]);
        let a = analyze_entries(&cpu(), &img, &[0], 100);
        assert!(a.call_targets.is_empty());
        assert_eq!(a.function_roots(&[0]), vec![0x0]);
    }

    #[test]
    fn long_straight_line_is_one_block() {
        const N: u32 = 200_000;
        let mut bytes = vec![0x00; N as usize];
        bytes.push(0x01);
        let img = Image::single(0, bytes);
        let a = analyze_entries(&cpu(), &img, &[0], usize::MAX);
        assert_eq!(a.insns.len(), N as usize + 1);
        assert!(a.falls_through(0) && !a.is_jump_source(0));

        let starts = block_starts(&a, &[0]);
        assert_eq!(starts.len(), 1);
        let (blocks, map) = build_blocks(&a, &starts);
        assert_eq!(blocks.len(), 1);
        assert_eq!((blocks[0].start, blocks[0].end), (0, N + 1));
        assert_eq!(map.len(), N as usize + 1);
        assert!(block_edges(&a, &map).is_empty());
    }
}
