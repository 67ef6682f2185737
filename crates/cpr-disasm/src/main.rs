use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use cpr_rs::isa::cpr::MAX_INSN_LEN;
use cpr_rs::{ByteSource, DecodeError, Decoded, NameResolver, NoNames, ProcConfig, Processor};
use cpr_disasm::analyze::{analyze_entries, auto_labels, block_edges, block_starts, build_blocks, functions};
use cpr_disasm::model::{load_raw_bin, read_labels, sorted_labels, write_labels, Coverage, Image, LabelKV, Labels};
use cpr_disasm::{Analysis, EdgeOut, FunctionOut};

#[derive(Parser, Debug)]
#[command(author, version, about = "cpr VM disassembler CLI", long_about=None)]
struct Cli {
    /// Load address for the binary in target address space
    #[arg(long, default_value_t = 0u32)]
    base: u32,
    /// Skip N bytes at start of file before loading
    #[arg(long, default_value_t = 0usize)]
    skip: usize,
    /// Input binary path
    #[arg(value_name = "BINFILE")]
    input: String,
    /// Limit bytes loaded (default: to EOF after --skip)
    #[arg(long)]
    len: Option<usize>,
    /// JSON listing configuration (hex style, brackets, comment and data directives)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Colour unresolved addresses with ANSI escapes
    #[arg(long)]
    color: bool,
    /// Subcommand
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List loaded segments (simple single-segment for raw .bin)
    Sections,
    /// Disassemble a range [start, end) in bytes
    Range {
        /// Start address (hex or dec)
        start: String,
        /// End address (hex or dec, exclusive)
        end: String,
        /// Show instruction bytes
        #[arg(long)]
        show_bytes: bool,
        /// Write output to file instead of stdout
        #[arg(long, value_name = "FILE")]
        out: Option<String>,
    },
    /// Analyze code graph from entry points
    Analyze {
        /// Entry addresses (hex or dec). Repeat flag to add multiple entries.
        #[arg(long = "entry", value_name = "ADDR", num_args = 1.., required = false)]
        entries: Vec<String>,
        /// Maximum instructions to decode before stopping
        #[arg(long, default_value_t = 100_000usize)]
        max_instr: usize,
        /// Output format: text or json
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Emit a linear disassembly listing of analyzed code (text format only)
        #[arg(long)]
        listing: bool,
        /// Show instruction bytes in listing
        #[arg(long)]
        show_bytes: bool,
        /// Import labels from JSON (Vec<{ addr, name }>)
        #[arg(long, value_name = "FILE")]
        labels_in: Option<String>,
        /// Export labels to JSON (Vec<{ addr, name }>)
        #[arg(long, value_name = "FILE")]
        labels_out: Option<String>,
        /// Write analysis output to file instead of stdout
        #[arg(long, value_name = "FILE")]
        out: Option<String>,
    },
}

fn parse_u32(s: &str) -> Result<u32> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Ok(u32::from_str_radix(hex, 16)?)
    } else {
        Ok(s.parse::<u32>()?)
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat { Text, Json }

#[derive(Debug, Clone, serde::Serialize)]
struct BlockOut { start: u32, end: u32, insns: Vec<String> }

#[derive(Debug, Clone, serde::Serialize)]
struct ReportWithLabels {
    entries: Vec<u32>,
    blocks: Vec<BlockOut>,
    edges: Vec<EdgeOut>,
    functions: Vec<FunctionOut>,
    labels: Vec<LabelKV>,
}

struct Out<'a> {
    cpu: &'a Processor,
    img: &'a Image,
    names: &'a dyn NameResolver,
    show_bytes: bool,
    color: bool,
}

impl Out<'_> {
    fn insn(&self, d: &Decoded) -> String {
        let line = self.cpu.out_insn(d, self.names);
        let text = if self.color { line.ansi() } else { line.to_string() };
        let mut s = format!("{:#010x}: ", d.address);
        if self.show_bytes {
            for i in 0..d.size as u32 {
                let b = self.img.read_u8(d.address.wrapping_add(i)).unwrap_or(0);
                let _ = write!(s, "{b:02x} ");
            }
            let pad = MAX_INSN_LEN.saturating_sub(d.size as usize) * 3;
            s.push_str(&" ".repeat(pad));
            s.push_str("  ");
        }
        s.push_str(&text);
        s
    }

    fn data(&self, addr: u32, b: u8) -> String {
        let mut s = format!("{addr:#010x}: ");
        if self.show_bytes {
            let _ = write!(s, "{b:02x} {}  ", " ".repeat((MAX_INSN_LEN - 1) * 3));
        }
        s.push_str(&self.cpu.syntax().data(b));
        s
    }
}

fn load_config(path: Option<&Path>) -> Result<ProcConfig> {
    match path {
        Some(p) => Ok(ProcConfig::from_json(&std::fs::read_to_string(p)?)?),
        None => Ok(ProcConfig::default()),
    }
}

fn emit(out: Option<String>, text: &str) -> Result<()> {
    if let Some(path) = out { std::fs::write(path, text)?; } else { print!("{}", text); }
    Ok(())
}

/// Linear sweep; a byte that does not start an instruction is emitted as
/// data and the sweep resumes at the next byte.
fn sweep(o: &Out, start: u32, end: u32) -> String {
    let mut buf = String::new();
    let mut pc = start;
    while pc < end {
        match o.cpu.analyze(o.img, pc) {
            Ok(d) => {
                let _ = writeln!(buf, "{}", o.insn(&d));
                pc = d.next();
                if pc <= d.address { break; }
            }
            Err(DecodeError::Unmapped { .. }) => {
                let _ = writeln!(buf, "{pc:#010x}: {}", o.cpu.syntax().remark("unmapped"));
                break;
            }
            Err(err) => {
                tracing::debug!(%err, "emitting data byte");
                let b = o.img.read_u8(pc).unwrap_or(0);
                let _ = writeln!(buf, "{}", o.data(pc, b));
                pc = pc.wrapping_add(1);
                if pc == 0 { break; }
            }
        }
    }
    buf
}

/// Analyzed instructions in address order; unanalyzed bytes between them
/// are shown as data.
fn listing(o: &Out, a: &Analysis, labels: &Labels) -> String {
    let mut buf = String::new();
    for seg in &o.img.segments {
        let mut cov = Coverage::new(seg);
        let mut in_seg = a.insns.range(seg.base..seg.end()).peekable();
        let Some(&(&first, _)) = in_seg.peek() else { continue };
        let mut last_end = first;
        for (_, d) in in_seg {
            cov.mark(d.address, d.size as u32);
            last_end = last_end.max(d.next().min(seg.end()));
        }
        let mut pc = first;
        while pc < last_end {
            if let Some(lbl) = labels.get(&pc) {
                let _ = writeln!(buf, "{pc:#010x} <{lbl}>:");
            }
            if let Some(d) = a.insns.get(&pc) {
                let _ = writeln!(buf, "  {}", o.insn(d));
                pc = d.next();
            } else {
                if !cov.is_covered(pc) {
                    let b = o.img.read_u8(pc).unwrap_or(0);
                    let _ = writeln!(buf, "  {}", o.data(pc, b));
                }
                pc += 1;
            }
        }
    }
    buf
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_deref())?;
    let cpu = Processor::new(cfg)?;
    let img = load_raw_bin(Path::new(&cli.input), cli.base, cli.skip, cli.len)?;

    match cli.cmd {
        Command::Sections => {
            println!("{:<10} {:<#12} {:<#12} {:<6} {:<6}", "name", "start", "end", "perms", "kind");
            for s in &img.segments {
                println!(
                    "{:<10} {:#010x} {:#010x} {:<6} {:<6}",
                    s.name, s.base, s.end(), s.perms, s.kind
                );
            }
        }
        Command::Range { start, end, show_bytes, out } => {
            let start = parse_u32(&start)?;
            let end = parse_u32(&end)?;
            anyhow::ensure!(end >= start, "end must be >= start");
            let o = Out { cpu: &cpu, img: &img, names: &NoNames, show_bytes, color: cli.color };
            emit(out, &sweep(&o, start, end))?;
        }
        Command::Analyze { entries, max_instr, format, listing: want_listing, show_bytes, labels_in, labels_out, out } => {
            // default seed: start of first segment
            let mut seeds: Vec<u32> = if entries.is_empty() {
                img.segments.first().map(|s| s.base).into_iter().collect()
            } else {
                entries.iter().map(|e| parse_u32(e)).collect::<Result<_>>()?
            };
            seeds.sort_unstable();
            seeds.dedup();
            let a = analyze_entries(&cpu, &img, &seeds, max_instr);
            let roots = a.function_roots(&seeds);

            let starts = block_starts(&a, &roots);
            let (blocks, addr_to_block) = build_blocks(&a, &starts);
            let edges_out = block_edges(&a, &addr_to_block);
            let funcs = functions(&roots, &edges_out);

            let mut labels: Labels = match &labels_in {
                Some(path) => read_labels(Path::new(path))?,
                None => Labels::new(),
            };
            auto_labels(&mut labels, &roots, &blocks, &a);
            if let Some(path) = &labels_out { write_labels(Path::new(path), &labels)?; }

            let o = Out { cpu: &cpu, img: &img, names: &labels, show_bytes, color: cli.color };
            match format {
                OutputFormat::Json => {
                    let report_blocks = blocks.iter().map(|b| BlockOut {
                        start: b.start,
                        end: b.end,
                        insns: a.insns.range(b.start..b.end).map(|(_, d)| o.insn(d)).collect(),
                    }).collect();
                    let report = ReportWithLabels {
                        entries: seeds.clone(),
                        blocks: report_blocks,
                        edges: edges_out,
                        functions: funcs,
                        labels: sorted_labels(&labels),
                    };
                    let mut json = serde_json::to_string_pretty(&report)?;
                    json.push('\n');
                    emit(out, &json)?;
                }
                OutputFormat::Text => {
                    let mut buf = String::new();
                    let _ = writeln!(buf, "Analysis summary:");
                    let _ = writeln!(buf, "  entries   : {:?}", seeds.iter().map(|a| format!("{a:#010x}")).collect::<Vec<_>>());
                    let _ = writeln!(buf, "  insts     : {}", a.insns.len());
                    let _ = writeln!(buf, "  data      : {}", a.data.len());
                    let _ = writeln!(buf, "  blocks    : {}", blocks.len());
                    let _ = writeln!(buf, "  edges     : {}", a.edges.len());
                    let _ = writeln!(buf, "  functions : {}", funcs.len());
                    let _ = writeln!(buf, "Edges:");
                    for e in &edges_out {
                        let _ = writeln!(buf, "  {:#010x} -> {:#010x} ({})", e.from, e.to, e.kind);
                    }
                    if want_listing {
                        let _ = writeln!(buf, "\nListing (analyzed PCs):");
                        buf.push_str(&listing(&o, &a, &labels));
                    }
                    emit(out, &buf)?;
                }
            }
        }
    }

    Ok(())
}
