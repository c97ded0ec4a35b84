//! Parser throughput profile.
//!
//! ```sh
//! cargo bench --bench parse
//! cargo bench --bench parse -- --kind csi
//! ```

use std::hint::black_box;
use std::time::{Duration, Instant};

#[derive(Clone, Copy)]
enum Kind {
    Ascii,
    Unicode,
    Csi,
    Pathological,
}

impl Kind {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "ascii" => Some(Kind::Ascii),
            "unicode" => Some(Kind::Unicode),
            "csi" => Some(Kind::Csi),
            "pathological" => Some(Kind::Pathological),
            _ => None,
        }
    }

    fn all() -> &'static [Kind] {
        &[Kind::Ascii, Kind::Unicode, Kind::Csi, Kind::Pathological]
    }

    fn label(&self) -> &'static str {
        match self {
            Kind::Ascii => "plain ASCII",
            Kind::Unicode => "UTF-8 text",
            Kind::Csi => "CSI sequences",
            Kind::Pathological => "one byte at a time",
        }
    }

    fn generate(&self, size: usize) -> Vec<u8> {
        match self {
            Kind::Ascii => b"The quick brown fox jumps over the lazy dog. "
                .iter()
                .cycle()
                .take(size)
                .copied()
                .collect(),
            Kind::Unicode => "Hello \u{4e16}\u{754c}! caf\u{e9} \u{3b1}\u{3b2}\u{3b3}. "
                .bytes()
                .cycle()
                .take(size)
                .collect(),
            Kind::Csi => {
                let patterns: &[&[u8]] = &[
                    b"\x1b[A",
                    b"\x1b[10;20H",
                    b"\x1b[38;5;208m",
                    b"\x1b[48;2;100;150;200m",
                    b"\x1b[2J",
                    b"text ",
                ];
                let mut out = Vec::new();
                let mut i = 0;
                while out.len() < size {
                    out.extend_from_slice(patterns[i % patterns.len()]);
                    i += 1;
                }
                out.truncate(size);
                out
            }
            Kind::Pathological => {
                // Every sequence is split so the parser bails with `None`
                // on every other byte and has to resume from scratch.
                let mut out = Vec::new();
                while out.len() < size {
                    out.extend_from_slice(b"\x1b[1;2;3;4;5m");
                }
                out.truncate(size);
                out
            }
        }
    }
}

const ITERATIONS: usize = 2_000;

fn run(data: &[u8]) -> Duration {
    let start = Instant::now();
    for _ in 0..ITERATIONS {
        let data = black_box(data);
        let mut pos = 0;
        while pos < data.len() {
            match fbterm::parse_one(&data[pos..]) {
                Some((n, action)) => {
                    black_box(&action);
                    pos += n;
                }
                // Mirrors how `Terminal::process_buffered` treats an
                // incomplete tail: stop, keep the remainder for next time.
                None => break,
            }
        }
    }
    start.elapsed()
}

fn main() {
    let requested: Vec<Kind> = std::env::args()
        .skip(1)
        .filter_map(|a| Kind::from_str(&a))
        .collect();
    let kinds: &[Kind] = if requested.is_empty() { Kind::all() } else { &requested };

    println!("fbterm parser profile");
    println!("======================\n");

    for kind in kinds {
        let data = kind.generate(64 * 1024);
        let elapsed = run(&data);
        let total_bytes = data.len() * ITERATIONS;
        let throughput = (total_bytes as f64 / 1_000_000.0) / elapsed.as_secs_f64();
        println!("{:<20} {:>8.2} ms  {:>10.2} MB/s", kind.label(), elapsed.as_secs_f64() * 1000.0, throughput);
    }
}
