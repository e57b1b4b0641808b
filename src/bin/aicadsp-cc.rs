//! The DSP program compiler takes a program in the description language
//! below and outputs directives for
//! [aicadsp-asm](../aicadsp_asm/index.html).
//!
//! # What a DSP program is
//!
//! The AICA's effect DSP runs a fixed microcode of 128 steps, once per
//! audio sample. There are no branches; every step is a 64-bit word that
//! directly drives the multiply-accumulate unit, the temp ring buffer,
//! the MEMS sample registers and the external memory port. Writing those
//! words by hand is painful, so this compiler lowers a small statement
//! language onto them.
//!
//! # Input format
//!
//! One statement per line. Keywords are case-insensitive, integers are
//! decimal or `0x` hex, and comments start with `#` or `//`. The
//! compiler does not expand macros itself; run the input through a C
//! preprocessor first if you want them.
//!
//! * `MADRS[n] = value`: define an entry of the memory-address table.
//! * `INPUT mems:n` (or `mixer:n`, `cdda:n`): select the register read
//!   by the following statements.
//! * `OUTPUT yreg`: latch the selected input into YREG.
//! * `OUTPUT adrs` / `OUTPUT adrs/s`: load the ADRS offset register,
//!   from the shifted accumulator or from the selected input.
//! * `OUTPUT mixer:n`: write the shifted accumulator to an output mixer
//!   channel.
//! * `SMODE sat|sat2|trim|trim2`: set the shift/saturate mode used by
//!   the following statements.
//! * `ST [temp:n]`: store the shifted accumulator into temp RAM.
//! * `ST addr` / `STF addr`: store to external memory, as integer or
//!   float. `addr` is `madrs:n`, optionally followed by `+`
//!   (post-increment) and `/s` (add ADRS), the whole thing optionally
//!   bracketed to address relative to the sample counter.
//! * `LD addr, mems:n` / `LDF addr, mems:n`: read external memory into
//!   a MEMS register. The value arrives two steps after the read is
//!   issued; the compiler schedules that for you.
//! * `MAC x, y[, b]`: accumulate `x * y + b`. `x` is `input` or
//!   `[temp:n]`; `y` is `yreg:hi`, `yreg:lo`, `shifted:hi`,
//!   `shifted:lo` or an immediate `#value` coefficient; `b` is `acc` or
//!   `[temp:n]`, optionally negated with a leading `-`, or omitted for
//!   zero.
//!
//! A one-tap echo, for example:
//!
//! ```text
//! MADRS[0] = 0x3000
//! INPUT mixer:0
//! MAC input, #0x0800
//! ST [temp:0]
//! LD [madrs:0+], mems:0
//! INPUT mems:0
//! MAC input, #0x0400, acc
//! OUTPUT mixer:0
//! ```
//!
//! # Output format
//!
//! `MADRS[n] = value` lines are passed through. Every microcode step
//! becomes an `MPRO[i] = <fields>` line listing its non-zero bit-fields,
//! preceded by a `COEF[i] = value` line when the step has a coefficient
//! attached. The companion assembler packs these directives into the
//! binary image.
//!
//! Memory accesses must sit on odd step indices, and a read needs its
//! MEMS write exactly two steps later. The compiler pads with no-op
//! steps to satisfy both rules. It then hoists read setups backward so
//! the read latency hides behind useful work, and deletes leftover
//! padding in pairs, which keeps the alignment intact.
extern crate aicadsp;
extern crate docopt;
#[macro_use]
extern crate serde_derive;

use std::fs::File;
use std::io::BufReader;
use std::process;

use docopt::Docopt;

use aicadsp::compile::compile;
use aicadsp::opt;

const USAGE: &'static str = "
AICA DSP program compiler.

Takes a DSP program description and outputs directives for aicadsp-asm.

Usage:
  aicadsp-cc <input> <output>
  aicadsp-cc --help

Options:
  -h --help    Show this screen.
";

#[derive(Debug, Deserialize)]
struct Args {
    arg_input: String,
    arg_output: String,
}

fn main() {
    let args: Args = Docopt::new(USAGE)
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    let input = File::open(&args.arg_input).unwrap_or_else(|e| {
        eprintln!("Can't open input file {}: {}", args.arg_input, e);
        process::exit(1);
    });

    let mut program = compile(BufReader::new(input)).unwrap_or_else(|e| {
        eprintln!("{}", e);
        process::exit(1);
    });
    opt::optimize(&mut program);

    let mut output = File::create(&args.arg_output).unwrap_or_else(|e| {
        eprintln!("Can't open output file {}: {}", args.arg_output, e);
        process::exit(1);
    });

    program.save(&mut output).unwrap_or_else(|e| {
        eprintln!("Can't write output: {}", e);
        process::exit(1);
    });
}
