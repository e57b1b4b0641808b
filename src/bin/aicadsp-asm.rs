//! The DSP assembler packs directives produced by
//! [aicadsp-cc](../aicadsp_cc/index.html) (or written by hand) into the
//! flat memory image the AICA DSP consumes.
//!
//! # Input format
//!
//! One directive per line; blank lines and `#`/`//` comments are
//! skipped. Directive names are case-insensitive, integers are decimal
//! or `0x` hex.
//!
//! * `MPRO[i] = <fields>`: microcode step `i`, as a space-separated
//!   list of its non-zero bit-fields. A bare field name sets a one-bit
//!   field; `NAME:value` gives a wider field its value.
//! * `COEF[i] = value`: coefficient RAM entry, signed 16 bit.
//! * `MADRS[i] = value`: memory-address RAM entry, unsigned 16 bit.
//! * `TEMP[i] = value`: temp RAM initial value.
//!
//! # Output format
//!
//! A flat little-endian image of all four RAM banks:
//!
//! ```text
//! Offset  Size   Contents
//! 0x000   0x400  MPRO: 128 x 64-bit step words
//! 0x400   0x100  COEF: 128 x signed 16-bit coefficients
//! 0x500   0x080  MADRS: 64 x unsigned 16-bit addresses
//! 0x580   0x200  TEMP: 128 x unsigned 32-bit initial values
//! ```
extern crate aicadsp;
extern crate docopt;
#[macro_use]
extern crate serde_derive;

use std::fs::File;
use std::io::BufReader;
use std::process;

use docopt::Docopt;

use aicadsp::program::Image;

const USAGE: &'static str = "
AICA DSP assembler.

Packs aicadsp-cc directives into a binary DSP image.

Usage:
  aicadsp-asm <input> <output>
  aicadsp-asm --help

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

    let image = Image::load(&mut BufReader::new(input)).unwrap_or_else(|e| {
        eprintln!("Assembler error: {}", e);
        process::exit(1);
    });

    let mut output = File::create(&args.arg_output).unwrap_or_else(|e| {
        eprintln!("Can't open output file {}: {}", args.arg_output, e);
        process::exit(1);
    });

    image.save(&mut output).unwrap_or_else(|e| {
        eprintln!("Can't write output: {}", e);
        process::exit(1);
    });
}
