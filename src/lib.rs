//! Library for compiling and assembling programs for the AICA sound DSP.
//!
//! The toolchain has two stages, mirrored by the two binaries shipped
//! with this crate: `aicadsp-cc` compiles the high-level description
//! language into assembler directives, and `aicadsp-asm` packs those
//! directives into the flat memory image the DSP consumes.

#[macro_use]
extern crate lazy_static;
extern crate regex;

pub mod masks;
pub mod util;
pub mod program;
pub mod compile;
pub mod opt;
