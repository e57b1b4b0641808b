//! In-memory representation of a compiled DSP program and of the final
//! memory image.
//!
//! `DspProgram` is what the compiler produces: the raw step words plus
//! their attached coefficients and the MADRS table definitions. `Image`
//! is what the DSP consumes: the four RAM banks, fully packed.

use std::error;
use std::fmt::{self, Display, Formatter};
use std::io::{self, BufRead, Write};

use regex::Regex;

use masks;
use util;

/// Number of microcode steps the DSP executes per sample.
pub const MPRO_STEPS: usize = 128;
/// Number of coefficient RAM entries.
pub const COEF_SIZE: usize = 128;
/// Number of memory-address RAM entries.
pub const MADRS_SIZE: usize = 64;
/// Number of temp RAM cells.
pub const TEMP_SIZE: usize = 128;

/// A compiled DSP program, before assembly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DspProgram {
    /// The microcode step words.
    pub steps: Vec<u64>,
    /// Coefficient attached to each step, 0 where absent. Values are
    /// stored pre-shifted, exactly as the hardware reads them.
    pub coefs: Vec<i16>,
    /// MADRS table definitions, one directive per line.
    pub madrs: Vec<String>,
}

impl DspProgram {
    /// Create a new empty program.
    pub fn new() -> DspProgram {
        Default::default()
    }

    /// Write the program in the assembler's input language.
    ///
    /// MADRS definitions come first, then one MPRO directive per step,
    /// preceded by a COEF directive where a coefficient is attached.
    /// Only non-zero fields are listed; single-bit fields appear as a
    /// bare name, wider fields as `NAME:value`.
    pub fn save<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for line in &self.madrs {
            writeln!(out, "{}", line)?;
        }
        for (i, &step) in self.steps.iter().enumerate() {
            if self.coefs[i] != 0 {
                writeln!(out, "COEF[{}] = {}", i, self.coefs[i])?;
            }
            write!(out, "MPRO[{}] =", i)?;
            for field in masks::FIELDS {
                let value = field.get(step);
                if value == 0 {
                    continue;
                }
                if field.is_flag() {
                    write!(out, " {}", field.name)?;
                } else {
                    write!(out, " {}:{}", field.name, value)?;
                }
            }
            writeln!(out, "")?;
        }
        Ok(())
    }
}

/// Error that may arise while assembling directives into an image.
#[derive(Debug)]
pub enum AsmError {
    /// A line that is not a known directive.
    InvalidLine(String),
    /// An MPRO directive names a field that does not exist.
    UnknownField(String),
    /// An index or value does not fit its destination.
    OutOfRange(String),
    /// Underlying IO error.
    Io(io::Error),
}

impl Display for AsmError {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        match *self {
            AsmError::InvalidLine(ref l) => write!(fmt, "invalid line: {}", l),
            AsmError::UnknownField(ref f) => write!(fmt, "unknown field: {}", f),
            AsmError::OutOfRange(ref w) => write!(fmt, "out of range: {}", w),
            AsmError::Io(ref e) => write!(fmt, "IO error: {}", e),
        }
    }
}

impl error::Error for AsmError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            AsmError::Io(ref e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for AsmError {
    fn from(e: io::Error) -> AsmError {
        AsmError::Io(e)
    }
}

lazy_static! {
    static ref MADRS_LINE: Regex =
        Regex::new(r"(?i)^MADRS\[(\d+)\]\s*=\s*(-?(?:\d+|0x[0-9A-F]+))$").unwrap();
    static ref COEF_LINE: Regex =
        Regex::new(r"(?i)^COEF\[(\d+)\]\s*=\s*(-?(?:\d+|0x[0-9A-F]+))$").unwrap();
    static ref TEMP_LINE: Regex =
        Regex::new(r"(?i)^TEMP\[(\d+)\]\s*=\s*(-?(?:\d+|0x[0-9A-F]+))$").unwrap();
    static ref MPRO_LINE: Regex = Regex::new(r"(?i)^MPRO\[(\d+)\]\s*=\s*(.*)$").unwrap();
}

/// Parse a `MADRS[n] = value` directive into its index and value.
pub fn parse_madrs(line: &str) -> Option<(usize, i32)> {
    let cap = match MADRS_LINE.captures(line) {
        Some(cap) => cap,
        None => return None,
    };
    let idx = util::parse_num(&cap[1])?;
    let value = util::parse_num(&cap[2])?;
    Some((idx as usize, value))
}

fn parse_index(text: &str, limit: usize, line: &str) -> Result<usize, AsmError> {
    match util::parse_num(text) {
        Some(idx) if idx >= 0 && (idx as usize) < limit => Ok(idx as usize),
        _ => Err(AsmError::OutOfRange(line.into())),
    }
}

fn parse_value(text: &str, min: i32, max: i32, line: &str) -> Result<i32, AsmError> {
    match util::parse_num(text) {
        Some(value) if value >= min && value <= max => Ok(value),
        _ => Err(AsmError::OutOfRange(line.into())),
    }
}

fn parse_fields(list: &str, line: &str) -> Result<u64, AsmError> {
    let mut word = 0;
    for token in list.split_whitespace() {
        let mut parts = token.splitn(2, ':');
        let name = parts.next().unwrap();
        let field = match masks::field_by_name(name) {
            Some(field) => field,
            None => return Err(AsmError::UnknownField(name.into())),
        };
        let value = match parts.next() {
            Some(text) => match util::parse_num(text) {
                Some(value) if value >= 0 && value as u64 <= field.max() => value as u64,
                _ => return Err(AsmError::OutOfRange(line.into())),
            },
            None => 1,
        };
        word |= field.prep(value);
    }
    Ok(word)
}

/// The flat memory image consumed by the DSP.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    /// The microcode program.
    pub mpro: [u64; MPRO_STEPS],
    /// Coefficient RAM.
    pub coef: [i16; COEF_SIZE],
    /// Memory-address RAM.
    pub madrs: [u16; MADRS_SIZE],
    /// Temp RAM initial values.
    pub temp: [u32; TEMP_SIZE],
}

impl Default for Image {
    fn default() -> Image {
        Image::new()
    }
}

impl Image {
    /// Create a new all-zero image.
    pub fn new() -> Image {
        Image {
            mpro: [0; MPRO_STEPS],
            coef: [0; COEF_SIZE],
            madrs: [0; MADRS_SIZE],
            temp: [0; TEMP_SIZE],
        }
    }

    /// Apply a single directive line.
    fn apply(&mut self, line: &str) -> Result<(), AsmError> {
        if MADRS_LINE.is_match(line) {
            match parse_madrs(line) {
                Some((idx, value)) if idx < MADRS_SIZE && value >= 0 && value <= 0xFFFF => {
                    self.madrs[idx] = value as u16;
                }
                _ => return Err(AsmError::OutOfRange(line.into())),
            }
        } else if let Some(cap) = COEF_LINE.captures(line) {
            let idx = parse_index(&cap[1], COEF_SIZE, line)?;
            let value = parse_value(&cap[2], -0x8000, 0x7FFF, line)?;
            self.coef[idx] = value as i16;
        } else if let Some(cap) = TEMP_LINE.captures(line) {
            let idx = parse_index(&cap[1], TEMP_SIZE, line)?;
            let value = match util::parse_num(&cap[2]) {
                Some(value) => value,
                None => return Err(AsmError::OutOfRange(line.into())),
            };
            self.temp[idx] = value as u32;
        } else if let Some(cap) = MPRO_LINE.captures(line) {
            let idx = parse_index(&cap[1], MPRO_STEPS, line)?;
            self.mpro[idx] = parse_fields(&cap[2], line)?;
        } else {
            return Err(AsmError::InvalidLine(line.into()));
        }
        Ok(())
    }

    /// Build an image from assembler input.
    pub fn load<B: BufRead>(reader: &mut B) -> Result<Image, AsmError> {
        let mut image = Image::new();
        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with("#") || line.starts_with("//") {
                continue;
            }
            image.apply(line)?;
        }
        Ok(image)
    }

    /// Pack a compiled program directly, without the text round trip.
    pub fn from_program(program: &DspProgram) -> Result<Image, AsmError> {
        if program.steps.len() > MPRO_STEPS {
            return Err(AsmError::OutOfRange(format!(
                "{} microcode steps",
                program.steps.len()
            )));
        }
        let mut image = Image::new();
        for (i, &step) in program.steps.iter().enumerate() {
            image.mpro[i] = step;
            image.coef[i] = program.coefs[i];
        }
        for line in &program.madrs {
            match parse_madrs(line) {
                Some((idx, value)) if idx < MADRS_SIZE && value >= 0 && value <= 0xFFFF => {
                    image.madrs[idx] = value as u16;
                }
                Some(_) => return Err(AsmError::OutOfRange(line.clone())),
                None => return Err(AsmError::InvalidLine(line.clone())),
            }
        }
        Ok(image)
    }

    /// Write the image as a flat little-endian binary.
    pub fn save<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for &word in self.mpro.iter() {
            out.write_all(&word.to_le_bytes())?;
        }
        for &coef in self.coef.iter() {
            out.write_all(&coef.to_le_bytes())?;
        }
        for &madrs in self.madrs.iter() {
            out.write_all(&madrs.to_le_bytes())?;
        }
        for &temp in self.temp.iter() {
            out.write_all(&temp.to_le_bytes())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compile;
    use masks::{BSEL, DUMMY_ACC, IRA, MASA, NXADR, TRA, TWT, YRL};
    use opt;

    fn two_step_program() -> DspProgram {
        let mut program = DspProgram::new();
        program.madrs.push("MADRS[3] = 0x40".to_string());
        program.steps.push(DUMMY_ACC | IRA.prep(5) | YRL.mask);
        program.coefs.push(0);
        program.steps.push(DUMMY_ACC);
        program.coefs.push(0x80);
        program
    }

    #[test]
    fn emits_canonical_field_lists() {
        let mut out = Vec::new();
        two_step_program().save(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "MADRS[3] = 0x40",
                "MPRO[0] = YSEL:1 IRA:5 YRL BSEL",
                "COEF[1] = 128",
                "MPRO[1] = YSEL:1 BSEL",
            ]
        );
    }

    #[test]
    fn image_from_text_matches_direct_packing() {
        let program = two_step_program();
        let mut out = Vec::new();
        program.save(&mut out).unwrap();
        let loaded = Image::load(&mut &out[..]).unwrap();
        let direct = Image::from_program(&program).unwrap();
        assert_eq!(loaded, direct);
        assert_eq!(loaded.madrs[3], 0x40);
        assert_eq!(loaded.coef[1], 0x80);
    }

    #[test]
    fn packs_mpro_fields() {
        let input = "MPRO[2] = TRA:3 TWT MASA:63 NXADR";
        let image = Image::load(&mut input.as_bytes()).unwrap();
        assert_eq!(
            image.mpro[2],
            TRA.prep(3) | TWT.mask | MASA.prep(63) | NXADR.mask
        );
    }

    #[test]
    fn accepts_explicit_value_on_flags() {
        let image = Image::load(&mut "MPRO[0] = BSEL:1".as_bytes()).unwrap();
        assert_eq!(image.mpro[0], BSEL.mask);
    }

    #[test]
    fn rejects_unknown_field() {
        match Image::load(&mut "MPRO[0] = FROB".as_bytes()) {
            Err(AsmError::UnknownField(name)) => assert_eq!(name, "FROB"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn rejects_field_value_beyond_width() {
        assert!(Image::load(&mut "MPRO[0] = IWA:32".as_bytes()).is_err());
    }

    #[test]
    fn rejects_out_of_range_indices() {
        assert!(Image::load(&mut "MPRO[128] =".as_bytes()).is_err());
        assert!(Image::load(&mut "MADRS[64] = 0".as_bytes()).is_err());
        assert!(Image::load(&mut "COEF[128] = 1".as_bytes()).is_err());
        assert!(Image::load(&mut "TEMP[128] = 1".as_bytes()).is_err());
    }

    #[test]
    fn rejects_garbage_lines() {
        assert!(Image::load(&mut "JUNK = 1".as_bytes()).is_err());
    }

    #[test]
    fn full_pipeline_round_trips_through_the_assembler() {
        let source = "MADRS[1] = 0x2000\n\
                      INPUT mixer:0\n\
                      MAC input, #0x0800\n\
                      ST [temp:0]\n\
                      LD [madrs:1+], mems:0\n\
                      INPUT mems:0\n\
                      MAC input, #0x0400, acc\n\
                      OUTPUT mixer:0\n";
        let mut program = compile::compile(source.as_bytes()).unwrap();
        opt::optimize(&mut program);
        let mut text = Vec::new();
        program.save(&mut text).unwrap();
        let loaded = Image::load(&mut &text[..]).unwrap();
        assert_eq!(loaded, Image::from_program(&program).unwrap());
        assert_eq!(loaded.madrs[1], 0x2000);
    }

    #[test]
    fn binary_image_is_flat_and_little_endian() {
        let mut image = Image::new();
        image.mpro[0] = 0x0102030405060708;
        image.coef[0] = -2;
        image.madrs[0] = 0xBEEF;
        image.temp[0] = 0xCAFE;
        let mut out = Vec::new();
        image.save(&mut out).unwrap();
        assert_eq!(out.len(), 0x780);
        assert_eq!(&out[..8], &[8, 7, 6, 5, 4, 3, 2, 1]);
        assert_eq!(&out[0x400..0x402], &[0xFE, 0xFF]);
        assert_eq!(&out[0x500..0x502], &[0xEF, 0xBE]);
        assert_eq!(&out[0x580..0x584], &[0xFE, 0xCA, 0, 0]);
    }
}
