//! The language front end: line classification and lowering of
//! statements into microcode step words.
//!
//! Statements are matched one line at a time against a fixed set of
//! patterns. Most statements lower to a single step word built on top of
//! the dummy-acc no-op, so that the accumulator survives any step that
//! does not explicitly feed it. The input selector (`INPUT`) and the
//! shift mode (`SMODE`) are latched and apply to every following
//! statement until changed.

use std::error;
use std::fmt::{self, Display, Formatter};
use std::io::{self, BufRead};

use regex::Regex;

use masks;
use program::{self, DspProgram};
use util;

/// Fatal compiler errors.
#[derive(Debug)]
pub enum CompileError {
    /// A statement matched but carries an out-of-range or inconsistent
    /// operand.
    Invalid(String),
    /// Underlying IO error.
    Io(io::Error),
}

impl Display for CompileError {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        match *self {
            CompileError::Invalid(ref stmt) => write!(fmt, "Invalid instruction: {}", stmt),
            CompileError::Io(ref e) => write!(fmt, "IO error: {}", e),
        }
    }
}

impl error::Error for CompileError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            CompileError::Io(ref e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CompileError {
    fn from(e: io::Error) -> CompileError {
        CompileError::Io(e)
    }
}

lazy_static! {
    static ref INPUT: Regex =
        Regex::new(r"(?i)^INPUT\s+(MEMS|MIXER|CDDA):(\d+|0x[0-9A-F]+)$").unwrap();
    static ref OUTPUT: Regex =
        Regex::new(r"(?i)^OUTPUT\s+(YREG|ADRS/S|ADRS|MIXER:(?:\d+|0x[0-9A-F]+))$").unwrap();
    static ref SMODE: Regex = Regex::new(r"(?i)^SMODE\s+(SAT2|SAT|TRIM2|TRIM)$").unwrap();
    static ref ST_TEMP: Regex = Regex::new(r"(?i)^ST\s+\[TEMP:(\d+|0x[0-9A-F]+)\]$").unwrap();
    static ref LD_MEM: Regex =
        Regex::new(r"(?i)^(LDF?)\s+(.+?)\s*,\s*MEMS:(\d+|0x[0-9A-F]+)$").unwrap();
    static ref ST_MEM: Regex = Regex::new(r"(?i)^(STF?)\s+(.+)$").unwrap();
    static ref MAC: Regex =
        Regex::new(r"(?i)^MAC\s+([^,]+?)\s*,\s*([^,]+?)(?:\s*,\s*([^,]+?))?$").unwrap();
    static ref ADDRESS: Regex =
        Regex::new(r"(?i)^(\[)?MADRS:(\d+|0x[0-9A-F]+)\s*(\+)?\s*(/S)?\s*(\])?$").unwrap();
    static ref TEMP_ARG: Regex = Regex::new(r"(?i)^\[TEMP:(\d+|0x[0-9A-F]+)\]$").unwrap();
    static ref SELECTOR: Regex = Regex::new(r"(?i)^(SHIFTED|YREG):(LO|HI)$").unwrap();
}

fn operand(text: &str, limit: i32, line: &str) -> Result<u64, CompileError> {
    match util::parse_num(text) {
        Some(value) if value >= 0 && value < limit => Ok(value as u64),
        _ => Err(CompileError::Invalid(line.into())),
    }
}

/// Parse a `[temp:n]` operand.
fn temp_index(text: &str) -> Option<u64> {
    let cap = TEMP_ARG.captures(text)?;
    match util::parse_num(&cap[1]) {
        Some(value) if value >= 0 && value < 128 => Some(value as u64),
        _ => None,
    }
}

/// Parse a memory operand into the word bits describing it: the MASA
/// index, TABLE when the address is absolute (no brackets), ADREB for
/// the `/s` suffix and NXADR for the post-increment.
fn parse_address(text: &str, line: &str) -> Result<u64, CompileError> {
    let cap = match ADDRESS.captures(text) {
        Some(cap) => cap,
        None => return Err(CompileError::Invalid(line.into())),
    };
    if cap.get(1).is_some() != cap.get(5).is_some() {
        return Err(CompileError::Invalid(line.into()));
    }
    let masa = operand(&cap[2], 64, line)?;
    let mut bits = masks::MASA.prep(masa);
    if cap.get(1).is_none() {
        bits |= masks::TABLE.mask;
    }
    if cap.get(3).is_some() {
        bits |= masks::NXADR.mask;
    }
    if cap.get(4).is_some() {
        bits |= masks::ADREB.mask;
    }
    Ok(bits)
}

fn set_ysel(word: u64, ysel: u64) -> u64 {
    (word & !masks::YSEL.mask) | masks::YSEL.prep(ysel)
}

/// Lowers statements one at a time, carrying the latched input selector
/// and shift mode across them.
#[derive(Debug, Default)]
pub struct Compiler {
    program: DspProgram,
    imode: u64,
    smode: u64,
}

impl Compiler {
    /// Create a new compiler with input 0 selected and `sat` shifting.
    pub fn new() -> Compiler {
        Default::default()
    }

    /// The program lowered so far.
    pub fn finish(self) -> DspProgram {
        self.program
    }

    fn push(&mut self, word: u64) {
        self.program.steps.push(word);
        self.program.coefs.push(0);
    }

    /// Pad with a no-op so the next step lands on an odd index.
    fn align(&mut self) {
        if self.program.steps.len() % 2 == 0 {
            self.push(masks::DUMMY_ACC);
        }
    }

    /// Classify one input line and lower it if it is a statement.
    pub fn feed_line(&mut self, raw: &str) -> Result<(), CompileError> {
        let line = raw.trim();
        if line.is_empty() || line.starts_with("#") || line.starts_with("//") {
            return Ok(());
        }
        if program::parse_madrs(line).is_some() {
            self.program.madrs.push(line.to_string());
            return Ok(());
        }
        self.lower(line)
    }

    fn lower(&mut self, line: &str) -> Result<(), CompileError> {
        if let Some(cap) = INPUT.captures(line) {
            let (limit, offset) = match &cap[1].to_lowercase() as &str {
                "mems" => (32, 0),
                "mixer" => (16, 32),
                "cdda" => (2, 48),
                _ => unreachable!(),
            };
            self.imode = operand(&cap[2], limit, line)? + offset;
            return Ok(());
        }

        if let Some(cap) = OUTPUT.captures(line) {
            let what = cap[1].to_lowercase();
            if what == "yreg" {
                self.push(masks::DUMMY_ACC | masks::IRA.prep(self.imode) | masks::YRL.mask);
            } else if what == "adrs" {
                if self.smode == masks::SHIFT_TRIM {
                    // ADRL and the trim shift collide in one step; split them.
                    self.push(masks::DUMMY_ACC | masks::SHIFT.prep(self.smode) | masks::ADRL.mask);
                    self.push(masks::DUMMY_ACC | masks::IRA.prep(self.imode) | masks::ADRL.mask);
                } else {
                    self.push(
                        masks::DUMMY_ACC
                            | masks::IRA.prep(self.imode)
                            | masks::SHIFT.prep(self.smode)
                            | masks::ADRL.mask,
                    );
                }
            } else if what == "adrs/s" {
                self.push(
                    masks::DUMMY_ACC
                        | masks::IRA.prep(self.imode)
                        | masks::ADRL.mask
                        | masks::SHIFT.prep(masks::SHIFT_TRIM),
                );
            } else {
                let channel = operand(&what["mixer:".len()..], 16, line)?;
                self.push(
                    masks::DUMMY_ACC
                        | masks::EWT.mask
                        | masks::EWA.prep(channel)
                        | masks::SHIFT.prep(self.smode),
                );
            }
            return Ok(());
        }

        if let Some(cap) = SMODE.captures(line) {
            self.smode = match &cap[1].to_lowercase() as &str {
                "sat" => masks::SHIFT_SAT,
                "sat2" => masks::SHIFT_SAT2,
                "trim2" => masks::SHIFT_TRIM2,
                "trim" => masks::SHIFT_TRIM,
                _ => unreachable!(),
            };
            return Ok(());
        }

        if let Some(cap) = ST_TEMP.captures(line) {
            let twa = operand(&cap[1], 128, line)?;
            self.push(
                masks::DUMMY_ACC
                    | masks::SHIFT.prep(self.smode)
                    | masks::TWT.mask
                    | masks::TWA.prep(twa),
            );
            return Ok(());
        }

        if let Some(cap) = LD_MEM.captures(line) {
            let nofl = cap[1].len() == 2;
            let address = parse_address(&cap[2], line)?;
            let iwa = operand(&cap[3], 32, line)?;
            self.align();
            let mut setup = masks::DUMMY_ACC | masks::MRD.mask | address;
            if nofl {
                setup |= masks::NOFL.mask;
            }
            // the value read at the odd step is available two steps later
            self.push(setup);
            self.push(masks::DUMMY_ACC);
            self.push(masks::DUMMY_ACC | masks::IWT.mask | masks::IWA.prep(iwa));
            return Ok(());
        }

        if let Some(cap) = ST_MEM.captures(line) {
            let nofl = cap[1].len() == 2;
            let address = parse_address(&cap[2], line)?;
            self.align();
            let mut word =
                masks::DUMMY_ACC | masks::SHIFT.prep(self.smode) | masks::MWT.mask | address;
            if nofl {
                word |= masks::NOFL.mask;
            }
            self.push(word);
            return Ok(());
        }

        if let Some(cap) = MAC.captures(line) {
            let barg = cap.get(3).map(|m| m.as_str());
            let (x, y) = (cap[1].to_string(), cap[2].to_string());
            return self.lower_mac(&x, &y, barg, line);
        }

        eprintln!("Unhandled instruction: {}", line);
        Ok(())
    }

    fn lower_mac(
        &mut self,
        x: &str,
        y: &str,
        b: Option<&str>,
        line: &str,
    ) -> Result<(), CompileError> {
        let mut word = masks::DUMMY_ACC;

        let mut xtemp = None;
        if x.to_lowercase() == "input" {
            word |= masks::XSEL.mask | masks::IRA.prep(self.imode);
        } else if let Some(t) = temp_index(x) {
            xtemp = Some(t);
            word |= masks::TRA.prep(t);
        } else {
            return Err(CompileError::Invalid(line.into()));
        }

        let mut coef = None;
        if y.starts_with("#") {
            let imm = match util::parse_num(&y[1..]) {
                Some(imm) => imm,
                None => return Err(CompileError::Invalid(line.into())),
            };
            // the hardware reads COEF as a 13-bit value in the top bits
            coef = Some((imm << 3) as i16);
            word = set_ysel(word, 1);
        } else if let Some(sel) = SELECTOR.captures(y) {
            let lo = sel[2].to_lowercase() == "lo";
            if sel[1].to_lowercase() == "yreg" {
                word = set_ysel(word, if lo { 3 } else { 2 });
            } else {
                // latch the fractional part one step ahead of its use
                let mut latch = masks::DUMMY_ACC | masks::FRCL.mask;
                if lo {
                    latch |= masks::SHIFT.prep(masks::SHIFT_TRIM);
                }
                self.push(latch);
                word = set_ysel(word, 0);
            }
        } else {
            return Err(CompileError::Invalid(line.into()));
        }

        match b {
            None => {
                word = (word & !masks::BSEL.mask) | masks::ZERO.mask;
            }
            Some(arg) => {
                let mut barg = arg;
                if barg.starts_with("-") {
                    word |= masks::NEGB.mask;
                    barg = barg[1..].trim_start();
                }
                if let Some(t) = temp_index(barg) {
                    if xtemp.is_some() && xtemp != Some(t) {
                        return Err(CompileError::Invalid(line.into()));
                    }
                    word = (word & !masks::BSEL.mask) | masks::TRA.prep(t);
                } else if barg.to_lowercase() != "acc" {
                    return Err(CompileError::Invalid(line.into()));
                }
            }
        }

        self.push(word);
        if let Some(coef) = coef {
            let last = self.program.coefs.len() - 1;
            self.program.coefs[last] = coef;
        }
        Ok(())
    }
}

/// Compile a whole source stream.
///
/// Lines that match no statement are reported on stderr and skipped;
/// anything else fatal aborts with the offending statement.
pub fn compile<B: BufRead>(input: B) -> Result<DspProgram, CompileError> {
    let mut compiler = Compiler::new();
    for line in input.lines() {
        let line = line?;
        compiler.feed_line(&line)?;
    }
    Ok(compiler.finish())
}
