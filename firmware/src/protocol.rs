//! Serial Command Protocol
//!
//! A line-oriented ASCII front end to the register map, meant for typing into
//! a terminal. Every byte is echoed; a line is executed when `\r` or `\n`
//! arrives.
//!
//! ```text
//! R<reg>            read, prints the value in decimal
//! W<reg>,<value>    write
//! ```
//!
//! Numbers are decimal, or hexadecimal with an `x`/`0x` prefix. Leading
//! spaces in a number are skipped and a decimal number may not start with
//! `0` unless it is `0`. Responses are `READ ERROR`, `WRITE ERROR` or `ERROR`
//! when something goes wrong.

use core::fmt::{self, Write};

use heapless::String;

use crate::config::RESPONSE_BUFFER_SIZE;
use crate::registers::{RegisterMap, RegisterValue, WriteOutcome};
use crate::types::RebootAction;

/// Why a command line was rejected
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseError {
    /// Line did not start with `R` or `W`
    UnknownCommand,
    /// Control or non-ASCII byte in the line
    NonPrintable,
    /// Decimal number with a leading zero
    LeadingZero,
    /// Byte not valid at this point of the line
    UnexpectedByte,
    /// Register address above 0xFF
    RegisterOutOfRange,
    /// Value above 0xFFFF
    ValueOutOfRange,
    /// Line ended before the command was complete
    Incomplete,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::UnknownCommand => "unknown command",
            Self::NonPrintable => "non-printable byte",
            Self::LeadingZero => "leading zero",
            Self::UnexpectedByte => "unexpected byte",
            Self::RegisterOutOfRange => "register out of range",
            Self::ValueOutOfRange => "value out of range",
            Self::Incomplete => "incomplete command",
        };
        f.write_str(msg)
    }
}

#[cfg(not(feature = "embedded"))]
impl std::error::Error for ParseError {}

#[cfg(feature = "defmt")]
impl defmt::Format for ParseError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::UnknownCommand => defmt::write!(f, "unknown command"),
            Self::NonPrintable => defmt::write!(f, "non-printable byte"),
            Self::LeadingZero => defmt::write!(f, "leading zero"),
            Self::UnexpectedByte => defmt::write!(f, "unexpected byte"),
            Self::RegisterOutOfRange => defmt::write!(f, "register out of range"),
            Self::ValueOutOfRange => defmt::write!(f, "value out of range"),
            Self::Incomplete => defmt::write!(f, "incomplete command"),
        }
    }
}

/// Where the parser is within the current line
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ParserState {
    /// Waiting for a command letter
    #[default]
    Idle,
    /// Collecting the register of a read
    ReadRegister,
    /// Collecting the register of a write
    WriteRegisterAddress,
    /// Collecting the value of a write
    WriteRegisterValue,
    /// Line rejected, waiting for its end
    Error(ParseError),
}

#[cfg(feature = "defmt")]
impl defmt::Format for ParserState {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Idle => defmt::write!(f, "idle"),
            Self::ReadRegister => defmt::write!(f, "read register"),
            Self::WriteRegisterAddress => defmt::write!(f, "write register"),
            Self::WriteRegisterValue => defmt::write!(f, "write value"),
            Self::Error(error) => defmt::write!(f, "{}", error),
        }
    }
}

// Fields hold at most these values; the range checks keep the
// accumulators from overflowing.
const MAX_REGISTER: u32 = 0xFF;
const MAX_VALUE: u32 = 0xFFFF;

/// Byte-at-a-time command line interpreter
#[derive(Debug, Default)]
pub struct CommandParser {
    state: ParserState,
    register: Option<u32>,
    value: Option<u32>,
    hex: bool,
}

impl CommandParser {
    /// Parser waiting for a command
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: ParserState::Idle,
            register: None,
            value: None,
            hex: false,
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> ParserState {
        self.state
    }

    /// Process one received byte, writing echo and responses to `out`
    ///
    /// Returns the terminal action requested by an executed write; the caller
    /// must carry it out after flushing `out`.
    pub fn feed<D, W>(
        &mut self,
        byte: u8,
        device: &mut D,
        now_us: u32,
        out: &mut W,
    ) -> Option<RebootAction>
    where
        D: RegisterMap + ?Sized,
        W: Write + ?Sized,
    {
        if byte == b'\n' || byte == b'\r' {
            let _ = out.write_str("\r\n");
            return self.execute(device, now_us, out);
        }

        let byte = if byte < 0x20 || byte >= 0x7F {
            self.state = ParserState::Error(ParseError::NonPrintable);
            b'~'
        } else {
            byte
        };
        let _ = out.write_char(char::from(byte));

        match self.state {
            ParserState::Idle => self.start(byte),
            ParserState::ReadRegister
            | ParserState::WriteRegisterAddress
            | ParserState::WriteRegisterValue => self.field_byte(byte | 0x20),
            ParserState::Error(_) => {}
        }
        None
    }

    fn start(&mut self, byte: u8) {
        self.state = match byte {
            b'R' => ParserState::ReadRegister,
            b'W' => ParserState::WriteRegisterAddress,
            _ => ParserState::Error(ParseError::UnknownCommand),
        };
        self.register = None;
        self.value = None;
        self.hex = false;
    }

    fn field_byte(&mut self, c: u8) {
        let in_value = self.state == ParserState::WriteRegisterValue;
        let mut digits = if in_value { self.value } else { self.register };

        if digits.is_none() && c != b'x' {
            if c == b' ' {
                return;
            }
            digits = Some(0);
        } else if digits == Some(0) && c != b'x' && c != b',' && !self.hex {
            self.fail(ParseError::LeadingZero);
            return;
        }

        let current = digits.unwrap_or(0);
        digits = match c {
            b'0'..=b'9' => Some(current * self.radix() + u32::from(c - b'0')),
            b'a'..=b'f' if self.hex => Some(current * 16 + u32::from(c - b'a') + 10),
            b'x' if !self.hex && current == 0 => {
                self.hex = true;
                None
            }
            b',' if self.state == ParserState::WriteRegisterAddress => {
                self.end_address(current);
                return;
            }
            _ => {
                self.fail(ParseError::UnexpectedByte);
                return;
            }
        };

        if in_value {
            self.value = digits;
            if exceeds(digits, MAX_VALUE) {
                self.fail(ParseError::ValueOutOfRange);
            }
        } else {
            self.register = digits;
            if exceeds(digits, MAX_REGISTER) {
                self.fail(ParseError::RegisterOutOfRange);
            }
        }
    }

    fn end_address(&mut self, register: u32) {
        self.register = Some(register);
        if register > MAX_REGISTER {
            self.fail(ParseError::RegisterOutOfRange);
        } else {
            self.hex = false;
            self.value = None;
            self.state = ParserState::WriteRegisterValue;
        }
    }

    const fn radix(&self) -> u32 {
        if self.hex {
            16
        } else {
            10
        }
    }

    fn fail(&mut self, error: ParseError) {
        self.state = ParserState::Error(error);
    }

    fn execute<D, W>(&mut self, device: &mut D, now_us: u32, out: &mut W) -> Option<RebootAction>
    where
        D: RegisterMap + ?Sized,
        W: Write + ?Sized,
    {
        let state = core::mem::take(&mut self.state);
        let mut action = None;

        match (state, self.register, self.value) {
            (ParserState::Idle, ..) => {}
            (ParserState::ReadRegister, Some(register), _) => {
                #[allow(clippy::cast_possible_truncation)]
                let register = register as u8;
                match device.read_register(register, now_us) {
                    Ok(value) => print_value(&value, out),
                    Err(_) => {
                        let _ = out.write_str("READ ERROR\r\n");
                    }
                }
            }
            (ParserState::WriteRegisterValue, Some(register), Some(value)) => {
                #[allow(clippy::cast_possible_truncation)]
                let (register, value) = (register as u8, value as u16);
                match device.write_register(register, value, now_us) {
                    Ok(WriteOutcome::Terminal(requested)) => action = Some(requested),
                    Ok(WriteOutcome::Done) => {}
                    Err(_) => {
                        let _ = out.write_str("WRITE ERROR\r\n");
                    }
                }
            }
            (rejected, ..) => {
                let error = match rejected {
                    ParserState::Error(error) => error,
                    _ => ParseError::Incomplete,
                };
                #[cfg(feature = "defmt")]
                defmt::debug!("serial command rejected: {}", error);
                #[cfg(not(feature = "defmt"))]
                let _ = error;
                let _ = out.write_str("ERROR\r\n");
            }
        }
        action
    }
}

const fn exceeds(digits: Option<u32>, max: u32) -> bool {
    match digits {
        Some(n) => n > max,
        None => false,
    }
}

fn print_value<W: Write + ?Sized>(value: &RegisterValue, out: &mut W) {
    let mut line: String<RESPONSE_BUFFER_SIZE> = String::new();
    let _ = match value {
        RegisterValue::Word(word) => write!(line, "{word}\r\n"),
        RegisterValue::Name(name) => name
            .iter()
            .try_for_each(|&b| line.write_char(char::from(b)))
            .and_then(|()| line.write_str("\r\n")),
    };
    let _ = out.write_str(&line);
}
