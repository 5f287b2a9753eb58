//! Line assembler, real-time byte sniffer, and word-level lexer (§4.1).

use gcode_common::error::StatusCode;

/// Maximum buffered line length before overflow is flagged.
pub const LINE_BUFFER_CAPACITY: usize = 256;

/// A single real-time command recognized by the receive sniffer. These
/// bytes never reach the line buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealtimeCommand {
    Reset,
    StatusReportQuery,
    CycleStart,
    FeedHold,
    SafetyDoor,
    JogCancel,
    FeedOverrideReset,
    FeedOverrideCoarsePlus,
    FeedOverrideCoarseMinus,
    FeedOverrideFinePlus,
    FeedOverrideFineMinus,
    RapidOverrideReset,
    RapidOverrideMedium,
    RapidOverrideLow,
    SpindleOverrideReset,
    SpindleOverrideCoarsePlus,
    SpindleOverrideCoarseMinus,
    SpindleOverrideFinePlus,
    SpindleOverrideFineMinus,
    ToggleSpindleStop,
    ToggleFloodCoolant,
    ToggleMistCoolant,
}

impl RealtimeCommand {
    /// Classify a byte as a real-time command, if any (§4.1 table).
    ///
    /// `jogging` gates `0x85` (jog cancel), which is only meaningful while
    /// the executor is in the Jog state (§4.6).
    pub fn classify(byte: u8, jogging: bool) -> Option<Self> {
        use RealtimeCommand::*;
        match byte {
            0x18 => Some(Reset),
            b'?' => Some(StatusReportQuery),
            b'~' => Some(CycleStart),
            b'!' => Some(FeedHold),
            0x84 => Some(SafetyDoor),
            0x85 if jogging => Some(JogCancel),
            0x90 => Some(FeedOverrideReset),
            0x91 => Some(FeedOverrideCoarsePlus),
            0x92 => Some(FeedOverrideCoarseMinus),
            0x93 => Some(FeedOverrideFinePlus),
            0x94 => Some(FeedOverrideFineMinus),
            0x95 => Some(RapidOverrideReset),
            0x96 => Some(RapidOverrideMedium),
            0x97 => Some(RapidOverrideLow),
            0x99 => Some(SpindleOverrideReset),
            0x9A => Some(SpindleOverrideCoarsePlus),
            0x9B => Some(SpindleOverrideCoarseMinus),
            0x9C => Some(SpindleOverrideFinePlus),
            0x9D => Some(SpindleOverrideFineMinus),
            0x9E => Some(ToggleSpindleStop),
            0xA0 => Some(ToggleFloodCoolant),
            0xA1 => Some(ToggleMistCoolant),
            _ => None,
        }
    }
}

/// Result of feeding one byte to the [`LineAssembler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblerEvent {
    /// Byte consumed, line not yet complete.
    Pending,
    /// A real-time byte was intercepted; it never entered the buffer.
    Realtime(RealtimeCommand),
    /// End-of-line reached; the normalized line is returned (comments
    /// stripped, upcased, whitespace removed). Empty lines are still
    /// emitted — the caller treats an empty line as a bare `ok`.
    Line(String),
    /// The line exceeded [`LINE_BUFFER_CAPACITY`]; rejected.
    Overflow,
}

/// Accumulates bytes into normalized G-code lines (§4.1 "Line Assembler").
#[derive(Debug, Default)]
pub struct LineAssembler {
    buf: String,
    in_paren_comment: bool,
    overflowed: bool,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte. `jogging` is forwarded to [`RealtimeCommand::classify`].
    pub fn push_byte(&mut self, byte: u8, jogging: bool) -> AssemblerEvent {
        if let Some(cmd) = RealtimeCommand::classify(byte, jogging) {
            return AssemblerEvent::Realtime(cmd);
        }

        match byte {
            b'\r' | b'\n' => {
                let overflowed = self.overflowed;
                let line = std::mem::take(&mut self.buf);
                self.in_paren_comment = false;
                self.overflowed = false;
                if overflowed {
                    AssemblerEvent::Overflow
                } else {
                    AssemblerEvent::Line(line)
                }
            }
            b'(' => {
                self.in_paren_comment = true;
                AssemblerEvent::Pending
            }
            b')' => {
                self.in_paren_comment = false;
                AssemblerEvent::Pending
            }
            b';' if !self.in_paren_comment => {
                // Rest of line is a comment; swallow bytes until EOL by
                // staying in a comment-like state. Reuse paren flag since
                // both suppress buffering until terminator.
                self.in_paren_comment = true;
                AssemblerEvent::Pending
            }
            _ if self.in_paren_comment => AssemblerEvent::Pending,
            b' ' | b'\t' => AssemblerEvent::Pending,
            _ => {
                if self.overflowed {
                    return AssemblerEvent::Pending;
                }
                if self.buf.len() >= LINE_BUFFER_CAPACITY {
                    self.overflowed = true;
                    return AssemblerEvent::Pending;
                }
                self.buf.push((byte as char).to_ascii_uppercase());
                AssemblerEvent::Pending
            }
        }
    }
}

/// One `<letter><value>` word in a parsed block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Word {
    pub letter: u8,
    pub value: f32,
}

/// Fractional G-codes the lexer accepts; any other `G<int>.<frac>` is a
/// [`StatusCode::GcodeCommandValueNotInteger`] error (§4.1 step 2).
const ALLOWED_FRACTIONAL_G: &[(u8, u8)] = &[
    (38, 2),
    (38, 3),
    (38, 4),
    (38, 5),
    (43, 1),
    (91, 1),
    (92, 1),
    (28, 1),
    (30, 1),
];

/// Lex a normalized line into words, rejecting malformed numbers and
/// disallowed fractional G-codes before any modal-group check runs.
pub fn lex_words(line: &str) -> Result<Vec<Word>, StatusCode> {
    let mut words = Vec::new();
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let letter = bytes[i];
        if !letter.is_ascii_alphabetic() {
            return Err(StatusCode::ExpectedCommandLetter);
        }
        i += 1;
        let start = i;
        if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
            i += 1;
        }
        let mut saw_digit = false;
        let mut frac_digits = 0usize;
        let mut dot_seen = false;
        while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
            if bytes[i] == b'.' {
                if dot_seen {
                    return Err(StatusCode::BadNumberFormat);
                }
                dot_seen = true;
            } else {
                saw_digit = true;
                if dot_seen {
                    frac_digits += 1;
                }
            }
            i += 1;
        }
        if !saw_digit {
            return Err(StatusCode::BadNumberFormat);
        }
        let text = &line[start..i];
        let value: f32 = text.parse().map_err(|_| StatusCode::BadNumberFormat)?;

        if letter == b'G' && dot_seen {
            let whole = value.trunc() as u8;
            let mantissa = ((value.fract().abs()) * 10f32.powi(frac_digits as i32)).round() as u8;
            if !ALLOWED_FRACTIONAL_G.contains(&(whole, mantissa)) {
                return Err(StatusCode::GcodeCommandValueNotInteger);
            }
        }

        words.push(Word { letter, value });
    }
    Ok(words)
}

/// Modal-group tag used to detect "two words in the same modal group"
/// violations (§4.1 step 1). Non-modal letters (axis words, F, S, etc.)
/// are [`ModalGroup::None`] and never conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModalGroup {
    Motion,
    Plane,
    Units,
    Distance,
    ArcDistance,
    FeedRateMode,
    CoordSystem,
    Spindle,
    Coolant,
    ProgramFlow,
    ToolLength,
    PathControl,
    Retract,
    Lathe,
    SpindleSpeedMode,
    OverrideControl,
    NonModal,
    None,
}

/// Classify a `G`/`M` word into its modal group. Returns `None` for
/// axis/parameter letters, which never conflict with each other.
pub fn modal_group_of(word: Word) -> ModalGroup {
    use ModalGroup::*;
    match word.letter {
        b'G' => {
            // Codes are compared as value*10 so e.g. G38.2 (382) is
            // distinguishable from G38 (380, unused).
            let code = (word.value * 10.0).round() as i32;
            match code {
                0 | 10 | 20 | 30 | 330 | 382 | 383 | 384 | 385 | 730 | 760 | 800 | 810 | 820
                | 830 => Motion,
                170 | 180 | 190 => Plane,
                200 | 210 => Units,
                900 | 910 => Distance,
                901 | 911 => ArcDistance,
                930 | 940 => FeedRateMode,
                540 | 550 | 560 | 570 | 580 | 590 => CoordSystem,
                430 | 431 | 490 => ToolLength,
                610 => PathControl,
                980 | 990 => Retract,
                70 | 80 => Lathe,
                960 | 970 => SpindleSpeedMode,
                280 | 281 | 300 | 301 | 920 | 921 | 530 => NonModal,
                _ => None,
            }
        }
        b'M' => match (word.value).round() as i32 {
            0 | 1 | 2 | 30 => ProgramFlow,
            3 | 4 | 5 => Spindle,
            7 | 8 | 9 => Coolant,
            48 | 49 => OverrideControl,
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realtime_byte_never_reaches_line_buffer() {
        let mut asm = LineAssembler::new();
        assert_eq!(
            asm.push_byte(b'G', false),
            AssemblerEvent::Pending
        );
        assert_eq!(
            asm.push_byte(b'1', false),
            AssemblerEvent::Pending
        );
        assert_eq!(
            asm.push_byte(b'!', false),
            AssemblerEvent::Realtime(RealtimeCommand::FeedHold)
        );
        assert_eq!(
            asm.push_byte(b'\n', false),
            AssemblerEvent::Line("G1".to_string())
        );
    }

    #[test]
    fn comments_and_whitespace_stripped() {
        let mut asm = LineAssembler::new();
        for b in b"g1 x10 (move) y20; trailing comment".iter() {
            asm.push_byte(*b, false);
        }
        assert_eq!(
            asm.push_byte(b'\n', false),
            AssemblerEvent::Line("G1X10Y20".to_string())
        );
    }

    #[test]
    fn overflow_is_flagged_and_recovers() {
        let mut asm = LineAssembler::new();
        for _ in 0..(LINE_BUFFER_CAPACITY + 10) {
            asm.push_byte(b'X', false);
            asm.push_byte(b'1', false);
        }
        assert_eq!(asm.push_byte(b'\n', false), AssemblerEvent::Overflow);
        // Assembler recovers for the next line.
        asm.push_byte(b'G', false);
        asm.push_byte(b'0', false);
        assert_eq!(
            asm.push_byte(b'\n', false),
            AssemblerEvent::Line("G0".to_string())
        );
    }

    #[test]
    fn jog_cancel_only_classified_while_jogging() {
        assert_eq!(RealtimeCommand::classify(0x85, false), None);
        assert_eq!(
            RealtimeCommand::classify(0x85, true),
            Some(RealtimeCommand::JogCancel)
        );
    }

    #[test]
    fn lex_simple_block() {
        let words = lex_words("G1X10Y-5F600").unwrap();
        assert_eq!(words.len(), 4);
        assert_eq!(words[0], Word { letter: b'G', value: 1.0 });
        assert_eq!(words[1], Word { letter: b'X', value: 10.0 });
        assert_eq!(words[2], Word { letter: b'Y', value: -5.0 });
    }

    #[test]
    fn lex_rejects_bad_number() {
        assert_eq!(lex_words("X").unwrap_err(), StatusCode::BadNumberFormat);
        assert_eq!(lex_words("X1.2.3").unwrap_err(), StatusCode::BadNumberFormat);
    }

    #[test]
    fn lex_accepts_allowed_fractional_gcode() {
        let words = lex_words("G38.2Z-10").unwrap();
        assert_eq!(words[0].value, 38.2_f32.into());
    }

    #[test]
    fn lex_rejects_disallowed_fractional_gcode() {
        let err = lex_words("G1.5X1").unwrap_err();
        assert_eq!(err, StatusCode::GcodeCommandValueNotInteger);
    }

    #[test]
    fn modal_group_conflict_detection() {
        let g0 = Word { letter: b'G', value: 0.0 };
        let g1 = Word { letter: b'G', value: 1.0 };
        assert_eq!(modal_group_of(g0), ModalGroup::Motion);
        assert_eq!(modal_group_of(g1), ModalGroup::Motion);
        let x = Word { letter: b'X', value: 1.0 };
        assert_eq!(modal_group_of(x), ModalGroup::None);
    }
}
