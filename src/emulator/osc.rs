//! Explicit OSC (Operating System Command) parser fed the same byte stream
//! as the VT parser (spec §4.B): extracts title updates (OSC 0/1/2) and
//! strips CWD (OSC 7), color-set (OSC 10/11/12), and icon/title-stack
//! (OSC 22/23) sequences before the remaining bytes reach the VT parser, so
//! they don't cause host-terminal flicker. No teacher file implements this;
//! built fresh, following the explicit byte-oriented state-machine style of
//! `handlers/keyboard.rs`'s escape-sequence detection (buffer until a
//! terminator or a timeout-equivalent boundary).

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OscEvent {
    Title(String),
    Cwd(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Normal,
    Escape,
    Osc,
    OscEscape,
}

/// Stateful OSC interceptor. Must be resilient to a sequence split across
/// multiple `filter` calls (spec §4.B: "writes may arrive in arbitrary chunk
/// sizes").
pub struct OscFilter {
    state: State,
    osc_buf: Vec<u8>,
}

impl OscFilter {
    pub fn new() -> Self {
        Self {
            state: State::Normal,
            osc_buf: Vec::new(),
        }
    }

    /// Returns the bytes that should still be forwarded to the VT parser,
    /// plus any OSC events recognized in this chunk.
    pub fn filter(&mut self, input: &[u8]) -> (Vec<u8>, Vec<OscEvent>) {
        let mut out = Vec::with_capacity(input.len());
        let mut events = Vec::new();

        for &byte in input {
            match self.state {
                State::Normal => {
                    if byte == 0x1b {
                        self.state = State::Escape;
                    } else {
                        out.push(byte);
                    }
                }
                State::Escape => {
                    if byte == b']' {
                        self.state = State::Osc;
                        self.osc_buf.clear();
                    } else {
                        out.push(0x1b);
                        out.push(byte);
                        self.state = State::Normal;
                    }
                }
                State::Osc => {
                    if byte == 0x07 {
                        self.finish_osc(&mut out, &mut events);
                        self.state = State::Normal;
                    } else if byte == 0x1b {
                        self.state = State::OscEscape;
                    } else {
                        self.osc_buf.push(byte);
                    }
                }
                State::OscEscape => {
                    if byte == b'\\' {
                        self.finish_osc(&mut out, &mut events);
                        self.state = State::Normal;
                    } else {
                        // Not a valid ST; treat buffered ESC as part of the OSC body
                        // and keep accumulating (malformed input, degrade gracefully).
                        self.osc_buf.push(0x1b);
                        self.osc_buf.push(byte);
                        self.state = State::Osc;
                    }
                }
            }
        }

        (out, events)
    }

    fn finish_osc(&mut self, out: &mut Vec<u8>, events: &mut Vec<OscEvent>) {
        let body = std::mem::take(&mut self.osc_buf);
        let text = String::from_utf8_lossy(&body);
        let mut parts = text.splitn(2, ';');
        let code = parts.next().unwrap_or("");
        let payload = parts.next().unwrap_or("");

        match code {
            "0" | "1" | "2" => {
                events.push(OscEvent::Title(payload.to_string()));
                // Stripped: OSC 0/1/2 are title-only, never forwarded.
            }
            "7" => {
                events.push(OscEvent::Cwd(payload.to_string()));
                // Stripped.
            }
            "10" | "11" | "12" | "22" | "23" => {
                // Stripped: color-set / icon-title-stack queries would cause
                // host-terminal flicker if echoed into the VT parser.
            }
            _ => {
                // Unrecognized OSC (e.g. hyperlinks, OSC 8): forward unchanged.
                out.push(0x1b);
                out.push(b']');
                out.extend_from_slice(&body);
                out.push(0x07);
            }
        }
    }
}

impl Default for OscFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_osc_is_extracted_and_stripped() {
        let mut filter = OscFilter::new();
        let (forwarded, events) = filter.filter(b"hello \x1b]2;my title\x07world");
        assert_eq!(forwarded, b"hello world");
        assert_eq!(events, vec![OscEvent::Title("my title".to_string())]);
    }

    #[test]
    fn cwd_osc_is_stripped_and_reported() {
        let mut filter = OscFilter::new();
        let (forwarded, events) = filter.filter(b"\x1b]7;file:///home/me\x07x");
        assert_eq!(forwarded, b"x");
        assert_eq!(events, vec![OscEvent::Cwd("file:///home/me".to_string())]);
    }

    #[test]
    fn color_set_osc_is_stripped_with_no_event() {
        let mut filter = OscFilter::new();
        let (forwarded, events) = filter.filter(b"\x1b]10;#ffffff\x07y");
        assert_eq!(forwarded, b"y");
        assert!(events.is_empty());
    }

    #[test]
    fn unrecognized_osc_passes_through_unchanged() {
        let mut filter = OscFilter::new();
        let (forwarded, events) = filter.filter(b"\x1b]8;;http://example.com\x07link\x1b]8;;\x07");
        assert!(events.is_empty());
        assert!(forwarded.windows(2).any(|w| w == b"]8"));
    }

    #[test]
    fn sequence_split_across_two_writes_is_still_recognized() {
        let mut filter = OscFilter::new();
        let (out1, ev1) = filter.filter(b"\x1b]2;par");
        assert!(out1.is_empty());
        assert!(ev1.is_empty());
        let (out2, ev2) = filter.filter(b"tial\x07tail");
        assert_eq!(out2, b"tail");
        assert_eq!(ev2, vec![OscEvent::Title("partial".to_string())]);
    }

    #[test]
    fn string_terminator_form_is_recognized() {
        let mut filter = OscFilter::new();
        let (forwarded, events) = filter.filter(b"\x1b]1;st title\x1b\\rest");
        assert_eq!(forwarded, b"rest");
        assert_eq!(events, vec![OscEvent::Title("st title".to_string())]);
    }
}
