//! The few ESC/POS commands this server sends.
//!
//! Covers what a receipt and a drawer kick need. Graphics, barcodes and code pages are left to the
//! printer defaults.

const ESC: u8 = 0x1B;
const GS: u8 = 0x1D;
const LF: u8 = 0x0A;

/// `ESC @`: clear the print buffer and reset modes.
pub const INIT: [u8; 2] = [ESC, b'@'];

/// `GS V 0`: full cut at the current position.
pub const CUT_FULL: [u8; 3] = [GS, b'V', 0x00];

/// `GS V 1`: partial cut, leaving one point attached.
pub const CUT_PARTIAL: [u8; 3] = [GS, b'V', 0x01];

/// Drawer pulse on time, in 2 ms units.
const PULSE_ON: u8 = 0x19;
/// Drawer pulse off time, in 2 ms units.
const PULSE_OFF: u8 = 0xFA;

/// `ESC p m t1 t2`: pulse the cash drawer connector pin.
///
/// Pin 2 is `m = 0`, pin 5 is `m = 1`. Any other pin falls back to pin 2.
pub fn kick_drawer(pin: u8) -> [u8; 5] {
    let m = if pin == 5 { 0x01 } else { 0x00 };
    [ESC, b'p', m, PULSE_ON, PULSE_OFF]
}

/// Map text to bytes the printer's default code page can print. Non-ASCII becomes `?`.
pub fn encode_text(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
        .collect()
}

/// Accumulates a print job.
#[derive(Debug, Clone)]
pub struct CommandBuffer {
    bytes: Vec<u8>,
}

impl Default for CommandBuffer {
    fn default() -> Self {
        CommandBuffer::new()
    }
}

impl CommandBuffer {
    /// Start a job with `ESC @`.
    pub fn new() -> Self {
        CommandBuffer {
            bytes: INIT.to_vec(),
        }
    }

    pub fn emphasis(&mut self, on: bool) -> &mut Self {
        self.bytes.extend_from_slice(&[ESC, b'E', u8::from(on)]);
        self
    }

    pub fn text(&mut self, text: &str) -> &mut Self {
        self.bytes.extend(encode_text(text));
        self
    }

    pub fn line(&mut self, text: &str) -> &mut Self {
        self.text(text);
        self.bytes.push(LF);
        self
    }

    /// `ESC d n`: print the buffer and feed `n` lines.
    pub fn feed(&mut self, lines: u8) -> &mut Self {
        self.bytes.extend_from_slice(&[ESC, b'd', lines]);
        self
    }

    pub fn cut(&mut self, partial: bool) -> &mut Self {
        if partial {
            self.bytes.extend_from_slice(&CUT_PARTIAL);
        } else {
            self.bytes.extend_from_slice(&CUT_FULL);
        }
        self
    }

    pub fn kick_drawer(&mut self, pin: u8) -> &mut Self {
        self.bytes.extend_from_slice(&kick_drawer(pin));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        self.bytes.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drawer_pins() {
        assert_eq!(kick_drawer(2), [0x1B, 0x70, 0x00, 0x19, 0xFA]);
        assert_eq!(kick_drawer(5), [0x1B, 0x70, 0x01, 0x19, 0xFA]);
    }

    #[test]
    fn replaces_non_ascii() {
        assert_eq!(encode_text("Café 2€"), b"Caf? 2?".to_vec());
    }

    #[test]
    fn builds_a_job_in_order() {
        let job = CommandBuffer::new()
            .emphasis(true)
            .line("HI")
            .emphasis(false)
            .feed(3)
            .cut(false)
            .build();
        assert_eq!(
            job,
            vec![
                0x1B, b'@', 0x1B, b'E', 1, b'H', b'I', 0x0A, 0x1B, b'E', 0, 0x1B, b'd', 3, 0x1D,
                b'V', 0,
            ]
        );
    }
}
