use std::vec::Vec;

/// Serial bus monitor reassembling words from sampled pin levels.
///
/// Data is captured on the selected clock edge while the frame is active. A word is complete
/// when the frame ends.
pub struct Monitor {
    rising: bool,
    clk: bool,
    active: bool,
    word: u32,
    bits: u8,
    words: Vec<(u32, u8)>,
}

impl Monitor {
    /// Capture on the falling clock edge (DAC).
    pub fn falling() -> Self {
        Self::new(false)
    }

    /// Capture on the rising clock edge (PGIA shift register).
    pub fn rising() -> Self {
        Self::new(true)
    }

    fn new(rising: bool) -> Self {
        Self {
            rising,
            clk: false,
            active: false,
            word: 0,
            bits: 0,
            words: Vec::new(),
        }
    }

    pub fn sample(&mut self, active: bool, clk: bool, data: bool) {
        let edge = if self.rising {
            !self.clk && clk
        } else {
            self.clk && !clk
        };
        if active && edge {
            self.word = (self.word << 1) | data as u32;
            self.bits += 1;
        }
        if self.active && !active {
            self.end();
        }
        self.clk = clk;
        self.active = active;
    }

    /// Terminate the current frame.
    pub fn end(&mut self) {
        if self.bits > 0 {
            self.words.push((self.word, self.bits));
        }
        self.word = 0;
        self.bits = 0;
    }

    /// Completed words and their lengths in bits.
    pub fn words(&self) -> &[(u32, u8)] {
        &self.words
    }
}
