//! Opcode dispatch tables
//!
//! Instruction families are described by bit masks such as
//! `"0111 ---0 ---- ----"`: `0` and `1` are fixed bits, `-` is a don't-care
//! bit, and whitespace is ignored. Installing a mask expands every don't-care
//! combination and binds the same handler to each matching slot. Slots no mask
//! touches keep the table's invalid handler.

/// Name reported for slots that were never installed
pub const INVALID: &str = "invalid";

/// A parsed opcode bit mask
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeMask {
    /// Sample value with every don't-care bit cleared
    value: u32,
    /// Bits fixed by the mask
    care: u32,
    width: u32,
}

impl OpcodeMask {
    /// Parse a mask left to right. Characters other than `0`, `1` and `-`
    /// are skipped. Masks are at most 32 bits wide.
    pub fn parse(pattern: &str) -> Self {
        let mut value = 0u32;
        let mut care = 0u32;
        let mut width = 0u32;

        for ch in pattern.chars() {
            let (bit, fixed) = match ch {
                '0' => (0, 1),
                '1' => (1, 1),
                '-' => (0, 0),
                _ => continue,
            };
            value = (value << 1) | bit;
            care = (care << 1) | fixed;
            width += 1;
        }

        Self { value, care, width }
    }

    /// The single concrete opcode obtained by reading `-` as `0`
    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn care(&self) -> u32 {
        self.care
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    fn free_bits(&self) -> u32 {
        let all = if self.width >= 32 { u32::MAX } else { (1u32 << self.width) - 1 };
        all & !self.care
    }

    pub fn matches(&self, opcode: u32) -> bool {
        opcode & self.care == self.value && opcode & !(self.free_bits() | self.care) == 0
    }

    /// Every concrete opcode the mask matches
    pub fn expand(&self) -> Expansion {
        let free = self.free_bits();
        Expansion { base: self.value, free, next: Some(free) }
    }
}

/// Iterator over the opcodes matched by an [`OpcodeMask`]
#[derive(Debug, Clone)]
pub struct Expansion {
    base: u32,
    free: u32,
    next: Option<u32>,
}

impl Iterator for Expansion {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        let current = self.next?;
        // Walk the submasks of `free` downwards
        self.next = if current == 0 { None } else { Some((current - 1) & self.free) };
        Some(self.base | current)
    }
}

/// One dispatch slot
#[derive(Debug, Clone, Copy)]
pub struct Entry<H> {
    pub name: &'static str,
    pub handler: H,
}

/// Dense opcode table of `2^bits` slots
pub struct OpcodeTable<H: Copy> {
    entries: Box<[Entry<H>]>,
    bits: u32,
}

impl<H: Copy> OpcodeTable<H> {
    /// Build a table where every slot holds `invalid`
    pub fn new(bits: u32, invalid: H) -> Self {
        let entries = vec![Entry { name: INVALID, handler: invalid }; 1usize << bits];
        Self { entries: entries.into_boxed_slice(), bits }
    }

    /// Bind `handler` to every opcode matched by `pattern`, replacing whatever
    /// was there. Returns the number of slots written.
    pub fn install(&mut self, pattern: &str, name: &'static str, handler: H) -> usize {
        let mask = OpcodeMask::parse(pattern);
        debug_assert_eq!(mask.width(), self.bits, "mask {pattern:?} does not fit the table");

        let mut installed = 0;
        for opcode in mask.expand() {
            if let Some(slot) = self.entries.get_mut(opcode as usize) {
                *slot = Entry { name, handler };
                installed += 1;
            }
        }
        installed
    }

    #[inline]
    pub fn lookup(&self, opcode: u32) -> &Entry<H> {
        &self.entries[opcode as usize & (self.entries.len() - 1)]
    }

    #[inline]
    pub fn handler(&self, opcode: u32) -> H {
        self.lookup(opcode).handler
    }

    pub fn name(&self, opcode: u32) -> &'static str {
        self.lookup(opcode).name
    }

    pub fn is_installed(&self, opcode: u32) -> bool {
        self.name(opcode) != INVALID
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of slots that still hold the invalid handler
    pub fn unassigned(&self) -> usize {
        self.entries.iter().filter(|e| e.name == INVALID).count()
    }
}
