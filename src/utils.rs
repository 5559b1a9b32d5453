use zerocopy::AsBytes;

/// A zero-initialized byte buffer whose start is 8-byte aligned
///
/// TDH structures (`TRACE_EVENT_INFO`, `EVENT_MAP_INFO`...) contain 8-byte fields, so the buffers
/// they are written into must be aligned accordingly.
#[derive(Clone, Default)]
pub struct AlignedBuffer {
    words: Vec<u64>,
    len: usize,
}

impl AlignedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_len(len: usize) -> Self {
        let mut buffer = Self::new();
        buffer.resize(len);
        buffer
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut buffer = Self::with_len(bytes.len());
        buffer.as_bytes_mut().copy_from_slice(bytes);
        buffer
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Grow (or shrink) to `len` bytes. Newly exposed bytes are zeroed.
    pub fn resize(&mut self, len: usize) {
        self.words.resize((len + 7) / 8, 0);
        if len < self.len {
            let end = self.words.len() * 8;
            self.words.as_mut_slice().as_bytes_mut()[len..end].fill(0);
        }
        self.len = len;
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.words.as_slice().as_bytes()[..self.len]
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        let len = self.len;
        &mut self.words.as_mut_slice().as_bytes_mut()[..len]
    }
}

impl std::fmt::Debug for AlignedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBuffer")
            .field("len", &self.len)
            .finish()
    }
}

fn split_radix(s: &str) -> (u32, &str) {
    let lower = |p: &str| {
        s.len() > p.len() && s.as_bytes()[..p.len()].eq_ignore_ascii_case(p.as_bytes())
    };
    if lower("0x") {
        (16, &s[2..])
    } else if lower("0o") {
        (8, &s[2..])
    } else if lower("0b") {
        (2, &s[2..])
    } else if s.len() > 1 && s.starts_with('0') {
        (8, &s[1..])
    } else {
        (10, s)
    }
}

fn parse_digits(s: &str) -> Option<u64> {
    let (radix, digits) = split_radix(s);
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    u64::from_str_radix(digits, radix).ok()
}

/// Parse an unsigned integer, honouring `0x`, `0o`, `0b` and leading-`0` (octal) prefixes
pub fn parse_uint_prefixed(s: &str) -> Option<u64> {
    parse_digits(s.strip_prefix('+').unwrap_or(s))
}

/// Signed counterpart of [`parse_uint_prefixed`]
pub fn parse_int_prefixed(s: &str) -> Option<i64> {
    match s.strip_prefix('-') {
        Some(rest) => {
            let magnitude = parse_digits(rest)?;
            if magnitude == 1 << 63 {
                Some(i64::MIN)
            } else {
                i64::try_from(magnitude).ok().map(|m| -m)
            }
        }
        None => i64::try_from(parse_uint_prefixed(s)?).ok(),
    }
}

/// Decode a little-endian, null-terminated UTF-16 string at the start of `bytes`
///
/// Returns the string and the number of bytes consumed (terminator included),
/// or `None` when no terminator is found.
pub fn read_utf16z(bytes: &[u8]) -> Option<(String, usize)> {
    let units = utf16_units(bytes);
    let end = units.iter().position(|&u| u == 0)?;
    let s = widestring::decode_utf16_lossy(units[..end].iter().copied()).collect::<String>();
    Some((s, (end + 1) * 2))
}

/// Decode UTF-16 up to the first null, or up to the end of `bytes`
pub fn read_utf16_lossy(bytes: &[u8]) -> String {
    let units = utf16_units(bytes);
    let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
    widestring::decode_utf16_lossy(units[..end].iter().copied()).collect()
}

pub fn utf16_units(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect()
}

/// Size in bytes of the UTF-16 string at the start of `bytes`, terminator included
pub fn utf16z_size(bytes: &[u8]) -> Option<usize> {
    bytes
        .chunks_exact(2)
        .position(|c| c == [0, 0])
        .map(|i| (i + 1) * 2)
}

/// Size in bytes of the ANSI string at the start of `bytes`, terminator included
pub fn ansiz_size(bytes: &[u8]) -> Option<usize> {
    bytes.iter().position(|b| *b == 0).map(|i| i + 1)
}

/// Read a little-endian unsigned integer of 1, 2, 4 or 8 bytes
pub fn read_uint_le(bytes: &[u8]) -> Option<u64> {
    match bytes.len() {
        1 => Some(bytes[0] as u64),
        2 => Some(u16::from_le_bytes([bytes[0], bytes[1]]) as u64),
        4 => Some(u32::from_le_bytes(bytes.try_into().ok()?) as u64),
        8 => Some(u64::from_le_bytes(bytes.try_into().ok()?)),
        _ => None,
    }
}
