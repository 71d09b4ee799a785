//! The [`Serializable`] trait and its implementations for primitive types.
//!
//! Encoding rules:
//! * Integers are little-endian.
//! * Byte strings and text are length-prefixed and zero-padded to 4-byte
//!   alignment (1-byte prefix up to 253 bytes, `0xfe` + 3-byte prefix above).
//! * Lists are a 4-byte count followed by the items.

/// Serialize `self` into Capone wire format.
pub trait Serializable {
    /// Appends the serialized form of `self` to `buf`.
    fn serialize(&self, buf: &mut impl Extend<u8>);

    /// Convenience: allocate a fresh `Vec<u8>` and serialize into it.
    fn to_bytes(&self) -> Vec<u8> {
        let mut v = Vec::new();
        self.serialize(&mut v);
        v
    }
}

// ─── integers ────────────────────────────────────────────────────────────────

impl Serializable for i32 {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        buf.extend(self.to_le_bytes());
    }
}

impl Serializable for u32 {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        buf.extend(self.to_le_bytes());
    }
}

impl Serializable for [u8; 32] {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        buf.extend(self.iter().copied());
    }
}

impl Serializable for [u8; 64] {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        buf.extend(self.iter().copied());
    }
}

// ─── strings / bytes ─────────────────────────────────────────────────────────

/// Length-prefixed, 4-byte aligned byte string.
///
/// * If `len ≤ 253`: `[len as u8][data][0-padding to align to 4 bytes]`
/// * If `len ≥ 254`: `[0xfe][len as 3 LE bytes][data][0-padding]`
impl Serializable for &[u8] {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        let len = self.len();
        let (header_len, header): (usize, Vec<u8>) = if len <= 253 {
            (1, vec![len as u8])
        } else {
            (4, vec![
                0xfe,
                (len & 0xff) as u8,
                ((len >> 8) & 0xff) as u8,
                ((len >> 16) & 0xff) as u8,
            ])
        };

        let total = header_len + len;
        let padding = (4 - (total % 4)) % 4;

        buf.extend(header);
        buf.extend(self.iter().copied());
        buf.extend(std::iter::repeat(0u8).take(padding));
    }
}

impl Serializable for Vec<u8> {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.as_slice().serialize(buf);
    }
}

impl Serializable for String {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.as_bytes().serialize(buf);
    }
}

// ─── lists ───────────────────────────────────────────────────────────────────

/// A count followed by the serialized items, no per-item framing.
impl<T: Serializable> Serializable for Vec<T> {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        (self.len() as u32).serialize(buf);
        for item in self { item.serialize(buf); }
    }
}
