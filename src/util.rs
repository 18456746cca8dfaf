use bytes::{Buf, BufMut};

#[inline]
fn ensure<B: Buf>(b: &B, n: usize, what: &str) -> Result<(), crate::Error> {
    if b.remaining() < n {
        return Err(crate::Error::protocol(format!(
            "truncated {} (need {} bytes, {} left)",
            what,
            n,
            b.remaining()
        )));
    }
    Ok(())
}

pub(crate) fn get_u8<B: Buf>(mut b: B) -> Result<u8, crate::Error> {
    ensure(&b, 1, "byte")?;
    Ok(b.get_u8())
}

pub(crate) fn get_u16<B: Buf>(mut b: B) -> Result<u16, crate::Error> {
    ensure(&b, 2, "uint16")?;
    Ok(b.get_u16())
}

pub(crate) fn get_u32<B: Buf>(mut b: B) -> Result<u32, crate::Error> {
    ensure(&b, 4, "uint32")?;
    Ok(b.get_u32())
}

pub(crate) fn get_bytes<B: Buf>(mut b: B, len: usize) -> Result<Vec<u8>, crate::Error> {
    ensure(&b, len, "byte string")?;
    let mut s = vec![0u8; len];
    b.copy_to_slice(&mut s[..]);
    Ok(s)
}

pub(crate) fn get_ssh_string<B: Buf>(mut b: B) -> Result<Vec<u8>, crate::Error> {
    let len = get_u32(&mut b)?;
    get_bytes(b, len as usize)
}

pub(crate) fn put_ssh_string<B: BufMut>(mut b: B, s: &[u8]) {
    let len = s.len() as u32;
    b.put_u32(len);
    b.put_slice(s);
}

/// Read an SSH-1 multiple precision integer: `u16 bits` followed by
/// `(bits + 7) / 8` bytes, msb first.
pub(crate) fn get_mpint1<B: Buf>(mut b: B) -> Result<Vec<u8>, crate::Error> {
    let bits = get_u16(&mut b)? as usize;
    get_bytes(b, (bits + 7) / 8)
}

/// Write an SSH-1 multiple precision integer from its big-endian magnitude.
pub(crate) fn put_mpint1<B: BufMut>(mut b: B, magnitude: &[u8]) {
    let magnitude = strip_leading_zeros(magnitude);
    b.put_u16((magnitude.len() * 8) as u16);
    b.put_slice(magnitude);
}

/// Read an SSH-2 multiple precision integer as its big-endian magnitude.
pub(crate) fn get_mpint2<B: Buf>(b: B) -> Result<Vec<u8>, crate::Error> {
    get_ssh_string(b)
}

/// Write an SSH-2 multiple precision integer.
///
/// Leading zero bytes are stripped and no sign byte is inserted, which is how
/// the legacy peers this crate talks to encode their values.
pub(crate) fn put_mpint2<B: BufMut>(b: B, magnitude: &[u8]) {
    put_ssh_string(b, strip_leading_zeros(magnitude));
}

fn strip_leading_zeros(s: &[u8]) -> &[u8] {
    let n = s.iter().take_while(|&&c| c == 0).count();
    &s[n..]
}
