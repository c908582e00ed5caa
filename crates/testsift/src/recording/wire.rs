//! Big-endian primitive reader/writer shared by the recording and snapshot codecs.

use crate::coverage::CoverageBitSet;
use crate::result::{SiftError, SiftResult};

/// Append-only big-endian encoder
#[derive(Debug, Default)]
pub(crate) struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub(crate) fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub(crate) fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub(crate) fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub(crate) fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub(crate) fn i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub(crate) fn f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_bits().to_be_bytes());
    }

    pub(crate) fn str(&mut self, v: &str) {
        self.u32(v.len() as u32);
        self.buf.extend_from_slice(v.as_bytes());
    }

    pub(crate) fn raw(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    pub(crate) fn opt_str(&mut self, v: Option<&str>) {
        match v {
            Some(s) => {
                self.u8(1);
                self.str(s);
            }
            None => self.u8(0),
        }
    }

    /// Word count followed by the packed words, trailing zero words dropped
    pub(crate) fn bitset(&mut self, bits: &CoverageBitSet) {
        let words = bits.words();
        let used = words.iter().rposition(|&w| w != 0).map_or(0, |i| i + 1);
        self.u32(used as u32);
        for &word in &words[..used] {
            self.u64(word);
        }
    }
}

/// Cursor over a borrowed byte slice; every read is bounds-checked
#[derive(Debug)]
pub(crate) struct WireReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    context: &'static str,
}

impl<'a> WireReader<'a> {
    pub(crate) fn new(bytes: &'a [u8], context: &'static str) -> Self {
        Self {
            bytes,
            pos: 0,
            context,
        }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> SiftResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(SiftError::Truncated {
                context: self.context,
            });
        }
        let out = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> SiftResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Exactly `n` raw bytes
    pub(crate) fn raw(&mut self, n: usize) -> SiftResult<&'a [u8]> {
        self.take(n)
    }

    /// Everything not read yet
    pub(crate) fn rest(&mut self) -> &'a [u8] {
        let out = &self.bytes[self.pos..];
        self.pos = self.bytes.len();
        out
    }

    pub(crate) fn u8(&mut self) -> SiftResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u32(&mut self) -> SiftResult<u32> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub(crate) fn i32(&mut self) -> SiftResult<i32> {
        Ok(i32::from_be_bytes(self.array()?))
    }

    pub(crate) fn u64(&mut self) -> SiftResult<u64> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    pub(crate) fn i64(&mut self) -> SiftResult<i64> {
        Ok(i64::from_be_bytes(self.array()?))
    }

    pub(crate) fn f64(&mut self) -> SiftResult<f64> {
        Ok(f64::from_bits(u64::from_be_bytes(self.array()?)))
    }

    pub(crate) fn str(&mut self) -> SiftResult<String> {
        let len = self.u32()? as usize;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|e| SiftError::decode(self.context, format!("invalid UTF-8: {e}")))
    }

    pub(crate) fn opt_str(&mut self) -> SiftResult<Option<String>> {
        match self.u8()? {
            0 => Ok(None),
            1 => Ok(Some(self.str()?)),
            flag => Err(SiftError::decode(
                self.context,
                format!("invalid optional flag {flag}"),
            )),
        }
    }

    pub(crate) fn bitset(&mut self) -> SiftResult<CoverageBitSet> {
        let count = self.u32()? as usize;
        // reject counts the input cannot possibly hold before allocating
        if count > self.remaining() / 8 {
            return Err(SiftError::Truncated {
                context: self.context,
            });
        }
        let mut words = Vec::with_capacity(count);
        for _ in 0..count {
            words.push(self.u64()?);
        }
        Ok(CoverageBitSet::from_words(words))
    }

    /// Fail if bytes are left over
    pub(crate) fn finish(&self) -> SiftResult<()> {
        if self.remaining() == 0 {
            Ok(())
        } else {
            Err(SiftError::decode(
                self.context,
                format!("{} trailing bytes", self.remaining()),
            ))
        }
    }
}
