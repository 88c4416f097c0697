//! Byte encodings: catalog chunk keys and the little-endian primitives used
//! by the layout serializer.

pub mod key;

use crate::error::EncodingError;

/// Append-only little-endian writer.
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_bool(&mut self, v: bool) {
        self.buf.push(v as u8);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    /// `u32` length followed by the UTF-8 bytes.
    pub fn put_str(&mut self, v: &str) {
        self.put_u32(v.len() as u32);
        self.put_bytes(v.as_bytes());
    }

    /// `u32` size (0 when absent) followed by the NUL-terminated text.
    pub fn put_cstring(&mut self, v: Option<&str>) {
        match v {
            Some(text) => {
                self.put_u32(text.len() as u32 + 1);
                self.put_bytes(text.as_bytes());
                self.put_u8(0);
            }
            None => self.put_u32(0),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Bounds-checked little-endian reader over a byte slice.
#[derive(Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], EncodingError> {
        if self.remaining() < n {
            return Err(EncodingError::Truncated {
                what,
                needed: n,
                remaining: self.remaining(),
            });
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self, what: &'static str) -> Result<[u8; N], EncodingError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, what)?);
        Ok(out)
    }

    pub fn u8(&mut self, what: &'static str) -> Result<u8, EncodingError> {
        Ok(self.take(1, what)?[0])
    }

    pub fn bool(&mut self, what: &'static str) -> Result<bool, EncodingError> {
        match self.u8(what)? {
            0 => Ok(false),
            1 => Ok(true),
            tag => Err(EncodingError::InvalidTag {
                what,
                tag: tag.into(),
            }),
        }
    }

    pub fn u16(&mut self, what: &'static str) -> Result<u16, EncodingError> {
        self.array(what).map(u16::from_le_bytes)
    }

    pub fn i16(&mut self, what: &'static str) -> Result<i16, EncodingError> {
        self.array(what).map(i16::from_le_bytes)
    }

    pub fn u32(&mut self, what: &'static str) -> Result<u32, EncodingError> {
        self.array(what).map(u32::from_le_bytes)
    }

    pub fn i32(&mut self, what: &'static str) -> Result<i32, EncodingError> {
        self.array(what).map(i32::from_le_bytes)
    }

    pub fn u64(&mut self, what: &'static str) -> Result<u64, EncodingError> {
        self.array(what).map(u64::from_le_bytes)
    }

    pub fn str(&mut self, what: &'static str) -> Result<String, EncodingError> {
        let len = self.u32(what)? as usize;
        let bytes = self.take(len, what)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| EncodingError::InvalidUtf8(what))
    }

    pub fn cstring(&mut self, what: &'static str) -> Result<Option<String>, EncodingError> {
        let size = self.u32(what)? as usize;
        if size == 0 {
            return Ok(None);
        }
        let bytes = self.take(size, what)?;
        let Some((&0, text)) = bytes.split_last() else {
            return Err(EncodingError::MissingTerminator(what));
        };
        String::from_utf8(text.to_vec())
            .map(Some)
            .map_err(|_| EncodingError::InvalidUtf8(what))
    }

    /// Fail unless every byte has been consumed.
    pub fn finish(&self) -> Result<(), EncodingError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(EncodingError::TrailingBytes(n)),
        }
    }
}
