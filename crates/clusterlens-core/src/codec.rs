//! Binary field codec for the platform's internal record schemas
//!
//! Group, offset and transaction records are written with the same primitive
//! encoding as the platform's wire protocol:
//!
//! ```text
//! classic:   string = i16 length + bytes (-1 = null)
//!            bytes  = i32 length + bytes (-1 = null)
//!            array  = i32 count + elements (-1 = null)
//! flexible:  compact string/bytes/array = unsigned varint (length + 1), 0 = null
//!            every struct ends with a tagged-field section
//! ```
//!
//! All integers are big-endian. [`Reader`] never panics on short input; every
//! read checks the remaining length first and reports [`DecodeError::Truncated`].

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{DecodeError, Result};
use crate::varint::{decode_varint_u64, encode_varint_u64};

/// Cursor over an encoded record.
pub struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn ensure(&self, needed: usize, what: &'static str) -> Result<()> {
        if self.buf.len() < needed {
            return Err(DecodeError::Truncated {
                what,
                needed,
                remaining: self.buf.len(),
            });
        }
        Ok(())
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        self.ensure(1, "int8")?;
        Ok(self.buf.get_i8())
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        self.ensure(2, "int16")?;
        Ok(self.buf.get_i16())
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.ensure(4, "int32")?;
        Ok(self.buf.get_i32())
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.ensure(8, "int64")?;
        Ok(self.buf.get_i64())
    }

    pub fn read_unsigned_varint(&mut self) -> Result<u64> {
        decode_varint_u64(&mut self.buf)
    }

    fn take(&mut self, length: usize, what: &'static str) -> Result<&'a [u8]> {
        self.ensure(length, what)?;
        let (head, tail) = self.buf.split_at(length);
        self.buf = tail;
        Ok(head)
    }

    fn utf8(bytes: &[u8], what: &'static str) -> Result<String> {
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| DecodeError::InvalidUtf8(what))
    }

    /// Nullable string (int16 length + bytes, -1 for null)
    pub fn read_nullable_string(&mut self) -> Result<Option<String>> {
        let length = self.read_i16()?;
        if length < 0 {
            return Ok(None);
        }
        let bytes = self.take(length as usize, "string")?;
        Self::utf8(bytes, "string").map(Some)
    }

    /// Non-null string (int16 length + bytes)
    pub fn read_string(&mut self) -> Result<String> {
        self.read_nullable_string()?
            .ok_or(DecodeError::UnexpectedNull("string"))
    }

    /// Compact nullable string (unsigned varint length + 1, 0 for null)
    pub fn read_compact_nullable_string(&mut self) -> Result<Option<String>> {
        let length = self.read_unsigned_varint()?;
        if length == 0 {
            return Ok(None);
        }
        let bytes = self.take(length as usize - 1, "compact string")?;
        Self::utf8(bytes, "compact string").map(Some)
    }

    pub fn read_compact_string(&mut self) -> Result<String> {
        self.read_compact_nullable_string()?
            .ok_or(DecodeError::UnexpectedNull("compact string"))
    }

    /// Nullable bytes (int32 length + bytes, -1 for null)
    pub fn read_nullable_bytes(&mut self) -> Result<Option<&'a [u8]>> {
        let length = self.read_i32()?;
        if length < 0 {
            return Ok(None);
        }
        self.take(length as usize, "bytes").map(Some)
    }

    pub fn read_compact_nullable_bytes(&mut self) -> Result<Option<&'a [u8]>> {
        let length = self.read_unsigned_varint()?;
        if length == 0 {
            return Ok(None);
        }
        self.take(length as usize - 1, "compact bytes").map(Some)
    }

    /// Nullable array (int32 count + elements, -1 for null)
    pub fn read_nullable_array<T, F>(&mut self, mut element: F) -> Result<Option<Vec<T>>>
    where
        F: FnMut(&mut Self) -> Result<T>,
    {
        let count = self.read_i32()?;
        if count < 0 {
            return Ok(None);
        }
        // Every element occupies at least one byte
        self.ensure(count as usize, "array")?;
        let mut elements = Vec::with_capacity(count as usize);
        for _ in 0..count {
            elements.push(element(self)?);
        }
        Ok(Some(elements))
    }

    /// Array where null decodes as empty
    pub fn read_array<T, F>(&mut self, element: F) -> Result<Vec<T>>
    where
        F: FnMut(&mut Self) -> Result<T>,
    {
        Ok(self.read_nullable_array(element)?.unwrap_or_default())
    }

    pub fn read_compact_nullable_array<T, F>(&mut self, mut element: F) -> Result<Option<Vec<T>>>
    where
        F: FnMut(&mut Self) -> Result<T>,
    {
        let count = self.read_unsigned_varint()?;
        if count == 0 {
            return Ok(None);
        }
        let count = count as usize - 1;
        self.ensure(count, "compact array")?;
        let mut elements = Vec::with_capacity(count);
        for _ in 0..count {
            elements.push(element(self)?);
        }
        Ok(Some(elements))
    }

    pub fn read_compact_array<T, F>(&mut self, element: F) -> Result<Vec<T>>
    where
        F: FnMut(&mut Self) -> Result<T>,
    {
        Ok(self.read_compact_nullable_array(element)?.unwrap_or_default())
    }

    /// Skip a tagged-field section (flexible versions)
    pub fn skip_tagged_fields(&mut self) -> Result<()> {
        let count = self.read_unsigned_varint()?;
        for _ in 0..count {
            let _tag = self.read_unsigned_varint()?;
            let size = self.read_unsigned_varint()? as usize;
            self.take(size, "tagged field")?;
        }
        Ok(())
    }
}

/// Field readers that pick the classic or compact form from the record's
/// schema version.
impl<'a> Reader<'a> {
    pub fn string(&mut self, flexible: bool) -> Result<String> {
        if flexible {
            self.read_compact_string()
        } else {
            self.read_string()
        }
    }

    pub fn nullable_string(&mut self, flexible: bool) -> Result<Option<String>> {
        if flexible {
            self.read_compact_nullable_string()
        } else {
            self.read_nullable_string()
        }
    }

    pub fn nullable_bytes(&mut self, flexible: bool) -> Result<Option<&'a [u8]>> {
        if flexible {
            self.read_compact_nullable_bytes()
        } else {
            self.read_nullable_bytes()
        }
    }

    pub fn nullable_array<T, F>(&mut self, flexible: bool, element: F) -> Result<Option<Vec<T>>>
    where
        F: FnMut(&mut Self) -> Result<T>,
    {
        if flexible {
            self.read_compact_nullable_array(element)
        } else {
            self.read_nullable_array(element)
        }
    }

    pub fn array<T, F>(&mut self, flexible: bool, element: F) -> Result<Vec<T>>
    where
        F: FnMut(&mut Self) -> Result<T>,
    {
        Ok(self.nullable_array(flexible, element)?.unwrap_or_default())
    }

    /// Skip the struct's tagged-field section; classic versions have none.
    pub fn tagged_fields(&mut self, flexible: bool) -> Result<()> {
        if flexible {
            self.skip_tagged_fields()
        } else {
            Ok(())
        }
    }
}

/// Encoder mirroring [`Reader`]; used to produce records in the same layout.
#[derive(Default)]
pub struct Writer {
    buf: BytesMut,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_i8(&mut self, value: i8) -> &mut Self {
        self.buf.put_i8(value);
        self
    }

    pub fn put_i16(&mut self, value: i16) -> &mut Self {
        self.buf.put_i16(value);
        self
    }

    pub fn put_i32(&mut self, value: i32) -> &mut Self {
        self.buf.put_i32(value);
        self
    }

    pub fn put_i64(&mut self, value: i64) -> &mut Self {
        self.buf.put_i64(value);
        self
    }

    pub fn put_unsigned_varint(&mut self, value: u64) -> &mut Self {
        encode_varint_u64(&mut self.buf, value);
        self
    }

    pub fn put_nullable_string(&mut self, value: Option<&str>) -> &mut Self {
        match value {
            Some(s) => {
                self.buf.put_i16(s.len() as i16);
                self.buf.extend_from_slice(s.as_bytes());
            }
            None => self.buf.put_i16(-1),
        }
        self
    }

    pub fn put_string(&mut self, value: &str) -> &mut Self {
        self.put_nullable_string(Some(value))
    }

    pub fn put_compact_nullable_string(&mut self, value: Option<&str>) -> &mut Self {
        match value {
            Some(s) => {
                encode_varint_u64(&mut self.buf, (s.len() + 1) as u64);
                self.buf.extend_from_slice(s.as_bytes());
            }
            None => encode_varint_u64(&mut self.buf, 0),
        }
        self
    }

    pub fn put_compact_string(&mut self, value: &str) -> &mut Self {
        self.put_compact_nullable_string(Some(value))
    }

    pub fn put_nullable_bytes(&mut self, value: Option<&[u8]>) -> &mut Self {
        match value {
            Some(b) => {
                self.buf.put_i32(b.len() as i32);
                self.buf.extend_from_slice(b);
            }
            None => self.buf.put_i32(-1),
        }
        self
    }

    pub fn put_compact_nullable_bytes(&mut self, value: Option<&[u8]>) -> &mut Self {
        match value {
            Some(b) => {
                encode_varint_u64(&mut self.buf, (b.len() + 1) as u64);
                self.buf.extend_from_slice(b);
            }
            None => encode_varint_u64(&mut self.buf, 0),
        }
        self
    }

    /// Array header (int32 count); the caller writes the elements.
    pub fn put_array_len(&mut self, count: usize) -> &mut Self {
        self.buf.put_i32(count as i32);
        self
    }

    /// Compact array header (count + 1); the caller writes the elements.
    pub fn put_compact_array_len(&mut self, count: usize) -> &mut Self {
        encode_varint_u64(&mut self.buf, (count + 1) as u64);
        self
    }

    pub fn put_empty_tagged_fields(&mut self) -> &mut Self {
        encode_varint_u64(&mut self.buf, 0);
        self
    }

    pub fn into_bytes(self) -> bytes::Bytes {
        self.buf.freeze()
    }
}

impl Writer {
    pub fn string(&mut self, flexible: bool, value: &str) -> &mut Self {
        self.nullable_string(flexible, Some(value))
    }

    pub fn nullable_string(&mut self, flexible: bool, value: Option<&str>) -> &mut Self {
        if flexible {
            self.put_compact_nullable_string(value)
        } else {
            self.put_nullable_string(value)
        }
    }

    pub fn nullable_bytes(&mut self, flexible: bool, value: Option<&[u8]>) -> &mut Self {
        if flexible {
            self.put_compact_nullable_bytes(value)
        } else {
            self.put_nullable_bytes(value)
        }
    }

    pub fn array_len(&mut self, flexible: bool, count: usize) -> &mut Self {
        if flexible {
            self.put_compact_array_len(count)
        } else {
            self.put_array_len(count)
        }
    }

    pub fn null_array(&mut self, flexible: bool) -> &mut Self {
        if flexible {
            self.put_unsigned_varint(0)
        } else {
            self.put_i32(-1)
        }
    }

    pub fn tagged_fields(&mut self, flexible: bool) -> &mut Self {
        if flexible {
            self.put_empty_tagged_fields()
        } else {
            self
        }
    }
}
