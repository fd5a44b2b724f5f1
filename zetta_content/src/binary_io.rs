//! Little-endian primitives shared by all codecs.
//!
//! Strings and blobs are prefixed with their byte length as `u32`. Booleans take one byte.

use std::io::{self, Read, Write};

use zetta_shared::byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

pub trait WriteBinaryExt: Write {
    fn write_bool(&mut self, value: bool) -> io::Result<()> {
        self.write_u8(value as u8)
    }

    fn write_blob(&mut self, value: &[u8]) -> io::Result<()> {
        let len = u32::try_from(value.len()).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "blob exceeds 4GB"))?;
        self.write_u32::<LittleEndian>(len)?;
        self.write_all(value)
    }

    fn write_string(&mut self, value: &str) -> io::Result<()> {
        self.write_blob(value.as_bytes())
    }
}

impl<W: Write + ?Sized> WriteBinaryExt for W {}

pub trait ReadBinaryExt: Read {
    fn read_bool(&mut self) -> io::Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(io::Error::new(io::ErrorKind::InvalidData, format!("invalid bool value {value}"))),
        }
    }

    /// Reads exactly `len` bytes. Doesn't allocate more than the reader can provide, so corrupt
    /// lengths fail with [`io::ErrorKind::UnexpectedEof`] instead of exhausting memory.
    fn read_bytes(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        Read::take(&mut *self, len as u64).read_to_end(&mut buf)?;
        if buf.len() != len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("expected {len} bytes but only {} are available", buf.len()),
            ));
        }
        Ok(buf)
    }

    fn read_blob(&mut self) -> io::Result<Vec<u8>> {
        let len = self.read_u32::<LittleEndian>()?;
        self.read_bytes(len as usize)
    }

    fn read_string(&mut self) -> io::Result<String> {
        let bytes = self.read_blob()?;
        String::from_utf8(bytes).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }

    /// Reads an `i32` that is used as a count or size and rejects negative values.
    fn read_len(&mut self) -> io::Result<usize> {
        let value = self.read_i32::<LittleEndian>()?;
        usize::try_from(value).map_err(|_| io::Error::new(io::ErrorKind::InvalidData, format!("negative length {value}")))
    }
}

impl<R: Read + ?Sized> ReadBinaryExt for R {}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn string_layout() {
        let mut buf = Vec::new();
        buf.write_string("lod").unwrap();
        assert_eq!(buf, [3, 0, 0, 0, b'l', b'o', b'd']);
        assert_eq!(Cursor::new(&buf).read_string().unwrap(), "lod");
    }

    #[test]
    fn truncated_blob() {
        let mut buf = Vec::new();
        buf.write_u32::<LittleEndian>(1_000_000).unwrap();
        buf.extend_from_slice(&[1, 2, 3]);
        let err = Cursor::new(&buf).read_blob().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn invalid_bool() {
        assert!(Cursor::new([2u8]).read_bool().is_err());
        assert!(Cursor::new([1u8]).read_bool().unwrap());
    }

    #[test]
    fn negative_len() {
        let mut buf = Vec::new();
        buf.write_i32::<LittleEndian>(-1).unwrap();
        assert_eq!(Cursor::new(&buf).read_len().unwrap_err().kind(), io::ErrorKind::InvalidData);
    }
}
