use crate::errors::{RegistryError, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

const MAX_STRING_LENGTH: usize = 1 << 20;

pub trait RegistryReader {
    fn read_fstring(&mut self) -> Result<String>;
    fn read_count(&mut self, max_elements: usize) -> Result<usize>;
    fn read_tarray<T, F>(&mut self, reader_fn: F, max_elements: usize) -> Result<Vec<T>>
    where
        F: FnMut(&mut Self) -> Result<T>;
}

impl<R: Read> RegistryReader for R {
    fn read_fstring(&mut self) -> Result<String> {
        let size = self.read_i32::<LittleEndian>()?;

        if size == 0 {
            return Ok(String::new());
        }

        let load_ucs2_char = size < 0;
        let actual_size = size.unsigned_abs() as usize;
        if actual_size > MAX_STRING_LENGTH {
            return Err(RegistryError::InvalidArraySize(size));
        }

        let byte_size = if load_ucs2_char {
            actual_size * 2
        } else {
            actual_size
        };

        let mut buffer = vec![0u8; byte_size];
        self.read_exact(&mut buffer)?;

        // Remove null terminator
        if load_ucs2_char {
            buffer.truncate(byte_size - 2);
            let u16_vec: Vec<u16> = buffer
                .chunks_exact(2)
                .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
                .collect();
            String::from_utf16(&u16_vec).map_err(|_| RegistryError::InvalidUtf16)
        } else {
            buffer.truncate(byte_size - 1);
            String::from_utf8(buffer).map_err(|e| e.into())
        }
    }

    fn read_count(&mut self, max_elements: usize) -> Result<usize> {
        let n = self.read_i32::<LittleEndian>()?;

        if n < 0 || n as usize > max_elements {
            return Err(RegistryError::InvalidArraySize(n));
        }
        Ok(n as usize)
    }

    fn read_tarray<T, F>(&mut self, mut reader_fn: F, max_elements: usize) -> Result<Vec<T>>
    where
        F: FnMut(&mut Self) -> Result<T>,
    {
        let n = self.read_count(max_elements)?;

        // Cap the up-front reservation, the count comes from untrusted input
        let mut array = Vec::with_capacity(n.min(4096));
        for _ in 0..n {
            array.push(reader_fn(self)?);
        }
        Ok(array)
    }
}

pub trait RegistryWriter {
    fn write_fstring(&mut self, value: &str) -> Result<()>;
    fn write_count(&mut self, count: usize) -> Result<()>;
    fn write_tarray<T, F>(&mut self, items: &[T], writer_fn: F) -> Result<()>
    where
        F: FnMut(&mut Self, &T) -> Result<()>;
}

impl<W: Write> RegistryWriter for W {
    fn write_fstring(&mut self, value: &str) -> Result<()> {
        if value.is_empty() {
            self.write_i32::<LittleEndian>(0)?;
            return Ok(());
        }

        let bytes = value.as_bytes();
        if bytes.len() >= MAX_STRING_LENGTH {
            return Err(RegistryError::InvalidArraySize(i32::MAX));
        }

        // Length includes the null terminator
        self.write_i32::<LittleEndian>(bytes.len() as i32 + 1)?;
        self.write_all(bytes)?;
        self.write_u8(0)?;
        Ok(())
    }

    fn write_count(&mut self, count: usize) -> Result<()> {
        let n = i32::try_from(count).map_err(|_| RegistryError::InvalidArraySize(i32::MAX))?;
        self.write_i32::<LittleEndian>(n)?;
        Ok(())
    }

    fn write_tarray<T, F>(&mut self, items: &[T], mut writer_fn: F) -> Result<()>
    where
        F: FnMut(&mut Self, &T) -> Result<()>,
    {
        self.write_count(items.len())?;
        for item in items {
            writer_fn(self, item)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_utf16_strings() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(-3i32).to_le_bytes());
        for unit in "hé".encode_utf16().chain(std::iter::once(0)) {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }

        let mut cursor = Cursor::new(bytes);
        assert_eq!(cursor.read_fstring().unwrap(), "hé");
    }

    #[test]
    fn writes_null_terminated_strings() {
        let mut bytes = Vec::new();
        bytes.write_fstring("/Game").unwrap();
        bytes.write_fstring("").unwrap();

        assert_eq!(&bytes[..4], &6i32.to_le_bytes());
        assert_eq!(bytes[9], 0);

        let mut cursor = Cursor::new(bytes);
        assert_eq!(cursor.read_fstring().unwrap(), "/Game");
        assert_eq!(cursor.read_fstring().unwrap(), "");
    }

    #[test]
    fn rejects_negative_array_size() {
        let mut cursor = Cursor::new((-1i32).to_le_bytes().to_vec());
        let result = cursor.read_tarray(|r| r.read_fstring(), 16);
        assert!(matches!(result, Err(RegistryError::InvalidArraySize(-1))));
    }

    #[test]
    fn rejects_oversized_array() {
        let mut cursor = Cursor::new(17i32.to_le_bytes().to_vec());
        assert!(matches!(
            cursor.read_count(16),
            Err(RegistryError::InvalidArraySize(17))
        ));
    }
}
