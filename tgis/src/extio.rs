//! Extend AsyncRead and AsyncWrite with some convenience methods for binary i/o
//!
use std::io;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use futures::{io as aio, AsyncReadExt, AsyncWriteExt};
use unsigned_varint::{
    aio::read_u64 as varint_read_u64,
    encode::{u64 as varint_encode_u64, u64_buffer as varint_u64_buffer},
};

use crate::errors::{Error, Result};

#[async_trait]
pub(crate) trait Serialize: Sized {
    /// Write self to a stream
    async fn write_to(&self, stream: &mut (impl aio::AsyncWrite + Unpin + Send)) -> Result<()>;

    /// Read Self from a stream
    async fn read_from(stream: &mut (impl aio::AsyncRead + Unpin + Send)) -> Result<Self>;
}

#[async_trait]
pub(crate) trait ExtendedAsyncRead: aio::AsyncRead {
    /// Read a byte from a stream
    async fn read_byte(&mut self) -> io::Result<u8>;

    /// Read a Big Endian encoded 16 bit unsigned integer from a stream
    async fn read_u16(&mut self) -> io::Result<u16>;

    /// Read a Big Endian encoded 32 bit unsigned integer from a stream
    async fn read_u32(&mut self) -> io::Result<u32>;

    /// Read a Big Endian encoded 64 bit signed integer from a stream
    async fn read_i64(&mut self) -> io::Result<i64>;

    /// Read a varint length prefixed UTF-8 string from a stream
    async fn read_str(&mut self) -> Result<String>;

    /// Read a timestamp written by `ExtendedAsyncWrite::write_datetime`
    async fn read_datetime(&mut self) -> Result<NaiveDateTime>;
}

#[async_trait]
impl<R: aio::AsyncRead + Unpin + Send> ExtendedAsyncRead for R {
    async fn read_byte(&mut self) -> io::Result<u8> {
        let mut buffer = [0; 1];
        self.read_exact(&mut buffer).await?;

        Ok(buffer[0])
    }

    async fn read_u16(&mut self) -> io::Result<u16> {
        let mut buffer = [0; 2];
        self.read_exact(&mut buffer).await?;

        Ok(u16::from_be_bytes(buffer))
    }

    async fn read_u32(&mut self) -> io::Result<u32> {
        let mut buffer = [0; 4];
        self.read_exact(&mut buffer).await?;

        Ok(u32::from_be_bytes(buffer))
    }

    async fn read_i64(&mut self) -> io::Result<i64> {
        let mut buffer = [0; 8];
        self.read_exact(&mut buffer).await?;

        Ok(i64::from_be_bytes(buffer))
    }

    async fn read_str(&mut self) -> Result<String> {
        let len = varint_read_u64(&mut *self)
            .await
            .map_err(|err| Error::Corrupt(format!("bad string length: {err}")))?;
        let mut bytes = vec![];
        self.take(len).read_to_end(&mut bytes).await?;
        if bytes.len() as u64 != len {
            return Err(Error::Corrupt(String::from("truncated string")));
        }

        String::from_utf8(bytes).map_err(|err| Error::Corrupt(err.to_string()))
    }

    async fn read_datetime(&mut self) -> Result<NaiveDateTime> {
        let seconds = self.read_i64().await?;
        let nanos = self.read_u32().await?;

        DateTime::from_timestamp(seconds, nanos)
            .map(|datetime| datetime.naive_utc())
            .ok_or_else(|| Error::Corrupt(format!("timestamp out of range: {seconds}")))
    }
}

#[async_trait]
pub(crate) trait ExtendedAsyncWrite: aio::AsyncWrite {
    /// Write a byte to a stream
    async fn write_byte(&mut self, byte: u8) -> io::Result<()>;

    /// Write a Big Endian encoded 16 bit unsigned integer to a stream
    async fn write_u16(&mut self, word: u16) -> io::Result<()>;

    /// Write a Big Endian encoded 32 bit unsigned integer to a stream
    async fn write_u32(&mut self, word: u32) -> io::Result<()>;

    /// Write a Big Endian encoded 64 bit signed integer to a stream
    async fn write_i64(&mut self, word: i64) -> io::Result<()>;

    /// Write a string to a stream, prefixed by its length in bytes as a varint
    async fn write_str(&mut self, s: &str) -> io::Result<()>;

    /// Write a timestamp as seconds since the epoch plus nanoseconds
    async fn write_datetime(&mut self, datetime: &NaiveDateTime) -> io::Result<()>;
}

#[async_trait]
impl<W: aio::AsyncWrite + Unpin + Send> ExtendedAsyncWrite for W {
    async fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        let buffer = [byte];
        self.write_all(&buffer).await?;

        Ok(())
    }

    async fn write_u16(&mut self, word: u16) -> io::Result<()> {
        let buffer = word.to_be_bytes();
        self.write_all(&buffer).await?;

        Ok(())
    }

    async fn write_u32(&mut self, word: u32) -> io::Result<()> {
        let buffer = word.to_be_bytes();
        self.write_all(&buffer).await?;

        Ok(())
    }

    async fn write_i64(&mut self, word: i64) -> io::Result<()> {
        let buffer = word.to_be_bytes();
        self.write_all(&buffer).await?;

        Ok(())
    }

    async fn write_str(&mut self, s: &str) -> io::Result<()> {
        let mut varint_buf = varint_u64_buffer();
        let prefix = varint_encode_u64(s.len() as u64, &mut varint_buf).to_vec();
        self.write_all(&prefix).await?;
        self.write_all(s.as_bytes()).await?;

        Ok(())
    }

    async fn write_datetime(&mut self, datetime: &NaiveDateTime) -> io::Result<()> {
        let datetime = datetime.and_utc();
        self.write_i64(datetime.timestamp()).await?;
        self.write_u32(datetime.timestamp_subsec_nanos()).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use futures::io::Cursor;

    #[tokio::test]
    async fn test_all_of_it() -> Result<()> {
        let when = NaiveDate::from_ymd_opt(2006, 11, 7)
            .and_then(|date| date.and_hms_opt(1, 9, 51))
            .unwrap();
        let mut buffer: Vec<u8> = Vec::new();
        buffer.write_byte(42).await?;
        buffer.write_u16(41968).await?;
        buffer.write_u32(31441968).await?;
        buffer.write_i64(-31441968).await?;
        buffer.write_str("elevation@PERMANENT").await?;
        buffer.write_str("").await?;
        buffer.write_datetime(&when).await?;

        let mut buffer = Cursor::new(buffer);
        assert_eq!(buffer.read_byte().await?, 42);
        assert_eq!(buffer.read_u16().await?, 41968);
        assert_eq!(buffer.read_u32().await?, 31441968);
        assert_eq!(buffer.read_i64().await?, -31441968);
        assert_eq!(buffer.read_str().await?, "elevation@PERMANENT");
        assert_eq!(buffer.read_str().await?, "");
        assert_eq!(buffer.read_datetime().await?, when);

        Ok(())
    }

    #[tokio::test]
    async fn truncated_string() -> Result<()> {
        let mut buffer: Vec<u8> = Vec::new();
        buffer.write_str("lakes").await?;
        buffer.truncate(3);

        let mut buffer = Cursor::new(buffer);
        assert!(matches!(buffer.read_str().await, Err(Error::Corrupt(_))));

        Ok(())
    }

    #[tokio::test]
    async fn huge_string_length() -> Result<()> {
        let mut varint_buf = varint_u64_buffer();
        let mut buffer = varint_encode_u64(u64::MAX >> 1, &mut varint_buf).to_vec();
        buffer.extend_from_slice(b"lakes");

        let mut buffer = Cursor::new(buffer);
        assert!(matches!(buffer.read_str().await, Err(Error::Corrupt(_))));

        Ok(())
    }
}
