/*!
Wire word byte streams.

Two on-disk / on-network layouts are supported:

- `words`: one little-endian `u32` per wire word (bits 28..32 zero)
- `serializer`: one little-endian `u64` per 35-bit serializer vector
  (clock lane plus four data lanes, see [`crate::pattern::serializer_word`])

[`WordAssembler`] rebuilds words from arbitrarily split chunks, such as
datagrams that do not end on a word boundary.
*/

use crate::error::{ClinkError, Result};
use crate::pattern::{deserialize_word, serializer_word};
use crate::wire::WireWord;
use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Byte layout of a word stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamFormat {
    /// 4 bytes per wire word
    #[default]
    Words,
    /// 8 bytes per serializer vector
    Serializer,
}

impl StreamFormat {
    /// Bytes per encoded word
    pub fn word_bytes(self) -> usize {
        match self {
            Self::Words => 4,
            Self::Serializer => 8,
        }
    }

    fn get(self, buf: &mut impl Buf) -> Result<WireWord> {
        match self {
            Self::Words => WireWord::from_raw(buf.get_u32_le()),
            Self::Serializer => deserialize_word(buf.get_u64_le()),
        }
    }

    fn put(self, buf: &mut impl BufMut, word: WireWord) {
        match self {
            Self::Words => buf.put_u32_le(word.raw()),
            Self::Serializer => buf.put_u64_le(serializer_word(word)),
        }
    }
}

impl fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Words => f.write_str("words"),
            Self::Serializer => f.write_str("serializer"),
        }
    }
}

impl FromStr for StreamFormat {
    type Err = ClinkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "words" | "word" => Ok(Self::Words),
            "serializer" | "serdes" => Ok(Self::Serializer),
            other => Err(ClinkError::invalid_parameter(format!("unknown stream format {:?}", other))),
        }
    }
}

/// Encode words into a byte stream
pub fn encode_words<I>(words: I, format: StreamFormat) -> Vec<u8>
where
    I: IntoIterator<Item = WireWord>,
{
    let mut buf = BytesMut::new();
    for word in words {
        format.put(&mut buf, word);
    }
    buf.to_vec()
}

/// Decode a complete byte stream into words
pub fn decode_words(data: &[u8], format: StreamFormat) -> Result<Vec<WireWord>> {
    let size = format.word_bytes();
    if data.len() % size != 0 {
        return Err(ClinkError::invalid_stream(format!(
            "stream size {} is not a multiple of the {} word size ({} bytes)",
            data.len(),
            format,
            size
        )));
    }

    let mut buf = data;
    let mut words = Vec::with_capacity(data.len() / size);
    while buf.has_remaining() {
        let offset = data.len() - buf.remaining();
        let word = format
            .get(&mut buf)
            .map_err(|e| ClinkError::invalid_stream(format!("word at byte {}: {}", offset, e)))?;
        words.push(word);
    }
    Ok(words)
}

/// Load a word stream file
pub fn read_words<P: AsRef<Path>>(path: P, format: StreamFormat) -> Result<Vec<WireWord>> {
    let data = std::fs::read(path.as_ref())?;
    decode_words(&data, format)
}

/// Write a word stream file, returning the number of bytes written
pub fn write_words<P, I>(path: P, words: I, format: StreamFormat) -> Result<usize>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = WireWord>,
{
    let data = encode_words(words, format);
    std::fs::write(path.as_ref(), &data)?;
    Ok(data.len())
}

/// Reassembles words from chunks of a byte stream
#[derive(Debug, Default)]
pub struct WordAssembler {
    format: StreamFormat,
    buffer: BytesMut,
}

impl WordAssembler {
    pub fn new(format: StreamFormat) -> Self {
        Self {
            format,
            buffer: BytesMut::new(),
        }
    }

    /// Append received bytes
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Bytes held that do not yet form a full word
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drop buffered bytes that do not form a full word, returning how many
    pub fn clear(&mut self) -> usize {
        let pending = self.buffer.len();
        self.buffer.clear();
        pending
    }

    /// Take the next complete word, if any.
    ///
    /// A malformed word is consumed and reported, so the stream stays aligned.
    pub fn next_word(&mut self) -> Option<Result<WireWord>> {
        if self.buffer.len() < self.format.word_bytes() {
            return None;
        }
        Some(self.format.get(&mut self.buffer))
    }
}
