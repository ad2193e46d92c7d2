//! Incremental detokenization.

use tokenizers::Tokenizer;

use super::{GenerationError, GenerationResult};

/// Anything that can turn a token sequence back into text.
pub trait TokenDecoder {
    fn decode_tokens(&self, tokens: &[u32]) -> GenerationResult<String>;
}

impl TokenDecoder for Tokenizer {
    fn decode_tokens(&self, tokens: &[u32]) -> GenerationResult<String> {
        self.decode(tokens, true)
            .map_err(|e| GenerationError::Tokenizer(e.to_string()))
    }
}

/// Turns a stream of generated tokens into text fragments.
///
/// A token can end in the middle of a multi-byte character, and some
/// tokenizers only produce the right spacing when neighbouring tokens are
/// decoded together. The streamer therefore re-decodes a small window and
/// emits the new suffix once it no longer ends in a replacement character.
pub struct TokenStreamer<'a, D: TokenDecoder + ?Sized> {
    decoder: &'a D,
    tokens: Vec<u32>,
    prev_index: usize,
    current_index: usize,
}

impl<'a, D: TokenDecoder + ?Sized> TokenStreamer<'a, D> {
    pub fn new(decoder: &'a D) -> Self {
        Self {
            decoder,
            tokens: Vec::new(),
            prev_index: 0,
            current_index: 0,
        }
    }

    /// Push a token and return any text that became complete.
    pub fn next_token(&mut self, token: u32) -> GenerationResult<Option<String>> {
        let prev_text = self.decode_window(self.current_index)?;
        self.tokens.push(token);
        let text = self.decode_window(self.tokens.len())?;

        if text.len() <= prev_text.len() || text.ends_with(char::REPLACEMENT_CHARACTER) {
            return Ok(None);
        }

        match text.get(prev_text.len()..) {
            Some(fragment) => {
                let fragment = fragment.to_string();
                self.prev_index = self.current_index;
                self.current_index = self.tokens.len();
                Ok(Some(fragment))
            }
            None => Ok(None),
        }
    }

    /// Return whatever text is still pending, complete or not.
    pub fn flush(&mut self) -> GenerationResult<Option<String>> {
        let prev_text = self.decode_window(self.current_index)?;
        let text = self.decode_window(self.tokens.len())?;

        self.prev_index = self.tokens.len();
        self.current_index = self.tokens.len();

        Ok(text
            .get(prev_text.len()..)
            .filter(|rest| !rest.is_empty())
            .map(str::to_string))
    }

    fn decode_window(&self, end: usize) -> GenerationResult<String> {
        match self.tokens.get(self.prev_index..end) {
            Some(window) if !window.is_empty() => self.decoder.decode_tokens(window),
            _ => Ok(String::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Each token is one UTF-8 byte.
    struct ByteDecoder;

    impl TokenDecoder for ByteDecoder {
        fn decode_tokens(&self, tokens: &[u32]) -> GenerationResult<String> {
            let bytes: Vec<u8> = tokens.iter().map(|&t| t as u8).collect();
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
    }

    fn stream_all(text: &str) -> (Vec<String>, Option<String>) {
        let mut streamer = TokenStreamer::new(&ByteDecoder);
        let fragments = text
            .bytes()
            .filter_map(|b| streamer.next_token(b as u32).unwrap())
            .collect();
        (fragments, streamer.flush().unwrap())
    }

    #[test]
    fn test_ascii_streams_one_fragment_per_token() {
        let (fragments, rest) = stream_all("abc");
        assert_eq!(fragments, vec!["a", "b", "c"]);
        assert_eq!(rest, None);
    }

    #[test]
    fn test_multibyte_character_waits_until_complete() {
        let mut streamer = TokenStreamer::new(&ByteDecoder);
        let bytes = "é".as_bytes();

        assert_eq!(streamer.next_token(bytes[0] as u32).unwrap(), None);
        assert_eq!(streamer.next_token(bytes[1] as u32).unwrap(), Some("é".to_string()));
        assert_eq!(streamer.next_token(b'x' as u32).unwrap(), Some("x".to_string()));
    }

    #[test]
    fn test_fragments_concatenate_to_full_text() {
        let text = "Transformers ≈ naïve attention über alles";
        let (fragments, rest) = stream_all(text);

        let mut joined = fragments.concat();
        if let Some(rest) = rest {
            joined.push_str(&rest);
        }
        assert_eq!(joined, text);
    }

    #[test]
    fn test_flush_returns_incomplete_tail() {
        let mut streamer = TokenStreamer::new(&ByteDecoder);
        assert_eq!(streamer.next_token(b'a' as u32).unwrap(), Some("a".to_string()));
        assert_eq!(streamer.next_token(0xE2).unwrap(), None);

        let rest = streamer.flush().unwrap();
        assert_eq!(rest, Some(char::REPLACEMENT_CHARACTER.to_string()));
        assert_eq!(streamer.flush().unwrap(), None);
    }
}
