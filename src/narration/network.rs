use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

use super::{AudioEncoding, BackendKind, NarrationAudio, TtsBackend};
use crate::config::TtsConfig;
use crate::error::NarrationError;

/// The translate_tts endpoint refuses longer queries.
pub const MAX_CHUNK_CHARS: usize = 100;

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";
const REFERER: &str = "http://translate.google.com/";

/// Google Translate speech, returned as MP3.
pub struct NetworkTts {
    client: reqwest::Client,
    endpoint: String,
}

impl NetworkTts {
    pub fn new(config: &TtsConfig) -> Result<Self, NarrationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }

    async fn fetch_chunk(
        &self,
        chunk: &str,
        language: &str,
        index: usize,
        total: usize,
    ) -> Result<Bytes, NarrationError> {
        let total = total.to_string();
        let index = index.to_string();
        let textlen = chunk.chars().count().to_string();
        let resp = self
            .client
            .get(&self.endpoint)
            .header(reqwest::header::REFERER, REFERER)
            .query(&[
                ("ie", "UTF-8"),
                ("client", "tw-ob"),
                ("tl", language),
                ("q", chunk),
                ("ttsspeed", "1"),
                ("total", total.as_str()),
                ("idx", index.as_str()),
                ("textlen", textlen.as_str()),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(NarrationError::Status(resp.status()));
        }
        Ok(resp.bytes().await?)
    }
}

#[async_trait]
impl TtsBackend for NetworkTts {
    fn kind(&self) -> BackendKind {
        BackendKind::Network
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn synthesize(&self, text: &str, language: &str) -> Result<NarrationAudio, NarrationError> {
        let chunks = split_text(text, MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            return Err(NarrationError::EmptyText);
        }

        // MP3 frames can be concatenated as is.
        let mut audio = BytesMut::new();
        for (index, chunk) in chunks.iter().enumerate() {
            log::debug!("Fetching speech chunk {}/{}", index + 1, chunks.len());
            let part = self.fetch_chunk(chunk, language, index, chunks.len()).await?;
            audio.extend_from_slice(&part);
        }

        Ok(NarrationAudio {
            bytes: audio.freeze(),
            encoding: AudioEncoding::Mp3,
            backend: BackendKind::Network,
        })
    }
}

/// Split `text` into pieces of at most `max_chars` characters, breaking on
/// whitespace. Words longer than the limit are cut.
pub fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if current_len > 0 && current_len + 1 + word_len > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if word_len > max_chars {
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(max_chars) {
                if piece.len() == max_chars {
                    chunks.push(piece.iter().collect());
                } else {
                    current = piece.iter().collect();
                    current_len = piece.len();
                }
            }
            continue;
        }

        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if current_len > 0 {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(split_text("  Cara   penyimpanan: kering ", 100), vec!["Cara penyimpanan: kering"]);
    }

    #[test]
    fn chunks_respect_the_limit_and_keep_words() {
        let text = "Obat yang terdeteksi adalah Paracetamol 500mg. Aturan minum: 3 kali sehari 1 tablet setelah makan. Perhatian: jangan melebihi dosis.";
        let chunks = split_text(text, 40);
        assert!(chunks.iter().all(|c| c.chars().count() <= 40));
        assert_eq!(chunks.join(" "), text.split_whitespace().collect::<Vec<_>>().join(" "));
    }

    #[test]
    fn overlong_words_are_cut() {
        let chunks = split_text("ab abcdefgh c", 3);
        assert_eq!(chunks, vec!["ab", "abc", "def", "gh", "c"]);
    }

    #[test]
    fn multibyte_text_is_measured_in_chars() {
        let chunks = split_text("éé éé", 5);
        assert_eq!(chunks, vec!["éé éé"]);
    }

    #[test]
    fn blank_text_has_no_chunks() {
        assert!(split_text(" \n\t", 100).is_empty());
    }

    #[tokio::test]
    async fn unreachable_service_is_a_network_error() {
        let config = TtsConfig {
            endpoint: "http://127.0.0.1:9/translate_tts".into(),
            timeout_secs: 2,
            ..TtsConfig::default()
        };
        let backend = NetworkTts::new(&config).unwrap();
        let err = backend.synthesize("halo", "id").await.unwrap_err();
        assert!(matches!(err, NarrationError::Network(_)));
    }
}
