//! Vocabulary acquisition: HTTPS download, SHA-256 verification, on-disk `.tiktoken` cache.
//!
//! Feature-gated behind `download`. Deliberately takes a constructor-injected [`LoaderConfig`]
//! rather than reading environment variables or a process-global cache directory, so tests (and
//! embedders who want a fully sandboxed cache) can control it explicitly.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::vocab::{self, MergeableRanks};

/// Where a vocabulary's download URL and expected SHA-256 digest live.
struct VocabSource {
    url: &'static str,
    sha256: &'static str,
}

/// gpt2's vocabulary is the data-gym `vocab.bpe` + `encoder.json` pair rather than a single
/// `.tiktoken` file; see [`vocab::parse_gpt2_data_gym`].
const GPT2_VOCAB_BPE: VocabSource = VocabSource {
    url: "https://openaipublic.blob.core.windows.net/gpt-2/encodings/main/vocab.bpe",
    sha256: "238f51b7c7c924fa3fe77ce7d0b214a05408df5b1ec84f9e614462017c42b005",
};
const GPT2_ENCODER_JSON: VocabSource = VocabSource {
    url: "https://openaipublic.blob.core.windows.net/gpt-2/encodings/main/encoder.json",
    sha256: "21d54b3e08bb39aa1445d91ca76b777e4132d7ae504bf0058277bbb6758ca88c",
};

fn vocab_source(encoding: &str) -> Option<VocabSource> {
    // Digests as published by the reference implementation's `data-gym-cache` blob registry.
    match encoding {
        "r50k_base" => Some(VocabSource {
            url: "https://openaipublic.blob.core.windows.net/encodings/r50k_base.tiktoken",
            sha256: "bbb40d2438edf9a62a24d2c841f429bab095d1c35418bff9e222ab03cc449754",
        }),
        "p50k_base" => Some(VocabSource {
            url: "https://openaipublic.blob.core.windows.net/encodings/p50k_base.tiktoken",
            sha256: "2d8f30c69f576205f071a034d3ea5eade09ea0852fb490d7c611f69871265aab",
        }),
        "cl100k_base" => Some(VocabSource {
            url: "https://openaipublic.blob.core.windows.net/encodings/cl100k_base.tiktoken",
            sha256: "6a89ad1d6c3a9938552c537ffda92c54325193deb7fa022f3c59467240647216",
        }),
        "o200k_base" => Some(VocabSource {
            url: "https://openaipublic.blob.core.windows.net/encodings/o200k_base.tiktoken",
            sha256: "d8c9beb76106e53ce36d65eb633c43100c39ceff07e906efb90bf1f22b07e1c4",
        }),
        // p50k_edit and o200k_harmony reuse p50k_base's / o200k_base's vocabulary file; only the
        // special-token table differs.
        "p50k_edit" => vocab_source("p50k_base"),
        "o200k_harmony" => vocab_source("o200k_base"),
        _ => None,
    }
}

/// Failures while acquiring a vocabulary.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("no known vocabulary source for encoding {0:?}")]
    UnknownEncoding(String),
    #[error("network access is disabled by LoaderConfig::allow_network")]
    NetworkDisabled,
    #[error("download failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("downloaded vocabulary failed SHA-256 verification: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },
    #[error("cache I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse downloaded vocabulary: {0}")]
    Parse(String),
}

/// Caller-supplied configuration for vocabulary acquisition. No process-global state: every
/// loader call takes one of these explicitly.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Directory `<encoding>.tiktoken` files are cached under. Defaults to the platform cache
    /// directory (`dirs::cache_dir()`), falling back to `std::env::temp_dir()`.
    pub cache_dir: Option<PathBuf>,
    /// Timeout for the HTTPS download.
    pub http_timeout: Duration,
    /// If false, a cache miss is always an error rather than attempting a download.
    pub allow_network: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            http_timeout: Duration::from_secs(30),
            allow_network: true,
        }
    }
}

impl LoaderConfig {
    fn resolved_cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .or_else(dirs::cache_dir)
            .unwrap_or_else(std::env::temp_dir)
            .join("tiktoken-compat")
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

/// Loads the raw `.tiktoken`-format bytes for `encoding` (anything but `gpt2`), preferring a
/// cache hit whose digest still matches, otherwise downloading and verifying.
#[tracing::instrument(skip(config))]
pub fn load_vocab_bytes(encoding: &str, config: &LoaderConfig) -> Result<Vec<u8>, LoaderError> {
    let source = vocab_source(encoding).ok_or_else(|| LoaderError::UnknownEncoding(encoding.to_string()))?;
    fetch_cached(&format!("{encoding}.tiktoken"), &source, config)
}

fn fetch_cached(cache_file_name: &str, source: &VocabSource, config: &LoaderConfig) -> Result<Vec<u8>, LoaderError> {
    let cache_path = config.resolved_cache_dir().join(cache_file_name);

    if let Some(bytes) = read_cache_if_valid(&cache_path, source.sha256) {
        tracing::trace!(path = %cache_path.display(), "vocabulary cache hit");
        return Ok(bytes);
    }

    if !config.allow_network {
        return Err(LoaderError::NetworkDisabled);
    }

    tracing::debug!(url = source.url, "downloading vocabulary");
    let client = reqwest::blocking::Client::builder()
        .timeout(config.http_timeout)
        .build()?;
    let bytes = client.get(source.url).send()?.error_for_status()?.bytes()?.to_vec();

    let actual = sha256_hex(&bytes);
    if actual != source.sha256 {
        return Err(LoaderError::HashMismatch {
            expected: source.sha256.to_string(),
            actual,
        });
    }

    write_cache(&cache_path, &bytes)?;
    tracing::debug!(path = %cache_path.display(), "cached freshly downloaded vocabulary");
    Ok(bytes)
}

/// Loads and parses the mergeable-rank table for any built-in encoding, including `gpt2`, whose
/// data-gym `vocab.bpe` + `encoder.json` pair is fetched and converted rather than read directly.
pub fn load_mergeable_ranks(encoding: &str, config: &LoaderConfig) -> Result<MergeableRanks, LoaderError> {
    if encoding == "gpt2" {
        let vocab_bpe = fetch_cached("gpt2-vocab.bpe", &GPT2_VOCAB_BPE, config)?;
        let encoder_json = fetch_cached("gpt2-encoder.json", &GPT2_ENCODER_JSON, config)?;
        let vocab_bpe = String::from_utf8(vocab_bpe).map_err(|e| LoaderError::Parse(e.to_string()))?;
        let encoder_json = String::from_utf8(encoder_json).map_err(|e| LoaderError::Parse(e.to_string()))?;
        return vocab::parse_gpt2_data_gym(&vocab_bpe, &encoder_json).map_err(|e| LoaderError::Parse(e.to_string()));
    }
    let raw = load_vocab_bytes(encoding, config)?;
    vocab::parse_tiktoken_bpe(&raw).map_err(|e| LoaderError::Parse(e.to_string()))
}

fn read_cache_if_valid(path: &Path, expected_sha256: &str) -> Option<Vec<u8>> {
    let bytes = std::fs::read(path).ok()?;
    if sha256_hex(&bytes) == expected_sha256 {
        Some(bytes)
    } else {
        None
    }
}

fn write_cache(path: &Path, bytes: &[u8]) -> Result<(), LoaderError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| LoaderError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let tmp_path = path.with_extension("tiktoken.tmp");
    let mut file = std::fs::File::create(&tmp_path).map_err(|source| LoaderError::Io {
        path: tmp_path.clone(),
        source,
    })?;
    file.write_all(bytes).map_err(|source| LoaderError::Io {
        path: tmp_path.clone(),
        source,
    })?;
    std::fs::rename(&tmp_path, path).map_err(|source| LoaderError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}
