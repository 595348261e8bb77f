//! A byte-pair-encoding tokenizer compatible with OpenAI's tiktoken vocabularies.
//!
//! The core is two pieces: [`bpe`], the merge engine that turns a byte string into a sequence of
//! token ranks given a rank table, and [`encoding::Encoding`], the façade that composes
//! pre-tokenization, special-token handling and the merge engine into the public operations most
//! callers want. [`registry`] and [`loader`] supply built-in per-model configuration and
//! vocabulary acquisition; they never touch the hot encode/decode path.
//!
//! ```no_run
//! # #[cfg(feature = "download")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let enc = tiktoken_compat::get_encoding("cl100k_base", &Default::default())?;
//! let tokens = enc.encode_ordinary("hello world")?;
//! assert_eq!(enc.decode(&tokens)?, "hello world");
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "download"))]
//! # fn main() {}
//! ```

pub mod batch;
pub mod bpe;
pub mod encoding;
pub mod error;
#[cfg(feature = "download")]
pub mod loader;
pub mod pretokenize;
pub mod registry;
pub mod special;
mod unstable;
pub mod vocab;

pub use encoding::Encoding;
pub use error::{Error, Result};
pub use special::{AllowedSpecial, DisallowedSpecial};

/// A token id: a rank into the merge table, or a dedicated special-token id. Lower ranks in the
/// merge table merge earlier; special-token ranks are simply unique ids outside the merge table's
/// image.
pub type Rank = u32;

#[cfg(feature = "download")]
mod builders {
    use crate::encoding::Encoding;
    use crate::error::Error;
    use crate::loader::LoaderConfig;
    use crate::registry;

    /// Builds the named built-in encoding, downloading/caching its vocabulary as needed.
    pub fn get_encoding(name: &str, loader_config: &LoaderConfig) -> Result<Encoding, Error> {
        let constructor = registry::find_encoding_constructor(name)?;
        let mergeable_ranks = crate::loader::load_mergeable_ranks(name, loader_config)?;
        Encoding::new(constructor.name, constructor.pattern, mergeable_ranks, constructor.special_tokens)
    }

    /// Builds the encoding appropriate for `model`, downloading/caching its vocabulary as needed.
    pub fn encoding_for_model(model: &str, loader_config: &LoaderConfig) -> Result<Encoding, Error> {
        let encoding_name = registry::encoding_name_for_model(model)?;
        get_encoding(encoding_name, loader_config)
    }
}

#[cfg(feature = "download")]
pub use builders::{encoding_for_model, get_encoding};
