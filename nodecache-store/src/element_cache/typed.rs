//! `bincode` encoding on top of any element cache.
//!
//! ```rust
//! use nodecache_core::ElementCacheReader;
//! use nodecache_core::test_support::MemoryElementCache;
//! use nodecache_store::element_cache::typed::{read_decoded, write_encoded};
//!
//! let mut cache = MemoryElementCache::default();
//! write_encoded(&mut cache, 7, &vec![1_i64, 2, 3]).expect("encode");
//! cache.load_offsets().expect("load");
//! let refs: Option<Vec<i64>> = read_decoded(&cache, 7).expect("decode");
//! assert_eq!(refs, Some(vec![1, 2, 3]));
//! ```

use nodecache_core::{ElementCacheReader, ElementCacheWriter};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors raised by the typed helpers.
#[derive(Debug, Error)]
pub enum TypedCacheError<E>
where
    E: std::error::Error + 'static,
{
    /// The underlying cache failed.
    #[error(transparent)]
    Cache(E),
    /// Serialising the element failed.
    #[error("failed to encode element {key}")]
    Encode {
        /// Element key.
        key: u64,
        /// Source error returned by `bincode`.
        #[source]
        source: bincode::Error,
    },
    /// The cached bytes do not decode as the requested type.
    #[error("failed to decode element {key}")]
    Decode {
        /// Element key.
        key: u64,
        /// Source error returned by `bincode`.
        #[source]
        source: bincode::Error,
    },
}

/// Serialise `value` with `bincode` and cache it under `key`.
pub fn write_encoded<W, T>(
    cache: &mut W,
    key: u64,
    value: &T,
) -> Result<(), TypedCacheError<W::Error>>
where
    W: ElementCacheWriter + ?Sized,
    T: Serialize + ?Sized,
{
    let bytes =
        bincode::serialize(value).map_err(|source| TypedCacheError::Encode { key, source })?;
    cache.write(key, &bytes).map_err(TypedCacheError::Cache)
}

/// Fetch the blob under `key` and decode it with `bincode`.
pub fn read_decoded<R, T>(cache: &R, key: u64) -> Result<Option<T>, TypedCacheError<R::Error>>
where
    R: ElementCacheReader + ?Sized,
    T: DeserializeOwned,
{
    let Some(bytes) = cache.read(key).map_err(TypedCacheError::Cache)? else {
        return Ok(None);
    };
    bincode::deserialize(&bytes)
        .map(Some)
        .map_err(|source| TypedCacheError::Decode { key, source })
}
