//! Capability traits for the write-once, read-many element cache.
//!
//! Elements are opaque byte blobs keyed by a 64-bit identifier. How the
//! producer serialises a way or relation is its own business; the cache only
//! promises to hand the same bytes back.

/// Write side of an element cache.
pub trait ElementCacheWriter {
    /// Error raised by the backing medium.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Append `data` under `key`.
    fn write(&mut self, key: u64, data: &[u8]) -> Result<(), Self::Error>;

    /// Persist the lookup structure for everything written so far.
    ///
    /// File-backed caches lose the ability to locate any element when this
    /// is skipped, even though the bytes themselves are on disk.
    fn save_offsets(&mut self) -> Result<(), Self::Error>;
}

/// Read side of an element cache.
pub trait ElementCacheReader {
    /// Error raised by the backing medium.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load the lookup structure. Must be called before [`Self::read`];
    /// lookups before loading find nothing.
    fn load_offsets(&mut self) -> Result<(), Self::Error>;

    /// Fetch the blob stored under `key`, or `None` when it was never cached.
    fn read(&self, key: u64) -> Result<Option<Vec<u8>>, Self::Error>;
}

impl<W: ElementCacheWriter + ?Sized> ElementCacheWriter for Box<W> {
    type Error = W::Error;

    fn write(&mut self, key: u64, data: &[u8]) -> Result<(), Self::Error> {
        (**self).write(key, data)
    }

    fn save_offsets(&mut self) -> Result<(), Self::Error> {
        (**self).save_offsets()
    }
}

impl<R: ElementCacheReader + ?Sized> ElementCacheReader for Box<R> {
    type Error = R::Error;

    fn load_offsets(&mut self) -> Result<(), Self::Error> {
        (**self).load_offsets()
    }

    fn read(&self, key: u64) -> Result<Option<Vec<u8>>, Self::Error> {
        (**self).read(key)
    }
}
