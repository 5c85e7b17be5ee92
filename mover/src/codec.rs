use crate::error::MoverError;

/// Converts between the strings stored in Redis and the values a mover works with.
///
/// Codecs are cloned into every per-queue adapter, so they should be cheap to clone.
pub trait Codec: Clone + Send + Sync + 'static {
    type Item: Clone + Send + Sync;

    fn encode(&self, item: &Self::Item) -> Result<String, MoverError>;

    fn decode(&self, raw: &str) -> Result<Self::Item, MoverError>;
}

/// Identity codec, used for registries of queue names and for lock queues whose
/// entries are moved without being interpreted.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl Codec for RawCodec {
    type Item = String;

    fn encode(&self, item: &String) -> Result<String, MoverError> {
        Ok(item.clone())
    }

    fn decode(&self, raw: &str) -> Result<String, MoverError> {
        Ok(raw.to_string())
    }
}
