//! Encoding of raw batch payloads
//!
//! Scrape batches hold provider JSON verbatim and are stored as JSON. Parse
//! batches are fully typed and stored with bincode.

use scout_checkpoint::{
    BatchKind, BatchPayload, BincodeSerializer, CheckpointStore, JobId, JsonSerializer,
    ParsedCandidate, RawProfile, Result, SerializerProtocol,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadCodec {
    raw: JsonSerializer,
    parsed: BincodeSerializer,
}

impl PayloadCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encode_scraped(&self, index: u32, profiles: &[RawProfile]) -> Result<BatchPayload> {
        Ok(BatchPayload {
            kind: BatchKind::Scraped,
            index,
            data: self.raw.dumps(&profiles)?,
        })
    }

    pub fn decode_scraped(&self, payload: &BatchPayload) -> Result<Vec<RawProfile>> {
        self.raw.loads(&payload.data)
    }

    pub fn encode_parsed(&self, index: u32, parsed: &[ParsedCandidate]) -> Result<BatchPayload> {
        Ok(BatchPayload {
            kind: BatchKind::Parsed,
            index,
            data: self.parsed.dumps(&parsed)?,
        })
    }

    pub fn decode_parsed(&self, payload: &BatchPayload) -> Result<Vec<ParsedCandidate>> {
        self.parsed.loads(&payload.data)
    }

    /// Scraped profiles of batches `1..=up_to`, in batch order
    pub async fn load_scraped(
        &self,
        store: &dyn CheckpointStore,
        job_id: JobId,
        up_to: u32,
    ) -> Result<Vec<(u32, Vec<RawProfile>)>> {
        let mut batches = Vec::new();
        for payload in store.load_batches(job_id, BatchKind::Scraped).await? {
            if payload.index <= up_to {
                batches.push((payload.index, self.decode_scraped(&payload)?));
            }
        }
        Ok(batches)
    }

    /// Parsed candidates of batches `1..=up_to`, in batch order
    pub async fn load_parsed(
        &self,
        store: &dyn CheckpointStore,
        job_id: JobId,
        up_to: u32,
    ) -> Result<Vec<(u32, Vec<ParsedCandidate>)>> {
        let mut batches = Vec::new();
        for payload in store.load_batches(job_id, BatchKind::Parsed).await? {
            if payload.index <= up_to {
                batches.push((payload.index, self.decode_parsed(&payload)?));
            }
        }
        Ok(batches)
    }
}
