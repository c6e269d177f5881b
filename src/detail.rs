use std::sync::Arc;

use crate::error::{Error, Result, TransportError};
use crate::formats::{DetailRecord, StoryEnvelope};
use crate::request::{self, Placeholder};
use crate::transport::{self, HttpExecutor};

/// Resolves a feed entry into its detail record. One attempt per call.
#[derive(Clone)]
pub struct EntryDetailFetcher {
    executor: Arc<dyn HttpExecutor>,
    template: String,
}

impl EntryDetailFetcher {
    pub fn new(executor: Arc<dyn HttpExecutor>, template: impl Into<String>) -> Self {
        Self {
            executor,
            template: template.into(),
        }
    }

    pub async fn fetch(&self, id: &str) -> Result<DetailRecord> {
        let raw = Placeholder::StoryId.fill(&self.template, id);
        let request = request::parse(&raw, None)?;

        let response = self
            .executor
            .execute(request)
            .await
            .map_err(|err| Error::transport(format!("fetch story {id}"), err))?;
        let body = transport::read_decoded_body(response)
            .await
            .map_err(|err| Error::transport(format!("read story {id}"), err))?;
        tracing::debug!(id, json = %String::from_utf8_lossy(&body), "story json read");

        decode_story(id, &body)
    }
}

pub fn decode_story(id: &str, json: &[u8]) -> Result<DetailRecord> {
    let envelope: StoryEnvelope = serde_json::from_slice(json).map_err(|err| {
        Error::transport(format!("decode story {id}"), TransportError::Json(err))
    })?;
    envelope
        .story
        .ok_or_else(|| Error::Schema(format!("story {id}: response has no \"story\" object")))
}
