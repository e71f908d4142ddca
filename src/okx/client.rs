//! Signed GET/POST entry points used by the route handlers.
//!
//! Everything goes through the injected [`RequestQueue`]; handlers must not
//! add their own delay or retry logic on top.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::okx::error::OkxError;
use crate::okx::queue::RequestQueue;
use crate::okx::signer::HEADER_PROJECT;
use crate::okx::transport::{QueryParams, RequestSpec, Transport};

#[derive(Clone)]
pub struct OkxClient {
    queue: RequestQueue,
    transport: Arc<dyn Transport>,
    project_id: Option<String>,
}

impl OkxClient {
    pub fn new(queue: RequestQueue, transport: Arc<dyn Transport>, project_id: Option<String>) -> Self {
        Self {
            queue,
            transport,
            project_id: project_id.filter(|id| !id.is_empty()),
        }
    }

    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    /// Signed GET. `path` starts with `/api/`.
    pub async fn signed_get(&self, path: &str, query: QueryParams) -> Result<Value, OkxError> {
        self.query(RequestSpec::get(path, query)).await
    }

    /// Signed POST with an optional JSON body.
    pub async fn signed_post<B>(&self, path: &str, body: Option<&B>) -> Result<Value, OkxError>
    where
        B: Serialize + ?Sized,
    {
        let body = body.map(serde_json::to_string).transpose()?;
        self.query(RequestSpec::post(path, body)).await
    }

    async fn query(&self, spec: RequestSpec) -> Result<Value, OkxError> {
        let spec = match &self.project_id {
            Some(project_id) => spec.with_header(HEADER_PROJECT, project_id.as_str()),
            None => spec,
        };
        let spec = Arc::new(spec);
        let transport = Arc::clone(&self.transport);

        self.queue
            .enqueue(move || {
                let transport = Arc::clone(&transport);
                let spec = Arc::clone(&spec);
                async move { transport.call(&spec).await }
            })
            .await
    }
}
