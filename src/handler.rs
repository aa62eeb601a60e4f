use base64::{engine::general_purpose::STANDARD, Engine};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::app_state::AppState;
use crate::event::{
    BodyEncoding, EventError, OriginRequest, OriginResponse, OriginResponseEvent,
};
use crate::request_context::{strip_leading_slash, ResizeParams};
use crate::storage::{ObjectStore, PutRequest, StorageError};
use crate::transcode::{transcode_blocking, ResizeRequest, TargetFormat, TranscodeError};

/// Origin statuses that signal a derived object has not been generated yet.
const MISSING_OBJECT_STATUSES: [&str; 2] = ["403", "404"];

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("origin domain {domain:?} is not an S3 bucket domain")]
    MissingBucket { domain: String },
    #[error("{source}")]
    SourceFetch {
        #[source]
        source: StorageError,
    },
    #[error("Error while resizing \"{source_key}\" to \"{key}\": {source}")]
    Transcode {
        source_key: String,
        key: String,
        #[source]
        source: TranscodeError,
    },
    #[error("Error while putting resized image '{uri}' into bucket: {source}")]
    Store {
        uri: String,
        #[source]
        source: StorageError,
    },
}

pub struct Handler<S> {
    store: S,
    state: AppState,
}

impl<S: ObjectStore> Handler<S> {
    pub fn new(store: S, state: AppState) -> Self {
        Self { store, state }
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn handle_event(
        &self,
        event: OriginResponseEvent,
    ) -> Result<OriginResponse, EventError> {
        let (request, response) = event.into_parts()?;
        Ok(self.handle(&request, response).await)
    }

    /// Produces the response the edge should serve for `request`. Existing
    /// objects pass through with a long-lived cache header; missing derived
    /// objects are generated from their source, stored and returned inline.
    #[instrument(skip_all, fields(uri = %request.uri, status = %response.status))]
    pub async fn handle(&self, request: &OriginRequest, response: OriginResponse) -> OriginResponse {
        if !response.status_is(&MISSING_OBJECT_STATUSES) {
            debug!("object exists at origin, passing through");
            return self.pass_through(response);
        }

        let Some(params) = ResizeParams::from_query(&request.querystring) else {
            info!(
                querystring = %request.querystring,
                "no resize parameters on missing object, passing through"
            );
            return self.pass_through(response);
        };

        let key = strip_leading_slash(&request.uri);
        let content_type = params.content_type();

        match self.generate(request, key, &params, &content_type).await {
            Ok(image) => {
                info!(
                    key,
                    source_key = params.source_key(),
                    bytes = image.len(),
                    "generated derived image"
                );
                self.found(response, &image, content_type)
            }
            Err(err) => {
                warn!(key, source_key = params.source_key(), error = %err, "generation failed");
                not_found(response, params.source_key(), &err)
            }
        }
    }

    async fn generate(
        &self,
        request: &OriginRequest,
        key: &str,
        params: &ResizeParams,
        content_type: &str,
    ) -> Result<Vec<u8>, GenerateError> {
        let domain = request
            .origin
            .s3
            .as_ref()
            .map(|s3| s3.domain_name.as_str())
            .unwrap_or_default();
        let bucket =
            self.state
                .bucket_from_domain(domain)
                .ok_or_else(|| GenerateError::MissingBucket {
                    domain: domain.to_string(),
                })?;
        let source_key = params.source_key();

        let transcode_error = |source| GenerateError::Transcode {
            source_key: source_key.to_string(),
            key: key.to_string(),
            source,
        };

        // an unknown output format fails before any storage traffic
        let format = TargetFormat::from_extension(&params.next_extension).map_err(transcode_error)?;

        let source = self
            .store
            .get(bucket, source_key)
            .await
            .map_err(|source| GenerateError::SourceFetch { source })?;
        debug!(bucket, source_key, bytes = source.len(), "fetched source image");

        let image = transcode_blocking(
            source,
            ResizeRequest {
                width: params.width,
                height: params.height,
                format,
                quality: self.state.quality,
                max_dimension: self.state.max_output_dimension,
            },
        )
        .await
        .map_err(transcode_error)?;

        self.store
            .put(PutRequest {
                bucket,
                key,
                body: &image,
                content_type,
                storage_class: &self.state.storage_class,
            })
            .await
            .map_err(|source| GenerateError::Store {
                uri: request.uri.clone(),
                source,
            })?;

        Ok(image)
    }

    fn pass_through(&self, mut response: OriginResponse) -> OriginResponse {
        response
            .headers
            .set("cache-control", "Cache-Control", self.state.cache_control());
        response
    }

    fn found(&self, mut response: OriginResponse, image: &[u8], content_type: String) -> OriginResponse {
        response.status = "200".to_string();
        response.status_description = Some("Found".to_string());
        response.body = Some(STANDARD.encode(image));
        response.body_encoding = Some(BodyEncoding::Base64);
        response
            .headers
            .set("content-type", "Content-Type", content_type);
        response
            .headers
            .set("cache-control", "Cache-Control", self.state.cache_control());
        response
    }
}

/// Error responses keep the origin's cache headers so the failure is not
/// cached long-term.
fn not_found(mut response: OriginResponse, source_key: &str, err: &GenerateError) -> OriginResponse {
    response.status = "404".to_string();
    response.status_description = Some("Not Found".to_string());
    response.body = Some(format!(
        "Error while getting source image object \"{source_key}\": {err}"
    ));
    response.body_encoding = Some(BodyEncoding::Text);
    response
        .headers
        .set("content-type", "Content-Type", "text/plain");
    response
}
