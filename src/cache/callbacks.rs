//! Stream and fetch lifecycle hooks.
//!
//! The discovery server reports every long-poll stream and every fetch
//! here. Nothing in the control plane depends on these hooks.

use crate::cache::discovery::{DiscoveryRequest, DiscoveryResponse};

/// Observer of discovery traffic. Every method defaults to a no-op.
pub trait StreamCallbacks: Send + Sync {
    fn on_stream_open(&self, _stream_id: u64, _type_url: &str) {}

    fn on_stream_closed(&self, _stream_id: u64) {}

    fn on_stream_request(&self, _stream_id: u64, _request: &DiscoveryRequest) {}

    fn on_stream_response(&self, _stream_id: u64, _request: &DiscoveryRequest, _response: &DiscoveryResponse) {}

    fn on_fetch_request(&self, _request: &DiscoveryRequest) {}

    fn on_fetch_response(&self, _request: &DiscoveryRequest, _response: &DiscoveryResponse) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCallbacks;

impl StreamCallbacks for NoopCallbacks {}

/// Logs every hook at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingCallbacks;

impl StreamCallbacks for LoggingCallbacks {
    fn on_stream_open(&self, stream_id: u64, type_url: &str) {
        tracing::debug!(stream_id, type_url, "Stream opened");
    }

    fn on_stream_closed(&self, stream_id: u64) {
        tracing::debug!(stream_id, "Stream closed");
    }

    fn on_stream_request(&self, stream_id: u64, request: &DiscoveryRequest) {
        tracing::debug!(
            stream_id,
            type_url = %request.type_url,
            version = %request.version_info,
            "Stream request"
        );
    }

    fn on_stream_response(&self, stream_id: u64, _request: &DiscoveryRequest, response: &DiscoveryResponse) {
        tracing::debug!(
            stream_id,
            version = %response.version_info,
            resources = response.resources.len(),
            "Stream response"
        );
    }

    fn on_fetch_request(&self, request: &DiscoveryRequest) {
        tracing::debug!(type_url = %request.type_url, version = %request.version_info, "Fetch request");
    }

    fn on_fetch_response(&self, _request: &DiscoveryRequest, response: &DiscoveryResponse) {
        tracing::debug!(
            version = %response.version_info,
            resources = response.resources.len(),
            "Fetch response"
        );
    }
}
