//! Per-session cache of discovered capability metadata.
//!
//! Each descriptor family has one slot guarded by an async mutex that is
//! held across the upstream fetch. That gives single-flight behavior for
//! free: when K callers miss the cache concurrently, the first one fetches
//! while the rest queue on the lock and then observe the filled slot.
//!
//! Server-provided order is preserved; descriptors are never re-sorted.
//! Any access while the owning session is not Ready clears the slot and
//! fails with `NotReady` - stale metadata is never served.

use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::Mutex;

use tether_protocol::methods;
use tether_protocol::types::{
    ListPromptsResult, ListResourcesResult, ListToolsResult, PromptDescriptor, ResourceDescriptor,
    ToolDescriptor,
};

use crate::error::{ClientError, SessionError};
use crate::session::{Session, SessionState};

type Slot<T> = Mutex<Option<Arc<Vec<T>>>>;

pub(crate) struct CapabilityRegistry {
    tools: Slot<ToolDescriptor>,
    prompts: Slot<PromptDescriptor>,
    resources: Slot<ResourceDescriptor>,
}

impl CapabilityRegistry {
    pub(crate) fn new() -> Self {
        Self {
            tools: Mutex::new(None),
            prompts: Mutex::new(None),
            resources: Mutex::new(None),
        }
    }

    pub(crate) async fn tools(
        &self,
        session: &Session,
        refresh: bool,
    ) -> Result<Arc<Vec<ToolDescriptor>>, ClientError> {
        Self::list(&self.tools, session, refresh, methods::TOOLS_LIST, |r: ListToolsResult| {
            r.tools
        })
        .await
    }

    pub(crate) async fn prompts(
        &self,
        session: &Session,
        refresh: bool,
    ) -> Result<Arc<Vec<PromptDescriptor>>, ClientError> {
        Self::list(
            &self.prompts,
            session,
            refresh,
            methods::PROMPTS_LIST,
            |r: ListPromptsResult| r.prompts,
        )
        .await
    }

    pub(crate) async fn resources(
        &self,
        session: &Session,
        refresh: bool,
    ) -> Result<Arc<Vec<ResourceDescriptor>>, ClientError> {
        Self::list(
            &self.resources,
            session,
            refresh,
            methods::RESOURCES_LIST,
            |r: ListResourcesResult| r.resources,
        )
        .await
    }

    /// The cached tool list, if one exists right now. Never blocks and
    /// never fetches; an in-flight fetch reads as "no cache yet".
    pub(crate) fn peek_tools(&self) -> Option<Arc<Vec<ToolDescriptor>>> {
        self.tools.try_lock().ok().and_then(|slot| slot.clone())
    }

    pub(crate) async fn clear(&self) {
        *self.tools.lock().await = None;
        *self.prompts.lock().await = None;
        *self.resources.lock().await = None;
    }

    async fn list<T, R>(
        slot: &Slot<T>,
        session: &Session,
        refresh: bool,
        method: &str,
        extract: impl FnOnce(R) -> Vec<T>,
    ) -> Result<Arc<Vec<T>>, ClientError>
    where
        R: DeserializeOwned,
    {
        let mut slot = slot.lock().await;

        let state = session.state();
        if state != SessionState::Ready {
            // Invalidate rather than ever serving stale metadata.
            *slot = None;
            return Err(ClientError::Session(SessionError::NotReady { state }));
        }

        if !refresh && let Some(cached) = slot.as_ref() {
            return Ok(Arc::clone(cached));
        }

        let dispatcher = session.dispatcher()?;
        let result: R = dispatcher
            .dispatch_typed(method, None, session.request_timeout())
            .await?;
        let fresh = Arc::new(extract(result));
        *slot = Some(Arc::clone(&fresh));
        Ok(fresh)
    }
}
