//! Mock providers shared by the agent tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use parley_core::error::ProviderError;
use parley_core::provider::{ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk};
use tokio::sync::mpsc;

use crate::driver::{Fragment, FragmentReceiver};

/// Replies with a fixed list of fragments and records every request.
pub struct ScriptedProvider {
    fragments: Vec<String>,
    interrupt: bool,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn fragments(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|s| s.to_string()).collect(),
            interrupt: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn text(text: &str) -> Self {
        Self::fragments(&[text])
    }

    /// Emits the fragments, then fails instead of finishing.
    pub fn interrupted(fragments: &[&str]) -> Self {
        Self {
            interrupt: true,
            ..Self::fragments(fragments)
        }
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        Ok(ProviderResponse {
            content: self.fragments.concat(),
            usage: None,
            model: "scripted-model".into(),
        })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let (tx, rx) = mpsc::channel(self.fragments.len() + 1);
        for fragment in &self.fragments {
            tx.send(Ok(StreamChunk::delta(fragment.as_str()))).await.unwrap();
        }
        if self.interrupt {
            tx.send(Err(ProviderError::StreamInterrupted("connection reset".into())))
                .await
                .unwrap();
        } else {
            tx.send(Ok(StreamChunk::done())).await.unwrap();
        }
        Ok(rx)
    }
}

/// Rejects every call.
pub struct FailingProvider;

#[async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::AuthenticationFailed("bad key".into()))
    }

    async fn stream(&self, _request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        Err(ProviderError::AuthenticationFailed("bad key".into()))
    }

    fn is_configured(&self) -> bool {
        false
    }
}

/// Never answers a blocking call.
pub struct HangingProvider;

#[async_trait]
impl Provider for HangingProvider {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        std::future::pending().await
    }
}

/// Streams one fragment, then goes silent without closing.
pub struct StallingProvider;

#[async_trait]
impl Provider for StallingProvider {
    fn name(&self) -> &str {
        "stalling"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        std::future::pending().await
    }

    async fn stream(&self, _request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(async move {
            let _ = tx.send(Ok(StreamChunk::delta("first"))).await;
            std::future::pending::<()>().await;
            drop(tx);
        });
        Ok(rx)
    }
}

pub fn scripted(fragments: &[&str]) -> Arc<ScriptedProvider> {
    Arc::new(ScriptedProvider::fragments(fragments))
}

pub async fn drain(mut rx: FragmentReceiver) -> Vec<Fragment> {
    let mut out = Vec::new();
    while let Some(fragment) = rx.recv().await {
        out.push(fragment);
    }
    out
}

pub fn texts(fragments: &[Fragment]) -> Vec<String> {
    fragments
        .iter()
        .filter_map(|f| match f {
            Fragment::Text(t) => Some(t.clone()),
            Fragment::Error(_) => None,
        })
        .collect()
}
