//! Scripted provider for tests and offline development.
//!
//! Replies are scripted up front: an optional sequence consumed one per call,
//! then a default reply repeated forever. Each reply may be delayed so timeout
//! behaviour can be exercised under `tokio::time::pause`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::{ProviderAdapter, ProviderCall, ProviderError, ProviderReply, ProviderResult};

#[derive(Debug, Clone)]
enum Outcome {
    Reply(ProviderReply),
    Error(String),
    Panic(String),
}

/// One scripted answer.
#[derive(Debug, Clone)]
pub struct ScriptedReply {
    delay: Duration,
    outcome: Outcome,
}

impl ScriptedReply {
    /// Successful reply with a self-reported quality.
    pub fn ok(payload: serde_json::Value, quality: f64) -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: Outcome::Reply(ProviderReply::new(payload).with_quality(quality)),
        }
    }

    /// Successful reply that reports no quality signal.
    pub fn ok_unrated(payload: serde_json::Value) -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: Outcome::Reply(ProviderReply::new(payload)),
        }
    }

    /// Adapter-level failure.
    pub fn error(message: &str) -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: Outcome::Error(message.to_string()),
        }
    }

    /// Panic inside the provider task.
    pub fn panic(message: &str) -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: Outcome::Panic(message.to_string()),
        }
    }

    /// Delay the outcome by `ms` milliseconds.
    pub fn after_ms(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    /// Attach a cost estimate (successful replies only).
    pub fn with_cost(mut self, cost: f64) -> Self {
        if let Outcome::Reply(reply) = &mut self.outcome {
            reply.cost = cost;
        }
        self
    }

    /// Attach token usage (successful replies only).
    pub fn with_tokens(mut self, tokens: u32) -> Self {
        if let Outcome::Reply(reply) = &mut self.outcome {
            reply.tokens_used = tokens;
        }
        self
    }
}

/// Provider adapter driven entirely by scripted replies.
pub struct ScriptedProvider {
    name: String,
    capabilities: Vec<String>,
    sequence: Mutex<VecDeque<ScriptedReply>>,
    default_reply: ScriptedReply,
    invocations: AtomicUsize,
    captured_calls: Mutex<Vec<ProviderCall>>,
}

impl ScriptedProvider {
    pub fn new<I, S>(name: &str, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            capabilities: capabilities.into_iter().map(Into::into).collect(),
            sequence: Mutex::new(VecDeque::new()),
            default_reply: ScriptedReply::ok_unrated(serde_json::Value::Null),
            invocations: AtomicUsize::new(0),
            captured_calls: Mutex::new(Vec::new()),
        }
    }

    /// Reply used for every call once the sequence is exhausted.
    pub fn with_reply(mut self, reply: ScriptedReply) -> Self {
        self.default_reply = reply;
        self
    }

    /// Replies consumed in order, one per call, before the default reply.
    pub fn with_sequence(self, replies: Vec<ScriptedReply>) -> Self {
        *lock(&self.sequence) = replies.into();
        self
    }

    /// Number of times `invoke` has been called.
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Calls received so far, in order.
    pub fn captured_calls(&self) -> Vec<ProviderCall> {
        lock(&self.captured_calls).clone()
    }

    fn next_reply(&self) -> ScriptedReply {
        lock(&self.sequence)
            .pop_front()
            .unwrap_or_else(|| self.default_reply.clone())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ProviderAdapter for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    async fn invoke(&self, call: &ProviderCall) -> ProviderResult<ProviderReply> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        lock(&self.captured_calls).push(call.clone());

        let reply = self.next_reply();
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }

        match reply.outcome {
            Outcome::Reply(reply) => Ok(reply),
            Outcome::Error(message) => Err(ProviderError::RequestFailed(message)),
            Outcome::Panic(message) => panic!("{}", message),
        }
    }
}
