//! Test doubles shared by the unit tests.

use crate::api::{CompletionClient, CompletionOptions, FragmentStream, RetryPolicy};
use crate::error::TrackerError;
use crate::extract::{ExtractSettings, Extractor};
use crate::models::EventRecord;
use crate::prompt::PromptBuilder;
use crate::scrapers::ArticleTextProvider;
use futures::StreamExt;
use futures::stream;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Article provider serving canned text per URL.
#[derive(Debug, Default)]
pub struct StubProvider {
    articles: HashMap<String, Option<String>>,
    /// Remaining transport failures per URL before the article is served.
    flaky: Mutex<HashMap<String, usize>>,
    fetches: Mutex<HashMap<String, usize>>,
}

impl StubProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_article(mut self, url: &str, text: &str) -> Self {
        self.articles.insert(url.to_string(), Some(text.to_string()));
        self
    }

    /// Make `url` fail with a transport error.
    pub fn with_failure(mut self, url: &str) -> Self {
        self.articles.insert(url.to_string(), None);
        self
    }

    /// Fail the first `failures` fetches of `url` with a transport error.
    pub fn failing_first(self, url: &str, failures: usize) -> Self {
        self.flaky.lock().unwrap().insert(url.to_string(), failures);
        self
    }

    pub fn fetches(&self, url: &str) -> usize {
        self.fetches.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

impl ArticleTextProvider for StubProvider {
    async fn fetch_text(&self, url: &str) -> Result<String, TrackerError> {
        *self.fetches.lock().unwrap().entry(url.to_string()).or_default() += 1;
        if let Some(remaining) = self.flaky.lock().unwrap().get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(TrackerError::Transport("connection reset".into()));
            }
        }
        match self.articles.get(url) {
            Some(Some(text)) => Ok(text.clone()),
            Some(None) => Err(TrackerError::Transport(format!("connection refused: {url}"))),
            None => Err(TrackerError::Transport(format!("no such host: {url}"))),
        }
    }
}

/// One scripted reply of [`ScriptedCompletion`].
#[derive(Debug, Clone)]
pub enum Scripted {
    Fragments(Vec<String>),
    TransportError,
    /// Never answers; exercises timeouts.
    Hang,
}

/// Completion client replaying scripted replies.
///
/// In sequential mode replies are consumed in order. In keyed mode the reply
/// is chosen by the first key found in the prompt, so concurrent requests get
/// deterministic answers.
#[derive(Debug, Default)]
pub struct ScriptedCompletion {
    queue: Mutex<VecDeque<Scripted>>,
    keyed: Vec<(String, Scripted)>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedCompletion {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            queue: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    pub fn keyed(script: Vec<(&str, Scripted)>) -> Self {
        Self {
            keyed: script
                .into_iter()
                .map(|(key, reply)| (key.to_string(), reply))
                .collect(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn next_reply(&self, prompt: &str) -> Option<Scripted> {
        if self.keyed.is_empty() {
            self.queue.lock().unwrap().pop_front()
        } else {
            self.keyed
                .iter()
                .find(|(key, _)| prompt.contains(key.as_str()))
                .map(|(_, reply)| reply.clone())
        }
    }
}

impl CompletionClient for ScriptedCompletion {
    async fn complete(
        &self,
        prompt: &str,
        _options: &CompletionOptions,
    ) -> Result<FragmentStream, TrackerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.next_reply(prompt) {
            Some(Scripted::Fragments(fragments)) => {
                Ok(stream::iter(fragments.into_iter().map(Ok)).boxed())
            }
            Some(Scripted::TransportError) => {
                Err(TrackerError::Transport("connection reset by peer".into()))
            }
            Some(Scripted::Hang) => std::future::pending().await,
            None => Err(TrackerError::Transport("script exhausted".into())),
        }
    }
}

pub fn test_options() -> CompletionOptions {
    CompletionOptions {
        model: "test-model".to_string(),
        temperature: 0.2,
        top_p: 0.7,
        max_tokens: 2024,
        stream: true,
    }
}

pub fn test_settings() -> ExtractSettings {
    ExtractSettings {
        fetch_timeout: Duration::from_secs(2),
        request_timeout: Duration::from_secs(2),
        retry: RetryPolicy {
            max_retries: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        },
        normalize_dates: true,
        reask_on_truncation: true,
    }
}

pub fn test_extractor(
    provider: StubProvider,
    client: ScriptedCompletion,
) -> Extractor<StubProvider, ScriptedCompletion> {
    Extractor::new(
        provider,
        client,
        PromptBuilder::new("hurricane", 24_000),
        test_options(),
        test_settings(),
    )
}

/// A complete record without commas or quotes in any field.
pub fn flood_record() -> EventRecord {
    EventRecord {
        city: "Tampa".to_string(),
        state: "Florida".to_string(),
        event: "Flooding".to_string(),
        summary: "Storm surge flooded Bayshore Boulevard.".to_string(),
        article_url: "https://news.example.com/tampa".to_string(),
        source: "Example News".to_string(),
        date_of_event: "2024-09-26".to_string(),
        event_picture_caption: Some("Flooded boulevard".to_string()),
        event_picture_link: Some("https://news.example.com/tampa.jpg".to_string()),
        lat: "27.9506".to_string(),
        lon: "-82.4572".to_string(),
    }
}
