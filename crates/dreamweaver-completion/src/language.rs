use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use dreamweaver_types::api::CacheStats;

use crate::cache::TtlCache;
use crate::prompts::language_request;
use crate::{CompletionError, CompletionService};

/// Cache keys use at most this many leading characters of the text.
const CACHE_KEY_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageCode {
    English,
    Hindi,
    Marathi,
}

impl LanguageCode {
    /// Parses tags like `hi-IN`, `mr`, or `EN-in`. Unknown tags are `None`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let primary = tag.trim().split(['-', '_']).next()?.to_ascii_lowercase();
        match primary.as_str() {
            "en" => Some(Self::English),
            "hi" => Some(Self::Hindi),
            "mr" => Some(Self::Marathi),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::English => "en-IN",
            Self::Hindi => "hi-IN",
            Self::Marathi => "mr-IN",
        }
    }

    pub fn short_code(&self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Hindi => "hi",
            Self::Marathi => "mr",
        }
    }

    pub fn instruction(&self) -> &'static str {
        match self {
            Self::English => "Respond in warm, friendly English like a close friend",
            Self::Hindi => {
                "Respond in warm, friendly Hindi like a close Indian friend. Use respectful terms and Hindi phrases naturally."
            }
            Self::Marathi => {
                "Respond in warm, friendly Marathi like a close Maharashtrian friend. Use affectionate terms and Marathi phrases naturally."
            }
        }
    }
}

/// Guesses the language of a user turn through the completion service.
/// Any failure falls back to English; answers are cached by text prefix.
pub struct LanguageDetector {
    completion: Arc<dyn CompletionService>,
    cache: TtlCache<LanguageCode>,
}

impl LanguageDetector {
    pub fn new(completion: Arc<dyn CompletionService>, ttl: Duration) -> Self {
        Self {
            completion,
            cache: TtlCache::new(ttl),
        }
    }

    pub async fn detect(&self, text: &str, cancel: &CancellationToken) -> LanguageCode {
        let key: String = text.chars().take(CACHE_KEY_CHARS).collect();
        if let Some(code) = self.cache.get(&key) {
            return code;
        }

        match self.completion.complete(language_request(text), cancel).await {
            Ok(answer) => match LanguageCode::from_tag(&answer) {
                Some(code) => {
                    self.cache.insert(key, code);
                    code
                }
                None => {
                    debug!("Unrecognised language tag {:?}, using English", answer);
                    LanguageCode::English
                }
            },
            Err(CompletionError::Cancelled) => LanguageCode::English,
            Err(e) => {
                warn!("Language detection failed: {}", e);
                LanguageCode::English
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CompletionRequest;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        answer: Result<String, CompletionError>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CompletionService for Scripted {
        async fn complete(
            &self,
            _request: CompletionRequest,
            _cancel: &CancellationToken,
        ) -> Result<String, CompletionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone()
        }
    }

    fn detector(answer: Result<String, CompletionError>) -> (Arc<Scripted>, LanguageDetector) {
        let service = Arc::new(Scripted {
            answer,
            calls: AtomicUsize::new(0),
        });
        let detector = LanguageDetector::new(service.clone(), Duration::from_secs(3600));
        (service, detector)
    }

    #[test]
    fn tags_parse_loosely() {
        assert_eq!(LanguageCode::from_tag("hi-IN"), Some(LanguageCode::Hindi));
        assert_eq!(LanguageCode::from_tag(" MR "), Some(LanguageCode::Marathi));
        assert_eq!(LanguageCode::from_tag("fr-FR"), None);
        assert_eq!(LanguageCode::English.tag(), "en-IN");
    }

    #[tokio::test]
    async fn detection_is_cached_by_prefix() {
        let (service, detector) = detector(Ok("hi-IN".to_string()));
        let cancel = CancellationToken::new();

        assert_eq!(detector.detect("मैं आज बहुत उदास हूँ", &cancel).await, LanguageCode::Hindi);
        assert_eq!(detector.detect("मैं आज बहुत उदास हूँ", &cancel).await, LanguageCode::Hindi);

        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
        let stats = detector.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[tokio::test]
    async fn failures_fall_back_to_english_uncached() {
        let (service, detector) = detector(Err(CompletionError::Transient("timeout".into())));
        let cancel = CancellationToken::new();

        assert_eq!(detector.detect("hello", &cancel).await, LanguageCode::English);
        assert_eq!(detector.detect("hello", &cancel).await, LanguageCode::English);
        assert_eq!(service.calls.load(Ordering::SeqCst), 2);
    }
}
