use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_cloudwatchlogs::Client;
use tracing::{debug, warn};

use crate::config::LOG_PAGE_LIMIT;
use crate::error::{Error, Result};

/// Upper bound on pages read with `all_pages`, about a million events
pub const MAX_LOG_PAGES: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    /// milliseconds since the epoch
    pub timestamp: Option<i64>,
    pub message: String,
}

/// One GetLogEvents answer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogPage {
    pub events: Vec<LogEvent>,
    pub next_forward_token: Option<String>,
}

#[async_trait]
pub trait LogSource: Send + Sync {
    /// Read up to one page of events, oldest first, starting at `next_token`
    /// or at the head of the stream.
    async fn log_events(
        &self,
        group: &str,
        stream: &str,
        next_token: Option<&str>,
    ) -> Result<LogPage>;
}

/// LogSource backed by CloudWatch Logs
#[derive(Debug, Clone)]
pub struct CloudWatchLogSource {
    client: Client,
}

impl CloudWatchLogSource {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

#[async_trait]
impl LogSource for CloudWatchLogSource {
    async fn log_events(
        &self,
        group: &str,
        stream: &str,
        next_token: Option<&str>,
    ) -> Result<LogPage> {
        let output = self
            .client
            .get_log_events()
            .log_group_name(group)
            .log_stream_name(stream)
            .limit(LOG_PAGE_LIMIT)
            .start_from_head(true)
            .set_next_token(next_token.map(String::from))
            .send()
            .await
            .map_err(|e| Error::api("GetLogEvents", e))?;

        let events = output
            .events()
            .iter()
            .map(|e| LogEvent {
                timestamp: e.timestamp(),
                message: e.message().unwrap_or_default().to_string(),
            })
            .collect();

        Ok(LogPage {
            events,
            next_forward_token: output.next_forward_token().map(String::from),
        })
    }
}

/// Collect the events of a stream, earliest first.
///
/// Without `all_pages` only the first page is read, so long streams are cut
/// at `LOG_PAGE_LIMIT` events. With it, pages are followed until the service
/// hands back the token it was given, which marks the end of the stream. An
/// empty page is not the end: the service may return one while more events
/// are still reachable through its token.
pub async fn fetch_events(
    source: &dyn LogSource,
    group: &str,
    stream: &str,
    all_pages: bool,
) -> Result<Vec<LogEvent>> {
    let mut events = Vec::new();
    let mut token: Option<String> = None;
    let mut pages = 0;

    loop {
        let page = source.log_events(group, stream, token.as_deref()).await?;
        pages += 1;
        events.extend(page.events);

        if !all_pages {
            break;
        }
        if pages >= MAX_LOG_PAGES {
            warn!(group, stream, pages, "stopped reading logs at the page limit");
            break;
        }
        match page.next_forward_token {
            Some(next) if token.as_deref() != Some(next.as_str()) => token = Some(next),
            _ => break,
        }
    }

    debug!(
        group,
        stream,
        count = events.len(),
        first = ?events.first().and_then(|e| e.timestamp),
        last = ?events.last().and_then(|e| e.timestamp),
        "fetched log events"
    );
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Serves canned pages keyed by the token they answer.
    struct PagedSource {
        pages: Vec<(Option<&'static str>, LogPage)>,
        calls: Mutex<Vec<Option<String>>>,
    }

    impl PagedSource {
        fn new(pages: Vec<(Option<&'static str>, LogPage)>) -> Self {
            Self {
                pages,
                calls: Mutex::new(vec![]),
            }
        }

        fn calls(&self) -> Vec<Option<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LogSource for PagedSource {
        async fn log_events(
            &self,
            _group: &str,
            _stream: &str,
            next_token: Option<&str>,
        ) -> Result<LogPage> {
            self.calls.lock().unwrap().push(next_token.map(String::from));
            Ok(self
                .pages
                .iter()
                .find(|(token, _)| *token == next_token)
                .map(|(_, page)| page.clone())
                .unwrap_or_default())
        }
    }

    fn page(messages: &[&str], next: &str) -> LogPage {
        LogPage {
            events: messages
                .iter()
                .enumerate()
                .map(|(i, m)| LogEvent {
                    timestamp: Some(i as i64),
                    message: m.to_string(),
                })
                .collect(),
            next_forward_token: Some(next.to_string()),
        }
    }

    fn messages(events: &[LogEvent]) -> Vec<&str> {
        events.iter().map(|e| e.message.as_str()).collect()
    }

    #[tokio::test]
    async fn single_page_by_default() {
        let source = PagedSource::new(vec![
            (None, page(&["one", "two"], "f/1")),
            (Some("f/1"), page(&["three"], "f/2")),
        ]);

        let events = fetch_events(&source, "/ecs/app", "ecs/app/abc", false)
            .await
            .unwrap();

        assert_eq!(messages(&events), vec!["one", "two"]);
        assert_eq!(source.calls(), vec![None]);
    }

    #[tokio::test]
    async fn all_pages_until_token_repeats() {
        let source = PagedSource::new(vec![
            (None, page(&["one", "two"], "f/1")),
            (Some("f/1"), page(&["three"], "f/2")),
            (Some("f/2"), page(&["four"], "f/2")),
        ]);

        let events = fetch_events(&source, "/ecs/app", "ecs/app/abc", true)
            .await
            .unwrap();

        assert_eq!(messages(&events), vec!["one", "two", "three", "four"]);
        assert_eq!(
            source.calls(),
            vec![None, Some("f/1".to_string()), Some("f/2".to_string())]
        );
    }

    #[tokio::test]
    async fn all_pages_reads_past_empty_page() {
        let source = PagedSource::new(vec![
            (None, page(&["one"], "f/1")),
            (Some("f/1"), page(&[], "f/2")),
            (Some("f/2"), page(&["after the gap"], "f/3")),
            (Some("f/3"), page(&[], "f/3")),
        ]);

        let events = fetch_events(&source, "/ecs/app", "ecs/app/abc", true)
            .await
            .unwrap();

        assert_eq!(messages(&events), vec!["one", "after the gap"]);
        assert_eq!(source.calls().len(), 4);
    }

    #[tokio::test]
    async fn all_pages_stops_at_page_limit() {
        /// Always hands out a fresh token, so the stream never ends.
        struct EndlessSource {
            served: AtomicUsize,
        }

        #[async_trait]
        impl LogSource for EndlessSource {
            async fn log_events(
                &self,
                _group: &str,
                _stream: &str,
                _next_token: Option<&str>,
            ) -> Result<LogPage> {
                let n = self.served.fetch_add(1, Ordering::SeqCst);
                Ok(LogPage {
                    events: vec![],
                    next_forward_token: Some(format!("f/{n}")),
                })
            }
        }

        let source = EndlessSource {
            served: AtomicUsize::new(0),
        };
        let events = fetch_events(&source, "/ecs/app", "ecs/app/abc", true)
            .await
            .unwrap();

        assert!(events.is_empty());
        assert_eq!(source.served.load(Ordering::SeqCst), MAX_LOG_PAGES);
    }

    #[tokio::test]
    async fn source_error_is_returned() {
        struct FailingSource;

        #[async_trait]
        impl LogSource for FailingSource {
            async fn log_events(
                &self,
                _group: &str,
                _stream: &str,
                _next_token: Option<&str>,
            ) -> Result<LogPage> {
                Err(Error::Api {
                    operation: "GetLogEvents",
                    message: "ResourceNotFoundException".into(),
                })
            }
        }

        let err = fetch_events(&FailingSource, "/ecs/app", "ecs/app/abc", false)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Api { operation: "GetLogEvents", .. }));
    }
}
