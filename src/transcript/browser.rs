use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures_util::StreamExt;
use rand::seq::SliceRandom;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

use super::{FallbackSource, ScrapedSegment, TranscriptBody, TranscriptResult};
use crate::extractors::VideoRef;
use crate::{Result, TranscriptError};

const SETTLE_DELAY: Duration = Duration::from_millis(3000);
const SCROLL_DELAY: Duration = Duration::from_millis(1000);
const PANEL_DELAY: Duration = Duration::from_millis(2000);
const CONTROL_TIMEOUT: Duration = Duration::from_millis(5000);
const POLL_INTERVAL: Duration = Duration::from_millis(250);
const SCROLL_PIXELS: u32 = 300;

const DEFAULT_USER_AGENTS: [&str; 6] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Edge/120.0.0.0",
];

/// User agents the fallback browser rotates through
#[derive(Debug, Clone)]
pub struct UserAgentPool {
    agents: Vec<String>,
}

impl UserAgentPool {
    pub fn new(agents: Vec<String>) -> Self {
        if agents.is_empty() {
            return Self::default();
        }
        Self { agents }
    }

    /// Pool that always yields `agent`
    pub fn pinned(agent: impl Into<String>) -> Self {
        Self {
            agents: vec![agent.into()],
        }
    }

    pub fn choose(&self) -> &str {
        self.agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or(DEFAULT_USER_AGENTS[0])
    }
}

impl Default for UserAgentPool {
    fn default() -> Self {
        Self {
            agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// A "show transcript" control: CSS selector plus optional required text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlSelector {
    pub css: String,
    pub text: Option<String>,
}

impl ControlSelector {
    pub fn css(css: &str) -> Self {
        Self {
            css: css.to_string(),
            text: None,
        }
    }

    pub fn with_text(css: &str, text: &str) -> Self {
        Self {
            css: css.to_string(),
            text: Some(text.to_string()),
        }
    }
}

impl fmt::Display for ControlSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.text {
            Some(text) => write!(f, "{} (text \"{}\")", self.css, text),
            None => f.write_str(&self.css),
        }
    }
}

/// Selectors for one markup variant of the transcript panel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentFamily {
    pub container: String,
    pub time: String,
    pub text: String,
}

impl SegmentFamily {
    fn new(container: &str) -> Self {
        Self {
            container: container.to_string(),
            time: r#"[class*="time"], .segment-timestamp"#.to_string(),
            text: r#"[class*="text"], .segment-text"#.to_string(),
        }
    }
}

/// Page markup the fallback depends on, tried in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorSet {
    pub controls: Vec<ControlSelector>,
    pub segment_families: Vec<SegmentFamily>,
}

impl Default for SelectorSet {
    fn default() -> Self {
        Self {
            controls: vec![
                ControlSelector::css(r#"button[aria-label*="transcript" i]"#),
                ControlSelector::css(r#"button[aria-label*="Show transcript" i]"#),
                ControlSelector::css("ytd-video-description-transcript-section-renderer button"),
                ControlSelector::with_text("#primary-button button", "Show transcript"),
            ],
            segment_families: vec![
                SegmentFamily::new("ytd-transcript-segment-renderer"),
                SegmentFamily::new(".ytd-transcript-segment-renderer"),
                SegmentFamily::new(r#"[class*="transcript-segment"]"#),
            ],
        }
    }
}

/// The handful of page operations the scraper needs
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrowserPage: Send + Sync {
    async fn open(&self, url: &str) -> Result<()>;

    async fn scroll_by(&self, pixels: u32) -> Result<()>;

    /// Click the first visible match, polling until `timeout`; `false` if none appeared
    async fn click_visible(&self, control: &ControlSelector, timeout: Duration) -> Result<bool>;

    async fn collect_segments(&self, family: &SegmentFamily) -> Result<Vec<ScrapedSegment>>;
}

/// Open the watch page, reveal the transcript panel and read its segments
pub async fn scrape_transcript(
    page: &dyn BrowserPage,
    video: &VideoRef,
    selectors: &SelectorSet,
) -> Result<Vec<ScrapedSegment>> {
    tracing::info!("  Opening video page...");
    page.open(&video.watch_url()).await?;
    sleep(SETTLE_DELAY).await;

    page.scroll_by(SCROLL_PIXELS).await?;
    sleep(SCROLL_DELAY).await;

    open_transcript_panel(page, selectors).await?;
    sleep(PANEL_DELAY).await;

    tracing::info!("  Extracting transcript...");
    let segments = extract_segments(page, selectors).await?;
    tracing::info!("  Extracted {} segments", segments.len());

    Ok(segments)
}

async fn open_transcript_panel(page: &dyn BrowserPage, selectors: &SelectorSet) -> Result<()> {
    for control in &selectors.controls {
        tracing::info!("  Looking for transcript button: {}", control);
        match page.click_visible(control, CONTROL_TIMEOUT).await {
            Ok(true) => {
                tracing::info!("  Clicked transcript button");
                return Ok(());
            }
            Ok(false) => continue,
            Err(e) => {
                tracing::debug!("  Selector {} failed: {}", control, e);
                continue;
            }
        }
    }

    Err(TranscriptError::TranscriptControlNotFound)
}

/// First family that yields anything wins; families are never merged
async fn extract_segments(page: &dyn BrowserPage, selectors: &SelectorSet) -> Result<Vec<ScrapedSegment>> {
    for family in &selectors.segment_families {
        let segments = page.collect_segments(family).await?;
        if !segments.is_empty() {
            return Ok(segments);
        }
    }

    Err(TranscriptError::NoSegmentsExtracted)
}

/// Starts isolated browser sessions with a given user agent
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, user_agent: &str) -> Result<Box<dyn BrowserSession>>;
}

/// A live browser process; must be closed once the scrape is over
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>>;

    async fn close(&mut self);
}

/// Launch a session, scrape in a fresh page, then close the session on every path
pub async fn scrape_in_session(
    launcher: &dyn BrowserLauncher,
    user_agent: &str,
    video: &VideoRef,
    selectors: &SelectorSet,
) -> Result<Vec<ScrapedSegment>> {
    let mut session = launcher.launch(user_agent).await?;

    let scraped = async {
        let page = session.new_page().await?;
        scrape_transcript(page.as_ref(), video, selectors).await
    }
    .await;

    session.close().await;
    scraped
}

/// Headless Chromium fallback
pub struct BrowserFallback {
    user_agents: UserAgentPool,
    launcher: Arc<dyn BrowserLauncher>,
    selectors: SelectorSet,
}

impl BrowserFallback {
    pub fn new(user_agents: UserAgentPool, headless: bool) -> Self {
        Self::with_launcher(user_agents, Arc::new(ChromiumLauncher::new(headless)))
    }

    pub fn with_launcher(user_agents: UserAgentPool, launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self {
            user_agents,
            launcher,
            selectors: SelectorSet::default(),
        }
    }

    pub fn with_selectors(mut self, selectors: SelectorSet) -> Self {
        self.selectors = selectors;
        self
    }
}

#[async_trait]
impl FallbackSource for BrowserFallback {
    async fn fetch(&self, video: &VideoRef) -> Result<TranscriptResult> {
        tracing::info!("Using browser fallback for: {}", video.watch_url());

        let user_agent = self.user_agents.choose();
        tracing::debug!("Browser user agent: {}", user_agent);

        let segments =
            scrape_in_session(self.launcher.as_ref(), user_agent, video, &self.selectors).await?;

        Ok(TranscriptResult {
            video: video.clone(),
            body: TranscriptBody::Browser { segments },
        })
    }
}

/// Launches Chromium over the DevTools protocol
pub struct ChromiumLauncher {
    headless: bool,
}

impl ChromiumLauncher {
    pub fn new(headless: bool) -> Self {
        Self { headless }
    }

    fn browser_config(&self, user_agent: &str) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .window_size(1920, 1080)
            .arg(format!("--user-agent={}", user_agent));

        if !self.headless {
            builder = builder.with_head();
        }

        builder.build().map_err(TranscriptError::Browser)
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self, user_agent: &str) -> Result<Box<dyn BrowserSession>> {
        let (browser, mut handler) = Browser::launch(self.browser_config(user_agent)?)
            .await
            .map_err(browser_error)?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Box::new(ChromiumSession {
            browser,
            handler_task,
        }))
    }
}

struct ChromiumSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(browser_error)?;
        Ok(Box::new(CdpPage(page)))
    }

    async fn close(&mut self) {
        if let Err(e) = self.browser.close().await {
            tracing::warn!("Failed to close browser cleanly: {}", e);
            let _ = self.browser.kill().await;
        }
        if let Err(e) = self.browser.wait().await {
            tracing::debug!("Waiting for browser exit failed: {}", e);
        }
        self.handler_task.abort();
    }
}

fn browser_error(e: impl fmt::Display) -> TranscriptError {
    TranscriptError::Browser(e.to_string())
}

/// [`BrowserPage`] over a Chrome DevTools Protocol page
struct CdpPage(Page);

impl CdpPage {
    async fn eval<T: serde::de::DeserializeOwned>(&self, script: String) -> Result<T> {
        let result = self
            .0
            .evaluate_expression(script)
            .await
            .map_err(browser_error)?;
        Ok(result.into_value()?)
    }
}

#[async_trait]
impl BrowserPage for CdpPage {
    async fn open(&self, url: &str) -> Result<()> {
        self.0.goto(url).await.map_err(browser_error)?;
        Ok(())
    }

    async fn scroll_by(&self, pixels: u32) -> Result<()> {
        self.eval::<serde_json::Value>(format!("window.scrollBy(0, {}); true", pixels))
            .await?;
        Ok(())
    }

    async fn click_visible(&self, control: &ControlSelector, timeout: Duration) -> Result<bool> {
        let script = click_script(control)?;
        let deadline = Instant::now() + timeout;

        loop {
            if self.eval::<bool>(script.clone()).await? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn collect_segments(&self, family: &SegmentFamily) -> Result<Vec<ScrapedSegment>> {
        self.eval(segments_script(family)?).await
    }
}

fn click_script(control: &ControlSelector) -> Result<String> {
    Ok(format!(
        r#"(() => {{
    const wanted = {text};
    for (const el of document.querySelectorAll({css})) {{
        const rect = el.getBoundingClientRect();
        const style = window.getComputedStyle(el);
        if (rect.width === 0 || rect.height === 0 || style.visibility === 'hidden' || style.display === 'none') continue;
        if (wanted !== null && !el.textContent.toLowerCase().includes(wanted.toLowerCase())) continue;
        el.click();
        return true;
    }}
    return false;
}})()"#,
        css = serde_json::to_string(&control.css)?,
        text = serde_json::to_string(&control.text)?,
    ))
}

fn segments_script(family: &SegmentFamily) -> Result<String> {
    Ok(format!(
        r#"(() => {{
    const segments = [];
    document.querySelectorAll({container}).forEach(segment => {{
        const time = segment.querySelector({time});
        const text = segment.querySelector({text});
        if (text) {{
            segments.push({{
                timestamp: time ? time.textContent.trim() : '',
                text: text.textContent.trim()
            }});
        }}
    }});
    return segments;
}})()"#,
        container = serde_json::to_string(&family.container)?,
        time = serde_json::to_string(&family.time)?,
        text = serde_json::to_string(&family.text)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::SourceMethod;
    use mockall::predicate::eq;
    use mockall::Sequence;

    fn segment(timestamp: &str, text: &str) -> ScrapedSegment {
        ScrapedSegment {
            timestamp: timestamp.to_string(),
            text: text.to_string(),
        }
    }

    fn video() -> VideoRef {
        VideoRef::parse("dQw4w9WgXcQ").unwrap()
    }

    /// Launcher handing out one session that must be closed exactly once
    fn launcher_with(page: Result<MockBrowserPage>) -> Arc<MockBrowserLauncher> {
        let mut session = MockBrowserSession::new();
        session
            .expect_new_page()
            .times(1)
            .return_once(move || page.map(|p| Box::new(p) as Box<dyn BrowserPage>));
        session.expect_close().times(1).return_const(());

        let mut launcher = MockBrowserLauncher::new();
        launcher
            .expect_launch()
            .with(eq("test-agent/1.0"))
            .times(1)
            .return_once(move |_| Ok(Box::new(session) as Box<dyn BrowserSession>));
        Arc::new(launcher)
    }

    fn fallback_with(launcher: Arc<MockBrowserLauncher>) -> BrowserFallback {
        BrowserFallback::with_launcher(UserAgentPool::pinned("test-agent/1.0"), launcher)
    }

    fn page_that_opens() -> MockBrowserPage {
        let mut page = MockBrowserPage::new();
        page.expect_open()
            .with(eq("https://www.youtube.com/watch?v=dQw4w9WgXcQ"))
            .times(1)
            .returning(|_| Ok(()));
        page.expect_scroll_by().with(eq(300u32)).returning(|_| Ok(()));
        page
    }

    #[test]
    fn test_pinned_user_agent() {
        let pool = UserAgentPool::pinned("test-agent/1.0");
        for _ in 0..5 {
            assert_eq!(pool.choose(), "test-agent/1.0");
        }
    }

    #[test]
    fn test_default_pool_chooses_known_agent() {
        let pool = UserAgentPool::default();
        assert!(DEFAULT_USER_AGENTS.contains(&pool.choose()));
        assert_eq!(UserAgentPool::new(Vec::new()).agents.len(), DEFAULT_USER_AGENTS.len());
    }

    #[test]
    fn test_custom_selectors_replace_defaults() {
        let custom = SelectorSet {
            controls: vec![ControlSelector::css("#open-transcript")],
            segment_families: vec![SegmentFamily::new(".caption-line")],
        };
        let fallback = BrowserFallback::new(UserAgentPool::default(), true).with_selectors(custom.clone());
        assert_eq!(fallback.selectors, custom);
        assert_ne!(fallback.selectors, SelectorSet::default());
    }

    #[test]
    fn test_scripts_escape_selectors() {
        let script = click_script(&ControlSelector::css(r#"button[aria-label*="transcript" i]"#)).unwrap();
        assert!(script.contains(r#"document.querySelectorAll("button[aria-label*=\"transcript\" i]")"#));
        assert!(script.contains("const wanted = null;"));

        let script = click_script(&ControlSelector::with_text("#primary-button button", "Show transcript")).unwrap();
        assert!(script.contains(r#"const wanted = "Show transcript";"#));

        let script = segments_script(&SelectorSet::default().segment_families[2]).unwrap();
        assert!(script.contains(r#"document.querySelectorAll("[class*=\"transcript-segment\"]")"#));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_visible_control_is_clicked() {
        let selectors = SelectorSet::default();
        let mut page = page_that_opens();
        let mut seq = Sequence::new();

        page.expect_click_visible()
            .with(eq(selectors.controls[0].clone()), eq(CONTROL_TIMEOUT))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(false));
        page.expect_click_visible()
            .with(eq(selectors.controls[1].clone()), eq(CONTROL_TIMEOUT))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(TranscriptError::Browser("detached".into())));
        page.expect_click_visible()
            .with(eq(selectors.controls[2].clone()), eq(CONTROL_TIMEOUT))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(true));
        page.expect_collect_segments()
            .returning(|_| Ok(vec![segment("0:01", "Hello."), segment("0:03", "World.")]));

        let segments = scrape_transcript(&page, &video(), &selectors).await.unwrap();
        assert_eq!(segments.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_control_fails() {
        let mut page = page_that_opens();
        page.expect_click_visible().times(4).returning(|_, _| Ok(false));
        page.expect_collect_segments().never();

        let err = scrape_transcript(&page, &video(), &SelectorSet::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TranscriptError::TranscriptControlNotFound));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_non_empty_family_wins() {
        let selectors = SelectorSet::default();
        let mut page = page_that_opens();
        page.expect_click_visible().returning(|_, _| Ok(true));

        let first = selectors.segment_families[0].clone();
        let second = selectors.segment_families[1].clone();
        let third = selectors.segment_families[2].clone();
        page.expect_collect_segments()
            .with(eq(first))
            .times(1)
            .returning(|_| Ok(Vec::new()));
        page.expect_collect_segments()
            .with(eq(second))
            .times(1)
            .returning(|_| Ok(vec![segment("", "Only from the second family.")]));
        page.expect_collect_segments().with(eq(third)).never();

        let segments = scrape_transcript(&page, &video(), &selectors).await.unwrap();
        assert_eq!(segments, vec![segment("", "Only from the second family.")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_panel_fails() {
        let mut page = page_that_opens();
        page.expect_click_visible().returning(|_, _| Ok(true));
        page.expect_collect_segments().times(3).returning(|_| Ok(Vec::new()));

        let err = scrape_transcript(&page, &video(), &SelectorSet::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TranscriptError::NoSegmentsExtracted));
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_closed_after_success() {
        let mut page = page_that_opens();
        page.expect_click_visible().returning(|_, _| Ok(true));
        page.expect_collect_segments()
            .returning(|_| Ok(vec![segment("0:01", "Hello there.")]));

        let result = fallback_with(launcher_with(Ok(page))).fetch(&video()).await.unwrap();
        assert_eq!(result.source_method(), SourceMethod::BrowserFallback);
        assert_eq!(result.segment_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_closed_when_control_missing() {
        let mut page = page_that_opens();
        page.expect_click_visible().returning(|_, _| Ok(false));

        let err = fallback_with(launcher_with(Ok(page))).fetch(&video()).await.unwrap_err();
        assert!(matches!(err, TranscriptError::TranscriptControlNotFound));
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_closed_when_panel_empty() {
        let mut page = page_that_opens();
        page.expect_click_visible().returning(|_, _| Ok(true));
        page.expect_collect_segments().returning(|_| Ok(Vec::new()));

        let err = fallback_with(launcher_with(Ok(page))).fetch(&video()).await.unwrap_err();
        assert!(matches!(err, TranscriptError::NoSegmentsExtracted));
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_closed_when_page_fails() {
        let err = fallback_with(launcher_with(Err(TranscriptError::Browser("no target".into()))))
            .fetch(&video())
            .await
            .unwrap_err();
        assert!(matches!(err, TranscriptError::Browser(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_closed_when_navigation_fails() {
        let mut page = MockBrowserPage::new();
        page.expect_open()
            .times(1)
            .returning(|_| Err(TranscriptError::Browser("net::ERR_ABORTED".into())));
        page.expect_click_visible().never();

        let err = fallback_with(launcher_with(Ok(page))).fetch(&video()).await.unwrap_err();
        assert!(matches!(err, TranscriptError::Browser(_)));
    }

    #[tokio::test]
    async fn test_launch_failure_is_reported() {
        let mut launcher = MockBrowserLauncher::new();
        launcher
            .expect_launch()
            .times(1)
            .returning(|_| Err(TranscriptError::Browser("chrome not found".into())));

        let err = fallback_with(Arc::new(launcher)).fetch(&video()).await.unwrap_err();
        assert!(matches!(err, TranscriptError::Browser(_)));
    }
}
