//! Scriptable in-memory rendering backend used by the unit and scenario tests.

use crate::{EngineError, OutputFormat, RenderingEngine, TabAllocator};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// PNG file signature, enough to look like an image on disk.
pub const FAKE_PNG: &[u8] = &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Navigate,
    WaitVisible,
    Html,
    Screenshot,
    Links,
}

#[derive(Debug, Clone, Copy)]
enum Behavior {
    Fail,
    Stall,
    Delay(Duration),
    Panic,
}

/// Per-target script: which steps misbehave and what the page contains.
#[derive(Debug, Clone, Default)]
pub struct FakeEngine {
    behaviors: HashMap<Step, Behavior>,
    html: Option<String>,
    screenshot: Option<Vec<u8>>,
    links: Option<Vec<String>>,
}

impl FakeEngine {
    pub fn fail_on(mut self, step: Step) -> Self {
        self.behaviors.insert(step, Behavior::Fail);
        self
    }

    pub fn stall_on(mut self, step: Step) -> Self {
        self.behaviors.insert(step, Behavior::Stall);
        self
    }

    pub fn panic_on(mut self, step: Step) -> Self {
        self.behaviors.insert(step, Behavior::Panic);
        self
    }

    pub fn delay(mut self, step: Step, by: Duration) -> Self {
        self.behaviors.insert(step, Behavior::Delay(by));
        self
    }

    pub fn with_html(mut self, html: &str) -> Self {
        self.html = Some(html.to_string());
        self
    }

    pub fn with_screenshot(mut self, bytes: Vec<u8>) -> Self {
        self.screenshot = Some(bytes);
        self
    }

    pub fn with_links(mut self, links: &[&str]) -> Self {
        self.links = Some(links.iter().map(|l| l.to_string()).collect());
        self
    }
}

type Resolver = dyn Fn(&str) -> FakeEngine + Send + Sync;

#[derive(Default)]
struct Counters {
    opened: AtomicUsize,
    released: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: Mutex<Vec<(String, Step)>>,
}

/// Hands out [`FakeTab`]s whose script is picked by the URL they navigate to.
pub struct FakeAllocator {
    resolver: Arc<Resolver>,
    counters: Arc<Counters>,
    fail_open: bool,
}

impl FakeAllocator {
    pub fn new(resolver: impl Fn(&str) -> FakeEngine + Send + Sync + 'static) -> Self {
        Self {
            resolver: Arc::new(resolver),
            counters: Arc::new(Counters::default()),
            fail_open: false,
        }
    }

    /// An allocator whose browser is gone.
    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::new(|_| FakeEngine::default())
        }
    }

    pub fn opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.counters.released.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.counters.max_in_flight.load(Ordering::SeqCst)
    }

    /// Steps attempted by tabs whose URL contains `needle`, in call order.
    pub fn steps_for(&self, needle: &str) -> Vec<Step> {
        self.counters
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(url, _)| url.contains(needle))
            .map(|(_, step)| *step)
            .collect()
    }
}

#[async_trait]
impl TabAllocator for FakeAllocator {
    async fn open_tab(&self) -> Result<Box<dyn RenderingEngine>, EngineError> {
        if self.fail_open {
            return Err(EngineError::Protocol("browser has exited".to_string()));
        }

        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        let now = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_in_flight.fetch_max(now, Ordering::SeqCst);

        Ok(Box::new(FakeTab {
            resolver: self.resolver.clone(),
            counters: self.counters.clone(),
            url: String::new(),
            script: FakeEngine::default(),
            released: false,
        }))
    }
}

pub struct FakeTab {
    resolver: Arc<Resolver>,
    counters: Arc<Counters>,
    url: String,
    script: FakeEngine,
    released: bool,
}

impl FakeTab {
    async fn perform(&self, step: Step) -> Result<(), EngineError> {
        self.counters
            .calls
            .lock()
            .unwrap()
            .push((self.url.clone(), step));

        match self.script.behaviors.get(&step).copied() {
            Some(Behavior::Fail) => Err(EngineError::Protocol(format!("{step:?} failed"))),
            Some(Behavior::Stall) => {
                futures::future::pending::<()>().await;
                Ok(())
            }
            Some(Behavior::Delay(by)) => {
                tokio::time::sleep(by).await;
                Ok(())
            }
            Some(Behavior::Panic) => panic!("{step:?} panicked"),
            None => Ok(()),
        }
    }

    fn mark_released(&mut self) {
        if !self.released {
            self.released = true;
            self.counters.released.fetch_add(1, Ordering::SeqCst);
            self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl RenderingEngine for FakeTab {
    async fn navigate(&mut self, url: &str) -> Result<(), EngineError> {
        self.url = url.to_string();
        self.script = (self.resolver)(url);
        self.perform(Step::Navigate).await
    }

    async fn wait_visible(&mut self, _selector: &str) -> Result<(), EngineError> {
        self.perform(Step::WaitVisible).await
    }

    async fn capture_outer_html(&mut self, _selector: &str) -> Result<String, EngineError> {
        self.perform(Step::Html).await?;
        Ok(self
            .script
            .html
            .clone()
            .unwrap_or_else(|| format!("<html><body>{}</body></html>", self.url)))
    }

    async fn capture_full_page_screenshot(
        &mut self,
        _format: OutputFormat,
        _quality: u8,
    ) -> Result<Vec<u8>, EngineError> {
        self.perform(Step::Screenshot).await?;
        Ok(self
            .script
            .screenshot
            .clone()
            .unwrap_or_else(|| FAKE_PNG.to_vec()))
    }

    async fn evaluate(&mut self, _script: &str) -> Result<Vec<String>, EngineError> {
        self.perform(Step::Links).await?;
        Ok(self
            .script
            .links
            .clone()
            .unwrap_or_else(|| vec![format!("{}about", self.url)]))
    }

    async fn release(&mut self) -> Result<(), EngineError> {
        self.mark_released();
        Ok(())
    }
}

impl Drop for FakeTab {
    fn drop(&mut self) {
        self.mark_released();
    }
}
