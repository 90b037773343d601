#[cfg(test)]
mod integration_tests {
    use crate::fakes::{FakeAllocator, FakeEngine, Step, FAKE_PNG};
    use crate::{
        shutdown_channel, ArtifactLayout, Config, Orchestrator, OutputLayout, ScrapeError,
        ShutdownSignal,
    };
    use chrono::DateTime;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::Instant;

    fn config_in(dir: &TempDir) -> Config {
        Config {
            output: OutputLayout::rooted_at(dir.path()),
            ..Default::default()
        }
    }

    fn orchestrator(allocator: &Arc<FakeAllocator>, config: Config) -> Orchestrator {
        Orchestrator::new(allocator.clone(), config, ShutdownSignal::never())
    }

    fn exists(dir: &TempDir, relative: &str) -> bool {
        dir.path().join(relative).exists()
    }

    fn read(dir: &TempDir, relative: &str) -> String {
        std::fs::read_to_string(dir.path().join(relative)).unwrap()
    }

    fn count_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_malformed_entry_does_not_affect_others() {
        let dir = TempDir::new().unwrap();
        let allocator = Arc::new(FakeAllocator::new(|_| FakeEngine::default()));

        orchestrator(&allocator, config_in(&dir))
            .scrape_all("https://a.test,not a url,https://b.test:8080")
            .await;

        assert!(exists(&dir, "html/a.test_site_data.html"));
        assert!(exists(&dir, "html/b.test_8080_site_data.html"));
        assert!(exists(&dir, "screenshots/a.test_screenshot.png"));
        assert!(exists(&dir, "screenshots/b.test_8080_screenshot.png"));
        assert!(exists(&dir, "url/a.test_urls.txt"));
        assert!(exists(&dir, "url/b.test_8080_urls.txt"));
        assert_eq!(count_files(&dir.path().join("html")), 2);

        // The malformed entry never got a tab.
        assert_eq!(allocator.opened(), 2);
        assert_eq!(allocator.released(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_target_fails_at_deadline_without_artifacts() {
        let dir = TempDir::new().unwrap();
        let allocator = Arc::new(FakeAllocator::new(|url| {
            if url.contains("slow.test") {
                FakeEngine::default().stall_on(Step::WaitVisible)
            } else {
                FakeEngine::default()
            }
        }));

        let started = Instant::now();
        orchestrator(&allocator, config_in(&dir))
            .scrape_all("https://slow.test,https://fast.test")
            .await;
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_secs(45));
        assert!(elapsed < Duration::from_secs(46));

        assert!(exists(&dir, "html/fast.test_site_data.html"));
        assert!(!exists(&dir, "html/slow.test_site_data.html"));
        assert!(!exists(&dir, "screenshots/slow.test_screenshot.png"));
        assert!(!exists(&dir, "url/slow.test_urls.txt"));

        assert_eq!(
            allocator.steps_for("slow.test"),
            vec![Step::Navigate, Step::WaitVisible]
        );
        assert_eq!(allocator.released(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_mid_capture_keeps_html_only() {
        let dir = TempDir::new().unwrap();
        let allocator = Arc::new(FakeAllocator::new(|_| {
            FakeEngine::default()
                .with_html("<html><body>partial</body></html>")
                .stall_on(Step::Screenshot)
        }));

        orchestrator(&allocator, config_in(&dir))
            .scrape_all("https://a.test")
            .await;

        assert_eq!(
            read(&dir, "html/a.test_site_data.html"),
            "<html><body>partial</body></html>"
        );
        assert!(!exists(&dir, "screenshots/a.test_screenshot.png"));
        assert!(!exists(&dir, "url/a.test_urls.txt"));
        assert!(!allocator.steps_for("a.test").contains(&Step::Links));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_mid_capture_without_partial_persistence() {
        let dir = TempDir::new().unwrap();
        let allocator =
            Arc::new(FakeAllocator::new(|_| FakeEngine::default().stall_on(Step::Screenshot)));
        let config = Config {
            persist_partial_results: false,
            ..config_in(&dir)
        };

        orchestrator(&allocator, config).scrape_all("https://a.test").await;

        assert!(!exists(&dir, "html/a.test_site_data.html"));
        assert_eq!(count_files(&dir.path().join("screenshots")), 0);
    }

    #[tokio::test]
    async fn test_link_artifact_round_trip() {
        let dir = TempDir::new().unwrap();
        let allocator = Arc::new(FakeAllocator::new(|_| {
            FakeEngine::default().with_links(&[
                "https://x.test/1",
                "",
                "https://x.test/2",
                "https://x.test/1",
                "",
                "https://y.test/",
            ])
        }));

        orchestrator(&allocator, config_in(&dir))
            .scrape_all("https://a.test")
            .await;

        let body = read(&dir, "url/a.test_urls.txt");
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines[0], "Scraped URL: https://a.test");
        let timestamp = lines[1].strip_prefix("Timestamp: ").unwrap();
        assert!(DateTime::parse_from_rfc3339(timestamp).is_ok());
        assert_eq!(lines[2], "--- Extracted URLs ---");
        assert_eq!(
            &lines[3..],
            &[
                "https://x.test/1",
                "https://x.test/2",
                "https://x.test/1",
                "https://y.test/"
            ]
        );
    }

    #[tokio::test]
    async fn test_second_run_overwrites_artifacts() {
        let dir = TempDir::new().unwrap();
        let allocator = Arc::new(FakeAllocator::new(|_| {
            FakeEngine::default()
                .with_html("<html>same</html>")
                .with_screenshot(FAKE_PNG.to_vec())
                .with_links(&["https://a.test/x"])
        }));
        let orchestrator = orchestrator(&allocator, config_in(&dir));

        orchestrator.scrape_all("https://a.test,https://b.test").await;
        let first_urls = read(&dir, "url/a.test_urls.txt");
        orchestrator.scrape_all("https://a.test,https://b.test").await;

        assert_eq!(read(&dir, "html/a.test_site_data.html"), "<html>same</html>");
        assert_eq!(
            std::fs::read(dir.path().join("screenshots/b.test_screenshot.png")).unwrap(),
            FAKE_PNG
        );
        let second_urls = read(&dir, "url/a.test_urls.txt");
        assert_eq!(second_urls.lines().count(), first_urls.lines().count());
        assert_eq!(count_files(&dir.path().join("html")), 2);
    }

    #[tokio::test]
    async fn test_failures_are_contained_per_target() {
        let dir = TempDir::new().unwrap();
        let allocator = Arc::new(FakeAllocator::new(|url| {
            if url.contains("broken.test") {
                FakeEngine::default().fail_on(Step::Navigate)
            } else if url.contains("crash.test") {
                FakeEngine::default().panic_on(Step::Html)
            } else if url.contains("nolinks.test") {
                FakeEngine::default().fail_on(Step::Links)
            } else {
                FakeEngine::default()
            }
        }));

        orchestrator(&allocator, config_in(&dir))
            .scrape_all("https://broken.test,https://crash.test,https://nolinks.test,https://ok.test")
            .await;

        assert!(exists(&dir, "html/ok.test_site_data.html"));
        assert!(exists(&dir, "url/ok.test_urls.txt"));
        assert!(!exists(&dir, "html/broken.test_site_data.html"));
        assert!(!exists(&dir, "html/crash.test_site_data.html"));
        // Capture before the failing link step is kept.
        assert!(exists(&dir, "html/nolinks.test_site_data.html"));
        assert!(exists(&dir, "screenshots/nolinks.test_screenshot.png"));
        assert!(!exists(&dir, "url/nolinks.test_urls.txt"));

        // The panicking unit still gave its tab back.
        assert_eq!(allocator.opened(), 4);
        assert_eq!(allocator.released(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_fan_out_runs_every_target_at_once() {
        let dir = TempDir::new().unwrap();
        let allocator = Arc::new(FakeAllocator::new(|_| {
            FakeEngine::default().delay(Step::Navigate, Duration::from_secs(5))
        }));

        let started = Instant::now();
        orchestrator(&allocator, config_in(&dir))
            .scrape_all("https://a.test,https://b.test,https://c.test,https://d.test,https://e.test")
            .await;

        assert_eq!(allocator.max_in_flight(), 5);
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(count_files(&dir.path().join("html")), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_fan_out_still_completes_every_target() {
        let dir = TempDir::new().unwrap();
        let allocator = Arc::new(FakeAllocator::new(|url| {
            if url.contains("bad.test") {
                FakeEngine::default().fail_on(Step::Navigate)
            } else {
                FakeEngine::default().delay(Step::Navigate, Duration::from_secs(1))
            }
        }));
        let config = Config {
            max_concurrent_targets: Some(2),
            ..config_in(&dir)
        };

        orchestrator(&allocator, config)
            .scrape_all("https://bad.test,https://a.test,https://b.test,https://c.test,https://d.test")
            .await;

        assert!(allocator.max_in_flight() <= 2);
        assert_eq!(allocator.opened(), 5);
        assert_eq!(allocator.released(), 5);
        assert_eq!(count_files(&dir.path().join("html")), 4);
    }

    #[tokio::test]
    async fn test_shared_host_key_targets_all_run() {
        let dir = TempDir::new().unwrap();
        let allocator = Arc::new(FakeAllocator::new(|_| FakeEngine::default()));

        orchestrator(&allocator, config_in(&dir))
            .scrape_all("https://a.test/one,https://a.test/two")
            .await;

        assert_eq!(allocator.opened(), 2);
        assert_eq!(count_files(&dir.path().join("html")), 1);
        assert!(exists(&dir, "html/a.test_site_data.html"));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_open_sessions() {
        let dir = TempDir::new().unwrap();
        let allocator =
            Arc::new(FakeAllocator::new(|_| FakeEngine::default().stall_on(Step::Navigate)));
        let (trigger, signal) = shutdown_channel();
        let orchestrator = Orchestrator::new(allocator.clone(), config_in(&dir), signal);

        tokio::join!(orchestrator.scrape_all("https://a.test,https://b.test"), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.fire();
        });

        assert_eq!(allocator.opened(), 2);
        assert_eq!(allocator.released(), 2);
        assert_eq!(count_files(&dir.path().join("html")), 0);
    }

    #[tokio::test]
    async fn test_unavailable_browser_fails_each_target() {
        let dir = TempDir::new().unwrap();
        let allocator = Arc::new(FakeAllocator::failing());

        orchestrator(&allocator, config_in(&dir))
            .scrape_all("https://a.test,https://b.test")
            .await;

        assert_eq!(count_files(&dir.path().join("html")), 0);
        assert_eq!(count_files(&dir.path().join("url")), 0);
    }

    #[tokio::test]
    async fn test_single_target_writes_flat_layout() {
        let dir = TempDir::new().unwrap();
        let allocator = Arc::new(FakeAllocator::new(|_| {
            FakeEngine::default().with_links(&["https://a.test/x", ""])
        }));

        let report = orchestrator(&allocator, config_in(&dir))
            .scrape_single(" https://a.test ", ArtifactLayout::Flat(dir.path().to_path_buf()))
            .await;

        assert!(report.result.is_success());
        assert_eq!(report.result.links, vec!["https://a.test/x".to_string(), String::new()]);
        assert!(exists(&dir, "site_data.html"));
        assert!(exists(&dir, "screenshot.png"));
        assert!(!exists(&dir, "url"));
        assert_eq!(report.writes.written().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_target_deadline_is_thirty_seconds() {
        let dir = TempDir::new().unwrap();
        let allocator =
            Arc::new(FakeAllocator::new(|_| FakeEngine::default().stall_on(Step::Navigate)));

        let started = Instant::now();
        let report = orchestrator(&allocator, config_in(&dir))
            .scrape_single("https://a.test", ArtifactLayout::Flat(dir.path().to_path_buf()))
            .await;
        let elapsed = started.elapsed();

        assert!(matches!(
            report.result.failure,
            Some(ScrapeError::DeadlineExceeded(d)) if d == Duration::from_secs(30)
        ));
        assert!(elapsed >= Duration::from_secs(30));
        assert!(elapsed < Duration::from_secs(31));
        assert!(report.writes.written().is_empty());
        assert!(!exists(&dir, "site_data.html"));
    }

    #[tokio::test]
    async fn test_single_target_invalid_url() {
        let dir = TempDir::new().unwrap();
        let allocator = Arc::new(FakeAllocator::new(|_| FakeEngine::default()));

        let report = orchestrator(&allocator, config_in(&dir))
            .scrape_single("not a url", ArtifactLayout::Flat(dir.path().to_path_buf()))
            .await;

        assert!(matches!(report.result.failure, Some(ScrapeError::InvalidUrl(_))));
        assert_eq!(allocator.opened(), 0);
    }
}
