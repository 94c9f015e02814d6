// src/collector.rs
//
// Scroll-until-stable collection of unique chat rows. The source is anything
// that can reveal more content on demand and report what is currently
// rendered; the live DOM panel in main.rs is one implementation, the
// scripted mocks in the tests are another.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use rustc_hash::FxHashSet;
use tokio::time::{Duration, sleep};

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub message: String,
}

/// A list-like source that renders content incrementally.
///
/// `advance` asks the source to reveal more rows (fire-and-forget, e.g. a
/// scroll-to-bottom); `visible_rows` reads whatever is rendered right now
/// and must not mutate the source.
pub trait ChatSource {
    async fn advance(&mut self) -> Result<()>;
    async fn visible_rows(&mut self) -> Result<Vec<ChatMessage>>;
}

#[derive(Clone, Debug)]
pub struct CollectorOptions {
    /// Wait after each advance so the panel can render newly revealed rows.
    pub settle_delay: Duration,
    pub max_rounds: usize,
    /// Consecutive rounds with no row-count or unique-count change before
    /// the chat is considered fully revealed.
    pub stability_threshold: usize,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(500),
            max_rounds: 600,
            stability_threshold: 8,
        }
    }
}

#[derive(Debug)]
pub struct CollectReport {
    /// Unique messages in first-discovery order.
    pub messages: Vec<ChatMessage>,
    /// Advance/extract rounds executed, not counting the initial extraction.
    pub rounds: usize,
    pub converged: bool,
}

pub struct Collector {
    opts: CollectorOptions,
}

impl Collector {
    pub fn new(opts: CollectorOptions) -> Self {
        Self { opts }
    }

    /// Drives `source` until the rendered rows stop changing, the round
    /// budget runs out, or `is_running` is cleared. Per-round failures are
    /// logged and never discard rows collected so far.
    pub async fn collect<S: ChatSource>(
        &self,
        source: &mut S,
        is_running: &AtomicBool,
    ) -> CollectReport {
        let mut seen: FxHashSet<String> = FxHashSet::default();
        let mut messages: Vec<ChatMessage> = Vec::new();

        // Rows rendered before the first advance are part of the chat too.
        match source.visible_rows().await {
            Ok(rows) => merge_rows(&mut seen, &mut messages, rows),
            Err(err) => println!("⚠️ Initial extraction failed: {err:#}"),
        }

        let mut stable_rounds = 0usize;
        let mut last_row_count = 0usize;
        let mut last_unique_count = 0usize;
        let mut rounds = 0usize;
        let mut converged = false;

        for _ in 0..self.opts.max_rounds {
            if !is_running.load(Ordering::SeqCst) {
                println!("🛑 Collection interrupted, keeping {} messages", messages.len());
                break;
            }
            rounds += 1;

            if let Err(err) = source.advance().await {
                // Rows already rendered may still be extractable.
                println!("⚠️ Advance failed on round {rounds}: {err:#}");
            }

            sleep(self.opts.settle_delay).await;

            let row_count = match source.visible_rows().await {
                Ok(rows) => {
                    let count = rows.len();
                    merge_rows(&mut seen, &mut messages, rows);
                    count
                }
                Err(err) => {
                    // Treat the round as "no new data" rather than aborting.
                    println!("⚠️ Extraction failed on round {rounds}: {err:#}");
                    last_row_count
                }
            };
            let unique_count = messages.len();

            // Stable means: row count unchanged AND no new unique messages.
            if row_count == last_row_count && unique_count == last_unique_count {
                stable_rounds += 1;
            } else {
                stable_rounds = 0;
                println!("📥 Round {rounds}: {row_count} rows rendered, {unique_count} unique");
            }

            last_row_count = row_count;
            last_unique_count = unique_count;

            if stable_rounds >= self.opts.stability_threshold {
                converged = true;
                println!("✅ Chat stable after {rounds} rounds, {unique_count} unique messages");
                break;
            }
        }

        CollectReport {
            messages,
            rounds,
            converged,
        }
    }
}

fn merge_rows(
    seen: &mut FxHashSet<String>,
    messages: &mut Vec<ChatMessage>,
    rows: Vec<ChatMessage>,
) {
    for row in rows {
        let name = row.name.trim();
        let message = row.message.trim();
        // A fully empty row is a malformed or not-yet-rendered item.
        if name.is_empty() && message.is_empty() {
            continue;
        }
        // '\0' never appears in rendered text, so the key is unambiguous.
        let key = format!("{name}\0{message}");
        if seen.insert(key) {
            messages.push(ChatMessage {
                name: name.to_string(),
                message: message.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    fn msg(name: &str, message: &str) -> ChatMessage {
        ChatMessage {
            name: name.to_string(),
            message: message.to_string(),
        }
    }

    fn test_opts() -> CollectorOptions {
        CollectorOptions {
            settle_delay: Duration::ZERO,
            ..CollectorOptions::default()
        }
    }

    /// Replays a fixed script of extraction results; the last entry repeats
    /// once the script is exhausted, like a chat that stopped growing.
    struct ScriptedSource {
        script: Vec<Vec<ChatMessage>>,
        extracts: usize,
    }

    impl ScriptedSource {
        fn new(script: Vec<Vec<ChatMessage>>) -> Self {
            Self {
                script,
                extracts: 0,
            }
        }
    }

    impl ChatSource for ScriptedSource {
        async fn advance(&mut self) -> Result<()> {
            Ok(())
        }

        async fn visible_rows(&mut self) -> Result<Vec<ChatMessage>> {
            let idx = self.extracts.min(self.script.len() - 1);
            self.extracts += 1;
            Ok(self.script[idx].clone())
        }
    }

    /// Never stabilizes: every extraction renders one more unique row.
    struct EndlessSource {
        rows: Vec<ChatMessage>,
    }

    impl ChatSource for EndlessSource {
        async fn advance(&mut self) -> Result<()> {
            Ok(())
        }

        async fn visible_rows(&mut self) -> Result<Vec<ChatMessage>> {
            let n = self.rows.len();
            self.rows.push(msg(&format!("user{n}"), &format!("line {n}")));
            Ok(self.rows.clone())
        }
    }

    fn running() -> AtomicBool {
        AtomicBool::new(true)
    }

    #[tokio::test]
    async fn merge_is_idempotent() {
        let mut source = ScriptedSource::new(vec![vec![
            msg("A", "hi"),
            msg("A", "hi"),
        ]]);
        let report = Collector::new(test_opts())
            .collect(&mut source, &running())
            .await;
        assert_eq!(report.messages, vec![msg("A", "hi")]);
    }

    #[tokio::test]
    async fn whitespace_variants_collapse() {
        let mut source = ScriptedSource::new(vec![vec![
            msg(" A ", "hi"),
            msg("A", "hi"),
            msg("A", " hi\n"),
        ]]);
        let report = Collector::new(test_opts())
            .collect(&mut source, &running())
            .await;
        assert_eq!(report.messages, vec![msg("A", "hi")]);
    }

    #[tokio::test]
    async fn fully_empty_rows_are_dropped() {
        let mut source = ScriptedSource::new(vec![vec![
            msg("", ""),
            msg("  ", "\t"),
            msg("", "orphan text"),
        ]]);
        let report = Collector::new(test_opts())
            .collect(&mut source, &running())
            .await;
        // A row with only one empty field still carries information.
        assert_eq!(report.messages, vec![msg("", "orphan text")]);
    }

    #[tokio::test]
    async fn converges_at_k_plus_threshold_rounds() {
        // New content through loop round k = 3, identical afterwards.
        let a = msg("A", "hi");
        let b = msg("B", "yo");
        let c = msg("C", "hey");
        let d = msg("D", "sup");
        let mut source = ScriptedSource::new(vec![
            vec![a.clone()],                                 // initial extraction
            vec![a.clone(), b.clone()],                      // round 1
            vec![a.clone(), b.clone(), c.clone()],           // round 2
            vec![a.clone(), b.clone(), c.clone(), d.clone()], // round 3, last change
        ]);
        let report = Collector::new(test_opts())
            .collect(&mut source, &running())
            .await;
        assert!(report.converged);
        assert_eq!(report.rounds, 3 + 8);
        assert_eq!(report.messages, vec![a, b, c, d]);
    }

    #[tokio::test]
    async fn round_budget_bounds_an_unstable_source() {
        let opts = CollectorOptions {
            settle_delay: Duration::ZERO,
            max_rounds: 25,
            stability_threshold: 8,
        };
        let mut source = EndlessSource { rows: Vec::new() };
        let report = Collector::new(opts).collect(&mut source, &running()).await;
        assert!(!report.converged);
        assert_eq!(report.rounds, 25);
        // Initial extraction plus one per round.
        assert_eq!(report.messages.len(), 26);
    }

    #[tokio::test]
    async fn end_to_end_two_unique_messages() {
        let a = msg("A", "hi");
        let b = msg("B", "yo");
        let mut script = vec![vec![a.clone()], vec![a.clone(), b.clone()]];
        script.extend(std::iter::repeat_n(vec![a.clone(), b.clone()], 8));
        let mut source = ScriptedSource::new(script);
        let report = Collector::new(test_opts())
            .collect(&mut source, &running())
            .await;
        assert!(report.converged);
        assert_eq!(report.messages, vec![a, b]);
    }

    /// Extraction blowing up mid-run must not lose earlier rows.
    struct FlakySource {
        inner: ScriptedSource,
        fail_on: usize,
    }

    impl ChatSource for FlakySource {
        async fn advance(&mut self) -> Result<()> {
            self.inner.advance().await
        }

        async fn visible_rows(&mut self) -> Result<Vec<ChatMessage>> {
            if self.inner.extracts == self.fail_on {
                self.inner.extracts += 1;
                bail!("chat panel detached");
            }
            self.inner.visible_rows().await
        }
    }

    #[tokio::test]
    async fn extraction_failure_keeps_collected_rows() {
        let a = msg("A", "hi");
        let b = msg("B", "yo");
        let mut source = FlakySource {
            inner: ScriptedSource::new(vec![
                vec![a.clone()],
                vec![a.clone(), b.clone()],
            ]),
            fail_on: 2, // first extraction of the stable tail
        };
        let report = Collector::new(test_opts())
            .collect(&mut source, &running())
            .await;
        assert!(report.converged);
        assert_eq!(report.messages, vec![a, b]);
    }

    /// Advance failures still extract whatever is already rendered.
    struct StuckSource {
        rows: Vec<ChatMessage>,
    }

    impl ChatSource for StuckSource {
        async fn advance(&mut self) -> Result<()> {
            bail!("scroll container missing")
        }

        async fn visible_rows(&mut self) -> Result<Vec<ChatMessage>> {
            Ok(self.rows.clone())
        }
    }

    #[tokio::test]
    async fn advance_failure_still_extracts() {
        let a = msg("A", "hi");
        let mut source = StuckSource {
            rows: vec![a.clone()],
        };
        let report = Collector::new(test_opts())
            .collect(&mut source, &running())
            .await;
        assert!(report.converged);
        assert_eq!(report.messages, vec![a]);
    }

    #[tokio::test]
    async fn cleared_flag_stops_before_first_round() {
        let a = msg("A", "hi");
        let mut source = ScriptedSource::new(vec![vec![a.clone()]]);
        let stopped = AtomicBool::new(false);
        let report = Collector::new(test_opts())
            .collect(&mut source, &stopped)
            .await;
        assert_eq!(report.rounds, 0);
        assert!(!report.converged);
        // The initial extraction already ran.
        assert_eq!(report.messages, vec![a]);
    }
}
