//! Web-page scraping for the `url` ingestion kind.
//!
//! Fetches a page and heuristically selects block elements (`div`, `li`,
//! `tr`) whose `class` attribute contains an incident-like keyword in any of
//! its language variants. Each matched element's visible text becomes one
//! incident description when it is long enough to carry signal; short noise
//! blocks are discarded.

use anyhow::Context;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use crate::error::EngineError;
use crate::models::{truncate_chars, Incident};

/// Class-attribute keywords that mark an element as an incident block.
const CLASS_KEYWORDS: &[&str] = &["incident", "incidencia", "issue", "ticket"];

/// Blocks shorter than this are discarded as navigation/label noise.
const MIN_BLOCK_CHARS: usize = 20;

const BLOCK_ELEMENTS: &[&[u8]] = &[b"div", b"li", b"tr"];

const SCRAPED_TITLE_CAP: usize = 100;

/// Fetch `url` and extract incident records from its markup.
pub async fn scrape_incidents(url: &str, timeout_secs: u64) -> Result<Vec<Incident>, EngineError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("Failed to build HTTP client")?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| EngineError::SourceNotFound(format!("{}: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(EngineError::SourceNotFound(format!(
            "{}: HTTP {}",
            url,
            response.status()
        )));
    }

    let html = response
        .text()
        .await
        .map_err(|e| EngineError::SourceNotFound(format!("{}: {}", url, e)))?;

    let blocks = extract_incident_blocks(&html);
    debug!(url, blocks = blocks.len(), "scraped incident blocks");

    Ok(blocks
        .into_iter()
        .enumerate()
        .map(|(i, text)| Incident {
            id: format!("web_{}", i),
            title: truncate_chars(&text, SCRAPED_TITLE_CAP),
            description: text,
            project: "Web Scraping".to_string(),
            source: url.to_string(),
            extra: BTreeMap::new(),
        })
        .collect())
}

/// Scan markup for incident-like block elements and return their visible
/// text. Lenient: mismatched end tags are tolerated and a hard parse error
/// stops the scan rather than failing it, keeping whatever was already
/// collected.
pub fn extract_incident_blocks(html: &str) -> Vec<String> {
    let mut reader = Reader::from_str(html);
    reader.config_mut().trim_text(true);
    reader.config_mut().check_end_names = false;
    reader.config_mut().allow_unmatched_ends = true;

    let mut blocks = Vec::new();
    // Stack of open captures: (depth at which the capture started, text).
    let mut captures: Vec<(usize, String)> = Vec::new();
    let mut depth = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                depth += 1;
                let name = e.name().as_ref().to_ascii_lowercase();
                if BLOCK_ELEMENTS.contains(&name.as_slice()) && class_matches(&e) {
                    captures.push((depth, String::new()));
                }
            }
            Ok(Event::Text(t)) => {
                if !captures.is_empty() {
                    let text = t
                        .unescape()
                        .map(|cow| cow.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(t.as_ref()).into_owned());
                    let text = text.trim();
                    if !text.is_empty() {
                        for (_, buf) in captures.iter_mut() {
                            if !buf.is_empty() {
                                buf.push(' ');
                            }
                            buf.push_str(text);
                        }
                    }
                }
            }
            Ok(Event::End(_)) => {
                if let Some((start_depth, _)) = captures.last() {
                    if *start_depth == depth {
                        let (_, text) = captures.pop().unwrap_or_default();
                        push_block(&mut blocks, text);
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            // Real-world pages are rarely well-formed; keep what we have.
            Err(e) => {
                debug!(error = %e, "markup parse error, stopping scan");
                break;
            }
        }
    }

    // Unclosed elements at EOF still count.
    for (_, text) in captures {
        push_block(&mut blocks, text);
    }

    blocks
}

fn push_block(blocks: &mut Vec<String>, text: String) {
    if text.chars().count() > MIN_BLOCK_CHARS {
        blocks.push(text);
    }
}

fn class_matches(e: &quick_xml::events::BytesStart<'_>) -> bool {
    let Ok(Some(attr)) = e.try_get_attribute("class") else {
        return false;
    };
    let class = String::from_utf8_lossy(&attr.value).to_lowercase();
    CLASS_KEYWORDS.iter().any(|kw| class.contains(kw))
}
