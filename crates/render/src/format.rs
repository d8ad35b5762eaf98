//! Record → chat text.
//!
//! Deterministic for identical inputs. A success block reads: title,
//! timestamp, up to `max_lines` content lines, optional tip, attribution.
//! A failure is a single block with the reason in place of content. Text
//! longer than one part splits at line boundaries into ordered parts; text
//! beyond the last allowed part is truncated with a notice. Budgets count
//! characters, not bytes.

use chrono_tz::Asia::Shanghai;

use quotebot_core::fmt::truncate_chars;
use quotebot_core::{ParsedRequest, RenderedMessage, ResultRecord};

use crate::profile::ChannelProfile;

const ATTRIBUTION: &str = "数据源: 东方财富 · 新浪财经";
const TRUNCATION_NOTICE: [&str; 2] = ["...", "(内容过长，已截断)"];
/// Chars held back on parts 2+ for the `(续 i/n)` opener.
const MARKER_RESERVE: usize = 12;

pub fn render(
    req: &ParsedRequest,
    record: &ResultRecord,
    profile: &ChannelProfile,
) -> RenderedMessage {
    let mut lines = vec![title_line(req, record, profile)];
    if record.ok {
        lines.push(timestamp_line(record));
        for content in record.lines.iter().take(profile.max_lines) {
            lines.push(truncate_chars(content, profile.max_chars));
        }
        if let Some(tip) = record.tip.as_deref() {
            lines.push(truncate_chars(&format!("提示: {}", tip), profile.max_chars));
        }
    } else {
        let reason = record.error.as_deref().unwrap_or("查询失败");
        lines.push(truncate_chars(
            &format!("⚠️ {}", reason),
            profile.max_chars,
        ));
        lines.push(timestamp_line(record));
    }
    lines.push(ATTRIBUTION.to_string());

    RenderedMessage {
        parts: split_parts(&lines, profile),
    }
}

fn title_line(req: &ParsedRequest, record: &ResultRecord, profile: &ChannelProfile) -> String {
    if profile.emoji {
        format!(
            "{} {}｜{}",
            req.intent.emoji(),
            req.intent.label(),
            record.title
        )
    } else {
        format!("{}｜{}", req.intent.label(), record.title)
    }
}

fn timestamp_line(record: &ResultRecord) -> String {
    let local = record.fetched_at.with_timezone(&Shanghai);
    let mut line = format!("更新时间: {}", local.format("%Y-%m-%d %H:%M:%S"));
    if record.stale {
        line.push_str(" [缓存]");
    }
    line
}

fn block_chars(block: &[String]) -> usize {
    let content: usize = block.iter().map(|l| l.chars().count()).sum();
    content + block.len().saturating_sub(1)
}

/// Greedy line-boundary packing into at most `max_parts` parts of at most
/// `max_chars` chars each. Part 1 keeps title and timestamp; later parts
/// open with a continuation marker.
fn split_parts(lines: &[String], profile: &ChannelProfile) -> Vec<String> {
    let budget = profile.max_chars;

    let mut chunks: Vec<Vec<String>> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_chars = 0usize;

    let mut i = 0;
    while i < lines.len() {
        let line = &lines[i];
        let cap = if chunks.is_empty() {
            budget
        } else {
            budget.saturating_sub(MARKER_RESERVE)
        };
        let line_chars = line.chars().count();
        let extra = if current.is_empty() {
            line_chars
        } else {
            line_chars + 1
        };
        if current_chars + extra <= cap {
            current.push(line.clone());
            current_chars += extra;
            i += 1;
        } else if current.is_empty() {
            // One line wider than a whole part: keep what fits.
            current.push(truncate_chars(line, cap));
            current_chars = cap;
            i += 1;
        } else {
            chunks.push(std::mem::take(&mut current));
            current_chars = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    if chunks.len() > profile.max_parts {
        chunks.truncate(profile.max_parts);
        if let Some(last) = chunks.last_mut() {
            let notice_chars: usize =
                TRUNCATION_NOTICE.iter().map(|l| l.chars().count() + 1).sum();
            let cap = budget.saturating_sub(MARKER_RESERVE);
            while last.len() > 1 && block_chars(last) + notice_chars > cap {
                last.pop();
            }
            for notice in TRUNCATION_NOTICE {
                last.push(notice.to_string());
            }
        }
    }

    let total = chunks.len();
    chunks
        .into_iter()
        .enumerate()
        .map(|(idx, block)| {
            if idx == 0 {
                block.join("\n")
            } else {
                format!("(续 {}/{})\n{}", idx + 1, total, block.join("\n"))
            }
        })
        .collect()
}
