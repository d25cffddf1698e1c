use crate::types::{ContentBlock, OutboundMessage};

/// Tuning knobs for [`split`].
#[derive(Debug, Clone, Copy)]
pub struct ChunkOptions {
    /// `0` disables chunking entirely (pass-through).
    pub max_bytes: usize,
    /// Keep fenced code blocks intact across a chunk boundary.
    pub preserve_blocks: bool,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self { max_bytes: 4090, preserve_blocks: true }
    }
}

/// Splits an outbound message into platform-sized pieces.
///
/// Text-type blocks are concatenated (newline-joined) and chunked; non-text
/// blocks ride along on the first emitted message only. All emissions
/// preserve channel, chat, thread-id, reply-to-id, and hints.
pub fn split(msg: &OutboundMessage, opts: &ChunkOptions) -> Vec<OutboundMessage> {
    if opts.max_bytes == 0 {
        return vec![msg.clone()];
    }

    let mut attached = Vec::new();
    let mut text_parts = Vec::new();
    for block in &msg.blocks {
        match block {
            ContentBlock::Text { text } => text_parts.push(text.clone()),
            other => attached.push(other.clone()),
        }
    }
    let full = text_parts.join("\n");

    if full.len() <= opts.max_bytes {
        return vec![msg.clone()];
    }

    split_text(&full, opts.max_bytes, opts.preserve_blocks)
        .into_iter()
        .enumerate()
        .map(|(i, piece)| {
            let mut blocks = vec![ContentBlock::text(piece)];
            if i == 0 {
                blocks.extend(attached.iter().cloned());
            }
            OutboundMessage {
                channel: msg.channel.clone(),
                chat: msg.chat.clone(),
                thread_id: msg.thread_id.clone(),
                reply_to_id: msg.reply_to_id.clone(),
                blocks,
                hints: msg.hints.clone(),
            }
        })
        .collect()
}

fn split_text(full: &str, max_bytes: usize, preserve_blocks: bool) -> Vec<String> {
    if full.len() <= max_bytes {
        return vec![full.to_string()];
    }

    let lines: Vec<&str> = full.split('\n').collect();
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut fence_lang: Option<String> = None;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim_start();

        // A line opening a fence: if the whole block through its closing
        // fence fits in one chunk, emit it atomically rather than letting
        // the per-line loop split it mid-block.
        if preserve_blocks && fence_lang.is_none() && trimmed.starts_with("```") {
            if let Some(close_idx) = find_fence_close(&lines, i) {
                let block = lines[i..=close_idx].join("\n");
                if block.len() <= max_bytes {
                    if !current.is_empty() {
                        chunks.push(std::mem::take(&mut current));
                    }
                    chunks.push(block);
                    i = close_idx + 1;
                    continue;
                }
            }
        }

        let cost = if current.is_empty() { line.len() } else { 1 + line.len() };

        if !current.is_empty() && current.len() + cost > max_bytes {
            if preserve_blocks && fence_lang.is_some() {
                current.push_str("\n```");
            }
            chunks.push(std::mem::take(&mut current));
            if preserve_blocks {
                if let Some(lang) = &fence_lang {
                    current.push_str("```");
                    current.push_str(lang);
                    current.push('\n');
                }
            }
        }

        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);

        if preserve_blocks {
            if let Some(after_fence) = trimmed.strip_prefix("```") {
                fence_lang = if fence_lang.is_some() { None } else { Some(after_fence.trim().to_string()) };
            }
        }
        i += 1;
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    // Force-split safety net for any chunk still over budget (e.g. one
    // overlong line), truncating at UTF-8 char boundaries.
    let mut result = Vec::new();
    for chunk in chunks {
        if chunk.len() <= max_bytes {
            result.push(chunk);
            continue;
        }
        let mut remaining = chunk.as_str();
        while remaining.len() > max_bytes {
            let split_at = floor_char_boundary(remaining, max_bytes).max(1);
            result.push(remaining[..split_at].to_string());
            remaining = &remaining[split_at..];
        }
        if !remaining.is_empty() {
            result.push(remaining.to_string());
        }
    }
    result
}

/// Finds the line closing the fence opened at `lines[open_idx]`.
fn find_fence_close(lines: &[&str], open_idx: usize) -> Option<usize> {
    (open_idx + 1..lines.len()).find(|&j| lines[j].trim_start().starts_with("```"))
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}
