//! Turns chat messages into speakable text.

use crate::event::{Mention, TextMessage};
use regex::Regex;
use std::sync::LazyLock;

pub const DEFAULT_MAX_MESSAGE_CHARS: usize = 200;
pub const DEFAULT_URL_PLACEHOLDER: &str = "URL";

/// Spoken templates. `{name}` and `{count}` are substituted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcements {
    pub launch: String,
    pub user_join: String,
    pub user_leave: String,
    pub attachments: String,
}

impl Default for Announcements {
    fn default() -> Self {
        Self {
            launch: "Text to speech is now active.".to_string(),
            user_join: "{name} joined the voice channel.".to_string(),
            user_leave: "{name} left the voice channel.".to_string(),
            attachments: "{count} attachments".to_string(),
        }
    }
}

impl Announcements {
    pub fn user_join(&self, name: &str) -> String {
        self.user_join.replace("{name}", name)
    }

    pub fn user_leave(&self, name: &str) -> String {
        self.user_leave.replace("{name}", name)
    }

    pub fn attachments(&self, count: usize) -> String {
        self.attachments.replace("{count}", &count.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRules {
    /// Limit in characters, not bytes.
    pub max_chars: usize,
    pub url_placeholder: String,
}

impl Default for MessageRules {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_MESSAGE_CHARS,
            url_placeholder: DEFAULT_URL_PLACEHOLDER.to_string(),
        }
    }
}

static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s]+").expect("valid url pattern"));
static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ *#{1,3}").expect("valid heading pattern"));
static CUSTOM_EMOJI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<a?:(\w+):\d+>").expect("valid emoji pattern"));

/// Builds the segments spoken for `message`: the cleaned content, then an
/// attachment notice when files are attached. Blank results are omitted.
pub fn prepare_segments(
    message: &TextMessage,
    rules: &MessageRules,
    announcements: &Announcements,
) -> Vec<String> {
    let mut segments = Vec::with_capacity(2);

    let content = replace_user_mentions(&message.content, &message.mentions);
    let content = replace_emojis(&content);
    let content = markdown_to_plain_text(&content);
    let content = URL.replace_all(&content, rules.url_placeholder.as_str());
    let content = limit_chars(&content, rules.max_chars);
    if !content.trim().is_empty() {
        segments.push(content.to_string());
    }

    if !message.attachments.is_empty() {
        segments.push(announcements.attachments(message.attachments.len()));
    }
    segments
}

pub fn replace_user_mentions(content: &str, mentions: &[Mention]) -> String {
    let mut out = content.to_string();
    for mention in mentions {
        let spoken = format!("@{}", mention.name);
        out = out
            .replace(&format!("<@{}>", mention.id), &spoken)
            .replace(&format!("<@!{}>", mention.id), &spoken);
    }
    out
}

/// `<:name:id>` and `<a:name:id>` become `name`.
pub fn replace_emojis(content: &str) -> String {
    CUSTOM_EMOJI.replace_all(content, "$1").into_owned()
}

pub fn markdown_to_plain_text(content: &str) -> String {
    strip_code_blocks(content)
        .into_iter()
        .map(|line| {
            let line = HEADING.replace(&line, "");
            let line = replace_outside_inline_code(&line, "**", "");
            let line = replace_outside_inline_code(&line, "__", "");
            let line = replace_outside_inline_code(&line, "*", "");
            let line = replace_outside_inline_code(&line, "_", " ");
            let line = replace_outside_inline_code(&line, "~~", "");
            line.replace('`', "")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// A fenced block collapses to "code block: <lang>"; its body is not read.
fn strip_code_blocks(content: &str) -> Vec<std::borrow::Cow<'_, str>> {
    let mut lines = Vec::new();
    let mut in_block = false;
    for line in content.split('\n') {
        if let Some(kind) = line.strip_prefix("```") {
            in_block = !in_block;
            if in_block {
                lines.push(format!("code block: {kind}").into());
            }
            continue;
        }
        if !in_block {
            lines.push(line.into());
        }
    }
    lines
}

fn replace_outside_inline_code(line: &str, from: &str, to: &str) -> String {
    line.split('`')
        .enumerate()
        .map(|(i, part)| {
            if i % 2 == 0 {
                part.replace(from, to)
            } else {
                part.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("`")
}

fn limit_chars(content: &str, max: usize) -> &str {
    match content.char_indices().nth(max) {
        Some((idx, _)) => &content[..idx],
        None => content,
    }
}
