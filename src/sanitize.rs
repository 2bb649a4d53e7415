//! Reply sanitization for spoken delivery
//!
//! Generated text is written for screens: markdown markers, emoji, stage
//! directions, and chat laughter all produce audible artifacts when fed to a
//! synthesizer, so they are stripped before synthesis.

use std::sync::LazyLock;

use regex::Regex;

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[\s\S]*?```").unwrap());
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`]*)`").unwrap());
static HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s*").unwrap());
static LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").unwrap());
static BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*([^*]*)\*\*").unwrap());
static UNDERSCORE_EMPHASIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__([^_]*)__|_([^_]+)_").unwrap());
// Single-asterisk and parenthesized spans are stage directions, removed whole
static STAGE_DIRECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*[^*]+\*|\([^)]*\)").unwrap());
static LAUGHTER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ㅋㅎ]{2,}").unwrap());
static EMOJI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        "[",
        "\u{1F300}-\u{1F5FF}",
        "\u{1F600}-\u{1F64F}",
        "\u{1F680}-\u{1F6FF}",
        "\u{1F900}-\u{1F9FF}",
        "\u{1FA70}-\u{1FAFF}",
        "\u{2600}-\u{26FF}",
        "\u{2700}-\u{27BF}",
        "\u{FE0F}",
        "\u{200D}",
        "]+",
    ))
    .unwrap()
});
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Strip everything a synthesizer would read out loud by accident
#[must_use]
pub fn for_speech(text: &str) -> String {
    let text = CODE_FENCE.replace_all(text, " ");
    let text = BOLD.replace_all(&text, "$1");
    let text = STAGE_DIRECTION.replace_all(&text, " ");
    let text = UNDERSCORE_EMPHASIS.replace_all(&text, "$1$2");
    let text = INLINE_CODE.replace_all(&text, "$1");
    let text = HEADING.replace_all(&text, "");
    let text = LINK.replace_all(&text, "$1");
    let text = LAUGHTER.replace_all(&text, " ");
    let text = EMOJI.replace_all(&text, " ");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}
