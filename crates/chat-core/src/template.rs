//! Prompt templates, stop sequences and output cleanup rules.

/// Marker replaced by the user's message.
pub const PLACEHOLDER: &str = "{{prompt}}";

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// A single-turn conversational template.
///
/// Rendered as `system_preamble + user_prefix + placeholder + user_suffix +
/// assistant_prefix`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptTemplate {
    pub system_preamble: &'static str,
    pub user_prefix: &'static str,
    pub user_suffix: &'static str,
    pub assistant_prefix: &'static str,
    /// `None` marks a pass-through template: the raw prompt is used verbatim.
    pub placeholder: Option<&'static str>,
}

impl PromptTemplate {
    /// The full template text, placeholder included.
    pub fn render(&self) -> String {
        [
            self.system_preamble,
            self.user_prefix,
            self.placeholder.unwrap_or(""),
            self.user_suffix,
            self.assistant_prefix,
        ]
        .concat()
    }

    /// Substitute `message` for the first placeholder occurrence.
    ///
    /// The message is spliced in, never re-scanned, so a message that itself
    /// contains the placeholder text is inserted literally.
    pub fn apply(&self, message: &str) -> String {
        let Some(placeholder) = self.placeholder.filter(|p| !p.is_empty()) else {
            return message.to_owned();
        };
        let rendered = self.render();
        match rendered.find(placeholder) {
            Some(pos) => {
                let mut out = String::with_capacity(rendered.len() + message.len());
                out.push_str(&rendered[..pos]);
                out.push_str(message);
                out.push_str(&rendered[pos + placeholder.len()..]);
                out
            }
            None => message.to_owned(),
        }
    }
}

/// Ordered, de-duplicated set of literal stop strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopSet {
    sequences: Vec<String>,
}

impl StopSet {
    pub fn new<I, S>(sequences: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::default();
        set.extend(sequences);
        set
    }

    /// Append sequences, skipping empty strings and duplicates.
    pub fn extend<I, S>(&mut self, sequences: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for s in sequences {
            let s = s.into();
            if !s.is_empty() && !self.sequences.contains(&s) {
                self.sequences.push(s);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.sequences.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn contains(&self, s: &str) -> bool {
        self.sequences.iter().any(|x| x == s)
    }

    /// Earliest occurrence of any member in `text`, as `(byte offset, sequence)`.
    ///
    /// On a tie the member listed first is reported.
    pub fn find_earliest(&self, text: &str) -> Option<(usize, &str)> {
        self.sequences
            .iter()
            .filter_map(|s| text.find(s.as_str()).map(|pos| (pos, s.as_str())))
            .min_by_key(|&(pos, _)| pos)
    }

    /// Like [`find_earliest`](Self::find_earliest), scanning `text` only from
    /// byte `from` on. Offsets in the result are into the whole `text`.
    ///
    /// `from` must lie on a char boundary.
    pub fn find_earliest_from(&self, text: &str, from: usize) -> Option<(usize, &str)> {
        let from = from.min(text.len());
        self.find_earliest(&text[from..])
            .map(|(pos, stop)| (from + pos, stop))
    }

    /// Length of the longest suffix of `text` that could still grow into a
    /// stop sequence. That many trailing bytes must not be released yet.
    pub fn holdback(&self, text: &str) -> usize {
        self.sequences
            .iter()
            .filter_map(|s| {
                (1..s.len())
                    .rev()
                    .filter(|&k| s.is_char_boundary(k))
                    .find(|&k| text.ends_with(&s[..k]))
            })
            .max()
            .unwrap_or(0)
    }
}

/// How residual markup is removed from finished output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResidualRule {
    /// Remove each listed literal wherever it appears.
    Tags(&'static [&'static str]),
    /// Remove `<think>` reasoning blocks, then the listed literals.
    ThinkBlocks(&'static [&'static str]),
}

impl ResidualRule {
    pub fn strip(&self, text: &str) -> String {
        let (think, tags) = match *self {
            Self::Tags(tags) => (false, tags),
            Self::ThinkBlocks(tags) => (true, tags),
        };
        let mut out = if think {
            strip_think_blocks(text)
        } else {
            text.to_owned()
        };
        for tag in tags.iter().filter(|t| !t.is_empty()) {
            out = out.replace(tag, "");
        }
        out
    }
}

fn strip_think_blocks(text: &str) -> String {
    let mut out = text.to_owned();
    while let Some(start) = out.find(THINK_OPEN) {
        match out[start..].find(THINK_CLOSE) {
            Some(rel) => out.replace_range(start..start + rel + THINK_CLOSE.len(), ""),
            // Still open when generation stopped.
            None => out.truncate(start),
        }
    }
    // Reasoning emitted without its opening tag.
    if let Some(pos) = out.find(THINK_CLOSE) {
        out.replace_range(..pos + THINK_CLOSE.len(), "");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHATML: PromptTemplate = PromptTemplate {
        system_preamble: "<|im_start|>system\nBe brief.<|im_end|>\n",
        user_prefix: "<|im_start|>user\n",
        user_suffix: "<|im_end|>\n",
        assistant_prefix: "<|im_start|>assistant\n",
        placeholder: Some(PLACEHOLDER),
    };

    #[test]
    fn apply_replaces_placeholder_once() {
        let out = CHATML.apply("hi");
        assert_eq!(
            out,
            "<|im_start|>system\nBe brief.<|im_end|>\n<|im_start|>user\nhi<|im_end|>\n<|im_start|>assistant\n"
        );
        assert!(!out.contains(PLACEHOLDER));
    }

    #[test]
    fn placeholder_text_in_message_is_literal() {
        let out = CHATML.apply("say {{prompt}} twice");
        assert_eq!(out.matches(PLACEHOLDER).count(), 1);
        assert!(out.contains("user\nsay {{prompt}} twice<|im_end|>"));
    }

    #[test]
    fn pass_through_template_returns_message() {
        let raw = PromptTemplate {
            placeholder: None,
            ..CHATML
        };
        assert_eq!(raw.apply("verbatim"), "verbatim");
    }

    #[test]
    fn earliest_stop_wins() {
        let stops = StopSet::new(["<|im_end|>", "world"]);
        assert_eq!(
            stops.find_earliest("hello world<|im_end|>"),
            Some((6, "world"))
        );
        assert_eq!(
            stops.find_earliest("hello<|im_end|>world"),
            Some((5, "<|im_end|>"))
        );
        assert_eq!(stops.find_earliest("nothing here"), None);
    }

    #[test]
    fn scan_from_offset_reports_absolute_position() {
        let stops = StopSet::new(["<|end|>"]);
        let text = "<|end|> then more<|end|>";
        assert_eq!(stops.find_earliest_from(text, 0), Some((0, "<|end|>")));
        assert_eq!(stops.find_earliest_from(text, 1), Some((17, "<|end|>")));
        assert_eq!(stops.find_earliest_from(text, 18), None);
        assert_eq!(stops.find_earliest_from(text, 999), None);
    }

    #[test]
    fn tie_reports_first_listed() {
        let stops = StopSet::new(["<|end|>", "<|end"]);
        assert_eq!(stops.find_earliest("a<|end|>"), Some((1, "<|end|>")));
    }

    #[test]
    fn stop_set_dedups_and_skips_empty() {
        let stops = StopSet::new(["a", "", "b", "a"]);
        assert_eq!(stops.iter().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn holdback_covers_partial_stop() {
        let stops = StopSet::new(["<|im_end|>"]);
        assert_eq!(stops.holdback("hello<|im_"), 5);
        assert_eq!(stops.holdback("hello<"), 1);
        assert_eq!(stops.holdback("hello"), 0);
        // A complete match is found by `find_earliest`, not held back.
        assert_eq!(stops.holdback("x<|im_end|>"), 0);
    }

    #[test]
    fn holdback_respects_char_boundaries() {
        let stops = StopSet::new(["<｜User｜>"]);
        assert_eq!(stops.holdback("ok<｜"), "<｜".len());
    }

    #[test]
    fn think_blocks_are_removed() {
        let rule = ResidualRule::ThinkBlocks(&[]);
        assert_eq!(rule.strip("<think>\nhmm\n</think>\n\nAnswer"), "\n\nAnswer");
        assert_eq!(rule.strip("Answer<think>still going"), "Answer");
        assert_eq!(rule.strip("reasoning</think>Answer"), "Answer");
        assert_eq!(rule.strip("plain"), "plain");
    }

    #[test]
    fn tags_are_removed_everywhere() {
        let rule = ResidualRule::Tags(&["<|assistant|>"]);
        assert_eq!(rule.strip("<|assistant|>Hi<|assistant|>"), "Hi");
    }
}
