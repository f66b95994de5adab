//! Script markers: scene delimiters and `NAME: line` dialogue.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// What the classifier found in a script-shaped payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutline {
    pub scene_count: usize,
    pub dialogue_lines: usize,
    pub characters: Vec<String>,
}

fn scene_heading() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:#+\s*)?(?:scene|escena)\s+\d+\b|^\s*(?:INT|EXT)\.\s")
            .expect("static regex")
    })
}

fn transition() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\s*(?:FADE (?:IN|OUT)|CUT TO)\b").expect("static regex"))
}

fn dialogue() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*(?:\[[^\]]*\]\s*)?([A-ZÁÉÍÓÚÑ][A-ZÁÉÍÓÚÑ0-9 ._'-]{0,39})\s*(?:\([^)]*\))?\s*:\s*\S")
            .expect("static regex")
    })
}

/// Scan `text` for script markers. Returns an outline only when the text is a script:
/// at least one dialogue line, plus a scene delimiter or a second dialogue line.
pub fn outline(text: &str) -> Option<ScriptOutline> {
    let mut headings = 0usize;
    let mut delimiters = 0usize;
    let mut dialogue_lines = 0usize;
    let mut characters = BTreeSet::new();

    for line in text.lines() {
        if scene_heading().is_match(line) {
            headings += 1;
            delimiters += 1;
            continue;
        }
        if transition().is_match(line) {
            delimiters += 1;
            continue;
        }
        if let Some(captures) = dialogue().captures(line) {
            dialogue_lines += 1;
            characters.insert(captures[1].trim().to_string());
        }
    }

    let is_script = dialogue_lines >= 1 && (delimiters >= 1 || dialogue_lines >= 2);
    is_script.then(|| ScriptOutline {
        scene_count: headings.max(1),
        dialogue_lines,
        characters: characters.into_iter().collect(),
    })
}
