//! ResponseParser - best-effort structure from a model's free-text reply
//!
//! The reply is scanned once, line by line. Each line is either a section
//! header, which switches the active section, or content, which becomes an
//! item of the active section. Text before the first header is description
//! and only survives in the verbatim response.

use tracing::debug;

use crate::domain::DiagnosisContext;

/// Longest first line still treated as a bare disease label
const MAX_LABEL_LEN: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    DiseaseName,
    Causes,
    Symptoms,
    Solutions,
    Prevention,
}

/// Header aliases per section; within a section longer aliases come first
const SECTION_HEADERS: [(Section, &[&str]); 5] = [
    (Section::DiseaseName, &["disease name", "disease", "diagnosis"]),
    (Section::Causes, &["causes", "cause"]),
    (Section::Symptoms, &["symptoms", "symptom"]),
    (
        Section::Solutions,
        &["solutions", "solution", "treatment", "recommendations", "what to do"],
    ),
    (Section::Prevention, &["prevention", "how to prevent"]),
];

/// Parsed fields plus the reply exactly as received
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReply {
    /// Extracted fields; `confidence` is never set by parsing
    pub fields: DiagnosisContext,
    /// True when `disease_name` came from an explicit `Disease Name:` header
    pub named_by_header: bool,
    pub response: String,
}

/// Extracts diagnosis fields from model output; never fails
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseParser;

impl ResponseParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, text: &str) -> ParsedReply {
        debug!(len = text.len(), "ResponseParser::parse: called");
        let mut fields = DiagnosisContext::default();
        let mut named: Vec<String> = Vec::new();
        let mut active: Option<Section> = None;

        for line in text.lines() {
            if let Some((section, inline)) = classify_header(line) {
                active = Some(section);
                if let Some(item) = inline.and_then(item_text) {
                    push_item(&mut fields, &mut named, section, item);
                }
                continue;
            }
            if let (Some(section), Some(item)) = (active, item_text(line)) {
                push_item(&mut fields, &mut named, section, item);
            }
        }

        let named_by_header = !named.is_empty();
        fields.disease_name = named
            .into_iter()
            .next()
            .or_else(|| first_line_label(text))
            .or_else(|| first_sentence(text));

        debug!(
            disease_name = ?fields.disease_name,
            causes = fields.causes.len(),
            symptoms = fields.symptoms.len(),
            solutions = fields.solutions.len(),
            prevention = fields.prevention.len(),
            "ResponseParser::parse: done"
        );
        ParsedReply {
            fields,
            named_by_header,
            response: text.to_string(),
        }
    }
}

fn push_item(fields: &mut DiagnosisContext, named: &mut Vec<String>, section: Section, item: String) {
    match section {
        Section::DiseaseName => named.push(item),
        Section::Causes => fields.causes.push(item),
        Section::Symptoms => fields.symptoms.push(item),
        Section::Solutions => fields.solutions.push(item),
        Section::Prevention => fields.prevention.push(item),
    }
}

fn strip_emphasis(s: &str) -> &str {
    s.trim_matches(|c: char| c == '*' || c == '_' || c.is_whitespace())
}

/// Drop markdown heading marks, a list bullet or a `1.`/`1)` number
fn strip_marker(line: &str) -> &str {
    let s = line.trim().trim_start_matches('#').trim_start();
    for bullet in ["- ", "* ", "• ", "+ ", "– "] {
        if let Some(rest) = s.strip_prefix(bullet) {
            return rest.trim_start();
        }
    }
    let digits = s.len() - s.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits > 0
        && let Some(rest) = s[digits..].strip_prefix(['.', ')'])
        && (rest.is_empty() || rest.starts_with(char::is_whitespace))
    {
        return rest.trim_start();
    }
    s
}

/// Recognise a section header, returning any value written after its colon
fn classify_header(line: &str) -> Option<(Section, Option<&str>)> {
    let s = strip_marker(line).trim_start_matches(['*', '_']);
    for (section, aliases) in SECTION_HEADERS {
        for alias in aliases {
            let Some(head) = s.get(..alias.len()) else {
                continue;
            };
            if !head.eq_ignore_ascii_case(alias) {
                continue;
            }
            if let Some(inline) = header_remainder(&s[alias.len()..]) {
                return Some((section, inline));
            }
        }
    }
    None
}

/// `None` if the text after an alias means the line is not a header
fn header_remainder(rest: &str) -> Option<Option<&str>> {
    let mut rest = rest.trim_start_matches(['*', '_']).trim_start();
    if rest.starts_with('(') {
        let close = rest.find(')')?;
        rest = rest[close + 1..].trim_start_matches(['*', '_']).trim_start();
    }
    if rest.is_empty() {
        return Some(None);
    }
    let value = strip_emphasis(rest.strip_prefix(':')?);
    Some(if value.is_empty() { None } else { Some(value) })
}

fn item_text(line: &str) -> Option<String> {
    let item = strip_emphasis(strip_marker(line));
    if item.is_empty() { None } else { Some(item.to_string()) }
}

/// A short label on the first non-empty line, e.g. `Leaf Blight.`
fn first_line_label(text: &str) -> Option<String> {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    if classify_header(line).is_some() {
        return None;
    }
    let label = strip_emphasis(line.trim_start_matches('#'))
        .trim_end_matches([':', '.', '!'])
        .trim_end();
    let is_label = !label.is_empty()
        && label.chars().count() <= MAX_LABEL_LEN
        && label
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, ' ' | '\'' | '(' | ')' | '/' | '_' | '-'));
    if is_label { Some(label.to_string()) } else { None }
}

/// Everything before the first sentence terminator, whitespace collapsed
fn first_sentence(text: &str) -> Option<String> {
    let end = text.find(['.', '!', '?'])?;
    let sentence = text[..end].split_whitespace().collect::<Vec<_>>().join(" ");
    let sentence = strip_emphasis(&sentence).to_string();
    if sentence.is_empty() { None } else { Some(sentence) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> ParsedReply {
        ResponseParser::new().parse(text)
    }

    fn items(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_structured_reply() {
        let text = "Leaf Blight.\nCauses:\n- fungus\n- wet soil\nSymptoms:\n- brown spots\nSolutions:\n- fungicide\nPrevention:\n- crop rotation";
        let parsed = parse(text);

        assert_eq!(parsed.fields.disease_name.as_deref(), Some("Leaf Blight"));
        assert_eq!(parsed.fields.causes, items(&["fungus", "wet soil"]));
        assert_eq!(parsed.fields.symptoms, items(&["brown spots"]));
        assert_eq!(parsed.fields.solutions, items(&["fungicide"]));
        assert_eq!(parsed.fields.prevention, items(&["crop rotation"]));
        assert_eq!(parsed.fields.confidence, None);
        assert_eq!(parsed.response, text);
    }

    #[test]
    fn test_no_headers_falls_back_to_first_sentence() {
        let text = "Your tomato plant most likely has early blight, a common fungal disease. Remove the lower leaves and keep foliage dry.";
        let parsed = parse(text);

        assert_eq!(
            parsed.fields.disease_name.as_deref(),
            Some("Your tomato plant most likely has early blight, a common fungal disease")
        );
        assert!(parsed.fields.causes.is_empty());
        assert!(parsed.fields.symptoms.is_empty());
        assert!(parsed.fields.solutions.is_empty());
        assert!(parsed.fields.prevention.is_empty());
        assert_eq!(parsed.response, text);
    }

    #[test]
    fn test_empty_and_unterminated_text() {
        let parsed = parse("");
        assert_eq!(parsed.fields, DiagnosisContext::default());
        assert_eq!(parsed.response, "");

        let parsed = parse("I could not identify the problem, please send a clearer photo");
        assert_eq!(parsed.fields.disease_name, None);
    }

    #[test]
    fn test_alias_headers_map_to_sections() {
        let text = "Powdery Mildew\n\nTreatment:\n- sulfur spray\nWhat to do:\n- prune crowded shoots\nHow to prevent:\n- space plants\nRecommendations\n- resistant varieties";
        let parsed = parse(text);

        assert_eq!(parsed.fields.disease_name.as_deref(), Some("Powdery Mildew"));
        assert_eq!(
            parsed.fields.solutions,
            items(&["sulfur spray", "prune crowded shoots", "resistant varieties"])
        );
        assert_eq!(parsed.fields.prevention, items(&["space plants"]));
    }

    #[test]
    fn test_decorated_headers() {
        let text = "## Late Blight\n**Causes:**\n* Phytophthora infestans\n1. Symptoms\n1) dark lesions\n2) white mould\n### Solutions (Treatment/Recommendations):\n• copper fungicide\n__Prevention__:\n+ certified seed";
        let parsed = parse(text);

        assert_eq!(parsed.fields.disease_name.as_deref(), Some("Late Blight"));
        assert_eq!(parsed.fields.causes, items(&["Phytophthora infestans"]));
        assert_eq!(parsed.fields.symptoms, items(&["dark lesions", "white mould"]));
        assert_eq!(parsed.fields.solutions, items(&["copper fungicide"]));
        assert_eq!(parsed.fields.prevention, items(&["certified seed"]));
    }

    #[test]
    fn test_inline_values_become_first_item() {
        let text = "Rust.\nCauses: Puccinia fungus\n- windborne spores\nPrevention: rotate crops";
        let parsed = parse(text);

        assert_eq!(parsed.fields.causes, items(&["Puccinia fungus", "windborne spores"]));
        assert_eq!(parsed.fields.prevention, items(&["rotate crops"]));
    }

    #[test]
    fn test_disease_name_header_wins() {
        let text = "Here is what I found in the photo.\nDisease Name: Apple scab\nCauses:\n- Venturia inaequalis";
        let parsed = parse(text);

        assert_eq!(parsed.fields.disease_name.as_deref(), Some("Apple scab"));
        assert!(parsed.named_by_header);
        assert_eq!(parsed.fields.causes, items(&["Venturia inaequalis"]));
    }

    #[test]
    fn test_heuristic_name_is_not_from_header() {
        let parsed = parse("Spray every seven days. Repeat after rain.");
        assert_eq!(parsed.fields.disease_name.as_deref(), Some("Spray every seven days"));
        assert!(!parsed.named_by_header);
    }

    #[test]
    fn test_diagnosis_header_on_own_line() {
        let text = "Diagnosis:\nBacterial spot\nSymptoms:\n- small dark lesions";
        let parsed = parse(text);
        assert_eq!(parsed.fields.disease_name.as_deref(), Some("Bacterial spot"));
    }

    #[test]
    fn test_description_before_first_header_is_not_itemized() {
        let text = "Leaf Curl.\nThis is a viral disease spread by whiteflies.\nCauses:\n- whiteflies";
        let parsed = parse(text);

        assert_eq!(parsed.fields.causes, items(&["whiteflies"]));
        assert!(!parsed.fields.symptoms.iter().any(|s| s.contains("viral")));
    }

    #[test]
    fn test_hyphenated_words_survive() {
        let text = "Anthracnose\nSolutions:\n- use copper-based sprays\n- remove self-sown seedlings";
        let parsed = parse(text);
        assert_eq!(
            parsed.fields.solutions,
            items(&["use copper-based sprays", "remove self-sown seedlings"])
        );
    }

    #[test]
    fn test_words_starting_with_alias_are_not_headers() {
        let text = "Wilt\nSymptoms:\n- Diseased stems turn brown\n- Causeway runoff spreads it\n- Prevention is hard once established";
        let parsed = parse(text);

        assert_eq!(parsed.fields.symptoms.len(), 3);
        assert!(parsed.fields.causes.is_empty());
        assert!(parsed.fields.prevention.is_empty());
        assert_eq!(parsed.fields.disease_name.as_deref(), Some("Wilt"));
    }

    #[test]
    fn test_repeated_section_appends() {
        let text = "Blast\nCauses:\n- fungus\nSymptoms:\n- lesions\nCauses:\n- excess nitrogen";
        let parsed = parse(text);
        assert_eq!(parsed.fields.causes, items(&["fungus", "excess nitrogen"]));
    }

    #[test]
    fn test_case_insensitive_headers() {
        let text = "Mosaic virus\nCAUSES:\n- aphids\nsymptoms:\n- mottled leaves";
        let parsed = parse(text);
        assert_eq!(parsed.fields.causes, items(&["aphids"]));
        assert_eq!(parsed.fields.symptoms, items(&["mottled leaves"]));
    }

    #[test]
    fn test_windows_line_endings() {
        let text = "Leaf Blight.\r\nCauses:\r\n- fungus\r\n";
        let parsed = parse(text);
        assert_eq!(parsed.fields.disease_name.as_deref(), Some("Leaf Blight"));
        assert_eq!(parsed.fields.causes, items(&["fungus"]));
    }
}
