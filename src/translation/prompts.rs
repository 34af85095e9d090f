/*!
 * Prompt construction and response parsing for LLM-backed translation.
 *
 * A batch is sent as one message in which every text is preceded by a
 * `<<SEG_n>>` marker and the whole list is closed by `<<END>>`. The model is
 * asked to answer in the same shape, which lets the response be split back
 * into exactly one translation per input.
 */

use crate::errors::ProviderError;

const END_MARKER: &str = "<<END>>";

fn segment_marker(index: usize) -> String {
    format!("<<SEG_{}>>", index)
}

/// System prompt template
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    /// Default system prompt for document translation.
    pub const DOCUMENT_TRANSLATOR: &'static str = r#"You are a professional translator. Translate the following Markdown text fragments to {target_language}.

Rules:
- Translate every fragment independently and keep the fragments in order
- Keep every <<SEG_n>> marker and the final <<END>> marker exactly as given
- Tokens such as ⟦0⟧ stand for code, links or markup; copy them unchanged and place them where they belong in the translated sentence
- Keep Markdown emphasis markers (*, **, _, ~~) around the words they apply to
- Preserve line breaks inside a fragment
- Respond only with the marked fragments, without explanations or notes"#;

    pub fn new(template: &str) -> Self {
        Self {
            template: template.to_string(),
        }
    }

    pub fn document_translator() -> Self {
        Self::new(Self::DOCUMENT_TRANSLATOR)
    }

    /// Render the template for a target language name such as "Chinese"
    pub fn render(&self, target_language: &str) -> String {
        self.template.replace("{target_language}", target_language)
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::document_translator()
    }
}

/// Build the user message for a batch of texts
pub fn build_batch_prompt(texts: &[String]) -> String {
    let mut prompt = String::new();
    for (index, text) in texts.iter().enumerate() {
        prompt.push_str(&segment_marker(index));
        prompt.push('\n');
        prompt.push_str(text);
        prompt.push('\n');
    }
    prompt.push_str(END_MARKER);
    prompt
}

/// Split a model response back into `expected` translations.
///
/// A response that stops before `<<END>>` is accepted as long as every
/// segment marker is present; a missing marker is a parse error.
pub fn parse_batch_response(response: &str, expected: usize) -> Result<Vec<String>, ProviderError> {
    if response.contains(&segment_marker(expected)) {
        let actual = expected
            + (expected..)
                .take_while(|index| response.contains(&segment_marker(*index)))
                .count();
        return Err(ProviderError::CountMismatch { expected, actual });
    }

    let mut translations = Vec::with_capacity(expected);
    let mut cursor = 0;

    for index in 0..expected {
        let start_marker = segment_marker(index);
        let start = response[cursor..]
            .find(&start_marker)
            .map(|pos| cursor + pos + start_marker.len())
            .ok_or_else(|| ProviderError::ParseError(format!("missing marker {}", start_marker)))?;

        let end_marker = if index + 1 == expected {
            END_MARKER.to_string()
        } else {
            segment_marker(index + 1)
        };
        let end = response[start..]
            .find(&end_marker)
            .map(|pos| start + pos)
            .unwrap_or(response.len());

        if end == response.len() && index + 1 < expected {
            return Err(ProviderError::ParseError(format!("missing marker {}", end_marker)));
        }

        translations.push(strip_marker_padding(&response[start..end]).to_string());
        cursor = end;
    }

    Ok(translations)
}

/// Drop the single line break the prompt format puts around each text
fn strip_marker_padding(text: &str) -> &str {
    let text = text.strip_prefix("\r\n").or_else(|| text.strip_prefix('\n')).unwrap_or(text);
    text.strip_suffix("\r\n").or_else(|| text.strip_suffix('\n')).unwrap_or(text)
}
