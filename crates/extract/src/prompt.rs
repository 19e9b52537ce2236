use search::Snippet;

/// Reply the model is told to give when the context does not answer the question.
pub const NOT_FOUND_MARKER: &str = "NOT_FOUND";

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that extracts specific information from web search results. \
You answer only from the search results you are given and never from prior knowledge.";

pub fn build_extraction_prompt(question: &str, snippets: &[Snippet]) -> String {
    format!(
        r#"Answer the question using only the search results below.

QUESTION:
{}

SEARCH RESULTS:
{}

RULES:
- Reply with the answer only: a short phrase or one sentence, no preamble
- Use only facts stated in the search results
- If the search results do not contain the answer, reply with exactly {}

ANSWER:"#,
        question,
        format_context(snippets),
        NOT_FOUND_MARKER
    )
}

/// Number and label each snippet so the model can tell sources apart.
pub fn format_context(snippets: &[Snippet]) -> String {
    snippets
        .iter()
        .enumerate()
        .map(|(i, snippet)| {
            let mut block = format!("[{}]", i + 1);
            if let Some(title) = &snippet.title {
                block.push(' ');
                block.push_str(title.trim());
            }
            block.push('\n');
            block.push_str(snippet.text.trim());
            if let Some(link) = &snippet.link {
                block.push_str("\nSource: ");
                block.push_str(link);
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
