//! Prompt construction for context-grounded answering.

/// Sequences that end a generation.
pub const STOP_TOKENS: &[&str] = &["</s>", "[INST]"];

/// Build the instruct prompt that grounds the answer in the retrieved
/// contexts.
///
/// The model is told to answer only from the context block and to refuse
/// when the block does not contain the answer.
pub fn build_prompt(question: &str, contexts: &[String]) -> String {
    let context_block = contexts.join("\n");
    format!(
        "[INST] <<SYS>> You are a technical assistant for software developers.\n\
         Answer only from the CONTEXT below. Be concise; if the context does not \
         contain the answer, say \"I cannot help with that\".\n<</SYS>>\n\
         CONTEXT:\n{}\n\nQUESTION: {}\n[/INST]",
        context_block, question
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_contains_question_and_contexts() {
        let contexts = vec![
            "Docker is a container platform".to_string(),
            "Containers share the host kernel".to_string(),
        ];
        let prompt = build_prompt("What is Docker?", &contexts);

        assert!(prompt.contains("What is Docker?"));
        assert!(prompt.contains("Docker is a container platform"));
        assert!(prompt.contains("Containers share the host kernel"));
    }

    #[test]
    fn test_prompt_with_no_contexts_is_still_valid() {
        let prompt = build_prompt("Anything?", &[]);
        assert!(prompt.contains("QUESTION: Anything?"));
        assert!(prompt.starts_with("[INST]"));
    }
}
