use crate::models::ScriptRequest;

/// Rough speaking rate used to turn minutes into a word budget.
pub const WORDS_PER_MINUTE: u32 = 150;

/// Builds the script-writing instruction for a validated request.
pub fn script_prompt(req: &ScriptRequest) -> String {
    let names: Vec<&str> = req.speakers.iter().map(|s| s.name.as_str()).collect();
    let words = req.target_minutes * WORDS_PER_MINUTE;
    let example = names
        .iter()
        .map(|name| format!("{name}: ..."))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Write a podcast script in {language} about the following topic:\n\
         {topic}\n\n\
         Speakers ({count}): {names}.\n\
         Target length: about {minutes} minutes of speech (roughly {words} words).\n\n\
         Format every line as the speaker's name, a colon, and what they say, for example:\n\
         {example}\n\n\
         Use only the speakers listed above. Do not add a title, narration, stage directions, \
         sound effects or markdown.",
        language = req.language,
        topic = req.prompt,
        count = names.len(),
        names = names.join(", "),
        minutes = req.target_minutes,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Speaker;

    #[test]
    fn prompt_mentions_every_input() {
        let req = ScriptRequest {
            prompt: "the history of the borrow checker".into(),
            language: "Spanish".into(),
            speakers: vec![Speaker { name: "Ana".into() }, Speaker { name: "Ben".into() }],
            target_minutes: 4,
        };

        let prompt = script_prompt(&req);

        assert!(prompt.contains("in Spanish"));
        assert!(prompt.contains("the history of the borrow checker"));
        assert!(prompt.contains("Speakers (2): Ana, Ben."));
        assert!(prompt.contains("about 4 minutes"));
        assert!(prompt.contains("roughly 600 words"));
        assert!(prompt.contains("Ana: ...\nBen: ..."));
    }
}
