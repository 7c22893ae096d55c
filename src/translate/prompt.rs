use super::batch::DELIMITER_TOKEN;

/// Prompt templates for one target language
#[derive(Debug, Clone)]
pub struct TranslationPrompts {
    target_code: String,
    target_name: String,
}

impl TranslationPrompts {
    pub fn new(target_language: &str) -> Self {
        Self {
            target_code: target_language.to_string(),
            target_name: language_code_to_name(target_language),
        }
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    /// First-attempt prompt for a delimited batch of subtitle lines
    pub fn batch_prompt(&self, joined_texts: &str, context_hint: Option<&str>) -> String {
        let mut prompt = format!(
            "You are a professional subtitle translator.\n\
             \n\
             Translate every subtitle line below to {name} (language code: {code}).\n\
             Lines are separated by the marker {delim} on its own line.\n\
             \n\
             RULES:\n\
             1. Keep the marker {delim} between translated lines exactly as given\n\
             2. Return exactly one translated line for every source line, in the same order\n\
             3. Do not merge, split, drop or number lines\n\
             4. Return ONLY the translated lines, without explanations\n\
             \n",
            name = self.target_name,
            code = self.target_code,
            delim = DELIMITER_TOKEN,
        );

        if let Some(hint) = context_hint.filter(|h| !h.trim().is_empty()) {
            prompt.push_str(&format!(
                "[Context for reference - DO NOT translate this part]\n\
                 {}\n\
                 \n",
                hint.trim()
            ));
        }

        prompt.push_str(&format!("[Subtitle lines]\n{}\n", joined_texts));
        prompt
    }

    /// Follow-up prompt restating the expected line count
    pub fn retry_prompt(&self, batch_prompt: &str, expected: usize) -> String {
        format!(
            "{}\n\
             IMPORTANT: Your previous answer had the wrong number of lines.\n\
             There are exactly {} source lines. Answer with exactly {} translated lines \
             separated by {} and nothing else.\n",
            batch_prompt, expected, expected, DELIMITER_TOKEN
        )
    }

    /// Summary of a transcript, used to steer segment translation
    pub fn summary_prompt(&self, transcript: &str) -> String {
        format!(
            "You are an assistant preparing a video for subtitle translation.\n\
             \n\
             Summarize the transcript below in its original language. Mention the topic, \
             the speakers' roles, recurring names and technical terms, and the tone.\n\
             Keep it under 200 words and return only the summary.\n\
             \n\
             [Transcript]\n\
             {}\n",
            transcript
        )
    }

    /// Whole-text translation of the current context
    pub fn context_translation_prompt(&self, context: &str) -> String {
        format!(
            "You are a professional translator.\n\
             \n\
             CRITICAL: You must translate the text to {name} ONLY. Do not translate to any other language.\n\
             The target language is: {name} (language code: {code})\n\
             \n\
             Return ONLY the translation, without explanations or alternatives.\n\
             \n\
             [Text to translate]\n\
             {text}\n",
            name = self.target_name,
            code = self.target_code,
            text = context,
        )
    }
}

/// Convert language code to full language name for clearer prompts
pub fn language_code_to_name(code: &str) -> String {
    match code.to_lowercase().as_str() {
        "en" => "English",
        "th" => "Thai",
        "ja" => "Japanese",
        "ko" => "Korean",
        "zh" => "Chinese",
        "vi" => "Vietnamese",
        "id" => "Indonesian",
        "ms" => "Malay",
        "fr" => "French",
        "de" => "German",
        "es" => "Spanish",
        "it" => "Italian",
        "pt" => "Portuguese",
        "ru" => "Russian",
        "pl" => "Polish",
        "nl" => "Dutch",
        "tr" => "Turkish",
        "ar" => "Arabic",
        "hi" => "Hindi",
        "sv" => "Swedish",
        "uk" => "Ukrainian",
        _ => return code.to_string(),
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_prompt_includes_lines_and_hint() {
        let prompts = TranslationPrompts::new("th");
        let prompt = prompts.batch_prompt("hello\n[SSS]\nworld", Some("A cooking show."));

        assert!(prompt.contains("Thai (language code: th)"));
        assert!(prompt.contains("hello\n[SSS]\nworld"));
        assert!(prompt.contains("A cooking show."));
    }

    #[test]
    fn test_blank_hint_is_omitted() {
        let prompts = TranslationPrompts::new("ja");
        let prompt = prompts.batch_prompt("hello", Some("   "));
        assert!(!prompt.contains("[Context for reference"));
    }

    #[test]
    fn test_retry_prompt_restates_count() {
        let prompts = TranslationPrompts::new("th");
        let base = prompts.batch_prompt("a\n[SSS]\nb\n[SSS]\nc", None);
        let retry = prompts.retry_prompt(&base, 3);
        assert!(retry.starts_with(&base));
        assert!(retry.contains("exactly 3 source lines"));
    }

    #[test]
    fn test_unknown_language_code_passes_through() {
        assert_eq!(language_code_to_name("TH"), "Thai");
        assert_eq!(language_code_to_name("tlh"), "tlh");
    }
}
