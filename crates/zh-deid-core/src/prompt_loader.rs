/*
   Loads the residual-PII validation prompt: the built-in template, or a
   user template `<prompts_dir>/<name>.md` with fallback to the built-in.
*/

use crate::config::Config;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::warn;

const BUILTIN_PROMPT: &str = include_str!("templates/validation_prompt.md");

#[derive(Debug, Clone)]
pub struct PromptLoader {
    prompts_dir: PathBuf,
}

impl PromptLoader {
    /// Loader over `<data_dir>/prompts`, seeding `default.md` on first use.
    pub fn new() -> Result<Self> {
        let project_dirs = Config::get_app_dirs()?;
        Self::with_dir(project_dirs.data_dir().join("prompts"))
    }

    pub fn with_dir<P: AsRef<Path>>(prompts_dir: P) -> Result<Self> {
        let prompts_dir = prompts_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&prompts_dir)?;

        let default_prompt_path = prompts_dir.join("default.md");
        if !default_prompt_path.exists() {
            std::fs::write(&default_prompt_path, BUILTIN_PROMPT)?;
        }

        Ok(Self { prompts_dir })
    }

    pub fn prompts_dir(&self) -> &Path {
        &self.prompts_dir
    }

    pub fn load_prompt(&self, template_name: Option<&str>) -> String {
        match template_name {
            None => BUILTIN_PROMPT.to_string(),
            Some(name) => {
                let prompt_path = self.prompts_dir.join(format!("{}.md", name));
                match std::fs::read_to_string(&prompt_path) {
                    Ok(content) => content,
                    Err(_) => {
                        warn!("Prompt template '{}' not found, using built-in", name);
                        BUILTIN_PROMPT.to_string()
                    }
                }
            }
        }
    }

    pub fn format_prompt(&self, template: &str, text: &str) -> String {
        template.replace("{text}", &text.replace('"', r#"\""#))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn loader() -> (TempDir, PromptLoader) {
        let temp_dir = TempDir::new().unwrap();
        let loader = PromptLoader::with_dir(temp_dir.path().join("prompts")).unwrap();
        (temp_dir, loader)
    }

    #[test]
    fn test_builtin_prompt_loading() {
        let (_dir, loader) = loader();
        let prompt = loader.load_prompt(None);

        assert!(prompt.contains("Built-in Residual PII Validation Prompt"));
        assert!(prompt.contains("contains_pii"));
        assert!(prompt.contains("identified_pii"));
        assert!(prompt.contains("{text}"));
    }

    #[test]
    fn test_default_prompt_created() {
        let (_dir, loader) = loader();
        assert!(loader.prompts_dir().join("default.md").exists());

        let prompt = loader.load_prompt(Some("default"));
        assert_eq!(prompt, loader.load_prompt(None));
    }

    #[test]
    fn test_custom_prompt_loading() {
        let (_dir, loader) = loader();
        std::fs::write(
            loader.prompts_dir().join("strict.md"),
            "Strict check. Text: {text}",
        )
        .unwrap();

        assert_eq!(loader.load_prompt(Some("strict")), "Strict check. Text: {text}");
    }

    #[test]
    fn test_nonexistent_prompt_fallback() {
        let (_dir, loader) = loader();
        let prompt = loader.load_prompt(Some("nonexistent123"));
        assert!(prompt.contains("Built-in Residual PII Validation Prompt"));
    }

    #[test]
    fn test_prompt_formatting() {
        let (_dir, loader) = loader();
        let formatted = loader.format_prompt("TEXT: \"{text}\" - END", "患者<NAME>说\"你好\"");
        assert_eq!(formatted, "TEXT: \"患者<NAME>说\\\"你好\\\"\" - END");
    }
}
