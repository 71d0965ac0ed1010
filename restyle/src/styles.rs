//! Style catalog: key → prompt mapping.
//!
//! The catalog is configuration data, not code: it is loaded once at
//! startup (builtin defaults or a JSON file) and never mutated.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;

pub struct StyleCatalog {
    prompts: HashMap<String, String>,
}

impl StyleCatalog {
    pub fn new(prompts: HashMap<String, String>) -> Self {
        Self { prompts }
    }

    /// Default catalog shipped with the server.
    pub fn builtin() -> Self {
        let mut prompts = HashMap::new();
        prompts.insert(
            "og-gigachad".to_string(),
            "Restyle the subject as a high-contrast black-and-white gigachad \
             portrait: sharply defined jawline, sculpted cheekbones, confident \
             three-quarter pose, dramatic studio lighting. Keep the person's \
             identity and facial geometry recognizable; do not change ethnicity, \
             age, or gender. Background dark and softly defocused, 1024x1024 \
             composition."
                .to_string(),
        );
        prompts.insert(
            "purple-laser-eyes".to_string(),
            "Add intense glowing purple laser eyes to the subject, positioned \
             naturally over their real eyes: vibrant neon violet beams with \
             radiating light streaks and a soft glow. Everything else in the \
             image (lighting, colors, background, facial features, clothing) \
             must remain completely unchanged and realistic. Align the beams \
             with the subject's eye direction."
                .to_string(),
        );
        Self { prompts }
    }

    /// Load a catalog from a JSON object of key → prompt strings.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading style catalog {}", path.display()))?;
        let prompts: HashMap<String, String> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing style catalog {}", path.display()))?;
        Ok(Self::new(prompts))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.prompts.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }
}
