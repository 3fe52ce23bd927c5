use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ModelFamily {
    Gpt4o,
    Gpt4Turbo,
    Gpt4,
    Gpt35,
}

impl ModelFamily {
    pub fn display_name(&self) -> &'static str {
        match self {
            ModelFamily::Gpt4o => "GPT-4o",
            ModelFamily::Gpt4Turbo => "GPT-4 Turbo",
            ModelFamily::Gpt4 => "GPT-4",
            ModelFamily::Gpt35 => "GPT-3.5",
        }
    }
}

/// Reference entry for the model picker in the persona editor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelInfo {
    pub id: String,
    pub family: ModelFamily,
    pub description: String,
    pub context_tokens: u32,
    pub training_data: String,
}

fn model(id: &str, family: ModelFamily, description: &str, context_tokens: u32, training_data: &str) -> ModelInfo {
    ModelInfo {
        id: id.to_string(),
        family,
        description: description.to_string(),
        context_tokens,
        training_data: training_data.to_string(),
    }
}

pub fn get_all_models() -> Vec<ModelInfo> {
    use ModelFamily::*;

    vec![
        model("gpt-4o", Gpt4o, "High-intelligence flagship model for complex, multi-step tasks. Cheaper and faster than GPT-4 Turbo.", 128_000, "Up to Oct 2023"),
        model("gpt-4o-2024-08-06", Gpt4o, "Snapshot with Structured Outputs support for complex, multi-step tasks.", 128_000, "Up to Oct 2023"),
        model("chatgpt-4o-latest", Gpt4o, "Continuously updated to the GPT-4o version used in ChatGPT. Suited for research and evaluation.", 128_000, "Up to Oct 2023"),
        model("gpt-4o-mini", Gpt4o, "Affordable small model for fast, lightweight tasks. Cheaper and more capable than GPT-3.5 Turbo.", 128_000, "Up to Oct 2023"),
        model("gpt-4-turbo", Gpt4Turbo, "GPT-4 Turbo with vision; vision requests can use JSON mode and function calling.", 128_000, "Up to Dec 2023"),
        model("gpt-4-turbo-preview", Gpt4Turbo, "GPT-4 Turbo preview model intended for research and testing.", 128_000, "Up to Dec 2023"),
        model("gpt-4-1106-preview", Gpt4Turbo, "Improved instruction following, JSON mode, reproducible outputs and parallel function calling.", 128_000, "Up to Apr 2023"),
        model("gpt-4", Gpt4, "More capable than any GPT-3.5 model and optimized for chat.", 8_192, "Up to Sep 2021"),
        model("gpt-4-32k", Gpt4, "Same capabilities as gpt-4 with 4x the context length.", 32_768, "Up to Sep 2021"),
        model("gpt-3.5-turbo", Gpt35, "Most capable GPT-3.5 model, optimized for chat.", 4_096, "Up to Sep 2021"),
        model("gpt-3.5-turbo-16k", Gpt35, "gpt-3.5-turbo with 4 times the context length.", 16_384, "Up to Sep 2021"),
    ]
}

pub fn get_model_by_id(id: &str) -> Option<ModelInfo> {
    get_all_models().into_iter().find(|m| m.id == id)
}

pub fn is_known_model(id: &str) -> bool {
    get_model_by_id(id).is_some()
}
