use serde::{Deserialize, Serialize};

pub const DEFAULT_ASSISTANT: &str = "html5-dev";

/// Developer assistant ("AI employee") preset used by the code workbench
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssistantPreset {
    pub slug: String,
    pub name: String,
    pub expert: String,
    pub color: String,
    pub icon: String,
    pub system_prompt: String,
    pub placeholder: String,
    pub examples: Vec<String>,
}

impl AssistantPreset {
    #[allow(clippy::too_many_arguments)]
    fn new(
        slug: &str,
        name: &str,
        expert: &str,
        color: &str,
        icon: &str,
        system_prompt: &str,
        placeholder: &str,
        examples: &[&str],
    ) -> Self {
        Self {
            slug: slug.to_string(),
            name: name.to_string(),
            expert: expert.to_string(),
            color: color.to_string(),
            icon: icon.to_string(),
            system_prompt: system_prompt.to_string(),
            placeholder: placeholder.to_string(),
            examples: examples.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// Greeting shown before the first message
    pub fn welcome_message(&self) -> String {
        format!("Hello! I'm your personal {}. How can I help you today?", self.expert)
    }
}

// Get all available assistant presets, in menu order
pub fn get_all_assistants() -> Vec<AssistantPreset> {
    vec![
        AssistantPreset::new(
            "html5-dev",
            "HTML5 Developer",
            "Senior HTML5 & Semantic Markup Specialist",
            "#e34c26",
            "fa-html5",
            "You are a Senior HTML5 Developer. Create clean, semantic, accessible HTML5 code following W3C standards. Use modern HTML5 elements, ARIA attributes, and SEO best practices. Always validate markup and ensure cross-browser compatibility.",
            "Describe the HTML structure you need...",
            &[
                "Create a responsive landing page with hero section",
                "Build a semantic blog post template",
                "Design an accessible form with validation",
            ],
        ),
        AssistantPreset::new(
            "css-dev",
            "CSS Developer",
            "Senior CSS3 & Design Systems Specialist",
            "#264de4",
            "fa-css3",
            "You are a Senior CSS Developer. Create modern, responsive CSS using CSS3, Flexbox, Grid, and custom properties. Follow BEM methodology, use mobile-first approach, ensure cross-browser compatibility, and optimize performance. Include animations and transitions when appropriate.",
            "Describe the styling you need...",
            &[
                "Create a responsive navigation with mobile menu",
                "Design a card grid layout with hover effects",
                "Build a custom dark/light theme system",
            ],
        ),
        AssistantPreset::new(
            "js-dev",
            "JavaScript Developer",
            "Senior JavaScript & Frontend Engineer",
            "#f7df1e",
            "fa-js",
            "You are a Senior JavaScript Developer. Write clean, modern JavaScript (ES6+) following best practices. Use vanilla JS when possible, implement proper error handling, ensure performance, and write modular, reusable code. Include comments for complex logic.",
            "Describe the functionality you need...",
            &[
                "Create a dynamic form validator",
                "Build an image gallery with lazy loading",
                "Implement a search filter for cards",
            ],
        ),
        AssistantPreset::new(
            "fullstack-dev",
            "Fullstack Developer",
            "Senior Fullstack Developer (HTML/CSS/JS/PHP)",
            "#00d9ff",
            "fa-code",
            "You are a Senior Fullstack Developer. Create complete, production-ready solutions combining HTML5, CSS3, JavaScript, and PHP. Follow MVC patterns, implement proper security (SQL injection prevention, XSS protection), use prepared statements, and ensure responsive design. Provide complete, working code.",
            "Describe the complete feature you need...",
            &[
                "Create a CRUD interface for blog posts",
                "Build a file upload system with validation",
                "Design a dashboard with charts and statistics",
            ],
        ),
    ]
}

// Get an assistant by slug
pub fn get_assistant_by_slug(slug: &str) -> Option<AssistantPreset> {
    get_all_assistants().into_iter().find(|a| a.slug == slug)
}

/// Preset for a slug, falling back to the HTML5 developer for unknown slugs
pub fn resolve_assistant(slug: Option<&str>) -> AssistantPreset {
    slug.and_then(get_assistant_by_slug)
        .or_else(|| get_assistant_by_slug(DEFAULT_ASSISTANT))
        .unwrap_or_else(|| get_all_assistants().remove(0))
}
