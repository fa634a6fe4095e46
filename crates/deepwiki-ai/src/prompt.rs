const SUPPORTED_LANGUAGES: &[(&str, &str)] = &[
    ("en", "English"),
    ("ja", "Japanese (日本語)"),
    ("zh", "Mandarin Chinese (中文)"),
    ("zh-tw", "Traditional Chinese (繁體中文)"),
    ("es", "Spanish (Español)"),
    ("kr", "Korean (한국어)"),
    ("vi", "Vietnamese (Tiếng Việt)"),
    ("pt-br", "Brazilian Portuguese (Português Brasileiro)"),
    ("fr", "Français (French)"),
    ("ru", "Русский (Russian)"),
];

pub const DEFAULT_LANGUAGE_NAME: &str = "English";

/// Display name for a language code, English when the code is unknown.
pub fn language_display_name(code: &str) -> &'static str {
    let code = code.trim();
    SUPPORTED_LANGUAGES
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(code))
        .map(|(_, name)| *name)
        .unwrap_or(DEFAULT_LANGUAGE_NAME)
}

/// Short repository name: the last non-empty path segment of the URL.
pub fn repository_name(repo_url: &str) -> &str {
    repo_url
        .trim()
        .trim_end_matches('/')
        .trim_end_matches(".git")
        .rsplit('/')
        .next()
        .unwrap_or(repo_url)
}

pub fn repository_system_prompt(repo_type: &str, repo_url: &str, language: &str) -> String {
    format!(
        "You are an AI assistant specialized in explaining code and documentation for the {repo_type} repository: {repo_url}\n\n\
Repository: {}\n\
Language: {}\n\n\
Your task is to answer questions about this repository based on the provided context. Be accurate, concise, and helpful. Format your response in markdown for readability.",
        repository_name(repo_url),
        language_display_name(language),
    )
}
