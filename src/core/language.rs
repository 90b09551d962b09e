//! Fixed alias table for fence language tags.

/// Canonical language entry used for code-block icons and highlighter lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Language {
    /// Canonical name shown in the code-block header.
    pub name: &'static str,
    /// Icon marker the host maps to an asset.
    pub icon: &'static str,
    /// Token handed to the syntax highlighter (`syntect` extension/name lookup).
    pub token: &'static str,
}

impl Language {
    const fn new(name: &'static str, icon: &'static str, token: &'static str) -> Self {
        Self { name, icon, token }
    }

    pub const fn generic() -> Self {
        Self::new("text", "code", "txt")
    }

    pub fn is_generic(&self) -> bool {
        *self == Self::generic()
    }
}

const PYTHON: Language = Language::new("python", "python", "py");
const JAVASCRIPT: Language = Language::new("javascript", "javascript", "js");
const JAVASCRIPT_REACT: Language = Language::new("javascript-react", "react", "js");
const TYPESCRIPT: Language = Language::new("typescript", "typescript", "ts");
const TYPESCRIPT_REACT: Language = Language::new("typescript-react", "react", "ts");
const RUST: Language = Language::new("rust", "rust", "rs");
const BASH: Language = Language::new("bash", "terminal", "sh");
const JSON: Language = Language::new("json", "json", "json");
const YAML: Language = Language::new("yaml", "yaml", "yaml");
const TOML: Language = Language::new("toml", "settings", "toml");
const HTML: Language = Language::new("html", "html", "html");
const CSS: Language = Language::new("css", "css", "css");
const GO: Language = Language::new("go", "go", "go");
const JAVA: Language = Language::new("java", "java", "java");
const C: Language = Language::new("c", "c", "c");
const CPP: Language = Language::new("cpp", "cpp", "cpp");
const CSHARP: Language = Language::new("csharp", "csharp", "cs");
const RUBY: Language = Language::new("ruby", "ruby", "rb");
const SQL: Language = Language::new("sql", "database", "sql");
const MARKDOWN: Language = Language::new("markdown", "markdown", "md");
const DIFF: Language = Language::new("diff", "diff", "diff");
const MERMAID: Language = Language::new("mermaid", "diagram", "txt");

const ALIASES: &[(&str, Language)] = &[
    ("python", PYTHON),
    ("py", PYTHON),
    ("python3", PYTHON),
    ("javascript", JAVASCRIPT),
    ("js", JAVASCRIPT),
    ("mjs", JAVASCRIPT),
    ("node", JAVASCRIPT),
    ("jsx", JAVASCRIPT_REACT),
    ("typescript", TYPESCRIPT),
    ("ts", TYPESCRIPT),
    ("tsx", TYPESCRIPT_REACT),
    ("rust", RUST),
    ("rs", RUST),
    ("bash", BASH),
    ("sh", BASH),
    ("shell", BASH),
    ("zsh", BASH),
    ("console", BASH),
    ("json", JSON),
    ("jsonc", JSON),
    ("yaml", YAML),
    ("yml", YAML),
    ("toml", TOML),
    ("html", HTML),
    ("htm", HTML),
    ("xhtml", HTML),
    ("svg", HTML),
    ("css", CSS),
    ("go", GO),
    ("golang", GO),
    ("java", JAVA),
    ("c", C),
    ("h", C),
    ("cpp", CPP),
    ("c++", CPP),
    ("cc", CPP),
    ("hpp", CPP),
    ("csharp", CSHARP),
    ("cs", CSHARP),
    ("c#", CSHARP),
    ("ruby", RUBY),
    ("rb", RUBY),
    ("sql", SQL),
    ("markdown", MARKDOWN),
    ("md", MARKDOWN),
    ("diff", DIFF),
    ("patch", DIFF),
    ("mermaid", MERMAID),
];

/// Case-folds `tag` and resolves it through the alias table. Unknown and
/// empty tags resolve to [`Language::generic`].
pub fn resolve_language(tag: &str) -> Language {
    let folded = tag.trim().to_ascii_lowercase();
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == folded)
        .map(|(_, language)| *language)
        .unwrap_or_else(Language::generic)
}
