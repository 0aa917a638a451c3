use crate::GeneratorError;
use regex::Regex;

pub const TEMPLATE_NAME: &str = "myapp";
const RESERVED_NAMES: &[&str] = &["app", "application", "lambda", "aws", "test"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppNames {
    pub lower: String,
    pub upper: String,
    pub pascal: String,
    pub display: String,
    pub description: String,
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn words(name: &str) -> impl Iterator<Item = String> + '_ {
    name.split('_').filter(|w| !w.is_empty()).map(capitalize)
}

pub fn validate_app_name(name: &str) -> Result<(), GeneratorError> {
    let valid = Regex::new(r"^[a-z][a-z0-9_]*$")
        .map(|re| re.is_match(name))
        .unwrap_or(false);
    if !valid {
        return Err(GeneratorError::InvalidName(name.to_string()));
    }
    if RESERVED_NAMES.contains(&name) {
        return Err(GeneratorError::ReservedName(name.to_string()));
    }
    Ok(())
}

impl AppNames {
    pub fn derive(name: &str, display: Option<&str>, description: Option<&str>) -> Result<Self, GeneratorError> {
        validate_app_name(name)?;
        let display = match display.map(str::trim).filter(|d| !d.is_empty()) {
            Some(d) => d.to_string(),
            None => words(name).collect::<Vec<_>>().join(" "),
        };
        let description = match description.map(str::trim).filter(|d| !d.is_empty()) {
            Some(d) => d.to_string(),
            None => format!("{} - AWS Lambda Application", display),
        };
        Ok(Self {
            lower: name.to_lowercase(),
            upper: name.to_uppercase(),
            pascal: words(name).collect(),
            display,
            description,
        })
    }

    /// Template literals and their replacements, applied in order. The
    /// budget name goes first so it picks up the display name.
    fn replacements(&self) -> [(&'static str, String); 6] {
        [
            ("MyApp Budget", format!("{} Budget", self.display)),
            ("MyApp", self.pascal.clone()),
            ("My App", self.display.clone()),
            ("MYAPP", self.upper.clone()),
            ("myapp", self.lower.clone()),
            ("[Your app description]", self.description.clone()),
        ]
    }

    pub fn replace_content(&self, content: &str) -> String {
        self.replacements()
            .iter()
            .fold(content.to_string(), |acc, (from, to)| acc.replace(from, to))
    }
}
