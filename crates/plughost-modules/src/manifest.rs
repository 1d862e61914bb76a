use plughost_core::ModuleVersion;
use serde::Deserialize;

/// Parsed `<name>.module.toml`.
///
/// ```toml
/// name = "samples"
/// version = "1.0.0"
/// description = "Sample workers"
/// exports = ["samples::SampleWorkerFactory", "samples::SampleWorkerServiceInjector"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModuleManifest {
    pub name: String,
    #[serde(default)]
    pub version: Option<ModuleVersion>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub exports: Vec<String>,
}

impl ModuleManifest {
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}
