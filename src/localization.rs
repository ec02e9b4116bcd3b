//! # Localization Module
//!
//! User-facing error messages in the deployment's display language,
//! backed by Fluent resource files under `locales/`. The concurrent bundle
//! type is used so one manager can be shared across request handlers.

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use anyhow::Result;
use fluent_bundle::concurrent::FluentBundle;
use fluent_bundle::{FluentArgs, FluentResource, FluentValue};
use unic_langid::LanguageIdentifier;

/// Locales shipped with the service
const SUPPORTED_LOCALES: &[&str] = &["en", "th"];

/// Localization manager for user-facing pipeline messages
pub struct LocalizationManager {
    bundles: HashMap<String, FluentBundle<FluentResource>>,
}

impl LocalizationManager {
    /// Create a new localization manager
    pub fn new() -> Result<Self> {
        let mut bundles = HashMap::new();

        for locale_str in SUPPORTED_LOCALES {
            let locale: LanguageIdentifier = locale_str.parse()?;
            let bundle = Self::create_bundle(&locale)?;
            bundles.insert((*locale_str).to_string(), bundle);
        }

        Ok(Self { bundles })
    }

    /// Create a fluent bundle for a specific locale
    fn create_bundle(locale: &LanguageIdentifier) -> Result<FluentBundle<FluentResource>> {
        let mut bundle = FluentBundle::new_concurrent(vec![locale.clone()]);

        // Resource path relative to Cargo.toml, overridable for deployments
        let base_dir = std::env::var("LOCALES_DIR").unwrap_or_else(|_| {
            let manifest_dir =
                std::env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string());
            format!("{}/locales", manifest_dir)
        });
        let resource_path = format!("{}/{}/main.ftl", base_dir, locale);
        if let Ok(content) = fs::read_to_string(&resource_path) {
            if let Ok(resource) = FluentResource::try_new(content) {
                let _ = bundle.add_resource(resource);
            }
        }

        Ok(bundle)
    }

    /// Get a localized message in a specific language
    pub fn get_message_in_language(
        &self,
        key: &str,
        language: &str,
        args: Option<&HashMap<&str, &str>>,
    ) -> String {
        let bundle = match self.bundles.get(language) {
            Some(bundle) => bundle,
            None => {
                // Fallback to English if language not found
                match self.bundles.get("en") {
                    Some(bundle) => bundle,
                    None => return format!("Missing translation: {}", key),
                }
            }
        };

        let msg = match bundle.get_message(key) {
            Some(msg) => msg,
            None => return format!("Missing translation: {}", key),
        };

        let pattern = match msg.value() {
            Some(pattern) => pattern,
            None => return format!("Missing value for key: {}", key),
        };

        let mut value = String::new();

        if let Some(args) = args {
            let fluent_args =
                FluentArgs::from_iter(args.iter().map(|(k, v)| (*k, FluentValue::from(*v))));

            let _ = bundle.write_pattern(&mut value, pattern, Some(&fluent_args), &mut vec![]);
        } else {
            let _ = bundle.write_pattern(&mut value, pattern, None, &mut vec![]);
        }

        value
    }

    /// Get a localized message with arguments in a specific language
    pub fn get_message_with_args_in_language(
        &self,
        key: &str,
        language: &str,
        args: &[(&str, &str)],
    ) -> String {
        let args_map: HashMap<&str, &str> = args.iter().copied().collect();
        self.get_message_in_language(key, language, Some(&args_map))
    }

    /// Check if a language is supported
    pub fn is_language_supported(&self, language: &str) -> bool {
        self.bundles.contains_key(language)
    }

    /// Resolve a language code to a supported locale, stripping any region
    /// subtag (e.g. "th-TH" -> "th") and falling back to English
    pub fn resolve_language(&self, language_code: Option<&str>) -> String {
        if let Some(code) = language_code {
            let lang = code.split('-').next().unwrap_or("en");
            if self.is_language_supported(lang) {
                return lang.to_string();
            }
        }
        "en".to_string()
    }
}

/// Create a shared localization manager
pub fn create_localization_manager() -> Result<Arc<LocalizationManager>> {
    Ok(Arc::new(LocalizationManager::new()?))
}

/// Convenience function to get a localized message
pub fn t_lang(manager: &LocalizationManager, key: &str, language_code: Option<&str>) -> String {
    let language = manager.resolve_language(language_code);
    manager.get_message_in_language(key, &language, None)
}

/// Convenience function to get a localized message with arguments
pub fn t_args_lang(
    manager: &LocalizationManager,
    key: &str,
    args: &[(&str, &str)],
    language_code: Option<&str>,
) -> String {
    let language = manager.resolve_language(language_code);
    manager.get_message_with_args_in_language(key, &language, args)
}
