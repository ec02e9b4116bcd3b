//! # Localization Tests
//!
//! Tests for the user-facing message catalogs, language resolution, and
//! argument interpolation.

use std::sync::Arc;

use parcel_ocr::localization::{
    create_localization_manager, t_args_lang, t_lang, LocalizationManager,
};

fn setup_localization() -> Arc<LocalizationManager> {
    create_localization_manager().expect("Failed to create localization manager")
}

#[test]
fn test_get_message_existing_key() {
    let manager = setup_localization();

    let message = manager.get_message_in_language("error-no-image", "en", None);
    assert!(!message.is_empty());
    assert!(message.contains("image"));
}

#[test]
fn test_thai_localization() {
    let manager = setup_localization();

    let message = manager.get_message_in_language("error-no-image", "th", None);
    assert_eq!(message, "ไม่มีไฟล์รูปภาพ");

    // Thai message should differ from English
    let english = manager.get_message_in_language("error-no-image", "en", None);
    assert_ne!(message, english);
}

#[test]
fn test_get_message_nonexistent_key() {
    let manager = setup_localization();

    let message = manager.get_message_in_language("nonexistent-key", "en", None);
    assert!(message.starts_with("Missing translation:"));
}

#[test]
fn test_unsupported_language_falls_back_to_english() {
    let manager = setup_localization();

    let message = manager.get_message_in_language("error-no-image", "xx", None);
    let english = manager.get_message_in_language("error-no-image", "en", None);
    assert_eq!(message, english);
}

#[test]
fn test_message_with_args() {
    let manager = setup_localization();

    let message = manager.get_message_with_args_in_language(
        "error-too-large",
        "en",
        &[("size_mb", "20.0"), ("max_mb", "16")],
    );
    assert!(message.contains("20.0"), "message was: {message}");
    assert!(message.contains("16"), "message was: {message}");
}

#[test]
fn test_thai_message_with_args() {
    let manager = setup_localization();

    let message = manager.get_message_with_args_in_language(
        "error-too-large",
        "th",
        &[("size_mb", "20.0"), ("max_mb", "16")],
    );
    assert!(message.contains("16"), "message was: {message}");
    assert!(message.contains("ไฟล์ใหญ่เกินไป"), "message was: {message}");
}

#[test]
fn test_all_pipeline_keys_resolve_in_both_locales() {
    let manager = setup_localization();
    let keys = [
        "error-no-image",
        "error-empty-file",
        "error-unsupported-type",
        "error-too-large",
        "error-upload-read",
        "error-ocr-unavailable",
        "error-extract-auth",
        "error-extract-unavailable",
        "error-extract-malformed",
    ];

    for language in ["en", "th"] {
        for key in keys {
            let message = manager.get_message_in_language(key, language, None);
            assert!(
                !message.starts_with("Missing translation:"),
                "{key} missing for {language}"
            );
        }
    }
}

#[test]
fn test_resolve_language_strips_region_subtag() {
    let manager = setup_localization();

    assert_eq!(manager.resolve_language(Some("th-TH")), "th");
    assert_eq!(manager.resolve_language(Some("en-US")), "en");
    assert_eq!(manager.resolve_language(Some("fr")), "en");
    assert_eq!(manager.resolve_language(None), "en");
}

#[test]
fn test_language_support_flags() {
    let manager = setup_localization();

    assert!(manager.is_language_supported("en"));
    assert!(manager.is_language_supported("th"));
    assert!(!manager.is_language_supported("fr"));
}

#[test]
fn test_convenience_helpers() {
    let manager = setup_localization();

    let message = t_lang(&manager, "error-ocr-unavailable", Some("th"));
    assert_eq!(message, "ไม่สามารถอ่านข้อความจากภาพได้");

    let message = t_args_lang(
        &manager,
        "error-too-large",
        &[("size_mb", "17.5"), ("max_mb", "16")],
        Some("en"),
    );
    assert!(message.contains("17.5"));
}
