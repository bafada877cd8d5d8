//! Tests for template

use crate::http::template::TemplateRenderer;
use serde_json::json;

#[test]
fn test_consent_page_escapes_input() {
    let renderer = TemplateRenderer::with_oauth_templates();
    let html = renderer
        .render_json(
            "consent",
            &json!({
                "client_name": "Astral Launcher",
                "client_id": "astral-launcher",
                "redirect_uri": "astral-ai://callback",
                "scope": "profile",
                "scopes": ["profile"],
                "state": "<script>alert(1)</script>",
                "email": "steve@example.com",
            }),
        )
        .unwrap();

    assert!(html.contains("Astral Launcher"));
    assert!(html.contains("name=\"decision\" value=\"approve\""));
    assert!(!html.contains("<script>alert(1)</script>"));
    assert!(html.contains("&lt;script&gt;"));
}

#[test]
fn test_error_page() {
    let renderer = TemplateRenderer::with_oauth_templates();
    let html = renderer
        .render_json(
            "error",
            &json!({"error": "unknown_client", "error_description": "Unknown client_id"}),
        )
        .unwrap();
    assert!(html.contains("Unknown client_id"));
}

#[test]
fn test_missing_template() {
    let renderer = TemplateRenderer::new();
    assert!(renderer.render_json("consent", &json!({})).is_err());
}
